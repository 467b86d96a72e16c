use std::{io, thread};

use testing_framework_core::constants::preserve_requested;
use tracing::{info, warn};

use crate::docker::{
    ComposeFile, ComposeSettings,
    commands::{ComposeCommandError, compose_down},
};

/// Runs `compose down --volumes` for a project when dropped.
///
/// Teardown through the orchestrator only stops individual services; this
/// guard removes whatever the project left behind, even when a test panics.
pub struct ComposeCleanup {
    settings: ComposeSettings,
    file: ComposeFile,
    armed: bool,
}

impl ComposeCleanup {
    #[must_use]
    pub fn new(settings: ComposeSettings, file: ComposeFile) -> Self {
        debug_assert!(
            !file.path().as_os_str().is_empty() && !file.project().is_empty(),
            "compose cleanup should receive valid identifiers"
        );
        Self {
            settings,
            file,
            armed: true,
        }
    }

    /// Leave the project running when the guard drops.
    pub fn disarm(&mut self) {
        self.armed = false;
    }

    /// Tear down now instead of waiting for drop.
    pub fn cleanup(mut self) -> Result<(), ComposeCommandError> {
        self.armed = false;
        self.teardown()
    }

    fn teardown(&self) -> Result<(), ComposeCommandError> {
        if preserve_requested() {
            info!(
                project = self.file.project(),
                "compose preserve flag set; leaving project running"
            );
            return Ok(());
        }
        run_compose_down_blocking(&self.settings, &self.file)
    }
}

impl Drop for ComposeCleanup {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Err(err) = self.teardown() {
            warn!(project = self.file.project(), error = %err, "compose down failed");
        }
    }
}

// Runs on a dedicated thread so it works from both sync and async drop sites.
fn run_compose_down_blocking(
    settings: &ComposeSettings,
    file: &ComposeFile,
) -> Result<(), ComposeCommandError> {
    let settings = settings.clone();
    let file = file.clone();
    let command = format!("{} down", settings.program);

    let handle = thread::spawn(move || {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|source| ComposeCommandError::Spawn {
                command: format!("{} down", settings.program),
                source,
            })?
            .block_on(compose_down(&settings, &file))
    });

    handle.join().map_err(|_| ComposeCommandError::Spawn {
        command,
        source: io::Error::other("join failure running compose down"),
    })?
}
