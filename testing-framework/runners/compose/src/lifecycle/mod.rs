pub mod cleanup;

use std::collections::HashSet;

use async_trait::async_trait;
use testing_framework_core::constants::preserve_requested;
use tracing::{debug, info};

use crate::docker::{
    ComposeFile, ComposeSettings,
    commands::{ComposeCommandError, compose_down, compose_stop, dump_compose_logs},
    compose_command,
    process::ComposeProcessHandle,
};

/// Lifecycle operations the orchestrator drives.
#[async_trait]
pub trait ComposeControl: Send {
    /// Launch the compose project without waiting for readiness.
    fn start(&mut self) -> Result<(), ComposeCommandError>;

    /// Non-blocking check that the launched process is still running.
    fn is_alive(&mut self) -> bool;

    fn exit_code(&self) -> Option<i32>;

    fn recent_output(&self) -> Vec<String>;

    /// Stop one service. Must be idempotent.
    async fn stop(&mut self, service: &str) -> Result<(), ComposeCommandError>;

    /// Kill the launched process, if any, and stop draining its output.
    async fn release(&mut self);

    async fn dump_logs(&mut self);
}

/// Owns the `compose up` process for one compose project.
pub struct ComposeLifecycleManager {
    settings: ComposeSettings,
    file: ComposeFile,
    handle: Option<ComposeProcessHandle>,
    started: bool,
    stopped: HashSet<String>,
}

impl ComposeLifecycleManager {
    #[must_use]
    pub fn new(settings: ComposeSettings, file: ComposeFile) -> Self {
        Self {
            settings,
            file,
            handle: None,
            started: false,
            stopped: HashSet::new(),
        }
    }

    #[must_use]
    pub const fn settings(&self) -> &ComposeSettings {
        &self.settings
    }

    #[must_use]
    pub const fn file(&self) -> &ComposeFile {
        &self.file
    }

    #[must_use]
    pub const fn handle(&self) -> Option<&ComposeProcessHandle> {
        self.handle.as_ref()
    }

    /// Guard that tears the whole project down when dropped. Callers go
    /// through the orchestrator so the gates are honoured.
    #[must_use]
    pub(crate) fn cleanup_guard(&self) -> cleanup::ComposeCleanup {
        cleanup::ComposeCleanup::new(self.settings.clone(), self.file.clone())
    }

    /// `compose down --volumes` for the whole project, unless
    /// `COMPOSE_RUNNER_PRESERVE` is set.
    pub async fn down(&mut self) -> Result<(), ComposeCommandError> {
        if preserve_requested() {
            info!(
                project = self.file.project(),
                "compose preserve flag set; skipping compose down"
            );
            return Ok(());
        }

        compose_down(&self.settings, &self.file).await?;
        self.release().await;
        Ok(())
    }
}

#[async_trait]
impl ComposeControl for ComposeLifecycleManager {
    fn start(&mut self) -> Result<(), ComposeCommandError> {
        if let Some(handle) = self.handle.as_mut() {
            if handle.is_alive() {
                return Err(ComposeCommandError::AlreadyRunning {
                    project: self.file.project().to_owned(),
                });
            }
        }
        self.handle = None;

        let mut command = compose_command(&self.settings, &self.file);
        command.arg("up");

        let description = format!("{} up", self.settings.program);
        let handle = ComposeProcessHandle::spawn(command, self.settings.output_tail).map_err(
            |source| ComposeCommandError::Spawn {
                command: description,
                source,
            },
        )?;

        info!(
            project = self.file.project(),
            compose_file = %self.file.path().display(),
            pid = ?handle.id(),
            "compose up launched"
        );
        self.handle = Some(handle);
        self.started = true;
        self.stopped.clear();
        Ok(())
    }

    fn is_alive(&mut self) -> bool {
        self.handle.as_mut().is_some_and(ComposeProcessHandle::is_alive)
    }

    fn exit_code(&self) -> Option<i32> {
        self.handle
            .as_ref()
            .and_then(ComposeProcessHandle::exit_status)
            .and_then(|status| status.code())
    }

    fn recent_output(&self) -> Vec<String> {
        self.handle
            .as_ref()
            .map(ComposeProcessHandle::recent_output)
            .unwrap_or_default()
    }

    async fn stop(&mut self, service: &str) -> Result<(), ComposeCommandError> {
        if !self.started {
            debug!(service, "compose was never started; nothing to stop");
            return Ok(());
        }
        if self.stopped.contains(service) {
            debug!(service, "service already stopped");
            return Ok(());
        }

        compose_stop(&self.settings, &self.file, service).await?;
        info!(service, project = self.file.project(), "compose service stopped");
        self.stopped.insert(service.to_owned());
        self.release().await;
        Ok(())
    }

    async fn release(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.shutdown().await;
        }
    }

    async fn dump_logs(&mut self) {
        if self.started {
            dump_compose_logs(&self.settings, &self.file).await;
        }
    }
}
