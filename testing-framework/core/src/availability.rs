use std::{
    fmt, io,
    process::{Command, Stdio},
    sync::OnceLock,
};

use tracing::{debug, error, info};

use crate::constants::{DEFAULT_AVAILABILITY_COMMANDS, DEFAULT_AVAILABILITY_MARKER};

/// Whether the compose tooling was found to work on this host.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AvailabilityState {
    /// No probe has run yet. Treated like `Unavailable` by the gates.
    #[default]
    Unknown,
    Available,
    Unavailable,
}

impl AvailabilityState {
    #[must_use]
    pub const fn is_available(self) -> bool {
        matches!(self, Self::Available)
    }
}

/// A command line run by the availability probe.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProbeCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl ProbeCommand {
    /// Split a whitespace separated command line, e.g. `"docker-compose --help"`.
    /// Returns `None` for a blank line.
    #[must_use]
    pub fn parse(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace().map(str::to_owned);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
        })
    }
}

impl fmt::Display for ProbeCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Captured result of a finished probe command.
#[derive(Clone, Debug, Default)]
pub struct CommandOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

/// Runs a command to completion and captures its output.
pub trait CommandRunner {
    fn run(&self, command: &ProbeCommand) -> io::Result<CommandOutput>;
}

/// Executes probe commands as real child processes.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemCommandRunner;

impl CommandRunner for SystemCommandRunner {
    fn run(&self, command: &ProbeCommand) -> io::Result<CommandOutput> {
        let output = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .output()?;

        Ok(CommandOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Commands and the stdout marker used to decide availability.
#[derive(Clone, Debug)]
pub struct ProbeSettings {
    pub commands: Vec<ProbeCommand>,
    pub marker: String,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            commands: DEFAULT_AVAILABILITY_COMMANDS
                .iter()
                .filter_map(|line| ProbeCommand::parse(line))
                .collect(),
            marker: DEFAULT_AVAILABILITY_MARKER.to_owned(),
        }
    }
}

impl ProbeSettings {
    #[must_use]
    pub fn with_commands<I, S>(mut self, commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.commands = commands
            .into_iter()
            .filter_map(|line| ProbeCommand::parse(line.as_ref()))
            .collect();
        self
    }

    #[must_use]
    pub fn with_marker(mut self, marker: impl Into<String>) -> Self {
        self.marker = marker.into();
        self
    }
}

/// Run every probe command once; any failure makes the tooling unavailable.
///
/// A command passes when it exits successfully and its stdout contains the
/// marker. Spawn errors (missing binary, permissions) count as failures and
/// are not retried.
pub fn check_availability<R>(settings: &ProbeSettings, runner: &R) -> AvailabilityState
where
    R: CommandRunner + ?Sized,
{
    for command in &settings.commands {
        match runner.run(command) {
            Ok(output) if output.success && output.stdout.contains(&settings.marker) => {
                debug!(command = %command, "availability probe passed");
            }
            Ok(output) => {
                error!(
                    command = %command,
                    success = output.success,
                    stderr = %output.stderr.trim(),
                    "availability probe failed; compose orchestration disabled"
                );
                return AvailabilityState::Unavailable;
            }
            Err(err) => {
                error!(
                    command = %command,
                    error = %err,
                    "availability probe could not run; compose orchestration disabled"
                );
                return AvailabilityState::Unavailable;
            }
        }
    }

    AvailabilityState::Available
}

static DETECTED: OnceLock<AvailabilityState> = OnceLock::new();

/// Probe the default compose tooling once per process and return the cached
/// state on later calls.
pub fn detect() -> AvailabilityState {
    *DETECTED.get_or_init(|| {
        let state = check_availability(&ProbeSettings::default(), &SystemCommandRunner);
        info!(?state, "compose tooling availability detected");
        state
    })
}
