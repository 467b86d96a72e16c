pub mod commands;
pub mod process;

use std::{
    fmt,
    path::{Path, PathBuf},
    time::Duration,
};

use testing_framework_core::constants::DEFAULT_COMPOSE_COMMAND_TIMEOUT;
use tokio::process::Command;
use uuid::Uuid;

/// Lines of compose output kept for failure reports.
pub const DEFAULT_OUTPUT_TAIL: usize = 50;

/// How the compose tool is invoked.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ComposeProgram {
    /// `docker-compose ...`
    Standalone,
    /// `docker compose ...`
    Plugin,
    /// Any other executable that accepts compose-style arguments.
    Custom { program: PathBuf, args: Vec<String> },
}

impl ComposeProgram {
    fn command(&self) -> Command {
        match self {
            Self::Standalone => Command::new("docker-compose"),
            Self::Plugin => {
                let mut command = Command::new("docker");
                command.arg("compose");
                command
            }
            Self::Custom { program, args } => {
                let mut command = Command::new(program);
                command.args(args);
                command
            }
        }
    }

    /// Availability probe command lines matching this invocation.
    #[must_use]
    pub fn probe_commands(&self) -> Vec<String> {
        match self {
            Self::Standalone => vec!["docker".into(), "docker-compose --help".into()],
            Self::Plugin => vec!["docker".into(), "docker compose --help".into()],
            Self::Custom { program, .. } => vec![format!("{} --help", program.display())],
        }
    }
}

impl fmt::Display for ComposeProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Standalone => f.write_str("docker-compose"),
            Self::Plugin => f.write_str("docker compose"),
            Self::Custom { program, .. } => write!(f, "{}", program.display()),
        }
    }
}

/// Knobs shared by every compose invocation.
#[derive(Clone, Debug)]
pub struct ComposeSettings {
    pub program: ComposeProgram,
    pub command_timeout: Duration,
    pub output_tail: usize,
}

impl Default for ComposeSettings {
    fn default() -> Self {
        Self {
            program: ComposeProgram::Standalone,
            command_timeout: DEFAULT_COMPOSE_COMMAND_TIMEOUT,
            output_tail: DEFAULT_OUTPUT_TAIL,
        }
    }
}

impl ComposeSettings {
    #[must_use]
    pub fn with_program(mut self, program: ComposeProgram) -> Self {
        self.program = program;
        self
    }

    #[must_use]
    pub const fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn with_output_tail(mut self, lines: usize) -> Self {
        self.output_tail = lines;
        self
    }
}

/// A compose file plus the project it runs under.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ComposeFile {
    path: PathBuf,
    project: String,
    working_dir: Option<PathBuf>,
}

impl ComposeFile {
    /// Uses a random project name so parallel runs do not collide.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            project: random_project_name(),
            working_dir: None,
        }
    }

    #[must_use]
    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = project.into();
        self
    }

    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn project(&self) -> &str {
        &self.project
    }

    #[must_use]
    pub fn working_dir(&self) -> Option<&Path> {
        self.working_dir.as_deref()
    }
}

fn random_project_name() -> String {
    format!("compose-runner-{}", Uuid::new_v4().simple())
}

/// `<compose> -f <file> -p <project>` with the working directory applied.
pub(crate) fn compose_command(settings: &ComposeSettings, file: &ComposeFile) -> Command {
    let mut command = settings.program.command();
    command
        .arg("-f")
        .arg(file.path())
        .arg("-p")
        .arg(file.project());
    if let Some(dir) = file.working_dir() {
        command.current_dir(dir);
    }
    command
}
