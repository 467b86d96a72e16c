use std::{io, process, process::Stdio, time::Duration};

use testing_framework_core::adjust_timeout;
use tokio::{process::Command, time::timeout};
use tracing::{info, warn};

use super::{ComposeFile, ComposeSettings, compose_command};

/// Errors running compose commands.
#[derive(Debug, thiserror::Error)]
pub enum ComposeCommandError {
    #[error("{command} exited with status {status}{stderr}", stderr = format_stderr(stderr))]
    Failed {
        command: String,
        status: process::ExitStatus,
        stderr: String,
    },
    #[error("failed to spawn {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("{command} timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },
    #[error("compose project {project} is already running")]
    AlreadyRunning { project: String },
}

/// Runs `<compose> stop <service>` for a single service.
pub async fn compose_stop(
    settings: &ComposeSettings,
    file: &ComposeFile,
    service: &str,
) -> Result<(), ComposeCommandError> {
    let mut command = compose_command(settings, file);
    command.arg("stop").arg(service);

    let description = format!("{} stop {service}", settings.program);
    run_compose_command(
        command,
        adjust_timeout(settings.command_timeout),
        &description,
    )
    .await
}

/// Runs `<compose> down --volumes` for the whole project.
pub async fn compose_down(
    settings: &ComposeSettings,
    file: &ComposeFile,
) -> Result<(), ComposeCommandError> {
    let mut command = compose_command(settings, file);
    command.arg("down").arg("--volumes");

    let description = format!("{} down", settings.program);
    run_compose_command(
        command,
        adjust_timeout(settings.command_timeout),
        &description,
    )
    .await
}

/// Dump compose logs through tracing for debugging failures.
pub async fn dump_compose_logs(settings: &ComposeSettings, file: &ComposeFile) {
    let mut command = compose_command(settings, file);
    command
        .arg("logs")
        .arg("--no-color")
        .stdin(Stdio::null())
        .kill_on_drop(true);

    match timeout(adjust_timeout(settings.command_timeout), command.output()).await {
        Ok(Ok(output)) => log_output(file.project(), &output.stdout, &output.stderr),
        Ok(Err(err)) => warn!(
            project = file.project(),
            error = %err,
            "failed to collect compose logs"
        ),
        Err(_) => warn!(project = file.project(), "timed out collecting compose logs"),
    }
}

fn log_output(project: &str, stdout: &[u8], stderr: &[u8]) {
    if !stdout.is_empty() {
        warn!(
            project,
            "compose logs:\n{}",
            String::from_utf8_lossy(stdout)
        );
    }
    if !stderr.is_empty() {
        warn!(
            project,
            "compose log errors:\n{}",
            String::from_utf8_lossy(stderr)
        );
    }
}

async fn run_compose_command(
    mut command: Command,
    timeout_duration: Duration,
    description: &str,
) -> Result<(), ComposeCommandError> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    info!(command = description, "running compose command");
    match timeout(timeout_duration, command.output()).await {
        Ok(output) => handle_compose_output(output, description),
        Err(_) => Err(ComposeCommandError::Timeout {
            command: description.to_owned(),
            timeout: timeout_duration,
        }),
    }
}

fn handle_compose_output(
    output: io::Result<process::Output>,
    description: &str,
) -> Result<(), ComposeCommandError> {
    match output {
        Ok(output) if output.status.success() => Ok(()),
        Ok(output) => Err(ComposeCommandError::Failed {
            command: description.to_owned(),
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
        }),
        Err(source) => Err(ComposeCommandError::Spawn {
            command: description.to_owned(),
            source,
        }),
    }
}

fn format_stderr(stderr: &str) -> String {
    if stderr.is_empty() {
        String::new()
    } else {
        format!(": {stderr}")
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::{fs, path::Path};

    use tempfile::TempDir;

    use super::*;
    use crate::docker::ComposeProgram;

    fn script(dir: &Path, body: &str) -> ComposeSettings {
        let path = dir.join("fake-compose.sh");
        fs::write(&path, format!("{body}\n")).expect("write script");
        ComposeSettings::default()
            .with_program(ComposeProgram::Custom {
                program: "sh".into(),
                args: vec![path.display().to_string()],
            })
            .with_command_timeout(Duration::from_secs(5))
    }

    #[tokio::test]
    async fn stop_passes_service_name() {
        let dir = TempDir::new().expect("tempdir");
        let record = dir.path().join("args.txt");
        let settings = script(dir.path(), &format!("echo \"$@\" > {}", record.display()));
        let file = ComposeFile::new("stack.yml").with_project("demo");

        compose_stop(&settings, &file, "elasticsearch")
            .await
            .expect("stop succeeds");

        let args = fs::read_to_string(&record).expect("args recorded");
        assert_eq!(args.trim(), "-f stack.yml -p demo stop elasticsearch");
    }

    #[tokio::test]
    async fn non_zero_exit_reports_stderr() {
        let dir = TempDir::new().expect("tempdir");
        let settings = script(dir.path(), "echo 'no such service: web' >&2\nexit 3");
        let file = ComposeFile::new("stack.yml");

        let err = compose_stop(&settings, &file, "web")
            .await
            .expect_err("stop fails");

        match err {
            ComposeCommandError::Failed { status, stderr, .. } => {
                assert_eq!(status.code(), Some(3));
                assert_eq!(stderr, "no such service: web");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn slow_command_times_out() {
        let dir = TempDir::new().expect("tempdir");
        let settings = script(dir.path(), "sleep 5")
            .with_command_timeout(Duration::from_millis(200));
        let file = ComposeFile::new("stack.yml");

        let err = compose_down(&settings, &file).await.expect_err("times out");
        assert!(matches!(err, ComposeCommandError::Timeout { .. }));
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_error() {
        let settings = ComposeSettings::default().with_program(ComposeProgram::Custom {
            program: "/nonexistent/compose-binary".into(),
            args: Vec::new(),
        });
        let file = ComposeFile::new("stack.yml");

        let err = compose_down(&settings, &file).await.expect_err("spawn fails");
        assert!(matches!(err, ComposeCommandError::Spawn { .. }));
    }
}
