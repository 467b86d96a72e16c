use std::time::Duration;

use reqwest::Url;
use testing_framework_core::readiness::EndpointError;

use crate::{descriptor::DescriptorError, docker::commands::ComposeCommandError};

#[derive(Debug, thiserror::Error)]
/// Top-level compose runner errors.
pub enum ComposeRunnerError {
    #[error(transparent)]
    Startup(#[from] StartupFailure),
    #[error(transparent)]
    Teardown(#[from] TeardownFailure),
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),
    #[error(transparent)]
    Endpoint(#[from] EndpointError),
    #[error("failed to build readiness http client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

#[derive(Debug, thiserror::Error)]
/// Reasons `initialize` could not confirm the stack is reachable.
pub enum StartupFailure {
    #[error("failed to launch compose: {source}")]
    Spawn {
        #[source]
        source: ComposeCommandError,
    },
    #[error(
        "services were not ready after {timeout:?}; still waiting on: {pending}",
        pending = format_urls(pending)
    )]
    ReadinessTimeout { timeout: Duration, pending: Vec<Url> },
    #[error(
        "compose process exited (code {code}) before services became ready{tail}",
        code = code.map_or_else(|| "none".to_owned(), |code| code.to_string()),
        tail = format_output(output)
    )]
    ProcessExited {
        code: Option<i32>,
        output: Vec<String>,
    },
    #[error("readiness polling stopped before services became ready")]
    ReadinessCancelled,
}

impl StartupFailure {
    /// Short label naming which startup condition failed.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Spawn { .. } => "spawn",
            Self::ReadinessTimeout { .. } => "readiness-timeout",
            Self::ProcessExited { .. } => "process-exited",
            Self::ReadinessCancelled => "readiness-cancelled",
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("failed to stop compose service '{service}': {source}")]
/// A `stop` request for a named service failed.
pub struct TeardownFailure {
    pub service: String,
    #[source]
    pub source: ComposeCommandError,
}

fn format_urls(urls: &[Url]) -> String {
    if urls.is_empty() {
        return "none recorded".into();
    }
    urls.iter().map(Url::as_str).collect::<Vec<_>>().join(", ")
}

fn format_output(output: &[String]) -> String {
    if output.is_empty() {
        return String::new();
    }
    format!("; last output:\n{}", output.join("\n"))
}
