mod poller;
mod probe;

use std::{collections::HashSet, time::Duration};

pub use poller::{PollOutcome, PollTask, ReadinessPoller};
pub use probe::{HttpProbe, ProbeError, ReqwestProbe};
use reqwest::Url;
use thiserror::Error;

use crate::constants::{DEFAULT_HTTP_POLL_INTERVAL, DEFAULT_HTTP_REQUEST_TIMEOUT, runner_host};

#[derive(Debug, Error)]
pub enum ReadinessError {
    #[error(
        "timed out after {timeout:?} waiting for endpoints: {pending}",
        pending = format_pending(pending)
    )]
    Timeout { timeout: Duration, pending: Vec<Url> },
    #[error("readiness polling was cancelled before all endpoints responded")]
    Cancelled,
}

#[derive(Debug, Error)]
#[error("invalid readiness endpoint '{raw}': {source}")]
pub struct EndpointError {
    pub raw: String,
    #[source]
    pub source: url::ParseError,
}

/// Timing knobs for the readiness loop.
#[derive(Clone, Copy, Debug)]
pub struct PollerSettings {
    pub poll_interval: Duration,
    pub request_timeout: Duration,
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_HTTP_POLL_INTERVAL,
            request_timeout: DEFAULT_HTTP_REQUEST_TIMEOUT,
        }
    }
}

impl PollerSettings {
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// Parse an endpoint. A bare port is expanded against `COMPOSE_RUNNER_HOST`.
pub fn parse_endpoint(raw: &str) -> Result<Url, EndpointError> {
    let trimmed = raw.trim();
    let candidate = if trimmed.parse::<u16>().is_ok() {
        format!("http://{}:{trimmed}/", runner_host())
    } else {
        trimmed.to_owned()
    };

    Url::parse(&candidate).map_err(|source| EndpointError {
        raw: raw.to_owned(),
        source,
    })
}

pub fn parse_endpoints<S>(raw: &[S]) -> Result<Vec<Url>, EndpointError>
where
    S: AsRef<str>,
{
    raw.iter().map(|entry| parse_endpoint(entry.as_ref())).collect()
}

/// Drop repeated endpoints, keeping first-seen order.
#[must_use]
pub fn dedup_endpoints<I>(endpoints: I) -> Vec<Url>
where
    I: IntoIterator<Item = Url>,
{
    let mut seen = HashSet::new();
    endpoints
        .into_iter()
        .filter(|url| seen.insert(url.clone()))
        .collect()
}

fn format_pending(pending: &[Url]) -> String {
    if pending.is_empty() {
        return "none recorded".into();
    }
    pending
        .iter()
        .map(Url::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}
