use std::{env, time::Duration};

/// Environment variable that, when non-empty, turns every orchestration call
/// into a no-op so tests can target a manually started service.
pub const NO_DOCKER_ENV: &str = "COMPOSE_RUNNER_NO_DOCKER";

/// Environment variable that keeps compose containers around after cleanup.
pub const PRESERVE_ENV: &str = "COMPOSE_RUNNER_PRESERVE";

/// Environment variable overriding the host used for port-only endpoints.
pub const HOST_ENV: &str = "COMPOSE_RUNNER_HOST";

/// Environment variable that scales framework timeouts on slow CI hosts.
pub const SLOW_TEST_ENV: &str = "SLOW_TEST_ENV";

/// Default host for endpoints given as bare ports.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default time allowed for every endpoint to become reachable.
pub const DEFAULT_READINESS_TIMEOUT: Duration = Duration::from_secs(40);

/// Default pause between readiness iterations.
pub const DEFAULT_HTTP_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Default transport timeout for a single readiness GET.
pub const DEFAULT_HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

/// Default timeout for `compose stop` / `compose down` invocations.
pub const DEFAULT_COMPOSE_COMMAND_TIMEOUT: Duration = Duration::from_secs(60);

/// Commands that must succeed for the compose tooling to count as available.
pub const DEFAULT_AVAILABILITY_COMMANDS: &[&str] = &["docker", "docker-compose --help"];

/// Substring every availability command must print on stdout.
pub const DEFAULT_AVAILABILITY_MARKER: &str = "docker";

/// Resolve the endpoint host from `COMPOSE_RUNNER_HOST`, falling back to the
/// default.
pub fn runner_host() -> String {
    env::var(HOST_ENV)
        .ok()
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_HOST.to_owned())
}

/// Returns true when `COMPOSE_RUNNER_PRESERVE` is set.
pub fn preserve_requested() -> bool {
    env::var_os(PRESERVE_ENV).is_some()
}

/// Doubles the timeout when `SLOW_TEST_ENV=true`.
#[must_use]
pub fn adjust_timeout(timeout: Duration) -> Duration {
    let slow = env::var(SLOW_TEST_ENV)
        .map(|value| value.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    if slow { timeout * 2 } else { timeout }
}
