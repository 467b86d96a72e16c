#![cfg(unix)]

use std::{
    fs,
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use reqwest::Url;
use serial_test::serial;
use tempfile::TempDir;
use testing_framework_core::{
    AvailabilityState, EnvironmentOverride, Gates, HttpProbe, PollerSettings, ProbeError,
    ReadinessPoller, SkipReason, constants::PRESERVE_ENV,
};
use testing_framework_runner_compose::{
    ComposeControl as _, ComposeLifecycleManager, ComposeProgram, ComposeRunnerError,
    ComposeSettings, Orchestrator, Outcome, StackDescriptor, StartupFailure,
};

/// Compose stand-in: records every invocation, `up` stays in the foreground.
const FAKE_COMPOSE: &str = r#"echo "$@" >> "$(dirname "$0")/calls.txt"
case "$5" in
  up) echo "Creating network demo_default"; echo "Container demo-search-1 Started"; sleep 30 ;;
esac
"#;

struct Stack {
    dir: TempDir,
    descriptor: StackDescriptor,
    settings: ComposeSettings,
}

impl Stack {
    fn new(fake_compose: &str) -> Self {
        let dir = TempDir::new().expect("tempdir");
        let script = dir.path().join("fake-compose.sh");
        fs::write(&script, fake_compose).expect("write fake compose");
        fs::write(
            dir.path().join("stack.yaml"),
            r#"
compose_file: docker-compose.yml
project: demo
readiness_timeout_secs: 5
services:
  - name: search
    health: http://127.0.0.1:9200/
  - name: dashboard
    health: http://127.0.0.1:5601/status
"#,
        )
        .expect("write stack");

        let descriptor = StackDescriptor::load(&dir.path().join("stack.yaml")).expect("load stack");
        let settings = ComposeSettings::default()
            .with_program(ComposeProgram::Custom {
                program: PathBuf::from("sh"),
                args: vec![script.display().to_string()],
            })
            .with_command_timeout(Duration::from_secs(5));

        Self {
            dir,
            descriptor,
            settings,
        }
    }

    fn calls(&self) -> Vec<String> {
        fs::read_to_string(self.dir.path().join("calls.txt"))
            .map(|calls| calls.lines().map(str::to_owned).collect())
            .unwrap_or_default()
    }

    fn orchestrator(
        &self,
        ready_after: usize,
    ) -> (
        Orchestrator<ComposeLifecycleManager, CountingProbe>,
        Arc<AtomicUsize>,
    ) {
        self.orchestrator_with(AvailabilityState::Available, ready_after)
    }

    fn orchestrator_with(
        &self,
        availability: AvailabilityState,
        ready_after: usize,
    ) -> (
        Orchestrator<ComposeLifecycleManager, CountingProbe>,
        Arc<AtomicUsize>,
    ) {
        let calls = Arc::new(AtomicUsize::new(0));
        let probe = CountingProbe {
            ready_after,
            calls: Arc::clone(&calls),
        };
        let gates = Gates::new(
            availability,
            EnvironmentOverride::new("COMPOSE_RUNNER_IT_UNSET_OVERRIDE"),
        );
        let control =
            ComposeLifecycleManager::new(self.settings.clone(), self.descriptor.compose_file());
        let poller = ReadinessPoller::new(
            probe,
            PollerSettings::default().with_poll_interval(Duration::from_millis(20)),
        );
        (Orchestrator::new(gates, control, poller), calls)
    }
}

struct CountingProbe {
    ready_after: usize,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl HttpProbe for CountingProbe {
    async fn get(&self, url: &Url) -> Result<String, ProbeError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) + 1 >= self.ready_after {
            Ok("green".into())
        } else {
            Err(ProbeError::Status {
                url: url.clone(),
                status: 503,
            })
        }
    }
}

#[tokio::test]
async fn full_cycle_starts_waits_and_stops_every_service() {
    let stack = Stack::new(FAKE_COMPOSE);
    let (mut orchestrator, probes) = stack.orchestrator(4);

    let outcome = orchestrator
        .initialize_stack(&stack.descriptor)
        .await
        .expect("stack ready");
    assert_eq!(outcome, Outcome::Completed);
    assert!(probes.load(Ordering::SeqCst) >= 4);
    assert!(orchestrator.control_mut().is_alive());

    let outcome = orchestrator
        .teardown_stack(&stack.descriptor)
        .await
        .expect("teardown");
    assert_eq!(outcome, Outcome::Completed);
    assert!(!orchestrator.control_mut().is_alive());

    let compose = stack.descriptor.compose_path().display().to_string();
    assert_eq!(
        stack.calls(),
        [
            format!("-f {compose} -p demo up"),
            format!("-f {compose} -p demo stop dashboard"),
            format!("-f {compose} -p demo stop search"),
        ]
    );
}

#[tokio::test]
async fn compose_exit_before_readiness_reports_its_output() {
    let stack = Stack::new("echo 'pull access denied for search'\nsleep 0.2\nexit 18\n");
    let (mut orchestrator, _probes) = stack.orchestrator(usize::MAX);

    let err = orchestrator
        .initialize_stack(&stack.descriptor)
        .await
        .expect_err("compose exits");

    match err {
        ComposeRunnerError::Startup(StartupFailure::ProcessExited { code, output }) => {
            assert_eq!(code, Some(18));
            assert!(
                output.iter().any(|line| line == "pull access denied for search"),
                "missing compose output: {output:?}"
            );
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(orchestrator.control().handle().is_none());
}

#[tokio::test]
async fn raw_endpoints_are_validated_before_anything_runs() {
    let stack = Stack::new(FAKE_COMPOSE);
    let (mut orchestrator, probes) = stack.orchestrator(1);

    let err = orchestrator
        .initialize_raw(&["http://[broken"], Duration::from_secs(1))
        .await
        .expect_err("invalid endpoint");

    assert!(matches!(err, ComposeRunnerError::Endpoint(_)));
    assert!(stack.calls().is_empty());
    assert_eq!(probes.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn raw_endpoints_are_not_parsed_when_the_gates_skip() {
    let stack = Stack::new(FAKE_COMPOSE);
    let (mut orchestrator, probes) = stack.orchestrator_with(AvailabilityState::Unavailable, 1);

    let outcome = orchestrator
        .initialize_raw(&["http://[broken"], Duration::from_secs(1))
        .await
        .expect("skip wins over a bad endpoint");

    assert_eq!(outcome, Outcome::Skipped(SkipReason::ToolingUnavailable));
    assert!(stack.calls().is_empty());
    assert_eq!(probes.load(Ordering::SeqCst), 0);
}

#[tokio::test]
#[serial]
async fn cleanup_guard_is_inert_when_the_run_is_skipped() {
    let stack = Stack::new(FAKE_COMPOSE);
    let (mut orchestrator, _probes) = stack.orchestrator_with(AvailabilityState::Unavailable, 1);
    let guard = orchestrator.cleanup_guard();

    let outcome = orchestrator
        .initialize_stack(&stack.descriptor)
        .await
        .expect("skipped");
    assert!(outcome.is_skipped());

    temp_env::with_var_unset(PRESERVE_ENV, || drop(guard));
    assert!(stack.calls().is_empty(), "docker touched: {:?}", stack.calls());
}

#[tokio::test]
#[serial]
async fn cleanup_guard_takes_the_project_down_when_the_run_proceeds() {
    let stack = Stack::new(FAKE_COMPOSE);
    let (orchestrator, _probes) = stack.orchestrator(1);
    let guard = orchestrator.cleanup_guard();

    temp_env::with_var_unset(PRESERVE_ENV, || drop(guard));

    let compose = stack.descriptor.compose_path().display().to_string();
    assert_eq!(stack.calls(), [format!("-f {compose} -p demo down --volumes")]);
}
