use serial_test::serial;
use testing_framework_core::{HttpProbe as _, PollerSettings, ReqwestProbe};
use testing_framework_runner_compose::Outcome;
use tests_workflows::{load_sample_stack, sample_orchestrator};

#[tokio::test]
#[serial]
async fn compose_runner_sample_stack() {
    let stack = load_sample_stack().expect("sample stack descriptor");
    let mut orchestrator = sample_orchestrator(&stack).expect("orchestrator");
    let cleanup = orchestrator.cleanup_guard();

    let outcome = orchestrator
        .initialize_stack(&stack)
        .await
        .expect("sample stack should come up");
    if let Outcome::Skipped(reason) = outcome {
        println!("skipping compose runner test: {reason}");
        return;
    }

    let probe = ReqwestProbe::new(PollerSettings::default().request_timeout).expect("client");
    for endpoint in stack.endpoints() {
        let body = probe.get(&endpoint).await.expect("endpoint reachable");
        assert!(!body.is_empty(), "{endpoint} returned an empty body");
    }

    let outcome = orchestrator
        .teardown_stack(&stack)
        .await
        .expect("teardown succeeds");
    assert_eq!(outcome, Outcome::Completed);

    cleanup.cleanup().expect("compose down");
}

#[tokio::test]
#[serial]
async fn teardown_without_initialize_is_harmless() {
    let stack = load_sample_stack().expect("sample stack descriptor");
    let mut orchestrator = sample_orchestrator(&stack).expect("orchestrator");

    let outcome = orchestrator
        .teardown_stack(&stack)
        .await
        .expect("stopping services that were never started is a no-op");
    assert!(matches!(outcome, Outcome::Completed | Outcome::Skipped(_)));
}
