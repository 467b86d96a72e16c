use std::{
    env,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context as _;
use testing_framework_artifacts::ArtifactDeployer;
use testing_framework_core::{
    EnvironmentOverride, Gates, PollerSettings, ProbeSettings, SystemCommandRunner,
    check_availability,
};
use testing_framework_runner_compose::{
    ComposeProgram, ComposeSettings, Orchestrator, Outcome, StackDescriptor,
};
use tracing::{info, warn};

const DEFAULT_HOLD_SECS: u64 = 5;
const DEFAULT_ARTIFACT_SUFFIX: &str = ".war";

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let stack_path = env::var_os("COMPOSE_DEMO_STACK")
        .map(PathBuf::from)
        .unwrap_or_else(default_stack_path);
    let hold_secs = read_env_any(
        &["COMPOSE_DEMO_HOLD_SECS", "COMPOSE_DEMO_RUN_SECS"],
        DEFAULT_HOLD_SECS,
    );
    let use_plugin = read_env_any(&["COMPOSE_DEMO_PLUGIN"], false);
    info!(
        stack = %stack_path.display(),
        hold_secs,
        use_plugin,
        "starting compose runner demo"
    );

    if let Err(err) = run_compose_case(&stack_path, use_plugin, Duration::from_secs(hold_secs)).await
    {
        warn!("compose runner demo failed: {err:#}");
        std::process::exit(1);
    }
}

async fn run_compose_case(
    stack_path: &Path,
    use_plugin: bool,
    hold: Duration,
) -> anyhow::Result<()> {
    let stack = StackDescriptor::load(stack_path)
        .with_context(|| format!("loading stack descriptor {}", stack_path.display()))?;

    let program = if use_plugin {
        ComposeProgram::Plugin
    } else {
        ComposeProgram::Standalone
    };
    let probe = ProbeSettings::default().with_commands(program.probe_commands());
    let gates = Gates::new(
        check_availability(&probe, &SystemCommandRunner),
        EnvironmentOverride::default(),
    );
    let settings = ComposeSettings::default().with_program(program);

    let mut orchestrator =
        Orchestrator::for_stack(gates, settings, PollerSettings::default(), &stack)?;
    let cleanup = orchestrator.cleanup_guard();

    info!(
        services = stack.services().len(),
        project = orchestrator.control().file().project(),
        "bringing up compose stack"
    );
    if let Outcome::Skipped(reason) = orchestrator.initialize_stack(&stack).await? {
        warn!(%reason, "compose orchestration skipped; nothing to demo");
        return Ok(());
    }

    if let Some(search_dir) = env::var_os("COMPOSE_DEMO_ARTIFACT_DIR").map(PathBuf::from) {
        deploy_artifact(&search_dir)?;
    }

    info!(hold_secs = hold.as_secs(), "stack ready; holding");
    tokio::time::sleep(hold).await;

    let teardown = orchestrator.teardown_stack(&stack).await;
    drop(cleanup);
    teardown?;
    info!("compose runner demo finished");
    Ok(())
}

fn deploy_artifact(search_dir: &Path) -> anyhow::Result<()> {
    let suffix =
        env::var("COMPOSE_DEMO_ARTIFACT_SUFFIX").unwrap_or_else(|_| DEFAULT_ARTIFACT_SUFFIX.into());
    let deploy_dir = env::var_os("COMPOSE_DEMO_DEPLOY_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| env::temp_dir().join("compose-demo-webapps"));

    let deployed = ArtifactDeployer::new(&deploy_dir)
        .prepare_and_deploy(search_dir, &suffix)
        .with_context(|| format!("deploying {suffix} artifact from {}", search_dir.display()))?;
    info!(deployed = %deployed.display(), "artifact deployed");
    Ok(())
}

fn default_stack_path() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../testing-framework/assets/stack/stack.yaml")
}

fn read_env_any<T>(keys: &[&str], default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    keys.iter()
        .find_map(|key| env::var(key).ok().and_then(|raw| raw.parse::<T>().ok()))
        .unwrap_or(default)
}
