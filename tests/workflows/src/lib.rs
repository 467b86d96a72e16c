use std::path::{Path, PathBuf};

use testing_framework_core::{Gates, PollerSettings, ReqwestProbe};
use testing_framework_runner_compose::{
    ComposeLifecycleManager, ComposeRunnerError, ComposeSettings, DescriptorError, Orchestrator,
    StackDescriptor,
};

/// Path of the sample stack shipped with the framework assets.
#[must_use]
pub fn sample_stack_path() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../../testing-framework/assets/stack/stack.yaml")
}

pub fn load_sample_stack() -> Result<StackDescriptor, DescriptorError> {
    StackDescriptor::load(&sample_stack_path())
}

/// Orchestrator wired to the real compose tooling with gates detected for
/// this process.
pub fn sample_orchestrator(
    stack: &StackDescriptor,
) -> Result<Orchestrator<ComposeLifecycleManager, ReqwestProbe>, ComposeRunnerError> {
    Orchestrator::for_stack(
        Gates::detect(),
        ComposeSettings::default(),
        PollerSettings::default(),
        stack,
    )
}
