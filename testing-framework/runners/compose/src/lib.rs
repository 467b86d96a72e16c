pub mod descriptor;
pub mod docker;
pub mod errors;
pub mod lifecycle;
pub mod orchestrator;

pub use descriptor::{DescriptorError, ServiceDescriptor, StackDescriptor};
pub use docker::{
    ComposeFile, ComposeProgram, ComposeSettings,
    commands::{ComposeCommandError, compose_down, compose_stop, dump_compose_logs},
    process::ComposeProcessHandle,
};
pub use errors::{ComposeRunnerError, StartupFailure, TeardownFailure};
pub use lifecycle::{ComposeControl, ComposeLifecycleManager, cleanup::ComposeCleanup};
pub use orchestrator::{Orchestrator, Outcome};
