pub mod availability;
pub mod constants;
pub mod gate;
pub mod readiness;

pub use availability::{
    AvailabilityState, CommandOutput, CommandRunner, ProbeCommand, ProbeSettings,
    SystemCommandRunner, check_availability,
};
pub use constants::adjust_timeout;
pub use gate::{EnvironmentOverride, Gates, SkipReason};
pub use readiness::{
    EndpointError, HttpProbe, PollOutcome, PollTask, PollerSettings, ProbeError, ReadinessError,
    ReadinessPoller, ReqwestProbe,
};
