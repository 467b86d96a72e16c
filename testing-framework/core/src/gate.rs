use std::{env, fmt};

use crate::{availability::AvailabilityState, constants::NO_DOCKER_ENV};

/// Reads the opt-out variable that points tests at an already running service.
#[derive(Clone, Debug)]
pub struct EnvironmentOverride {
    variable: String,
}

impl Default for EnvironmentOverride {
    fn default() -> Self {
        Self::new(NO_DOCKER_ENV)
    }
}

impl EnvironmentOverride {
    pub fn new(variable: impl Into<String>) -> Self {
        Self {
            variable: variable.into(),
        }
    }

    #[must_use]
    pub fn variable(&self) -> &str {
        &self.variable
    }

    /// True when the variable is set to a non-empty value. Read on every call.
    #[must_use]
    pub fn is_overridden(&self) -> bool {
        env::var_os(&self.variable).is_some_and(|value| !value.is_empty())
    }
}

/// Why an orchestration call did nothing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    ToolingUnavailable,
    EnvironmentOverride,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ToolingUnavailable => f.write_str("compose tooling unavailable"),
            Self::EnvironmentOverride => f.write_str("environment override set"),
        }
    }
}

/// Both preconditions every orchestration entry point consults.
#[derive(Clone, Debug)]
pub struct Gates {
    availability: AvailabilityState,
    env_override: EnvironmentOverride,
}

impl Gates {
    #[must_use]
    pub const fn new(availability: AvailabilityState, env_override: EnvironmentOverride) -> Self {
        Self {
            availability,
            env_override,
        }
    }

    /// Gates backed by the once-per-process tooling probe and the default
    /// override variable.
    #[must_use]
    pub fn detect() -> Self {
        Self::new(crate::availability::detect(), EnvironmentOverride::default())
    }

    #[must_use]
    pub const fn availability(&self) -> AvailabilityState {
        self.availability
    }

    #[must_use]
    pub const fn env_override(&self) -> &EnvironmentOverride {
        &self.env_override
    }

    /// Returns the first gate asking to skip, if any.
    #[must_use]
    pub fn skip_reason(&self) -> Option<SkipReason> {
        if !self.availability.is_available() {
            return Some(SkipReason::ToolingUnavailable);
        }
        if self.env_override.is_overridden() {
            return Some(SkipReason::EnvironmentOverride);
        }
        None
    }
}
