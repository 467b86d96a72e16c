use std::time::Duration;

use reqwest::Url;
use testing_framework_core::{
    Gates, HttpProbe, PollOutcome, PollerSettings, ReadinessPoller, ReqwestProbe, SkipReason,
    readiness::{dedup_endpoints, parse_endpoints},
};
use tokio::time::{Instant, MissedTickBehavior, interval, sleep_until};
use tracing::{debug, info, warn};

use crate::{
    descriptor::StackDescriptor,
    docker::ComposeSettings,
    errors::{ComposeRunnerError, StartupFailure, TeardownFailure},
    lifecycle::{ComposeControl, ComposeLifecycleManager, cleanup::ComposeCleanup},
};

/// Result of an orchestration call that did not fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// A gate asked to skip; nothing was executed.
    Skipped(SkipReason),
    Completed,
}

impl Outcome {
    #[must_use]
    pub const fn is_skipped(self) -> bool {
        matches!(self, Self::Skipped(_))
    }
}

/// The initialize/teardown pair a test suite calls around its workload.
pub struct Orchestrator<C, P> {
    gates: Gates,
    control: C,
    poller: ReadinessPoller<P>,
}

impl Orchestrator<ComposeLifecycleManager, ReqwestProbe> {
    /// Orchestrator for a stack descriptor using the real compose tooling
    /// and HTTP client.
    pub fn for_stack(
        gates: Gates,
        settings: ComposeSettings,
        poller_settings: PollerSettings,
        stack: &StackDescriptor,
    ) -> Result<Self, ComposeRunnerError> {
        let control = ComposeLifecycleManager::new(settings, stack.compose_file());
        let probe = ReqwestProbe::new(poller_settings.request_timeout)?;
        Ok(Self::new(
            gates,
            control,
            ReadinessPoller::new(probe, poller_settings),
        ))
    }
}

impl<P> Orchestrator<ComposeLifecycleManager, P> {
    /// Guard that runs `compose down --volumes` for the project on drop.
    ///
    /// Comes back disarmed when a gate skips the run, so a skipped suite
    /// never touches docker.
    #[must_use]
    pub fn cleanup_guard(&self) -> ComposeCleanup {
        let mut guard = self.control.cleanup_guard();
        if let Some(reason) = self.gates.skip_reason() {
            debug!(%reason, "compose cleanup disarmed");
            guard.disarm();
        }
        guard
    }
}

impl<C, P> Orchestrator<C, P>
where
    C: ComposeControl,
    P: HttpProbe + 'static,
{
    pub const fn new(gates: Gates, control: C, poller: ReadinessPoller<P>) -> Self {
        Self {
            gates,
            control,
            poller,
        }
    }

    #[must_use]
    pub const fn gates(&self) -> &Gates {
        &self.gates
    }

    #[must_use]
    pub const fn control(&self) -> &C {
        &self.control
    }

    pub const fn control_mut(&mut self) -> &mut C {
        &mut self.control
    }

    /// Start compose and wait until every endpoint answers.
    ///
    /// On failure the compose process is released and its logs are dumped
    /// before the error is returned.
    pub async fn initialize(
        &mut self,
        endpoints: &[Url],
        timeout: Duration,
    ) -> Result<Outcome, ComposeRunnerError> {
        if let Some(reason) = self.gates.skip_reason() {
            info!(%reason, "skipping compose initialization");
            return Ok(Outcome::Skipped(reason));
        }

        self.control
            .start()
            .map_err(|source| StartupFailure::Spawn { source })?;

        let started = Instant::now();
        match self.await_readiness(endpoints, timeout).await {
            Ok(()) => {
                info!(
                    endpoints = endpoints.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "compose stack ready"
                );
                Ok(Outcome::Completed)
            }
            Err(failure) => {
                warn!(reason = failure.label(), error = %failure, "compose startup failed");
                self.control.dump_logs().await;
                self.control.release().await;
                Err(failure.into())
            }
        }
    }

    /// Same as [`Self::initialize`] for endpoints given as strings or bare
    /// ports.
    pub async fn initialize_raw<S>(
        &mut self,
        endpoints: &[S],
        timeout: Duration,
    ) -> Result<Outcome, ComposeRunnerError>
    where
        S: AsRef<str>,
    {
        if let Some(reason) = self.gates.skip_reason() {
            info!(%reason, "skipping compose initialization");
            return Ok(Outcome::Skipped(reason));
        }

        let endpoints = parse_endpoints(endpoints)?;
        self.initialize(&endpoints, timeout).await
    }

    pub async fn initialize_stack(
        &mut self,
        stack: &StackDescriptor,
    ) -> Result<Outcome, ComposeRunnerError> {
        self.initialize(&stack.endpoints(), stack.readiness_timeout())
            .await
    }

    /// Stop one service. Failures are returned, never swallowed.
    pub async fn teardown(&mut self, service: &str) -> Result<Outcome, ComposeRunnerError> {
        if let Some(reason) = self.gates.skip_reason() {
            info!(%reason, service, "skipping compose teardown");
            return Ok(Outcome::Skipped(reason));
        }

        self.control
            .stop(service)
            .await
            .map_err(|source| TeardownFailure {
                service: service.to_owned(),
                source,
            })?;
        Ok(Outcome::Completed)
    }

    /// Stop every service in reverse declaration order. All stops are
    /// attempted; the first failure is returned.
    pub async fn teardown_stack(
        &mut self,
        stack: &StackDescriptor,
    ) -> Result<Outcome, ComposeRunnerError> {
        if let Some(reason) = self.gates.skip_reason() {
            info!(%reason, "skipping compose teardown");
            return Ok(Outcome::Skipped(reason));
        }

        let mut first_error = None;
        let services: Vec<&str> = stack.service_names().collect();
        for service in services.into_iter().rev() {
            if let Err(err) = self.teardown(service).await {
                warn!(service, error = %err, "failed to stop compose service");
                first_error.get_or_insert(err);
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(Outcome::Completed),
        }
    }

    async fn await_readiness(
        &mut self,
        endpoints: &[Url],
        timeout: Duration,
    ) -> Result<(), StartupFailure> {
        let endpoints = dedup_endpoints(endpoints.iter().cloned());
        if endpoints.is_empty() {
            return Ok(());
        }

        let mut task = self.poller.spawn(&endpoints);
        let deadline = sleep_until(Instant::now() + timeout);
        tokio::pin!(deadline);
        let mut liveness = interval(self.poller.settings().poll_interval);
        liveness.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let result = loop {
            tokio::select! {
                biased;
                outcome = task.finished() => {
                    break match outcome {
                        PollOutcome::Ready { .. } => Ok(()),
                        PollOutcome::Cancelled => Err(StartupFailure::ReadinessCancelled),
                    };
                }
                _ = liveness.tick() => {
                    if !self.control.is_alive() {
                        break Err(StartupFailure::ProcessExited {
                            code: self.control.exit_code(),
                            output: self.control.recent_output(),
                        });
                    }
                }
                () = &mut deadline => {
                    break Err(StartupFailure::ReadinessTimeout {
                        timeout,
                        pending: task.pending(),
                    });
                }
            }
        };

        task.cancel_and_join().await;
        result
    }
}
