use std::{sync::Arc, time::Duration};

use futures::future::join_all;
use reqwest::Url;
use tokio::{sync::watch, task::JoinHandle, time::sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{HttpProbe, PollerSettings, ReadinessError, dedup_endpoints};

/// How a poll task ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PollOutcome {
    /// Every endpoint answered within the same iteration.
    Ready { iterations: usize },
    Cancelled,
}

/// Polls HTTP endpoints until all of them answer with a non-empty 2xx body.
pub struct ReadinessPoller<P> {
    probe: Arc<P>,
    settings: PollerSettings,
}

impl<P> Clone for ReadinessPoller<P> {
    fn clone(&self) -> Self {
        Self {
            probe: Arc::clone(&self.probe),
            settings: self.settings,
        }
    }
}

impl<P> ReadinessPoller<P>
where
    P: HttpProbe + 'static,
{
    pub fn new(probe: P, settings: PollerSettings) -> Self {
        Self {
            probe: Arc::new(probe),
            settings,
        }
    }

    #[must_use]
    pub const fn settings(&self) -> PollerSettings {
        self.settings
    }

    /// Start polling on a dedicated task. The returned handle owns the
    /// cancellation token; dropping it stops the loop.
    pub fn spawn(&self, endpoints: &[Url]) -> PollTask {
        let endpoints = dedup_endpoints(endpoints.iter().cloned());
        let token = CancellationToken::new();
        let (pending_tx, pending_rx) = watch::channel(endpoints.clone());

        let handle = tokio::spawn(poll_loop(
            Arc::clone(&self.probe),
            endpoints,
            self.settings.poll_interval,
            token.clone(),
            pending_tx,
        ));

        PollTask {
            token,
            handle,
            pending: pending_rx,
            outcome: None,
        }
    }

    /// Block until every endpoint is reachable or `timeout` elapses.
    ///
    /// An empty endpoint set succeeds immediately without spawning a task.
    pub async fn wait_until_ready(
        &self,
        endpoints: &[Url],
        timeout: Duration,
    ) -> Result<(), ReadinessError> {
        if endpoints.is_empty() {
            return Ok(());
        }

        let mut task = self.spawn(endpoints);
        task.wait(timeout).await
    }
}

/// Handle to one in-flight readiness loop.
pub struct PollTask {
    token: CancellationToken,
    handle: JoinHandle<PollOutcome>,
    pending: watch::Receiver<Vec<Url>>,
    outcome: Option<PollOutcome>,
}

impl PollTask {
    /// Ask the loop to stop. It observes this within one poll interval.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.outcome.is_some() || self.handle.is_finished()
    }

    /// Endpoints that failed in the most recently completed iteration.
    #[must_use]
    pub fn pending(&self) -> Vec<Url> {
        self.pending.borrow().clone()
    }

    /// Resolves when the loop exits. Safe to use as a `select!` branch.
    pub async fn finished(&mut self) -> PollOutcome {
        if let Some(outcome) = self.outcome {
            return outcome;
        }

        let outcome = (&mut self.handle)
            .await
            .unwrap_or(PollOutcome::Cancelled);
        self.outcome = Some(outcome);
        outcome
    }

    /// Wait for completion, cancelling the loop if `timeout` elapses first.
    pub async fn wait(&mut self, timeout: Duration) -> Result<(), ReadinessError> {
        match tokio::time::timeout(timeout, self.finished()).await {
            Ok(PollOutcome::Ready { .. }) => Ok(()),
            Ok(PollOutcome::Cancelled) => Err(ReadinessError::Cancelled),
            Err(_) => {
                let pending = self.pending();
                self.cancel_and_join().await;
                Err(ReadinessError::Timeout { timeout, pending })
            }
        }
    }

    /// Cancel and wait for the worker to release its resources.
    pub async fn cancel_and_join(&mut self) {
        self.cancel();
        self.finished().await;
    }
}

impl Drop for PollTask {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

async fn poll_loop<P>(
    probe: Arc<P>,
    endpoints: Vec<Url>,
    interval: Duration,
    token: CancellationToken,
    pending_tx: watch::Sender<Vec<Url>>,
) -> PollOutcome
where
    P: HttpProbe + ?Sized,
{
    if endpoints.is_empty() {
        return PollOutcome::Ready { iterations: 0 };
    }

    let mut iterations = 0;
    loop {
        if token.is_cancelled() {
            return PollOutcome::Cancelled;
        }
        iterations += 1;

        let checks = endpoints
            .iter()
            .map(|endpoint| endpoint_ready(probe.as_ref(), endpoint));
        let results = tokio::select! {
            biased;
            () = token.cancelled() => return PollOutcome::Cancelled,
            results = join_all(checks) => results,
        };

        let pending: Vec<Url> = endpoints
            .iter()
            .zip(results)
            .filter_map(|(endpoint, ready)| (!ready).then(|| endpoint.clone()))
            .collect();

        if pending.is_empty() {
            info!(
                target: "readiness",
                endpoints = endpoints.len(),
                iterations,
                "all endpoints reachable"
            );
            pending_tx.send_replace(Vec::new());
            return PollOutcome::Ready { iterations };
        }

        debug!(
            target: "readiness",
            ready = endpoints.len() - pending.len(),
            total = endpoints.len(),
            iterations,
            "endpoints not ready yet"
        );
        pending_tx.send_replace(pending);

        tokio::select! {
            biased;
            () = token.cancelled() => return PollOutcome::Cancelled,
            () = sleep(interval) => {}
        }
    }
}

async fn endpoint_ready<P>(probe: &P, endpoint: &Url) -> bool
where
    P: HttpProbe + ?Sized,
{
    match probe.get(endpoint).await {
        Ok(body) if !body.is_empty() => true,
        Ok(_) => {
            debug!(target: "readiness", url = %endpoint, "endpoint returned an empty body");
            false
        }
        Err(err) => {
            debug!(target: "readiness", url = %endpoint, error = %err, "endpoint not reachable");
            false
        }
    }
}
