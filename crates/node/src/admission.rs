//! Admission control for outgoing pull requests.
//!
//! The gate runs inside the exchange engine's outgoing-request hook. A
//! request that finds tokens in both the global and its peer's bucket
//! proceeds untouched. Otherwise the gate hands the request to a spawned
//! task that pauses it and re-checks both buckets every `retry_interval`
//! until they admit it, the request is torn down, or the gate shuts down.

#[cfg(test)]
#[path = "tests/admission.rs"]
mod tests;

use core::time::Duration;
use std::sync::Arc;

use governor::clock::{Clock, DefaultClock};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use tessera_exchange::{Exchange, ExchangeError, OutgoingRequestHook, RequestData, RequestId};
use tessera_primitives::peer::PeerId;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use crate::config::DEFAULT_RETRY_INTERVAL;
use crate::limiter::{PeerLimiter, PeerRateLimiter};
use crate::metrics::CoreMetrics;
use crate::registry::classify;

/// What to do with a request that fails admission.
#[derive(
    AsRefStr,
    Clone,
    Copy,
    Debug,
    Default,
    Deserialize,
    Display,
    EnumString,
    Eq,
    PartialEq,
    Serialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ThrottleAction {
    /// Pause and resume once tokens are available.
    #[default]
    Pause,
    /// Cancel outright.
    Cancel,
}

/// Outcome of the synchronous admission check.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Admission {
    Allowed,
    Throttled,
}

pub struct AdmissionGate<C: Clock = DefaultClock> {
    exchange: Arc<dyn Exchange>,
    limiter: Arc<PeerRateLimiter<C>>,
    metrics: CoreMetrics,
    retry_interval: Duration,
    action: ThrottleAction,
    shutdown: CancellationToken,
    tasks: TaskTracker,
}

impl<C> AdmissionGate<C>
where
    C: Clock + Send + Sync + 'static,
    C::Instant: Send + Sync,
{
    pub fn new(
        exchange: Arc<dyn Exchange>,
        limiter: Arc<PeerRateLimiter<C>>,
        metrics: CoreMetrics,
    ) -> Self {
        Self {
            exchange,
            limiter,
            metrics,
            retry_interval: DEFAULT_RETRY_INTERVAL,
            action: ThrottleAction::default(),
            shutdown: CancellationToken::new(),
            tasks: TaskTracker::new(),
        }
    }

    #[must_use]
    pub const fn with_retry_interval(mut self, retry_interval: Duration) -> Self {
        self.retry_interval = retry_interval;
        self
    }

    #[must_use]
    pub const fn with_throttle_action(mut self, action: ThrottleAction) -> Self {
        self.action = action;
        self
    }

    pub const fn limiter(&self) -> &Arc<PeerRateLimiter<C>> {
        &self.limiter
    }

    /// Wraps the gate as an exchange hook.
    pub fn hook(self: &Arc<Self>) -> OutgoingRequestHook {
        let gate = Arc::clone(self);

        Arc::new(move |peer_id: &PeerId, request: &RequestData| {
            let _admission = gate.admit(peer_id, request);
        })
    }

    /// Checks `request` against the buckets. Never blocks; a throttled
    /// request is handed to a background task before this returns.
    pub fn admit(&self, peer_id: &PeerId, request: &RequestData) -> Admission {
        let peer = self.limiter.peer_limiter(peer_id).unwrap_or_else(|| {
            let classification = classify(&*self.limiter.config().registry, peer_id);

            self.limiter.peer_limiter_or_insert(&classification)
        });

        debug!(
            %peer_id,
            request_id = %request.id,
            rate = peer.limit(),
            burst = peer.burst(),
            "checking admission"
        );

        if self.limiter.allow() && peer.allow() {
            self.metrics.admission_allowed.inc();

            debug!(%peer_id, request_id = %request.id, "request allowed");

            return Admission::Allowed;
        }

        self.metrics.admission_throttled.inc();

        warn!(
            %peer_id,
            request_id = %request.id,
            action = %self.action,
            "request throttled by rate limit policy"
        );

        match self.action {
            ThrottleAction::Pause => self.spawn_retry(request, peer),
            ThrottleAction::Cancel => self.spawn_cancel(request.id),
        }

        Admission::Throttled
    }

    fn spawn_retry(&self, request: &RequestData, peer: Arc<PeerLimiter<C>>) {
        let id = request.id;
        let cancellation = request.cancellation.clone();
        let exchange = Arc::clone(&self.exchange);
        let limiter = Arc::clone(&self.limiter);
        let metrics = self.metrics.clone();
        let shutdown = self.shutdown.clone();
        let interval = self.retry_interval;

        drop(self.tasks.spawn(async move {
            if let Err(err) = exchange.pause_request(id).await {
                warn!(request_id = %id, %err, "pause request failed");
            }

            loop {
                tokio::select! {
                    biased;
                    () = shutdown.cancelled() => {
                        debug!(request_id = %id, "gate shut down, abandoning paused request");
                        return;
                    }
                    () = cancellation.cancelled() => {
                        debug!(request_id = %id, "request torn down while paused");
                        return;
                    }
                    () = time::sleep(interval) => {}
                }

                if limiter.allow() && peer.allow() {
                    break;
                }
            }

            metrics.admission_resumed.inc();

            match exchange.unpause_request(id).await {
                Ok(()) => debug!(request_id = %id, "request unpaused"),
                Err(err) => warn!(request_id = %id, %err, "unpause request failed"),
            }
        }));
    }

    fn spawn_cancel(&self, id: RequestId) {
        let exchange = Arc::clone(&self.exchange);

        drop(self.tasks.spawn(async move {
            match exchange.cancel_request(id).await {
                Ok(()) => debug!(request_id = %id, "request cancelled"),
                Err(err) => warn!(request_id = %id, %err, "cancel request failed"),
            }
        }));
    }

    /// Cancels an in-flight request through the engine.
    pub async fn cancel(&self, id: RequestId) -> Result<(), ExchangeError> {
        self.exchange.cancel_request(id).await
    }

    /// Number of throttled requests still being handled.
    pub fn pending(&self) -> usize {
        self.tasks.len()
    }

    /// Stops all retry loops. Paused requests stay paused.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        let _ignored = self.tasks.close();
    }

    pub async fn wait(&self) {
        self.tasks.wait().await;
    }
}

impl<C: Clock> core::fmt::Debug for AdmissionGate<C> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AdmissionGate")
            .field("limiter", &self.limiter)
            .field("retry_interval", &self.retry_interval)
            .field("action", &self.action)
            .field("pending", &self.tasks.len())
            .finish_non_exhaustive()
    }
}
