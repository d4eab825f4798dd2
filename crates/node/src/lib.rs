//! Synchronization core of a Tessera node.
//!
//! [`ExchangeCore`] wires the pieces together: rate-limited admission of
//! outgoing pulls ([`admission`], [`limiter`]), verification of what was
//! received ([`ingest`]) and a channel of validated [`RootUpdate`]s.

use std::sync::Arc;

use governor::clock::{Clock, DefaultClock};
use libp2p_identity::Keypair;
use prometheus_client::registry::Registry;
use tessera_blockstore::BlockStore;
use tessera_dag::LinkSystem;
use tessera_exchange::{Exchange, ExchangeError, HookHandle};
use tessera_primitives::peer::PeerId;
use tessera_primitives::sync::{RootUpdate, SyncRecord};
use tessera_store::Store;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::info;

pub mod admission;
pub mod config;
pub mod ingest;
pub mod limiter;
pub mod metrics;
pub mod registry;

use crate::admission::AdmissionGate;
use crate::config::CoreConfig;
use crate::ingest::IngestionMonitor;
use crate::limiter::{PeerRateLimiter, RateLimiterConfig};
use crate::metrics::CoreMetrics;
use crate::registry::PeerRegistry;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum NodeError {
    #[error("root change stream already taken from the exchange")]
    RootChangesTaken,

    #[error("root update receiver dropped")]
    OutputClosed,

    #[error(transparent)]
    Exchange(#[from] ExchangeError),

    #[error("store failure: {0}")]
    Store(eyre::Report),

    #[error("ingestion monitor panicked: {0}")]
    Monitor(#[from] JoinError),
}

pub struct ExchangeCore<C: Clock = DefaultClock> {
    identity: Keypair,
    exchange: Arc<dyn Exchange>,
    link_system: LinkSystem,
    rate_limiter: Arc<PeerRateLimiter<C>>,
    gate: Arc<AdmissionGate<C>>,
    monitor: Arc<IngestionMonitor>,
    metrics: CoreMetrics,
    hooks: Vec<HookHandle>,
    shutdown: CancellationToken,
    monitor_task: JoinHandle<Result<(), NodeError>>,
}

impl ExchangeCore {
    pub async fn start(
        identity: Keypair,
        store: Store,
        exchange: Arc<dyn Exchange>,
        registry: Arc<dyn PeerRegistry>,
        config: CoreConfig,
        metrics: &mut Registry,
    ) -> Result<(Self, mpsc::Receiver<RootUpdate>), NodeError> {
        Self::start_with_clock(
            identity,
            store,
            exchange,
            registry,
            config,
            metrics,
            DefaultClock::default(),
        )
        .await
    }
}

impl<C> ExchangeCore<C>
where
    C: Clock + Send + Sync + 'static,
    C::Instant: Send + Sync,
{
    /// Like [`ExchangeCore::start`], with the limiter buckets driven by `clock`.
    pub async fn start_with_clock(
        identity: Keypair,
        store: Store,
        exchange: Arc<dyn Exchange>,
        registry: Arc<dyn PeerRegistry>,
        config: CoreConfig,
        metrics: &mut Registry,
        clock: C,
    ) -> Result<(Self, mpsc::Receiver<RootUpdate>), NodeError> {
        let peer_id = identity.public().to_peer_id();

        info!(%peer_id, "starting exchange core");

        let Some(changes) = exchange.root_changes() else {
            return Err(NodeError::RootChangesTaken);
        };

        let metrics = CoreMetrics::new(metrics);

        let link_system = LinkSystem::new(BlockStore::new(store.clone()));

        let rate_limiter = Arc::new(PeerRateLimiter::with_clock(
            RateLimiterConfig {
                base_token_rate: config.base_token_rate,
                global_total_rate: config.global_total_rate,
                global_burst: config.global_burst,
                registered_rate_mode: config.registered_rate_mode,
                registry,
            },
            clock,
        ));

        let gate = Arc::new(
            AdmissionGate::new(
                Arc::clone(&exchange),
                Arc::clone(&rate_limiter),
                metrics.clone(),
            )
            .with_retry_interval(config.retry_interval)
            .with_throttle_action(config.throttle_action),
        );

        let monitor = Arc::new(IngestionMonitor::new(
            link_system.clone(),
            store,
            metrics.clone(),
        ));

        let hooks = vec![
            exchange.register_outgoing_request_hook(gate.hook()),
            exchange.register_incoming_block_hook(monitor.hook()),
        ];

        let (updates_tx, updates_rx) = mpsc::channel(config.output_capacity.max(1));

        let shutdown = CancellationToken::new();

        let monitor_task = tokio::spawn({
            let monitor = Arc::clone(&monitor);
            let shutdown = shutdown.clone();

            async move { monitor.run(changes, updates_tx, shutdown).await }
        });

        let core = Self {
            identity,
            exchange,
            link_system,
            rate_limiter,
            gate,
            monitor,
            metrics,
            hooks,
            shutdown,
            monitor_task,
        };

        if let Some(topic) = &config.topic {
            if let Err(err) = core.subscribe(topic).await {
                let _ignored = core.shutdown().await;

                return Err(err);
            }
        }

        Ok((core, updates_rx))
    }

    #[must_use]
    pub fn peer_id(&self) -> PeerId {
        self.identity.public().to_peer_id()
    }

    pub const fn link_system(&self) -> &LinkSystem {
        &self.link_system
    }

    pub const fn rate_limiter(&self) -> &Arc<PeerRateLimiter<C>> {
        &self.rate_limiter
    }

    pub const fn gate(&self) -> &Arc<AdmissionGate<C>> {
        &self.gate
    }

    pub const fn metrics(&self) -> &CoreMetrics {
        &self.metrics
    }

    /// The last root verified for `peer_id`, if any.
    pub fn latest_sync(&self, peer_id: &PeerId) -> Result<Option<SyncRecord>, NodeError> {
        self.monitor.latest_sync(peer_id).map_err(NodeError::Store)
    }

    pub async fn subscribe(&self, topic: &str) -> Result<(), NodeError> {
        self.exchange.subscribe(topic).await?;

        info!(peer_id = %self.peer_id(), topic, "subscribed to advertisements");

        Ok(())
    }

    /// Detaches from the exchange, stops retry loops and the monitor, and
    /// closes the root update channel.
    pub async fn shutdown(self) -> Result<(), NodeError> {
        for hook in self.hooks {
            hook.unregister();
        }

        self.gate.shutdown();
        self.shutdown.cancel();

        self.gate.wait().await;

        let result = self.monitor_task.await?;

        info!(peer_id = %self.identity.public().to_peer_id(), "exchange core stopped");

        result
    }
}

impl<C: Clock> core::fmt::Debug for ExchangeCore<C> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ExchangeCore")
            .field("peer_id", &self.identity.public().to_peer_id())
            .field("rate_limiter", &self.rate_limiter)
            .finish_non_exhaustive()
    }
}
