//! Post-transfer verification.
//!
//! Every block the engine reports as received is looked up again, and a
//! completed pull's root must be present locally before it is announced
//! downstream as a [`RootUpdate`].

#[cfg(test)]
#[path = "tests/ingest.rs"]
mod tests;

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tessera_dag::{LinkError, LinkSystem};
use tessera_exchange::{BlockData, IncomingBlockHook, RootChanged};
use tessera_primitives::peer::PeerId;
use tessera_primitives::sync::{RootUpdate, SyncRecord};
use tessera_store::db::Column;
use tessera_store::Store;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::metrics::CoreMetrics;
use crate::NodeError;

const SYNC_KEY_PREFIX: &[u8] = b"sync/";

#[derive(Debug)]
pub struct IngestionMonitor {
    link_system: LinkSystem,
    store: Store,
    metrics: CoreMetrics,
}

impl IngestionMonitor {
    #[must_use]
    pub const fn new(link_system: LinkSystem, store: Store, metrics: CoreMetrics) -> Self {
        Self {
            link_system,
            store,
            metrics,
        }
    }

    pub fn hook(self: &Arc<Self>) -> IncomingBlockHook {
        let monitor = Arc::clone(self);

        Arc::new(move |peer_id: &PeerId, block: &BlockData| {
            monitor.on_block(peer_id, block);
        })
    }

    /// Confirms a block the engine reported as stored is actually there.
    pub fn on_block(&self, peer_id: &PeerId, block: &BlockData) {
        match self.link_system.has(&block.id) {
            Ok(true) => debug!(
                %peer_id,
                request_id = %block.request_id,
                id = %block.id,
                size = block.size,
                "block received"
            ),
            Ok(false) => {
                self.metrics.ingest_consistency_warnings.inc();

                warn!(%peer_id, id = %block.id, "received block missing from store");
            }
            Err(err) => error!(%peer_id, id = %block.id, %err, "failed to look up received block"),
        }
    }

    /// Validates a root change. `Ok(None)` means the root is absent and
    /// must be withheld.
    pub fn verify_root(&self, change: &RootChanged) -> Result<Option<RootUpdate>, LinkError> {
        if !self.link_system.has(&change.root)? {
            self.metrics.ingest_consistency_warnings.inc();

            warn!(
                peer_id = %change.peer_id,
                root = %change.root,
                "data not in receiver store"
            );

            return Ok(None);
        }

        let update = RootUpdate::new(change.peer_id, change.root);

        if let Err(err) = self.record_sync(&update) {
            error!(peer_id = %update.peer_id, %err, "failed to persist sync record");
        }

        Ok(Some(update))
    }

    /// Drains `changes`, forwarding validated roots to `updates`.
    ///
    /// Returns once upstream closes or `shutdown` fires, or with
    /// [`NodeError::OutputClosed`] if nobody listens for updates anymore.
    pub async fn run(
        &self,
        mut changes: mpsc::Receiver<RootChanged>,
        updates: mpsc::Sender<RootUpdate>,
        shutdown: CancellationToken,
    ) -> Result<(), NodeError> {
        loop {
            let change = tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                change = changes.recv() => match change {
                    Some(change) => change,
                    None => break,
                },
            };

            let update = match self.verify_root(&change) {
                Ok(Some(update)) => update,
                Ok(None) => continue,
                Err(err) => {
                    error!(peer_id = %change.peer_id, root = %change.root, %err, "failed to verify root");
                    continue;
                }
            };

            info!(peer_id = %update.peer_id, root = %update.root, "validated root update");

            if updates.send(update).await.is_err() {
                return Err(NodeError::OutputClosed);
            }

            self.metrics.ingest_root_updates.inc();
        }

        debug!("ingestion monitor stopped");

        Ok(())
    }

    pub fn latest_sync(&self, peer_id: &PeerId) -> eyre::Result<Option<SyncRecord>> {
        let Some(bytes) = self.store.get(Column::Meta, &sync_key(peer_id))? else {
            return Ok(None);
        };

        Ok(Some(borsh::from_slice(&bytes)?))
    }

    fn record_sync(&self, update: &RootUpdate) -> eyre::Result<()> {
        let verified_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| elapsed.as_secs());

        let record = SyncRecord::new(update.root, verified_at);

        self.store.put(
            Column::Meta,
            &sync_key(&update.peer_id),
            &borsh::to_vec(&record)?,
        )
    }
}

fn sync_key(peer_id: &PeerId) -> Vec<u8> {
    let mut key = SYNC_KEY_PREFIX.to_vec();
    key.extend_from_slice(&peer_id.to_bytes());
    key
}
