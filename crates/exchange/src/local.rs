//! An in-process exchange engine.
//!
//! Peers join a shared [`LocalNetwork`]. Publishing a root on a topic makes
//! every other subscriber of that topic pull the DAG from the publisher's
//! link system, block by block, honouring pause and cancel between blocks.

#[cfg(test)]
#[path = "tests/local.rs"]
mod tests;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use tessera_dag::LinkSystem;
use tessera_primitives::content::ContentId;
use tessera_primitives::peer::PeerId;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::{
    BlockData, Exchange, ExchangeError, HookHandle, Hooks, IncomingBlockHook,
    OutgoingRequestHook, RequestData, RequestId, RootChanged,
};

pub const DEFAULT_ROOT_CHANGES_CAPACITY: usize = 64;

/// The set of peers reachable from one another.
#[derive(Clone, Debug, Default)]
pub struct LocalNetwork {
    peers: Arc<DashMap<PeerId, Arc<Shared>>>,
}

impl LocalNetwork {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a peer serving and storing blocks through `link_system`.
    pub fn join(&self, peer_id: PeerId, link_system: LinkSystem) -> LocalExchange {
        let (root_tx, root_rx) = mpsc::channel(DEFAULT_ROOT_CHANGES_CAPACITY);

        let shared = Arc::new(Shared {
            peer_id,
            link_system,
            topics: DashSet::new(),
            requests: DashMap::new(),
            next_request: AtomicU64::new(0),
            outgoing_hooks: Arc::default(),
            block_hooks: Arc::default(),
            root_tx,
            root_rx: Mutex::new(Some(root_rx)),
        });

        if self.peers.insert(peer_id, Arc::clone(&shared)).is_some() {
            warn!(%peer_id, "peer rejoined the network, replacing previous exchange");
        }

        LocalExchange {
            network: self.clone(),
            shared,
        }
    }

    pub fn leave(&self, peer_id: &PeerId) {
        drop(self.peers.remove(peer_id));
    }

    fn subscribers(&self, topic: &str, except: &PeerId) -> Vec<Arc<Shared>> {
        self.peers
            .iter()
            .filter(|entry| entry.key() != except && entry.value().topics.contains(topic))
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }
}

struct Shared {
    peer_id: PeerId,
    link_system: LinkSystem,
    topics: DashSet<String>,
    requests: DashMap<RequestId, RequestEntry>,
    next_request: AtomicU64,
    outgoing_hooks: Arc<Hooks<dyn Fn(&PeerId, &RequestData) + Send + Sync>>,
    block_hooks: Arc<Hooks<dyn Fn(&PeerId, &BlockData) + Send + Sync>>,
    root_tx: mpsc::Sender<RootChanged>,
    root_rx: Mutex<Option<mpsc::Receiver<RootChanged>>>,
}

impl core::fmt::Debug for Shared {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Shared")
            .field("peer_id", &self.peer_id)
            .field("in_flight", &self.requests.len())
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
struct RequestEntry {
    peer_id: PeerId,
    paused: watch::Sender<bool>,
    cancellation: CancellationToken,
}

/// One peer's handle onto a [`LocalNetwork`].
#[derive(Clone, Debug)]
pub struct LocalExchange {
    network: LocalNetwork,
    shared: Arc<Shared>,
}

impl LocalExchange {
    #[must_use]
    pub fn peer_id(&self) -> PeerId {
        self.shared.peer_id
    }

    #[must_use]
    pub fn link_system(&self) -> &LinkSystem {
        &self.shared.link_system
    }

    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.shared.requests.len()
    }

    #[must_use]
    pub fn is_paused(&self, id: RequestId) -> Option<bool> {
        self.shared
            .requests
            .get(&id)
            .map(|entry| *entry.paused.borrow())
    }

    /// Announces `root` on `topic`. Every other subscriber starts pulling
    /// it from this peer; returns how many were notified.
    pub fn publish(&self, topic: &str, root: ContentId) -> usize {
        let publisher = self.shared.peer_id;
        let subscribers = self.network.subscribers(topic, &publisher);

        info!(%publisher, %root, topic, subscribers = subscribers.len(), "announcing new root");

        for subscriber in &subscribers {
            let pull = Pull {
                local: Arc::clone(subscriber),
                remote: Arc::clone(&self.shared),
                root,
            };

            drop(tokio::spawn(pull.run()));
        }

        subscribers.len()
    }
}

#[async_trait]
impl Exchange for LocalExchange {
    fn register_outgoing_request_hook(&self, hook: OutgoingRequestHook) -> HookHandle {
        self.shared.outgoing_hooks.register(hook)
    }

    fn register_incoming_block_hook(&self, hook: IncomingBlockHook) -> HookHandle {
        self.shared.block_hooks.register(hook)
    }

    async fn pause_request(&self, id: RequestId) -> Result<(), ExchangeError> {
        let entry = self
            .shared
            .requests
            .get(&id)
            .ok_or(ExchangeError::UnknownRequest(id))?;

        trace!(request_id = %id, peer_id = %entry.peer_id, "pausing request");

        let _ignored = entry.paused.send_replace(true);

        Ok(())
    }

    async fn unpause_request(&self, id: RequestId) -> Result<(), ExchangeError> {
        let entry = self
            .shared
            .requests
            .get(&id)
            .ok_or(ExchangeError::UnknownRequest(id))?;

        trace!(request_id = %id, peer_id = %entry.peer_id, "resuming request");

        let _ignored = entry.paused.send_replace(false);

        Ok(())
    }

    async fn cancel_request(&self, id: RequestId) -> Result<(), ExchangeError> {
        let entry = self
            .shared
            .requests
            .get(&id)
            .ok_or(ExchangeError::UnknownRequest(id))?;

        entry.cancellation.cancel();

        Ok(())
    }

    fn root_changes(&self) -> Option<mpsc::Receiver<RootChanged>> {
        self.shared
            .root_rx
            .lock()
            .ok()
            .and_then(|mut receiver| receiver.take())
    }

    async fn subscribe(&self, topic: &str) -> Result<(), ExchangeError> {
        if !self.network.peers.contains_key(&self.shared.peer_id) {
            return Err(ExchangeError::Detached);
        }

        if self.shared.topics.insert(topic.to_owned()) {
            debug!(peer_id = %self.shared.peer_id, topic, "subscribed");
        }

        Ok(())
    }
}

/// A single pull of `root` by `local` from `remote`.
struct Pull {
    local: Arc<Shared>,
    remote: Arc<Shared>,
    root: ContentId,
}

impl Pull {
    async fn run(self) {
        let peer_id = self.remote.peer_id;
        let id = RequestId::new(self.local.next_request.fetch_add(1, Ordering::Relaxed));

        let cancellation = CancellationToken::new();
        let (paused, mut resumed) = watch::channel(false);

        drop(self.local.requests.insert(
            id,
            RequestEntry {
                peer_id,
                paused,
                cancellation: cancellation.clone(),
            },
        ));

        let request = RequestData::new(id, self.root, cancellation.clone());

        for hook in self.local.outgoing_hooks.snapshot() {
            hook(&peer_id, &request);
        }

        // let hooks that defer work get it scheduled before the first block
        tokio::task::yield_now().await;

        let outcome = self.fetch(id, &cancellation, &mut resumed).await;

        drop(self.local.requests.remove(&id));
        cancellation.cancel();

        match outcome {
            Ok(true) => {
                debug!(request_id = %id, %peer_id, root = %self.root, "pull complete");

                let change = RootChanged {
                    peer_id,
                    root: self.root,
                };

                if self.local.root_tx.send(change).await.is_err() {
                    warn!(request_id = %id, "root change dropped, no listener");
                }
            }
            Ok(false) => debug!(request_id = %id, %peer_id, "pull cancelled"),
            Err(err) => warn!(request_id = %id, %peer_id, %err, "pull failed"),
        }
    }

    /// Copies every block of the DAG the local store lacks, parents first.
    /// Returns `Ok(false)` if the request was cancelled midway.
    async fn fetch(
        &self,
        id: RequestId,
        cancellation: &CancellationToken,
        resumed: &mut watch::Receiver<bool>,
    ) -> Result<bool, ExchangeError> {
        let remote = &self.remote.link_system;

        let missing = self
            .local
            .link_system
            .missing(&self.root, |cid| remote.load_node(cid).ok())?;

        trace!(request_id = %id, root = %self.root, blocks = missing.len(), "planned pull");

        for cid in missing {
            if !wait_resumed(cancellation, resumed).await {
                return Ok(false);
            }

            self.transfer(id, cid)?;
        }

        Ok(true)
    }

    fn transfer(&self, request_id: RequestId, cid: ContentId) -> Result<(), ExchangeError> {
        let bytes = self.remote.link_system.read(&cid)?.into_bytes();

        if ContentId::of(&bytes) != cid {
            return Err(ExchangeError::Corrupt(cid));
        }

        let mut writer = self.local.link_system.open_write();
        writer.set_bytes(&bytes);
        writer.commit(cid)?;

        let block = BlockData::new(request_id, cid, bytes.len());

        for hook in self.local.block_hooks.snapshot() {
            hook(&self.remote.peer_id, &block);
        }

        Ok(())
    }
}

/// Waits until the request is not paused. `false` if it was cancelled.
async fn wait_resumed(
    cancellation: &CancellationToken,
    resumed: &mut watch::Receiver<bool>,
) -> bool {
    tokio::select! {
        biased;
        () = cancellation.cancelled() => false,
        res = resumed.wait_for(|paused| !paused) => res.is_ok(),
    }
}
