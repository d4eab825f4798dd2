//! The block-exchange contract the node drives.
//!
//! An [`Exchange`] pulls advertisement DAGs from peers. Each pull is a
//! request identified by [`RequestId`] that can be paused, resumed or
//! cancelled while in flight. Observers attach through synchronous hooks,
//! and completed pulls are reported as [`RootChanged`] notifications.

use core::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tessera_primitives::content::ContentId;
use tessera_primitives::peer::PeerId;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

mod hooks;
pub mod local;

pub use hooks::{HookHandle, Hooks};

/// Runs before a pull request is sent.
///
/// Hooks are invoked inline by the engine and must not block. Slow work
/// belongs in a spawned task.
pub type OutgoingRequestHook = Arc<dyn Fn(&PeerId, &RequestData) + Send + Sync>;

/// Runs after a received block has been persisted. Same contract as
/// [`OutgoingRequestHook`].
pub type IncomingBlockHook = Arc<dyn Fn(&PeerId, &BlockData) + Send + Sync>;

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct RequestId(u64);

impl RequestId {
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct RequestData {
    pub id: RequestId,
    pub root: ContentId,
    /// Fires when the engine tears the request down, whatever the reason.
    pub cancellation: CancellationToken,
}

impl RequestData {
    #[must_use]
    pub const fn new(id: RequestId, root: ContentId, cancellation: CancellationToken) -> Self {
        Self {
            id,
            root,
            cancellation,
        }
    }
}

#[derive(Clone, Copy, Debug)]
#[non_exhaustive]
pub struct BlockData {
    pub request_id: RequestId,
    pub id: ContentId,
    pub size: usize,
}

impl BlockData {
    #[must_use]
    pub const fn new(request_id: RequestId, id: ContentId, size: usize) -> Self {
        Self {
            request_id,
            id,
            size,
        }
    }
}

/// A peer's DAG was fully fetched and `root` is its new head.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RootChanged {
    pub peer_id: PeerId,
    pub root: ContentId,
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ExchangeError {
    #[error("unknown request {0}")]
    UnknownRequest(RequestId),

    #[error("not subscribed to any peer network")]
    Detached,

    #[error("block {0} failed verification")]
    Corrupt(ContentId),

    #[error(transparent)]
    Link(#[from] tessera_dag::LinkError),
}

#[async_trait]
pub trait Exchange: Send + Sync {
    fn register_outgoing_request_hook(&self, hook: OutgoingRequestHook) -> HookHandle;

    fn register_incoming_block_hook(&self, hook: IncomingBlockHook) -> HookHandle;

    async fn pause_request(&self, id: RequestId) -> Result<(), ExchangeError>;

    async fn unpause_request(&self, id: RequestId) -> Result<(), ExchangeError>;

    async fn cancel_request(&self, id: RequestId) -> Result<(), ExchangeError>;

    /// Completed-pull notifications. Yields the receiver once, `None` after.
    fn root_changes(&self) -> Option<mpsc::Receiver<RootChanged>>;

    async fn subscribe(&self, topic: &str) -> Result<(), ExchangeError>;
}
