use borsh::{BorshDeserialize, BorshSerialize};

use crate::content::ContentId;
use crate::peer::PeerId;

/// A peer's DAG head that has been fetched and verified present locally.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub struct RootUpdate {
    pub peer_id: PeerId,
    pub root: ContentId,
}

impl RootUpdate {
    #[must_use]
    pub const fn new(peer_id: PeerId, root: ContentId) -> Self {
        Self { peer_id, root }
    }
}

/// Latest verified root of a peer, persisted alongside the blocks.
#[derive(BorshDeserialize, BorshSerialize, Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub struct SyncRecord {
    pub root: ContentId,
    /// Unix timestamp (seconds) of the verification.
    pub verified_at: u64,
}

impl SyncRecord {
    #[must_use]
    pub const fn new(root: ContentId, verified_at: u64) -> Self {
        Self { root, verified_at }
    }
}
