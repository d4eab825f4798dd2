use std::collections::{HashMap, HashSet};

use tessera_primitives::peer::{PeerClassification, PeerId, Tier};
use tracing::warn;

/// Source of peer trust classifications.
///
/// Implementations are consulted on the request path and should answer
/// from local state.
pub trait PeerRegistry: Send + Sync {
    fn classify_peer(&self, peer_id: &PeerId) -> eyre::Result<(Tier, u32)>;

    /// Number of account levels a registered peer can hold.
    fn account_level_count(&self) -> u32;
}

/// Classifies `peer_id`, treating a registry failure as [`Tier::Unregistered`].
pub fn classify(registry: &dyn PeerRegistry, peer_id: &PeerId) -> PeerClassification {
    match registry.classify_peer(peer_id) {
        Ok((tier, account_level)) => PeerClassification::new(*peer_id, tier, account_level),
        Err(err) => {
            warn!(%peer_id, %err, "peer classification failed, treating as unregistered");

            PeerClassification::unregistered(*peer_id)
        }
    }
}

/// A registry backed by fixed peer lists.
#[derive(Clone, Debug, Default)]
pub struct StaticRegistry {
    level_count: u32,
    whitelisted: HashSet<PeerId>,
    registered: HashMap<PeerId, u32>,
}

impl StaticRegistry {
    #[must_use]
    pub fn new(level_count: u32) -> Self {
        Self {
            level_count,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_whitelisted(mut self, peer_id: PeerId) -> Self {
        let _ignored = self.whitelisted.insert(peer_id);
        self
    }

    #[must_use]
    pub fn with_registered(mut self, peer_id: PeerId, account_level: u32) -> Self {
        let _ignored = self.registered.insert(peer_id, account_level);
        self
    }
}

impl PeerRegistry for StaticRegistry {
    fn classify_peer(&self, peer_id: &PeerId) -> eyre::Result<(Tier, u32)> {
        if let Some(level) = self.registered.get(peer_id) {
            return Ok((Tier::Registered, *level));
        }

        if self.whitelisted.contains(peer_id) {
            return Ok((Tier::Whitelisted, 0));
        }

        Ok((Tier::Unregistered, 0))
    }

    fn account_level_count(&self) -> u32 {
        self.level_count
    }
}
