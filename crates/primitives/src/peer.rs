use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

pub use libp2p_identity::PeerId;

/// Trust classification of a peer, governing its allotted transfer rate.
#[derive(
    AsRefStr,
    Clone,
    Copy,
    Debug,
    Deserialize,
    Display,
    EnumString,
    Eq,
    Hash,
    PartialEq,
    Serialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Tier {
    Unregistered,
    Whitelisted,
    Registered,
}

/// A peer's tier and account level as reported by the classification registry.
///
/// `account_level` is only meaningful for [`Tier::Registered`] peers.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub struct PeerClassification {
    pub peer_id: PeerId,
    pub tier: Tier,
    pub account_level: u32,
}

impl PeerClassification {
    #[must_use]
    pub const fn new(peer_id: PeerId, tier: Tier, account_level: u32) -> Self {
        Self {
            peer_id,
            tier,
            account_level,
        }
    }

    /// The lowest-trust classification, used when a peer cannot be classified.
    #[must_use]
    pub const fn unregistered(peer_id: PeerId) -> Self {
        Self::new(peer_id, Tier::Unregistered, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_string_forms() {
        assert_eq!(Tier::Whitelisted.to_string(), "whitelisted");
        assert_eq!("registered".parse::<Tier>().unwrap(), Tier::Registered);
        assert_eq!(
            serde_json::to_string(&Tier::Unregistered).unwrap(),
            "\"unregistered\""
        );
    }

    #[test]
    fn test_unregistered_fallback() {
        let peer_id = PeerId::random();

        let classification = PeerClassification::unregistered(peer_id);

        assert_eq!(classification.peer_id, peer_id);
        assert_eq!(classification.tier, Tier::Unregistered);
        assert_eq!(classification.account_level, 0);
    }
}
