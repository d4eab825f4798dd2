//! Tiered token-bucket rate limiting for outgoing pull requests.
//!
//! A [`PeerRateLimiter`] owns one process-wide bucket plus a lazily
//! populated bucket per peer. Peer rates derive from the peer's [`Tier`]:
//!
//! | tier         | rate                                   |
//! |--------------|----------------------------------------|
//! | unregistered | 0.1 × base                             |
//! | whitelisted  | 0.5 × base                             |
//! | registered   | min(level / level count, 1) × 0.4 × base |
//!
//! Buckets follow GCRA semantics: a rate `r` replenishes one token every
//! `1/r` seconds and holds at most `max(floor(r), 1)` tokens. A zero rate
//! never admits.

#[cfg(test)]
#[path = "tests/limiter.rs"]
mod tests;

use core::fmt;
use core::num::NonZeroU32;
use core::time::Duration;
use std::sync::Arc;

use dashmap::DashMap;
use governor::clock::{Clock, DefaultClock};
use governor::middleware::NoOpMiddleware;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use tessera_primitives::peer::{PeerClassification, PeerId, Tier};
use tracing::debug;

use crate::registry::PeerRegistry;

pub const UNREGISTERED_SHARE: f64 = 0.1;
pub const WHITELISTED_SHARE: f64 = 0.5;
pub const REGISTERED_SHARE: f64 = 0.4;

/// How a registered peer's account level is turned into a weight.
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
pub enum RegisteredRateMode {
    /// `level / level_count` as a real number.
    #[default]
    Proportional,
    /// `level / level_count` in integer arithmetic, zero below the top level.
    IntegerFloor,
}

/// Token rate (tokens per second) allotted to a peer.
#[must_use]
pub fn token_rate(
    tier: Tier,
    account_level: u32,
    level_count: u32,
    base_token_rate: f64,
    mode: RegisteredRateMode,
) -> f64 {
    match tier {
        Tier::Unregistered => UNREGISTERED_SHARE * base_token_rate,
        Tier::Whitelisted => WHITELISTED_SHARE * base_token_rate,
        Tier::Registered if level_count == 0 => UNREGISTERED_SHARE * base_token_rate,
        Tier::Registered => {
            let weight = match mode {
                RegisteredRateMode::Proportional => {
                    f64::from(account_level) / f64::from(level_count)
                }
                RegisteredRateMode::IntegerFloor => f64::from(account_level / level_count),
            };

            weight.min(1.0) * REGISTERED_SHARE * base_token_rate
        }
    }
}

#[derive(Clone)]
pub struct RateLimiterConfig {
    pub base_token_rate: f64,
    pub global_total_rate: f64,
    pub global_burst: u32,
    pub registered_rate_mode: RegisteredRateMode,
    pub registry: Arc<dyn PeerRegistry>,
}

impl fmt::Debug for RateLimiterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiterConfig")
            .field("base_token_rate", &self.base_token_rate)
            .field("global_total_rate", &self.global_total_rate)
            .field("global_burst", &self.global_burst)
            .field("registered_rate_mode", &self.registered_rate_mode)
            .finish_non_exhaustive()
    }
}

type Gcra<C> = RateLimiter<NotKeyed, InMemoryState, C, NoOpMiddleware<<C as Clock>::Instant>>;

/// A single token bucket with a reported rate and burst.
pub struct TokenBucket<C: Clock = DefaultClock> {
    rate: f64,
    burst: u32,
    inner: Option<Gcra<C>>,
}

impl<C: Clock> TokenBucket<C> {
    fn new(rate: f64, burst: u32, clock: &C) -> Self {
        let inner = quota(rate, burst).map(|quota| RateLimiter::direct_with_clock(quota, clock));

        Self { rate, burst, inner }
    }

    /// Takes one token if one is available. Never blocks.
    pub fn allow(&self) -> bool {
        self.inner
            .as_ref()
            .is_some_and(|limiter| limiter.check().is_ok())
    }

    /// Tokens per second.
    pub const fn limit(&self) -> f64 {
        self.rate
    }

    pub const fn burst(&self) -> u32 {
        self.burst
    }
}

impl<C: Clock> fmt::Debug for TokenBucket<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenBucket")
            .field("rate", &self.rate)
            .field("burst", &self.burst)
            .finish_non_exhaustive()
    }
}

fn quota(rate: f64, burst: u32) -> Option<Quota> {
    if !rate.is_finite() || rate <= 0.0 {
        return None;
    }

    let period = Duration::try_from_secs_f64(rate.recip()).ok()?;
    let period = period.max(Duration::from_nanos(1));

    let capacity = NonZeroU32::new(burst.max(1))?;

    Some(Quota::with_period(period)?.allow_burst(capacity))
}

/// Whole tokens of a rate, the reported burst of a peer bucket.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    reason = "float to int casts saturate"
)]
fn floor_burst(rate: f64) -> u32 {
    rate.floor() as u32
}

pub struct PeerLimiter<C: Clock = DefaultClock> {
    peer_id: PeerId,
    bucket: TokenBucket<C>,
}

impl<C: Clock> PeerLimiter<C> {
    pub const fn peer_id(&self) -> &PeerId {
        &self.peer_id
    }

    pub fn allow(&self) -> bool {
        self.bucket.allow()
    }

    pub const fn limit(&self) -> f64 {
        self.bucket.limit()
    }

    pub const fn burst(&self) -> u32 {
        self.bucket.burst()
    }
}

impl<C: Clock> fmt::Debug for PeerLimiter<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerLimiter")
            .field("peer_id", &self.peer_id)
            .field("bucket", &self.bucket)
            .finish()
    }
}

/// Global plus per-peer admission buckets.
pub struct PeerRateLimiter<C: Clock = DefaultClock> {
    config: RateLimiterConfig,
    clock: C,
    global: TokenBucket<C>,
    peers: DashMap<PeerId, Arc<PeerLimiter<C>>>,
}

impl PeerRateLimiter {
    #[must_use]
    pub fn new(config: RateLimiterConfig) -> Self {
        Self::with_clock(config, DefaultClock::default())
    }
}

impl<C: Clock> PeerRateLimiter<C> {
    pub fn with_clock(config: RateLimiterConfig, clock: C) -> Self {
        let global = TokenBucket::new(config.global_total_rate, config.global_burst, &clock);

        Self {
            config,
            clock,
            global,
            peers: DashMap::new(),
        }
    }

    pub const fn config(&self) -> &RateLimiterConfig {
        &self.config
    }

    pub const fn global(&self) -> &TokenBucket<C> {
        &self.global
    }

    /// Takes one token from the global bucket.
    pub fn allow(&self) -> bool {
        self.global.allow()
    }

    pub fn peer_limiter(&self, peer_id: &PeerId) -> Option<Arc<PeerLimiter<C>>> {
        self.peers.get(peer_id).map(|entry| Arc::clone(entry.value()))
    }

    /// Rate a peer of this classification would be allotted.
    pub fn token_rate(&self, tier: Tier, account_level: u32) -> f64 {
        token_rate(
            tier,
            account_level,
            self.config.registry.account_level_count(),
            self.config.base_token_rate,
            self.config.registered_rate_mode,
        )
    }

    /// Installs a limiter for `peer_id` unless one exists, returning
    /// whichever instance ends up in the map.
    pub fn add_peer_limiter(
        &self,
        peer_id: PeerId,
        tier: Tier,
        account_level: u32,
    ) -> Arc<PeerLimiter<C>> {
        let rate = self.token_rate(tier, account_level);
        let burst = floor_burst(rate);

        let limiter = self.peers.entry(peer_id).or_insert_with(|| {
            debug!(%peer_id, %tier, account_level, rate, burst, "installing peer limiter");

            Arc::new(PeerLimiter {
                peer_id,
                bucket: TokenBucket::new(rate, burst, &self.clock),
            })
        });

        Arc::clone(limiter.value())
    }

    pub fn peer_limiter_or_insert(&self, peer: &PeerClassification) -> Arc<PeerLimiter<C>> {
        self.peer_limiter(&peer.peer_id).unwrap_or_else(|| {
            self.add_peer_limiter(peer.peer_id, peer.tier, peer.account_level)
        })
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }
}

impl<C: Clock> fmt::Debug for PeerRateLimiter<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerRateLimiter")
            .field("config", &self.config)
            .field("global", &self.global)
            .field("peers", &self.peers.len())
            .finish_non_exhaustive()
    }
}
