use std::sync::Arc;
use std::thread;

use governor::clock::FakeRelativeClock;

use super::*;
use crate::registry::StaticRegistry;

const EPSILON: f64 = 1e-9;

fn config(registry: StaticRegistry, base_token_rate: f64) -> RateLimiterConfig {
    RateLimiterConfig {
        base_token_rate,
        global_total_rate: 1_000_000.0,
        global_burst: 1_000_000,
        registered_rate_mode: RegisteredRateMode::Proportional,
        registry: Arc::new(registry),
    }
}

fn fake_limiter(config: RateLimiterConfig) -> (PeerRateLimiter<FakeRelativeClock>, FakeRelativeClock) {
    let clock = FakeRelativeClock::default();

    (PeerRateLimiter::with_clock(config, clock.clone()), clock)
}

// ============================================================
// Rate computation
// ============================================================

#[test]
fn test_token_rate_by_tier() {
    let mode = RegisteredRateMode::Proportional;

    assert!((token_rate(Tier::Unregistered, 0, 5, 10.0, mode) - 1.0).abs() < EPSILON);
    assert!((token_rate(Tier::Whitelisted, 0, 5, 10.0, mode) - 5.0).abs() < EPSILON);
    assert!((token_rate(Tier::Registered, 5, 5, 10.0, mode) - 4.0).abs() < EPSILON);
}

#[test]
fn test_registered_rate_modes() {
    let proportional = token_rate(Tier::Registered, 3, 5, 1.0, RegisteredRateMode::Proportional);
    let floored = token_rate(Tier::Registered, 3, 5, 1.0, RegisteredRateMode::IntegerFloor);

    assert!((proportional - 0.4 * 0.6).abs() < EPSILON);
    assert!(floored.abs() < EPSILON);

    let top = token_rate(Tier::Registered, 5, 5, 1.0, RegisteredRateMode::IntegerFloor);

    assert!((top - 0.4).abs() < EPSILON);
}

#[test]
fn test_registered_weight_is_clamped() {
    for mode in [RegisteredRateMode::Proportional, RegisteredRateMode::IntegerFloor] {
        let rate = token_rate(Tier::Registered, 12, 4, 1.0, mode);

        assert!((rate - 0.4).abs() < EPSILON, "{mode}: {rate}");
    }
}

#[test]
fn test_zero_level_count_falls_back_to_unregistered() {
    let rate = token_rate(Tier::Registered, 3, 0, 2.0, RegisteredRateMode::Proportional);

    assert!((rate - 0.2).abs() < EPSILON);
}

#[test]
fn test_rate_mode_string_forms() {
    assert_eq!(RegisteredRateMode::IntegerFloor.to_string(), "integer_floor");
    assert_eq!(
        "proportional".parse::<RegisteredRateMode>().unwrap(),
        RegisteredRateMode::Proportional
    );
}

// ============================================================
// Peer limiter lifecycle
// ============================================================

#[test]
fn test_peer_limiter_created_lazily() {
    let peer_id = PeerId::random();

    let registry = StaticRegistry::new(5).with_registered(peer_id, 3);
    let (limiter, _clock) = fake_limiter(config(registry, 10.0));

    assert!(limiter.peer_limiter(&peer_id).is_none());

    let installed = limiter.add_peer_limiter(peer_id, Tier::Registered, 3);

    assert!((installed.limit() - 2.4).abs() < EPSILON);
    assert_eq!(installed.burst(), 2);
    assert_eq!(installed.peer_id(), &peer_id);

    let fetched = limiter.peer_limiter(&peer_id).unwrap();

    assert!(Arc::ptr_eq(&installed, &fetched));
}

#[test]
fn test_existing_limiter_is_not_replaced() {
    let peer_id = PeerId::random();

    let (limiter, _clock) = fake_limiter(config(StaticRegistry::new(5), 10.0));

    let first = limiter.add_peer_limiter(peer_id, Tier::Unregistered, 0);
    let second = limiter.add_peer_limiter(peer_id, Tier::Whitelisted, 0);

    assert!(Arc::ptr_eq(&first, &second));
    assert!((second.limit() - 1.0).abs() < EPSILON);
}

#[test]
fn test_or_insert_uses_classification() {
    let peer_id = PeerId::random();

    let (limiter, _clock) = fake_limiter(config(StaticRegistry::new(5), 10.0));

    let classification = PeerClassification::new(peer_id, Tier::Whitelisted, 0);

    let created = limiter.peer_limiter_or_insert(&classification);
    let again = limiter.peer_limiter_or_insert(&PeerClassification::unregistered(peer_id));

    assert!((created.limit() - 5.0).abs() < EPSILON);
    assert!(Arc::ptr_eq(&created, &again));
    assert_eq!(limiter.peer_count(), 1);
}

#[test]
fn test_concurrent_inserts_converge() {
    let peer_id = PeerId::random();

    let (limiter, _clock) = fake_limiter(config(StaticRegistry::new(5), 10.0));
    let limiter = Arc::new(limiter);

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let limiter = Arc::clone(&limiter);

            thread::spawn(move || limiter.add_peer_limiter(peer_id, Tier::Whitelisted, 0))
        })
        .collect();

    let installed: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert!(installed.iter().all(|l| Arc::ptr_eq(l, &installed[0])));
    assert_eq!(limiter.peer_count(), 1);
}

// ============================================================
// Bucket behaviour
// ============================================================

#[test]
fn test_burst_then_replenish() {
    let peer_id = PeerId::random();

    let (limiter, clock) = fake_limiter(config(StaticRegistry::new(1), 5.0));

    // whitelisted: 2.5 tokens/s, burst 2
    let peer = limiter.add_peer_limiter(peer_id, Tier::Whitelisted, 0);

    assert_eq!(peer.burst(), 2);
    assert!(peer.allow());
    assert!(peer.allow());
    assert!(!peer.allow());

    clock.advance(Duration::from_millis(399));
    assert!(!peer.allow());

    clock.advance(Duration::from_millis(1));
    assert!(peer.allow());
    assert!(!peer.allow());
}

#[test]
fn test_sub_unit_rate_still_admits() {
    let peer_id = PeerId::random();

    let (limiter, clock) = fake_limiter(config(StaticRegistry::new(1), 1.0));

    // unregistered: 0.1 tokens/s, reported burst 0
    let peer = limiter.add_peer_limiter(peer_id, Tier::Unregistered, 0);

    assert_eq!(peer.burst(), 0);
    assert!(peer.allow());
    assert!(!peer.allow());

    clock.advance(Duration::from_secs(10));

    assert!(peer.allow());
}

#[test]
fn test_zero_rate_never_admits() {
    let peer_id = PeerId::random();

    let (limiter, clock) = fake_limiter(config(StaticRegistry::new(5), 1.0));

    let config = limiter.config().clone();
    assert_eq!(config.registered_rate_mode, RegisteredRateMode::Proportional);

    // level 0 of 5 has no weight
    let peer = limiter.add_peer_limiter(peer_id, Tier::Registered, 0);

    assert!(peer.limit().abs() < EPSILON);

    for _ in 0..10 {
        assert!(!peer.allow());
        clock.advance(Duration::from_secs(3600));
    }
}

#[test]
fn test_global_bucket_limits_everyone() {
    let mut config = config(StaticRegistry::new(1), 1000.0);
    config.global_total_rate = 1.0;
    config.global_burst = 3;

    let (limiter, clock) = fake_limiter(config);

    assert_eq!(limiter.global().burst(), 3);
    assert!(limiter.allow());
    assert!(limiter.allow());
    assert!(limiter.allow());
    assert!(!limiter.allow());

    clock.advance(Duration::from_secs(1));

    assert!(limiter.allow());
}

#[test]
fn test_steady_state_rate_of_top_registered_peer() {
    let peer_id = PeerId::random();

    let registry = StaticRegistry::new(4).with_registered(peer_id, 4);
    let (limiter, clock) = fake_limiter(config(registry, 1.0));

    let peer = limiter.add_peer_limiter(peer_id, Tier::Registered, 4);

    assert!((peer.limit() - 0.4).abs() < EPSILON);

    let step = Duration::from_millis(1);
    let mut elapsed = Duration::ZERO;

    for _ in 0..100 {
        while !(limiter.allow() && peer.allow()) {
            clock.advance(step);
            elapsed += step;
        }
    }

    // the first request drains the initial token, the other 99 pace at 0.4/s
    let observed = 99.0 / elapsed.as_secs_f64();

    assert!((observed - 0.4).abs() < 0.001, "observed {observed} tokens/s");
}
