use camino::Utf8Path;
use tempfile::tempdir;
use tessera_node::registry::PeerRegistry;
use tessera_primitives::peer::Tier;

use super::*;

const TOPIC: &str = "/tessera/ads";

fn sample() -> ConfigFile {
    let mut registry = RegistryConfig::new(5);
    registry.whitelist.push(PeerId::random());
    registry.registered.push(RegisteredPeer {
        peer_id: PeerId::random(),
        level: 3,
    });

    let mut limiter = LimiterConfig::new(10.0, 100.0, 50);
    limiter.throttle_action = ThrottleAction::Cancel;
    limiter.registered_rate_mode = RegisteredRateMode::IntegerFloor;
    limiter.retry_interval = Duration::from_millis(25);

    ConfigFile::new(
        Keypair::generate_ed25519(),
        limiter,
        SyncConfig::new(TOPIC.to_owned()),
        DataStoreConfig::new("data".into()),
        registry,
    )
}

#[tokio::test]
async fn test_save_and_load_round_trip() {
    let dir = tempdir().unwrap();
    let dir = Utf8Path::from_path(dir.path()).unwrap();

    assert!(!ConfigFile::exists(dir));

    let config = sample();
    config.save(dir).await.unwrap();

    assert!(ConfigFile::exists(dir));

    let loaded = ConfigFile::load(dir).await.unwrap();

    assert_eq!(
        loaded.identity.public().to_peer_id(),
        config.identity.public().to_peer_id()
    );
    assert_eq!(loaded.limiter.global_burst, 50);
    assert_eq!(loaded.limiter.throttle_action, ThrottleAction::Cancel);
    assert_eq!(
        loaded.limiter.registered_rate_mode,
        RegisteredRateMode::IntegerFloor
    );
    assert_eq!(loaded.limiter.retry_interval, Duration::from_millis(25));
    assert_eq!(loaded.sync.topic, TOPIC);
    assert_eq!(loaded.datastore.path, "data");
    assert_eq!(loaded.registry.whitelist, config.registry.whitelist);
    assert_eq!(
        loaded.registry.registered[0].peer_id,
        config.registry.registered[0].peer_id
    );
}

#[tokio::test]
async fn test_load_missing_file_fails() {
    let dir = tempdir().unwrap();
    let dir = Utf8Path::from_path(dir.path()).unwrap();

    assert!(ConfigFile::load(dir).await.is_err());
}

#[test]
fn test_optional_keys_take_defaults() {
    let config: ConfigFile = toml::from_str(
        r#"
        [limiter]
        base_token_rate = 1.0
        global_total_rate = 20.0
        global_burst = 20

        [sync]
        topic = "/tessera/ads"

        [datastore]
        path = "data"
        "#,
    )
    .unwrap();

    assert_eq!(config.limiter.retry_interval, DEFAULT_RETRY_INTERVAL);
    assert_eq!(config.limiter.throttle_action, ThrottleAction::Pause);
    assert_eq!(
        config.limiter.registered_rate_mode,
        RegisteredRateMode::Proportional
    );
    assert_eq!(config.sync.output_capacity, DEFAULT_OUTPUT_CAPACITY);
    assert_eq!(config.registry.level_count, 0);
    assert!(config.registry.whitelist.is_empty());
}

#[test]
fn test_mismatched_identity_is_rejected() {
    let config = sample();
    let other = PeerId::random();

    let content = toml::to_string_pretty(&config)
        .unwrap()
        .replace(&config.identity.public().to_peer_id().to_base58(), &other.to_base58());

    assert!(toml::from_str::<ConfigFile>(&content).is_err());
}

#[test]
fn test_core_config_carries_every_setting() {
    let config = sample();
    let core = config.core_config();

    assert!((core.base_token_rate - 10.0).abs() < f64::EPSILON);
    assert!((core.global_total_rate - 100.0).abs() < f64::EPSILON);
    assert_eq!(core.global_burst, 50);
    assert_eq!(core.registered_rate_mode, RegisteredRateMode::IntegerFloor);
    assert_eq!(core.throttle_action, ThrottleAction::Cancel);
    assert_eq!(core.retry_interval, Duration::from_millis(25));
    assert_eq!(core.output_capacity, DEFAULT_OUTPUT_CAPACITY);
    assert_eq!(core.topic.as_deref(), Some(TOPIC));
}

#[test]
fn test_static_registry_from_lists() {
    let config = sample();
    let registry = config.registry.static_registry();

    let whitelisted = config.registry.whitelist[0];
    let registered = config.registry.registered[0].peer_id;

    assert_eq!(registry.account_level_count(), 5);
    assert_eq!(
        registry.classify_peer(&whitelisted).unwrap(),
        (Tier::Whitelisted, 0)
    );
    assert_eq!(
        registry.classify_peer(&registered).unwrap(),
        (Tier::Registered, 3)
    );
    assert_eq!(
        registry.classify_peer(&PeerId::random()).unwrap(),
        (Tier::Unregistered, 0)
    );
}
