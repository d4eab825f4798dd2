use core::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use eyre::{Result as EyreResult, WrapErr};
use libp2p_identity::{Keypair, PeerId};
use serde::{Deserialize, Serialize};
use tessera_node::admission::ThrottleAction;
use tessera_node::config::{CoreConfig, DEFAULT_OUTPUT_CAPACITY, DEFAULT_RETRY_INTERVAL};
use tessera_node::limiter::RegisteredRateMode;
use tessera_node::registry::StaticRegistry;
use tokio::fs::{read_to_string, write};

#[cfg(test)]
mod tests;

pub const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Deserialize, Serialize)]
#[non_exhaustive]
pub struct ConfigFile {
    #[serde(
        with = "serde_identity",
        default = "libp2p_identity::Keypair::generate_ed25519"
    )]
    pub identity: Keypair,

    pub limiter: LimiterConfig,

    pub sync: SyncConfig,

    pub datastore: DataStoreConfig,

    #[serde(default)]
    pub registry: RegistryConfig,
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
#[non_exhaustive]
pub struct LimiterConfig {
    pub base_token_rate: f64,

    pub global_total_rate: f64,

    pub global_burst: u32,

    #[serde(default)]
    pub registered_rate_mode: RegisteredRateMode,

    #[serde(default)]
    pub throttle_action: ThrottleAction,

    #[serde(
        rename = "retry_interval_ms",
        with = "serde_duration",
        default = "default_retry_interval"
    )]
    pub retry_interval: Duration,
}

impl LimiterConfig {
    #[must_use]
    pub const fn new(base_token_rate: f64, global_total_rate: f64, global_burst: u32) -> Self {
        Self {
            base_token_rate,
            global_total_rate,
            global_burst,
            registered_rate_mode: RegisteredRateMode::Proportional,
            throttle_action: ThrottleAction::Pause,
            retry_interval: DEFAULT_RETRY_INTERVAL,
        }
    }
}

const fn default_retry_interval() -> Duration {
    DEFAULT_RETRY_INTERVAL
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[non_exhaustive]
pub struct SyncConfig {
    /// Advertisement topic subscribed to on start
    pub topic: String,

    #[serde(default = "default_output_capacity")]
    pub output_capacity: usize,
}

impl SyncConfig {
    #[must_use]
    pub const fn new(topic: String) -> Self {
        Self {
            topic,
            output_capacity: DEFAULT_OUTPUT_CAPACITY,
        }
    }
}

const fn default_output_capacity() -> usize {
    DEFAULT_OUTPUT_CAPACITY
}

#[derive(Debug, Deserialize, Serialize)]
#[non_exhaustive]
pub struct DataStoreConfig {
    pub path: Utf8PathBuf,
}

impl DataStoreConfig {
    #[must_use]
    pub const fn new(path: Utf8PathBuf) -> Self {
        Self { path }
    }
}

/// Static peer classification, used when no external registry is wired in.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[non_exhaustive]
pub struct RegistryConfig {
    pub level_count: u32,

    #[serde(default)]
    pub whitelist: Vec<PeerId>,

    #[serde(default)]
    pub registered: Vec<RegisteredPeer>,
}

impl RegistryConfig {
    #[must_use]
    pub const fn new(level_count: u32) -> Self {
        Self {
            level_count,
            whitelist: Vec::new(),
            registered: Vec::new(),
        }
    }

    #[must_use]
    pub fn static_registry(&self) -> StaticRegistry {
        let registry = self
            .whitelist
            .iter()
            .fold(StaticRegistry::new(self.level_count), |registry, peer_id| {
                registry.with_whitelisted(*peer_id)
            });

        self.registered.iter().fold(registry, |registry, peer| {
            registry.with_registered(peer.peer_id, peer.level)
        })
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct RegisteredPeer {
    pub peer_id: PeerId,
    pub level: u32,
}

impl ConfigFile {
    #[must_use]
    pub const fn new(
        identity: Keypair,
        limiter: LimiterConfig,
        sync: SyncConfig,
        datastore: DataStoreConfig,
        registry: RegistryConfig,
    ) -> Self {
        Self {
            identity,
            limiter,
            sync,
            datastore,
            registry,
        }
    }

    #[must_use]
    pub fn exists(dir: &Utf8Path) -> bool {
        dir.join(CONFIG_FILE).is_file()
    }

    pub async fn load(dir: &Utf8Path) -> EyreResult<Self> {
        let path = dir.join(CONFIG_FILE);
        let content = read_to_string(&path)
            .await
            .wrap_err_with(|| format!("failed to read configuration from {path:?}"))?;

        toml::from_str(&content).map_err(Into::into)
    }

    pub async fn save(&self, dir: &Utf8Path) -> EyreResult<()> {
        let path = dir.join(CONFIG_FILE);
        let content = toml::to_string_pretty(self)?;

        write(&path, content)
            .await
            .wrap_err_with(|| format!("failed to write configuration to {path:?}"))?;

        Ok(())
    }

    /// Exchange core settings, subscribing to the configured topic.
    #[must_use]
    pub fn core_config(&self) -> CoreConfig {
        let mut config = CoreConfig::new(
            self.limiter.base_token_rate,
            self.limiter.global_total_rate,
            self.limiter.global_burst,
        );

        config.registered_rate_mode = self.limiter.registered_rate_mode;
        config.throttle_action = self.limiter.throttle_action;
        config.retry_interval = self.limiter.retry_interval;
        config.output_capacity = self.sync.output_capacity;
        config.topic = Some(self.sync.topic.clone());

        config
    }
}

mod serde_duration {
    use core::time::Duration;

    use serde::{ser, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = u64::try_from(duration.as_millis()).map_err(ser::Error::custom)?;

        serializer.serialize_u64(millis)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

pub mod serde_identity {
    use core::fmt::{self, Formatter};

    use libp2p_identity::Keypair;
    use serde::de::{self, MapAccess};
    use serde::ser::{self, SerializeMap};
    use serde::{Deserializer, Serializer};

    pub fn serialize<S>(key: &Keypair, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut keypair = serializer.serialize_map(Some(2))?;
        keypair.serialize_entry("peer_id", &key.public().to_peer_id().to_base58())?;
        keypair.serialize_entry(
            "keypair",
            &bs58::encode(&key.to_protobuf_encoding().map_err(ser::Error::custom)?).into_string(),
        )?;
        keypair.end()
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Keypair, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct IdentityVisitor;

        impl<'de> de::Visitor<'de> for IdentityVisitor {
            type Value = Keypair;

            fn expecting(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
                formatter.write_str("an identity")
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut peer_id = None::<String>;
                let mut priv_key = None::<String>;

                while let Some(key) = map.next_key::<String>()? {
                    match key.as_str() {
                        "peer_id" => peer_id = Some(map.next_value()?),
                        "keypair" => priv_key = Some(map.next_value()?),
                        _ => {
                            let _ignored: de::IgnoredAny = map.next_value()?;
                        }
                    }
                }

                let peer_id = peer_id.ok_or_else(|| de::Error::missing_field("peer_id"))?;
                let priv_key = priv_key.ok_or_else(|| de::Error::missing_field("keypair"))?;

                let decoded = bs58::decode(&priv_key)
                    .into_vec()
                    .map_err(de::Error::custom)?;

                let keypair = Keypair::from_protobuf_encoding(&decoded).map_err(de::Error::custom)?;

                if keypair.public().to_peer_id().to_base58() != peer_id {
                    return Err(de::Error::custom("peer_id does not match keypair"));
                }

                Ok(keypair)
            }
        }

        deserializer.deserialize_map(IdentityVisitor)
    }
}
