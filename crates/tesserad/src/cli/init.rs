use clap::{Parser, ValueEnum};
use eyre::{bail, Result as EyreResult, WrapErr};
use libp2p_identity::Keypair;
use tessera_config::{ConfigFile, DataStoreConfig, LimiterConfig, RegistryConfig, SyncConfig};
use tessera_node::admission::ThrottleAction;
use tokio::fs::create_dir_all;
use tracing::{info, warn};

use crate::cli::RootArgs;
use crate::defaults;

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum ThrottleActionArg {
    Pause,
    Cancel,
}

impl From<ThrottleActionArg> for ThrottleAction {
    fn from(value: ThrottleActionArg) -> Self {
        match value {
            ThrottleActionArg::Pause => Self::Pause,
            ThrottleActionArg::Cancel => Self::Cancel,
        }
    }
}

/// Initialize node configuration
#[derive(Debug, Parser)]
pub struct InitCommand {
    /// Tokens per second a peer's share is computed from
    #[arg(long, value_name = "RATE", default_value_t = defaults::DEFAULT_BASE_TOKEN_RATE)]
    pub base_token_rate: f64,

    /// Tokens per second across all peers
    #[arg(long, value_name = "RATE", default_value_t = defaults::DEFAULT_GLOBAL_TOTAL_RATE)]
    pub global_total_rate: f64,

    /// Capacity of the global token bucket
    #[arg(long, value_name = "TOKENS", default_value_t = defaults::DEFAULT_GLOBAL_BURST)]
    pub global_burst: u32,

    /// What to do with a throttled pull
    #[arg(long, value_enum, default_value_t = ThrottleActionArg::Pause)]
    pub throttle_action: ThrottleActionArg,

    /// Advertisement topic to subscribe to
    #[arg(long, value_name = "TOPIC", default_value = defaults::DEFAULT_TOPIC)]
    pub topic: String,

    /// Number of account levels registered peers are ranked in
    #[arg(long, value_name = "COUNT", default_value_t = defaults::DEFAULT_LEVEL_COUNT)]
    pub level_count: u32,

    /// Force overwrite an existing config
    #[arg(long, short)]
    pub force: bool,
}

impl InitCommand {
    pub async fn run(self, root_args: RootArgs) -> EyreResult<()> {
        let path = root_args.home;

        if ConfigFile::exists(&path) {
            if !self.force {
                bail!("Node is already initialized in {:?}", path);
            }

            warn!("Overwriting existing configuration in {:?}", path);
        }

        create_dir_all(&path)
            .await
            .wrap_err_with(|| format!("failed to create directory {path:?}"))?;

        let identity = Keypair::generate_ed25519();
        info!("Generated identity: {:?}", identity.public().to_peer_id());

        let mut limiter = LimiterConfig::new(
            self.base_token_rate,
            self.global_total_rate,
            self.global_burst,
        );
        limiter.throttle_action = self.throttle_action.into();

        let config = ConfigFile::new(
            identity,
            limiter,
            SyncConfig::new(self.topic),
            DataStoreConfig::new("data".into()),
            RegistryConfig::new(self.level_count),
        );

        config.save(&path).await?;

        info!("Initialized a node in {:?}", path);

        Ok(())
    }
}
