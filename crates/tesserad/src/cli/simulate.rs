use core::time::Duration;
use std::sync::Arc;

use clap::Parser;
use eyre::{bail, Result as EyreResult};
use libp2p_identity::Keypair;
use prometheus_client::encoding::text::encode;
use prometheus_client::registry::Registry;
use tessera_blockstore::BlockStore;
use tessera_config::ConfigFile;
use tessera_dag::{DagNode, LinkSystem};
use tessera_exchange::local::{LocalExchange, LocalNetwork};
use tessera_node::ExchangeCore;
use tessera_primitives::content::ContentId;
use tessera_store::db::InMemoryDB;
use tessera_store::Store;
use tokio::time::{sleep, Instant};
use tracing::{info, warn};

use crate::cli::RootArgs;

/// Sync advertisements from an in-process publisher
#[derive(Debug, Parser)]
pub struct SimulateCommand {
    /// Number of advertisements to publish
    #[arg(long, value_name = "COUNT", default_value_t = 10)]
    pub advertisements: usize,

    /// Blocks appended to the chain per advertisement
    #[arg(long, value_name = "COUNT", default_value_t = 4)]
    pub blocks: usize,

    /// Delay between advertisements
    #[arg(long, value_name = "MS", default_value_t = 100)]
    pub interval_ms: u64,

    /// How long to wait for outstanding pulls after the last advertisement
    #[arg(long, value_name = "MS", default_value_t = 10_000)]
    pub drain_ms: u64,

    /// Classify the publisher as whitelisted instead of by the configured lists
    #[arg(long)]
    pub whitelist_publisher: bool,
}

impl SimulateCommand {
    pub async fn run(self, root_args: RootArgs) -> EyreResult<()> {
        let path = root_args.home;

        if !ConfigFile::exists(&path) {
            bail!("Node is not initialized in {:?}", path);
        }

        let config = ConfigFile::load(&path).await?;

        let network = LocalNetwork::new();

        let publisher_store = Store::new(Arc::new(InMemoryDB::new()));
        let publisher = network.join(
            Keypair::generate_ed25519().public().to_peer_id(),
            LinkSystem::new(BlockStore::new(publisher_store)),
        );

        let store = Store::new(Arc::new(InMemoryDB::new()));
        let subscriber = network.join(
            config.identity.public().to_peer_id(),
            LinkSystem::new(BlockStore::new(store.clone())),
        );

        let mut peer_registry = config.registry.static_registry();
        if self.whitelist_publisher {
            peer_registry = peer_registry.with_whitelisted(publisher.peer_id());
        }

        let topic = config.sync.topic.clone();
        let core_config = config.core_config();

        let mut metrics = Registry::default();

        let (core, mut updates) = ExchangeCore::start(
            config.identity,
            store,
            Arc::new(subscriber),
            Arc::new(peer_registry),
            core_config,
            &mut metrics,
        )
        .await?;

        info!(
            publisher = %publisher.peer_id(),
            subscriber = %core.peer_id(),
            %topic,
            "simulation started"
        );

        let publishing = tokio::spawn(publish(
            publisher,
            topic,
            self.advertisements,
            self.blocks,
            Duration::from_millis(self.interval_ms),
        ));

        let started = Instant::now();
        let mut received = 0_usize;
        let mut deadline = None;

        while received < self.advertisements {
            if deadline.is_none() && publishing.is_finished() {
                deadline = Some(Instant::now() + Duration::from_millis(self.drain_ms));
            }

            tokio::select! {
                update = updates.recv() => {
                    let Some(update) = update else {
                        break;
                    };

                    received += 1;

                    info!(
                        peer_id = %update.peer_id,
                        root = %update.root,
                        received,
                        "validated root update"
                    );
                }
                () = sleep_until_deadline(deadline) => {
                    if deadline.is_some() {
                        warn!(
                            received,
                            expected = self.advertisements,
                            "gave up waiting for outstanding pulls"
                        );
                        break;
                    }
                }
            }
        }

        publishing.await??;

        info!(
            received,
            elapsed_ms = started.elapsed().as_millis(),
            "simulation finished"
        );

        core.shutdown().await?;

        let mut report = String::new();
        encode(&mut report, &metrics)?;

        println!("{report}");

        Ok(())
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        // re-evaluated on the next update or once publishing is done
        None => sleep(Duration::from_millis(50)).await,
    }
}

async fn publish(
    publisher: LocalExchange,
    topic: String,
    advertisements: usize,
    blocks: usize,
    interval: Duration,
) -> EyreResult<()> {
    let mut head: Option<ContentId> = None;

    for advertisement in 0..advertisements {
        for block in 0..blocks.max(1) {
            let mut node = DagNode::leaf(format!("advertisement {advertisement} block {block}"));

            if let Some(prev) = head {
                node = node.with_link("prev", prev);
            }

            head = Some(publisher.link_system().store_node(&node)?);
        }

        if let Some(root) = head {
            let subscribers = publisher.publish(&topic, root);

            info!(%root, subscribers, advertisement, "published advertisement");
        }

        sleep(interval).await;
    }

    Ok(())
}
