#![allow(dead_code, reason = "not every test binary uses every helper")]

use std::sync::Arc;

use libp2p_identity::Keypair;
use tessera_blockstore::BlockStore;
use tessera_dag::{DagNode, LinkSystem};
use tessera_primitives::content::ContentId;
use tessera_store::db::InMemoryDB;
use tessera_store::Store;

pub const TOPIC: &str = "/tessera/ads/integration";

pub fn store() -> Store {
    Store::new(Arc::new(InMemoryDB::new()))
}

pub fn link_system(store: &Store) -> LinkSystem {
    LinkSystem::new(BlockStore::new(store.clone()))
}

pub fn identity() -> Keypair {
    Keypair::generate_ed25519()
}

/// Appends `len` advertisements on top of `head` (or a fresh chain).
pub fn advertise(lsys: &LinkSystem, head: Option<ContentId>, len: usize) -> ContentId {
    let mut head = head;

    for i in 0..len {
        let mut node = DagNode::leaf(format!("advertisement {i}"));

        if let Some(prev) = head {
            node = node.with_link("prev", prev);
        }

        head = Some(lsys.store_node(&node).unwrap());
    }

    head.unwrap()
}
