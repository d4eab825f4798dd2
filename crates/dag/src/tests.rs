use std::collections::HashMap;
use std::io::{Read, Write};
use std::sync::Arc;

use tessera_blockstore::BlockStore;
use tessera_store::config::StoreConfig;
use tessera_store::db::{Column, Database, InMemoryDB};
use tessera_store::Store;

use super::*;

fn link_system() -> LinkSystem {
    LinkSystem::new(BlockStore::new(Store::new(Arc::new(InMemoryDB::new()))))
}

/// root -> {a, b}, a -> c, b -> c
fn diamond(lsys: &LinkSystem) -> (ContentId, [ContentId; 3]) {
    let c = lsys.store_node(&DagNode::leaf("c")).unwrap();
    let a = lsys.store_node(&DagNode::leaf("a").with_link("c", c)).unwrap();
    let b = lsys.store_node(&DagNode::leaf("b").with_link("c", c)).unwrap();
    let root = lsys
        .store_node(&DagNode::leaf("root").with_link("a", a).with_link("b", b))
        .unwrap();

    (root, [a, b, c])
}

// ============================================================
// Read / write
// ============================================================

#[test]
fn test_write_then_read_round_trip() {
    let lsys = link_system();

    let payload = b"advertisement payload".repeat(64);
    let id = ContentId::of(&payload);

    let mut writer = lsys.open_write();
    writer.write_all(&payload[..10]).unwrap();
    writer.write_all(&payload[10..]).unwrap();
    writer.commit(id).unwrap();

    let mut read = Vec::new();
    let _ = lsys.read(&id).unwrap().read_to_end(&mut read).unwrap();

    assert_eq!(read, payload);
}

#[test]
fn test_set_bytes_overrides_buffer() {
    let lsys = link_system();

    let framed = b"bytes received elsewhere".to_vec();
    let id = ContentId::of(&framed);

    let mut writer = lsys.open_write();
    writer.write_all(b"discarded").unwrap();
    writer.set_bytes(&framed);

    assert_eq!(writer.bytes(), &framed[..]);

    writer.commit(id).unwrap();

    assert_eq!(&*lsys.read(&id).unwrap().into_bytes(), &framed[..]);
}

#[test]
fn test_read_missing_is_not_found() {
    let lsys = link_system();

    let id = ContentId::of(b"nowhere");

    assert!(matches!(lsys.read(&id), Err(LinkError::NotFound(missing)) if missing == id));
    assert!(!lsys.has(&id).unwrap());
}

#[test]
fn test_uncommitted_writer_stores_nothing() {
    let lsys = link_system();

    let mut writer = lsys.open_write();
    writer.write_all(b"dropped").unwrap();
    drop(writer);

    assert!(!lsys.has(&ContentId::of(b"dropped")).unwrap());
}

#[test]
fn test_store_node_round_trip() {
    let lsys = link_system();

    let child = lsys.store(b"raw").unwrap();
    let node = DagNode::leaf("entries").with_link("next", child);

    let id = lsys.store_node(&node).unwrap();

    assert_eq!(id, node.id().unwrap());
    assert_eq!(lsys.load_node(&id).unwrap(), node);
}

#[test]
fn test_load_node_rejects_garbage() {
    let lsys = link_system();

    let id = lsys.store(&[0xff; 3]).unwrap();

    assert!(matches!(lsys.load_node(&id), Err(LinkError::Decode { .. })));
}

// ============================================================
// Traversal
// ============================================================

#[test]
fn test_walk_visits_each_once_parents_first() {
    let lsys = link_system();

    let (root, [a, b, c]) = diamond(&lsys);

    let order = lsys.walk(&root).unwrap();

    assert_eq!(order.len(), 4);
    assert_eq!(order[0], root);

    let pos = |id| order.iter().position(|x| *x == id).unwrap();

    assert!(pos(a) < pos(c));
    assert!(pos(b) < pos(c));
}

#[test]
fn test_walk_fails_on_dangling_link() {
    let lsys = link_system();

    let dangling = ContentId::of(b"never stored");
    let root = lsys
        .store_node(&DagNode::leaf("root").with_link("gone", dangling))
        .unwrap();

    assert!(matches!(lsys.walk(&root), Err(LinkError::NotFound(id)) if id == dangling));
}

#[test]
fn test_missing_against_remote() {
    let remote = link_system();
    let local = link_system();

    let (root, [a, b, c]) = diamond(&remote);

    let remote_nodes: HashMap<_, _> = remote
        .walk(&root)
        .unwrap()
        .into_iter()
        .map(|id| (id, remote.load_node(&id).unwrap()))
        .collect();

    // local already holds the shared leaf
    let _ = local.store_node(&remote.load_node(&c).unwrap()).unwrap();

    let mut missing = local
        .missing(&root, |id| remote_nodes.get(id).cloned())
        .unwrap();
    missing.sort();

    let mut expected = vec![root, a, b];
    expected.sort();

    assert_eq!(missing, expected);
}

#[test]
fn test_missing_without_remote_reports_root_only() {
    let local = link_system();

    let root = ContentId::of(b"unknown");

    assert_eq!(local.missing(&root, |_| None).unwrap(), vec![root]);
}

// ============================================================
// Storage faults
// ============================================================

#[derive(Debug)]
struct FailingDB;

impl Database for FailingDB {
    fn open(_config: &StoreConfig) -> eyre::Result<Self> {
        Ok(Self)
    }

    fn has(&self, _col: Column, _key: &[u8]) -> eyre::Result<bool> {
        eyre::bail!("disk unavailable")
    }

    fn get(&self, _col: Column, _key: &[u8]) -> eyre::Result<Option<Box<[u8]>>> {
        eyre::bail!("disk unavailable")
    }

    fn put(&self, _col: Column, _key: &[u8], _value: &[u8]) -> eyre::Result<()> {
        eyre::bail!("disk unavailable")
    }
}

fn failing_link_system() -> LinkSystem {
    LinkSystem::new(BlockStore::new(Store::new(Arc::new(FailingDB))))
}

#[test]
fn test_commit_surfaces_storage_failure() {
    let lsys = failing_link_system();

    let mut writer = lsys.open_write();
    writer.set_bytes(b"block");

    let err = writer.commit(ContentId::of(b"block")).unwrap_err();

    assert!(matches!(err, LinkError::Storage(_)), "unexpected error: {err}");
}

#[test]
fn test_read_surfaces_storage_failure_not_absence() {
    let lsys = failing_link_system();

    let err = lsys.read(&ContentId::of(b"block")).unwrap_err();

    assert!(matches!(err, LinkError::Storage(_)), "unexpected error: {err}");
    assert!(matches!(lsys.has(&ContentId::of(b"block")), Err(LinkError::Storage(_))));
}
