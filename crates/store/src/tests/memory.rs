use std::sync::Arc;

use camino::Utf8PathBuf;

use super::InMemoryDB;
use crate::config::StoreConfig;
use crate::db::{Column, Database};
use crate::Store;

#[test]
fn test_memory_put_get() {
    let db = InMemoryDB::new();

    for b1 in 0..10 {
        for b2 in 0..10 {
            let bytes = [b1, b2];

            db.put(Column::Blocks, &bytes, &bytes).unwrap();

            assert!(db.has(Column::Blocks, &bytes).unwrap());
            assert_eq!(db.get(Column::Blocks, &bytes).unwrap().as_deref(), Some(&bytes[..]));
        }
    }

    assert_eq!(None, db.get(Column::Blocks, &[]).unwrap());
    assert!(!db.has(Column::Meta, &[0, 0]).unwrap());
}

#[test]
fn test_memory_overwrite() {
    let db = InMemoryDB::new();

    db.put(Column::Meta, b"peer", b"one").unwrap();
    db.put(Column::Meta, b"peer", b"two").unwrap();

    assert_eq!(db.get(Column::Meta, b"peer").unwrap().as_deref(), Some(&b"two"[..]));
}

#[test]
fn test_memory_columns_are_disjoint() {
    let db = InMemoryDB::new();

    db.put(Column::Meta, b"key", b"meta").unwrap();

    assert!(!db.has(Column::Blocks, b"key").unwrap());
    assert_eq!(db.get(Column::Blocks, b"key").unwrap(), None);
}

#[test]
fn test_store_handle_shares_db() {
    let store = Store::open::<InMemoryDB>(&StoreConfig::new(Utf8PathBuf::from("data"))).unwrap();
    let other = store.clone();

    store.put(Column::Meta, b"k", b"v").unwrap();

    assert!(other.has(Column::Meta, b"k").unwrap());

    let fresh = Store::new(Arc::new(InMemoryDB::new()));

    assert!(!fresh.has(Column::Meta, b"k").unwrap());
}
