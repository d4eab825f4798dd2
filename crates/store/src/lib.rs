use std::sync::Arc;

use crate::config::StoreConfig;
use crate::db::{Column, Database};

pub mod config;
pub mod db;

/// Cheaply cloneable handle to the node's key/value database.
#[derive(Clone)]
pub struct Store {
    db: Arc<dyn Database>,
}

impl Store {
    pub fn open<T: Database>(config: &StoreConfig) -> eyre::Result<Self> {
        let db = T::open(config)?;

        Ok(Self::new(Arc::new(db)))
    }

    #[must_use]
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    pub fn has(&self, col: Column, key: &[u8]) -> eyre::Result<bool> {
        self.db.has(col, key)
    }

    pub fn get(&self, col: Column, key: &[u8]) -> eyre::Result<Option<Box<[u8]>>> {
        self.db.get(col, key)
    }

    pub fn put(&self, col: Column, key: &[u8], value: &[u8]) -> eyre::Result<()> {
        self.db.put(col, key, value)
    }
}

impl core::fmt::Debug for Store {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Store").finish_non_exhaustive()
    }
}
