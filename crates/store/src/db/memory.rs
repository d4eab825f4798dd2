#[cfg(test)]
#[path = "../tests/memory.rs"]
mod tests;

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::config::StoreConfig;
use crate::db::{Column, Database};

type Columns = BTreeMap<Column, BTreeMap<Box<[u8]>, Box<[u8]>>>;

/// A volatile [`Database`] kept entirely in memory.
#[derive(Debug, Default)]
pub struct InMemoryDB {
    inner: RwLock<Columns>,
}

impl InMemoryDB {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn db(&self) -> eyre::Result<RwLockReadGuard<'_, Columns>> {
        self.inner
            .read()
            .map_err(|_| eyre::eyre!("failed to acquire read lock on db"))
    }

    fn db_mut(&self) -> eyre::Result<RwLockWriteGuard<'_, Columns>> {
        self.inner
            .write()
            .map_err(|_| eyre::eyre!("failed to acquire write lock on db"))
    }
}

impl Database for InMemoryDB {
    fn open(_config: &StoreConfig) -> eyre::Result<Self> {
        Ok(Self::new())
    }

    fn has(&self, col: Column, key: &[u8]) -> eyre::Result<bool> {
        let db = self.db()?;

        Ok(db.get(&col).is_some_and(|column| column.contains_key(key)))
    }

    fn get(&self, col: Column, key: &[u8]) -> eyre::Result<Option<Box<[u8]>>> {
        let db = self.db()?;

        Ok(db.get(&col).and_then(|column| column.get(key)).cloned())
    }

    fn put(&self, col: Column, key: &[u8], value: &[u8]) -> eyre::Result<()> {
        let mut db = self.db_mut()?;

        drop(db.entry(col).or_default().insert(key.into(), value.into()));

        Ok(())
    }
}
