#[cfg(test)]
#[path = "tests/lib.rs"]
mod tests;

use tessera_primitives::content::ContentId;
use tessera_store::db::Column;
use tessera_store::Store;
use thiserror::Error;
use tracing::trace;

/// Content-addressed block storage on top of the node's [`Store`].
///
/// Blocks are write-once. Bytes are trusted on the way out, callers that
/// receive blocks from the network are expected to verify them before
/// [`BlockStore::put`].
#[derive(Clone, Debug)]
pub struct BlockStore {
    store: Store,
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    #[error("storage backend failure: {0}")]
    Backend(#[from] eyre::Report),
}

impl BlockStore {
    #[must_use]
    pub const fn new(store: Store) -> Self {
        Self { store }
    }

    pub fn has(&self, id: &ContentId) -> Result<bool, StoreError> {
        Ok(self.store.has(Column::Blocks, id.as_ref())?)
    }

    pub fn get(&self, id: &ContentId) -> Result<Option<Box<[u8]>>, StoreError> {
        Ok(self.store.get(Column::Blocks, id.as_ref())?)
    }

    pub fn put(&self, id: &ContentId, bytes: &[u8]) -> Result<(), StoreError> {
        trace!(%id, size = bytes.len(), "storing block");

        self.store.put(Column::Blocks, id.as_ref(), bytes)?;

        Ok(())
    }
}
