use strum::{AsRefStr, EnumIter};

use crate::config::StoreConfig;

mod memory;

pub use memory::InMemoryDB;

#[derive(Eq, Ord, Copy, Clone, Debug, PartialEq, PartialOrd, EnumIter, AsRefStr)]
pub enum Column {
    /// Raw blocks keyed by content identifier.
    Blocks,
    /// Small records such as the per-peer sync state.
    Meta,
}

/// A column-oriented key/value engine.
///
/// Single-key operations are atomic. Entries are never removed.
pub trait Database: Send + Sync + 'static {
    fn open(config: &StoreConfig) -> eyre::Result<Self>
    where
        Self: Sized;

    fn has(&self, col: Column, key: &[u8]) -> eyre::Result<bool>;
    fn get(&self, col: Column, key: &[u8]) -> eyre::Result<Option<Box<[u8]>>>;
    fn put(&self, col: Column, key: &[u8], value: &[u8]) -> eyre::Result<()>;
}
