//! Content-addressed link resolution for advertisement DAGs.
//!
//! [`LinkSystem`] binds DAG traversal to a [`BlockStore`]: links resolve to
//! readable byte streams, and writers accumulate bytes that are committed
//! as a single block under a caller-supplied [`ContentId`].
//!
//! Storage is trusted, reads do not re-verify digests.

#[cfg(test)]
mod tests;

mod node;

use std::collections::{HashSet, VecDeque};
use std::io::{self, Cursor, Read, Write};

use tessera_blockstore::{BlockStore, StoreError};
use tessera_primitives::content::ContentId;
use thiserror::Error;
use tracing::{debug, trace};

pub use node::{DagLink, DagNode};

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LinkError {
    #[error("block {0} not found")]
    NotFound(ContentId),

    #[error("storage failure: {0}")]
    Storage(#[from] StoreError),

    #[error("malformed block {id}: {source}")]
    Decode {
        id: ContentId,
        #[source]
        source: io::Error,
    },

    #[error("failed to encode node: {0}")]
    Encode(#[source] io::Error),
}

#[derive(Clone, Debug)]
pub struct LinkSystem {
    blocks: BlockStore,
}

impl LinkSystem {
    #[must_use]
    pub const fn new(blocks: BlockStore) -> Self {
        Self { blocks }
    }

    #[must_use]
    pub const fn block_store(&self) -> &BlockStore {
        &self.blocks
    }

    /// Opens the block behind `link` for reading.
    pub fn read(&self, link: &ContentId) -> Result<BlockReader, LinkError> {
        let Some(bytes) = self.blocks.get(link)? else {
            return Err(LinkError::NotFound(*link));
        };

        Ok(BlockReader {
            inner: Cursor::new(bytes),
        })
    }

    /// Opens a writer whose contents become one block on [`BlockWriter::commit`].
    #[must_use]
    pub fn open_write<'a>(&self) -> BlockWriter<'a> {
        BlockWriter {
            blocks: self.blocks.clone(),
            buffer: Vec::new(),
            provided: None,
        }
    }

    pub fn has(&self, link: &ContentId) -> Result<bool, LinkError> {
        Ok(self.blocks.has(link)?)
    }

    /// Hashes and stores `bytes`, returning their identifier.
    pub fn store(&self, bytes: &[u8]) -> Result<ContentId, LinkError> {
        let id = ContentId::of(bytes);

        let mut writer = self.open_write();
        writer.set_bytes(bytes);
        writer.commit(id)?;

        Ok(id)
    }

    pub fn store_node(&self, node: &DagNode) -> Result<ContentId, LinkError> {
        let bytes = node.encode().map_err(LinkError::Encode)?;

        self.store(&bytes)
    }

    pub fn load_node(&self, link: &ContentId) -> Result<DagNode, LinkError> {
        let bytes = self.read(link)?.into_bytes();

        DagNode::decode(&bytes).map_err(|source| LinkError::Decode { id: *link, source })
    }

    /// Every identifier reachable from `root`, each once, parents before
    /// their children.
    pub fn walk(&self, root: &ContentId) -> Result<Vec<ContentId>, LinkError> {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([*root]);
        let mut order = Vec::new();

        while let Some(id) = queue.pop_front() {
            if !seen.insert(id) {
                continue;
            }

            let node = self.load_node(&id)?;

            queue.extend(node.links.iter().map(|link| link.id));
            order.push(id);
        }

        Ok(order)
    }

    /// Identifiers reachable from `root` that are not stored locally.
    ///
    /// Local blocks are followed directly; absent ones are resolved through
    /// `remote` to discover their links. An absent block that `remote` can't
    /// supply is reported but not descended into.
    pub fn missing<F>(&self, root: &ContentId, mut remote: F) -> Result<Vec<ContentId>, LinkError>
    where
        F: FnMut(&ContentId) -> Option<DagNode>,
    {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([*root]);
        let mut missing = Vec::new();

        while let Some(id) = queue.pop_front() {
            if !seen.insert(id) {
                continue;
            }

            let node = if self.has(&id)? {
                Some(self.load_node(&id)?)
            } else {
                missing.push(id);
                remote(&id)
            };

            match node {
                Some(node) => queue.extend(node.links.iter().map(|link| link.id)),
                None => trace!(%id, "unresolvable link, not descending"),
            }
        }

        debug!(%root, count = missing.len(), "computed missing blocks");

        Ok(missing)
    }
}

/// A readable view over a stored block.
#[derive(Debug)]
pub struct BlockReader {
    inner: Cursor<Box<[u8]>>,
}

impl BlockReader {
    #[must_use]
    pub fn into_bytes(self) -> Box<[u8]> {
        self.inner.into_inner()
    }
}

impl Read for BlockReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

/// A sink for one block.
///
/// Bytes written through [`Write`] are buffered until [`BlockWriter::commit`].
/// [`BlockWriter::set_bytes`] replaces the buffer with a slice the caller
/// already holds.
#[derive(Debug)]
pub struct BlockWriter<'a> {
    blocks: BlockStore,
    buffer: Vec<u8>,
    provided: Option<&'a [u8]>,
}

impl<'a> BlockWriter<'a> {
    pub fn set_bytes(&mut self, bytes: &'a [u8]) {
        self.provided = Some(bytes);
    }

    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        self.provided.unwrap_or(&self.buffer)
    }

    /// Persists the block under `id` with a single store write.
    pub fn commit(self, id: ContentId) -> Result<(), LinkError> {
        self.blocks.put(&id, self.bytes())?;

        Ok(())
    }
}

impl Write for BlockWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
