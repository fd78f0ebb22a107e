//! Backing stores for tree nodes
//!
//! Nodes are stored by hash in their storage encoding. A store also keeps the
//! roots that were committed against it, one per namespace and version.

mod blob;
mod file_store;
mod memory;

pub use file_store::{FileStore, DEFAULT_COMPRESSION_LEVEL};
pub use memory::MemoryStore;

use crate::model::{Hash, Namespace, Root};
use crate::Result;

/// Nodes written by a single commit, in the order they were finalized
#[derive(Clone, Debug, Default)]
pub struct WriteBatch {
    nodes: Vec<(Hash, Vec<u8>)>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, hash: Hash, data: Vec<u8>) {
        self.nodes.push((hash, data));
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Hash, &[u8])> {
        self.nodes.iter().map(|(hash, data)| (hash, data.as_slice()))
    }
}

impl IntoIterator for WriteBatch {
    type Item = (Hash, Vec<u8>);
    type IntoIter = std::vec::IntoIter<(Hash, Vec<u8>)>;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes.into_iter()
    }
}

/// Content-addressed node storage
pub trait NodeStore: Send + Sync {
    /// Fetch the storage encoding of the node with the given hash
    ///
    /// Fails with [`Error::NotFound`](crate::Error::NotFound) if absent.
    fn get(&self, hash: &Hash) -> Result<Vec<u8>>;

    /// Store a node; storing the same hash twice is a no-op
    fn put(&self, hash: Hash, data: Vec<u8>) -> Result<()>;

    /// Persist a commit: every node of the batch, then the root record
    fn apply(&self, _root: &Root, batch: WriteBatch) -> Result<()> {
        for (hash, data) in batch {
            self.put(hash, data)?;
        }
        Ok(())
    }

    /// The most recent root committed for a namespace, if any
    fn latest_root(&self, _namespace: &Namespace) -> Result<Option<Root>> {
        Ok(None)
    }
}
