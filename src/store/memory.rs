//! In-memory node store

use super::{NodeStore, WriteBatch};
use crate::model::{Hash, Namespace, Root};
use crate::{Error, Result};
use parking_lot::RwLock;
use std::collections::HashMap;

/// A node store that keeps everything in memory
#[derive(Default)]
pub struct MemoryStore {
    nodes: RwLock<HashMap<Hash, Vec<u8>>>,
    roots: RwLock<HashMap<Namespace, Root>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored nodes
    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.read().is_empty()
    }

    pub fn contains(&self, hash: &Hash) -> bool {
        self.nodes.read().contains_key(hash)
    }
}

impl NodeStore for MemoryStore {
    fn get(&self, hash: &Hash) -> Result<Vec<u8>> {
        self.nodes
            .read()
            .get(hash)
            .cloned()
            .ok_or_else(|| Error::NotFound(hash.to_hex()))
    }

    fn put(&self, hash: Hash, data: Vec<u8>) -> Result<()> {
        self.nodes.write().entry(hash).or_insert(data);
        Ok(())
    }

    fn apply(&self, root: &Root, batch: WriteBatch) -> Result<()> {
        {
            let mut nodes = self.nodes.write();
            for (hash, data) in batch {
                nodes.entry(hash).or_insert(data);
            }
        }

        let mut roots = self.roots.write();
        let newer = roots
            .get(&root.namespace)
            .map_or(true, |latest| latest.version <= root.version);
        if newer {
            roots.insert(root.namespace, *root);
        }
        Ok(())
    }

    fn latest_root(&self, namespace: &Namespace) -> Result<Option<Root>> {
        Ok(self.roots.read().get(namespace).copied())
    }
}
