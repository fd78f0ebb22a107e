//! Shared fixtures for tree and proof tests

use crate::model::{Hash, Namespace, Root};
use crate::store::{MemoryStore, NodeStore, WriteBatch};
use crate::Result;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// `"key i" -> "value i"` for i in 0..10
pub(crate) fn ten_keys() -> Vec<(Vec<u8>, Vec<u8>)> {
    (0..10)
        .map(|i| {
            (
                format!("key {}", i).into_bytes(),
                format!("value {}", i).into_bytes(),
            )
        })
        .collect()
}

/// A memory store whose reads and commits can be made to fail
#[derive(Default)]
pub(crate) struct FlakyStore {
    inner: MemoryStore,
    fail_gets: AtomicBool,
    fail_apply: AtomicBool,
    gets: AtomicUsize,
    puts: AtomicUsize,
}

impl FlakyStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn fail_gets(&self, fail: bool) {
        self.fail_gets.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn fail_apply(&self, fail: bool) {
        self.fail_apply.store(fail, Ordering::SeqCst);
    }

    /// Number of successful node fetches so far
    pub(crate) fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    /// Number of nodes written so far
    pub(crate) fn puts(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }
}

impl NodeStore for FlakyStore {
    fn get(&self, hash: &Hash) -> Result<Vec<u8>> {
        if self.fail_gets.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::Other, "injected read failure").into());
        }
        let data = self.inner.get(hash)?;
        self.gets.fetch_add(1, Ordering::SeqCst);
        Ok(data)
    }

    fn put(&self, hash: Hash, data: Vec<u8>) -> Result<()> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.inner.put(hash, data)
    }

    fn apply(&self, root: &Root, batch: WriteBatch) -> Result<()> {
        if self.fail_apply.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::Other, "injected write failure").into());
        }
        self.puts.fetch_add(batch.len(), Ordering::SeqCst);
        self.inner.apply(root, batch)
    }

    fn latest_root(&self, namespace: &Namespace) -> Result<Option<Root>> {
        self.inner.latest_root(namespace)
    }
}
