//! Single-file node store
//!
//! File format:
//! ```text
//! [HEADER: 64 bytes]
//!   - magic: 8 bytes ("MKVSNODE")
//!   - version: 4 bytes (u32 LE)
//!   - flags: 4 bytes
//!   - object_count: 8 bytes (u64 LE)
//!   - index_offset: 8 bytes (u64 LE)
//!   - roots_offset: 8 bytes (u64 LE)
//!   - roots_count: 8 bytes (u64 LE)
//!   - reserved: 16 bytes
//!
//! [OBJECTS: variable]
//!   - node blobs, concatenated
//!
//! [INDEX: variable]
//!   - array of (hash, offset, size) entries sorted by hash
//!
//! [ROOTS: variable]
//!   - array of (namespace, version, hash) entries sorted by namespace, version
//! ```
//!
//! The index and root table are rewritten by [`FileStore::sync`]; new blobs
//! are appended over the previous index.

use super::{blob, NodeStore, WriteBatch};
use crate::model::{Hash, Namespace, Root, HASH_SIZE, NAMESPACE_SIZE};
use crate::{Error, Result, MAGIC, VERSION};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

const HEADER_SIZE: u64 = 64;
const INDEX_ENTRY_SIZE: usize = HASH_SIZE + 8 + 4;
const ROOT_ENTRY_SIZE: usize = NAMESPACE_SIZE + 8 + HASH_SIZE;

/// Default zstd level for node blobs
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 3;

#[derive(Clone, Copy, Debug)]
struct IndexEntry {
    offset: u64,
    size: u32,
}

/// A node store backed by a single append-only file
pub struct FileStore {
    path: PathBuf,
    file: RwLock<File>,
    index: RwLock<HashMap<Hash, IndexEntry>>,
    roots: RwLock<BTreeMap<(Namespace, u64), Hash>>,
    /// Current append position
    write_offset: RwLock<u64>,
    compression_level: i32,
}

impl FileStore {
    /// Create a new store file, truncating any existing one
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;

        let mut header = [0u8; HEADER_SIZE as usize];
        header[0..8].copy_from_slice(MAGIC);
        header[8..12].copy_from_slice(&VERSION.to_le_bytes());
        file.write_all(&header)?;
        file.sync_all()?;

        debug!(path = %path.display(), "created node store");

        Ok(FileStore {
            path,
            file: RwLock::new(file),
            index: RwLock::new(HashMap::new()),
            roots: RwLock::new(BTreeMap::new()),
            write_offset: RwLock::new(HEADER_SIZE),
            compression_level: DEFAULT_COMPRESSION_LEVEL,
        })
    }

    /// Open an existing store file
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let mut file = OpenOptions::new().read(true).write(true).open(&path)?;

        let mut header = [0u8; HEADER_SIZE as usize];
        file.read_exact(&mut header).map_err(|e| match e.kind() {
            std::io::ErrorKind::UnexpectedEof => Error::InvalidFile("truncated header".into()),
            _ => Error::Io(e),
        })?;

        if &header[0..8] != MAGIC {
            return Err(Error::InvalidFile("invalid magic bytes".into()));
        }

        let version = u32::from_le_bytes(le_array(&header[8..12]));
        if version != VERSION {
            return Err(Error::VersionMismatch {
                expected: VERSION,
                found: version,
            });
        }

        let object_count = u64::from_le_bytes(le_array(&header[16..24]));
        let index_offset = u64::from_le_bytes(le_array(&header[24..32]));
        let roots_offset = u64::from_le_bytes(le_array(&header[32..40]));
        let roots_count = u64::from_le_bytes(le_array(&header[40..48]));

        let mut index = HashMap::new();
        if index_offset > 0 && object_count > 0 {
            file.seek(SeekFrom::Start(index_offset))?;
            for _ in 0..object_count {
                let mut entry = [0u8; INDEX_ENTRY_SIZE];
                file.read_exact(&mut entry)?;

                let hash = Hash::from_bytes(le_array(&entry[0..32]));
                let offset = u64::from_le_bytes(le_array(&entry[32..40]));
                let size = u32::from_le_bytes(le_array(&entry[40..44]));
                index.insert(hash, IndexEntry { offset, size });
            }
        }

        let mut roots = BTreeMap::new();
        if roots_offset > 0 && roots_count > 0 {
            file.seek(SeekFrom::Start(roots_offset))?;
            for _ in 0..roots_count {
                let mut entry = [0u8; ROOT_ENTRY_SIZE];
                file.read_exact(&mut entry)?;

                let namespace = Namespace::from_bytes(le_array(&entry[0..32]));
                let version = u64::from_le_bytes(le_array(&entry[32..40]));
                let hash = Hash::from_bytes(le_array(&entry[40..72]));
                roots.insert((namespace, version), hash);
            }
        }

        let write_offset = if index_offset > 0 {
            index_offset
        } else {
            file.seek(SeekFrom::End(0))?
        };

        debug!(
            path = %path.display(),
            objects = index.len(),
            roots = roots.len(),
            "opened node store"
        );

        Ok(FileStore {
            path,
            file: RwLock::new(file),
            index: RwLock::new(index),
            roots: RwLock::new(roots),
            write_offset: RwLock::new(write_offset),
            compression_level: DEFAULT_COMPRESSION_LEVEL,
        })
    }

    /// Open a store file, creating it if it does not exist
    pub fn open_or_create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::open(path)
        } else {
            Self::create(path)
        }
    }

    /// Set the zstd level for newly written blobs (0 stores them raw)
    pub fn with_compression_level(mut self, level: i32) -> Self {
        self.compression_level = level;
        self
    }

    /// Check if a node exists
    pub fn contains(&self, hash: &Hash) -> bool {
        self.index.read().contains_key(hash)
    }

    /// Number of stored nodes
    pub fn object_count(&self) -> usize {
        self.index.read().len()
    }

    /// Every recorded root, ordered by namespace then version
    pub fn roots(&self) -> Vec<Root> {
        self.roots
            .read()
            .iter()
            .map(|(&(namespace, version), &hash)| Root::new(namespace, version, hash))
            .collect()
    }

    /// Record a committed root without writing any nodes
    pub fn record_root(&self, root: &Root) {
        self.roots
            .write()
            .insert((root.namespace, root.version), root.hash);
    }

    /// Write the index and root table and flush the file
    pub fn sync(&self) -> Result<()> {
        let index = self.index.read();
        let roots = self.roots.read();
        let write_offset = *self.write_offset.read();
        let mut file = self.file.write();

        let index_size = (index.len() * INDEX_ENTRY_SIZE) as u64;
        let roots_offset = write_offset + index_size;

        file.seek(SeekFrom::Start(16))?;
        file.write_all(&(index.len() as u64).to_le_bytes())?;
        file.write_all(&write_offset.to_le_bytes())?;
        file.write_all(&roots_offset.to_le_bytes())?;
        file.write_all(&(roots.len() as u64).to_le_bytes())?;

        file.seek(SeekFrom::Start(write_offset))?;

        let mut entries: Vec<_> = index.iter().collect();
        entries.sort_by_key(|(hash, _)| hash.as_bytes());

        let mut buf = Vec::with_capacity(index.len() * INDEX_ENTRY_SIZE + roots.len() * ROOT_ENTRY_SIZE);
        for (hash, entry) in entries {
            buf.extend_from_slice(hash.as_bytes());
            buf.extend_from_slice(&entry.offset.to_le_bytes());
            buf.extend_from_slice(&entry.size.to_le_bytes());
        }

        // BTreeMap iteration is already sorted
        for ((namespace, version), hash) in roots.iter() {
            buf.extend_from_slice(namespace.as_bytes());
            buf.extend_from_slice(&version.to_le_bytes());
            buf.extend_from_slice(hash.as_bytes());
        }
        file.write_all(&buf)?;

        let end = roots_offset + (roots.len() * ROOT_ENTRY_SIZE) as u64;
        file.set_len(end)?;
        file.sync_all()?;
        Ok(())
    }

    /// Get the file path
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl NodeStore for FileStore {
    fn get(&self, hash: &Hash) -> Result<Vec<u8>> {
        let entry = self
            .index
            .read()
            .get(hash)
            .copied()
            .ok_or_else(|| Error::NotFound(hash.to_hex()))?;

        trace!(%hash, offset = entry.offset, size = entry.size, "reading node");

        let mut data = vec![0u8; entry.size as usize];
        {
            let mut file = self.file.write();
            file.seek(SeekFrom::Start(entry.offset))?;
            file.read_exact(&mut data)?;
        }

        blob::unpack(&data)
    }

    fn put(&self, hash: Hash, data: Vec<u8>) -> Result<()> {
        if self.contains(&hash) {
            return Ok(());
        }

        let packed = blob::pack(&data, self.compression_level)?;
        let size = u32::try_from(packed.len())
            .map_err(|_| Error::ValueTooLarge(packed.len()))?;

        let offset = {
            let mut write_offset = self.write_offset.write();
            let offset = *write_offset;

            let mut file = self.file.write();
            file.seek(SeekFrom::Start(offset))?;
            file.write_all(&packed)?;

            *write_offset = offset + size as u64;
            offset
        };

        self.index.write().insert(hash, IndexEntry { offset, size });
        Ok(())
    }

    fn apply(&self, root: &Root, batch: WriteBatch) -> Result<()> {
        let nodes = batch.len();
        for (hash, data) in batch {
            self.put(hash, data)?;
        }
        self.record_root(root);
        self.sync()?;

        debug!(
            namespace = %root.namespace,
            version = root.version,
            root = %root.hash,
            nodes,
            "applied commit"
        );
        Ok(())
    }

    fn latest_root(&self, namespace: &Namespace) -> Result<Option<Root>> {
        let roots = self.roots.read();
        Ok(roots
            .range((*namespace, 0)..=(*namespace, u64::MAX))
            .next_back()
            .map(|(&(namespace, version), &hash)| Root::new(namespace, version, hash)))
    }
}

impl Drop for FileStore {
    fn drop(&mut self) {
        // Best-effort sync on drop
        let _ = self.sync();
    }
}

/// Copy a fixed-size field out of a header or table entry
fn le_array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[..N]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_create_and_open() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.mkvs");

        {
            let store = FileStore::create(&path).unwrap();
            assert_eq!(store.object_count(), 0);
        }

        {
            let store = FileStore::open(&path).unwrap();
            assert_eq!(store.object_count(), 0);
            assert!(store.roots().is_empty());
        }
    }

    #[test]
    fn test_open_rejects_foreign_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("junk");
        std::fs::write(&path, vec![0u8; 128]).unwrap();
        assert!(matches!(FileStore::open(&path), Err(Error::InvalidFile(_))));

        std::fs::write(&path, b"short").unwrap();
        assert!(matches!(FileStore::open(&path), Err(Error::InvalidFile(_))));
    }

    #[test]
    fn test_open_rejects_other_version() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("old.mkvs");
        drop(FileStore::create(&path).unwrap());

        let mut bytes = std::fs::read(&path).unwrap();
        bytes[8..12].copy_from_slice(&(VERSION + 1).to_le_bytes());
        std::fs::write(&path, bytes).unwrap();

        assert!(matches!(
            FileStore::open(&path),
            Err(Error::VersionMismatch { .. })
        ));
    }

    #[test]
    fn test_deduplication() {
        let dir = tempdir().unwrap();
        let store = FileStore::create(dir.path().join("test.mkvs")).unwrap();

        let hash = Hash::digest(b"duplicate data");
        store.put(hash, b"duplicate data".to_vec()).unwrap();
        store.put(hash, b"duplicate data".to_vec()).unwrap();

        assert_eq!(store.object_count(), 1);
        assert_eq!(store.get(&hash).unwrap(), b"duplicate data");
    }

    #[test]
    fn test_persistence() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.mkvs");
        let ns = Namespace::from_bytes([7; 32]);
        let a = Hash::digest(b"a");
        let b = Hash::digest(b"b");

        {
            let store = FileStore::create(&path).unwrap().with_compression_level(0);
            let mut batch = WriteBatch::new();
            batch.push(a, b"a".to_vec());
            store.apply(&Root::new(ns, 1, a), batch).unwrap();

            let mut batch = WriteBatch::new();
            batch.push(b, b"b".repeat(100));
            store.apply(&Root::new(ns, 2, b), batch).unwrap();
        }

        {
            let store = FileStore::open(&path).unwrap();
            assert_eq!(store.get(&a).unwrap(), b"a");
            assert_eq!(store.get(&b).unwrap(), b"b".repeat(100));
            assert_eq!(store.roots().len(), 2);
            assert_eq!(store.latest_root(&ns).unwrap(), Some(Root::new(ns, 2, b)));
            assert_eq!(store.latest_root(&Namespace::default()).unwrap(), None);
        }
    }

    #[test]
    fn test_append_after_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.mkvs");
        let first = Hash::digest(b"first");
        let second = Hash::digest(b"second");

        {
            let store = FileStore::create(&path).unwrap();
            store.put(first, b"first".to_vec()).unwrap();
            store.sync().unwrap();
        }
        {
            let store = FileStore::open(&path).unwrap();
            store.put(second, b"second".to_vec()).unwrap();
        }
        {
            let store = FileStore::open(&path).unwrap();
            assert_eq!(store.object_count(), 2);
            assert_eq!(store.get(&first).unwrap(), b"first");
            assert_eq!(store.get(&second).unwrap(), b"second");
        }
    }
}
