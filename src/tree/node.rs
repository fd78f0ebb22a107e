//! Tree node types, hashing and binary encodings
//!
//! Leaf encoding:
//! ```text
//! 0x00 | version: u64 LE | key_bits: u16 LE | key | value_len: u32 LE | value
//! ```
//!
//! Internal node compact encoding (never embeds children):
//! ```text
//! 0x01 | version: u64 LE | label_bits: u16 LE | label | (leaf encoding | 0x02)
//! ```
//!
//! The storage encoding of an internal node appends the left and right child
//! hashes to the compact encoding so that children can be loaded lazily.

use crate::model::key::{self, Depth};
use crate::model::{Hash, HASH_SIZE};
use crate::{Error, Result};

/// Discriminant of a leaf node
pub const PREFIX_LEAF_NODE: u8 = 0x00;
/// Discriminant of an internal node
pub const PREFIX_INTERNAL_NODE: u8 = 0x01;
/// Marks an empty leaf slot inside an internal node
pub const PREFIX_NIL_NODE: u8 = 0x02;

/// Whether a node's memoized hash can be relied upon
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeState {
    /// The memoized hash matches the node's contents
    Clean,
    /// The node changed since its hash was last computed
    Dirty,
    /// Only the hash is known; the node has not been loaded
    Unresolved,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) enum Memo {
    Clean(Hash),
    #[default]
    Dirty,
}

impl Memo {
    fn hash(&self) -> Option<Hash> {
        match self {
            Memo::Clean(hash) => Some(*hash),
            Memo::Dirty => None,
        }
    }

    fn state(&self) -> NodeState {
        match self {
            Memo::Clean(_) => NodeState::Clean,
            Memo::Dirty => NodeState::Dirty,
        }
    }
}

/// A reference to a child subtree
#[derive(Clone, Debug)]
pub enum NodePointer {
    /// Only the hash is known; the node lives in the backing store
    Stub(Hash),
    /// The node is materialized in memory
    Resolved(Box<Node>),
}

impl NodePointer {
    /// The subtree hash, if known
    pub fn hash(&self) -> Option<Hash> {
        match self {
            NodePointer::Stub(hash) => Some(*hash),
            NodePointer::Resolved(node) => node.hash(),
        }
    }

    pub fn state(&self) -> NodeState {
        match self {
            NodePointer::Stub(_) => NodeState::Unresolved,
            NodePointer::Resolved(node) => node.state(),
        }
    }

    /// The in-memory node, if resolved
    pub fn node(&self) -> Option<&Node> {
        match self {
            NodePointer::Stub(_) => None,
            NodePointer::Resolved(node) => Some(node),
        }
    }
}

impl From<Node> for NodePointer {
    fn from(node: Node) -> Self {
        NodePointer::Resolved(Box::new(node))
    }
}

impl From<LeafNode> for NodePointer {
    fn from(leaf: LeafNode) -> Self {
        Node::Leaf(leaf).into()
    }
}

impl From<InternalNode> for NodePointer {
    fn from(node: InternalNode) -> Self {
        Node::Internal(node).into()
    }
}

/// Hash of an optional subtree; an empty subtree hashes to [`Hash::EMPTY`]
pub(crate) fn pointer_hash(ptr: &Option<NodePointer>) -> Option<Hash> {
    match ptr {
        None => Some(Hash::EMPTY),
        Some(ptr) => ptr.hash(),
    }
}

/// A node of the tree
#[derive(Clone, Debug)]
pub enum Node {
    Internal(InternalNode),
    Leaf(LeafNode),
}

impl Node {
    /// The memoized hash, or `None` while the node is dirty
    pub fn hash(&self) -> Option<Hash> {
        match self {
            Node::Internal(n) => n.memo.hash(),
            Node::Leaf(n) => n.memo.hash(),
        }
    }

    pub fn state(&self) -> NodeState {
        match self {
            Node::Internal(n) => n.memo.state(),
            Node::Leaf(n) => n.memo.state(),
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf(_))
    }

    /// Encode the node's own fields without any child subtrees
    pub fn encode_compact(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        match self {
            Node::Internal(n) => n.encode_compact(&mut buf),
            Node::Leaf(n) => n.encode(&mut buf),
        }
        buf
    }

    /// Decode a compact encoding as carried in proofs
    ///
    /// Internal nodes come back without children and with a dirty hash.
    pub fn decode_compact(data: &[u8]) -> Result<Node> {
        let mut reader = Reader::new(data);
        let node = match reader.peek()? {
            PREFIX_LEAF_NODE => Node::Leaf(LeafNode::decode(&mut reader)?),
            PREFIX_INTERNAL_NODE => Node::Internal(InternalNode::decode_compact(&mut reader)?),
            other => return Err(Error::Format(format!("unknown node prefix {:#04x}", other))),
        };
        reader.finish()?;
        Ok(node)
    }

    /// Decode a node loaded from the backing store under `expected`
    pub(crate) fn decode_storage(data: &[u8], expected: &Hash) -> Result<Node> {
        let mut reader = Reader::new(data);
        let node = match reader.peek()? {
            PREFIX_LEAF_NODE => Node::Leaf(LeafNode::decode(&mut reader)?),
            PREFIX_INTERNAL_NODE => {
                let mut node = InternalNode::decode_compact(&mut reader)?;
                node.left = stub_for(Hash::from_slice(reader.take(HASH_SIZE)?)?);
                node.right = stub_for(Hash::from_slice(reader.take(HASH_SIZE)?)?);
                Node::Internal(node)
            }
            other => return Err(Error::Format(format!("unknown node prefix {:#04x}", other))),
        };
        reader.finish()?;

        let mut node = node;
        match node.update_hash() {
            Some(hash) if hash == *expected => Ok(node),
            Some(hash) => Err(Error::Corruption(format!(
                "node stored under {} hashes to {}",
                expected, hash
            ))),
            None => Err(Error::Corruption(format!(
                "node stored under {} has dirty children",
                expected
            ))),
        }
    }

    /// Recompute the hash from the node's fields and its children's hashes
    ///
    /// Returns `None` if a child is still dirty.
    pub(crate) fn update_hash(&mut self) -> Option<Hash> {
        match self {
            Node::Leaf(n) => Some(n.update_hash()),
            Node::Internal(n) => n.update_hash(),
        }
    }
}

fn stub_for(hash: Hash) -> Option<NodePointer> {
    if hash.is_empty() {
        None
    } else {
        Some(NodePointer::Stub(hash))
    }
}

/// A key/value pair
#[derive(Clone, Debug, Default)]
pub struct LeafNode {
    pub(crate) version: u64,
    pub(crate) key: Vec<u8>,
    pub(crate) value: Vec<u8>,
    pub(crate) memo: Memo,
}

impl LeafNode {
    pub fn new(key: Vec<u8>, value: Vec<u8>) -> Self {
        LeafNode {
            version: 0,
            key,
            value,
            memo: Memo::Dirty,
        }
    }

    pub fn key(&self) -> &[u8] {
        &self.key
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn hash(&self) -> Option<Hash> {
        self.memo.hash()
    }

    pub fn state(&self) -> NodeState {
        self.memo.state()
    }

    /// The version this leaf carries once a commit at `commit` is applied
    pub(crate) fn pending_version(&self, commit: u64) -> u64 {
        match self.memo {
            Memo::Clean(_) => self.version,
            Memo::Dirty => commit,
        }
    }

    /// H(0x00 | version | key | H(value))
    pub(crate) fn hash_at(&self, version: u64) -> Hash {
        Hash::digest_many(&[
            &[PREFIX_LEAF_NODE],
            &version.to_le_bytes(),
            &self.key,
            Hash::digest(&self.value).as_bytes(),
        ])
    }

    pub(crate) fn update_hash(&mut self) -> Hash {
        let hash = self.hash_at(self.version);
        self.memo = Memo::Clean(hash);
        hash
    }

    pub(crate) fn encode(&self, buf: &mut Vec<u8>) {
        self.encode_at(self.version, buf)
    }

    pub(crate) fn encode_at(&self, version: u64, buf: &mut Vec<u8>) {
        let key_bits = key::bit_length(&self.key) as Depth;
        buf.push(PREFIX_LEAF_NODE);
        buf.extend_from_slice(&version.to_le_bytes());
        buf.extend_from_slice(&key_bits.to_le_bytes());
        buf.extend_from_slice(&self.key);
        buf.extend_from_slice(&(self.value.len() as u32).to_le_bytes());
        buf.extend_from_slice(&self.value);
    }

    fn decode(reader: &mut Reader<'_>) -> Result<LeafNode> {
        let prefix = reader.u8()?;
        if prefix != PREFIX_LEAF_NODE {
            return Err(Error::Format(format!(
                "expected leaf node, got prefix {:#04x}",
                prefix
            )));
        }
        let version = reader.u64()?;
        let key_bits = reader.u16()? as usize;
        if key_bits % 8 != 0 {
            return Err(Error::Format(format!(
                "leaf key length of {} bits is not byte aligned",
                key_bits
            )));
        }
        let key = reader.take(key_bits / 8)?.to_vec();
        let value_len = reader.u32()? as usize;
        let value = reader.take(value_len)?.to_vec();

        let mut leaf = LeafNode {
            version,
            key,
            value,
            memo: Memo::Dirty,
        };
        leaf.update_hash();
        Ok(leaf)
    }
}

/// A branching point in the tree
#[derive(Clone, Debug)]
pub struct InternalNode {
    pub(crate) version: u64,
    /// Bits on the incoming edge; for non-root nodes the first bit is the
    /// branching bit of the parent
    pub(crate) label: Vec<u8>,
    pub(crate) label_bit_length: Depth,
    /// The leaf whose key ends exactly at this node
    pub(crate) leaf_node: Option<LeafNode>,
    pub(crate) left: Option<NodePointer>,
    pub(crate) right: Option<NodePointer>,
    pub(crate) memo: Memo,
}

impl InternalNode {
    pub(crate) fn new(label: Vec<u8>, label_bit_length: Depth) -> Self {
        InternalNode {
            version: 0,
            label,
            label_bit_length,
            leaf_node: None,
            left: None,
            right: None,
            memo: Memo::Dirty,
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn label(&self) -> &[u8] {
        &self.label
    }

    pub fn label_bit_length(&self) -> Depth {
        self.label_bit_length
    }

    pub fn leaf_node(&self) -> Option<&LeafNode> {
        self.leaf_node.as_ref()
    }

    pub fn left(&self) -> Option<&NodePointer> {
        self.left.as_ref()
    }

    pub fn right(&self) -> Option<&NodePointer> {
        self.right.as_ref()
    }

    pub fn hash(&self) -> Option<Hash> {
        self.memo.hash()
    }

    /// Place `leaf` below a node that branches at bit `depth`
    pub(crate) fn attach(&mut self, leaf: LeafNode, depth: usize) {
        if key::bit_length(&leaf.key) == depth {
            self.leaf_node = Some(leaf);
        } else if key::get_bit(&leaf.key, depth) {
            self.right = Some(leaf.into());
        } else {
            self.left = Some(leaf.into());
        }
    }

    pub(crate) fn pending_version(&self, commit: u64) -> u64 {
        match self.memo {
            Memo::Clean(_) => self.version,
            Memo::Dirty => commit,
        }
    }

    /// H(0x01 | version | label_bits | label | leaf | left | right)
    pub(crate) fn hash_at(&self, version: u64, leaf: &Hash, left: &Hash, right: &Hash) -> Hash {
        Hash::digest_many(&[
            &[PREFIX_INTERNAL_NODE],
            &version.to_le_bytes(),
            &self.label_bit_length.to_le_bytes(),
            &self.label,
            leaf.as_bytes(),
            left.as_bytes(),
            right.as_bytes(),
        ])
    }

    fn update_hash(&mut self) -> Option<Hash> {
        let leaf = match &mut self.leaf_node {
            Some(leaf) => leaf.update_hash(),
            None => Hash::EMPTY,
        };
        let left = pointer_hash(&self.left)?;
        let right = pointer_hash(&self.right)?;
        let hash = self.hash_at(self.version, &leaf, &left, &right);
        self.memo = Memo::Clean(hash);
        Some(hash)
    }

    pub(crate) fn encode_compact(&self, buf: &mut Vec<u8>) {
        let leaf_version = self.leaf_node.as_ref().map_or(0, |leaf| leaf.version);
        self.encode_compact_at(self.version, leaf_version, buf)
    }

    fn encode_compact_at(&self, version: u64, leaf_version: u64, buf: &mut Vec<u8>) {
        buf.push(PREFIX_INTERNAL_NODE);
        buf.extend_from_slice(&version.to_le_bytes());
        buf.extend_from_slice(&self.label_bit_length.to_le_bytes());
        buf.extend_from_slice(&self.label);
        match &self.leaf_node {
            Some(leaf) => leaf.encode_at(leaf_version, buf),
            None => buf.push(PREFIX_NIL_NODE),
        }
    }

    /// Storage encoding as it will look once committed at `commit`
    ///
    /// Child hashes are passed in since dirty children have no memoized hash
    /// until the commit is applied.
    pub(crate) fn encode_storage_at(&self, commit: u64, left: &Hash, right: &Hash) -> Vec<u8> {
        let leaf_version = self
            .leaf_node
            .as_ref()
            .map_or(0, |leaf| leaf.pending_version(commit));
        let mut buf = Vec::new();
        self.encode_compact_at(self.pending_version(commit), leaf_version, &mut buf);
        buf.extend_from_slice(left.as_bytes());
        buf.extend_from_slice(right.as_bytes());
        buf
    }

    fn decode_compact(reader: &mut Reader<'_>) -> Result<InternalNode> {
        let prefix = reader.u8()?;
        if prefix != PREFIX_INTERNAL_NODE {
            return Err(Error::Format(format!(
                "expected internal node, got prefix {:#04x}",
                prefix
            )));
        }
        let version = reader.u64()?;
        let label_bit_length = reader.u16()?;
        let label = reader
            .take(key::bytes_for_bits(label_bit_length as usize))?
            .to_vec();
        let leaf_node = match reader.peek()? {
            PREFIX_NIL_NODE => {
                reader.u8()?;
                None
            }
            PREFIX_LEAF_NODE => Some(LeafNode::decode(reader)?),
            other => {
                return Err(Error::Format(format!(
                    "unexpected leaf slot prefix {:#04x}",
                    other
                )))
            }
        };

        Ok(InternalNode {
            version,
            label,
            label_bit_length,
            leaf_node,
            left: None,
            right: None,
            memo: Memo::Dirty,
        })
    }
}

impl Drop for InternalNode {
    /// Tears the subtree down one node at a time, so a long chain of
    /// internal nodes is freed without a stack frame per level
    fn drop(&mut self) {
        let mut pending: Vec<NodePointer> =
            self.left.take().into_iter().chain(self.right.take()).collect();
        while let Some(ptr) = pending.pop() {
            if let NodePointer::Resolved(mut node) = ptr {
                if let Node::Internal(internal) = &mut *node {
                    pending.extend(internal.left.take());
                    pending.extend(internal.right.take());
                }
            }
        }
    }
}

/// Bounds-checked cursor over an encoded node
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Reader { data, pos: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| {
                Error::Format(format!(
                    "truncated node: need {} bytes at offset {}, have {}",
                    len,
                    self.pos,
                    self.data.len()
                ))
            })?;
        let data = self.data;
        let out = &data[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn peek(&self) -> Result<u8> {
        self.data
            .get(self.pos)
            .copied()
            .ok_or_else(|| Error::Format("truncated node: missing prefix".into()))
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        let mut buf = [0u8; 2];
        buf.copy_from_slice(self.take(2)?);
        Ok(u16::from_le_bytes(buf))
    }

    fn u32(&mut self) -> Result<u32> {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(buf))
    }

    fn u64(&mut self) -> Result<u64> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(buf))
    }

    fn finish(&self) -> Result<()> {
        if self.pos == self.data.len() {
            Ok(())
        } else {
            Err(Error::Format(format!(
                "{} trailing bytes after node",
                self.data.len() - self.pos
            )))
        }
    }
}
