//! Authenticated binary radix tree
//!
//! Keys are walked bit by bit. Internal nodes compress runs of shared bits
//! into an edge label and may carry the leaf whose key ends at their depth.
//! Subtrees are loaded lazily: a child is a [`NodePointer::Stub`] until an
//! operation needs to look inside it, at which point it is fetched from the
//! [`NodeStore`] and replaced in place.

mod commit;
mod mutate;
mod node;
mod prove;

#[cfg(test)]
pub(crate) mod testing;

pub use node::{
    InternalNode, LeafNode, Node, NodePointer, NodeState, PREFIX_INTERNAL_NODE, PREFIX_LEAF_NODE,
    PREFIX_NIL_NODE,
};
pub(crate) use node::pointer_hash;

use crate::context::Context;
use crate::model::key;
use crate::model::{Hash, MAX_KEY_SIZE};
use crate::store::NodeStore;
use crate::{Error, Result};
use std::collections::BTreeMap;
use tracing::trace;

/// A mutable view of one tree, backed by a node store
pub struct Tree<'a> {
    store: &'a dyn NodeStore,
    root: Option<NodePointer>,
    /// Latest uncommitted write per key; `None` records a removal
    pending: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
}

impl<'a> Tree<'a> {
    /// Create a new empty tree
    pub fn new(store: &'a dyn NodeStore) -> Self {
        Tree {
            store,
            root: None,
            pending: BTreeMap::new(),
        }
    }

    /// Open the tree committed under `root`; nothing is loaded until needed
    pub fn from_root(store: &'a dyn NodeStore, root: Hash) -> Self {
        let root = if root.is_empty() {
            None
        } else {
            Some(NodePointer::Stub(root))
        };
        Tree {
            store,
            root,
            pending: BTreeMap::new(),
        }
    }

    /// The root hash, or `None` while there are uncommitted changes
    pub fn root_hash(&self) -> Option<Hash> {
        pointer_hash(&self.root)
    }

    /// The root node, if it is loaded
    pub fn root_node(&self) -> Option<&Node> {
        self.root.as_ref().and_then(NodePointer::node)
    }

    pub fn root_state(&self) -> Option<NodeState> {
        self.root.as_ref().map(NodePointer::state)
    }

    /// Uncommitted writes in key order; a `None` value is a removal
    pub fn pending_writes(&self) -> impl Iterator<Item = (&[u8], Option<&[u8]>)> {
        self.pending
            .iter()
            .map(|(k, v)| (k.as_slice(), v.as_deref()))
    }

    pub fn store(&self) -> &'a dyn NodeStore {
        self.store
    }

    /// Look up the value stored under `key`
    pub fn get(&mut self, ctx: &Context, key: &[u8]) -> Result<Vec<u8>> {
        validate_key(key)?;
        let store = self.store;
        match lookup(ctx, store, &mut self.root, key)? {
            Some(value) => Ok(value.to_vec()),
            None => Err(Error::NotFound(format!("key {}", hex::encode(key)))),
        }
    }
}

fn validate_key(key: &[u8]) -> Result<()> {
    if key.len() > MAX_KEY_SIZE {
        return Err(Error::KeyTooLong(key.len()));
    }
    Ok(())
}

/// Load a stub from the store, replacing it in place
pub(crate) fn resolve<'n>(
    ctx: &Context,
    store: &dyn NodeStore,
    ptr: &'n mut NodePointer,
) -> Result<&'n mut Node> {
    if let NodePointer::Stub(hash) = *ptr {
        ctx.check()?;
        trace!(%hash, "resolving node");
        let data = store.get(&hash)?;
        let node = Node::decode_storage(&data, &hash)?;
        *ptr = NodePointer::Resolved(Box::new(node));
    }
    loaded(ptr)
}

/// A node that an earlier walk has already resolved
pub(crate) fn loaded(ptr: &mut NodePointer) -> Result<&mut Node> {
    match ptr {
        NodePointer::Resolved(node) => Ok(&mut **node),
        NodePointer::Stub(hash) => Err(Error::Corruption(format!("node {} not resolved", hash))),
    }
}

/// Result of matching a key against an internal node's edge label
pub(crate) enum Step {
    /// The key diverges from the label after this many bits
    Diverges(usize),
    /// The key ends exactly at this node
    Here,
    /// Continue into the child at this depth, right if `true`
    Descend(usize, bool),
}

/// Match `key` against the label of `node` sitting at bit `depth`
pub(crate) fn step(node: &InternalNode, key: &[u8], depth: usize) -> Step {
    let label_bits = node.label_bit_length as usize;
    let key_bits = key::bit_length(key);
    let shared = key::label_match_len(&node.label, label_bits, key, depth);

    if shared < label_bits {
        return Step::Diverges(shared);
    }
    let depth = depth + label_bits;
    if key_bits == depth {
        Step::Here
    } else {
        Step::Descend(depth, key::get_bit(key, depth))
    }
}

/// Walk the search path for `key`, resolving it on the way
pub(crate) fn lookup<'n>(
    ctx: &Context,
    store: &dyn NodeStore,
    mut ptr: &'n mut Option<NodePointer>,
    key: &[u8],
) -> Result<Option<&'n [u8]>> {
    let mut depth = 0;
    loop {
        let Some(current) = ptr else {
            return Ok(None);
        };
        let node = match resolve(ctx, store, current)? {
            Node::Leaf(leaf) => return Ok((leaf.key == key).then_some(leaf.value.as_slice())),
            Node::Internal(node) => node,
        };
        match step(node, key, depth) {
            Step::Diverges(_) => return Ok(None),
            Step::Here => return Ok(node.leaf_node.as_ref().map(|leaf| leaf.value.as_slice())),
            Step::Descend(next, right) => {
                depth = next;
                ptr = if right {
                    &mut node.right
                } else {
                    &mut node.left
                };
            }
        }
    }
}
