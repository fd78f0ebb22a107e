//! Insert and remove
//!
//! Both operations first walk the key's path resolving every node they will
//! touch, then make their change in a second walk that never fetches. A
//! failed or cancelled fetch therefore leaves the tree as it was. Walks are
//! loops, so path length is bounded by key length and not by the call stack.

use super::node::Memo;
use super::{
    loaded, lookup, resolve, step, validate_key, InternalNode, LeafNode, Node, NodePointer, Step,
    Tree,
};
use crate::context::Context;
use crate::model::key::{self, Depth};
use crate::store::NodeStore;
use crate::{Error, Result};

impl<'a> Tree<'a> {
    /// Insert or overwrite `key`
    ///
    /// Writing a value equal to the current one leaves the tree clean.
    pub fn insert(&mut self, ctx: &Context, key: &[u8], value: &[u8]) -> Result<()> {
        validate_key(key)?;
        if u32::try_from(value.len()).is_err() {
            return Err(Error::ValueTooLarge(value.len()));
        }

        let store = self.store;
        if lookup(ctx, store, &mut self.root, key)? == Some(value) {
            return Ok(());
        }
        insert_loaded(&mut self.root, key, value)?;
        self.pending.insert(key.to_vec(), Some(value.to_vec()));
        Ok(())
    }

    /// Remove `key`, returning its previous value
    pub fn remove(&mut self, ctx: &Context, key: &[u8]) -> Result<Option<Vec<u8>>> {
        validate_key(key)?;

        let store = self.store;
        if !load_for_removal(ctx, store, &mut self.root, key)? {
            return Ok(None);
        }
        let removed = remove_loaded(&mut self.root, key)?;
        if removed.is_some() {
            self.pending.insert(key.to_vec(), None);
        }
        Ok(removed)
    }
}

/// Write `key` into a tree whose search path for it is already resolved
///
/// Every internal node on the way down is marked dirty.
fn insert_loaded(mut ptr: &mut Option<NodePointer>, key: &[u8], value: &[u8]) -> Result<()> {
    let mut depth = 0;
    loop {
        let Some(existing) = ptr else {
            *ptr = Some(LeafNode::new(key.to_vec(), value.to_vec()).into());
            return Ok(());
        };

        let node = loaded(existing)?;
        let internal = match node {
            Node::Leaf(leaf) if leaf.key == key => {
                set_value(leaf, value);
                return Ok(());
            }
            Node::Leaf(leaf) => {
                let key_bits = key::bit_length(key);
                let shared =
                    key::common_prefix_len(key, key_bits, &leaf.key, key::bit_length(&leaf.key));

                let mut branch = InternalNode::new(
                    key::extract(key, depth, shared - depth),
                    (shared - depth) as Depth,
                );
                branch.attach(std::mem::take(leaf), shared);
                branch.attach(LeafNode::new(key.to_vec(), value.to_vec()), shared);
                *node = Node::Internal(branch);
                return Ok(());
            }
            Node::Internal(internal) => internal,
        };

        internal.memo = Memo::Dirty;
        match step(internal, key, depth) {
            Step::Diverges(shared) => {
                split_edge(internal, shared);
                internal.attach(LeafNode::new(key.to_vec(), value.to_vec()), depth + shared);
                return Ok(());
            }
            Step::Here => {
                match &mut internal.leaf_node {
                    Some(leaf) => set_value(leaf, value),
                    None => internal.leaf_node = Some(LeafNode::new(key.to_vec(), value.to_vec())),
                }
                return Ok(());
            }
            Step::Descend(next, right) => {
                depth = next;
                ptr = if right {
                    &mut internal.right
                } else {
                    &mut internal.left
                };
            }
        }
    }
}

fn set_value(leaf: &mut LeafNode, value: &[u8]) {
    leaf.value = value.to_vec();
    leaf.memo = Memo::Dirty;
}

/// Insert a new branching node `shared` bits into the edge above `node`
///
/// `node` is replaced by the new branch and moved below it with the
/// remainder of its label.
fn split_edge(node: &mut InternalNode, shared: usize) {
    let label_bits = node.label_bit_length as usize;
    let (prefix, suffix) = key::split(&node.label, shared, label_bits);

    let mut lower = std::mem::replace(node, InternalNode::new(prefix, shared as Depth));
    let goes_right = key::get_bit(&suffix, 0);
    lower.label = suffix;
    lower.label_bit_length = (label_bits - shared) as Depth;
    lower.memo = Memo::Dirty;

    if goes_right {
        node.right = Some(lower.into());
    } else {
        node.left = Some(lower.into());
    }
}

/// Resolve the path to `key` plus whatever will survive its removal
///
/// Returns whether `key` is present.
fn load_for_removal(
    ctx: &Context,
    store: &dyn NodeStore,
    mut ptr: &mut Option<NodePointer>,
    key: &[u8],
) -> Result<bool> {
    let mut depth = 0;
    loop {
        let Some(current) = ptr else {
            return Ok(false);
        };
        let internal = match resolve(ctx, store, current)? {
            Node::Leaf(leaf) => return Ok(leaf.key == key),
            Node::Internal(internal) => internal,
        };

        let (next, right) = match step(internal, key, depth) {
            Step::Diverges(_) => return Ok(false),
            Step::Here => {
                if internal.leaf_node.is_none() {
                    return Ok(false);
                }
                prepare_collapse(ctx, store, internal, None)?;
                return Ok(true);
            }
            Step::Descend(next, right) => (next, right),
        };

        let child = if right {
            &mut internal.right
        } else {
            &mut internal.left
        };
        let Some(child) = child else {
            return Ok(false);
        };
        let child_leaf_matches = match resolve(ctx, store, child)? {
            Node::Leaf(leaf) => Some(leaf.key == key),
            Node::Internal(_) => None,
        };
        match child_leaf_matches {
            Some(false) => return Ok(false),
            Some(true) => {
                prepare_collapse(ctx, store, internal, Some(right))?;
                return Ok(true);
            }
            None => {
                depth = next;
                ptr = if right {
                    &mut internal.right
                } else {
                    &mut internal.left
                };
            }
        }
    }
}

/// Resolve the child that will be left alone once the slot being emptied is
/// gone, so that [`collapse`] never has to fetch
///
/// `emptied` is `None` for the leaf slot, otherwise the side of the child.
fn prepare_collapse(
    ctx: &Context,
    store: &dyn NodeStore,
    node: &mut InternalNode,
    emptied: Option<bool>,
) -> Result<()> {
    let survivor = match emptied {
        None => match (&mut node.left, &mut node.right) {
            (Some(only), None) | (None, Some(only)) => Some(only),
            _ => None,
        },
        Some(right) if node.leaf_node.is_none() => {
            if right {
                node.left.as_mut()
            } else {
                node.right.as_mut()
            }
        }
        Some(_) => None,
    };

    if let Some(survivor) = survivor {
        resolve(ctx, store, survivor)?;
    }
    Ok(())
}

/// What removing a key means for the node under a pointer
enum Removal {
    Absent,
    /// The pointer itself holds the leaf
    Leaf,
    /// The leaf sits in the node's leaf slot
    Slot,
    /// The leaf is the node's child on the given side
    Child(bool),
    /// Continue into the child at this depth, right if `true`
    Descend(usize, bool),
}

fn removal_at(ptr: &Option<NodePointer>, key: &[u8], depth: usize) -> Result<Removal> {
    let internal = match ptr.as_ref().map(loaded_ref).transpose()? {
        None => return Ok(Removal::Absent),
        Some(Node::Leaf(leaf)) if leaf.key == key => return Ok(Removal::Leaf),
        Some(Node::Leaf(_)) => return Ok(Removal::Absent),
        Some(Node::Internal(internal)) => internal,
    };

    Ok(match step(internal, key, depth) {
        Step::Diverges(_) => Removal::Absent,
        Step::Here if internal.leaf_node.is_some() => Removal::Slot,
        Step::Here => Removal::Absent,
        Step::Descend(next, right) => {
            let child = if right {
                internal.right()
            } else {
                internal.left()
            };
            match child.map(loaded_ref).transpose()? {
                None => Removal::Absent,
                Some(Node::Leaf(leaf)) if leaf.key == key => Removal::Child(right),
                Some(Node::Leaf(_)) => Removal::Absent,
                Some(Node::Internal(_)) => Removal::Descend(next, right),
            }
        }
    })
}

fn loaded_ref(ptr: &NodePointer) -> Result<&Node> {
    match ptr {
        NodePointer::Resolved(node) => Ok(node),
        NodePointer::Stub(hash) => Err(Error::Corruption(format!("node {} not resolved", hash))),
    }
}

/// Remove `key` from a tree prepared by [`load_for_removal`]
fn remove_loaded(mut ptr: &mut Option<NodePointer>, key: &[u8]) -> Result<Option<Vec<u8>>> {
    let mut depth = 0;
    loop {
        let removed = match removal_at(ptr, key, depth)? {
            Removal::Absent => return Ok(None),
            Removal::Leaf => leaf_value(ptr.take()),
            Removal::Slot => {
                let internal = loaded_internal(ptr)?;
                internal.memo = Memo::Dirty;
                internal.leaf_node.take().map(|leaf| leaf.value)
            }
            Removal::Child(right) => {
                let internal = loaded_internal(ptr)?;
                internal.memo = Memo::Dirty;
                leaf_value(if right {
                    internal.right.take()
                } else {
                    internal.left.take()
                })
            }
            Removal::Descend(next, right) => {
                depth = next;
                let internal = loaded_internal(ptr)?;
                internal.memo = Memo::Dirty;
                ptr = if right {
                    &mut internal.right
                } else {
                    &mut internal.left
                };
                continue;
            }
        };

        collapse(ptr);
        return Ok(removed);
    }
}

fn loaded_internal(ptr: &mut Option<NodePointer>) -> Result<&mut InternalNode> {
    match ptr.as_mut().map(loaded).transpose()? {
        Some(Node::Internal(internal)) => Ok(internal),
        _ => Err(Error::Corruption("expected an internal node".into())),
    }
}

fn leaf_value(ptr: Option<NodePointer>) -> Option<Vec<u8>> {
    match ptr {
        Some(NodePointer::Resolved(node)) => match *node {
            Node::Leaf(leaf) => Some(leaf.value),
            Node::Internal(_) => None,
        },
        _ => None,
    }
}

/// Restore the canonical shape of an internal node that just lost a slot
fn collapse(ptr: &mut Option<NodePointer>) {
    let Some(NodePointer::Resolved(node)) = ptr else {
        return;
    };
    let Node::Internal(internal) = &mut **node else {
        return;
    };

    match (
        internal.leaf_node.is_some(),
        internal.left.is_some(),
        internal.right.is_some(),
    ) {
        (true, false, false) => {
            if let Some(mut leaf) = internal.leaf_node.take() {
                // No longer embedded, so it has to be written on its own
                leaf.memo = Memo::Dirty;
                *ptr = Some(leaf.into());
            }
        }
        (false, true, false) | (false, false, true) => {
            let label = std::mem::take(&mut internal.label);
            let label_bits = internal.label_bit_length as usize;
            let mut survivor = internal.left.take().or_else(|| internal.right.take());

            if let Some(NodePointer::Resolved(child)) = &mut survivor {
                if let Node::Internal(child) = &mut **child {
                    let child_bits = child.label_bit_length as usize;
                    child.label = key::merge(&label, label_bits, &child.label, child_bits);
                    child.label_bit_length = (label_bits + child_bits) as Depth;
                    child.memo = Memo::Dirty;
                }
            }
            *ptr = survivor;
        }
        (false, false, false) => *ptr = None,
        _ => {}
    }
}
