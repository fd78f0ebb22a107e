//! Checking proofs against a trusted root

use super::{Proof, RawProofEntry, PROOF_ENTRY_FULL, PROOF_ENTRY_HASH};
use crate::model::key;
use crate::model::{Hash, MAX_KEY_SIZE};
use crate::tree::{InternalNode, Node, NodePointer};
use crate::{Error, Result};
use std::slice;

/// Deepest bit position any key can reach
const MAX_DEPTH: usize = MAX_KEY_SIZE * 8;

/// Rebuild the partial tree described by `proof` and check it hashes to
/// `trusted_root`
///
/// Nodes disclosed in full come back resolved with recomputed hashes;
/// collapsed subtrees come back as stubs.
pub fn verify_proof(trusted_root: &Hash, proof: &Proof) -> Result<NodePointer> {
    if proof.entries.is_empty() {
        return Err(Error::Structure("proof has no entries".into()));
    }

    let mut entries = proof.entries.iter();
    let root = read_tree(&mut entries)?
        .ok_or_else(|| Error::Structure("proof root is an empty subtree".into()))?;

    let extra = entries.len();
    if extra > 0 {
        return Err(Error::Structure(format!(
            "{} entries left over after the root subtree",
            extra
        )));
    }

    if proof.untrusted_root != *trusted_root {
        return Err(Error::RootMismatch {
            expected: *trusted_root,
            got: proof.untrusted_root,
        });
    }

    let computed = root
        .hash()
        .ok_or_else(|| Error::Structure("reconstructed root has no hash".into()))?;
    if computed != *trusted_root {
        return Err(Error::ProofInvalid {
            expected: *trusted_root,
            computed,
        });
    }

    Ok(root)
}

/// An internal node whose children are still being read
struct Pending {
    node: InternalNode,
    /// Bit depth below the node's label
    depth: usize,
    /// Set once the left subtree is complete
    left: Option<Option<NodePointer>>,
}

/// Consume exactly one subtree from `entries`
///
/// Entries are a pre-order listing, so the tree is rebuilt with an explicit
/// stack of nodes waiting on their children. Proof depth therefore costs
/// heap, never call stack.
fn read_tree(
    entries: &mut slice::Iter<'_, Option<RawProofEntry>>,
) -> Result<Option<NodePointer>> {
    let mut stack: Vec<Pending> = Vec::new();

    loop {
        let mut done = match read_entry(entries)? {
            Entry::Subtree(subtree) => subtree,
            Entry::Internal(node) => {
                let label_bits = node.label_bit_length() as usize;
                if label_bits == 0 && !stack.is_empty() {
                    return Err(Error::Structure("empty edge label below the root".into()));
                }
                let depth = stack.last().map_or(0, |parent| parent.depth) + label_bits;
                if depth > MAX_DEPTH {
                    return Err(Error::Structure(format!(
                        "node at bit depth {} is deeper than any key",
                        depth
                    )));
                }
                stack.push(Pending {
                    node,
                    depth,
                    left: None,
                });
                continue;
            }
        };

        // Hand the finished subtree to its parent, finishing every parent
        // whose right side it completes
        loop {
            match stack.pop() {
                None => return Ok(done),
                Some(Pending {
                    node,
                    depth,
                    left: None,
                }) => {
                    stack.push(Pending {
                        node,
                        depth,
                        left: Some(done),
                    });
                    break;
                }
                Some(Pending {
                    mut node,
                    left: Some(left),
                    ..
                }) => {
                    node.left = left;
                    node.right = done;
                    let mut node = Node::Internal(node);
                    node.update_hash()
                        .ok_or_else(|| Error::Structure("child without a hash".into()))?;
                    done = Some(node.into());
                }
            }
        }
    }
}

enum Entry {
    /// A complete subtree: empty, collapsed to a hash, or a single leaf
    Subtree(Option<NodePointer>),
    /// An internal node; its children follow
    Internal(InternalNode),
}

fn read_entry(entries: &mut slice::Iter<'_, Option<RawProofEntry>>) -> Result<Entry> {
    let entry = match entries.next() {
        None => return Err(Error::Structure("proof ended early".into())),
        Some(None) => return Ok(Entry::Subtree(None)),
        Some(Some(entry)) => entry,
    };

    let (&kind, payload) = entry
        .split_first()
        .ok_or_else(|| Error::Format("empty proof entry".into()))?;

    match kind {
        PROOF_ENTRY_HASH => Ok(Entry::Subtree(Some(NodePointer::Stub(Hash::from_slice(
            payload,
        )?)))),
        PROOF_ENTRY_FULL => match Node::decode_compact(payload)? {
            Node::Internal(internal) => Ok(Entry::Internal(internal)),
            leaf => Ok(Entry::Subtree(Some(leaf.into()))),
        },
        other => Err(Error::Format(format!(
            "unknown proof entry discriminant {:#04x}",
            other
        ))),
    }
}

/// A verified partial tree
///
/// Lookups only succeed along paths the proof disclosed.
pub struct VerifiedTree {
    root: NodePointer,
}

impl VerifiedTree {
    /// Verify `proof` against `trusted_root`
    pub fn new(trusted_root: &Hash, proof: &Proof) -> Result<Self> {
        Ok(VerifiedTree {
            root: verify_proof(trusted_root, proof)?,
        })
    }

    pub fn root(&self) -> &NodePointer {
        &self.root
    }

    /// Look up `key` in the disclosed material
    ///
    /// `Ok(None)` means the proof shows the key is absent. Fails with
    /// [`Error::UnresolvedSubtree`] if the path leads into a collapsed
    /// subtree.
    pub fn get(&self, key: &[u8]) -> Result<Option<&[u8]>> {
        if key.len() > MAX_KEY_SIZE {
            return Err(Error::KeyTooLong(key.len()));
        }

        let key_bits = key::bit_length(key);
        let mut ptr = Some(&self.root);
        let mut depth = 0;

        loop {
            let node = match ptr {
                None => return Ok(None),
                Some(NodePointer::Stub(hash)) => return Err(Error::UnresolvedSubtree(*hash)),
                Some(NodePointer::Resolved(node)) => node,
            };

            let internal = match &**node {
                Node::Leaf(leaf) => {
                    return Ok((leaf.key() == key).then_some(leaf.value()));
                }
                Node::Internal(internal) => internal,
            };

            let label_bits = internal.label_bit_length() as usize;
            let shared = key::label_match_len(internal.label(), label_bits, key, depth);
            if shared < label_bits {
                return Ok(None);
            }

            depth += label_bits;
            if depth == key_bits {
                return Ok(internal.leaf_node().map(|leaf| leaf.value()));
            }
            ptr = if key::get_bit(key, depth) {
                internal.right()
            } else {
                internal.left()
            };
        }
    }
}
