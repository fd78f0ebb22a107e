//! Building proofs from an in-memory tree

use super::{Proof, RawProofEntry};
use crate::context::Context;
use crate::model::Hash;
use crate::tree::{Node, NodePointer};
use crate::{Error, Result};
use std::collections::HashSet;
use tracing::{debug, warn};

/// Identity of a node in memory
///
/// Distinct subtrees may share a hash, so inclusion is tracked by address.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
struct NodeId(usize);

impl NodeId {
    fn of(node: &Node) -> Self {
        NodeId(node as *const Node as usize)
    }
}

/// Collects the nodes to disclose and serializes them into a [`Proof`]
///
/// The builder borrows the tree, so the nodes it refers to cannot move or
/// change until it is dropped.
pub struct ProofBuilder<'a> {
    root: Hash,
    root_node: Option<&'a Node>,
    included: HashSet<NodeId>,
}

impl<'a> ProofBuilder<'a> {
    pub fn new(root: Hash) -> Self {
        ProofBuilder {
            root,
            root_node: None,
            included: HashSet::new(),
        }
    }

    /// Whether the node with the root hash has been included
    pub fn has_root(&self) -> bool {
        self.root_node.is_some()
    }

    pub fn root(&self) -> Hash {
        self.root
    }

    /// Disclose `node` in full
    ///
    /// Including `None` or the same node twice is a no-op. Nodes with
    /// uncommitted changes are ignored.
    pub fn include(&mut self, node: Option<&'a Node>) {
        let Some(node) = node else {
            return;
        };
        let Some(hash) = node.hash() else {
            warn!("ignoring dirty node included in proof");
            return;
        };

        if hash == self.root {
            self.root_node = Some(node);
        }
        self.included.insert(NodeId::of(node));
    }

    /// Serialize the included nodes
    ///
    /// Fails with [`Error::UnresolvedSubtree`] if an included node has a
    /// child that was never loaded.
    pub fn build(&self, ctx: &Context) -> Result<Proof> {
        let root = self.root_node.ok_or(Error::IncompleteProof)?;

        let mut entries = Vec::new();
        self.visit(ctx, root, &mut entries)?;

        debug!(
            root = %self.root,
            entries = entries.len(),
            included = self.included.len(),
            "built proof"
        );
        Ok(Proof {
            entries,
            untrusted_root: self.root,
        })
    }

    /// Pre-order walk: a full entry for each included node followed by
    /// its left and right subtrees, a hash entry for anything else
    fn visit(
        &self,
        ctx: &Context,
        root: &Node,
        entries: &mut Vec<Option<RawProofEntry>>,
    ) -> Result<()> {
        let mut pending = vec![Some(root)];

        while let Some(next) = pending.pop() {
            ctx.check()?;
            let Some(node) = next else {
                entries.push(None);
                continue;
            };

            if !self.included.contains(&NodeId::of(node)) {
                let hash = node.hash().ok_or(Error::Uncommitted)?;
                entries.push(Some(RawProofEntry::hash(&hash)));
                continue;
            }

            entries.push(Some(RawProofEntry::full(node.encode_compact())));
            if let Node::Internal(internal) = node {
                for child in [internal.right(), internal.left()] {
                    pending.push(match child {
                        None => None,
                        Some(NodePointer::Stub(hash)) => {
                            return Err(Error::UnresolvedSubtree(*hash))
                        }
                        Some(NodePointer::Resolved(child)) => Some(&**child),
                    });
                }
            }
        }
        Ok(())
    }
}
