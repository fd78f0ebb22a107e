//! Proofs for single keys

use super::{resolve, step, Node, NodePointer, NodeState, Step, Tree};
use crate::context::Context;
use crate::model::MAX_KEY_SIZE;
use crate::proof::{Proof, ProofBuilder};
use crate::store::NodeStore;
use crate::{Error, Result};

impl<'a> Tree<'a> {
    /// Build a proof of the value stored under `key`, or of its absence
    ///
    /// Every node on the search path is disclosed in full, with its siblings
    /// collapsed to hashes. The tree must be committed.
    pub fn get_proof(&mut self, ctx: &Context, key: &[u8]) -> Result<Proof> {
        if key.len() > MAX_KEY_SIZE {
            return Err(Error::KeyTooLong(key.len()));
        }
        if self.root_state() == Some(NodeState::Dirty) {
            return Err(Error::Uncommitted);
        }
        let root = self.root_hash().ok_or(Error::Uncommitted)?;

        let store = self.store;
        load_path(ctx, store, &mut self.root, key)?;

        let mut builder = ProofBuilder::new(root);
        let mut node = self.root_node();
        let mut depth = 0;
        while let Some(current) = node {
            builder.include(Some(current));
            node = match current {
                Node::Leaf(_) => None,
                Node::Internal(internal) => match step(internal, key, depth) {
                    Step::Diverges(_) | Step::Here => None,
                    Step::Descend(next, right) => {
                        depth = next;
                        let child = if right {
                            internal.right()
                        } else {
                            internal.left()
                        };
                        child.and_then(NodePointer::node)
                    }
                },
            };
        }

        builder.build(ctx)
    }
}

/// Resolve every node on the search path for `key` together with both
/// children of each internal node along it
fn load_path(
    ctx: &Context,
    store: &dyn NodeStore,
    mut ptr: &mut Option<NodePointer>,
    key: &[u8],
) -> Result<()> {
    let mut depth = 0;
    loop {
        let Some(current) = ptr else {
            return Ok(());
        };
        let Node::Internal(internal) = resolve(ctx, store, current)? else {
            return Ok(());
        };

        for child in [&mut internal.left, &mut internal.right].into_iter().flatten() {
            resolve(ctx, store, child)?;
        }

        match step(internal, key, depth) {
            Step::Diverges(_) | Step::Here => return Ok(()),
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
