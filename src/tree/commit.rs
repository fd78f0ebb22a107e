//! Finalizing dirty hashes and persisting a version

use super::node::Memo;
use super::{pointer_hash, InternalNode, Node, NodePointer, NodeState, Tree};
use crate::context::Context;
use crate::model::{Hash, Namespace, Root};
use crate::store::WriteBatch;
use crate::{Error, Result};
use tracing::debug;

impl<'a> Tree<'a> {
    /// Hash every dirty node, write the new nodes and record the root
    ///
    /// Nodes only take on `version` and their new hashes once the store has
    /// accepted the batch, so a failed commit can simply be retried.
    pub fn commit(&mut self, ctx: &Context, namespace: Namespace, version: u64) -> Result<Hash> {
        ctx.check()?;

        if self.pending.is_empty() && self.root_state() != Some(NodeState::Dirty) {
            return pointer_hash(&self.root).ok_or(Error::Uncommitted);
        }

        let mut plan = Plan {
            version,
            batch: WriteBatch::new(),
            hashes: Vec::new(),
        };
        let root_hash = plan.run(ctx, &self.root)?;

        ctx.check()?;
        let nodes = plan.batch.len();
        self.store
            .apply(&Root::new(namespace, version, root_hash), plan.batch)?;

        stamp(&mut self.root, version, plan.hashes)?;
        self.pending.clear();

        debug!(
            %namespace,
            version,
            root = %root_hash,
            nodes,
            "committed tree"
        );
        Ok(root_hash)
    }
}

/// Read-only pass over the dirty part of the tree
///
/// Walks dirty nodes in pre-order, recording every new hash at the position
/// the node is visited (leaf slot first, then the node, then its children)
/// and collecting the storage encodings to write.
struct Plan {
    version: u64,
    batch: WriteBatch,
    hashes: Vec<Hash>,
}

enum Task<'t> {
    Visit(&'t Option<NodePointer>),
    /// Both children are hashed; `slot` is where the node's own hash goes
    Finish {
        node: &'t InternalNode,
        leaf: Hash,
        slot: usize,
    },
}

impl Plan {
    fn run(&mut self, ctx: &Context, root: &Option<NodePointer>) -> Result<Hash> {
        let mut tasks = vec![Task::Visit(root)];
        let mut done: Vec<Hash> = Vec::new();

        while let Some(task) = tasks.pop() {
            match task {
                Task::Visit(ptr) => {
                    let node = match ptr {
                        None => {
                            done.push(Hash::EMPTY);
                            continue;
                        }
                        Some(NodePointer::Stub(hash)) => {
                            done.push(*hash);
                            continue;
                        }
                        Some(NodePointer::Resolved(node)) => node,
                    };
                    if let Some(hash) = node.hash() {
                        done.push(hash);
                        continue;
                    }

                    match &**node {
                        Node::Leaf(leaf) => {
                            let hash = leaf.hash_at(self.version);
                            let mut data = Vec::new();
                            leaf.encode_at(self.version, &mut data);
                            self.batch.push(hash, data);
                            self.hashes.push(hash);
                            done.push(hash);
                        }
                        Node::Internal(internal) => {
                            ctx.check()?;

                            let leaf = match &internal.leaf_node {
                                None => Hash::EMPTY,
                                Some(leaf) => match leaf.hash() {
                                    Some(hash) => hash,
                                    None => {
                                        let hash = leaf.hash_at(self.version);
                                        self.hashes.push(hash);
                                        hash
                                    }
                                },
                            };
                            let slot = self.hashes.len();
                            self.hashes.push(Hash::EMPTY);

                            tasks.push(Task::Finish {
                                node: internal,
                                leaf,
                                slot,
                            });
                            tasks.push(Task::Visit(&internal.right));
                            tasks.push(Task::Visit(&internal.left));
                        }
                    }
                }
                Task::Finish { node, leaf, slot } => {
                    let (Some(right), Some(left)) = (done.pop(), done.pop()) else {
                        return Err(plan_out_of_step());
                    };
                    let hash = node.hash_at(self.version, &leaf, &left, &right);
                    self.batch
                        .push(hash, node.encode_storage_at(self.version, &left, &right));
                    self.hashes[slot] = hash;
                    done.push(hash);
                }
            }
        }

        match (done.pop(), done.is_empty()) {
            (Some(hash), true) => Ok(hash),
            _ => Err(plan_out_of_step()),
        }
    }
}

/// Apply the hashes computed by [`Plan::run`], in the same order
fn stamp(root: &mut Option<NodePointer>, version: u64, hashes: Vec<Hash>) -> Result<()> {
    let mut hashes = hashes.into_iter();
    let mut pending = vec![root];

    while let Some(ptr) = pending.pop() {
        let Some(NodePointer::Resolved(node)) = ptr else {
            continue;
        };
        if node.state() != NodeState::Dirty {
            continue;
        }

        match &mut **node {
            Node::Leaf(leaf) => {
                leaf.version = version;
                leaf.memo = Memo::Clean(next_hash(&mut hashes)?);
            }
            Node::Internal(internal) => {
                if let Some(leaf) = &mut internal.leaf_node {
                    if leaf.state() == NodeState::Dirty {
                        leaf.version = version;
                        leaf.memo = Memo::Clean(next_hash(&mut hashes)?);
                    }
                }
                internal.version = version;
                internal.memo = Memo::Clean(next_hash(&mut hashes)?);
                pending.push(&mut internal.right);
                pending.push(&mut internal.left);
            }
        }
    }

    match hashes.next() {
        None => Ok(()),
        Some(_) => Err(plan_out_of_step()),
    }
}

fn next_hash(hashes: &mut impl Iterator<Item = Hash>) -> Result<Hash> {
    hashes.next().ok_or_else(plan_out_of_step)
}

fn plan_out_of_step() -> Error {
    Error::Corruption("commit plan out of step with tree".into())
}
