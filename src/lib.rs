//! # mkvs
//!
//! A Merklized key-value store: an authenticated binary radix tree whose
//! root hash commits to its whole contents, with compact proofs that let a
//! verifier holding only a trusted root check part of the tree.
//!
//! ## Core Concepts
//!
//! - **Tree**: insert, remove and get over lazily loaded nodes; `commit`
//!   finalizes a version and returns its root hash
//! - **Node store**: content-addressed storage of encoded nodes
//! - **Proofs**: a pre-order listing of disclosed nodes with every other
//!   subtree collapsed to its hash
//!
//! ## Example
//!
//! ```
//! use mkvs::{verify_proof, Context, MemoryStore, Namespace, ProofBuilder, Tree};
//!
//! let store = MemoryStore::new();
//! let ctx = Context::background();
//!
//! let mut tree = Tree::new(&store);
//! tree.insert(&ctx, b"greeting", b"hello")?;
//! let root = tree.commit(&ctx, Namespace::default(), 0)?;
//!
//! let mut builder = ProofBuilder::new(root);
//! builder.include(tree.root_node());
//! let proof = builder.build(&ctx)?;
//!
//! verify_proof(&root, &proof)?;
//! # Ok::<(), mkvs::Error>(())
//! ```

pub mod config;
pub mod context;
pub mod model;
pub mod proof;
pub mod store;
pub mod tree;

mod error;

pub use config::Config;
pub use context::Context;
pub use error::{Error, Result};
pub use model::{Hash, Namespace, Root};
pub use proof::{verify_proof, Proof, ProofBuilder, RawProofEntry, VerifiedTree};
pub use store::{FileStore, MemoryStore, NodeStore, WriteBatch};
pub use tree::{Node, NodePointer, NodeState, Tree};

/// Store file format version
pub const VERSION: u32 = 1;

/// Magic bytes for store file identification
pub const MAGIC: &[u8; 8] = b"MKVSNODE";
