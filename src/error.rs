//! Error types for mkvs

use crate::model::Hash;
use thiserror::Error;

/// Result type alias for mkvs operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in mkvs operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CBOR error: {0}")]
    Cbor(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Malformed encoding: {0}")]
    Format(String),

    #[error("Malformed proof structure: {0}")]
    Structure(String),

    #[error("Incomplete proof: the root node was never included")]
    IncompleteProof,

    #[error("Unresolved subtree {0} reached while building a proof")]
    UnresolvedSubtree(Hash),

    #[error("Proof for unexpected root: expected {expected}, got {got}")]
    RootMismatch { expected: Hash, got: Hash },

    #[error("Invalid proof: expected root {expected}, computed {computed}")]
    ProofInvalid { expected: Hash, computed: Hash },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Key too long: {0} bytes")]
    KeyTooLong(usize),

    #[error("Value too large: {0} bytes")]
    ValueTooLarge(usize),

    #[error("Tree has uncommitted changes")]
    Uncommitted,

    #[error("Corruption detected: {0}")]
    Corruption(String),

    #[error("Invalid database file: {0}")]
    InvalidFile(String),

    #[error("Version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },

    #[error("Config error: {0}")]
    Config(String),
}
