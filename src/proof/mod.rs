//! Compact Merkle proofs
//!
//! A proof is a pre-order listing of part of a tree. Nodes the prover chose
//! to disclose appear in full; every other subtree is collapsed to its hash.
//! The listing carries no lengths: an internal node in full is always
//! followed by exactly its left and then its right child.

mod builder;
mod verifier;

pub use builder::ProofBuilder;
pub use verifier::{verify_proof, VerifiedTree};

use crate::model::Hash;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::ops::Deref;

/// Entry holding a compact node encoding
pub const PROOF_ENTRY_FULL: u8 = 0x01;
/// Entry holding only a subtree hash
pub const PROOF_ENTRY_HASH: u8 = 0x02;

/// One serialized proof entry: a discriminant byte and its payload
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawProofEntry(#[serde(with = "serde_bytes")] pub Vec<u8>);

impl RawProofEntry {
    pub(crate) fn full(encoded: Vec<u8>) -> Self {
        let mut raw = Vec::with_capacity(encoded.len() + 1);
        raw.push(PROOF_ENTRY_FULL);
        raw.extend(encoded);
        RawProofEntry(raw)
    }

    pub(crate) fn hash(hash: &Hash) -> Self {
        let mut raw = Vec::with_capacity(hash.as_bytes().len() + 1);
        raw.push(PROOF_ENTRY_HASH);
        raw.extend_from_slice(hash.as_bytes());
        RawProofEntry(raw)
    }
}

impl Deref for RawProofEntry {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for RawProofEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RawProofEntry({})", hex::encode(&self.0))
    }
}

/// A partial disclosure of a tree, rooted at a claimed hash
///
/// The root is untrusted until [`verify_proof`] has checked it against a
/// root obtained some other way. `None` entries stand for empty subtrees.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof {
    pub entries: Vec<Option<RawProofEntry>>,
    pub untrusted_root: Hash,
}

impl Proof {
    /// Encode as a CBOR map of `entries` and `untrusted_root`
    pub fn to_cbor(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        ciborium::ser::into_writer(self, &mut out).map_err(|e| Error::Cbor(e.to_string()))?;
        Ok(out)
    }

    pub fn from_cbor(data: &[u8]) -> Result<Proof> {
        ciborium::de::from_reader(data).map_err(|e| Error::Cbor(e.to_string()))
    }
}
