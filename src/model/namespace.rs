//! Tree namespaces and committed roots

use super::hash::Hash;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Size of a namespace identifier in bytes
pub const NAMESPACE_SIZE: usize = 32;

/// Identifies which tree a root belongs to
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Namespace([u8; NAMESPACE_SIZE]);

impl Namespace {
    pub fn from_bytes(bytes: [u8; NAMESPACE_SIZE]) -> Self {
        Namespace(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; NAMESPACE_SIZE] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        let arr: [u8; NAMESPACE_SIZE] = bytes
            .try_into()
            .map_err(|_| hex::FromHexError::InvalidStringLength)?;
        Ok(Namespace(arr))
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Namespace({})", &self.to_hex()[..8])
    }
}

impl Serialize for Namespace {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Namespace {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Namespace::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// A committed tree root: the hash of a namespace's tree at a version
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Root {
    pub namespace: Namespace,
    pub version: u64,
    pub hash: Hash,
}

impl Root {
    pub fn new(namespace: Namespace, version: u64, hash: Hash) -> Self {
        Root {
            namespace,
            version,
            hash,
        }
    }

    /// The root of an empty tree
    pub fn empty(namespace: Namespace, version: u64) -> Self {
        Root::new(namespace, version, Hash::EMPTY)
    }
}
