//! Core value types: hashes, namespaces, roots and key bit helpers

mod hash;
pub mod key;
mod namespace;

pub use hash::{Hash, HASH_SIZE};
pub use key::{Depth, MAX_KEY_SIZE};
pub use namespace::{Namespace, Root, NAMESPACE_SIZE};
