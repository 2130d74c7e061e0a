//! Content hashing shared by heap deduplication and the hash indexes.

use std::hash::{Hash, Hasher};

use rustc_hash::FxHasher;

use crate::metadata::token::Token;

/// Hash a heap entry's raw bytes
#[must_use]
pub fn hash_blob(data: &[u8]) -> u64 {
    let mut hasher = FxHasher::default();
    data.hash(&mut hasher);
    hasher.finish()
}

/// Hash a GUID record
#[must_use]
pub fn hash_guid(guid: &[u8; 16]) -> u64 {
    let mut hasher = FxHasher::default();
    guid.hash(&mut hasher);
    hasher.finish()
}

/// Hash a name scoped by its parent token
#[must_use]
pub fn hash_scoped_name(parent: Token, name: &str) -> u64 {
    let mut hasher = FxHasher::default();
    parent.value().hash(&mut hasher);
    name.as_bytes().hash(&mut hasher);
    hasher.finish()
}

/// Hash a name scoped by a namespace string
#[must_use]
pub fn hash_qualified_name(namespace: &str, name: &str) -> u64 {
    let mut hasher = FxHasher::default();
    namespace.as_bytes().hash(&mut hasher);
    0u8.hash(&mut hasher);
    name.as_bytes().hash(&mut hasher);
    hasher.finish()
}
