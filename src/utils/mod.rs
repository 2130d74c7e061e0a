//! Helpers shared across the engine that are not tied to a single table or heap.
//!
//! - [`hash`] - Content hashing for heap deduplication and the lookup hash indexes
//! - [`synchronization`] - The reader/writer lock embeddings use to share a store

pub mod hash;
pub mod synchronization;
