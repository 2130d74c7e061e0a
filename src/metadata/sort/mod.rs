//! Table sorting with token remapping.
//!
//! Sorting a table renumbers its rows. Anything outside the store that cached a token of a
//! sorted table (IL bodies, symbol writers, a host's own maps) learns about the move through a
//! [`TokenRemapListener`], one [`TokenRemap`] per row that changed position. Inside the store,
//! moves are accumulated in a [`TokenMovementMap`] so that columns referencing moved rows can be
//! rewritten afterwards with [`crate::TableStore::fix_up_table`].
//!
//! # Key Components
//!
//! - [`TableSorter`] - Three-way quicksort and a stable insertion sort over `(key, rid)` pairs
//! - [`TokenRemap`] / [`TokenRemapListener`] - Remap events and their consumer
//! - [`TokenMovementMap`] - Original token to current token, composed across several moves
//!
//! # Examples
//!
//! ```rust
//! use std::sync::{Arc, Mutex};
//! use mdstore::{metadata::{sort::TokenRemap, tables::TableId}, TableStore};
//!
//! let mut store = TableStore::new();
//! for owner in [2u32, 1] {
//!     let rid = store.add_record(TableId::InterfaceImpl)?;
//!     store.put_column(TableId::InterfaceImpl, 0, rid, owner)?;
//! }
//!
//! let seen = Arc::new(Mutex::new(Vec::new()));
//! let sink = Arc::clone(&seen);
//! store.set_token_remap_listener(move |remap: TokenRemap| {
//!     if let Ok(mut seen) = sink.lock() {
//!         seen.push(remap);
//!     }
//! });
//!
//! store.sort_table(TableId::InterfaceImpl, false, true)?;
//! assert_eq!(seen.lock().map(|seen| seen.len()).unwrap_or(0), 2);
//! # Ok::<(), mdstore::Error>(())
//! ```

mod refdef;
mod remap;
mod sorter;

pub use remap::{TokenMovementMap, TokenRemap, TokenRemapListener};
pub(crate) use sorter::quick_sort;
pub use sorter::TableSorter;
