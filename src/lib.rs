// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![allow(dead_code)]

//! # mdstore
//!
//! A read/write engine for ECMA-335 metadata tables: the storage layer a compiler or
//! Edit-and-Continue host uses to emit, edit and serialize the `#~` / `#-` streams of a .NET
//! image.
//!
//! ## Features
//!
//! - **Column codec with growth** - Tables start with 2-byte variable columns and are widened
//!   to 4 bytes in one pass once a row count or heap outgrows them
//! - **Deduplicating heaps** - `#Strings`, `#Blob`, `#GUID` and `#US` pools with session
//!   checkpoints for incremental saves
//! - **Out-of-order emission** - Indirection (Ptr) tables are created on demand and removed
//!   again before a full save
//! - **Lazy lookups** - Virtual sorts, hash indexes and parent maps built on first use
//! - **Sorting with remap events** - Every moved row is reported to a
//!   [`metadata::sort::TokenRemapListener`]
//! - **Edit-and-Continue** - ENC logging, minimal deltas and a resumable delta merge
//!
//! ## Quick Start
//!
//! ```rust
//! use mdstore::{metadata::tables::{col, TableId}, SaveMode, TableStore};
//!
//! let mut store = TableStore::new();
//! let module = store.add_record(TableId::Module)?;
//! store.put_string(TableId::Module, col::module::NAME, module, "hello.dll")?;
//!
//! let image = store.save(SaveMode::Full)?;
//! let reloaded = TableStore::from_buffer(&image, false)?;
//! assert_eq!(reloaded.get_string(TableId::Module, col::module::NAME, 1)?, "hello.dll");
//! # Ok::<(), mdstore::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`metadata`] - Heaps, tables, lookups, sorting, ENC and the save pipeline
//! - [`options`] - [`StoreOptions`] presets and flags
//! - [`file`] - Byte sources for loading images
//! - [`utils`] - Hashing and the reader/writer lock
//! - [`Error`] and [`Result`] - Error handling
//!
//! ## Concurrency
//!
//! A store is not internally synchronized. Embeddings that share one guard it with a
//! [`utils::synchronization::MetadataLock`] and attach that lock with
//! [`TableStore::set_lock`], after which debug builds assert that every mutation happens under
//! the write side.
//!
//! ## Error Handling
//!
//! ```rust
//! use mdstore::{metadata::tables::TableId, Error, TableStore};
//!
//! let store = TableStore::new();
//! match store.row(TableId::TypeDef, 1) {
//!     Err(Error::RowNotFound { table, rid }) => println!("{table:?} has no row {rid}"),
//!     other => println!("{other:?}"),
//! }
//! ```
//!
//! ## References
//!
//! - [ECMA-335 Standard](https://ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf) - Partition II, chapter 24
#[macro_use]
pub(crate) mod macros;

#[macro_use]
pub(crate) mod error;

/// Byte sources for serialized metadata
pub mod file;

/// Metadata heaps, tables and the engine operating on them
pub mod metadata;

/// Store configuration
pub mod options;

/// Hashing and synchronization helpers
pub mod utils;

/// `mdstore` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `mdstore` Error type
///
/// The error type of every fallible operation in this crate.
pub use error::Error;

/// The table store, see [`metadata::tables::TableStore`]
pub use metadata::tables::TableStore;

/// Save modes, see [`metadata::save::SaveMode`]
pub use metadata::save::SaveMode;

/// Metadata tokens, see [`metadata::token::Token`]
pub use metadata::token::Token;

/// Store configuration, see [`options::StoreOptions`]
pub use options::StoreOptions;
