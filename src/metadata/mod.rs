//! ECMA-335 metadata tables, heaps and their read/write engine.
//!
//! The entry point is [`tables::TableStore`], which owns the 45 metadata tables of one image
//! together with the four heaps. Everything else in this module extends it:
//!
//! - [`root`] - Signature block and stream directory of a serialized image
//! - [`heaps`] - The `#Strings`, `#Blob`, `#GUID` and `#US` pools
//! - [`tables`] - Table catalog, column codec, schema block and the store itself
//! - [`index`] - Lazily built lookup structures (virtual sorts, hash indexes, parent maps)
//! - [`sort`] - Key-column sorting and token remapping
//! - [`enc`] - Edit-and-Continue logging and delta merging
//! - [`save`] - Pre-save normalization and serialization
//! - [`token`] - Table byte plus row id
//!
//! # Examples
//!
//! ```rust
//! use mdstore::{metadata::tables::{col, TableId}, SaveMode, TableStore};
//!
//! let mut store = TableStore::new();
//! let type_rid = store.add_record(TableId::TypeDef)?;
//! store.put_string(TableId::TypeDef, col::typedef::NAME, type_rid, "Program")?;
//! let method = store.create_method(type_rid)?;
//! store.put_string(TableId::MethodDef, col::method::NAME, method, "Main")?;
//!
//! let image = store.save(SaveMode::Full)?;
//! let loaded = TableStore::from_buffer(&image, true)?;
//! assert_eq!(loaded.find_method_def(1, "Main", None)?, Some(1));
//! # Ok::<(), mdstore::Error>(())
//! ```

pub mod enc;
pub mod heaps;
pub mod index;
pub mod root;
pub mod save;
pub mod sort;
pub mod tables;
pub mod token;
