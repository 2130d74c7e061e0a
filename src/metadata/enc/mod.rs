//! Edit-and-Continue bookkeeping and delta merging.
//!
//! While a store runs in [`crate::options::UpdateMode::Enc`] or
//! [`crate::options::UpdateMode::Delta`], every edit is recorded as an [`EncLogEntry`] in the
//! `EncLog` table. Saving such a store produces a delta image; applying that image to the
//! store it was derived from reproduces the edits.
//!
//! # Key Components
//!
//! - [`FuncCode`] / [`EncLogEntry`] - The log record and its operation codes
//! - [`EncMapDirectory`] - Maps the renumbered rows of a minimal delta back to logical RIDs
//! - [`DeltaMerge`] / [`MergeStage`] - The merge state machine behind
//!   [`crate::TableStore::apply_delta`]
//!
//! # Examples
//!
//! ```rust
//! use mdstore::{metadata::tables::TableId, options::StoreOptions, SaveMode, TableStore};
//!
//! let mut base = TableStore::new();
//! base.add_record(TableId::Module)?;
//! base.add_record(TableId::TypeDef)?;
//! let image = base.save(SaveMode::Full)?;
//!
//! let mut session = TableStore::from_buffer_with_options(&image, false, StoreOptions::delta())?;
//! session.create_method(1)?;
//! let delta = TableStore::from_buffer(&session.save(SaveMode::Delta)?, true)?;
//!
//! let mut target = TableStore::from_buffer(&image, false)?;
//! target.apply_delta(&delta)?;
//! assert_eq!(target.row_count(TableId::MethodDef), 1);
//! # Ok::<(), mdstore::Error>(())
//! ```

mod record;
mod map;
mod merge;

pub use record::{EncLogEntry, FuncCode};
pub use map::EncMapDirectory;
pub(crate) use map::FULL_IN_DELTA;
pub use merge::{DeltaMerge, MergeStage};
