//! Store configuration
//!
//! This module provides the options that steer how a [`crate::TableStore`] records edits,
//! how strictly it accepts out-of-order emission, and how it lays out saved images.

use bitflags::bitflags;

/// Runtime version written into the signature block of new images
pub const DEFAULT_RUNTIME_VERSION: &str = "v4.0.30319";

/// How edits to the store are tracked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdateMode {
    /// Plain editing, the image is saved as a whole
    #[default]
    Full,
    /// Editing an existing image in place, without ENC bookkeeping
    Incremental,
    /// Edit-and-Continue: every edit is recorded in the ENC log
    Enc,
    /// Edit-and-Continue producing minimal deltas: edits are recorded, and saves emit only the
    /// rows and heap content touched in the current session
    Delta,
}

impl UpdateMode {
    /// True if edits are recorded in the ENC log
    #[must_use]
    pub fn records_enc_log(&self) -> bool {
        matches!(self, UpdateMode::Enc | UpdateMode::Delta)
    }
}

bitflags! {
    /// Child tables for which creating an indirection table is treated as an error
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct OutOfOrderFlags: u8 {
        /// Fields emitted out of parent order
        const FIELD = 0x01;
        /// Methods emitted out of parent order
        const METHOD = 0x02;
        /// Parameters emitted out of parent order
        const PARAM = 0x04;
        /// Properties emitted out of parent order
        const PROPERTY = 0x08;
        /// Events emitted out of parent order
        const EVENT = 0x10;
    }
}

/// Configuration of a [`crate::TableStore`]
///
/// The presets cover the usual embeddings:
/// - [`StoreOptions::full`] - Plain editing and full saves, the default
/// - [`StoreOptions::enc`] - Edit-and-Continue with complete ENC images
/// - [`StoreOptions::delta`] - Edit-and-Continue producing minimal deltas
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreOptions {
    /// How edits are tracked
    pub update_mode: UpdateMode,

    /// Child tables that must never get an indirection table; emitting out of order into one
    /// of them fails with [`crate::Error::RecordOutOfOrder`]
    pub out_of_order: OutOfOrderFlags,

    /// Place `#Strings` before the tables stream in saved images
    pub string_pool_first: bool,

    /// Reject deltas whose module identity differs from the base.
    /// Only enforced in debug builds, release builds log a warning instead
    pub strict_delta_check: bool,

    /// Version string of the signature block
    pub runtime_version: String,

    /// Start out with 4-byte variable columns instead of growing into them
    pub large_columns: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            update_mode: UpdateMode::Full,
            out_of_order: OutOfOrderFlags::empty(),
            string_pool_first: false,
            strict_delta_check: false,
            runtime_version: DEFAULT_RUNTIME_VERSION.to_string(),
            large_columns: false,
        }
    }
}

impl StoreOptions {
    /// Options for plain editing with full saves
    #[must_use]
    pub fn full() -> Self {
        Self::default()
    }

    /// Options for Edit-and-Continue sessions that save complete ENC images
    #[must_use]
    pub fn enc() -> Self {
        Self {
            update_mode: UpdateMode::Enc,
            strict_delta_check: true,
            ..Self::default()
        }
    }

    /// Options for Edit-and-Continue sessions that save minimal deltas
    ///
    /// Minimal deltas are always written with 4-byte columns.
    #[must_use]
    pub fn delta() -> Self {
        Self {
            update_mode: UpdateMode::Delta,
            strict_delta_check: true,
            large_columns: true,
            ..Self::default()
        }
    }
}
