//! Byte-range providers for serialized metadata.
//!
//! The table engine never reads from disk itself. It consumes a contiguous byte range that
//! holds the metadata root, supplied by one of the [`crate::file::Backend`] implementations:
//!
//! - [`crate::file::physical::Physical`] - Memory-mapped file on disk
//! - [`crate::file::memory::Memory`] - Owned in-memory buffer
//!
//! Low-level little-endian helpers shared by every parser live in [`crate::file::io`].
//!
//! # Examples
//!
//! ```rust,no_run
//! use mdstore::file::{physical::Physical, Backend};
//!
//! let source = Physical::new("metadata.bin")?;
//! let header = source.data_slice(0, 4)?;
//! assert_eq!(header, &[0x42, 0x53, 0x4A, 0x42]);
//! # Ok::<(), mdstore::Error>(())
//! ```

pub mod io;
pub mod memory;
pub mod physical;

use crate::Result;

/// Backing storage for a serialized metadata image.
///
/// Implementors hand out borrowed views of their data; all accessors are bounds-checked.
pub trait Backend: Send + Sync {
    /// Returns `len` bytes starting at `offset`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the range exceeds the backing data.
    fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]>;

    /// Returns the complete backing data.
    fn data(&self) -> &[u8];

    /// Returns the total size of the backing data.
    fn len(&self) -> usize;

    /// Returns true if the backend holds no data.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub(crate) fn slice_checked(data: &[u8], offset: usize, len: usize) -> Result<&[u8]> {
    let Some(offset_end) = offset.checked_add(len) else {
        return Err(crate::Error::OutOfBounds);
    };

    if offset_end > data.len() {
        return Err(crate::Error::OutOfBounds);
    }

    Ok(&data[offset..offset_end])
}
