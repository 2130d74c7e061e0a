//! Append-only heap pools referenced by table columns.
//!
//! Four pools back the variable-length data of the tables:
//!
//! - [`crate::metadata::heaps::StringHeap`] - `#Strings`, NUL-terminated UTF-8 identifiers
//! - [`crate::metadata::heaps::BlobHeap`] - `#Blob`, length-prefixed binary data
//! - [`crate::metadata::heaps::UserStringHeap`] - `#US`, length-prefixed UTF-16 literals
//! - [`crate::metadata::heaps::GuidHeap`] - `#GUID`, flat array of 16-byte records
//!
//! Pools never remove or rewrite content. Adding content that is already present returns the
//! previously issued offset, and the empty string and empty blob always map to offset 0.
//!
//! # EnC sessions
//!
//! [`HeapPool::start_new_session`] records the current size as a checkpoint. An ENC delta
//! save then serializes only what was appended since, see [`HeapPool::save_delta`]. The GUID
//! heap ignores the checkpoint and is always written in full.

mod blob;
mod guid;
mod strings;
mod userstrings;

pub use blob::BlobHeap;
pub use guid::GuidHeap;
pub use strings::StringHeap;
pub use userstrings::UserStringHeap;

use rustc_hash::FxHashMap;

use crate::{file::io::align4, Error, Result};

/// Identifies one of the heap streams
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HeapKind {
    /// `#Strings`
    Strings,
    /// `#US`
    UserStrings,
    /// `#GUID`
    Guid,
    /// `#Blob`
    Blob,
}

impl HeapKind {
    /// Name of the stream holding this heap
    #[must_use]
    pub fn stream_name(&self) -> &'static str {
        match self {
            HeapKind::Strings => "#Strings",
            HeapKind::UserStrings => "#US",
            HeapKind::Guid => "#GUID",
            HeapKind::Blob => "#Blob",
        }
    }
}

/// Common behaviour of the four heaps
pub trait HeapPool {
    /// Which heap this is
    fn kind(&self) -> HeapKind;

    /// Raw heap content
    fn data(&self) -> &[u8];

    /// Append raw bytes, as produced by another pool's serialization.
    ///
    /// No deduplication happens; existing offsets of both pools stay valid.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfMemory`] if the pool cannot grow.
    fn append_raw(&mut self, bytes: &[u8]) -> Result<()>;

    /// Current size in bytes
    #[allow(clippy::cast_possible_truncation)]
    fn size(&self) -> u32 {
        self.data().len() as u32
    }

    /// Size rounded up to the stream alignment
    #[allow(clippy::cast_possible_truncation)]
    fn aligned_size(&self) -> u32 {
        align4(self.data().len()) as u32
    }

    /// True if the pool holds nothing beyond its default entry
    fn is_empty(&self) -> bool;

    /// Mark the current size as the start of a new EnC session
    fn start_new_session(&mut self);

    /// Size at the last session checkpoint
    fn session_start(&self) -> u32;

    /// Bytes appended since the last session checkpoint
    fn session_added_size(&self) -> u32 {
        self.size().saturating_sub(self.session_start())
    }

    /// Append the pool content from `from_offset` to the end, padded to 4 bytes, to `out`
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if `from_offset` is past the end of the pool.
    fn save_delta(&self, from_offset: u32, out: &mut Vec<u8>) -> Result<()> {
        let data = self.data();
        let Some(bytes) = data.get(from_offset as usize..) else {
            return Err(Error::OutOfBounds);
        };

        out.try_reserve(align4(bytes.len()))?;
        out.extend_from_slice(bytes);
        out.resize(out.len() + (align4(bytes.len()) - bytes.len()), 0);
        Ok(())
    }
}

/// Content to offset map used by the deduplicating pools.
///
/// Entries are bucketed by content hash; collisions are resolved by comparing the stored
/// bytes, so distinct content never shares an offset.
#[derive(Debug, Default, Clone)]
pub(crate) struct DedupIndex {
    buckets: FxHashMap<u64, Vec<u32>>,
}

impl DedupIndex {
    pub(crate) fn find(&self, hash: u64, mut matches: impl FnMut(u32) -> bool) -> Option<u32> {
        self.buckets
            .get(&hash)?
            .iter()
            .copied()
            .find(|offset| matches(*offset))
    }

    pub(crate) fn insert(&mut self, hash: u64, offset: u32) {
        self.buckets.entry(hash).or_default().push(offset);
    }
}

/// Pad `data` with zero bytes up to the stream alignment.
///
/// A zero byte is a valid empty entry for the string, blob and user-string heaps, so the
/// padding never corrupts entry boundaries.
pub(crate) fn pad_to_alignment(data: &mut Vec<u8>) {
    let aligned = align4(data.len());
    data.resize(aligned, 0);
}

/// Convert a pool length into an offset, failing once the pool exceeds the 32-bit range
pub(crate) fn offset_of(len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| Error::Overflow {
        value: len as u64,
        width: 4,
    })
}
