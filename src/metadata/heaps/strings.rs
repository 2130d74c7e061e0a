use std::str;

use crate::{
    metadata::heaps::{offset_of, pad_to_alignment, DedupIndex, HeapKind, HeapPool},
    utils::hash::hash_blob,
    Error::{self, OutOfBounds},
    Result,
};

/// '#Strings' holds the identifiers referenced from the metadata tables: type, member and
/// parameter names, namespaces and the like.
///
/// Entries are NUL-terminated UTF-8. Offset 0 is always the empty string. Adding a string
/// that is already present returns the existing offset.
///
/// # Examples
///
/// ```rust
/// use mdstore::metadata::heaps::StringHeap;
///
/// let mut heap = StringHeap::new();
/// let first = heap.add("Foo")?;
/// assert_eq!(heap.add("Foo")?, first);
/// assert_eq!(heap.add("")?, 0);
/// assert_eq!(heap.get(first)?, "Foo");
/// # Ok::<(), mdstore::Error>(())
/// ```
///
/// ## Reference
/// * '<https://ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf>' - II.24.2.3
#[derive(Debug, Clone)]
pub struct StringHeap {
    data: Vec<u8>,
    index: Option<DedupIndex>,
    session_start: u32,
    minimal_delta: bool,
}

impl Default for StringHeap {
    fn default() -> Self {
        Self::new()
    }
}

impl StringHeap {
    /// Create a heap holding only the empty string
    #[must_use]
    pub fn new() -> Self {
        StringHeap {
            data: vec![0],
            index: None,
            session_start: 0,
            minimal_delta: false,
        }
    }

    /// Load a heap from stream bytes.
    ///
    /// A heap whose last byte is not a NUL terminator is trimmed back to the last NUL it
    /// contains; the truncation is reported as a warning, not an error.
    ///
    /// # Arguments
    /// * 'data'          - Stream content
    /// * 'minimal_delta' - The stream holds only the strings added by an ENC session
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if a full heap does not start with the empty string.
    pub fn from_bytes(data: &[u8], minimal_delta: bool) -> Result<Self> {
        if data.is_empty() {
            return Ok(StringHeap {
                data: if minimal_delta { Vec::new() } else { vec![0] },
                index: None,
                session_start: 0,
                minimal_delta,
            });
        }

        if !minimal_delta && data[0] != 0 {
            return Err(malformed_error!("Provided #Strings heap does not start with NUL"));
        }

        let mut end = data.len();
        if data[end - 1] != 0 {
            end = data.iter().rposition(|byte| *byte == 0).map_or(0, |pos| pos + 1);
            log::warn!(
                "#Strings heap is not NUL terminated, trimming {} trailing byte(s)",
                data.len() - end
            );
        }

        let mut storage = Vec::new();
        storage.try_reserve_exact(end)?;
        storage.extend_from_slice(&data[..end]);
        if storage.is_empty() && !minimal_delta {
            storage.push(0);
        }

        Ok(StringHeap {
            data: storage,
            index: None,
            session_start: 0,
            minimal_delta,
        })
    }

    /// Get a view of the string stored at `offset`
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the offset is outside of the heap, or
    /// [`crate::Error::Malformed`] if the entry is not terminated or not valid UTF-8.
    pub fn get(&self, offset: u32) -> Result<&str> {
        let offset = offset as usize;
        if offset == 0 && self.minimal_delta {
            return Ok("");
        }
        if offset >= self.data.len() {
            return Err(OutOfBounds);
        }

        let tail = &self.data[offset..];
        let Some(len) = tail.iter().position(|byte| *byte == 0) else {
            return Err(malformed_error!("Unterminated string at offset - {}", offset));
        };

        str::from_utf8(&tail[..len])
            .map_err(|_| malformed_error!("Invalid string at offset - {}", offset))
    }

    /// Add a string and return its offset, reusing an identical entry if present
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidArgument`] if `value` contains a NUL character, or
    /// [`crate::Error::Overflow`] if the heap would exceed the 32-bit offset range.
    pub fn add(&mut self, value: &str) -> Result<u32> {
        if value.is_empty() {
            return Ok(0);
        }
        if value.as_bytes().contains(&0) {
            return Err(Error::InvalidArgument(format!(
                "String contains an embedded NUL - {value:?}"
            )));
        }

        let hash = hash_blob(value.as_bytes());
        let index = self.index.get_or_insert_with(|| build_index(&self.data));
        if let Some(offset) = index.find(hash, |offset| {
            let start = offset as usize;
            self.data.get(start..start + value.len()) == Some(value.as_bytes())
                && self.data.get(start + value.len()) == Some(&0)
        }) {
            return Ok(offset);
        }

        let offset = offset_of(self.data.len())?;
        offset_of(self.data.len() + value.len() + 1)?;

        self.data.try_reserve(value.len() + 1)?;
        self.data.extend_from_slice(value.as_bytes());
        self.data.push(0);
        index.insert(hash, offset);

        Ok(offset)
    }

    /// Iterate over `(offset, string)` of every entry after the empty string
    pub fn iter(&self) -> impl Iterator<Item = (u32, &str)> {
        entries(&self.data).filter_map(|(offset, bytes)| {
            str::from_utf8(bytes).ok().map(|value| (offset, value))
        })
    }
}

fn entries(data: &[u8]) -> impl Iterator<Item = (u32, &[u8])> {
    let mut offset = 0usize;
    std::iter::from_fn(move || {
        while offset < data.len() {
            let start = offset;
            let len = data[start..].iter().position(|byte| *byte == 0)?;
            offset = start + len + 1;
            if len > 0 {
                #[allow(clippy::cast_possible_truncation)]
                return Some((start as u32, &data[start..start + len]));
            }
        }
        None
    })
}

fn build_index(data: &[u8]) -> DedupIndex {
    let mut index = DedupIndex::default();
    for (offset, bytes) in entries(data) {
        index.insert(hash_blob(bytes), offset);
    }
    index
}

impl HeapPool for StringHeap {
    fn kind(&self) -> HeapKind {
        HeapKind::Strings
    }

    fn data(&self) -> &[u8] {
        &self.data
    }

    fn append_raw(&mut self, bytes: &[u8]) -> Result<()> {
        offset_of(self.data.len() + bytes.len())?;
        self.data.try_reserve(bytes.len())?;
        self.data.extend_from_slice(bytes);
        self.index = None;
        Ok(())
    }

    fn is_empty(&self) -> bool {
        self.data.iter().all(|byte| *byte == 0)
    }

    fn start_new_session(&mut self) {
        pad_to_alignment(&mut self.data);
        self.session_start = self.size();
    }

    fn session_start(&self) -> u32 {
        self.session_start
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crafted() {
        #[rustfmt::skip]
        let data = [
            0x00,
            0x3c, 0x4d, 0x6f, 0x64, 0x75, 0x6c, 0x65, 0x3e, 0x00,
            0x53, 0x79, 0x73, 0x74, 0x65, 0x6d, 0x00,
        ];

        let heap = StringHeap::from_bytes(&data, false).unwrap();
        assert_eq!(heap.get(0).unwrap(), "");
        assert_eq!(heap.get(1).unwrap(), "<Module>");
        assert_eq!(heap.get(10).unwrap(), "System");
        assert_eq!(heap.get(13).unwrap(), "tem");
        assert!(heap.get(17).is_err());

        let all: Vec<_> = heap.iter().collect();
        assert_eq!(all, vec![(1, "<Module>"), (10, "System")]);
    }

    #[test]
    fn dedup() {
        let mut heap = StringHeap::new();
        let foo = heap.add("Foo").unwrap();
        let bar = heap.add("Bar").unwrap();
        assert_eq!(foo, 1);
        assert_eq!(bar, 5);
        assert_eq!(heap.add("Foo").unwrap(), foo);
        assert_eq!(heap.add("").unwrap(), 0);
        assert_eq!(heap.size(), 9);
    }

    #[test]
    fn dedup_against_loaded_content() {
        let mut heap = StringHeap::from_bytes(b"\0Foo\0", false).unwrap();
        assert_eq!(heap.add("Foo").unwrap(), 1);
        assert_eq!(heap.add("Fo").unwrap(), 5);
    }

    #[test]
    fn embedded_nul() {
        let mut heap = StringHeap::new();
        assert!(heap.add("a\0b").is_err());
    }

    #[test]
    fn trims_unterminated_tail() {
        let heap = StringHeap::from_bytes(b"\0Foo\0Ba", false).unwrap();
        assert_eq!(heap.size(), 5);
        assert_eq!(heap.get(1).unwrap(), "Foo");
        assert!(heap.get(5).is_err());
    }

    #[test]
    fn invalid_start() {
        assert!(StringHeap::from_bytes(b"Foo\0", false).is_err());
        assert!(StringHeap::from_bytes(b"Foo\0", true).is_ok());
    }

    #[test]
    fn session_delta() {
        let mut heap = StringHeap::new();
        heap.add("Base").unwrap();
        heap.start_new_session();
        assert_eq!(heap.session_start(), 8);

        let offset = heap.add("Delta").unwrap();
        assert_eq!(offset, 8);
        assert_eq!(heap.session_added_size(), 6);

        let mut out = Vec::new();
        heap.save_delta(heap.session_start(), &mut out).unwrap();
        assert_eq!(out, b"Delta\0\0\0");
    }
}
