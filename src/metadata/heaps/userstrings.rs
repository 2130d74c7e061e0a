use widestring::U16String;

use crate::{
    metadata::heaps::{BlobHeap, HeapKind, HeapPool},
    Result,
};

/// '#US' holds the string literals loaded by `ldstr`, referenced by `0x70` tokens.
///
/// Entries share the blob heap encoding: a compressed length, the UTF-16LE code units, and
/// one trailing flag byte that is 1 when the string needs more than 8-bit handling.
///
/// ## Reference
/// * '<https://ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf>' - II.24.2.4
#[derive(Debug, Clone)]
pub struct UserStringHeap {
    blobs: BlobHeap,
}

impl Default for UserStringHeap {
    fn default() -> Self {
        Self::new()
    }
}

impl UserStringHeap {
    /// Create a heap holding only the empty entry
    #[must_use]
    pub fn new() -> Self {
        UserStringHeap {
            blobs: BlobHeap::with_kind(HeapKind::UserStrings),
        }
    }

    /// Load a heap from stream bytes
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfMemory`] if the content cannot be copied.
    pub fn from_bytes(data: &[u8], minimal_delta: bool) -> Result<Self> {
        Ok(UserStringHeap {
            blobs: BlobHeap::from_bytes_with_kind(data, minimal_delta, HeapKind::UserStrings)?,
        })
    }

    /// Add a literal and return its heap offset, reusing an identical entry if present
    ///
    /// # Errors
    /// Returns [`crate::Error::Overflow`] if the heap exceeds the encodable range.
    pub fn add(&mut self, value: &str) -> Result<u32> {
        let units: Vec<u16> = value.encode_utf16().collect();

        let mut entry = Vec::with_capacity(units.len() * 2 + 1);
        for unit in &units {
            entry.extend_from_slice(&unit.to_le_bytes());
        }
        entry.push(u8::from(units.iter().any(|unit| needs_wide_handling(*unit))));

        self.blobs.add(&entry)
    }

    /// Decode the literal stored at `offset`
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] for an invalid offset, or
    /// [`crate::Error::Malformed`] if the entry is not valid UTF-16.
    pub fn get(&self, offset: u32) -> Result<String> {
        let entry = self.blobs.get(offset)?;
        decode(entry).ok_or_else(|| malformed_error!("Invalid user string at offset - {}", offset))
    }

    /// Iterate over `(offset, literal)` of every decodable entry
    pub fn iter(&self) -> impl Iterator<Item = (u32, String)> + '_ {
        self.blobs
            .iter()
            .filter_map(|(offset, entry)| decode(entry).map(|value| (offset, value)))
    }
}

fn decode(entry: &[u8]) -> Option<String> {
    let units: Vec<u16> = entry
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    U16String::from_vec(units).to_string().ok()
}

fn needs_wide_handling(unit: u16) -> bool {
    unit > 0xFF || matches!(unit, 0x01..=0x08 | 0x0E..=0x1F | 0x27 | 0x2D | 0x7F)
}

impl HeapPool for UserStringHeap {
    fn kind(&self) -> HeapKind {
        HeapKind::UserStrings
    }

    fn data(&self) -> &[u8] {
        self.blobs.data()
    }

    fn append_raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.blobs.append_raw(bytes)
    }

    fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }

    fn start_new_session(&mut self) {
        self.blobs.start_new_session();
    }

    fn session_start(&self) -> u32 {
        self.blobs.session_start()
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
            0x0B, 0x48, 0x00, 0x65, 0x00, 0x6C, 0x00, 0x6C, 0x00, 0x6F, 0x00, 0x00,
        ];

        let heap = UserStringHeap::from_bytes(&data, false).unwrap();
        assert_eq!(heap.get(1).unwrap(), "Hello");
    }

    #[test]
    fn add_sets_flag_byte() {
        let mut heap = UserStringHeap::new();
        let plain = heap.add("Hi").unwrap();
        let wide = heap.add("\u{20AC}").unwrap();
        let quote = heap.add("it's").unwrap();

        assert_eq!(heap.data()[plain as usize..plain as usize + 6], [0x05, b'H', 0, b'i', 0, 0]);
        assert_eq!(heap.data()[wide as usize + 3], 1);
        assert_eq!(heap.get(quote).unwrap(), "it's");
        assert_eq!(*heap.data().last().unwrap(), 1);

        assert_eq!(heap.add("Hi").unwrap(), plain);
        let all: Vec<_> = heap.iter().map(|(_, value)| value).collect();
        assert_eq!(all, vec!["Hi", "\u{20AC}", "it's"]);
    }

    #[test]
    fn empty_literal() {
        let mut heap = UserStringHeap::new();
        let offset = heap.add("").unwrap();
        assert_ne!(offset, 0);
        assert_eq!(heap.get(offset).unwrap(), "");
    }
}
