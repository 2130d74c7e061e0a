use crate::{
    file::io::{compressed_uint_size, read_compressed_uint, write_compressed_uint},
    metadata::heaps::{offset_of, pad_to_alignment, DedupIndex, HeapKind, HeapPool},
    utils::hash::hash_blob,
    Error::OutOfBounds,
    Result,
};

/// '#Blob' holds signatures, constant values, custom attribute arguments and other binary
/// data referenced from the metadata tables.
///
/// Every entry is prefixed by its length as an ECMA-335 compressed integer. Offset 0 holds the
/// empty blob, except in a minimal ENC delta, whose pool starts directly with new content.
///
/// ## Reference
/// * '<https://ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf>' - II.24.2.4
#[derive(Debug, Clone)]
pub struct BlobHeap {
    data: Vec<u8>,
    index: Option<DedupIndex>,
    session_start: u32,
    kind: HeapKind,
}

impl Default for BlobHeap {
    fn default() -> Self {
        Self::new()
    }
}

impl BlobHeap {
    /// Create a heap holding only the empty blob
    #[must_use]
    pub fn new() -> Self {
        Self::with_kind(HeapKind::Blob)
    }

    pub(crate) fn with_kind(kind: HeapKind) -> Self {
        BlobHeap {
            data: vec![0],
            index: None,
            session_start: 0,
            kind,
        }
    }

    /// Load a heap from stream bytes
    ///
    /// # Arguments
    /// * 'data'          - Stream content
    /// * 'minimal_delta' - The stream holds only the entries added by an ENC session
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfMemory`] if the content cannot be copied.
    pub fn from_bytes(data: &[u8], minimal_delta: bool) -> Result<Self> {
        Self::from_bytes_with_kind(data, minimal_delta, HeapKind::Blob)
    }

    pub(crate) fn from_bytes_with_kind(
        data: &[u8],
        minimal_delta: bool,
        kind: HeapKind,
    ) -> Result<Self> {
        let mut storage = Vec::new();
        if data.is_empty() {
            if !minimal_delta {
                storage.push(0);
            }
        } else {
            storage.try_reserve_exact(data.len())?;
            storage.extend_from_slice(data);
        }

        Ok(BlobHeap {
            data: storage,
            index: None,
            session_start: 0,
            kind,
        })
    }

    /// Get a view of the blob content stored at `offset`, without its length prefix
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the entry extends past the heap.
    pub fn get(&self, offset: u32) -> Result<&[u8]> {
        let start = offset as usize;
        if start == 0 && self.data.is_empty() {
            return Ok(&[]);
        }
        let Some(tail) = self.data.get(start..) else {
            return Err(OutOfBounds);
        };

        let (len, prefix) = read_compressed_uint(tail)?;
        tail.get(prefix..prefix + len as usize).ok_or(OutOfBounds)
    }

    /// Add a blob and return its offset, reusing an identical entry if present
    ///
    /// # Errors
    /// Returns [`crate::Error::Overflow`] if the blob or the heap grow past the encodable range.
    pub fn add(&mut self, value: &[u8]) -> Result<u32> {
        if value.is_empty() {
            return Ok(0);
        }

        let len = u32::try_from(value.len()).map_err(|_| crate::Error::Overflow {
            value: value.len() as u64,
            width: 4,
        })?;

        let hash = hash_blob(value);
        let index = self.index.get_or_insert_with(|| build_index(&self.data));
        if let Some(offset) = index.find(hash, |offset| {
            entry_at(&self.data, offset).is_some_and(|content| content == value)
        }) {
            return Ok(offset);
        }

        let offset = offset_of(self.data.len())?;
        offset_of(self.data.len() + compressed_uint_size(len) + value.len())?;

        self.data.try_reserve(compressed_uint_size(len) + value.len())?;
        write_compressed_uint(&mut self.data, len)?;
        self.data.extend_from_slice(value);
        index.insert(hash, offset);

        Ok(offset)
    }

    /// Iterate over `(offset, content)` of every non-empty entry
    pub fn iter(&self) -> impl Iterator<Item = (u32, &[u8])> {
        entries(&self.data).filter(|(_, content)| !content.is_empty())
    }
}

fn entry_at(data: &[u8], offset: u32) -> Option<&[u8]> {
    let tail = data.get(offset as usize..)?;
    let (len, prefix) = read_compressed_uint(tail).ok()?;
    tail.get(prefix..prefix + len as usize)
}

fn entries(data: &[u8]) -> impl Iterator<Item = (u32, &[u8])> {
    let mut offset = 0usize;
    std::iter::from_fn(move || {
        if offset >= data.len() {
            return None;
        }

        let (len, prefix) = read_compressed_uint(&data[offset..]).ok()?;
        let start = offset + prefix;
        let content = data.get(start..start + len as usize)?;

        #[allow(clippy::cast_possible_truncation)]
        let entry = (offset as u32, content);
        offset = start + len as usize;
        Some(entry)
    })
}

fn build_index(data: &[u8]) -> DedupIndex {
    let mut index = DedupIndex::default();
    for (offset, content) in entries(data).filter(|(_, content)| !content.is_empty()) {
        index.insert(hash_blob(content), offset);
    }
    index
}

impl HeapPool for BlobHeap {
    fn kind(&self) -> HeapKind {
        self.kind
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
