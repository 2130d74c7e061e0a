use rustc_hash::FxHashMap;
use uguid::Guid;

use crate::{
    metadata::heaps::{offset_of, HeapKind, HeapPool},
    Error::OutOfBounds,
    Result,
};

/// '#GUID' is a flat array of 16-byte records, addressed by a 1-based index.
///
/// Index 0 means "no GUID" and is never handed out, not even for the all-zero GUID. Identical
/// GUIDs share one record. The heap is never delta-minimized: ENC saves always write it whole.
///
/// ## Reference
/// * '<https://ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf>' - II.24.2.5
#[derive(Debug, Clone, Default)]
pub struct GuidHeap {
    data: Vec<u8>,
    index: FxHashMap<[u8; 16], u32>,
    session_start: u32,
}

impl GuidHeap {
    /// Create an empty heap
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a heap from stream bytes. A trailing partial record is ignored.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfMemory`] if the content cannot be copied.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let len = data.len() - data.len() % 16;
        let mut heap = GuidHeap::default();
        heap.data.try_reserve_exact(len)?;
        heap.data.extend_from_slice(&data[..len]);
        heap.rebuild_index();
        Ok(heap)
    }

    fn rebuild_index(&mut self) {
        self.index.clear();
        for (position, record) in self.data.chunks_exact(16).enumerate() {
            let mut bytes = [0u8; 16];
            bytes.copy_from_slice(record);
            #[allow(clippy::cast_possible_truncation)]
            self.index.entry(bytes).or_insert(position as u32 + 1);
        }
    }

    /// Number of stored GUIDs
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn count(&self) -> u32 {
        (self.data.len() / 16) as u32
    }

    /// Get the GUID at 1-based `index`
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if `index` is 0 or past the last record.
    pub fn get(&self, index: u32) -> Result<Guid> {
        if index == 0 || index > self.count() {
            return Err(OutOfBounds);
        }

        let start = (index as usize - 1) * 16;
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&self.data[start..start + 16]);
        Ok(Guid::from_bytes(bytes))
    }

    /// Add a GUID and return its 1-based index, reusing an identical record if present
    ///
    /// # Errors
    /// Returns [`crate::Error::Overflow`] if the heap exceeds the 32-bit range.
    pub fn add(&mut self, guid: &Guid) -> Result<u32> {
        let bytes = guid.to_bytes();
        if let Some(index) = self.index.get(&bytes) {
            return Ok(*index);
        }

        offset_of(self.data.len() + 16)?;
        self.data.try_reserve(16)?;
        self.data.extend_from_slice(&bytes);

        let index = self.count();
        self.index.insert(bytes, index);
        Ok(index)
    }
}

impl HeapPool for GuidHeap {
    fn kind(&self) -> HeapKind {
        HeapKind::Guid
    }

    fn data(&self) -> &[u8] {
        &self.data
    }

    fn append_raw(&mut self, bytes: &[u8]) -> Result<()> {
        offset_of(self.data.len() + bytes.len())?;
        let len = bytes.len() - bytes.len() % 16;
        self.data.try_reserve(len)?;
        self.data.extend_from_slice(&bytes[..len]);
        self.rebuild_index();
        Ok(())
    }

    fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn start_new_session(&mut self) {
        self.session_start = self.size();
    }

    fn session_start(&self) -> u32 {
        self.session_start
    }

    fn session_added_size(&self) -> u32 {
        self.size()
    }

    fn save_delta(&self, _from_offset: u32, out: &mut Vec<u8>) -> Result<()> {
        out.try_reserve(self.data.len())?;
        out.extend_from_slice(&self.data);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uguid::guid;

    #[test]
    fn add_and_get() {
        let mut heap = GuidHeap::new();
        let first = guid!("d437908e-65e6-487c-9735-7bdff699bea5");
        let second = guid!("00000000-0000-0000-0000-000000000000");

        assert_eq!(heap.add(&first).unwrap(), 1);
        assert_eq!(heap.add(&second).unwrap(), 2);
        assert_eq!(heap.add(&first).unwrap(), 1);
        assert_eq!(heap.get(1).unwrap(), first);
        assert_eq!(heap.get(2).unwrap(), second);
        assert!(heap.get(0).is_err());
        assert!(heap.get(3).is_err());
    }

    #[test]
    fn crafted() {
        #[rustfmt::skip]
        let data = [
            0x8e, 0x90, 0x37, 0xd4, 0xe6, 0x65, 0x7c, 0x48,
            0x97, 0x35, 0x7b, 0xdf, 0xf6, 0x99, 0xbe, 0xa5,
            0xFF,
        ];

        let heap = GuidHeap::from_bytes(&data).unwrap();
        assert_eq!(heap.count(), 1);
        assert_eq!(
            heap.get(1).unwrap(),
            guid!("d437908e-65e6-487c-9735-7bdff699bea5")
        );
    }

    #[test]
    fn always_saved_in_full() {
        let mut heap = GuidHeap::new();
        heap.add(&guid!("d437908e-65e6-487c-9735-7bdff699bea5")).unwrap();
        heap.start_new_session();
        heap.add(&guid!("11111111-2222-3333-4444-555555555555")).unwrap();

        let mut out = Vec::new();
        heap.save_delta(heap.session_start(), &mut out).unwrap();
        assert_eq!(out.len(), 32);
        assert_eq!(heap.session_added_size(), 32);
    }
}
