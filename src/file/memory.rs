//! In-memory backend.

use super::{slice_checked, Backend};
use crate::Result;

/// Owned buffer holding a serialized metadata image
#[derive(Debug)]
pub struct Memory {
    data: Vec<u8>,
}

impl Memory {
    /// Wrap an owned buffer
    ///
    /// # Arguments
    /// * 'data' - The serialized metadata
    #[must_use]
    pub fn new(data: Vec<u8>) -> Memory {
        Memory { data }
    }
}

impl Backend for Memory {
    fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]> {
        slice_checked(&self.data, offset, len)
    }

    fn data(&self) -> &[u8] {
        self.data.as_slice()
    }

    fn len(&self) -> usize {
        self.data.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_is_addressable() {
        #[rustfmt::skip]
        let image = vec![
            0x42, 0x53, 0x4A, 0x42, // BSJB
            0x01, 0x00, 0x01, 0x00, // version 1.1
        ];
        let memory = Memory::new(image);

        assert_eq!(memory.len(), 8);
        assert_eq!(memory.data_slice(0, 4).unwrap(), b"BSJB");
        assert_eq!(memory.data_slice(4, 4).unwrap(), &[0x01, 0x00, 0x01, 0x00]);
        assert!(memory.data_slice(6, 4).is_err());
        assert!(memory.data_slice(usize::MAX, 2).is_err());
    }

    #[test]
    fn empty_buffer() {
        let memory = Memory::new(Vec::new());
        assert!(memory.is_empty());
        assert!(memory.data_slice(0, 1).is_err());
        assert!(memory.data_slice(0, 0).unwrap().is_empty());
    }
}
