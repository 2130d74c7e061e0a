//! Row storage of a single table.
//!
//! Rows are kept back to back in one growable byte vector. A row is addressed by its 1-based
//! RID; callers only ever receive borrowed views, never long-lived pointers, so growing the
//! vector cannot invalidate anything a caller holds.

use crate::{metadata::tables::TableId, Error, Result};

/// Fixed-width rows of one table
#[derive(Clone, Debug)]
pub struct RecordTable {
    table: TableId,
    row_size: usize,
    data: Vec<u8>,
}

impl RecordTable {
    /// Create an empty table with rows of `row_size` bytes
    #[must_use]
    pub fn new(table: TableId, row_size: u32) -> Self {
        RecordTable {
            table,
            row_size: row_size as usize,
            data: Vec::new(),
        }
    }

    /// Create a table from `rows` consecutive rows stored in `data`
    ///
    /// # Errors
    /// Returns [`crate::Error::Overflow`] if the byte size overflows, or
    /// [`crate::Error::OutOfBounds`] if `data` is shorter than the rows it should hold.
    pub fn from_bytes(table: TableId, row_size: u32, rows: u32, data: &[u8]) -> Result<Self> {
        let len = (row_size as usize)
            .checked_mul(rows as usize)
            .ok_or(Error::Overflow {
                value: u64::from(row_size) * u64::from(rows),
                width: 4,
            })?;
        if len > data.len() {
            return Err(Error::OutOfBounds);
        }

        let mut storage = Vec::new();
        storage.try_reserve_exact(len)?;
        storage.extend_from_slice(&data[..len]);

        Ok(RecordTable {
            table,
            row_size: row_size as usize,
            data: storage,
        })
    }

    /// Table kind
    #[must_use]
    pub fn table(&self) -> TableId {
        self.table
    }

    /// Width of one row in bytes
    #[must_use]
    pub fn row_size(&self) -> usize {
        self.row_size
    }

    /// Number of rows
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn len(&self) -> u32 {
        if self.row_size == 0 {
            0
        } else {
            (self.data.len() / self.row_size) as u32
        }
    }

    /// True if the table has no rows
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// All rows as one byte slice
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    fn range(&self, rid: u32) -> Result<std::ops::Range<usize>> {
        if rid == 0 || rid > self.len() {
            return Err(Error::RowNotFound {
                table: self.table,
                rid,
            });
        }

        let start = (rid as usize - 1) * self.row_size;
        Ok(start..start + self.row_size)
    }

    /// Borrow row `rid`
    ///
    /// # Errors
    /// Returns [`crate::Error::RowNotFound`] if `rid` is 0 or past the last row.
    pub fn row(&self, rid: u32) -> Result<&[u8]> {
        let range = self.range(rid)?;
        Ok(&self.data[range])
    }

    /// Mutably borrow row `rid`
    ///
    /// # Errors
    /// Returns [`crate::Error::RowNotFound`] if `rid` is 0 or past the last row.
    pub fn row_mut(&mut self, rid: u32) -> Result<&mut [u8]> {
        let range = self.range(rid)?;
        Ok(&mut self.data[range])
    }

    /// Append a zeroed row and return its RID
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfMemory`] if the storage cannot grow, or
    /// [`crate::Error::Overflow`] once the 24-bit RID space is exhausted.
    pub fn push(&mut self) -> Result<u32> {
        let rid = self.len() + 1;
        if rid > 0x00FF_FFFF {
            return Err(Error::Overflow {
                value: u64::from(rid),
                width: 3,
            });
        }

        self.data.try_reserve(self.row_size)?;
        self.data.resize(self.data.len() + self.row_size, 0);
        Ok(rid)
    }

    /// Insert a zeroed row so that it becomes `rid`, shifting every later row up by one
    ///
    /// # Errors
    /// Returns [`crate::Error::RowNotFound`] if `rid` is 0 or more than one past the last row.
    pub fn insert(&mut self, rid: u32) -> Result<()> {
        if rid == 0 || rid > self.len() + 1 {
            return Err(Error::RowNotFound {
                table: self.table,
                rid,
            });
        }

        self.data.try_reserve(self.row_size)?;
        let at = (rid as usize - 1) * self.row_size;
        let old_len = self.data.len();
        self.data.resize(old_len + self.row_size, 0);
        self.data.copy_within(at..old_len, at + self.row_size);
        self.data[at..at + self.row_size].fill(0);
        Ok(())
    }

    /// Exchange two rows
    ///
    /// # Errors
    /// Returns [`crate::Error::RowNotFound`] if either RID is invalid.
    pub fn swap(&mut self, a: u32, b: u32) -> Result<()> {
        if a == b {
            self.range(a)?;
            return Ok(());
        }

        let (low, high) = if a < b { (a, b) } else { (b, a) };
        let low_range = self.range(low)?;
        let high_range = self.range(high)?;

        let (head, tail) = self.data.split_at_mut(high_range.start);
        head[low_range].swap_with_slice(&mut tail[..self.row_size]);
        Ok(())
    }

    /// Drop every row
    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// Replace the storage with re-encoded rows of a new width
    pub(crate) fn replace(&mut self, row_size: u32, data: Vec<u8>) {
        self.row_size = row_size as usize;
        self.data = data;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(rows: u8) -> RecordTable {
        let mut table = RecordTable::new(TableId::Param, 2);
        for value in 1..=rows {
            let rid = table.push().unwrap();
            table.row_mut(rid).unwrap().copy_from_slice(&[value, value]);
        }
        table
    }

    #[test]
    fn push_and_get() {
        let table = filled(3);
        assert_eq!(table.len(), 3);
        assert_eq!(table.row(2).unwrap(), &[2, 2]);
        assert!(matches!(
            table.row(0),
            Err(Error::RowNotFound { rid: 0, .. })
        ));
        assert!(table.row(4).is_err());
    }

    #[test]
    fn insert_shifts_rows() {
        let mut table = filled(3);
        table.insert(2).unwrap();
        assert_eq!(table.len(), 4);
        assert_eq!(table.row(1).unwrap(), &[1, 1]);
        assert_eq!(table.row(2).unwrap(), &[0, 0]);
        assert_eq!(table.row(3).unwrap(), &[2, 2]);

        table.insert(5).unwrap();
        assert_eq!(table.row(5).unwrap(), &[0, 0]);
        assert!(table.insert(7).is_err());
    }

    #[test]
    fn swap_rows() {
        let mut table = filled(3);
        table.swap(3, 1).unwrap();
        assert_eq!(table.bytes(), &[3, 3, 2, 2, 1, 1]);
        table.swap(2, 2).unwrap();
        assert!(table.swap(1, 9).is_err());
    }

    #[test]
    fn from_bytes() {
        let table = RecordTable::from_bytes(TableId::Param, 2, 2, &[1, 2, 3, 4, 5]).unwrap();
        assert_eq!(table.row(2).unwrap(), &[3, 4]);
        assert!(RecordTable::from_bytes(TableId::Param, 2, 3, &[1, 2, 3, 4, 5]).is_err());
    }
}
