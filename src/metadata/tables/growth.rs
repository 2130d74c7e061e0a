//! Column growth of a writable store.
//!
//! A writable store starts with 2-byte variable columns and switches every table to 4-byte
//! columns once a row count or heap size passes the narrow limits. The limits keep headroom
//! below `0xFFFF`: a RID must still fit a 2-byte coded index after being shifted past the
//! widest selector, and heap offsets keep one spare bit.

use crate::{
    metadata::{
        heaps::HeapPool,
        tables::{ColumnSizing, TableDef, TableStore, MAX_TAG_BITS},
    },
    Result,
};

/// Largest row count a narrow store accepts
pub const NARROW_MAX_RID: u32 = 0xFFFF >> MAX_TAG_BITS;

/// Largest heap size a narrow store accepts
pub const NARROW_MAX_HEAP: u32 = 0xFFFF >> 1;

/// Current limits of a store, and whether it has switched to wide columns
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct GrowthMonitor {
    max_rid: u32,
    max_heap: u32,
    expanded: bool,
}

impl GrowthMonitor {
    pub(crate) fn narrow() -> Self {
        GrowthMonitor {
            max_rid: NARROW_MAX_RID,
            max_heap: NARROW_MAX_HEAP,
            expanded: false,
        }
    }

    pub(crate) fn wide() -> Self {
        GrowthMonitor {
            max_rid: u32::MAX,
            max_heap: u32::MAX,
            expanded: true,
        }
    }

    pub(crate) fn is_expanded(&self) -> bool {
        self.expanded
    }

    pub(crate) fn rid_exceeds(&self, rows: u32) -> bool {
        rows > self.max_rid
    }

    pub(crate) fn heap_exceeds(&self, size: u32) -> bool {
        size > self.max_heap
    }

    /// True if a store with these row counts and heap sizes can stay narrow
    pub(crate) fn fits_narrow(rows: &[u32], heaps: &[u32]) -> bool {
        rows.iter().all(|count| *count <= NARROW_MAX_RID)
            && heaps.iter().all(|size| *size <= NARROW_MAX_HEAP)
    }
}

impl TableStore {
    /// Switch every table to 4-byte variable columns.
    ///
    /// Rows are re-encoded one by one; values are zero-extended. Calling this on a store that
    /// is already wide does nothing.
    ///
    /// # Errors
    /// Returns [`crate::Error::ReadOnly`] for read-only stores, or
    /// [`crate::Error::OutOfMemory`] if the wide storage cannot be allocated.
    pub fn expand_tables(&mut self) -> Result<()> {
        ensure_writable!(self);
        if self.growth.is_expanded() {
            return Ok(());
        }

        log::debug!(
            "Expanding tables to 4-byte columns (largest table {} rows, largest heap {} bytes)",
            self.tables.iter().map(|table| table.len()).max().unwrap_or(0),
            self.largest_heap()
        );

        let wide = TableDef::build_all(ColumnSizing::Wide, &self.schema);
        for ((table, current), target) in self.tables.iter_mut().zip(&self.defs).zip(&wide) {
            let data = current.reencode_rows(table.bytes(), target)?;
            table.replace(target.row_size, data);
        }

        self.defs = wide;
        self.growth = GrowthMonitor::wide();
        self.save_size = None;
        Ok(())
    }

    /// True once the store uses 4-byte variable columns
    #[must_use]
    pub fn is_expanded(&self) -> bool {
        self.growth.is_expanded()
    }

    /// Expand if a table now holds `rows` rows and that passes the narrow limit
    pub(crate) fn grow_for_rows(&mut self, rows: u32) -> Result<()> {
        if self.growth.rid_exceeds(rows) {
            self.expand_tables()?;
        }
        Ok(())
    }

    /// Expand if any heap has passed the narrow limit
    pub(crate) fn grow_for_heaps(&mut self) -> Result<()> {
        if self.growth.heap_exceeds(self.largest_heap()) {
            self.expand_tables()?;
        }
        Ok(())
    }

    pub(crate) fn largest_heap(&self) -> u32 {
        [
            self.strings.aligned_size(),
            self.blobs.aligned_size(),
            self.user_strings.aligned_size(),
            self.guids.count(),
        ]
        .into_iter()
        .max()
        .unwrap_or(0)
    }
}
