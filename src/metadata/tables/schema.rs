//! Schema block of the tables stream and per-table column layouts.
//!
//! The schema block precedes the row data of the tables stream:
//!
//! | Offset | Size | Field |
//! |---|---|---|
//! | 0 | 4 | reserved, always 0 |
//! | 4 | 1 | major version |
//! | 5 | 1 | minor version |
//! | 6 | 1 | heap sizes and flags |
//! | 7 | 1 | bit width of the largest RID |
//! | 8 | 8 | valid mask, one bit per present table |
//! | 16 | 8 | sorted mask |
//! | 24 | 4 * n | row count of every present table |
//! | .. | 4 | extra data, only when [`HeapSizes::EXTRA_DATA`] is set |
//!
//! Column widths are not stored. They are derived from the row counts and the heap flags,
//! and [`TableDef::build`] recomputes them for a given [`ColumnSizing`].
//!
//! ## Reference
//! * '<https://ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf>' - II.24.2.6

use bitflags::bitflags;
use strum::IntoEnumIterator;

use crate::{
    file::io::{read_le_at, read_le_at_dyn, write_le_at, write_le_at_dyn},
    metadata::tables::{columns, ColumnType, TableId, TABLE_COUNT},
    Error::{self, OutOfBounds},
    Result,
};

/// Schema major version written by this crate
pub const SCHEMA_MAJOR: u8 = 2;
/// Schema minor version written by this crate
pub const SCHEMA_MINOR: u8 = 0;

const SCHEMA_FIXED_SIZE: usize = 24;

bitflags! {
    /// Heap width flags and stream flags of the schema block
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct HeapSizes: u8 {
        /// `#Strings` offsets are 4 bytes
        const STRINGS_WIDE = 0x01;
        /// `#GUID` indices are 4 bytes
        const GUID_WIDE = 0x02;
        /// `#Blob` offsets are 4 bytes
        const BLOB_WIDE = 0x04;
        /// Stream carries only the rows of an ENC delta
        const DELTA_ONLY = 0x20;
        /// An extra u32 follows the row counts
        const EXTRA_DATA = 0x40;
    }
}

/// Decoded schema block
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Schema {
    /// Major version
    pub major: u8,
    /// Minor version
    pub minor: u8,
    /// Heap flags
    pub heaps: HeapSizes,
    /// Bit width of the largest RID
    pub rid_bits: u8,
    /// Tables flagged as sorted by their key column
    pub sorted: u64,
    /// Row count per table
    pub rows: [u32; TABLE_COUNT],
    /// Optional trailing value
    pub extra: Option<u32>,
}

impl Default for Schema {
    fn default() -> Self {
        Schema {
            major: SCHEMA_MAJOR,
            minor: SCHEMA_MINOR,
            heaps: HeapSizes::empty(),
            rid_bits: 0,
            sorted: 0,
            rows: [0; TABLE_COUNT],
            extra: None,
        }
    }
}

impl Schema {
    /// Parse a schema block, returning the schema and the number of bytes it occupied
    ///
    /// # Arguments
    /// * 'data' - The tables stream, starting with the schema block
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the block is truncated, or
    /// [`crate::Error::Malformed`] for unsupported versions or unknown tables.
    pub fn parse(data: &[u8]) -> Result<(Schema, usize)> {
        if data.len() < SCHEMA_FIXED_SIZE {
            return Err(OutOfBounds);
        }

        let mut offset = 4;
        let major = read_le_at::<u8>(data, &mut offset)?;
        let minor = read_le_at::<u8>(data, &mut offset)?;
        if !(major == 1 || major == SCHEMA_MAJOR) {
            return Err(malformed_error!(
                "Unsupported schema version - {}.{}",
                major,
                minor
            ));
        }

        let heaps = HeapSizes::from_bits_truncate(read_le_at::<u8>(data, &mut offset)?);
        let rid_bits = read_le_at::<u8>(data, &mut offset)?;
        let valid = read_le_at::<u64>(data, &mut offset)?;
        let sorted = read_le_at::<u64>(data, &mut offset)?;

        if valid >> TABLE_COUNT != 0 {
            return Err(malformed_error!("Unknown tables present - {:#x}", valid));
        }

        let mut rows = [0u32; TABLE_COUNT];
        for table in TableId::iter() {
            if valid & table.mask() != 0 {
                rows[table.index()] = read_le_at::<u32>(data, &mut offset)?;
            }
        }

        let extra = if heaps.contains(HeapSizes::EXTRA_DATA) {
            Some(read_le_at::<u32>(data, &mut offset)?)
        } else {
            None
        };

        Ok((
            Schema {
                major,
                minor,
                heaps,
                rid_bits,
                sorted,
                rows,
                extra,
            },
            offset,
        ))
    }

    /// Tables with at least one row
    #[must_use]
    pub fn valid(&self) -> u64 {
        TableId::iter()
            .filter(|table| self.rows[table.index()] > 0)
            .fold(0, |mask, table| mask | table.mask())
    }

    /// Size of the serialized block, including the 4-byte alignment
    #[must_use]
    pub fn size(&self) -> usize {
        let counts = self.rows.iter().filter(|rows| **rows > 0).count();
        let extra = usize::from(self.heaps.contains(HeapSizes::EXTRA_DATA));
        SCHEMA_FIXED_SIZE + 4 * (counts + extra)
    }

    /// True for the schema of a minimal ENC delta
    #[must_use]
    pub fn is_delta_only(&self) -> bool {
        self.heaps.contains(HeapSizes::DELTA_ONLY)
    }

    /// Append the serialized block to `out`
    ///
    /// # Errors
    /// Returns an error if the internal buffer could not be written.
    pub fn write(&self, out: &mut Vec<u8>) -> Result<()> {
        let start = out.len();
        out.resize(start + self.size(), 0);
        let data = &mut out[start..];

        let mut heaps = self.heaps;
        heaps.set(HeapSizes::EXTRA_DATA, self.extra.is_some());

        let mut offset = 4;
        write_le_at(data, &mut offset, self.major)?;
        write_le_at(data, &mut offset, self.minor)?;
        write_le_at(data, &mut offset, heaps.bits())?;
        write_le_at(data, &mut offset, self.rid_bits)?;
        write_le_at(data, &mut offset, self.valid())?;
        write_le_at(data, &mut offset, self.sorted)?;
        for rows in self.rows.iter().filter(|rows| **rows > 0) {
            write_le_at(data, &mut offset, *rows)?;
        }
        if let Some(extra) = self.extra {
            write_le_at(data, &mut offset, extra)?;
        }

        Ok(())
    }

    /// Bit width of the largest row count
    #[must_use]
    pub fn compute_rid_bits(&self) -> u8 {
        let largest = self.rows.iter().copied().max().unwrap_or(0);
        #[allow(clippy::cast_possible_truncation)]
        let bits = (32 - largest.leading_zeros()) as u8;
        bits
    }
}

/// Policy deciding the width of variable columns
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColumnSizing {
    /// Every variable column is 2 bytes
    Narrow,
    /// Every variable column is 4 bytes
    Wide,
    /// ECMA-335 minimal widths, derived from the schema's row counts and heap flags
    Compressed,
}

/// Placement of one column inside a row
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ColumnDef {
    /// Column type
    pub kind: ColumnType,
    /// Byte offset inside the row
    pub offset: u32,
    /// Width in bytes, 1, 2 or 4
    pub size: u8,
}

/// Column layout of one table
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableDef {
    /// The table described
    pub table: TableId,
    /// Layout of every column
    pub columns: Vec<ColumnDef>,
    /// Total row width in bytes
    pub row_size: u32,
}

impl TableDef {
    /// Compute the layout of `table` under `sizing`
    ///
    /// # Arguments
    /// * 'table'  - The table to lay out
    /// * 'sizing' - Width policy for variable columns
    /// * 'schema' - Row counts and heap flags, consulted for [`ColumnSizing::Compressed`]
    #[must_use]
    pub fn build(table: TableId, sizing: ColumnSizing, schema: &Schema) -> TableDef {
        let mut offset = 0u32;
        let columns = columns(table)
            .iter()
            .map(|template| {
                let size = match (template.kind.fixed_size(), sizing) {
                    (Some(size), _) => size,
                    (None, ColumnSizing::Narrow) => 2,
                    (None, ColumnSizing::Wide) => 4,
                    (None, ColumnSizing::Compressed) => compressed_size(template.kind, schema),
                };
                let column = ColumnDef {
                    kind: template.kind,
                    offset,
                    size,
                };
                offset += u32::from(size);
                column
            })
            .collect();

        TableDef {
            table,
            columns,
            row_size: offset,
        }
    }

    /// Layouts of all tables under `sizing`
    #[must_use]
    pub fn build_all(sizing: ColumnSizing, schema: &Schema) -> Vec<TableDef> {
        TableId::iter()
            .map(|table| TableDef::build(table, sizing, schema))
            .collect()
    }

    /// Width shared by every variable column, `None` if widths are mixed or there are none
    #[must_use]
    pub fn variable_width(&self) -> Option<u8> {
        let mut widths = self
            .columns
            .iter()
            .filter(|column| column.kind.is_variable())
            .map(|column| column.size);
        let first = widths.next()?;
        widths.all(|width| width == first).then_some(first)
    }

    /// Copy one row laid out by `self` into `out`, laid out by `target`
    ///
    /// # Errors
    /// Returns [`crate::Error::Overflow`] if a value does not fit its column in `target`.
    pub fn reencode_row(&self, row: &[u8], target: &TableDef, out: &mut [u8]) -> Result<()> {
        for (source, dest) in self.columns.iter().zip(&target.columns) {
            let value = read_le_at_dyn(row, &mut (source.offset as usize), source.size)?;
            if !value_fits(value, dest.size) {
                return Err(Error::Overflow {
                    value: u64::from(value),
                    width: dest.size,
                });
            }
            write_le_at_dyn(out, &mut (dest.offset as usize), value, dest.size)?;
        }
        Ok(())
    }

    /// Re-encode `rows` consecutive rows from this layout into `target`
    ///
    /// # Errors
    /// Returns [`crate::Error::Overflow`] if a value does not fit `target`, or
    /// [`crate::Error::OutOfMemory`] if the new storage cannot be allocated.
    pub fn reencode_rows(&self, data: &[u8], target: &TableDef) -> Result<Vec<u8>> {
        let source_size = self.row_size as usize;
        let target_size = target.row_size as usize;
        if source_size == 0 {
            return Ok(Vec::new());
        }

        let rows = data.len() / source_size;
        let mut out = Vec::new();
        out.try_reserve_exact(rows * target_size)?;
        out.resize(rows * target_size, 0);

        for (row, dest) in data
            .chunks_exact(source_size)
            .zip(out.chunks_exact_mut(target_size))
        {
            self.reencode_row(row, target, dest)?;
        }
        Ok(out)
    }
}

/// True if `value` can be stored in a column of `width` bytes
#[must_use]
pub(crate) fn value_fits(value: u32, width: u8) -> bool {
    match width {
        1 => value <= u32::from(u8::MAX),
        2 => value <= u32::from(u16::MAX),
        _ => true,
    }
}


fn compressed_size(kind: ColumnType, schema: &Schema) -> u8 {
    let wide = match kind {
        ColumnType::Rid(target) => schema.rows[target.index()] > u32::from(u16::MAX),
        ColumnType::Coded(coded) => {
            let limit = coded.narrow_row_limit();
            coded
                .candidates()
                .any(|table| schema.rows[table.index()] >= limit)
        }
        ColumnType::Strings => schema.heaps.contains(HeapSizes::STRINGS_WIDE),
        ColumnType::Guid => schema.heaps.contains(HeapSizes::GUID_WIDE),
        ColumnType::Blob => schema.heaps.contains(HeapSizes::BLOB_WIDE),
        ColumnType::U8 | ColumnType::U16 | ColumnType::U32 => false,
    };

    if wide {
        4
    } else {
        2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crafted() {
        #[rustfmt::skip]
        let data = [
            0x00, 0x00, 0x00, 0x00,
            0x02, 0x00,
            0x05,
            0x01,
            0x05, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x10, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x01, 0x00, 0x00, 0x00,
            0x03, 0x00, 0x00, 0x00,
            0xFF,
        ];

        let (schema, size) = Schema::parse(&data).unwrap();
        assert_eq!(size, 32);
        assert_eq!(schema.major, 2);
        assert!(schema.heaps.contains(HeapSizes::STRINGS_WIDE));
        assert!(schema.heaps.contains(HeapSizes::BLOB_WIDE));
        assert!(!schema.heaps.contains(HeapSizes::GUID_WIDE));
        assert_eq!(schema.rows[TableId::Module.index()], 1);
        assert_eq!(schema.rows[TableId::TypeDef.index()], 3);
        assert_eq!(schema.valid(), 0x05);
        assert_eq!(schema.sorted, 0x1000);

        let mut out = Vec::new();
        schema.write(&mut out).unwrap();
        assert_eq!(out, &data[..32]);
    }

    #[test]
    fn truncated() {
        #[rustfmt::skip]
        let data = [
            0x00, 0x00, 0x00, 0x00,
            0x02, 0x00, 0x00, 0x01,
            0x05, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x01, 0x00, 0x00, 0x00,
        ];

        assert!(Schema::parse(&data).is_err());
        assert!(Schema::parse(&data[..10]).is_err());
    }

    #[test]
    fn unsupported_version() {
        let mut data = [0u8; 24];
        data[4] = 3;
        assert!(Schema::parse(&data).is_err());
    }

    #[test]
    fn compressed_widths() {
        let mut schema = Schema::default();
        let narrow = TableDef::build(TableId::CustomAttribute, ColumnSizing::Compressed, &schema);
        assert_eq!(narrow.row_size, 6);
        assert_eq!(narrow.variable_width(), Some(2));

        // HasCustomAttribute has 5 tag bits, so 2048 rows no longer fit 2 bytes
        schema.rows[TableId::Param.index()] = 2048;
        let wide = TableDef::build(TableId::CustomAttribute, ColumnSizing::Compressed, &schema);
        assert_eq!(wide.columns[0].size, 4);
        assert_eq!(wide.columns[1].size, 2);
        assert_eq!(wide.variable_width(), None);

        schema.heaps |= HeapSizes::BLOB_WIDE;
        let blob = TableDef::build(TableId::StandAloneSig, ColumnSizing::Compressed, &schema);
        assert_eq!(blob.row_size, 4);
    }

    #[test]
    fn uniform_widths() {
        let schema = Schema::default();
        let narrow = TableDef::build(TableId::TypeDef, ColumnSizing::Narrow, &schema);
        assert_eq!(narrow.row_size, 4 + 2 * 5);
        let wide = TableDef::build(TableId::TypeDef, ColumnSizing::Wide, &schema);
        assert_eq!(wide.row_size, 4 + 4 * 5);
        assert_eq!(wide.columns[5].offset, 20);
        assert_eq!(TableDef::build(TableId::EncLog, ColumnSizing::Narrow, &schema).variable_width(), None);
    }

    #[test]
    fn reencode_narrow_to_wide() {
        let schema = Schema::default();
        let narrow = TableDef::build(TableId::Param, ColumnSizing::Narrow, &schema);
        let wide = TableDef::build(TableId::Param, ColumnSizing::Wide, &schema);

        #[rustfmt::skip]
        let rows = [
            0x01, 0x00, 0x02, 0x00, 0x34, 0x12,
            0x00, 0x00, 0x01, 0x00, 0xFF, 0xFF,
        ];

        let out = narrow.reencode_rows(&rows, &wide).unwrap();
        #[rustfmt::skip]
        let expected = [
            0x01, 0x00, 0x02, 0x00, 0x34, 0x12, 0x00, 0x00,
            0x00, 0x00, 0x01, 0x00, 0xFF, 0xFF, 0x00, 0x00,
        ];
        assert_eq!(out, expected);

        let back = wide.reencode_rows(&out, &narrow).unwrap();
        assert_eq!(back, rows);
    }

    #[test]
    fn reencode_rejects_overflow() {
        let schema = Schema::default();
        let narrow = TableDef::build(TableId::Param, ColumnSizing::Narrow, &schema);
        let wide = TableDef::build(TableId::Param, ColumnSizing::Wide, &schema);

        let row = [0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x00];
        let mut out = [0u8; 6];
        assert!(matches!(
            wide.reencode_row(&row, &narrow, &mut out),
            Err(Error::Overflow { value: 0x10000, width: 2 })
        ));
    }
}
