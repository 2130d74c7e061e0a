//! Metadata tables: catalog, layouts, row storage and the read/write table store.
//!
//! # Key Components
//!
//! - [`TableId`] - The 45 table kinds, numbered as in tokens and on disk
//! - [`CodedIndexType`] - Coded token kinds with their candidate tables
//! - [`columns`] / [`key_column`] / [`LIST_COLUMNS`] - The static column catalog
//! - [`Schema`] / [`TableDef`] - Schema block and per-table column layout under a sizing policy
//! - [`RecordTable`] - Fixed-width row storage of one table
//! - [`TableStore`] - The engine: tables plus heaps, growth, indirection and lookups
//!
//! # Column widths
//!
//! A writable store keeps every variable column (RID, coded index, heap index) at one width,
//! either all 2 bytes or all 4 bytes. Writing a value that does not fit a 2-byte column expands
//! every table to 4 bytes once; a store never narrows again. Saved images use ECMA-335
//! compressed widths instead, chosen per column from the final row counts.
//!
//! ## Reference
//! * '<https://ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf>' - II.22, II.24.2.6

mod codedindex;
mod column;
mod growth;
mod lookup;
mod ptr;
mod schema;
mod store;
mod table;
mod tableid;

pub use codedindex::{CodedIndexType, MAX_TAG_BITS};
pub use column::{
    col, columns, key_column, list_column, parent_of_list, ColumnTemplate, ColumnType,
    LIST_COLUMNS,
};
pub use growth::{NARROW_MAX_HEAP, NARROW_MAX_RID};
pub use ptr::{ChildLink, END_OF_TABLE};
pub use schema::{
    ColumnDef, ColumnSizing, HeapSizes, Schema, TableDef, SCHEMA_MAJOR, SCHEMA_MINOR,
};
pub use store::TableStore;
pub use table::RecordTable;
pub use tableid::{TableId, PTR_TABLES, TABLE_COUNT};
