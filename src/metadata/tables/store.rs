//! The read/write table store.
//!
//! [`TableStore`] owns every table of one metadata image together with its four heaps. It is
//! the engine the other modules hang their operations on: indirection tables and list
//! ranges live in `ptr` and `lookup`, lazy indexes in [`crate::metadata::index`], sorting in
//! [`crate::metadata::sort`], ENC bookkeeping and delta merging in [`crate::metadata::enc`],
//! and serialization in [`crate::metadata::save`].
//!
//! # Loading
//!
//! A store is either created empty with [`TableStore::new`] or loaded from a serialized image.
//! Loading parses the signature block, locates the `#~` (or `#-`) tables stream and the heap
//! streams, and copies every table into owned row storage. A writable store is normalized to
//! uniform column widths right away; a read-only store keeps the widths found on disk.
//!
//! # Examples
//!
//! ```rust
//! use mdstore::{metadata::tables::{col, TableId}, TableStore};
//!
//! let mut store = TableStore::new();
//! let rid = store.add_record(TableId::TypeRef)?;
//! store.put_string(TableId::TypeRef, col::typeref::NAME, rid, "Object")?;
//! store.put_string(TableId::TypeRef, col::typeref::NAMESPACE, rid, "System")?;
//! assert_eq!(store.get_string(TableId::TypeRef, col::typeref::NAME, rid)?, "Object");
//! # Ok::<(), mdstore::Error>(())
//! ```

use std::{fmt, path::Path, sync::Arc};

use strum::IntoEnumIterator;
use uguid::Guid;

use crate::{
    file::{
        io::{read_le_at_dyn, write_le_at_dyn},
        physical::Physical,
        Backend,
    },
    metadata::{
        heaps::{BlobHeap, GuidHeap, HeapPool, StringHeap, UserStringHeap},
        index::Lookups,
        root::{Root, StreamStore, ENC_TABLES_STREAM, TABLES_STREAM},
        save::SaveMode,
        sort::{TokenMovementMap, TokenRemapListener},
        tables::{
            growth::GrowthMonitor, key_column, schema::value_fits, ColumnDef, ColumnSizing,
            ColumnType, RecordTable, Schema, TableDef, TableId, END_OF_TABLE, LIST_COLUMNS,
            TABLE_COUNT,
        },
        token::{Token, USER_STRING_TOKEN_TYPE},
    },
    options::StoreOptions,
    utils::synchronization::MetadataLock,
    Error, Result,
};

/// Tables and heaps of one metadata image, editable in place
pub struct TableStore {
    pub(crate) schema: Schema,
    pub(crate) defs: Vec<TableDef>,
    pub(crate) tables: Vec<RecordTable>,
    pub(crate) strings: StringHeap,
    pub(crate) blobs: BlobHeap,
    pub(crate) guids: GuidHeap,
    pub(crate) user_strings: UserStringHeap,
    pub(crate) options: StoreOptions,
    pub(crate) growth: GrowthMonitor,
    pub(crate) lookups: Lookups,
    pub(crate) movements: TokenMovementMap,
    pub(crate) listener: Option<Box<dyn TokenRemapListener>>,
    /// Row counts at the start of the current ENC session
    pub(crate) enc_session_rows: [u32; TABLE_COUNT],
    pub(crate) save_size: Option<(SaveMode, u32)>,
    pub(crate) minimal_delta: bool,
    pub(crate) read_only: bool,
    pub(crate) lock: Option<Arc<MetadataLock>>,
}

impl fmt::Debug for TableStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableStore")
            .field("schema", &self.schema)
            .field("options", &self.options)
            .field("expanded", &self.growth.is_expanded())
            .field("read_only", &self.read_only)
            .field("minimal_delta", &self.minimal_delta)
            .finish_non_exhaustive()
    }
}

impl Default for TableStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TableStore {
    /// Create an empty writable store with default options
    #[must_use]
    pub fn new() -> Self {
        Self::with_options(StoreOptions::default())
    }

    /// Create an empty writable store
    ///
    /// With [`StoreOptions::large_columns`] the store starts out with 4-byte columns.
    #[must_use]
    pub fn with_options(options: StoreOptions) -> Self {
        let schema = Schema::default();
        let (sizing, growth) = if options.large_columns {
            (ColumnSizing::Wide, GrowthMonitor::wide())
        } else {
            (ColumnSizing::Narrow, GrowthMonitor::narrow())
        };
        let defs = TableDef::build_all(sizing, &schema);
        let tables = defs
            .iter()
            .map(|def| RecordTable::new(def.table, def.row_size))
            .collect();

        TableStore {
            schema,
            defs,
            tables,
            strings: StringHeap::new(),
            blobs: BlobHeap::new(),
            guids: GuidHeap::new(),
            user_strings: UserStringHeap::new(),
            options,
            growth,
            lookups: Lookups::new(),
            movements: TokenMovementMap::default(),
            listener: None,
            enc_session_rows: [0; TABLE_COUNT],
            save_size: None,
            minimal_delta: false,
            read_only: false,
            lock: None,
        }
    }

    /// Load a store from a serialized metadata image with default options
    ///
    /// # Arguments
    /// * 'data'      - The image, starting with the signature block
    /// * 'read_only' - Keep the on-disk layout and reject every mutation
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] or [`crate::Error::OutOfBounds`] for damaged images.
    pub fn from_buffer(data: &[u8], read_only: bool) -> Result<Self> {
        Self::from_buffer_with_options(data, read_only, StoreOptions::default())
    }

    /// Load a store from a file, mapping it into memory for the duration of the load
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if the file cannot be mapped, and the errors of
    /// [`TableStore::from_buffer`] otherwise.
    pub fn from_file(path: impl AsRef<Path>, read_only: bool) -> Result<Self> {
        Self::from_file_with_options(path, read_only, StoreOptions::default())
    }

    /// Load a store from a file with explicit options
    ///
    /// # Errors
    /// See [`TableStore::from_file`].
    pub fn from_file_with_options(
        path: impl AsRef<Path>,
        read_only: bool,
        options: StoreOptions,
    ) -> Result<Self> {
        Self::from_backend(&Physical::new(path)?, read_only, options)
    }

    /// Load a store from any byte source holding a metadata image
    ///
    /// # Errors
    /// See [`TableStore::from_buffer`].
    pub fn from_backend(
        source: &impl Backend,
        read_only: bool,
        options: StoreOptions,
    ) -> Result<Self> {
        Self::from_buffer_with_options(source.data(), read_only, options)
    }

    /// Load a store from a serialized metadata image
    ///
    /// Writable stores are normalized: if every variable column is 2 bytes and all counts
    /// and heaps are within the narrow limits the store stays narrow, otherwise every table is
    /// expanded to 4-byte columns. In ENC modes the loaded state becomes the start of the
    /// first session.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the signature, schema or streams are invalid,
    /// or [`crate::Error::OutOfBounds`] if a table extends past its stream.
    pub fn from_buffer_with_options(
        data: &[u8],
        read_only: bool,
        options: StoreOptions,
    ) -> Result<Self> {
        let root = Root::read(data)?;
        let Some(stream) = root
            .open_stream(data, TABLES_STREAM)
            .or_else(|| root.open_stream(data, ENC_TABLES_STREAM))
        else {
            return Err(malformed_error!("No tables stream present"));
        };

        let (schema, mut offset) = Schema::parse(stream)?;
        let minimal_delta = schema.is_delta_only();
        let sizing = if minimal_delta {
            ColumnSizing::Wide
        } else {
            ColumnSizing::Compressed
        };
        let loaded = TableDef::build_all(sizing, &schema);

        let mut tables = Vec::with_capacity(TABLE_COUNT);
        for def in &loaded {
            let rows = schema.rows[def.table.index()];
            let Some(rest) = stream.get(offset..) else {
                return Err(Error::OutOfBounds);
            };
            let table = RecordTable::from_bytes(def.table, def.row_size, rows, rest)?;
            offset += table.bytes().len();
            tables.push(table);
        }

        let strings = match root.open_stream(data, "#Strings") {
            Some(bytes) => StringHeap::from_bytes(bytes, minimal_delta)?,
            None => StringHeap::from_bytes(&[], minimal_delta)?,
        };
        let blobs = match root.open_stream(data, "#Blob") {
            Some(bytes) => BlobHeap::from_bytes(bytes, minimal_delta)?,
            None => BlobHeap::from_bytes(&[], minimal_delta)?,
        };
        let user_strings = match root.open_stream(data, "#US") {
            Some(bytes) => UserStringHeap::from_bytes(bytes, minimal_delta)?,
            None => UserStringHeap::from_bytes(&[], minimal_delta)?,
        };
        let guids = match root.open_stream(data, "#GUID") {
            Some(bytes) => GuidHeap::from_bytes(bytes)?,
            None => GuidHeap::new(),
        };

        let mut store = TableStore {
            schema,
            defs: loaded,
            tables,
            strings,
            blobs,
            guids,
            user_strings,
            options,
            growth: GrowthMonitor::wide(),
            lookups: Lookups::new(),
            movements: TokenMovementMap::default(),
            listener: None,
            enc_session_rows: [0; TABLE_COUNT],
            save_size: None,
            minimal_delta,
            read_only,
            lock: None,
        };

        if !read_only {
            store.normalize_widths()?;
            if store.options.update_mode.records_enc_log() {
                store.checkpoint_session();
            }
        }

        Ok(store)
    }

    /// Bring a freshly loaded writable store to uniform column widths
    fn normalize_widths(&mut self) -> Result<()> {
        let narrow_layout = self
            .defs
            .iter()
            .all(|def| matches!(def.variable_width(), None | Some(2)));
        let rows: Vec<u32> = self.tables.iter().map(RecordTable::len).collect();
        let heaps = [
            self.strings.aligned_size(),
            self.blobs.aligned_size(),
            self.user_strings.aligned_size(),
            self.guids.count(),
        ];

        if narrow_layout
            && !self.minimal_delta
            && !self.options.large_columns
            && GrowthMonitor::fits_narrow(&rows, &heaps)
        {
            self.defs = TableDef::build_all(ColumnSizing::Narrow, &self.schema);
            self.growth = GrowthMonitor::narrow();
            return Ok(());
        }

        if self.defs.iter().all(|def| matches!(def.variable_width(), None | Some(4))) {
            self.growth = GrowthMonitor::wide();
            return Ok(());
        }

        self.growth = GrowthMonitor::narrow();
        self.expand_tables()
    }

    /// Record the current heap sizes and row counts as the start of an ENC session
    pub(crate) fn checkpoint_session(&mut self) {
        self.strings.start_new_session();
        self.blobs.start_new_session();
        self.user_strings.start_new_session();
        self.guids.start_new_session();
        for (rows, table) in self.enc_session_rows.iter_mut().zip(&self.tables) {
            *rows = table.len();
        }
    }

    /// Active configuration
    #[must_use]
    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    /// Change how further edits are tracked
    pub fn set_update_mode(&mut self, mode: crate::options::UpdateMode) {
        self.options.update_mode = mode;
    }

    /// True if the store rejects mutation
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// True if the store was loaded from a minimal ENC delta
    #[must_use]
    pub fn is_minimal_delta(&self) -> bool {
        self.minimal_delta
    }

    /// Attach the lock an embedding guards this store with.
    ///
    /// Once attached, debug builds assert that the write side is held on every mutation.
    pub fn set_lock(&mut self, lock: Option<Arc<MetadataLock>>) {
        self.lock = lock;
    }

    /// Debug-build check that the attached lock is held for writing
    pub fn debug_assert_write_locked(&self) {
        if let Some(lock) = &self.lock {
            debug_assert!(
                lock.is_write_locked(),
                "store mutated without holding the write lock"
            );
        }
    }

    /// Schema version as `(major, minor)`
    #[must_use]
    pub fn version(&self) -> (u8, u8) {
        (self.schema.major, self.schema.minor)
    }

    /// The schema block as loaded, with the current sorted flags
    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Number of rows in `table`
    #[must_use]
    pub fn row_count(&self, table: TableId) -> u32 {
        self.tables[table.index()].len()
    }

    /// Row storage of `table`
    #[must_use]
    pub fn table(&self, table: TableId) -> &RecordTable {
        &self.tables[table.index()]
    }

    /// Current column layout of `table`
    #[must_use]
    pub fn table_def(&self, table: TableId) -> &TableDef {
        &self.defs[table.index()]
    }

    /// True if `table` is flagged as sorted by its key column
    #[must_use]
    pub fn is_sorted(&self, table: TableId) -> bool {
        self.schema.sorted & table.mask() != 0
    }

    pub(crate) fn set_sorted(&mut self, table: TableId, sorted: bool) {
        if sorted {
            self.schema.sorted |= table.mask();
        } else {
            self.schema.sorted &= !table.mask();
        }
    }

    /// Borrow row `rid` of `table`
    ///
    /// # Errors
    /// Returns [`crate::Error::RowNotFound`] if `rid` is 0 or past the last row.
    pub fn row(&self, table: TableId, rid: u32) -> Result<&[u8]> {
        self.tables[table.index()].row(rid)
    }

    pub(crate) fn col_def(&self, table: TableId, column: usize) -> Result<ColumnDef> {
        self.defs[table.index()]
            .columns
            .get(column)
            .copied()
            .ok_or_else(|| Error::InvalidArgument(format!("{table:?} has no column {column}")))
    }

    /// Append a zeroed row to `table` and return its RID.
    ///
    /// List columns of the new row are set to the end-of-table marker, or past the last
    /// entry of the child's indirection table if it has one.
    ///
    /// # Errors
    /// Returns [`crate::Error::ReadOnly`] for read-only stores, or the errors of growing the
    /// storage.
    pub fn add_record(&mut self, table: TableId) -> Result<u32> {
        ensure_writable!(self);
        self.append_record(table)
    }

    pub(crate) fn append_record(&mut self, table: TableId) -> Result<u32> {
        let rid = self.tables[table.index()].push()?;
        self.grow_for_rows(rid)?;

        for (parent, column, child) in LIST_COLUMNS {
            if parent == table {
                let value = self.new_record_pointer_end_value(child);
                if value != END_OF_TABLE {
                    self.write_column(table, column, rid, value)?;
                }
            }
        }

        if key_column(table).is_some() {
            self.set_sorted(table, false);
        }
        self.save_size = None;
        Ok(rid)
    }

    /// Insert a zeroed row at `rid`, moving every later row up by one.
    ///
    /// Only indirection tables are meant to be edited this way; other tables are not
    /// renumbered by the store.
    ///
    /// # Errors
    /// Returns [`crate::Error::RowNotFound`] if `rid` is more than one past the last row.
    pub fn insert_record(&mut self, table: TableId, rid: u32) -> Result<()> {
        ensure_writable!(self);
        self.insert_row(table, rid)
    }

    pub(crate) fn insert_row(&mut self, table: TableId, rid: u32) -> Result<()> {
        self.tables[table.index()].insert(rid)?;
        self.grow_for_rows(self.row_count(table))?;
        self.set_sorted(table, false);
        self.lookups.invalidate_table(table);
        self.save_size = None;
        Ok(())
    }

    /// Read the raw value of one column
    ///
    /// # Errors
    /// Returns [`crate::Error::RowNotFound`] for an invalid RID, or
    /// [`crate::Error::InvalidArgument`] for an unknown column.
    pub fn get_column(&self, table: TableId, column: usize, rid: u32) -> Result<u32> {
        let def = self.col_def(table, column)?;
        let row = self.tables[table.index()].row(rid)?;
        read_le_at_dyn(row, &mut (def.offset as usize), def.size)
    }

    /// Write the raw value of one column.
    ///
    /// A value too large for a 2-byte variable column expands the whole store first. A value
    /// too large for a fixed column is rejected.
    ///
    /// # Errors
    /// Returns [`crate::Error::Overflow`] if the value does not fit a fixed column,
    /// [`crate::Error::RowNotFound`] for an invalid RID, or [`crate::Error::ReadOnly`].
    pub fn put_column(&mut self, table: TableId, column: usize, rid: u32, value: u32) -> Result<()> {
        ensure_writable!(self);
        self.write_column(table, column, rid, value)?;
        self.after_column_write(table, column, rid);
        Ok(())
    }

    /// Store a value without touching the lookup structures
    pub(crate) fn write_column(
        &mut self,
        table: TableId,
        column: usize,
        rid: u32,
        value: u32,
    ) -> Result<()> {
        let mut def = self.col_def(table, column)?;
        if !value_fits(value, def.size) {
            if !def.kind.is_variable() || self.growth.is_expanded() {
                return Err(Error::Overflow {
                    value: u64::from(value),
                    width: def.size,
                });
            }
            self.expand_tables()?;
            def = self.col_def(table, column)?;
        }

        let row = self.tables[table.index()].row_mut(rid)?;
        write_le_at_dyn(row, &mut (def.offset as usize), value, def.size)?;
        self.save_size = None;
        Ok(())
    }

    pub(crate) fn after_column_write(&mut self, table: TableId, column: usize, rid: u32) {
        if key_column(table) == Some(column) {
            self.set_sorted(table, false);
            self.extend_or_drop_virtual_sort(table, column, rid);
        }
        self.lookups.column_written(table, column, rid);
    }

    fn extend_or_drop_virtual_sort(&mut self, table: TableId, column: usize, rid: u32) {
        if self.lookups.virtual_sort(table).is_none() {
            return;
        }

        let key = self.get_column(table, column, rid).ok();
        let extended = match (key, self.lookups.virtual_sort_mut(table)) {
            (Some(key), Some(sort)) => sort.validate_after_append(rid, key),
            _ => false,
        };
        if !extended {
            self.lookups.drop_virtual_sort(table);
        }
    }

    /// Read a RID or coded index column as a token
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidArgument`] if the column carries no token, or
    /// [`crate::Error::Malformed`] for an invalid coded index.
    pub fn get_token(&self, table: TableId, column: usize, rid: u32) -> Result<Token> {
        let def = self.col_def(table, column)?;
        let value = self.get_column(table, column, rid)?;
        match def.kind {
            ColumnType::Rid(target) => Ok(Token::from_parts(target, value)),
            ColumnType::Coded(kind) => kind.decode(value),
            _ => Err(Error::InvalidArgument(format!(
                "{table:?} column {column} does not hold a token"
            ))),
        }
    }

    /// Write a token into a RID or coded index column
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidArgument`] if the column carries no token or the token
    /// addresses a table the column cannot reference.
    pub fn put_token(&mut self, table: TableId, column: usize, rid: u32, token: Token) -> Result<()> {
        let def = self.col_def(table, column)?;
        let value = match def.kind {
            ColumnType::Rid(target) => {
                if !token.is_null() && token.table_id()? != target {
                    return Err(Error::InvalidArgument(format!(
                        "{token} does not address {target:?}"
                    )));
                }
                token.row()
            }
            ColumnType::Coded(kind) => kind.encode(token)?,
            _ => {
                return Err(Error::InvalidArgument(format!(
                    "{table:?} column {column} does not hold a token"
                )))
            }
        };
        self.put_column(table, column, rid, value)
    }

    fn expect_kind(&self, table: TableId, column: usize, kind: ColumnType) -> Result<()> {
        if self.col_def(table, column)?.kind == kind {
            Ok(())
        } else {
            Err(Error::InvalidArgument(format!(
                "{table:?} column {column} is not a {kind:?} column"
            )))
        }
    }

    /// Add `value` to `#Strings` and store its offset in a string column
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidArgument`] if the column is not a string column.
    pub fn put_string(&mut self, table: TableId, column: usize, rid: u32, value: &str) -> Result<()> {
        self.expect_kind(table, column, ColumnType::Strings)?;
        let offset = self.add_string(value)?;
        self.put_column(table, column, rid, offset)
    }

    /// Add `value` to `#Blob` and store its offset in a blob column
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidArgument`] if the column is not a blob column.
    pub fn put_blob(&mut self, table: TableId, column: usize, rid: u32, value: &[u8]) -> Result<()> {
        self.expect_kind(table, column, ColumnType::Blob)?;
        let offset = self.add_blob(value)?;
        self.put_column(table, column, rid, offset)
    }

    /// Add `value` to `#GUID` and store its index in a GUID column
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidArgument`] if the column is not a GUID column.
    pub fn put_guid(&mut self, table: TableId, column: usize, rid: u32, value: &Guid) -> Result<()> {
        self.expect_kind(table, column, ColumnType::Guid)?;
        let index = self.add_guid(value)?;
        self.put_column(table, column, rid, index)
    }

    /// Read a string column
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidArgument`] if the column is not a string column.
    pub fn get_string(&self, table: TableId, column: usize, rid: u32) -> Result<&str> {
        self.expect_kind(table, column, ColumnType::Strings)?;
        self.strings.get(self.get_column(table, column, rid)?)
    }

    /// Read a blob column
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidArgument`] if the column is not a blob column.
    pub fn get_blob(&self, table: TableId, column: usize, rid: u32) -> Result<&[u8]> {
        self.expect_kind(table, column, ColumnType::Blob)?;
        self.blobs.get(self.get_column(table, column, rid)?)
    }

    /// Read a GUID column, `None` for index 0
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidArgument`] if the column is not a GUID column.
    pub fn get_guid(&self, table: TableId, column: usize, rid: u32) -> Result<Option<Guid>> {
        self.expect_kind(table, column, ColumnType::Guid)?;
        match self.get_column(table, column, rid)? {
            0 => Ok(None),
            index => self.guids.get(index).map(Some),
        }
    }

    /// Add a string to `#Strings`, returning its offset
    ///
    /// # Errors
    /// Returns [`crate::Error::ReadOnly`] or the errors of [`StringHeap::add`].
    pub fn add_string(&mut self, value: &str) -> Result<u32> {
        ensure_writable!(self);
        let offset = self.strings.add(value)?;
        self.grow_for_heaps()?;
        self.save_size = None;
        Ok(offset)
    }

    /// Add a blob to `#Blob`, returning its offset
    ///
    /// # Errors
    /// Returns [`crate::Error::ReadOnly`] or the errors of [`BlobHeap::add`].
    pub fn add_blob(&mut self, value: &[u8]) -> Result<u32> {
        ensure_writable!(self);
        let offset = self.blobs.add(value)?;
        self.grow_for_heaps()?;
        self.save_size = None;
        Ok(offset)
    }

    /// Add a GUID to `#GUID`, returning its 1-based index
    ///
    /// # Errors
    /// Returns [`crate::Error::ReadOnly`] or the errors of [`GuidHeap::add`].
    pub fn add_guid(&mut self, value: &Guid) -> Result<u32> {
        ensure_writable!(self);
        let index = self.guids.add(value)?;
        self.grow_for_heaps()?;
        self.save_size = None;
        Ok(index)
    }

    /// Add a string literal to `#US` and return its `0x70` token
    ///
    /// # Errors
    /// Returns [`crate::Error::ReadOnly`], or [`crate::Error::Overflow`] once the offset no
    /// longer fits a token.
    pub fn add_user_string(&mut self, value: &str) -> Result<Token> {
        ensure_writable!(self);
        let offset = self.user_strings.add(value)?;
        if offset > 0x00FF_FFFF {
            return Err(Error::Overflow {
                value: u64::from(offset),
                width: 3,
            });
        }
        self.grow_for_heaps()?;
        self.save_size = None;
        Ok(Token(USER_STRING_TOKEN_TYPE | offset))
    }

    /// Decode the literal behind a `0x70` token
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidArgument`] for tokens of other kinds.
    pub fn user_string(&self, token: Token) -> Result<String> {
        if token.value() & 0xFF00_0000 != USER_STRING_TOKEN_TYPE {
            return Err(Error::InvalidArgument(format!(
                "{token} is not a user string token"
            )));
        }
        self.user_strings.get(token.row())
    }

    /// Iterate over every literal of `#US` with its token
    pub fn user_strings(&self) -> impl Iterator<Item = (Token, String)> + '_ {
        self.user_strings
            .iter()
            .map(|(offset, value)| (Token(USER_STRING_TOKEN_TYPE | offset), value))
    }

    /// The `#Strings` heap
    #[must_use]
    pub fn strings(&self) -> &StringHeap {
        &self.strings
    }

    /// The `#Blob` heap
    #[must_use]
    pub fn blobs(&self) -> &BlobHeap {
        &self.blobs
    }

    /// The `#GUID` heap
    #[must_use]
    pub fn guids(&self) -> &GuidHeap {
        &self.guids
    }

    /// The `#US` heap
    #[must_use]
    pub fn user_string_heap(&self) -> &UserStringHeap {
        &self.user_strings
    }

    /// Iterator over every table kind together with its row count
    pub fn row_counts(&self) -> impl Iterator<Item = (TableId, u32)> + '_ {
        TableId::iter().map(|table| (table, self.row_count(table)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        metadata::{root::ImageBuilder, tables::col},
        options::UpdateMode,
    };

    #[test]
    fn columns_and_tokens() {
        let mut store = TableStore::new();
        let scope = store.add_record(TableId::AssemblyRef).unwrap();
        let rid = store.add_record(TableId::TypeRef).unwrap();

        let token = Token::from_parts(TableId::AssemblyRef, scope);
        store
            .put_token(TableId::TypeRef, col::typeref::RESOLUTION_SCOPE, rid, token)
            .unwrap();
        assert_eq!(
            store.get_token(TableId::TypeRef, col::typeref::RESOLUTION_SCOPE, rid).unwrap(),
            token
        );
        assert_eq!(
            store.get_column(TableId::TypeRef, col::typeref::RESOLUTION_SCOPE, rid).unwrap(),
            (scope << 2) | 2
        );

        let method = Token::from_parts(TableId::MethodDef, 1);
        assert!(matches!(
            store.put_token(TableId::TypeRef, col::typeref::RESOLUTION_SCOPE, rid, method),
            Err(Error::InvalidArgument(_))
        ));
        assert!(store.get_token(TableId::TypeRef, col::typeref::NAME, rid).is_err());
    }

    #[test]
    fn fixed_column_overflow() {
        let mut store = TableStore::new();
        let rid = store.add_record(TableId::Param).unwrap();
        assert!(matches!(
            store.put_column(TableId::Param, col::param::SEQUENCE, rid, 0x1_0000),
            Err(Error::Overflow { value: 0x1_0000, width: 2 })
        ));
        assert!(!store.is_expanded());
    }

    #[test]
    fn row_bounds() {
        let store = TableStore::new();
        assert!(matches!(
            store.get_column(TableId::TypeDef, 0, 1),
            Err(Error::RowNotFound { table: TableId::TypeDef, rid: 1 })
        ));
        assert!(matches!(
            store.col_def(TableId::TypeDef, 9),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn heaps_through_columns() {
        let mut store = TableStore::new();
        let rid = store.add_record(TableId::Module).unwrap();
        let mvid = Guid::from_bytes([7; 16]);
        store.put_string(TableId::Module, col::module::NAME, rid, "a.dll").unwrap();
        store.put_guid(TableId::Module, col::module::MVID, rid, &mvid).unwrap();

        assert_eq!(store.get_string(TableId::Module, col::module::NAME, rid).unwrap(), "a.dll");
        assert_eq!(store.get_guid(TableId::Module, col::module::MVID, rid).unwrap(), Some(mvid));
        assert_eq!(store.get_guid(TableId::Module, col::module::ENC_ID, rid).unwrap(), None);
        assert!(store.put_blob(TableId::Module, col::module::NAME, rid, &[1]).is_err());
    }

    #[test]
    fn user_strings() {
        let mut store = TableStore::new();
        let token = store.add_user_string("Hello").unwrap();
        assert_eq!(token.value() & 0xFF00_0000, 0x7000_0000);
        assert_eq!(store.user_string(token).unwrap(), "Hello");
        assert_eq!(store.add_user_string("Hello").unwrap(), token);

        let all: Vec<_> = store.user_strings().collect();
        assert_eq!(all, vec![(token, "Hello".to_string())]);
        assert!(store.user_string(Token(0x0600_0001)).is_err());
    }

    #[test]
    fn read_only_rejects_mutation() {
        let mut builder = ImageBuilder::new("v4.0.30319");
        let mut schema = Schema::default();
        schema.rows[TableId::Module.index()] = 1;
        let tables = builder.create_stream(TABLES_STREAM);
        schema.write(tables).unwrap();
        tables.extend_from_slice(&[0u8; 10]);
        let image = builder.finish().unwrap();

        let mut store = TableStore::from_buffer(&image, true).unwrap();
        assert!(store.is_read_only());
        assert_eq!(store.row_count(TableId::Module), 1);
        assert!(matches!(store.add_record(TableId::TypeDef), Err(Error::ReadOnly)));
        assert!(matches!(store.add_string("x"), Err(Error::ReadOnly)));
        assert!(matches!(
            store.put_column(TableId::Module, col::module::GENERATION, 1, 1),
            Err(Error::ReadOnly)
        ));
    }

    #[test]
    fn missing_tables_stream() {
        let mut builder = ImageBuilder::new("v4.0.30319");
        builder.create_stream("#Strings").push(0);
        let image = builder.finish().unwrap();
        assert!(matches!(
            TableStore::from_buffer(&image, false),
            Err(Error::Malformed { .. })
        ));
    }

    #[test]
    fn mixed_widths_expand_on_load() {
        let mut builder = ImageBuilder::new("v4.0.30319");
        let mut schema = Schema::default();
        schema.rows[TableId::Field.index()] = 1;
        schema.heaps = crate::metadata::tables::HeapSizes::BLOB_WIDE;
        let tables = builder.create_stream(TABLES_STREAM);
        schema.write(tables).unwrap();
        // Flags u16, Name u16, Signature u32
        tables.extend_from_slice(&[0x06, 0x00, 0x01, 0x00, 0x02, 0x00, 0x00, 0x00]);
        let image = builder.finish().unwrap();

        let read_only = TableStore::from_buffer(&image, true).unwrap();
        assert_eq!(read_only.table_def(TableId::Field).row_size, 8);
        assert!(read_only.table_def(TableId::Field).variable_width().is_none());

        let store = TableStore::from_buffer(&image, false).unwrap();
        assert!(store.is_expanded());
        assert_eq!(store.table_def(TableId::Field).row_size, 10);
        assert_eq!(store.get_column(TableId::Field, col::field::FLAGS, 1).unwrap(), 6);
        assert_eq!(store.get_column(TableId::Field, col::field::NAME, 1).unwrap(), 1);
        assert_eq!(store.get_column(TableId::Field, col::field::SIGNATURE, 1).unwrap(), 2);
    }

    #[test]
    fn enc_load_starts_session() {
        let mut store = TableStore::new();
        store.add_record(TableId::TypeRef).unwrap();
        let image = store.save(SaveMode::Full).unwrap();

        let loaded = TableStore::from_buffer_with_options(&image, false, StoreOptions::enc()).unwrap();
        assert_eq!(loaded.options().update_mode, UpdateMode::Enc);
        assert_eq!(loaded.enc_session_rows[TableId::TypeRef.index()], 1);
    }
}
