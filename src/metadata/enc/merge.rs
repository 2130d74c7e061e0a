use crate::{
    file::io::align4,
    metadata::{
        enc::{EncLogEntry, EncMapDirectory, FuncCode},
        heaps::HeapPool,
        tables::{col, columns, TableId, TableStore, LIST_COLUMNS},
    },
    Error, Result,
};

/// Progress of a [`DeltaMerge`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergeStage {
    /// Compatibility checks and the row directory
    Start,
    /// Appending the delta's heap content
    ApplyHeapDeltas,
    /// Replaying the ENC log, one entry per step
    ApplyLogEntries,
    /// Persisting the log and dropping stale lookups
    End,
}

/// Applies a delta image to the store it was derived from.
///
/// The merge borrows both stores; the delta is only read. Each [`DeltaMerge::step`] performs
/// one stage, or one log entry while replaying, which lets a host interleave long merges with
/// other work. A failed step leaves the base partially merged and the merge must not be
/// resumed.
pub struct DeltaMerge<'a> {
    base: &'a mut TableStore,
    delta: &'a TableStore,
    stage: MergeStage,
    directory: Option<EncMapDirectory>,
    entries: Vec<EncLogEntry>,
    next_entry: usize,
    finished: bool,
}

impl<'a> DeltaMerge<'a> {
    /// Prepare a merge of `delta` into `base`
    pub fn new(base: &'a mut TableStore, delta: &'a TableStore) -> Self {
        DeltaMerge {
            base,
            delta,
            stage: MergeStage::Start,
            directory: None,
            entries: Vec::new(),
            next_entry: 0,
            finished: false,
        }
    }

    /// The stage the next call to [`DeltaMerge::step`] performs
    #[must_use]
    pub fn stage(&self) -> MergeStage {
        self.stage
    }

    /// Perform one unit of work; returns `false` once the merge is complete
    ///
    /// # Errors
    /// Returns [`crate::Error::VersionMismatch`], [`crate::Error::ModuleMismatch`],
    /// [`crate::Error::UnexpectedFuncCode`], or [`crate::Error::Malformed`] for a log that does
    /// not fit the base.
    pub fn step(&mut self) -> Result<bool> {
        if self.finished {
            return Ok(false);
        }

        match self.stage {
            MergeStage::Start => {
                self.start()?;
                self.advance(MergeStage::ApplyHeapDeltas);
            }
            MergeStage::ApplyHeapDeltas => {
                self.apply_heaps()?;
                self.advance(MergeStage::ApplyLogEntries);
            }
            MergeStage::ApplyLogEntries => {
                if self.next_entry < self.entries.len() {
                    self.apply_next_entry()?;
                } else {
                    self.advance(MergeStage::End);
                }
            }
            MergeStage::End => {
                self.end()?;
                self.finished = true;
            }
        }
        Ok(!self.finished)
    }

    /// Run every remaining step
    ///
    /// # Errors
    /// See [`DeltaMerge::step`].
    pub fn run(mut self) -> Result<()> {
        while self.step()? {}
        Ok(())
    }

    fn advance(&mut self, stage: MergeStage) {
        log::debug!("Delta merge {:?} -> {:?}", self.stage, stage);
        self.stage = stage;
    }

    fn start(&mut self) -> Result<()> {
        let (base, delta) = (self.base.version(), self.delta.version());
        if base != delta {
            return Err(Error::VersionMismatch { base, delta });
        }

        if self.base.row_count(TableId::Module) > 0 && self.delta.row_count(TableId::Module) > 0 {
            let base_mvid = self.base.get_guid(TableId::Module, col::module::MVID, 1)?;
            let delta_mvid = self.delta.get_guid(TableId::Module, col::module::MVID, 1)?;
            if base_mvid != delta_mvid {
                if self.base.options.strict_delta_check && cfg!(debug_assertions) {
                    return Err(Error::ModuleMismatch);
                }
                log::warn!("Delta module identity differs from the base, merging anyway");
            }
        }

        self.entries = self.delta.enc_log()?;
        self.directory = Some(EncMapDirectory::from_store(self.delta)?);
        Ok(())
    }

    fn apply_heaps(&mut self) -> Result<()> {
        let minimal = self.delta.is_minimal_delta();
        let base = &mut *self.base;
        let delta = self.delta;

        append_heap(&mut base.strings, &delta.strings, minimal)?;
        append_heap(&mut base.blobs, &delta.blobs, minimal)?;
        append_heap(&mut base.user_strings, &delta.user_strings, minimal)?;
        append_heap(&mut base.guids, &delta.guids, false)?;

        base.grow_for_heaps()
    }

    fn apply_next_entry(&mut self) -> Result<()> {
        let entry = self.entries[self.next_entry];
        self.next_entry += 1;

        let table = entry.token.table_id()?;
        let rid = entry.token.row();

        match entry.code.creates() {
            None => self.apply_record(table, rid),
            Some((parent, child)) => {
                if table != parent {
                    return Err(malformed_error!(
                        "{:?} logged against {:?} instead of {:?}",
                        entry.code,
                        table,
                        parent
                    ));
                }
                if entry.code == FuncCode::ParamCreate {
                    self.apply_param_create(rid)
                } else {
                    self.base.create_child(parent, rid, child).map(|_| ())
                }
            }
        }
    }

    /// A param is created from the record that follows its create entry, so that the
    /// sequence number is known before the param is placed among its siblings
    fn apply_param_create(&mut self, method_rid: u32) -> Result<()> {
        let Some(record) = self.entries.get(self.next_entry).copied() else {
            return Err(malformed_error!("ParamCreate is the last ENC log entry"));
        };
        self.next_entry += 1;
        if record.token.table_id()? != TableId::Param {
            return Err(malformed_error!(
                "ParamCreate followed by {} instead of a param",
                record.token
            ));
        }
        if method_rid == 0 || method_rid > self.base.row_count(TableId::MethodDef) {
            return Err(Error::RowNotFound {
                table: TableId::MethodDef,
                rid: method_rid,
            });
        }

        let rid = self.base.append_record(TableId::Param)?;
        self.copy_row(TableId::Param, record.token.row(), rid)?;
        self.base
            .link_child(TableId::MethodDef, method_rid, TableId::Param, rid)?;
        self.base.fix_param_sequence(method_rid)
    }

    fn apply_record(&mut self, table: TableId, rid: u32) -> Result<()> {
        if matches!(table, TableId::EncLog | TableId::EncMap) {
            return Ok(());
        }

        let count = self.base.row_count(table);
        if rid == 0 || rid > count + 1 {
            return Err(malformed_error!(
                "Delta updates {:?} row {} but the base has {} rows",
                table,
                rid,
                count
            ));
        }
        if rid == count + 1 {
            self.base.append_record(table)?;
        }
        self.copy_row(table, rid, rid)
    }

    /// Copy one row from the delta, except the list columns, which the base maintains itself
    fn copy_row(&mut self, table: TableId, delta_rid: u32, base_rid: u32) -> Result<()> {
        let Some(directory) = self.directory.as_ref() else {
            return Err(malformed_error!("Delta merge replayed before its directory was built"));
        };
        let source = directory.delta_record(table, delta_rid)?;

        for column in 0..columns(table).len() {
            if LIST_COLUMNS
                .iter()
                .any(|(parent, list, _)| *parent == table && *list == column)
            {
                continue;
            }
            let value = self.delta.get_column(table, column, source)?;
            self.base.write_column(table, column, base_rid, value)?;
            self.base.after_column_write(table, column, base_rid);
        }
        Ok(())
    }

    fn end(&mut self) -> Result<()> {
        for rid in 1..=self.delta.row_count(TableId::EncLog) {
            let token = self.delta.get_column(TableId::EncLog, col::enclog::TOKEN, rid)?;
            let code = self.delta.get_column(TableId::EncLog, col::enclog::FUNC_CODE, rid)?;
            let target = self.base.append_record(TableId::EncLog)?;
            self.base
                .write_column(TableId::EncLog, col::enclog::TOKEN, target, token)?;
            self.base
                .write_column(TableId::EncLog, col::enclog::FUNC_CODE, target, code)?;
        }

        self.base.lookups.clear();
        self.base.save_size = None;
        log::debug!(
            "Delta merge applied {} ENC log entries",
            self.entries.len()
        );
        Ok(())
    }
}

/// Append what `delta` holds beyond `base`.
///
/// A minimal delta carries only the bytes added in its session, which started on a 4-byte
/// boundary of the base heap.
fn append_heap(base: &mut impl HeapPool, delta: &impl HeapPool, minimal: bool) -> Result<()> {
    if !minimal {
        let added = delta.data().get(base.size() as usize..).unwrap_or(&[]);
        return base.append_raw(added);
    }
    if delta.data().is_empty() {
        return Ok(());
    }

    let size = base.size() as usize;
    let padding = align4(size) - size;
    if padding > 0 {
        base.append_raw(&[0u8; 3][..padding])?;
    }
    base.append_raw(delta.data())
}

impl TableStore {
    /// Merge an ENC delta image, loaded as its own store, into this store
    ///
    /// # Errors
    /// Returns [`crate::Error::ReadOnly`], or the errors of [`DeltaMerge::step`]. On error the
    /// lookup caches are dropped; rows merged before the failure remain.
    pub fn apply_delta(&mut self, delta: &TableStore) -> Result<()> {
        ensure_writable!(self);
        let result = DeltaMerge::new(self, delta).run();
        if result.is_err() {
            self.lookups.clear();
        }
        result
    }
}
