use rustc_hash::{FxHashMap, FxHashSet};
use strum::EnumIter;

use crate::{
    metadata::{
        tables::{col, TableId, TableStore},
        token::{Token, RECID_FLAG},
    },
    Error, Result,
};

/// Operation recorded by an ENC log entry
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter)]
#[repr(u32)]
pub enum FuncCode {
    /// The row addressed by the token was added or changed
    Default = 0,
    /// A method was created under the TypeDef addressed by the token
    MethodCreate = 1,
    /// A field was created under the TypeDef addressed by the token
    FieldCreate = 2,
    /// A param was created under the MethodDef addressed by the token
    ParamCreate = 3,
    /// A property was created under the PropertyMap row addressed by the token
    PropertyCreate = 4,
    /// An event was created under the EventMap row addressed by the token
    EventCreate = 5,
}

impl FuncCode {
    /// Parent and child table of a create code, `None` for [`FuncCode::Default`]
    #[must_use]
    pub fn creates(self) -> Option<(TableId, TableId)> {
        match self {
            FuncCode::Default => None,
            FuncCode::MethodCreate => Some((TableId::TypeDef, TableId::MethodDef)),
            FuncCode::FieldCreate => Some((TableId::TypeDef, TableId::Field)),
            FuncCode::ParamCreate => Some((TableId::MethodDef, TableId::Param)),
            FuncCode::PropertyCreate => Some((TableId::PropertyMap, TableId::Property)),
            FuncCode::EventCreate => Some((TableId::EventMap, TableId::Event)),
        }
    }
}

impl TryFrom<u32> for FuncCode {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self> {
        match value {
            0 => Ok(FuncCode::Default),
            1 => Ok(FuncCode::MethodCreate),
            2 => Ok(FuncCode::FieldCreate),
            3 => Ok(FuncCode::ParamCreate),
            4 => Ok(FuncCode::PropertyCreate),
            5 => Ok(FuncCode::EventCreate),
            other => Err(Error::UnexpectedFuncCode(other)),
        }
    }
}

/// One row of the `EncLog` table
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EncLogEntry {
    /// Addressed row, with any RecId marker removed
    pub token: Token,
    /// What happened to it
    pub code: FuncCode,
}

impl TableStore {
    /// Record an edit in the ENC log.
    ///
    /// Does nothing unless the store runs in an ENC update mode.
    ///
    /// # Errors
    /// Returns [`crate::Error::ReadOnly`] or the errors of appending the log row.
    pub fn update_enc_log(&mut self, token: Token, code: FuncCode) -> Result<()> {
        if !self.options.update_mode.records_enc_log() {
            return Ok(());
        }
        ensure_writable!(self);

        let rid = self.append_record(TableId::EncLog)?;
        self.write_column(TableId::EncLog, col::enclog::TOKEN, rid, token.value())?;
        self.write_column(TableId::EncLog, col::enclog::FUNC_CODE, rid, code as u32)
    }

    /// Start a new edit session.
    ///
    /// Heap sizes and row counts become the baseline that the next delta save is computed
    /// against, and the log and map tables are emptied.
    ///
    /// # Errors
    /// Returns [`crate::Error::ReadOnly`].
    pub fn start_enc_session(&mut self) -> Result<()> {
        ensure_writable!(self);
        self.tables[TableId::EncLog.index()].clear();
        self.tables[TableId::EncMap.index()].clear();
        self.checkpoint_session();
        self.save_size = None;
        Ok(())
    }

    /// Decode the ENC log
    ///
    /// # Errors
    /// Returns [`crate::Error::UnexpectedFuncCode`] for an entry with an unknown code.
    pub fn enc_log(&self) -> Result<Vec<EncLogEntry>> {
        (1..=self.row_count(TableId::EncLog))
            .map(|rid| {
                let token = self.get_column(TableId::EncLog, col::enclog::TOKEN, rid)?;
                let code = self.get_column(TableId::EncLog, col::enclog::FUNC_CODE, rid)?;
                Ok(EncLogEntry {
                    token: Token(token & !RECID_FLAG),
                    code: FuncCode::try_from(code)?,
                })
            })
            .collect()
    }

    /// Drop repeated log entries for the same row and return how many were dropped.
    ///
    /// Create codes and the entry right after a [`FuncCode::ParamCreate`] are always kept.
    /// For a row created in this session the first entry survives, so it still directly
    /// follows its creation; for a pre-existing row the last one does.
    pub(crate) fn dedup_enc_log(&mut self) -> Result<usize> {
        let count = self.row_count(TableId::EncLog);
        let mut entries = Vec::with_capacity(count as usize);
        for rid in 1..=count {
            entries.push((
                Token(self.get_column(TableId::EncLog, col::enclog::TOKEN, rid)? & !RECID_FLAG),
                self.get_column(TableId::EncLog, col::enclog::FUNC_CODE, rid)?,
            ));
        }

        let mut keep = vec![true; entries.len()];
        let mut created_seen = FxHashSet::default();
        let mut existing_last: FxHashMap<Token, usize> = FxHashMap::default();

        for (position, (token, code)) in entries.iter().enumerate() {
            let after_param_create = position > 0
                && entries[position - 1].1 == FuncCode::ParamCreate as u32;
            if *code != FuncCode::Default as u32 {
                continue;
            }
            if after_param_create {
                created_seen.insert(*token);
                continue;
            }

            let created = token
                .table_id()
                .is_ok_and(|table| token.row() > self.enc_session_rows[table.index()]);
            if created {
                if !created_seen.insert(*token) {
                    keep[position] = false;
                }
            } else if let Some(previous) = existing_last.insert(*token, position) {
                keep[previous] = false;
            }
        }

        let order: Vec<u32> = keep
            .iter()
            .zip(1u32..)
            .filter(|(kept, _)| **kept)
            .map(|(_, rid)| rid)
            .collect();
        let dropped = entries.len() - order.len();
        if dropped > 0 {
            log::warn!("Dropping {} duplicate ENC log entries", dropped);
            self.reorder_rows(TableId::EncLog, &order)?;
        }
        Ok(dropped)
    }
}
