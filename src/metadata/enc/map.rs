use crate::{
    metadata::{
        tables::{col, TableId, TableStore, TABLE_COUNT},
        token::{Token, RECID_FLAG},
    },
    Result,
};

/// Tables that a minimal delta always carries in full
pub(crate) const FULL_IN_DELTA: [TableId; 3] = [TableId::Module, TableId::EncLog, TableId::EncMap];

/// Per table, the logical RIDs a minimal delta stores, in storage order.
///
/// A minimal delta keeps only the rows its log touches and numbers them from 1 in every
/// table. Row `n` of a table in the delta is the `n`-th RID listed for that table here.
#[derive(Clone, Debug)]
pub struct EncMapDirectory {
    minimal: bool,
    rows: Vec<Vec<u32>>,
}

impl EncMapDirectory {
    /// Read the `EncMap` table of `store`
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if a map token addresses an unknown table.
    pub fn from_store(store: &TableStore) -> Result<Self> {
        let mut rows = vec![Vec::new(); TABLE_COUNT];
        for rid in 1..=store.row_count(TableId::EncMap) {
            let token = Token(store.get_column(TableId::EncMap, col::encmap::TOKEN, rid)? & !RECID_FLAG);
            let Ok(table) = token.table_id() else {
                return Err(malformed_error!("ENCMap row {} holds invalid token {}", rid, token));
            };
            rows[table.index()].push(token.row());
        }

        Ok(EncMapDirectory {
            minimal: store.is_minimal_delta(),
            rows,
        })
    }

    /// Logical RIDs listed for `table`
    #[must_use]
    pub fn rows(&self, table: TableId) -> &[u32] {
        &self.rows[table.index()]
    }

    /// Storage RID inside the delta of the row with logical RID `rid`
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if a minimal delta lists rows of `table` but not
    /// `rid`.
    pub fn delta_record(&self, table: TableId, rid: u32) -> Result<u32> {
        let rows = &self.rows[table.index()];
        if !self.minimal || rows.is_empty() {
            return Ok(rid);
        }

        match rows.binary_search(&rid) {
            #[allow(clippy::cast_possible_truncation)]
            Ok(position) => Ok(position as u32 + 1),
            Err(_) => Err(malformed_error!(
                "Row {} of {:?} is missing from the delta",
                rid,
                table
            )),
        }
    }
}

impl TableStore {
    /// Rebuild `EncMap` from the ENC log: every logged row once, ordered by table and RID
    ///
    /// # Errors
    /// Returns [`crate::Error::ReadOnly`] or the errors of writing the map.
    pub fn build_enc_map(&mut self) -> Result<()> {
        ensure_writable!(self);

        let mut tokens = Vec::new();
        for rid in 1..=self.row_count(TableId::EncLog) {
            let token = Token(self.get_column(TableId::EncLog, col::enclog::TOKEN, rid)? & !RECID_FLAG);
            match token.table_id() {
                Ok(table) if !FULL_IN_DELTA.contains(&table) && token.row() != 0 => {
                    tokens.push(token);
                }
                _ => {}
            }
        }
        tokens.sort_unstable();
        tokens.dedup();

        self.tables[TableId::EncMap.index()].clear();
        for token in tokens {
            let rid = self.append_record(TableId::EncMap)?;
            self.write_column(TableId::EncMap, col::encmap::TOKEN, rid, token.value())?;
        }
        Ok(())
    }

    /// Tokens listed in `EncMap`
    ///
    /// # Errors
    /// Returns the errors of reading the map rows.
    pub fn enc_map(&self) -> Result<Vec<Token>> {
        (1..=self.row_count(TableId::EncMap))
            .map(|rid| {
                self.get_column(TableId::EncMap, col::encmap::TOKEN, rid)
                    .map(|value| Token(value & !RECID_FLAG))
            })
            .collect()
    }
}
