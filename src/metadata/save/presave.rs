use crate::{
    metadata::{
        save::SaveMode,
        tables::{col, key_column, TableId, TableStore},
        token::Token,
    },
    Result,
};

/// Tables whose coded and RID columns are rewritten after indirection tables are gone
const FIX_UP_BEFORE_SORT: [TableId; 11] = [
    TableId::MemberRef,
    TableId::MethodSemantics,
    TableId::Constant,
    TableId::FieldMarshal,
    TableId::MethodImpl,
    TableId::DeclSecurity,
    TableId::ImplMap,
    TableId::FieldRVA,
    TableId::FieldLayout,
    TableId::GenericParam,
    TableId::MethodSpec,
];

/// Keyed tables no token can point at
const SORT_WITHOUT_REMAP: [TableId; 9] = [
    TableId::Constant,
    TableId::FieldMarshal,
    TableId::MethodSemantics,
    TableId::ClassLayout,
    TableId::FieldLayout,
    TableId::ImplMap,
    TableId::FieldRVA,
    TableId::NestedClass,
    TableId::MethodImpl,
];

impl TableStore {
    /// Normalize the tables for a save in `mode`.
    ///
    /// On failure the movement map and every lookup cache are dropped; rows already moved
    /// stay where they are.
    pub(crate) fn presave(&mut self, mode: SaveMode) -> Result<()> {
        let result = match mode {
            SaveMode::Full => self.presave_full(),
            SaveMode::Enc => self.presave_enc(false),
            SaveMode::Delta => self.presave_enc(true),
        };

        if result.is_err() {
            self.movements.clear();
            self.lookups.clear();
        }
        result
    }

    fn presave_full(&mut self) -> Result<()> {
        let folded = self.collect_ref_to_def()?;

        self.resolve_markers()?;
        self.eliminate_ptr_tables()?;

        for table in FIX_UP_BEFORE_SORT {
            self.fix_up_table(table)?;
        }
        self.sort_table(TableId::GenericParam, true, true)?;
        self.sort_table(TableId::InterfaceImpl, true, true)?;
        self.sort_table(TableId::DeclSecurity, false, true)?;

        self.fix_up_table(TableId::GenericParamConstraint)?;
        self.sort_table(TableId::GenericParamConstraint, true, true)?;

        self.fix_up_table(TableId::CustomAttribute)?;
        for table in SORT_WITHOUT_REMAP {
            self.sort_table(table, false, false)?;
        }
        self.sort_table(TableId::CustomAttribute, false, true)?;

        for table in [TableId::PropertyMap, TableId::EventMap] {
            let increasing = self.keys_strictly_increasing(table)?;
            self.set_sorted(table, increasing);
        }

        self.emit_ref_to_def(&folded);
        self.movements.clear();
        self.lookups.clear();
        Ok(())
    }

    fn presave_enc(&mut self, minimal: bool) -> Result<()> {
        self.resolve_markers()?;
        self.dedup_enc_log()?;
        if minimal {
            self.build_enc_map()?;
        }
        Ok(())
    }

    fn keys_strictly_increasing(&self, table: TableId) -> Result<bool> {
        let Some(column) = key_column(table) else {
            return Ok(false);
        };

        let mut previous = None;
        for rid in 1..=self.row_count(table) {
            let key = self.get_column(table, column, rid)?;
            if previous.is_some_and(|previous| previous >= key) {
                return Ok(false);
            }
            previous = Some(key);
        }
        Ok(true)
    }

    /// Rewrite every child table that has a Ptr table into logical order and drop the Ptr
    /// table. Params also follow the new method order, and method param lists are rebuilt.
    fn eliminate_ptr_tables(&mut self) -> Result<()> {
        let param_windows = if self.has_indirect_table(TableId::MethodDef)
            || self.has_indirect_table(TableId::Param)
        {
            let windows = (1..=self.row_count(TableId::MethodDef))
                .map(|rid| self.children(TableId::MethodDef, TableId::Param, rid))
                .collect::<Result<Vec<_>>>()?;
            Some(windows)
        } else {
            None
        };

        let mut method_order = None;
        for child in [
            TableId::Field,
            TableId::MethodDef,
            TableId::Event,
            TableId::Property,
        ] {
            if !self.has_indirect_table(child) {
                continue;
            }
            let order = self.logical_order(child)?;
            self.flatten(child, &order)?;
            if child == TableId::MethodDef {
                method_order = Some(order);
            }
        }

        let Some(windows) = param_windows else {
            return Ok(());
        };
        let methods =
            method_order.unwrap_or_else(|| (1..=self.row_count(TableId::MethodDef)).collect());

        let count = self.row_count(TableId::Param);
        let mut seen = vec![false; count as usize + 1];
        let mut order = Vec::with_capacity(count as usize);
        let mut starts = Vec::with_capacity(methods.len());
        for method in &methods {
            #[allow(clippy::cast_possible_truncation)]
            starts.push(order.len() as u32 + 1);
            for param in &windows[*method as usize - 1] {
                if std::mem::replace(&mut seen[*param as usize], true) {
                    return Err(malformed_error!("Param {} is owned by two methods", param));
                }
                order.push(*param);
            }
        }
        order.extend((1..=count).filter(|rid| !seen[*rid as usize]));

        self.flatten(TableId::Param, &order)?;
        for (rid, start) in (1u32..).zip(starts) {
            self.write_column(TableId::MethodDef, col::method::PARAM_LIST, rid, start)?;
        }
        Ok(())
    }

    /// Physical RIDs of `child` in Ptr table order, followed by rows the Ptr table misses
    fn logical_order(&self, child: TableId) -> Result<Vec<u32>> {
        let Some(ptr) = child.ptr_table() else {
            return Ok((1..=self.row_count(child)).collect());
        };

        let count = self.row_count(child);
        let mut seen = vec![false; count as usize + 1];
        let mut order = Vec::with_capacity(count as usize);
        for position in 1..=self.row_count(ptr) {
            let rid = self.get_column(ptr, col::ptr::TARGET, position)?;
            if rid == 0 || rid > count {
                return Err(malformed_error!(
                    "{:?} row {} points past {:?}",
                    ptr,
                    position,
                    child
                ));
            }
            if std::mem::replace(&mut seen[rid as usize], true) {
                return Err(malformed_error!("{:?} lists {} twice", ptr, rid));
            }
            order.push(rid);
        }
        order.extend((1..=count).filter(|rid| !seen[*rid as usize]));
        Ok(order)
    }

    fn flatten(&mut self, child: TableId, order: &[u32]) -> Result<()> {
        self.reorder_rows(child, order)?;
        if let Some(ptr) = child.ptr_table() {
            self.tables[ptr.index()].clear();
            self.lookups.invalidate_table(ptr);
        }
        self.lookups.invalidate_table(child);

        let moves: Vec<(Token, Token)> = order
            .iter()
            .zip(1u32..)
            .filter(|(old, new)| **old != *new)
            .map(|(old, new)| (Token::from_parts(child, *old), Token::from_parts(child, new)))
            .collect();
        log::debug!(
            "Eliminated the indirection of {:?}, {} rows moved",
            child,
            moves.len()
        );
        self.record_moves(&moves);
        Ok(())
    }
}
