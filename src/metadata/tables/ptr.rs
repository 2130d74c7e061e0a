//! Indirection tables and child linking.
//!
//! Children of a parent row (fields and methods of a type, params of a method, events and
//! properties of a map row) form a contiguous range that starts at the parent's list column
//! and ends where the next parent's range starts. As long as children are emitted in parent
//! order they are simply appended. A child emitted for a parent whose successor already owns
//! children cannot be placed physically, so the child table gets a Ptr table: a list of
//! physical RIDs in logical order, and list columns address positions in that list instead.
//!
//! A list column holding [`END_OF_TABLE`] has no children yet and means "one past the last
//! row". Markers only ever form a suffix of the parent table.

use crate::{
    metadata::{
        tables::{col, list_column, TableId, TableStore, LIST_COLUMNS},
        token::Token,
    },
    options::OutOfOrderFlags,
    Error, Result,
};

/// List column value of a parent that has no children yet
pub const END_OF_TABLE: u32 = 0;

/// Outcome of trying to link a child without an indirection table
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChildLink {
    /// The child is in place
    Direct,
    /// The child must be linked through the Ptr table
    NeedsIndirection,
}

fn out_of_order_flag(child: TableId) -> OutOfOrderFlags {
    match child {
        TableId::Field => OutOfOrderFlags::FIELD,
        TableId::MethodDef => OutOfOrderFlags::METHOD,
        TableId::Param => OutOfOrderFlags::PARAM,
        TableId::Property => OutOfOrderFlags::PROPERTY,
        TableId::Event => OutOfOrderFlags::EVENT,
        _ => OutOfOrderFlags::empty(),
    }
}

fn ptr_of(child: TableId) -> Result<TableId> {
    child
        .ptr_table()
        .ok_or_else(|| Error::InvalidArgument(format!("{child:?} has no indirection table")))
}

fn list_of(parent: TableId, child: TableId) -> Result<usize> {
    list_column(parent, child)
        .ok_or_else(|| Error::InvalidArgument(format!("{parent:?} has no list of {child:?}")))
}

impl TableStore {
    /// True if `child` is currently addressed through its Ptr table
    #[must_use]
    pub fn has_indirect_table(&self, child: TableId) -> bool {
        child
            .ptr_table()
            .is_some_and(|ptr| self.row_count(ptr) > 0)
    }

    /// List column value for a parent row created now
    #[must_use]
    pub fn new_record_pointer_end_value(&self, child: TableId) -> u32 {
        match child.ptr_table() {
            Some(ptr) if self.row_count(ptr) > 0 => self.row_count(ptr) + 1,
            _ => END_OF_TABLE,
        }
    }

    /// Link the last row of `child` to `parent_rid` without an indirection table, if possible
    ///
    /// When this returns [`ChildLink::NeedsIndirection`] the Ptr table has been prepared and
    /// the caller must finish with [`TableStore::add_child_row_indirect`].
    ///
    /// # Errors
    /// Returns [`crate::Error::RecordOutOfOrder`] if an indirection table is needed but the
    /// out-of-order policy forbids it for `child`.
    pub fn add_child_row_direct(
        &mut self,
        parent: TableId,
        column: usize,
        child: TableId,
        parent_rid: u32,
    ) -> Result<ChildLink> {
        if self.has_indirect_table(child) {
            return Ok(ChildLink::NeedsIndirection);
        }

        let child_count = self.row_count(child);
        let parent_count = self.row_count(parent);

        if self.get_column(parent, column, parent_rid)? == END_OF_TABLE {
            self.convert_marker_to_end_of_table(parent, column, child_count, parent_rid)?;
            return Ok(ChildLink::Direct);
        }
        if parent_rid == parent_count {
            return Ok(ChildLink::Direct);
        }

        let next = self.get_column(parent, column, parent_rid + 1)?;
        if next == END_OF_TABLE {
            return Ok(ChildLink::Direct);
        }
        if next == child_count {
            for rid in parent_rid + 1..=parent_count {
                self.write_column(parent, column, rid, next + 1)?;
            }
            return Ok(ChildLink::Direct);
        }

        self.convert_marker_to_end_of_table(parent, column, child_count, parent_count)?;
        self.create_indirect_table(child, true)?;
        Ok(ChildLink::NeedsIndirection)
    }

    /// Link `child_rid` to `parent_rid` through the Ptr table of `child`
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidArgument`] if `child` cannot have an indirection table.
    pub fn add_child_row_indirect(
        &mut self,
        parent: TableId,
        column: usize,
        child: TableId,
        parent_rid: u32,
        child_rid: u32,
    ) -> Result<()> {
        let ptr = ptr_of(child)?;
        let parent_count = self.row_count(parent);

        let position = if parent_rid == parent_count {
            self.append_record(ptr)?
        } else {
            let position = self.get_column(parent, column, parent_rid + 1)?;
            self.insert_row(ptr, position)?;
            for rid in parent_rid + 1..=parent_count {
                let value = self.get_column(parent, column, rid)?;
                self.write_column(parent, column, rid, value + 1)?;
            }
            position
        };

        self.write_column(ptr, col::ptr::TARGET, position, child_rid)?;
        self.lookups.link_parent(child, child_rid, parent_rid);
        Ok(())
    }

    /// Replace the markers of `parent_rid` and the marker rows before it with `end`
    ///
    /// # Errors
    /// Returns [`crate::Error::RowNotFound`] if `parent_rid` does not exist.
    pub fn convert_marker_to_end_of_table(
        &mut self,
        parent: TableId,
        column: usize,
        end: u32,
        parent_rid: u32,
    ) -> Result<()> {
        let mut rid = parent_rid;
        while rid > 0 && self.get_column(parent, column, rid)? == END_OF_TABLE {
            self.write_column(parent, column, rid, end)?;
            rid -= 1;
        }
        Ok(())
    }

    /// Resolve every remaining end-of-table marker to one past the last child
    ///
    /// # Errors
    /// Returns the errors of writing the list columns.
    pub fn resolve_markers(&mut self) -> Result<()> {
        for (parent, column, child) in LIST_COLUMNS {
            let count = self.row_count(parent);
            if count == 0 {
                continue;
            }
            let end = self.child_limit(child);
            self.convert_marker_to_end_of_table(parent, column, end, count)?;
        }
        Ok(())
    }

    /// Create the Ptr table of `child` as an identity mapping of its rows.
    ///
    /// With `one_less` the last row is left out, for the caller to link it.
    ///
    /// # Errors
    /// Returns [`crate::Error::RecordOutOfOrder`] if the out-of-order policy forbids an
    /// indirection table for `child`.
    pub fn create_indirect_table(&mut self, child: TableId, one_less: bool) -> Result<()> {
        if self.options.out_of_order.intersects(out_of_order_flag(child)) {
            return Err(Error::RecordOutOfOrder(child));
        }

        let ptr = ptr_of(child)?;
        let count = self.row_count(child).saturating_sub(u32::from(one_less));
        log::debug!("Creating {:?} with {} rows", ptr, count);

        for rid in 1..=count {
            let position = self.append_record(ptr)?;
            self.write_column(ptr, col::ptr::TARGET, position, rid)?;
        }
        Ok(())
    }

    /// Move the last param of `method_rid` in front of the params with a larger sequence
    /// number, creating the ParamPtr table if the params are stored directly.
    ///
    /// # Errors
    /// Returns [`crate::Error::RecordOutOfOrder`] if reordering is required but forbidden.
    pub fn fix_param_sequence(&mut self, method_rid: u32) -> Result<()> {
        let range = self.list_range(TableId::MethodDef, TableId::Param, method_rid)?;
        if range.end.saturating_sub(range.start) < 2 {
            return Ok(());
        }

        let last = range.end - 1;
        let new_param = self.logical_child(TableId::Param, last)?;
        let sequence = self.get_column(TableId::Param, col::param::SEQUENCE, new_param)?;

        let mut position = last;
        while position > range.start {
            let previous = self.logical_child(TableId::Param, position - 1)?;
            if sequence >= self.get_column(TableId::Param, col::param::SEQUENCE, previous)? {
                break;
            }
            position -= 1;
        }
        if position == last {
            return Ok(());
        }

        if !self.has_indirect_table(TableId::Param) {
            self.create_indirect_table(TableId::Param, false)?;
        }

        for slot in (position..last).rev() {
            let target = self.get_column(TableId::ParamPtr, col::ptr::TARGET, slot)?;
            self.write_column(TableId::ParamPtr, col::ptr::TARGET, slot + 1, target)?;
        }
        self.write_column(TableId::ParamPtr, col::ptr::TARGET, position, new_param)
    }

    /// Link an existing child row to a parent row, going through the Ptr table if needed
    pub(crate) fn link_child(
        &mut self,
        parent: TableId,
        parent_rid: u32,
        child: TableId,
        child_rid: u32,
    ) -> Result<()> {
        let column = list_of(parent, child)?;
        if self.add_child_row_direct(parent, column, child, parent_rid)?
            == ChildLink::NeedsIndirection
        {
            self.add_child_row_indirect(parent, column, child, parent_rid, child_rid)?;
        }
        self.save_size = None;
        Ok(())
    }

    /// Link the just added method `method_rid` to the type `type_rid`
    ///
    /// # Errors
    /// Returns [`crate::Error::ReadOnly`] or the errors of linking.
    pub fn add_method_to_type_def(&mut self, type_rid: u32, method_rid: u32) -> Result<()> {
        ensure_writable!(self);
        self.link_child(TableId::TypeDef, type_rid, TableId::MethodDef, method_rid)
    }

    /// Link the just added field `field_rid` to the type `type_rid`
    ///
    /// # Errors
    /// Returns [`crate::Error::ReadOnly`] or the errors of linking.
    pub fn add_field_to_type_def(&mut self, type_rid: u32, field_rid: u32) -> Result<()> {
        ensure_writable!(self);
        self.link_child(TableId::TypeDef, type_rid, TableId::Field, field_rid)
    }

    /// Link the just added param `param_rid` to `method_rid` and order it by sequence
    ///
    /// # Errors
    /// Returns [`crate::Error::ReadOnly`] or the errors of linking.
    pub fn add_param_to_method(&mut self, method_rid: u32, param_rid: u32) -> Result<()> {
        ensure_writable!(self);
        self.link_child(TableId::MethodDef, method_rid, TableId::Param, param_rid)?;
        self.fix_param_sequence(method_rid)
    }

    /// Link the just added property to the property map row `map_rid`
    ///
    /// # Errors
    /// Returns [`crate::Error::ReadOnly`] or the errors of linking.
    pub fn add_property_to_property_map(&mut self, map_rid: u32, property_rid: u32) -> Result<()> {
        ensure_writable!(self);
        self.link_child(TableId::PropertyMap, map_rid, TableId::Property, property_rid)
    }

    /// Link the just added event to the event map row `map_rid`
    ///
    /// # Errors
    /// Returns [`crate::Error::ReadOnly`] or the errors of linking.
    pub fn add_event_to_event_map(&mut self, map_rid: u32, event_rid: u32) -> Result<()> {
        ensure_writable!(self);
        self.link_child(TableId::EventMap, map_rid, TableId::Event, event_rid)
    }

    /// Append a child row and link it, without ENC logging
    pub(crate) fn create_child(
        &mut self,
        parent: TableId,
        parent_rid: u32,
        child: TableId,
    ) -> Result<u32> {
        if parent_rid == 0 || parent_rid > self.row_count(parent) {
            return Err(Error::RowNotFound {
                table: parent,
                rid: parent_rid,
            });
        }

        let rid = self.append_record(child)?;
        self.link_child(parent, parent_rid, child, rid)?;
        Ok(rid)
    }

    fn create_logged(
        &mut self,
        parent: TableId,
        parent_rid: u32,
        child: TableId,
        code: crate::metadata::enc::FuncCode,
    ) -> Result<u32> {
        ensure_writable!(self);
        let rid = self.create_child(parent, parent_rid, child)?;
        self.update_enc_log(Token::from_parts(parent, parent_rid), code)?;
        self.update_enc_log(
            Token::from_parts(child, rid),
            crate::metadata::enc::FuncCode::Default,
        )?;
        Ok(rid)
    }

    /// Create a method under `type_rid` and return its RID
    ///
    /// In ENC modes the creation is recorded in the ENC log.
    ///
    /// # Errors
    /// Returns [`crate::Error::RowNotFound`] if the type does not exist.
    pub fn create_method(&mut self, type_rid: u32) -> Result<u32> {
        use crate::metadata::enc::FuncCode;
        self.create_logged(TableId::TypeDef, type_rid, TableId::MethodDef, FuncCode::MethodCreate)
    }

    /// Create a field under `type_rid` and return its RID
    ///
    /// # Errors
    /// Returns [`crate::Error::RowNotFound`] if the type does not exist.
    pub fn create_field(&mut self, type_rid: u32) -> Result<u32> {
        use crate::metadata::enc::FuncCode;
        self.create_logged(TableId::TypeDef, type_rid, TableId::Field, FuncCode::FieldCreate)
    }

    /// Create a param with `sequence` under `method_rid` and return its RID.
    ///
    /// The param is placed by sequence number among its siblings.
    ///
    /// # Errors
    /// Returns [`crate::Error::RowNotFound`] if the method does not exist.
    pub fn create_param(&mut self, method_rid: u32, sequence: u16) -> Result<u32> {
        use crate::metadata::enc::FuncCode;
        ensure_writable!(self);
        if method_rid == 0 || method_rid > self.row_count(TableId::MethodDef) {
            return Err(Error::RowNotFound {
                table: TableId::MethodDef,
                rid: method_rid,
            });
        }

        let rid = self.append_record(TableId::Param)?;
        self.write_column(TableId::Param, col::param::SEQUENCE, rid, u32::from(sequence))?;
        self.link_child(TableId::MethodDef, method_rid, TableId::Param, rid)?;
        self.fix_param_sequence(method_rid)?;

        self.update_enc_log(
            Token::from_parts(TableId::MethodDef, method_rid),
            FuncCode::ParamCreate,
        )?;
        self.update_enc_log(Token::from_parts(TableId::Param, rid), FuncCode::Default)?;
        Ok(rid)
    }

    /// Create a property under the property map row `map_rid` and return its RID
    ///
    /// # Errors
    /// Returns [`crate::Error::RowNotFound`] if the map row does not exist.
    pub fn create_property(&mut self, map_rid: u32) -> Result<u32> {
        use crate::metadata::enc::FuncCode;
        self.create_logged(
            TableId::PropertyMap,
            map_rid,
            TableId::Property,
            FuncCode::PropertyCreate,
        )
    }

    /// Create an event under the event map row `map_rid` and return its RID
    ///
    /// # Errors
    /// Returns [`crate::Error::RowNotFound`] if the map row does not exist.
    pub fn create_event(&mut self, map_rid: u32) -> Result<u32> {
        use crate::metadata::enc::FuncCode;
        self.create_logged(TableId::EventMap, map_rid, TableId::Event, FuncCode::EventCreate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::StoreOptions;

    fn types(store: &mut TableStore, count: u32) {
        for _ in 0..count {
            store.add_record(TableId::TypeDef).unwrap();
        }
    }

    fn methods_of(store: &TableStore, type_rid: u32) -> Vec<u32> {
        store
            .children(TableId::TypeDef, TableId::MethodDef, type_rid)
            .unwrap()
    }

    #[test]
    fn in_order_stays_direct() {
        let mut store = TableStore::new();
        types(&mut store, 2);
        let a1 = store.create_method(1).unwrap();
        let a2 = store.create_method(1).unwrap();
        let b1 = store.create_method(2).unwrap();

        assert!(!store.has_indirect_table(TableId::MethodDef));
        assert_eq!(methods_of(&store, 1), vec![a1, a2]);
        assert_eq!(methods_of(&store, 2), vec![b1]);
    }

    #[test]
    fn earlier_parent_after_later_creates_ptr() {
        let mut store = TableStore::new();
        types(&mut store, 2);
        let m1 = store.create_method(2).unwrap();
        let m2 = store.create_method(1).unwrap();

        assert!(store.has_indirect_table(TableId::MethodDef));
        assert_eq!(store.row_count(TableId::MethodPtr), 2);
        assert_eq!(methods_of(&store, 1), vec![m2]);
        assert_eq!(methods_of(&store, 2), vec![m1]);
    }

    #[test]
    fn next_parent_at_child_count_shifts() {
        let mut store = TableStore::new();
        types(&mut store, 2);
        store.create_method(1).unwrap();
        store.create_method(2).unwrap();
        // Type 2 owns method 2; give type 1 another one with type 2 pointing at the new row
        store
            .put_column(TableId::TypeDef, col::typedef::METHOD_LIST, 2, 3)
            .unwrap();
        let rid = store.append_record(TableId::MethodDef).unwrap();
        let link = store
            .add_child_row_direct(TableId::TypeDef, col::typedef::METHOD_LIST, TableId::MethodDef, 1)
            .unwrap();
        assert_eq!(link, ChildLink::Direct);
        assert_eq!(rid, 3);
        assert_eq!(
            store.get_column(TableId::TypeDef, col::typedef::METHOD_LIST, 2).unwrap(),
            4
        );
    }

    #[test]
    fn out_of_order_policy() {
        let mut options = StoreOptions::default();
        options.out_of_order = OutOfOrderFlags::METHOD;
        let mut store = TableStore::with_options(options);
        types(&mut store, 2);
        store.create_method(2).unwrap();
        assert!(matches!(
            store.create_method(1),
            Err(Error::RecordOutOfOrder(TableId::MethodDef))
        ));
        // Fields are still allowed out of order
        store.create_field(2).unwrap();
        store.create_field(1).unwrap();
        assert!(store.has_indirect_table(TableId::Field));
    }

    #[test]
    fn param_sequence_repair() {
        let mut store = TableStore::new();
        types(&mut store, 1);
        let method = store.create_method(1).unwrap();
        let p2 = store.create_param(method, 2).unwrap();
        assert!(!store.has_indirect_table(TableId::Param));
        let p1 = store.create_param(method, 1).unwrap();

        assert!(store.has_indirect_table(TableId::Param));
        assert_eq!(
            store.children(TableId::MethodDef, TableId::Param, method).unwrap(),
            vec![p1, p2]
        );
    }

    #[test]
    fn new_parent_after_ptr_gets_end_value() {
        let mut store = TableStore::new();
        types(&mut store, 2);
        store.create_method(2).unwrap();
        store.create_method(1).unwrap();

        let third = store.add_record(TableId::TypeDef).unwrap();
        assert_eq!(
            store.get_column(TableId::TypeDef, col::typedef::METHOD_LIST, third).unwrap(),
            3
        );
        let m3 = store.create_method(third).unwrap();
        assert_eq!(methods_of(&store, third), vec![m3]);
        assert_eq!(methods_of(&store, 2), vec![1]);
    }

    #[test]
    fn resolve_markers_fills_suffix() {
        let mut store = TableStore::new();
        types(&mut store, 3);
        store.create_field(1).unwrap();
        store.resolve_markers().unwrap();
        let list = |rid| {
            store
                .get_column(TableId::TypeDef, col::typedef::FIELD_LIST, rid)
                .unwrap()
        };
        assert_eq!((list(1), list(2), list(3)), (1, 2, 2));
        // Method lists had no children at all
        assert_eq!(
            store.get_column(TableId::TypeDef, col::typedef::METHOD_LIST, 1).unwrap(),
            1
        );
    }

    #[test]
    fn unknown_parent() {
        let mut store = TableStore::new();
        assert!(matches!(
            store.create_method(1),
            Err(Error::RowNotFound { table: TableId::TypeDef, rid: 1 })
        ));
    }
}
