//! Child ranges and row lookups.
//!
//! Ranges and parents are read through the Ptr tables when present. Name lookups use the
//! hash indexes of [`crate::metadata::index`] once a table is large enough and fall back to a
//! scan otherwise; every candidate an index produces is verified against the row content, so
//! a stale index entry can only cost time, never produce a wrong answer.

use std::ops::Range;

use crate::{
    metadata::{
        index::{install_if_absent, HashIndex, HashKind, ParentMap, VirtualSort, HASH_THRESHOLD},
        tables::{col, key_column, list_column, parent_of_list, ColumnType, TableId, TableStore},
        token::Token,
    },
    utils::hash::{hash_qualified_name, hash_scoped_name},
    Error, Result,
};

use super::ptr::END_OF_TABLE;

impl TableStore {
    /// One past the last logical child position of `child`
    pub(crate) fn child_limit(&self, child: TableId) -> u32 {
        match child.ptr_table() {
            Some(ptr) if self.row_count(ptr) > 0 => self.row_count(ptr) + 1,
            _ => self.row_count(child) + 1,
        }
    }

    /// Physical RID of the child at logical `position`
    pub(crate) fn logical_child(&self, child: TableId, position: u32) -> Result<u32> {
        match child.ptr_table() {
            Some(ptr) if self.row_count(ptr) > 0 => {
                self.get_column(ptr, col::ptr::TARGET, position)
            }
            _ => Ok(position),
        }
    }

    /// Logical positions of the children of `rid`, as a half-open range
    ///
    /// Positions equal physical RIDs unless `child` has a Ptr table, see
    /// [`TableStore::children`].
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidArgument`] if `parent` has no list of `child`, or
    /// [`crate::Error::RowNotFound`] if `rid` does not exist.
    pub fn list_range(&self, parent: TableId, child: TableId, rid: u32) -> Result<Range<u32>> {
        let Some(column) = list_column(parent, child) else {
            return Err(Error::InvalidArgument(format!(
                "{parent:?} has no list of {child:?}"
            )));
        };

        let limit = self.child_limit(child);
        let effective = |value: u32| {
            if value == END_OF_TABLE {
                limit
            } else {
                value.min(limit)
            }
        };

        let start = effective(self.get_column(parent, column, rid)?);
        let end = if rid == self.row_count(parent) {
            limit
        } else {
            effective(self.get_column(parent, column, rid + 1)?)
        };
        Ok(start..end.max(start))
    }

    /// Physical RIDs of the children of `rid`, in logical order
    ///
    /// # Errors
    /// See [`TableStore::list_range`].
    pub fn children(&self, parent: TableId, child: TableId, rid: u32) -> Result<Vec<u32>> {
        self.list_range(parent, child, rid)?
            .map(|position| self.logical_child(child, position))
            .collect()
    }

    /// Find the parent row owning child `rid`, `None` if no range contains it
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidArgument`] if `child` is not a list child table.
    pub fn find_parent_of(&self, child: TableId, rid: u32) -> Result<Option<u32>> {
        let Some((parent, column)) = parent_of_list(child) else {
            return Err(Error::InvalidArgument(format!("{child:?} has no parent table")));
        };

        if self.has_indirect_table(child) {
            let Some(cell) = self.lookups.parent_map(child) else {
                return Ok(None);
            };
            let map = install_if_absent(cell, || self.build_parent_map(parent, child))?;
            return Ok(map.get(rid));
        }

        let parents = self.row_count(parent);
        let limit = self.child_limit(child);
        let start_of = |parent_rid: u32| -> Result<u32> {
            let value = self.get_column(parent, column, parent_rid)?;
            Ok(if value == END_OF_TABLE { limit } else { value })
        };

        // Number of parents whose range starts at or before `rid`
        let (mut low, mut high) = (1u32, parents + 1);
        while low < high {
            let mid = low + (high - low) / 2;
            if start_of(mid)? <= rid {
                low = mid + 1;
            } else {
                high = mid;
            }
        }

        let owner = low - 1;
        if owner == 0 {
            return Ok(None);
        }
        let range = self.list_range(parent, child, owner)?;
        Ok(range.contains(&rid).then_some(owner))
    }

    fn build_parent_map(&self, parent: TableId, child: TableId) -> Result<ParentMap> {
        let mut map = ParentMap::with_len(self.row_count(child));
        for parent_rid in 1..=self.row_count(parent) {
            for child_rid in self.children(parent, child, parent_rid)? {
                map.set(child_rid, parent_rid);
            }
        }
        Ok(map)
    }

    /// The hash index of `kind`, built on first use once its table passes the threshold
    ///
    /// # Errors
    /// Returns the errors of reading the rows the index is built from.
    pub fn hash_index(&self, kind: HashKind) -> Result<Option<&HashIndex>> {
        if self.row_count(kind.table()) <= HASH_THRESHOLD {
            return Ok(None);
        }
        install_if_absent(self.lookups.hash(kind), || self.build_hash(kind)).map(Some)
    }

    fn build_hash(&self, kind: HashKind) -> Result<HashIndex> {
        let table = kind.table();
        let mut index = HashIndex::new(table, self.row_count(table));

        match kind {
            HashKind::MethodDef | HashKind::Field => {
                for type_rid in 1..=self.row_count(TableId::TypeDef) {
                    let owner = Token::from_parts(TableId::TypeDef, type_rid);
                    for rid in self.children(TableId::TypeDef, table, type_rid)? {
                        if let Ok(name) = self.get_string(table, kind.name_column(), rid) {
                            index.add(hash_scoped_name(owner, name), rid);
                        }
                    }
                }
            }
            HashKind::MemberRef => {
                for rid in 1..=self.row_count(table) {
                    let class = self.get_token(table, col::memberref::CLASS, rid)?;
                    if let Ok(name) = self.get_string(table, col::memberref::NAME, rid) {
                        index.add(hash_scoped_name(class, name), rid);
                    }
                }
            }
            HashKind::TypeDef | HashKind::TypeRef => {
                let namespace_column = kind.namespace_column().unwrap_or_default();
                for rid in 1..=self.row_count(table) {
                    let name = self.get_string(table, kind.name_column(), rid);
                    let namespace = self.get_string(table, namespace_column, rid);
                    if let (Ok(name), Ok(namespace)) = (name, namespace) {
                        index.add(hash_qualified_name(namespace, name), rid);
                    }
                }
            }
        }

        Ok(index)
    }

    /// Candidate rows for `key`: indexed entries first, then rows added since the build
    fn candidates<'a>(&'a self, index: &'a HashIndex, key: u64) -> impl Iterator<Item = u32> + 'a {
        let count = self.row_count(index.table());
        index
            .find(key)
            .filter(move |rid| *rid <= count)
            .chain(index.covered() + 1..=count)
    }

    fn name_and_signature_match(
        &self,
        table: TableId,
        name_column: usize,
        signature_column: usize,
        rid: u32,
        name: &str,
        signature: Option<&[u8]>,
    ) -> Result<bool> {
        if self.get_string(table, name_column, rid)? != name {
            return Ok(false);
        }
        match signature {
            Some(signature) => Ok(self.get_blob(table, signature_column, rid)? == signature),
            None => Ok(true),
        }
    }

    fn find_child_def(
        &self,
        kind: HashKind,
        type_rid: u32,
        name: &str,
        signature: Option<&[u8]>,
    ) -> Result<Option<u32>> {
        let table = kind.table();
        let signature_column = kind.signature_column().unwrap_or_default();

        if let Some(index) = self.hash_index(kind)? {
            let key = hash_scoped_name(Token::from_parts(TableId::TypeDef, type_rid), name);
            for rid in self.candidates(index, key) {
                if self.name_and_signature_match(
                    table,
                    kind.name_column(),
                    signature_column,
                    rid,
                    name,
                    signature,
                )? && self.find_parent_of(table, rid)? == Some(type_rid)
                {
                    return Ok(Some(rid));
                }
            }
            return Ok(None);
        }

        for rid in self.children(TableId::TypeDef, table, type_rid)? {
            if self.name_and_signature_match(
                table,
                kind.name_column(),
                signature_column,
                rid,
                name,
                signature,
            )? {
                return Ok(Some(rid));
            }
        }
        Ok(None)
    }

    /// Find a method of `type_rid` by name and, if given, signature bytes
    ///
    /// # Errors
    /// Returns the errors of reading the candidate rows.
    pub fn find_method_def(
        &self,
        type_rid: u32,
        name: &str,
        signature: Option<&[u8]>,
    ) -> Result<Option<u32>> {
        self.find_child_def(HashKind::MethodDef, type_rid, name, signature)
    }

    /// Find a field of `type_rid` by name and, if given, signature bytes
    ///
    /// # Errors
    /// Returns the errors of reading the candidate rows.
    pub fn find_field(
        &self,
        type_rid: u32,
        name: &str,
        signature: Option<&[u8]>,
    ) -> Result<Option<u32>> {
        self.find_child_def(HashKind::Field, type_rid, name, signature)
    }

    /// Find a method, or failing that a field, of `type_rid`
    ///
    /// # Errors
    /// Returns the errors of reading the candidate rows.
    pub fn find_member_def(
        &self,
        type_rid: u32,
        name: &str,
        signature: Option<&[u8]>,
    ) -> Result<Option<Token>> {
        if let Some(rid) = self.find_method_def(type_rid, name, signature)? {
            return Ok(Some(Token::from_parts(TableId::MethodDef, rid)));
        }
        Ok(self
            .find_field(type_rid, name, signature)?
            .map(|rid| Token::from_parts(TableId::Field, rid)))
    }

    /// Find a member reference by parent, name and, if given, signature bytes
    ///
    /// # Errors
    /// Returns the errors of reading the candidate rows.
    pub fn find_member_ref(
        &self,
        class: Token,
        name: &str,
        signature: Option<&[u8]>,
    ) -> Result<Option<u32>> {
        let table = TableId::MemberRef;
        let is_match = |rid: u32| -> Result<bool> {
            Ok(self.get_token(table, col::memberref::CLASS, rid)? == class
                && self.name_and_signature_match(
                    table,
                    col::memberref::NAME,
                    col::memberref::SIGNATURE,
                    rid,
                    name,
                    signature,
                )?)
        };

        if let Some(index) = self.hash_index(HashKind::MemberRef)? {
            for rid in self.candidates(index, hash_scoped_name(class, name)) {
                if is_match(rid)? {
                    return Ok(Some(rid));
                }
            }
            return Ok(None);
        }

        for rid in 1..=self.row_count(table) {
            if is_match(rid)? {
                return Ok(Some(rid));
            }
        }
        Ok(None)
    }

    fn find_qualified(
        &self,
        kind: HashKind,
        namespace: &str,
        name: &str,
        mut accept: impl FnMut(u32) -> Result<bool>,
    ) -> Result<Option<u32>> {
        let table = kind.table();
        let namespace_column = kind.namespace_column().unwrap_or_default();
        let mut is_match = |rid: u32| -> Result<bool> {
            Ok(self.get_string(table, kind.name_column(), rid)? == name
                && self.get_string(table, namespace_column, rid)? == namespace
                && accept(rid)?)
        };

        if let Some(index) = self.hash_index(kind)? {
            for rid in self.candidates(index, hash_qualified_name(namespace, name)) {
                if is_match(rid)? {
                    return Ok(Some(rid));
                }
            }
            return Ok(None);
        }

        for rid in 1..=self.row_count(table) {
            if is_match(rid)? {
                return Ok(Some(rid));
            }
        }
        Ok(None)
    }

    /// Find the first type definition with the given namespace and name
    ///
    /// # Errors
    /// Returns the errors of reading the candidate rows.
    pub fn find_type_def(&self, namespace: &str, name: &str) -> Result<Option<u32>> {
        self.find_qualified(HashKind::TypeDef, namespace, name, |_| Ok(true))
    }

    /// Find a type reference by resolution scope, namespace and name
    ///
    /// # Errors
    /// Returns the errors of reading the candidate rows.
    pub fn find_type_ref(&self, scope: Token, namespace: &str, name: &str) -> Result<Option<u32>> {
        self.find_qualified(HashKind::TypeRef, namespace, name, |rid| {
            Ok(self.get_token(TableId::TypeRef, col::typeref::RESOLUTION_SCOPE, rid)? == scope)
        })
    }

    /// All rows of a keyed table whose key column holds `key`, in RID order.
    ///
    /// Tables flagged as sorted are searched in place; others through a virtual sort built on
    /// first use.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidArgument`] if `table` has no key column.
    pub fn find_by_key(&self, table: TableId, key: u32) -> Result<Vec<u32>> {
        let Some(column) = key_column(table) else {
            return Err(Error::InvalidArgument(format!("{table:?} has no key column")));
        };
        let count = self.row_count(table);

        if self.is_sorted(table) {
            let (mut low, mut high) = (1u32, count + 1);
            while low < high {
                let mid = low + (high - low) / 2;
                if self.get_column(table, column, mid)? < key {
                    low = mid + 1;
                } else {
                    high = mid;
                }
            }

            let mut rids = Vec::new();
            let mut rid = low;
            while rid <= count && self.get_column(table, column, rid)? == key {
                rids.push(rid);
                rid += 1;
            }
            return Ok(rids);
        }

        let build = || -> Result<VirtualSort> {
            let keys = (1..=count)
                .map(|rid| self.get_column(table, column, rid))
                .collect::<Result<Vec<u32>>>()?;
            Ok(VirtualSort::build(keys))
        };

        let cell = self.lookups.virtual_sort_cell(table);
        match cell.get() {
            Some(sort) if sort.len() == count as usize => Ok(sort.find(key)),
            Some(_) => Ok(build()?.find(key)),
            None => Ok(install_if_absent(cell, build)?.find(key)),
        }
    }

    /// All rows of a keyed table whose key column references `token`
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidArgument`] if `table` has no key column or the key
    /// column cannot reference `token`.
    pub fn find_by_token(&self, table: TableId, token: Token) -> Result<Vec<u32>> {
        let Some(column) = key_column(table) else {
            return Err(Error::InvalidArgument(format!("{table:?} has no key column")));
        };
        let key = match self.col_def(table, column)?.kind {
            ColumnType::Rid(target) if token.table_id()? == target => token.row(),
            ColumnType::Coded(kind) => kind.encode(token)?,
            _ => {
                return Err(Error::InvalidArgument(format!(
                    "{token} cannot be a key of {table:?}"
                )))
            }
        };
        self.find_by_key(table, key)
    }
}
