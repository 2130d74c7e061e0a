//! Lazy lookup accelerators over a [`crate::TableStore`].
//!
//! Three kinds of derived structure speed up reads without touching the rows they describe:
//!
//! - [`VirtualSort`] - a key-ordered permutation of an unsorted table's RIDs
//! - [`HashIndex`] - name buckets for member and type lookups on larger tables
//! - [`ParentMap`] - child RID to parent RID, used once a child table goes through a Ptr table
//!
//! Each structure sits in a [`OnceLock`]. Readers that find it missing build a candidate and
//! try to install it; when two readers race, the loser's candidate is simply dropped. Writers
//! hold `&mut` access to the store and invalidate or patch the structures in place.

mod hash;
mod parents;
mod virtualsort;

use std::sync::OnceLock;

use strum::{EnumCount, EnumIter, IntoEnumIterator};

use crate::{
    metadata::tables::{col, TableId, LIST_COLUMNS, TABLE_COUNT},
    Error, Result,
};

pub use hash::HashIndex;
pub use parents::ParentMap;
pub use virtualsort::VirtualSort;

/// Tables with at most this many rows are scanned instead of hashed
pub const HASH_THRESHOLD: u32 = 24;

/// The name lookups that can be backed by a [`HashIndex`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, EnumCount)]
pub enum HashKind {
    /// Methods by owning type and name
    MethodDef,
    /// Fields by owning type and name
    Field,
    /// Member references by parent and name
    MemberRef,
    /// Type definitions by namespace and name
    TypeDef,
    /// Type references by namespace and name
    TypeRef,
}

impl HashKind {
    /// The table this index covers
    #[must_use]
    pub fn table(self) -> TableId {
        match self {
            HashKind::MethodDef => TableId::MethodDef,
            HashKind::Field => TableId::Field,
            HashKind::MemberRef => TableId::MemberRef,
            HashKind::TypeDef => TableId::TypeDef,
            HashKind::TypeRef => TableId::TypeRef,
        }
    }

    /// The name column hashed by this index
    #[must_use]
    pub fn name_column(self) -> usize {
        match self {
            HashKind::MethodDef => col::method::NAME,
            HashKind::Field => col::field::NAME,
            HashKind::MemberRef => col::memberref::NAME,
            HashKind::TypeDef => col::typedef::NAME,
            HashKind::TypeRef => col::typeref::NAME,
        }
    }

    /// The namespace column, for type lookups
    #[must_use]
    pub fn namespace_column(self) -> Option<usize> {
        match self {
            HashKind::TypeDef => Some(col::typedef::NAMESPACE),
            HashKind::TypeRef => Some(col::typeref::NAMESPACE),
            _ => None,
        }
    }

    /// The signature column, for member lookups
    #[must_use]
    pub fn signature_column(self) -> Option<usize> {
        match self {
            HashKind::MethodDef => Some(col::method::SIGNATURE),
            HashKind::Field => Some(col::field::SIGNATURE),
            HashKind::MemberRef => Some(col::memberref::SIGNATURE),
            _ => None,
        }
    }

    /// True if a write to `column` changes the key a row is filed under
    fn keys_on(self, column: usize) -> bool {
        match self {
            HashKind::MemberRef => column == col::memberref::CLASS || column == self.name_column(),
            _ => column == self.name_column() || self.namespace_column() == Some(column),
        }
    }
}

/// Install the value produced by `build` into `cell` unless another reader got there first
///
/// # Errors
/// Returns the error of `build`, or [`crate::Error::LockError`] if the cell is still empty
/// after a successful install, which cannot happen with a sound `OnceLock`.
pub(crate) fn install_if_absent<T>(
    cell: &OnceLock<T>,
    build: impl FnOnce() -> Result<T>,
) -> Result<&T> {
    if let Some(value) = cell.get() {
        return Ok(value);
    }

    let candidate = build()?;
    if cell.set(candidate).is_err() {
        log::trace!("Lookup installed concurrently, dropping local candidate");
    }
    cell.get().ok_or(Error::LockError)
}

fn parent_slot(child: TableId) -> Option<usize> {
    LIST_COLUMNS.iter().position(|(_, _, c)| *c == child)
}

/// Every lazy lookup of one store
pub(crate) struct Lookups {
    virtual_sorts: Vec<OnceLock<VirtualSort>>,
    hashes: [OnceLock<HashIndex>; HashKind::COUNT],
    parents: [OnceLock<ParentMap>; LIST_COLUMNS.len()],
}

impl Lookups {
    pub(crate) fn new() -> Self {
        Lookups {
            virtual_sorts: (0..TABLE_COUNT).map(|_| OnceLock::new()).collect(),
            hashes: std::array::from_fn(|_| OnceLock::new()),
            parents: std::array::from_fn(|_| OnceLock::new()),
        }
    }

    pub(crate) fn virtual_sort_cell(&self, table: TableId) -> &OnceLock<VirtualSort> {
        &self.virtual_sorts[table.index()]
    }

    pub(crate) fn virtual_sort(&self, table: TableId) -> Option<&VirtualSort> {
        self.virtual_sorts[table.index()].get()
    }

    pub(crate) fn virtual_sort_mut(&mut self, table: TableId) -> Option<&mut VirtualSort> {
        self.virtual_sorts[table.index()].get_mut()
    }

    pub(crate) fn drop_virtual_sort(&mut self, table: TableId) {
        self.virtual_sorts[table.index()].take();
    }

    pub(crate) fn hash(&self, kind: HashKind) -> &OnceLock<HashIndex> {
        &self.hashes[kind as usize]
    }

    pub(crate) fn parent_map(&self, child: TableId) -> Option<&OnceLock<ParentMap>> {
        parent_slot(child).map(|slot| &self.parents[slot])
    }

    /// Rows of `table` were inserted or reordered
    pub(crate) fn invalidate_table(&mut self, table: TableId) {
        self.drop_virtual_sort(table);
        for kind in HashKind::iter().filter(|kind| kind.table() == table) {
            self.hashes[kind as usize].take();
        }
        if let Some(slot) = parent_slot(table) {
            self.parents[slot].take();
        }
    }

    /// A caller changed one column of one row
    ///
    /// A hash index survives a write to a row it has never seen, as long as that row is close
    /// enough to the indexed range for the tail scan to stay short. Writes to a list column
    /// move children between parents, so everything keyed on the parent is dropped.
    pub(crate) fn column_written(&mut self, table: TableId, column: usize, rid: u32) {
        for kind in HashKind::iter() {
            if kind.table() != table || !kind.keys_on(column) {
                continue;
            }
            let slot = &mut self.hashes[kind as usize];
            if let Some(index) = slot.get() {
                let covered = index.covered();
                if rid <= covered || rid > 2 * covered.max(HASH_THRESHOLD) {
                    slot.take();
                }
            }
        }

        for (slot, (parent, list, child)) in LIST_COLUMNS.iter().enumerate() {
            if *parent != table || *list != column {
                continue;
            }
            self.parents[slot].take();
            if *parent == TableId::TypeDef {
                let kind = if *child == TableId::MethodDef {
                    HashKind::MethodDef
                } else {
                    HashKind::Field
                };
                self.hashes[kind as usize].take();
            }
        }
    }

    /// `child_rid` was linked under `parent_rid`
    pub(crate) fn link_parent(&mut self, child: TableId, child_rid: u32, parent_rid: u32) {
        if let Some(map) = parent_slot(child).and_then(|slot| self.parents[slot].get_mut()) {
            map.set(child_rid, parent_rid);
        }
    }

    pub(crate) fn clear(&mut self) {
        *self = Lookups::new();
    }
}

impl Default for Lookups {
    fn default() -> Self {
        Self::new()
    }
}
