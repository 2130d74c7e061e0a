use crate::{
    metadata::{
        tables::{key_column, TableId, TableStore},
        token::Token,
    },
    Error, Result,
};

/// Ranges at or below this length are finished with insertion sort
const SMALL_RANGE: usize = 8;

/// Sort `(key, rid)` pairs by key, without stability.
///
/// Three-way partitioning keeps runs of equal keys out of further work, and the explicit
/// stack always defers the larger side, so depth stays logarithmic even for reverse-ordered
/// input.
pub(crate) fn quick_sort(entries: &mut [(u32, u32)]) {
    let mut stack = vec![(0usize, entries.len())];

    while let Some((low, high)) = stack.pop() {
        if high - low <= SMALL_RANGE {
            insertion_sort(&mut entries[low..high]);
            continue;
        }

        let pivot = median_of_three(entries, low, high);
        let (mut lt, mut index, mut gt) = (low, low, high);
        while index < gt {
            let key = entries[index].0;
            if key < pivot {
                entries.swap(lt, index);
                lt += 1;
                index += 1;
            } else if key > pivot {
                gt -= 1;
                entries.swap(index, gt);
            } else {
                index += 1;
            }
        }

        let left = (low, lt);
        let right = (gt, high);
        if lt - low > high - gt {
            stack.push(left);
            stack.push(right);
        } else {
            stack.push(right);
            stack.push(left);
        }
    }
}

fn median_of_three(entries: &[(u32, u32)], low: usize, high: usize) -> u32 {
    let a = entries[low].0;
    let b = entries[low + (high - low) / 2].0;
    let c = entries[high - 1].0;
    a.max(b).min(a.min(b).max(c))
}

/// Stable sort by key; equal keys keep their relative order
fn insertion_sort(entries: &mut [(u32, u32)]) {
    for index in 1..entries.len() {
        let mut position = index;
        while position > 0 && entries[position - 1].0 > entries[position].0 {
            entries.swap(position - 1, position);
            position -= 1;
        }
    }
}

/// Computes the new row order of one table from its key column
#[derive(Clone, Debug)]
pub struct TableSorter {
    entries: Vec<(u32, u32)>,
}

impl TableSorter {
    /// Prepare a sort over the keys of RIDs `1..=keys.len()`
    #[must_use]
    pub fn new(keys: Vec<u32>) -> Self {
        TableSorter {
            entries: keys.into_iter().zip(1u32..).collect(),
        }
    }

    /// Order by key; rows with equal keys end up in unspecified order
    pub fn sort(&mut self) {
        quick_sort(&mut self.entries);
    }

    /// Order by key, keeping the current order among equal keys
    pub fn stable_sort(&mut self) {
        insertion_sort(&mut self.entries);
    }

    /// Original RIDs in their new order
    pub fn order(&self) -> impl Iterator<Item = u32> + '_ {
        self.entries.iter().map(|(_, rid)| *rid)
    }

    /// True if no row changes position
    #[must_use]
    pub fn is_identity(&self) -> bool {
        self.order().zip(1u32..).all(|(old, new)| old == new)
    }
}

impl TableStore {
    /// Sort a keyed table in place by its key column and flag it as sorted
    ///
    /// Moves are not reported; use [`TableStore::sort_table`] for that.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidArgument`] if `table` has no key column, or
    /// [`crate::Error::ReadOnly`].
    pub fn sort(&mut self, table: TableId) -> Result<()> {
        self.sort_table(table, false, false)
    }

    /// Sort a keyed table by its key column.
    ///
    /// With `stable`, rows sharing a key keep their order. With `remap`, every row that changes
    /// position is recorded in the movement map and reported to the remap listener.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidArgument`] if `table` has no key column,
    /// [`crate::Error::ReadOnly`], or [`crate::Error::OutOfMemory`].
    pub fn sort_table(&mut self, table: TableId, stable: bool, remap: bool) -> Result<()> {
        ensure_writable!(self);
        let Some(column) = key_column(table) else {
            return Err(Error::InvalidArgument(format!("{table:?} has no key column")));
        };

        let keys = (1..=self.row_count(table))
            .map(|rid| self.get_column(table, column, rid))
            .collect::<Result<Vec<u32>>>()?;
        let mut sorter = TableSorter::new(keys);
        if stable {
            sorter.stable_sort();
        } else {
            sorter.sort();
        }

        if !sorter.is_identity() {
            let order: Vec<u32> = sorter.order().collect();
            self.reorder_rows(table, &order)?;

            if remap {
                let moves: Vec<(Token, Token)> = order
                    .iter()
                    .zip(1u32..)
                    .filter(|(old, new)| **old != *new)
                    .map(|(old, new)| {
                        (Token::from_parts(table, *old), Token::from_parts(table, new))
                    })
                    .collect();
                self.record_moves(&moves);
            }
        }

        self.set_sorted(table, true);
        self.lookups.invalidate_table(table);
        Ok(())
    }

    /// Rebuild `table` so that row `n` holds what was row `order[n - 1]`
    pub(crate) fn reorder_rows(&mut self, table: TableId, order: &[u32]) -> Result<()> {
        let row_size = self.table_def(table).row_size;
        let current = &self.tables[table.index()];

        let mut data = Vec::new();
        data.try_reserve_exact(current.bytes().len())
            .map_err(|_| Error::OutOfMemory)?;
        for rid in order {
            data.extend_from_slice(current.row(*rid)?);
        }

        self.tables[table.index()].replace(row_size, data);
        self.save_size = None;
        Ok(())
    }
}
