use rustc_hash::FxHashMap;

use crate::metadata::tables::TableId;

/// Buckets of RIDs keyed by a precomputed name hash.
///
/// The index remembers how many rows existed when it was built. Rows past that count are
/// not in any bucket and have to be checked by the caller, and a hit is only a candidate:
/// different names can share a hash, so the row has to be compared before it is returned.
#[derive(Clone, Debug)]
pub struct HashIndex {
    table: TableId,
    buckets: FxHashMap<u64, Vec<u32>>,
    covered: u32,
}

impl HashIndex {
    /// Create an empty index for `table` that claims to cover its first `covered` rows
    #[must_use]
    pub fn new(table: TableId, covered: u32) -> Self {
        HashIndex {
            table,
            buckets: FxHashMap::default(),
            covered,
        }
    }

    /// File `rid` under `key`
    pub fn add(&mut self, key: u64, rid: u32) {
        self.buckets.entry(key).or_default().push(rid);
    }

    /// Candidate RIDs filed under `key`, in insertion order
    pub fn find(&self, key: u64) -> impl Iterator<Item = u32> + '_ {
        self.buckets.get(&key).into_iter().flatten().copied()
    }

    /// The table this index covers
    #[must_use]
    pub fn table(&self) -> TableId {
        self.table
    }

    /// Number of leading rows the index was built over
    #[must_use]
    pub fn covered(&self) -> u32 {
        self.covered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buckets_keep_order() {
        let mut index = HashIndex::new(TableId::Field, 5);
        index.add(7, 3);
        index.add(7, 1);
        index.add(9, 2);

        assert_eq!(index.find(7).collect::<Vec<_>>(), vec![3, 1]);
        assert_eq!(index.find(9).collect::<Vec<_>>(), vec![2]);
        assert_eq!(index.find(1).count(), 0);
        assert_eq!(index.covered(), 5);
        assert_eq!(index.table(), TableId::Field);
    }
}
