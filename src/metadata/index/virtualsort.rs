use crate::metadata::sort::quick_sort;

/// Key-ordered permutation over the RIDs of an unsorted table.
///
/// Entries pair each RID with the key it had when it was filed. Any write that changes a key
/// either extends the permutation (an append in key order) or drops it.
#[derive(Clone, Debug, Default)]
pub struct VirtualSort {
    entries: Vec<(u32, u32)>,
}

impl VirtualSort {
    /// Build the permutation from the keys of RIDs `1..=keys.len()`
    #[must_use]
    pub fn build(keys: Vec<u32>) -> Self {
        let mut entries: Vec<(u32, u32)> = keys
            .into_iter()
            .zip(1u32..)
            .collect();
        quick_sort(&mut entries);
        VirtualSort { entries }
    }

    /// Number of RIDs covered
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if the permutation covers no rows
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// RID with the largest key
    #[must_use]
    pub fn last(&self) -> Option<u32> {
        self.entries.last().map(|(_, rid)| *rid)
    }

    /// Every RID filed under `key`, in ascending order
    #[must_use]
    pub fn find(&self, key: u32) -> Vec<u32> {
        let start = self.entries.partition_point(|(entry, _)| *entry < key);
        let mut rids: Vec<u32> = self.entries[start..]
            .iter()
            .take_while(|(entry, _)| *entry == key)
            .map(|(_, rid)| *rid)
            .collect();
        rids.sort_unstable();
        rids
    }

    /// Try to file a freshly appended row without rebuilding.
    ///
    /// Succeeds only for the row directly after the covered range whose key does not sort
    /// before the current last key. On `false` the caller drops the permutation.
    pub fn validate_after_append(&mut self, rid: u32, key: u32) -> bool {
        if rid as usize != self.entries.len() + 1 {
            return false;
        }
        if self.entries.last().is_some_and(|(last, _)| key < *last) {
            return false;
        }
        self.entries.push((key, rid));
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_ranges() {
        let sort = VirtualSort::build(vec![5, 2, 5, 1, 2]);
        assert_eq!(sort.len(), 5);
        assert_eq!(sort.find(5), vec![1, 3]);
        assert_eq!(sort.find(2), vec![2, 5]);
        assert_eq!(sort.find(1), vec![4]);
        assert!(sort.find(3).is_empty());
        assert!(sort.find(9).is_empty());
    }

    #[test]
    fn append_in_order() {
        let mut sort = VirtualSort::build(vec![1, 3]);
        assert_eq!(sort.last(), Some(2));
        assert!(sort.validate_after_append(3, 3));
        assert_eq!(sort.find(3), vec![2, 3]);

        assert!(!sort.validate_after_append(4, 2));
        assert!(!sort.validate_after_append(9, 10));
        assert_eq!(sort.len(), 3);

        let mut empty = VirtualSort::default();
        assert!(empty.validate_after_append(1, 0));
        assert!(!empty.is_empty());
    }
}
