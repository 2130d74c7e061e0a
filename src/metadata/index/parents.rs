/// Parent RID of every child row, for child tables addressed through a Ptr table
#[derive(Clone, Debug, Default)]
pub struct ParentMap {
    parents: Vec<u32>,
}

impl ParentMap {
    /// Create a map for `rows` children, all unowned
    #[must_use]
    pub fn with_len(rows: u32) -> Self {
        ParentMap {
            parents: vec![0; rows as usize + 1],
        }
    }

    /// Parent of `child`, `None` if the child is unowned or unknown
    #[must_use]
    pub fn get(&self, child: u32) -> Option<u32> {
        self.parents
            .get(child as usize)
            .copied()
            .filter(|parent| *parent != 0)
    }

    /// Record `parent` as the owner of `child`, growing the map as needed
    pub fn set(&mut self, child: u32, parent: u32) {
        let slot = child as usize;
        if slot >= self.parents.len() {
            self.parents.resize(slot + 1, 0);
        }
        self.parents[slot] = parent;
    }
}
