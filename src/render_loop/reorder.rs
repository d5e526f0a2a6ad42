use std::collections::BTreeMap;

/// Releases items strictly in index order regardless of arrival order.
pub struct ReorderBuffer<T> {
    next: usize,
    pending: BTreeMap<usize, T>,
}

impl<T> ReorderBuffer<T> {
    pub fn new() -> Self {
        Self {
            next: 0,
            pending: BTreeMap::new(),
        }
    }

    /// Queue an item. Indices already released or already queued are
    /// rejected and handed back.
    pub fn insert(&mut self, index: usize, item: T) -> Result<(), T> {
        if index < self.next || self.pending.contains_key(&index) {
            return Err(item);
        }
        self.pending.insert(index, item);
        Ok(())
    }

    /// Next in-order item, if it has arrived.
    pub fn pop_ready(&mut self) -> Option<(usize, T)> {
        let item = self.pending.remove(&self.next)?;
        let index = self.next;
        self.next += 1;
        Some((index, item))
    }

    /// Index the buffer is waiting for.
    #[cfg(test)]
    pub fn next_index(&self) -> usize {
        self.next
    }

    #[cfg(test)]
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

impl<T> Default for ReorderBuffer<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn releases_in_index_order() {
        let mut buf = ReorderBuffer::new();
        buf.insert(2, "c").unwrap();
        buf.insert(1, "b").unwrap();
        assert_eq!(buf.pop_ready(), None);

        buf.insert(0, "a").unwrap();
        let out: Vec<_> = std::iter::from_fn(|| buf.pop_ready()).collect();
        assert_eq!(out, vec![(0, "a"), (1, "b"), (2, "c")]);
        assert_eq!(buf.next_index(), 3);
        assert_eq!(buf.pending(), 0);
    }

    #[test]
    fn rejects_duplicates_and_stale_indices() {
        let mut buf = ReorderBuffer::new();
        buf.insert(0, 10).unwrap();
        assert_eq!(buf.insert(0, 11), Err(11));
        buf.pop_ready();
        assert_eq!(buf.insert(0, 12), Err(12));
    }
}
