/// Handle to an item allocated from a [`SegmentPool`][crate::SegmentPool].
///
/// Wraps the item's global index together with the creation generation of the segment that
/// holds it. The global index alone is enough to reach the item through
/// [`lookup()`][crate::SegmentPool::lookup]; the generation lets methods taking an `Item` notice
/// that the segment was retired and its ordinal handed to a new segment, in which case they
/// treat the handle as not found instead of touching the new segment's slots.
///
/// Handles are plain values and can be copied freely. A copy of a handle to a freed item keeps
/// resolving to the same slot, which may since have been reused by another allocation.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Item {
    index: usize,
    generation: u64,
}

impl Item {
    #[must_use]
    pub(crate) fn new(index: usize, generation: u64) -> Self {
        Self { index, generation }
    }

    /// The global index of the item, stable until the item is freed.
    #[must_use]
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    #[must_use]
    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::collections::HashSet;
    use std::fmt::Debug;
    use std::hash::Hash;

    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(Item: Send, Sync, Copy, Debug, Eq, Hash);

    #[test]
    fn handles_compare_by_index_and_generation() {
        let a = Item::new(5, 1);
        let b = Item::new(5, 2);
        let c = Item::new(5, 1);

        assert_ne!(a, b);
        assert_eq!(a, c);
        assert_eq!(a.index(), b.index());

        let set: HashSet<Item> = [a, b, c].into_iter().collect();
        assert_eq!(set.len(), 2);
    }
}
