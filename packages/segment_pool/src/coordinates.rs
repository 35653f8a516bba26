use std::num::NonZero;

use num_integer::Integer;

/// Internal coordinates of a slot: which segment owns it and where it sits in that segment.
///
/// A global index is `ordinal * segment_capacity + local_index`. The ordinal is a tag fixed when
/// the segment is created, not the segment's current position in the chain, so retiring other
/// segments never changes what an index resolves to.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub(crate) struct ItemCoordinates {
    /// The ordinal tag of the segment containing this slot.
    ordinal: usize,

    /// The index within the segment where this slot is stored.
    local_index: usize,
}

impl ItemCoordinates {
    #[must_use]
    pub(crate) fn from_parts(ordinal: usize, local_index: usize) -> Self {
        Self {
            ordinal,
            local_index,
        }
    }

    /// Splits a global index into segment ordinal and local index.
    #[must_use]
    pub(crate) fn from_global_index(index: usize, segment_capacity: NonZero<usize>) -> Self {
        let (ordinal, local_index) = index.div_rem(&segment_capacity.get());

        Self {
            ordinal,
            local_index,
        }
    }

    /// Combines the coordinates back into a global index.
    ///
    /// # Panics
    ///
    /// Panics if the index does not fit in `usize`. This cannot happen for coordinates of a
    /// segment that exists, as that would imply more slots than virtual memory can hold.
    #[must_use]
    pub(crate) fn global_index(self, segment_capacity: NonZero<usize>) -> usize {
        self.ordinal
            .checked_mul(segment_capacity.get())
            .and_then(|offset| offset.checked_add(self.local_index))
            .expect("global index of an existing slot cannot exceed the size of virtual memory")
    }

    /// Returns the ordinal tag of the segment containing this slot.
    #[must_use]
    pub(crate) fn ordinal(self) -> usize {
        self.ordinal
    }

    /// Returns the index within the segment where this slot is stored.
    #[must_use]
    pub(crate) fn local_index(self) -> usize {
        self.local_index
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    const CAPACITY: NonZero<usize> = NonZero::new(4).expect("literal is non-zero");

    #[test]
    fn splits_global_index() {
        let coordinates = ItemCoordinates::from_global_index(9, CAPACITY);

        assert_eq!(coordinates.ordinal(), 2);
        assert_eq!(coordinates.local_index(), 1);
    }

    #[test]
    fn first_slot_of_each_segment() {
        for ordinal in 0..5 {
            let coordinates = ItemCoordinates::from_parts(ordinal, 0);
            assert_eq!(coordinates.global_index(CAPACITY), ordinal * 4);
        }
    }

    #[test]
    fn split_and_combine_agree() {
        for index in [0, 3, 4, 5, 127, 1_000_003] {
            let coordinates = ItemCoordinates::from_global_index(index, CAPACITY);
            assert_eq!(coordinates.global_index(CAPACITY), index);
        }
    }

    #[test]
    #[should_panic]
    fn overflowing_global_index_panics() {
        let coordinates = ItemCoordinates::from_parts(usize::MAX, 0);
        _ = coordinates.global_index(CAPACITY);
    }
}
