use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::iter;
use std::num::NonZero;

use tracing::{debug, trace};

use crate::{
    Item, ItemCoordinates, Result, Segment, SegmentPoolBuilder, SlotMut, SlotRef, SlotRelease,
};

/// An object pool of fixed-size byte items with stable addresses and stable integer indexes.
///
/// The pool grows by appending fixed-capacity segments to a chain instead of reallocating, so
/// allocating more items never moves existing ones. A segment is retired as soon as its last
/// item is freed, except that the pool always keeps at least one segment once it has allocated.
///
/// Every item is identified by a global index that stays valid until the item is freed:
///
/// * [`allocate()`][Self::allocate] returns an [`Item`] handle carrying the index.
/// * [`lookup()`][Self::lookup] and [`lookup_mut()`][Self::lookup_mut] resolve an index to its
///   slot, whether occupied or not. [`has()`][Self::has] reports occupancy.
/// * [`free()`][Self::free] and [`free_item()`][Self::free_item] vacate a slot. Freeing a vacant
///   slot is a no-op.
///
/// # Index assignment
///
/// Each segment carries an ordinal tag fixed when it is created; the slots of the segment own
/// the indexes `ordinal * segment_capacity .. (ordinal + 1) * segment_capacity`. A new segment
/// takes the lowest ordinal not held by a live segment. Because the ordinal is not derived from
/// the segment's position in the chain, retiring a segment anywhere in the chain leaves all
/// other indexes untouched.
///
/// # Allocation order
///
/// Allocation normally happens at the tail segment of the chain without walking it. When items
/// have been freed from earlier segments, the pool instead fills the first such hole, walking the
/// chain from its head, which keeps memory use bounded under balanced allocate/free churn.
///
/// # Examples
///
/// ```
/// use segment_pool::SegmentPool;
///
/// let mut pool = SegmentPool::new(8, 4).unwrap();
///
/// let item = pool.allocate();
/// pool.get_mut(item).unwrap().copy_from_slice(&42_u64.to_le_bytes());
///
/// let slot = pool.lookup(item.index()).unwrap();
/// assert!(slot.is_occupied());
/// assert_eq!(slot.bytes(), &42_u64.to_le_bytes());
///
/// assert!(pool.free(item.index()));
/// assert!(!pool.has(item.index()));
/// ```
///
/// # Thread safety
///
/// The pool is thread-mobile ([`Send`]) and may be shared immutably ([`Sync`]), but all mutation
/// requires `&mut self`. Callers sharing a pool between threads must serialize access themselves.
#[derive(Debug)]
pub struct SegmentPool {
    item_size: NonZero<usize>,
    segment_capacity: NonZero<usize>,

    /// Owning table of segments, indexed by ordinal. Retired segments leave `None` behind until
    /// their ordinal is reused; trailing `None` entries are trimmed.
    segments: Vec<Option<Segment>>,

    /// Ordinals of retired segments, smallest first. Entries at or beyond the end of the
    /// segment table are stale after trimming and are discarded when reached.
    vacated_ordinals: BinaryHeap<Reverse<usize>>,

    /// Number of live segments in the table.
    segment_count: usize,

    /// Earliest segment of the chain.
    chain_head: Option<usize>,

    /// Segment targeted by the allocation fast path. Always the chain tail.
    alloc_cursor: Option<usize>,

    /// Segment to recoil to when the alloc cursor's segment is retired. Always the
    /// predecessor of the alloc cursor in the chain.
    fallback_cursor: Option<usize>,

    /// Number of vacant slots in segments other than the alloc cursor's.
    reuse_hint_count: usize,

    /// Number of occupied slots across all segments.
    live_count: usize,

    /// Value given to the next segment created, so handles can detect reuse of an ordinal.
    next_generation: u64,
}

impl SegmentPool {
    /// Creates a builder for configuring and constructing a [`SegmentPool`].
    ///
    /// # Example
    ///
    /// ```
    /// use segment_pool::SegmentPool;
    ///
    /// let pool = SegmentPool::builder()
    ///     .item_size_of::<u64>()
    ///     .segment_capacity(32)
    ///     .build()
    ///     .unwrap();
    ///
    /// assert!(pool.is_empty());
    /// ```
    #[inline]
    pub fn builder() -> SegmentPoolBuilder {
        SegmentPoolBuilder::new()
    }

    /// Creates a pool of `item_size`-byte items with `segment_capacity` items per segment.
    ///
    /// # Errors
    ///
    /// Returns an error if either parameter is zero or a segment's storage would exceed the size
    /// of virtual memory.
    ///
    /// # Example
    ///
    /// ```
    /// use segment_pool::SegmentPool;
    ///
    /// let pool = SegmentPool::new(16, 4).unwrap();
    ///
    /// assert_eq!(pool.item_size(), 16);
    /// assert_eq!(pool.segment_capacity(), 4);
    /// assert_eq!(pool.segment_count(), 0);
    /// ```
    pub fn new(item_size: usize, segment_capacity: usize) -> Result<Self> {
        Self::builder()
            .item_size(item_size)
            .segment_capacity(segment_capacity)
            .build()
    }

    #[must_use]
    pub(crate) fn new_inner(item_size: NonZero<usize>, segment_capacity: NonZero<usize>) -> Self {
        Self {
            item_size,
            segment_capacity,
            segments: Vec::new(),
            vacated_ordinals: BinaryHeap::new(),
            segment_count: 0,
            chain_head: None,
            alloc_cursor: None,
            fallback_cursor: None,
            reuse_hint_count: 0,
            live_count: 0,
            next_generation: 0,
        }
    }

    /// The size in bytes of every item in the pool.
    #[must_use]
    #[inline]
    pub fn item_size(&self) -> usize {
        self.item_size.get()
    }

    /// The number of items each segment holds.
    #[must_use]
    #[inline]
    pub fn segment_capacity(&self) -> usize {
        self.segment_capacity.get()
    }

    /// The number of items currently allocated.
    ///
    /// # Example
    ///
    /// ```
    /// use segment_pool::SegmentPool;
    ///
    /// let mut pool = SegmentPool::new(4, 2).unwrap();
    /// let a = pool.allocate();
    /// let _b = pool.allocate();
    /// assert_eq!(pool.len(), 2);
    ///
    /// pool.free_item(a);
    /// assert_eq!(pool.len(), 1);
    /// ```
    #[must_use]
    #[inline]
    pub fn len(&self) -> usize {
        self.live_count
    }

    /// Whether the pool has no allocated items.
    ///
    /// An empty pool may still be holding a segment of unused capacity.
    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.live_count == 0
    }

    /// The number of items the pool can hold without creating another segment.
    ///
    /// # Example
    ///
    /// ```
    /// use segment_pool::SegmentPool;
    ///
    /// let mut pool = SegmentPool::new(4, 8).unwrap();
    /// assert_eq!(pool.capacity(), 0);
    ///
    /// _ = pool.allocate();
    /// assert_eq!(pool.capacity(), 8);
    /// ```
    #[must_use]
    #[inline]
    pub fn capacity(&self) -> usize {
        // Overflow here would imply capacity is greater than virtual memory - impossible.
        self.segment_count()
            .wrapping_mul(self.segment_capacity.get())
    }

    /// The number of segments in the chain.
    #[must_use]
    #[inline]
    pub fn segment_count(&self) -> usize {
        self.segment_count
    }

    /// Allocates a slot and returns a handle to it.
    ///
    /// The slot's storage is zeroed. If earlier segments have holes left by freed items, the first
    /// hole in chain order is filled; otherwise the slot comes from the tail segment, with a new
    /// segment appended when the tail is full.
    ///
    /// # Example
    ///
    /// ```
    /// use segment_pool::SegmentPool;
    ///
    /// let mut pool = SegmentPool::new(8, 4).unwrap();
    ///
    /// let items: Vec<_> = (0..10).map(|_| pool.allocate()).collect();
    /// assert_eq!(items[9].index(), 9);
    ///
    /// pool.free(5);
    /// assert_eq!(pool.allocate().index(), 5);
    /// ```
    ///
    /// # Panics
    ///
    /// Panics if the host runs out of memory while creating a segment.
    #[must_use]
    pub fn allocate(&mut self) -> Item {
        let ordinal = if self.reuse_hint_count > 0 {
            let ordinal = self.first_segment_with_hole();

            // Cannot wrap, we just checked it is non-zero.
            self.reuse_hint_count = self.reuse_hint_count.wrapping_sub(1);

            trace!(ordinal, "filling hole ahead of the allocation cursor");
            ordinal
        } else {
            self.alloc_cursor_with_space()
        };

        let segment = self.segment_mut(ordinal);
        let local_index = segment.allocate();
        let generation = segment.generation();

        self.sync_alloc_cursor();

        // Cannot wrap, that would imply more items than virtual memory can hold.
        self.live_count = self.live_count.wrapping_add(1);

        let index = ItemCoordinates::from_parts(ordinal, local_index)
            .global_index(self.segment_capacity);

        Item::new(index, generation)
    }

    /// Frees the item at a global index.
    ///
    /// Returns `true` if an item was freed, `false` if the index did not resolve to an occupied
    /// slot. Freeing the same index twice has the same effect as freeing it once.
    ///
    /// If this empties a segment that is not the only one, the segment is retired and its
    /// memory released.
    ///
    /// # Example
    ///
    /// ```
    /// use segment_pool::SegmentPool;
    ///
    /// let mut pool = SegmentPool::new(8, 4).unwrap();
    /// let item = pool.allocate();
    ///
    /// assert!(pool.free(item.index()));
    /// assert!(!pool.free(item.index()));
    /// assert!(!pool.free(1_000));
    /// ```
    pub fn free(&mut self, index: usize) -> bool {
        let coordinates = ItemCoordinates::from_global_index(index, self.segment_capacity);
        self.free_at(coordinates)
    }

    /// Frees the item a handle refers to.
    ///
    /// Returns `true` if an item was freed. Returns `false` if the slot was already vacant or
    /// the segment that held the item has since been retired, even if a newer segment now owns
    /// the same index range.
    pub fn free_item(&mut self, item: Item) -> bool {
        let coordinates = ItemCoordinates::from_global_index(item.index(), self.segment_capacity);

        if self.segment_of(item).is_none() {
            return false;
        }

        self.free_at(coordinates)
    }

    /// Resolves a global index to its slot, whether occupied or not.
    ///
    /// Returns `None` if no live segment owns the index. Occupancy is reported by the returned
    /// view, it is not a condition for finding the slot.
    ///
    /// # Example
    ///
    /// ```
    /// use segment_pool::SegmentPool;
    ///
    /// let mut pool = SegmentPool::new(8, 4).unwrap();
    /// let item = pool.allocate();
    ///
    /// assert!(pool.lookup(item.index()).unwrap().is_occupied());
    ///
    /// // Same segment, never allocated.
    /// assert!(!pool.lookup(3).unwrap().is_occupied());
    ///
    /// // No segment holds this index.
    /// assert!(pool.lookup(4).is_none());
    /// ```
    #[must_use]
    pub fn lookup(&self, index: usize) -> Option<SlotRef<'_>> {
        let coordinates = ItemCoordinates::from_global_index(index, self.segment_capacity);
        let segment = self.segments.get(coordinates.ordinal())?.as_ref()?;
        let slot = segment.slot(coordinates.local_index())?;

        Some(SlotRef::new(
            index,
            slot.is_occupied(),
            segment.item_bytes(coordinates.local_index()),
        ))
    }

    /// Resolves a global index to its slot for writing, whether occupied or not.
    ///
    /// Returns `None` if no live segment owns the index.
    #[must_use]
    pub fn lookup_mut(&mut self, index: usize) -> Option<SlotMut<'_>> {
        let coordinates = ItemCoordinates::from_global_index(index, self.segment_capacity);
        let segment = self.segments.get_mut(coordinates.ordinal())?.as_mut()?;
        let occupied = segment.slot(coordinates.local_index())?.is_occupied();

        Some(SlotMut::new(
            index,
            occupied,
            segment.item_bytes_mut(coordinates.local_index()),
        ))
    }

    /// Whether the global index resolves to an occupied slot.
    ///
    /// # Example
    ///
    /// ```
    /// use segment_pool::SegmentPool;
    ///
    /// let mut pool = SegmentPool::new(8, 4).unwrap();
    /// let item = pool.allocate();
    ///
    /// assert!(pool.has(item.index()));
    /// assert!(!pool.has(item.index() + 1));
    /// ```
    #[must_use]
    pub fn has(&self, index: usize) -> bool {
        self.lookup(index).is_some_and(|slot| slot.is_occupied())
    }

    /// Whether the handle refers to a currently allocated item.
    #[must_use]
    pub fn contains(&self, item: Item) -> bool {
        self.get(item).is_some()
    }

    /// The storage of the item a handle refers to, if it is still allocated.
    #[must_use]
    pub fn get(&self, item: Item) -> Option<&[u8]> {
        let coordinates = ItemCoordinates::from_global_index(item.index(), self.segment_capacity);
        let segment = self.segment_of(item)?;

        segment
            .slot(coordinates.local_index())?
            .is_occupied()
            .then(|| segment.item_bytes(coordinates.local_index()))
    }

    /// The storage of the item a handle refers to for writing, if it is still allocated.
    #[must_use]
    pub fn get_mut(&mut self, item: Item) -> Option<&mut [u8]> {
        let coordinates = ItemCoordinates::from_global_index(item.index(), self.segment_capacity);

        let segment = self
            .segments
            .get_mut(coordinates.ordinal())?
            .as_mut()
            .filter(|segment| segment.generation() == item.generation())?;

        if !segment.slot(coordinates.local_index())?.is_occupied() {
            return None;
        }

        Some(segment.item_bytes_mut(coordinates.local_index()))
    }

    /// Iterates over the allocated items in chain order, yielding each item's global index and
    /// storage.
    ///
    /// # Example
    ///
    /// ```
    /// use segment_pool::SegmentPool;
    ///
    /// let mut pool = SegmentPool::new(1, 2).unwrap();
    /// for _ in 0..3 {
    ///     _ = pool.allocate();
    /// }
    /// pool.free(1);
    ///
    /// let indexes: Vec<usize> = pool.iter().map(|(index, _)| index).collect();
    /// assert_eq!(indexes, vec![0, 2]);
    /// ```
    pub fn iter(&self) -> impl Iterator<Item = (usize, &[u8])> {
        let segment_capacity = self.segment_capacity;

        self.chain().flat_map(move |segment| {
            segment.occupied().map(move |(local_index, bytes)| {
                let index = ItemCoordinates::from_parts(segment.ordinal(), local_index)
                    .global_index(segment_capacity);
                (index, bytes)
            })
        })
    }

    /// Releases every segment, returning the pool to its just-constructed state.
    ///
    /// All indexes and handles stop resolving. The next allocation starts again at index 0.
    pub fn reset(&mut self) {
        debug!(
            segments = self.segment_count(),
            live_items = self.live_count,
            "resetting pool"
        );

        self.segments.clear();
        self.vacated_ordinals.clear();
        self.segment_count = 0;
        self.chain_head = None;
        self.alloc_cursor = None;
        self.fallback_cursor = None;
        self.reuse_hint_count = 0;
        self.live_count = 0;
    }

    fn free_at(&mut self, coordinates: ItemCoordinates) -> bool {
        let ordinal = coordinates.ordinal();

        let Some(segment) = self
            .segments
            .get_mut(ordinal)
            .and_then(Option::as_mut)
        else {
            return false;
        };

        let release = segment.free(coordinates.local_index());

        if release == SlotRelease::AlreadyVacant {
            return false;
        }

        if self.alloc_cursor != Some(ordinal) {
            // Cannot wrap, that would imply more vacant slots than virtual memory can hold.
            self.reuse_hint_count = self.reuse_hint_count.wrapping_add(1);
        }

        // Cannot wrap, the slot was occupied.
        self.live_count = self.live_count.wrapping_sub(1);

        if release == SlotRelease::Drained {
            self.retire_segment(ordinal);
        }

        true
    }

    /// Unlinks and drops a drained segment, unless it is the only one in the chain.
    fn retire_segment(&mut self, ordinal: usize) {
        let segment = self.segment(ordinal);
        debug_assert!(segment.is_empty());

        let (prev, next) = (segment.prev(), segment.next());

        if prev.is_none() && next.is_none() {
            // The pool never drops to zero segments, so the sole segment stays as spare capacity.
            return;
        }

        if self.alloc_cursor == Some(ordinal) {
            // Recoil to the predecessor. Its vacant slots were counted as holes; as the
            // new fast-path segment they no longer are.
            let recoiled = self
                .fallback_cursor
                .expect("a tail segment that is not the head has a predecessor");

            let recoiled_vacant = self.segment(recoiled).vacant_count();
            self.reuse_hint_count = self
                .reuse_hint_count
                .checked_sub(recoiled_vacant)
                .expect("vacant slots of a non-tail segment are counted in the reuse hint");

            self.alloc_cursor = Some(recoiled);

            trace!(
                retired = ordinal,
                alloc_cursor = recoiled,
                "alloc cursor recoiled"
            );
        } else {
            // Every slot of a drained non-tail segment was counted as a hole.
            self.reuse_hint_count = self
                .reuse_hint_count
                .checked_sub(self.segment_capacity.get())
                .expect("vacant slots of a non-tail segment are counted in the reuse hint");
        }

        if self.chain_head == Some(ordinal) {
            self.chain_head = next;
        }

        if let Some(prev) = prev {
            self.segment_mut(prev).set_next(next);
        }

        if let Some(next) = next {
            self.segment_mut(next).set_prev(prev);
        }

        let segment = self
            .segments
            .get_mut(ordinal)
            .and_then(Option::take)
            .expect("retired segment was resolved above");

        self.vacated_ordinals.push(Reverse(ordinal));
        // Cannot wrap, the segment was live.
        self.segment_count = self.segment_count.wrapping_sub(1);

        while self.segments.last().is_some_and(Option::is_none) {
            self.segments.pop();
        }

        self.fallback_cursor = self
            .alloc_cursor
            .and_then(|cursor| self.segment(cursor).prev());

        debug!(
            ordinal,
            generation = segment.generation(),
            segments = self.segment_count(),
            "retired drained segment"
        );
    }

    /// Returns the alloc cursor's segment, first appending a new segment if the chain is empty
    /// or the cursor's segment is full.
    fn alloc_cursor_with_space(&mut self) -> usize {
        let Some(cursor) = self.alloc_cursor else {
            let ordinal = self.materialize_segment(None);
            self.chain_head = Some(ordinal);
            self.alloc_cursor = Some(ordinal);
            self.fallback_cursor = None;
            return ordinal;
        };

        if !self.segment(cursor).is_full() {
            return cursor;
        }

        let ordinal = self.materialize_segment(Some(cursor));
        self.segment_mut(cursor).set_next(Some(ordinal));

        // The new segment becomes the cursor in sync_alloc_cursor().
        ordinal
    }

    /// Walks the chain from its head to the first segment with a vacant slot.
    fn first_segment_with_hole(&self) -> usize {
        let ordinal = self
            .chain()
            .find(|segment| !segment.is_full())
            .map(Segment::ordinal)
            .expect("the reuse hint promises a vacant slot in the chain");

        debug_assert_ne!(
            Some(ordinal),
            self.alloc_cursor,
            "the reuse hint only counts holes outside the alloc cursor's segment"
        );

        ordinal
    }

    /// Moves the alloc cursor to the chain tail, which has changed if a segment was appended.
    fn sync_alloc_cursor(&mut self) {
        let Some(mut cursor) = self.alloc_cursor else {
            return;
        };

        while let Some(next) = self.segment(cursor).next() {
            cursor = next;
        }

        self.alloc_cursor = Some(cursor);
        self.fallback_cursor = self.segment(cursor).prev();
    }

    /// Creates an empty segment linked after `prev` and returns its ordinal.
    ///
    /// Only the new segment's back-link is set, the caller links `prev` forward.
    fn materialize_segment(&mut self, prev: Option<usize>) -> usize {
        let ordinal = self.take_vacated_ordinal().unwrap_or(self.segments.len());

        let generation = self.next_generation;
        // Cannot realistically wrap: one segment per nanosecond would take centuries.
        self.next_generation = self.next_generation.wrapping_add(1);

        let mut segment = Segment::new(
            ordinal,
            generation,
            self.item_size,
            self.segment_capacity,
        );
        segment.set_prev(prev);

        if let Some(entry) = self.segments.get_mut(ordinal) {
            *entry = Some(segment);
        } else {
            self.segments.push(Some(segment));
        }

        // Cannot wrap, that would imply more segments than virtual memory can hold.
        self.segment_count = self.segment_count.wrapping_add(1);

        debug!(
            ordinal,
            generation,
            segments = self.segment_count(),
            "materialized segment"
        );

        ordinal
    }

    /// Pops the lowest retired ordinal that still has a slot in the segment table.
    ///
    /// The table only grows once this returns `None`, so a stale entry never comes back into
    /// range while it is still queued.
    fn take_vacated_ordinal(&mut self) -> Option<usize> {
        while let Some(Reverse(ordinal)) = self.vacated_ordinals.pop() {
            if self.segments.get(ordinal).is_some_and(Option::is_none) {
                return Some(ordinal);
            }
        }

        None
    }

    /// Segments in chain order, from the head.
    fn chain(&self) -> impl Iterator<Item = &Segment> {
        iter::successors(self.chain_head.map(|head| self.segment(head)), |segment| {
            segment.next().map(|next| self.segment(next))
        })
    }

    /// The segment holding a handle's item, if it is the same segment the item was allocated in.
    fn segment_of(&self, item: Item) -> Option<&Segment> {
        let coordinates = ItemCoordinates::from_global_index(item.index(), self.segment_capacity);

        self.segments
            .get(coordinates.ordinal())?
            .as_ref()
            .filter(|segment| segment.generation() == item.generation())
    }

    fn segment(&self, ordinal: usize) -> &Segment {
        self.segments
            .get(ordinal)
            .and_then(Option::as_ref)
            .expect("chain links and cursors only refer to live segments")
    }

    fn segment_mut(&mut self, ordinal: usize) -> &mut Segment {
        self.segments
            .get_mut(ordinal)
            .and_then(Option::as_mut)
            .expect("chain links and cursors only refer to live segments")
    }

    /// Global index offset of the alloc cursor's segment.
    #[cfg(test)]
    fn alloc_cursor_offset(&self) -> Option<usize> {
        self.alloc_cursor
            .map(|cursor| ItemCoordinates::from_parts(cursor, 0).global_index(self.segment_capacity))
    }

    /// Walks every segment and slot, so it is only run from tests between operations.
    #[cfg_attr(test, mutants::skip)] // This is essentially test logic, mutation is meaningless.
    #[cfg(test)]
    pub(crate) fn integrity_check(&self) {
        let chain: Vec<&Segment> = self.chain().collect();

        assert_eq!(
            self.segment_count,
            self.segments.iter().flatten().count(),
            "segment count must match the live entries of the segment table"
        );

        assert_eq!(
            chain.len(),
            self.segment_count,
            "every live segment must be reachable from the chain head exactly once"
        );

        for ordinal in self.vacated_ordinals.iter().map(|Reverse(ordinal)| *ordinal) {
            assert!(
                self.segments.get(ordinal).is_none_or(Option::is_none),
                "vacated ordinal {ordinal} is held by a live segment"
            );
        }

        let mut expected_prev = None;
        for segment in &chain {
            segment.integrity_check();

            assert_eq!(
                segment.prev(),
                expected_prev,
                "segment {} has an asymmetric back-link",
                segment.ordinal()
            );
            expected_prev = Some(segment.ordinal());
        }

        assert_eq!(
            self.alloc_cursor, expected_prev,
            "the alloc cursor must be the chain tail"
        );

        assert_eq!(
            self.fallback_cursor,
            self.alloc_cursor
                .and_then(|cursor| self.segment(cursor).prev()),
            "the fallback cursor must precede the alloc cursor"
        );

        assert_eq!(
            self.live_count,
            chain.iter().map(|segment| segment.len()).sum::<usize>(),
            "live count must match the segments' used counts"
        );

        let holes = chain
            .iter()
            .filter(|segment| Some(segment.ordinal()) != self.alloc_cursor)
            .map(|segment| segment.vacant_count())
            .sum::<usize>();

        assert_eq!(
            self.reuse_hint_count, holes,
            "reuse hint must count the vacant slots outside the alloc cursor's segment"
        );

        assert!(
            self.segments.last().is_none_or(Option::is_some),
            "the segment table must not end with a retired entry"
        );
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
#[allow(
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects,
    clippy::cast_possible_truncation,
    reason = "tests focus on succinct code and do not need to tick all the boxes"
)]
mod tests {
    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(SegmentPool: Send, Sync, std::fmt::Debug);

    fn pool(segment_capacity: usize) -> SegmentPool {
        SegmentPool::new(8, segment_capacity).unwrap()
    }

    fn allocate_many(pool: &mut SegmentPool, count: usize) -> Vec<Item> {
        (0..count)
            .map(|_| {
                let item = pool.allocate();
                pool.integrity_check();
                item
            })
            .collect()
    }

    #[test]
    fn smoke_test() {
        let mut pool = pool(4);

        assert!(pool.is_empty());
        assert_eq!(pool.segment_count(), 0);

        let a = pool.allocate();
        let b = pool.allocate();

        assert_eq!(pool.len(), 2);
        assert_eq!(a.index(), 0);
        assert_eq!(b.index(), 1);

        pool.get_mut(a).unwrap().fill(1);
        pool.get_mut(b).unwrap().fill(2);

        assert_eq!(pool.get(a).unwrap(), &[1; 8]);
        assert_eq!(pool.lookup(1).unwrap().bytes(), &[2; 8]);

        assert!(pool.free_item(a));
        assert!(!pool.contains(a));
        assert!(pool.contains(b));
        assert_eq!(pool.len(), 1);

        pool.integrity_check();
    }

    #[test]
    fn first_allocation_materializes_one_segment() {
        let mut pool = pool(4);
        _ = pool.allocate();

        assert_eq!(pool.segment_count(), 1);
        assert_eq!(pool.chain_head, Some(0));
        assert_eq!(pool.alloc_cursor, Some(0));
        assert_eq!(pool.fallback_cursor, None);
        assert_eq!(pool.capacity(), 4);

        pool.integrity_check();
    }

    #[test]
    fn growth_appends_segments() {
        let mut pool = pool(4);
        let items = allocate_many(&mut pool, 10);

        let indexes: Vec<usize> = items.iter().map(Item::index).collect();
        assert_eq!(indexes, (0..10).collect::<Vec<_>>());

        assert_eq!(pool.segment_count(), 3);
        assert_eq!(pool.alloc_cursor, Some(2));
        assert_eq!(pool.fallback_cursor, Some(1));
        assert_eq!(pool.alloc_cursor_offset(), Some(8));

        pool.integrity_check();
    }

    #[test]
    fn hole_in_middle_segment_is_reused() {
        let mut pool = pool(4);
        _ = allocate_many(&mut pool, 10);

        assert!(pool.free(5));
        assert_eq!(pool.reuse_hint_count, 1);

        let item = pool.allocate();
        assert_eq!(item.index(), 5);
        assert_eq!(pool.reuse_hint_count, 0);

        assert!(pool.has(5));
        assert!(!pool.has(10));

        pool.integrity_check();
    }

    #[test]
    fn hole_walk_passes_full_segments() {
        let mut pool = pool(2);
        _ = allocate_many(&mut pool, 8);

        // A hole in the third segment and one in the tail. The walk skips the first two.
        pool.free(4);
        pool.free(6);

        assert_eq!(pool.allocate().index(), 4);
        assert_eq!(pool.allocate().index(), 6);

        // With the holes filled the fast path resumes and grows the chain.
        assert_eq!(pool.allocate().index(), 8);

        pool.integrity_check();
    }

    #[test]
    fn both_allocation_paths_agree_on_index() {
        // Fast path: a hole in the tail segment is refilled without a walk.
        let mut pool = pool(4);
        _ = allocate_many(&mut pool, 6);
        let tail_slot_address = pool.lookup(5).unwrap().as_ptr();

        pool.free(5);
        assert_eq!(pool.reuse_hint_count, 0);
        let refilled = pool.allocate();
        assert_eq!(refilled.index(), 5);
        assert_eq!(pool.lookup(5).unwrap().as_ptr(), tail_slot_address);

        // Hole path: a hole in the head segment is found by walking the chain.
        let head_slot_address = pool.lookup(2).unwrap().as_ptr();

        pool.free(2);
        assert_eq!(pool.reuse_hint_count, 1);
        let refilled = pool.allocate();
        assert_eq!(refilled.index(), 2);
        assert_eq!(pool.lookup(2).unwrap().as_ptr(), head_slot_address);

        pool.integrity_check();
    }

    #[test]
    fn retiring_head_segment_keeps_other_indexes() {
        let mut pool = pool(4);
        let items = allocate_many(&mut pool, 8);

        for (value, item) in items.iter().enumerate() {
            pool.get_mut(*item).unwrap().fill(value as u8);
        }

        for index in 0..4 {
            assert!(pool.free(index));
        }

        assert_eq!(pool.segment_count(), 1);
        assert_eq!(pool.chain_head, Some(1));
        assert_eq!(pool.reuse_hint_count, 0);
        assert!(pool.lookup(0).is_none());

        for index in 4..8 {
            let slot = pool.lookup(index).unwrap();
            assert!(slot.is_occupied());
            assert_eq!(slot.bytes(), &[index as u8; 8]);
        }

        pool.integrity_check();
    }

    #[test]
    fn retiring_interior_segment_keeps_other_indexes() {
        let mut pool = pool(2);
        let items = allocate_many(&mut pool, 6);

        for (value, item) in items.iter().enumerate() {
            pool.get_mut(*item).unwrap().fill(value as u8);
        }

        pool.free(2);
        pool.free(3);

        assert_eq!(pool.segment_count(), 2);
        assert!(pool.lookup(2).is_none());
        assert!(pool.lookup(3).is_none());

        for index in [0, 1, 4, 5] {
            assert_eq!(pool.lookup(index).unwrap().bytes(), &[index as u8; 8]);
        }

        let chain: Vec<usize> = pool.chain().map(Segment::ordinal).collect();
        assert_eq!(chain, vec![0, 2]);

        pool.integrity_check();
    }

    #[test]
    fn retired_ordinal_is_reused_by_next_segment() {
        let mut pool = pool(2);
        _ = allocate_many(&mut pool, 6);

        pool.free(2);
        pool.free(3);

        // Fill the remaining capacity: the tail is full, so growth takes the free ordinal 1.
        let item = pool.allocate();
        assert_eq!(item.index(), 2);
        assert_eq!(pool.alloc_cursor, Some(1));

        let chain: Vec<usize> = pool.chain().map(Segment::ordinal).collect();
        assert_eq!(chain, vec![0, 2, 1]);

        pool.integrity_check();
    }

    #[test]
    fn vacated_ordinals_are_reused_lowest_first() {
        let mut pool = pool(1);
        _ = allocate_many(&mut pool, 6);

        pool.free(3);
        pool.free(1);
        assert_eq!(pool.segment_count(), 4);
        pool.integrity_check();

        assert_eq!(pool.allocate().index(), 1);
        assert_eq!(pool.allocate().index(), 3);
        assert_eq!(pool.allocate().index(), 6);
        assert_eq!(pool.segment_count(), 7);
        assert!(pool.vacated_ordinals.is_empty());
        pool.integrity_check();

        // Retiring the last ordinal trims the table, leaving a stale queue entry behind.
        pool.free(6);
        assert_eq!(pool.segments.len(), 6);
        assert_eq!(pool.vacated_ordinals.len(), 1);
        pool.integrity_check();

        assert_eq!(pool.allocate().index(), 6);
        assert_eq!(pool.segments.len(), 7);
        assert!(pool.vacated_ordinals.is_empty());
        assert_eq!(pool.segment_count(), 7);
        assert_eq!(pool.capacity(), 7);

        pool.integrity_check();
    }

    #[test]
    fn random_churn_keeps_pool_consistent() {
        use rand::rngs::SmallRng;
        use rand::{Rng, SeedableRng};

        let mut rng = SmallRng::seed_from_u64(0xC0FFEE);
        let mut pool = pool(3);
        let mut live: Vec<Item> = Vec::new();

        for _ in 0..2_000 {
            if live.is_empty() || rng.random_bool(0.5) {
                live.push(pool.allocate());
            } else {
                let position = rng.random_range(0..live.len());
                assert!(pool.free_item(live.swap_remove(position)));
            }

            pool.integrity_check();
            assert_eq!(pool.len(), live.len());
        }
    }

    #[test]
    fn retiring_tail_segment_recoils_cursor() {
        let mut pool = pool(4);
        _ = allocate_many(&mut pool, 10);

        pool.free(1);
        assert_eq!(pool.reuse_hint_count, 1);

        pool.free(8);
        pool.free(9);

        assert_eq!(pool.segment_count(), 2);
        assert_eq!(pool.alloc_cursor, Some(1));
        assert_eq!(pool.fallback_cursor, Some(0));
        assert_eq!(pool.alloc_cursor_offset(), Some(4));
        assert_eq!(pool.reuse_hint_count, 1);
        assert_eq!(pool.segments.len(), 2);

        assert_eq!(pool.allocate().index(), 1);
        assert_eq!(pool.allocate().index(), 8);

        pool.integrity_check();
    }

    #[test]
    fn recoil_moves_vacant_slots_out_of_hint() {
        let mut pool = pool(4);
        _ = allocate_many(&mut pool, 5);

        pool.free(0);
        pool.free(1);
        assert_eq!(pool.reuse_hint_count, 2);

        pool.free(4);

        assert_eq!(pool.alloc_cursor, Some(0));
        assert_eq!(pool.reuse_hint_count, 0);
        assert_eq!(pool.allocate().index(), 0);

        pool.integrity_check();
    }

    #[test]
    fn sole_segment_is_never_retired() {
        let mut pool = pool(4);
        let items = allocate_many(&mut pool, 3);

        for item in items {
            assert!(pool.free_item(item));
        }

        assert!(pool.is_empty());
        assert_eq!(pool.segment_count(), 1);
        assert!(pool.chain_head.is_some());
        assert!(pool.alloc_cursor.is_some());

        assert_eq!(pool.allocate().index(), 0);

        pool.integrity_check();
    }

    #[test]
    fn draining_everything_leaves_one_segment() {
        let mut pool = pool(2);
        _ = allocate_many(&mut pool, 7);

        for index in [3, 0, 6, 1, 5, 2, 4] {
            assert!(pool.free(index));
            assert!(pool.segment_count() >= 1);
        }

        assert!(pool.is_empty());
        assert_eq!(pool.segment_count(), 1);
        assert_eq!(pool.reuse_hint_count, 0);

        pool.integrity_check();
    }

    #[test]
    fn free_is_idempotent() {
        let mut pool = pool(4);
        let items = allocate_many(&mut pool, 6);

        assert!(pool.free(1));
        assert!(!pool.free(1));
        assert_eq!(pool.len(), 5);
        assert_eq!(pool.reuse_hint_count, 1);
        assert!(!pool.has(1));

        assert!(pool.free_item(items[4]));
        assert!(!pool.free_item(items[4]));
        assert_eq!(pool.len(), 4);

        pool.integrity_check();
    }

    #[test]
    fn free_unknown_index_is_noop() {
        let mut pool = pool(4);
        assert!(!pool.free(0));

        _ = pool.allocate();
        assert!(!pool.free(3));
        assert!(!pool.free(4));
        assert!(!pool.free(usize::MAX));
        assert_eq!(pool.len(), 1);

        pool.integrity_check();
    }

    #[test]
    fn lookup_does_not_require_occupancy() {
        let mut pool = pool(4);
        assert!(pool.lookup(0).is_none());

        _ = pool.allocate();

        let slot = pool.lookup(2).unwrap();
        assert!(!slot.is_occupied());
        assert_eq!(slot.index(), 2);
        assert_eq!(slot.bytes().len(), 8);

        let mut slot = pool.lookup_mut(3).unwrap();
        assert!(!slot.is_occupied());
        slot.bytes_mut().fill(7);

        pool.integrity_check();
    }

    #[test]
    fn lookup_mut_writes_are_visible() {
        let mut pool = pool(4);
        let item = pool.allocate();

        pool.lookup_mut(item.index())
            .unwrap()
            .into_bytes_mut()
            .copy_from_slice(b"abcdefgh");

        assert_eq!(pool.get(item).unwrap(), b"abcdefgh");

        pool.integrity_check();
    }

    #[test]
    fn stale_handle_does_not_reach_new_segment() {
        let mut pool = pool(2);
        let items = allocate_many(&mut pool, 6);
        let stale = items[2];

        pool.free(2);
        pool.free(3);

        // The next growth reuses ordinal 1 with a new generation.
        let fresh = pool.allocate();
        assert_eq!(fresh.index(), stale.index());

        assert!(pool.has(stale.index()));
        assert!(!pool.contains(stale));
        assert!(pool.get(stale).is_none());
        assert!(pool.get_mut(stale).is_none());
        assert!(!pool.free_item(stale));
        assert!(pool.contains(fresh));

        pool.integrity_check();
    }

    #[test]
    fn addresses_are_stable_across_growth() {
        let mut pool = pool(4);
        let first = pool.allocate();
        let address = pool.lookup(first.index()).unwrap().as_ptr();

        _ = allocate_many(&mut pool, 100);

        assert_eq!(pool.lookup(first.index()).unwrap().as_ptr(), address);

        pool.integrity_check();
    }

    #[test]
    fn reallocated_slot_is_zeroed() {
        let mut pool = pool(4);
        let item = pool.allocate();
        _ = pool.allocate();
        pool.get_mut(item).unwrap().fill(0xFF);

        pool.free_item(item);
        let again = pool.allocate();

        assert_eq!(again.index(), item.index());
        assert_eq!(pool.get(again).unwrap(), &[0; 8]);

        pool.integrity_check();
    }

    #[test]
    fn iter_follows_chain_order() {
        let mut pool = pool(2);
        _ = allocate_many(&mut pool, 6);
        pool.free(2);
        pool.free(3);
        pool.free(4);
        _ = pool.allocate();
        _ = pool.allocate();
        _ = pool.allocate();

        // Slot 4 in the tail is refilled first, then growth takes the free ordinal 1.
        let indexes: Vec<usize> = pool.iter().map(|(index, _)| index).collect();
        assert_eq!(indexes, vec![0, 1, 4, 5, 2, 3]);

        pool.integrity_check();
    }

    #[test]
    fn reset_returns_to_initial_state() {
        let mut pool = pool(4);
        let items = allocate_many(&mut pool, 9);
        pool.free(2);

        pool.reset();

        assert!(pool.is_empty());
        assert_eq!(pool.segment_count(), 0);
        assert_eq!(pool.capacity(), 0);
        assert_eq!(pool.chain_head, None);
        assert_eq!(pool.alloc_cursor, None);
        assert_eq!(pool.fallback_cursor, None);
        assert_eq!(pool.reuse_hint_count, 0);
        assert!(pool.lookup(0).is_none());
        assert!(!pool.contains(items[0]));

        assert_eq!(pool.allocate().index(), 0);

        pool.integrity_check();
    }

    #[test]
    fn single_item_segments() {
        let mut pool = pool(1);
        let items = allocate_many(&mut pool, 5);
        assert_eq!(pool.segment_count(), 5);

        pool.free_item(items[2]);
        assert_eq!(pool.segment_count(), 4);
        assert!(pool.lookup(2).is_none());

        pool.free_item(items[4]);
        assert_eq!(pool.alloc_cursor, Some(3));

        assert_eq!(pool.allocate().index(), 2);
        assert_eq!(pool.allocate().index(), 4);

        pool.integrity_check();
    }
}
