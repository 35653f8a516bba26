use std::num::NonZero;
use std::ops::Range;

use crate::Slot;

/// A fixed-capacity block of same-sized slots, backed by one contiguous storage buffer.
///
/// The storage buffer is allocated once at construction and never reallocated, so the bytes of
/// every slot stay at the same address for the lifetime of the segment, even when the segment
/// value itself is moved around inside the pool's segment table.
///
/// Segments form a doubly linked chain inside the pool. The links are ordinals of the
/// neighboring segments, never owning references; the pool alone edits them.
///
/// Vacant slots are found with a scan cursor instead of an explicit freelist: every slot below
/// `free_scan_cursor` is known to be occupied, so allocation takes the slot at the cursor and
/// then scans forward to the next vacant one. Each step of the scan is paid for by one earlier
/// allocation, which makes allocation amortized O(1).
#[derive(Debug)]
pub(crate) struct Segment {
    /// Tag assigned when the segment was created. Determines the global indexes of its slots.
    ordinal: usize,

    /// Pool-wide creation counter value, distinguishing this segment from earlier ones that held
    /// the same ordinal.
    generation: u64,

    item_size: NonZero<usize>,

    /// `capacity * item_size` bytes, slot `n` at byte offset `n * item_size`.
    storage: Box<[u8]>,

    /// Index-aligned with `storage`.
    slots: Box<[Slot]>,

    used_count: usize,

    /// Lowest index that may be vacant. Equal to the capacity when the segment is full.
    free_scan_cursor: usize,

    prev: Option<usize>,
    next: Option<usize>,
}

/// What happened when a slot was returned to its segment.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum SlotRelease {
    /// The slot was already vacant. Nothing changed.
    AlreadyVacant,

    /// The slot was vacated and the segment still holds other items.
    Released,

    /// The slot was vacated and it was the last item, the segment is now empty.
    Drained,
}

impl Segment {
    /// Creates an empty segment.
    ///
    /// # Panics
    ///
    /// Panics if the storage size overflows `usize`. The pool builder rejects such configurations
    /// before any segment is created.
    #[must_use]
    pub(crate) fn new(
        ordinal: usize,
        generation: u64,
        item_size: NonZero<usize>,
        capacity: NonZero<usize>,
    ) -> Self {
        let storage_len = item_size
            .get()
            .checked_mul(capacity.get())
            .expect("segment storage size was validated when the pool was configured");

        let slots = (0..capacity.get())
            .map(|local_index| Slot::new(ordinal, local_index))
            .collect();

        Self {
            ordinal,
            generation,
            item_size,
            storage: vec![0; storage_len].into_boxed_slice(),
            slots,
            used_count: 0,
            free_scan_cursor: 0,
            prev: None,
            next: None,
        }
    }

    #[must_use]
    pub(crate) fn ordinal(&self) -> usize {
        self.ordinal
    }

    #[must_use]
    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub(crate) fn capacity(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.used_count
    }

    #[must_use]
    pub(crate) fn is_empty(&self) -> bool {
        self.used_count == 0
    }

    #[must_use]
    pub(crate) fn is_full(&self) -> bool {
        self.used_count == self.capacity()
    }

    /// Number of slots not currently holding an item.
    #[must_use]
    pub(crate) fn vacant_count(&self) -> usize {
        // Cannot wrap, used_count never exceeds capacity.
        self.capacity().wrapping_sub(self.used_count)
    }

    #[must_use]
    pub(crate) fn prev(&self) -> Option<usize> {
        self.prev
    }

    #[must_use]
    pub(crate) fn next(&self) -> Option<usize> {
        self.next
    }

    pub(crate) fn set_prev(&mut self, prev: Option<usize>) {
        self.prev = prev;
    }

    pub(crate) fn set_next(&mut self, next: Option<usize>) {
        self.next = next;
    }

    #[must_use]
    pub(crate) fn slot(&self, local_index: usize) -> Option<&Slot> {
        self.slots.get(local_index)
    }

    /// Takes the vacant slot at the scan cursor and returns its local index.
    ///
    /// The storage of the slot is zeroed before it is handed out.
    ///
    /// # Panics
    ///
    /// Panics if the segment is full.
    #[must_use]
    pub(crate) fn allocate(&mut self) -> usize {
        #[cfg(debug_assertions)]
        self.integrity_check();

        assert!(
            !self.is_full(),
            "cannot allocate in full segment {}",
            self.ordinal
        );

        let local_index = self.free_scan_cursor;

        let slot = self
            .slots
            .get_mut(local_index)
            .expect("the scan cursor of a segment that is not full points at a slot");

        // Mark before scanning, otherwise the scan below stops at this same slot.
        slot.set_occupied(true);

        // Cannot wrap, the segment was not full.
        self.used_count = self.used_count.wrapping_add(1);

        self.item_bytes_mut(local_index).fill(0);

        if self.is_full() {
            self.free_scan_cursor = self.capacity();
            return local_index;
        }

        // Cannot wrap, local_index is below capacity.
        let scan_start = local_index.wrapping_add(1);

        self.free_scan_cursor = self
            .slots
            .iter()
            .skip(scan_start)
            .position(|slot| !slot.is_occupied())
            .map(|offset| scan_start.wrapping_add(offset))
            .expect("all slots below the scan cursor are occupied, so a vacant one lies above it");

        local_index
    }

    /// Vacates the slot at `local_index`. Freeing a vacant slot changes nothing.
    ///
    /// The segment does not unlink itself when drained; the pool reacts to
    /// [`SlotRelease::Drained`] by editing the chain.
    ///
    /// # Panics
    ///
    /// Panics if `local_index` is out of bounds.
    pub(crate) fn free(&mut self, local_index: usize) -> SlotRelease {
        let slot = self
            .slots
            .get_mut(local_index)
            .expect("local index is always reduced modulo the segment capacity");

        if !slot.is_occupied() {
            return SlotRelease::AlreadyVacant;
        }

        slot.set_occupied(false);

        self.used_count = self
            .used_count
            .checked_sub(1)
            .expect("the slot was occupied so the count must be non-zero");

        // Prefer the lowest vacant slot for the next allocation.
        if local_index < self.free_scan_cursor {
            self.free_scan_cursor = local_index;
        }

        if self.used_count == 0 {
            SlotRelease::Drained
        } else {
            SlotRelease::Released
        }
    }

    #[must_use]
    pub(crate) fn item_bytes(&self, local_index: usize) -> &[u8] {
        let range = self.item_range(local_index);

        self.storage
            .get(range)
            .expect("item range of an in-bounds slot lies within storage")
    }

    #[must_use]
    pub(crate) fn item_bytes_mut(&mut self, local_index: usize) -> &mut [u8] {
        let range = self.item_range(local_index);

        self.storage
            .get_mut(range)
            .expect("item range of an in-bounds slot lies within storage")
    }

    fn item_range(&self, local_index: usize) -> Range<usize> {
        assert!(
            local_index < self.capacity(),
            "slot {local_index} out of bounds in segment {} of capacity {}",
            self.ordinal,
            self.capacity()
        );

        // Cannot wrap, both ends lie within the storage buffer whose size was checked in `new()`.
        let start = local_index.wrapping_mul(self.item_size.get());
        start..start.wrapping_add(self.item_size.get())
    }

    /// Occupied slots in ascending local index order, with their storage.
    pub(crate) fn occupied(&self) -> impl Iterator<Item = (usize, &[u8])> {
        self.slots
            .iter()
            .filter(|slot| slot.is_occupied())
            .map(|slot| (slot.local_index(), self.item_bytes(slot.local_index())))
    }

    #[cfg_attr(test, mutants::skip)] // This is essentially test logic, mutation is meaningless.
    #[cfg(any(test, debug_assertions))]
    pub(crate) fn integrity_check(&self) {
        let mut observed_used_count: usize = 0;

        for (position, slot) in self.slots.iter().enumerate() {
            assert_eq!(
                slot.local_index(),
                position,
                "slot at position {position} of segment {} claims local index {}",
                self.ordinal,
                slot.local_index()
            );

            assert_eq!(
                slot.ordinal(),
                self.ordinal,
                "slot {position} of segment {} claims to belong to segment {}",
                self.ordinal,
                slot.ordinal()
            );

            if slot.is_occupied() {
                observed_used_count = observed_used_count
                    .checked_add(1)
                    .expect("guarded by slot count");
            } else {
                assert!(
                    position >= self.free_scan_cursor,
                    "vacant slot {position} lies below the scan cursor {} of segment {}",
                    self.free_scan_cursor,
                    self.ordinal
                );
            }
        }

        assert_eq!(
            self.used_count, observed_used_count,
            "used count of segment {} does not match the occupied slots",
            self.ordinal
        );

        if self.is_full() {
            assert_eq!(self.free_scan_cursor, self.capacity());
        } else {
            assert!(
                self.slots
                    .get(self.free_scan_cursor)
                    .is_some_and(|slot| !slot.is_occupied()),
                "scan cursor {} of segment {} does not point at a vacant slot",
                self.free_scan_cursor,
                self.ordinal
            );
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
#[allow(
    clippy::indexing_slicing,
    reason = "tests focus on succinct code and do not need to tick all the boxes"
)]
mod tests {
    use super::*;

    fn segment(capacity: usize) -> Segment {
        Segment::new(
            0,
            1,
            NonZero::new(8).unwrap(),
            NonZero::new(capacity).unwrap(),
        )
    }

    #[test]
    fn allocates_in_ascending_order() {
        let mut segment = segment(4);

        for expected in 0..4 {
            assert_eq!(segment.allocate(), expected);
        }

        assert!(segment.is_full());
        assert_eq!(segment.len(), 4);
        assert_eq!(segment.vacant_count(), 0);
    }

    #[test]
    fn full_segment_parks_cursor_at_capacity() {
        let mut segment = segment(2);
        _ = segment.allocate();
        _ = segment.allocate();

        assert_eq!(segment.free_scan_cursor, 2);
        segment.integrity_check();
    }

    #[test]
    #[should_panic]
    fn allocate_in_full_segment_panics() {
        let mut segment = segment(1);
        _ = segment.allocate();
        _ = segment.allocate();
    }

    #[test]
    fn freed_slot_is_reused_first() {
        let mut segment = segment(4);
        for _ in 0..3 {
            _ = segment.allocate();
        }

        assert_eq!(segment.free(1), SlotRelease::Released);
        assert_eq!(segment.allocate(), 1);

        // The cursor must have skipped the occupied slot 2 and landed on 3.
        assert_eq!(segment.allocate(), 3);
    }

    #[test]
    fn lowest_freed_slot_wins() {
        let mut segment = segment(8);
        for _ in 0..8 {
            _ = segment.allocate();
        }

        _ = segment.free(6);
        _ = segment.free(2);
        _ = segment.free(4);

        assert_eq!(segment.allocate(), 2);
        assert_eq!(segment.allocate(), 4);
        assert_eq!(segment.allocate(), 6);
        assert!(segment.is_full());
    }

    #[test]
    fn allocations_never_repeat_a_live_slot() {
        let mut segment = segment(16);
        let mut seen = [false; 16];

        for _ in 0..16 {
            let local_index = segment.allocate();
            assert!(!seen[local_index], "slot {local_index} handed out twice");
            seen[local_index] = true;
        }
    }

    #[test]
    fn free_is_idempotent() {
        let mut segment = segment(4);
        let a = segment.allocate();
        _ = segment.allocate();

        assert_eq!(segment.free(a), SlotRelease::Released);
        assert_eq!(segment.free(a), SlotRelease::AlreadyVacant);
        assert_eq!(segment.len(), 1);
        segment.integrity_check();
    }

    #[test]
    fn freeing_last_item_drains() {
        let mut segment = segment(4);
        let a = segment.allocate();
        let b = segment.allocate();

        assert_eq!(segment.free(b), SlotRelease::Released);
        assert_eq!(segment.free(a), SlotRelease::Drained);
        assert!(segment.is_empty());
        assert_eq!(segment.free(a), SlotRelease::AlreadyVacant);
    }

    #[test]
    fn reused_slot_is_zeroed() {
        let mut segment = segment(2);
        let a = segment.allocate();
        segment.item_bytes_mut(a).fill(0xAB);

        _ = segment.free(a);
        let b = segment.allocate();

        assert_eq!(a, b);
        assert!(segment.item_bytes(b).iter().all(|&byte| byte == 0));
    }

    #[test]
    fn items_do_not_overlap() {
        let mut segment = segment(3);
        let a = segment.allocate();
        let b = segment.allocate();

        segment.item_bytes_mut(a).fill(1);
        segment.item_bytes_mut(b).fill(2);

        assert_eq!(segment.item_bytes(a), &[1; 8]);
        assert_eq!(segment.item_bytes(b), &[2; 8]);
        assert_eq!(segment.item_bytes(2), &[0; 8]);
    }

    #[test]
    fn storage_does_not_move_with_segment() {
        let mut segment = segment(4);
        let a = segment.allocate();
        let before = segment.item_bytes(a).as_ptr();

        let moved = Box::new(segment);

        assert_eq!(moved.item_bytes(a).as_ptr(), before);
    }

    #[test]
    fn occupied_lists_only_live_slots() {
        let mut segment = segment(4);
        for _ in 0..4 {
            _ = segment.allocate();
        }
        _ = segment.free(0);
        _ = segment.free(2);

        let live: Vec<usize> = segment.occupied().map(|(index, _)| index).collect();
        assert_eq!(live, vec![1, 3]);
    }

    #[test]
    fn links_start_detached() {
        let mut segment = segment(1);
        assert_eq!(segment.prev(), None);
        assert_eq!(segment.next(), None);

        segment.set_prev(Some(4));
        segment.set_next(Some(9));
        assert_eq!(segment.prev(), Some(4));
        assert_eq!(segment.next(), Some(9));
    }

    #[test]
    #[should_panic]
    fn out_of_bounds_item_panics() {
        let segment = segment(2);
        _ = segment.item_bytes(2);
    }
}
