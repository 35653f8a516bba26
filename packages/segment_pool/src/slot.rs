/// Bookkeeping for one storage cell of a segment.
///
/// The bytes of the slot live in the owning segment's storage buffer; the slot only records
/// where it sits and whether it currently holds an item.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct Slot {
    occupied: bool,

    /// Position of the slot within its segment. Fixed at creation.
    local_index: usize,

    /// Ordinal tag of the owning segment. A back-reference only, the segment is owned by the pool.
    ordinal: usize,
}

impl Slot {
    #[must_use]
    pub(crate) fn new(ordinal: usize, local_index: usize) -> Self {
        Self {
            occupied: false,
            local_index,
            ordinal,
        }
    }

    #[must_use]
    pub(crate) fn is_occupied(&self) -> bool {
        self.occupied
    }

    pub(crate) fn set_occupied(&mut self, occupied: bool) {
        self.occupied = occupied;
    }

    #[must_use]
    pub(crate) fn local_index(&self) -> usize {
        self.local_index
    }

    #[must_use]
    #[cfg_attr(
        not(any(test, debug_assertions)),
        expect(dead_code, reason = "Used in integrity checks, which exist in tests and debug builds")
    )]
    pub(crate) fn ordinal(&self) -> usize {
        self.ordinal
    }
}

/// Shared view of a slot resolved by [`SegmentPool::lookup()`][crate::SegmentPool::lookup].
///
/// A lookup does not require the slot to be occupied, so check [`is_occupied()`][Self::is_occupied]
/// before interpreting the bytes as a live item.
#[derive(Clone, Copy, Debug)]
pub struct SlotRef<'a> {
    index: usize,
    occupied: bool,
    bytes: &'a [u8],
}

impl<'a> SlotRef<'a> {
    #[must_use]
    pub(crate) fn new(index: usize, occupied: bool, bytes: &'a [u8]) -> Self {
        Self {
            index,
            occupied,
            bytes,
        }
    }

    /// The global index that resolved to this slot.
    #[must_use]
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Whether the slot currently holds an allocated item.
    #[must_use]
    #[inline]
    pub fn is_occupied(&self) -> bool {
        self.occupied
    }

    /// The storage of the slot, exactly `item_size` bytes long.
    #[must_use]
    #[inline]
    pub fn bytes(&self) -> &'a [u8] {
        self.bytes
    }

    /// The address of the slot's storage.
    ///
    /// This address does not change for as long as the segment owning the slot exists, no matter
    /// how many other items are allocated or freed in the meantime.
    #[must_use]
    #[inline]
    pub fn as_ptr(&self) -> *const u8 {
        self.bytes.as_ptr()
    }
}

/// Exclusive view of a slot resolved by [`SegmentPool::lookup_mut()`][crate::SegmentPool::lookup_mut].
///
/// As with [`SlotRef`], the slot may or may not be occupied.
#[derive(Debug)]
pub struct SlotMut<'a> {
    index: usize,
    occupied: bool,
    bytes: &'a mut [u8],
}

impl<'a> SlotMut<'a> {
    #[must_use]
    pub(crate) fn new(index: usize, occupied: bool, bytes: &'a mut [u8]) -> Self {
        Self {
            index,
            occupied,
            bytes,
        }
    }

    /// The global index that resolved to this slot.
    #[must_use]
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Whether the slot currently holds an allocated item.
    #[must_use]
    #[inline]
    pub fn is_occupied(&self) -> bool {
        self.occupied
    }

    /// The storage of the slot, exactly `item_size` bytes long.
    #[must_use]
    #[inline]
    pub fn bytes(&self) -> &[u8] {
        self.bytes
    }

    /// The storage of the slot for writing.
    #[must_use]
    #[inline]
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        self.bytes
    }

    /// Consumes the view, returning the storage borrowed for the full lifetime of the view.
    #[must_use]
    #[inline]
    pub fn into_bytes_mut(self) -> &'a mut [u8] {
        self.bytes
    }
}
