use std::cell::Cell;
use std::marker::PhantomData;
use std::num::NonZero;

use crate::{Error, Result, SegmentPool};

/// Default number of items in each segment.
#[cfg(not(miri))]
pub(crate) const DEFAULT_SEGMENT_CAPACITY: usize = 128;

// Under Miri, we use a smaller segment capacity because Miri test runtime scales by memory usage.
#[cfg(miri)]
pub(crate) const DEFAULT_SEGMENT_CAPACITY: usize = 16;

/// Builder for creating an instance of [`SegmentPool`].
///
/// The item size is mandatory. The segment capacity defaults to 128 items.
///
/// # Examples
///
/// ```
/// use segment_pool::SegmentPool;
///
/// let pool = SegmentPool::builder()
///     .item_size(24)
///     .segment_capacity(64)
///     .build()
///     .unwrap();
///
/// assert_eq!(pool.item_size(), 24);
/// assert_eq!(pool.segment_capacity(), 64);
/// ```
///
/// # Thread safety
///
/// The builder is thread-mobile ([`Send`]) but not thread-safe ([`Sync`]).
#[derive(Debug)]
#[must_use]
pub struct SegmentPoolBuilder {
    item_size: Option<usize>,
    segment_capacity: usize,

    _not_sync: PhantomData<Cell<()>>,
}

impl SegmentPoolBuilder {
    #[inline]
    pub(crate) fn new() -> Self {
        Self {
            item_size: None,
            segment_capacity: DEFAULT_SEGMENT_CAPACITY,
            _not_sync: PhantomData,
        }
    }

    /// Sets the size in bytes of every item in the pool.
    ///
    /// # Examples
    ///
    /// ```
    /// use segment_pool::SegmentPool;
    ///
    /// let pool = SegmentPool::builder().item_size(16).build().unwrap();
    /// assert_eq!(pool.item_size(), 16);
    /// ```
    #[inline]
    pub fn item_size(mut self, item_size: usize) -> Self {
        self.item_size = Some(item_size);
        self
    }

    /// Sets the item size to the size of `T`.
    ///
    /// Only the size is taken over; items are handed out as byte slices with no alignment
    /// guarantee beyond that of `u8`.
    ///
    /// # Examples
    ///
    /// ```
    /// use segment_pool::SegmentPool;
    ///
    /// let pool = SegmentPool::builder().item_size_of::<[u32; 4]>().build().unwrap();
    /// assert_eq!(pool.item_size(), 16);
    /// ```
    #[inline]
    pub fn item_size_of<T>(mut self) -> Self {
        self.item_size = Some(size_of::<T>());
        self
    }

    /// Sets the number of items each segment holds.
    ///
    /// Global item indexes are assigned in blocks of this size, one block per segment.
    #[inline]
    pub fn segment_capacity(mut self, segment_capacity: usize) -> Self {
        self.segment_capacity = segment_capacity;
        self
    }

    /// Builds the pool with the specified configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the item size or segment capacity is zero, or if one segment's
    /// storage would exceed the size of virtual memory.
    ///
    /// # Panics
    ///
    /// Panics if no item size has been set using either [`item_size`](Self::item_size) or
    /// [`item_size_of`](Self::item_size_of).
    pub fn build(self) -> Result<SegmentPool> {
        let item_size = self.item_size.expect(
            "item size must be set using .item_size() or .item_size_of::<T>() before calling .build()",
        );

        let item_size = NonZero::new(item_size).ok_or(Error::ZeroItemSize)?;
        let segment_capacity =
            NonZero::new(self.segment_capacity).ok_or(Error::ZeroSegmentCapacity)?;

        let segment_bytes = item_size
            .get()
            .checked_mul(segment_capacity.get())
            .ok_or(Error::SegmentTooLarge {
                item_size: item_size.get(),
                segment_capacity: segment_capacity.get(),
            })?;

        // A single allocation may not exceed isize::MAX bytes.
        if isize::try_from(segment_bytes).is_err() {
            return Err(Error::SegmentTooLarge {
                item_size: item_size.get(),
                segment_capacity: segment_capacity.get(),
            });
        }

        Ok(SegmentPool::new_inner(item_size, segment_capacity))
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;

    assert_impl_all!(SegmentPoolBuilder: Send, std::fmt::Debug);
    assert_not_impl_any!(SegmentPoolBuilder: Sync);

    #[test]
    fn builder_new_creates_default_state() {
        let builder = SegmentPoolBuilder::new();
        assert!(builder.item_size.is_none());
        assert_eq!(builder.segment_capacity, DEFAULT_SEGMENT_CAPACITY);
    }

    #[test]
    fn item_size_of_uses_type_size() {
        let builder = SegmentPoolBuilder::new().item_size_of::<u64>();
        assert_eq!(builder.item_size, Some(8));
    }

    #[test]
    fn settings_can_be_overridden() {
        let pool = SegmentPoolBuilder::new()
            .item_size(4)
            .item_size(12)
            .segment_capacity(3)
            .segment_capacity(5)
            .build()
            .unwrap();

        assert_eq!(pool.item_size(), 12);
        assert_eq!(pool.segment_capacity(), 5);
    }

    #[test]
    fn default_segment_capacity_applies() {
        let pool = SegmentPoolBuilder::new().item_size(1).build().unwrap();
        assert_eq!(pool.segment_capacity(), DEFAULT_SEGMENT_CAPACITY);
    }

    #[test]
    fn zero_item_size_is_error() {
        let result = SegmentPoolBuilder::new().item_size(0).build();
        assert_eq!(result.unwrap_err(), Error::ZeroItemSize);
    }

    #[test]
    fn zero_sized_type_is_error() {
        let result = SegmentPoolBuilder::new().item_size_of::<()>().build();
        assert_eq!(result.unwrap_err(), Error::ZeroItemSize);
    }

    #[test]
    fn zero_segment_capacity_is_error() {
        let result = SegmentPoolBuilder::new()
            .item_size(8)
            .segment_capacity(0)
            .build();
        assert_eq!(result.unwrap_err(), Error::ZeroSegmentCapacity);
    }

    #[test]
    fn overflowing_segment_is_error() {
        let result = SegmentPoolBuilder::new()
            .item_size(usize::MAX / 2)
            .segment_capacity(3)
            .build();
        assert!(matches!(result, Err(Error::SegmentTooLarge { .. })));
    }

    #[test]
    fn segment_beyond_isize_is_error() {
        let result = SegmentPoolBuilder::new()
            .item_size(usize::MAX / 2 + 1)
            .segment_capacity(1)
            .build();
        assert!(matches!(result, Err(Error::SegmentTooLarge { .. })));
    }

    #[test]
    #[should_panic]
    fn build_without_item_size_panics() {
        _ = SegmentPoolBuilder::new().segment_capacity(4).build();
    }

    #[test]
    fn builder_send_trait() {
        let builder = SegmentPoolBuilder::new().item_size(8);
        let handle = std::thread::spawn(move || builder.build());
        let pool = handle.join().expect("thread completed successfully");
        assert!(pool.is_ok());
    }
}
