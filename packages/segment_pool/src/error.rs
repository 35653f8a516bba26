use thiserror::Error;

/// Errors that can occur when configuring a [`SegmentPool`][crate::SegmentPool].
///
/// Once a pool exists, none of its operations fail: lookups of unknown indexes return `None`
/// and freeing a vacant slot is a no-op.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// The pool was configured with an item size of zero bytes.
    #[error("item size must be at least one byte")]
    ZeroItemSize,

    /// The pool was configured to hold zero items per segment.
    #[error("segment capacity must be at least one item")]
    ZeroSegmentCapacity,

    /// The storage buffer of a single segment would not fit in the address space.
    #[error(
        "a segment of {segment_capacity} items of {item_size} bytes each exceeds the size of virtual memory"
    )]
    SegmentTooLarge {
        /// The configured size of each item, in bytes.
        item_size: usize,

        /// The configured number of items per segment.
        segment_capacity: usize,
    },
}

/// A specialized `Result` type for segment pool configuration, returning the crate's
/// [`Error`] type as the error value.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::fmt::Debug;

    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(Error: Send, Sync, Debug, Clone);

    #[test]
    fn messages_name_the_offending_values() {
        let error = Error::SegmentTooLarge {
            item_size: 3,
            segment_capacity: 7,
        };

        let message = error.to_string();
        assert!(message.contains("7 items"));
        assert!(message.contains("3 bytes"));
    }

    #[test]
    fn zero_errors_are_distinct() {
        assert_ne!(Error::ZeroItemSize, Error::ZeroSegmentCapacity);
        assert!(Error::ZeroItemSize.to_string().contains("item size"));
        assert!(
            Error::ZeroSegmentCapacity
                .to_string()
                .contains("segment capacity")
        );
    }
}
