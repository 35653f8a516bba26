#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! A fixed-item-size object pool with stable addresses and stable integer indexes.
//!
//! This crate provides [`SegmentPool`], a pool of same-sized byte items that grows by chaining
//! fixed-capacity segments instead of reallocating one big buffer. Growth never moves an existing
//! item, so both the address of an item's storage and its global index remain valid until the
//! item is freed, no matter how the pool grows or shrinks in the meantime.
//!
//! # Key Features
//!
//! - **Stable addresses**: Each segment owns one storage buffer that is never reallocated
//! - **Stable indexes**: Every item has a global index usable for lookup until it is freed
//! - **Hole reuse**: Slots freed from earlier segments are refilled before the pool grows
//! - **Prompt reclamation**: A segment is released as soon as its last item is freed
//! - **Idempotent free**: Freeing a vacant slot is a harmless no-op
//! - **Absence is normal**: Looking up an unknown index returns `None` instead of failing
//!
//! # Structure
//!
//! ```text
//! SegmentPool
//! ├── segment table (owning, indexed by segment ordinal)
//! │   └── Segment × N
//! │       ├── storage: capacity × item_size bytes
//! │       └── slots: occupancy + local index + owning ordinal
//! └── chain: head ⇄ … ⇄ tail (links are ordinals, never owners)
//!     ├── alloc cursor = tail (allocation fast path)
//!     └── fallback cursor = tail's predecessor (recoil target)
//! ```
//!
//! A global index is `ordinal * segment_capacity + local_index`. The ordinal is a tag fixed when
//! the segment is created rather than its position in the chain, so retiring a segment never
//! shifts the indexes of other segments.
//!
//! # Examples
//!
//! ```rust
//! use segment_pool::SegmentPool;
//!
//! let mut pool = SegmentPool::new(8, 4).unwrap();
//!
//! // Ten items span three segments.
//! let items: Vec<_> = (0..10).map(|_| pool.allocate()).collect();
//! assert_eq!(pool.segment_count(), 3);
//!
//! // Freeing from a middle segment leaves a hole that the next allocation fills.
//! pool.free(5);
//! let refill = pool.allocate();
//! assert_eq!(refill.index(), 5);
//!
//! assert!(pool.has(5));
//! assert!(!pool.has(10));
//! # drop(items);
//! ```
//!
//! Item storage is a byte slice of exactly the configured item size:
//!
//! ```rust
//! use segment_pool::SegmentPool;
//!
//! let mut pool = SegmentPool::builder().item_size_of::<u32>().build().unwrap();
//!
//! let item = pool.allocate();
//! pool.get_mut(item).unwrap().copy_from_slice(&7_u32.to_ne_bytes());
//!
//! let bytes = pool.get(item).unwrap();
//! assert_eq!(u32::from_ne_bytes(bytes.try_into().unwrap()), 7);
//! ```
//!
//! # Thread safety
//!
//! The pool performs no internal synchronization. It can be moved between threads, and all
//! mutation requires exclusive access, so sharing it between threads requires an external lock.

mod builder;
mod coordinates;
mod error;
mod item;
mod pool;
mod segment;
mod slot;

pub use builder::*;
pub(crate) use coordinates::*;
pub use error::*;
pub use item::*;
pub use pool::SegmentPool;
pub(crate) use segment::*;
pub use slot::{SlotMut, SlotRef};
pub(crate) use slot::Slot;
