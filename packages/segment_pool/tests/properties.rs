//! Property tests over arbitrary sequences of pool operations.
#![allow(
    missing_docs,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects,
    reason = "test code, relax"
)]

use proptest::prelude::*;
use segment_pool::{Item, SegmentPool};

#[derive(Clone, Debug)]
enum Op {
    Allocate,
    /// Frees the live item at `selector % live.len()`.
    Free(usize),
    /// Frees the same live item twice in a row.
    FreeTwice(usize),
    /// Frees an arbitrary index that may or may not be live.
    FreeIndex(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => Just(Op::Allocate),
        2 => any::<usize>().prop_map(Op::Free),
        1 => any::<usize>().prop_map(Op::FreeTwice),
        1 => (0_usize..256).prop_map(Op::FreeIndex),
    ]
}

/// Applies the operations, returning the live items with the address each had when allocated.
fn run(pool: &mut SegmentPool, ops: &[Op]) -> Vec<(Item, usize)> {
    let mut live: Vec<(Item, usize)> = Vec::new();

    for op in ops {
        match *op {
            Op::Allocate => {
                let item = pool.allocate();
                let address = pool.lookup(item.index()).unwrap().as_ptr() as usize;
                live.push((item, address));
            }
            Op::Free(selector) if !live.is_empty() => {
                let (item, _) = live.swap_remove(selector % live.len());
                assert!(pool.free(item.index()));
            }
            Op::FreeTwice(selector) if !live.is_empty() => {
                let (item, _) = live.swap_remove(selector % live.len());
                assert!(pool.free(item.index()));
                let len_after_first = pool.len();

                assert!(!pool.free(item.index()));
                assert_eq!(pool.len(), len_after_first);
                assert!(!pool.has(item.index()));
            }
            Op::FreeIndex(index) => {
                let was_live = live.iter().position(|(item, _)| item.index() == index);
                assert_eq!(pool.free(index), was_live.is_some());

                if let Some(position) = was_live {
                    live.swap_remove(position);
                }
            }
            Op::Free(_) | Op::FreeTwice(_) => {}
        }
    }

    live
}

proptest! {
    #[test]
    fn live_items_keep_index_and_address(
        segment_capacity in 1_usize..9,
        ops in prop::collection::vec(op(), 0..300),
    ) {
        let mut pool = SegmentPool::new(4, segment_capacity).unwrap();
        let live = run(&mut pool, &ops);

        prop_assert_eq!(pool.len(), live.len());

        for (item, address) in &live {
            let slot = pool.lookup(item.index()).unwrap();
            prop_assert!(slot.is_occupied());
            prop_assert_eq!(slot.as_ptr() as usize, *address);
            prop_assert!(pool.contains(*item));
        }
    }

    #[test]
    fn live_indexes_are_unique(
        segment_capacity in 1_usize..9,
        ops in prop::collection::vec(op(), 0..300),
    ) {
        let mut pool = SegmentPool::new(2, segment_capacity).unwrap();
        let live = run(&mut pool, &ops);

        let mut indexes: Vec<usize> = live.iter().map(|(item, _)| item.index()).collect();
        indexes.sort_unstable();
        indexes.dedup();
        prop_assert_eq!(indexes.len(), live.len());

        let mut addresses: Vec<usize> = live.iter().map(|(_, address)| *address).collect();
        addresses.sort_unstable();
        addresses.dedup();
        prop_assert_eq!(addresses.len(), live.len());
    }

    #[test]
    fn never_empty_after_first_allocation(
        segment_capacity in 1_usize..6,
        ops in prop::collection::vec(op(), 1..200),
    ) {
        let mut pool = SegmentPool::new(1, segment_capacity).unwrap();
        _ = pool.allocate();
        _ = run(&mut pool, &ops);

        prop_assert!(pool.segment_count() >= 1);
        prop_assert!(pool.capacity() >= pool.len());
    }

    #[test]
    fn freed_items_are_not_present(
        segment_capacity in 1_usize..9,
        count in 1_usize..64,
    ) {
        let mut pool = SegmentPool::new(8, segment_capacity).unwrap();
        let items: Vec<Item> = (0..count).map(|_| pool.allocate()).collect();

        for item in &items {
            prop_assert!(pool.free_item(*item));
            prop_assert!(!pool.has(item.index()));
            prop_assert!(!pool.free_item(*item));
        }

        prop_assert!(pool.is_empty());
        prop_assert_eq!(pool.segment_count(), 1);
    }
}
