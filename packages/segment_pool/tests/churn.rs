//! Random allocate/free churn, checking the pool against a simple model after every step.
#![allow(
    missing_docs,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects,
    reason = "test code, relax"
)]

use std::collections::BTreeMap;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use segment_pool::{Item, SegmentPool};

const OPERATIONS: usize = 10_000;

/// Every live item holds a unique stamp so that aliasing between items would be detected.
fn check(pool: &SegmentPool, model: &BTreeMap<usize, (Item, u64)>) {
    assert_eq!(pool.len(), model.len());
    assert_eq!(pool.iter().count(), model.len());
    assert!(pool.segment_count() >= 1);
    assert!(pool.capacity() >= pool.len());

    for (&index, &(item, stamp)) in model {
        let slot = pool
            .lookup(index)
            .unwrap_or_else(|| panic!("live index {index} did not resolve"));
        assert!(slot.is_occupied(), "live index {index} is not occupied");
        assert_eq!(slot.bytes(), &stamp.to_le_bytes());
        assert_eq!(pool.get(item), Some(&stamp.to_le_bytes()[..]));
    }

    for (index, bytes) in pool.iter() {
        let (_, stamp) = model
            .get(&index)
            .unwrap_or_else(|| panic!("pool iterates over index {index} that is not live"));
        assert_eq!(bytes, &stamp.to_le_bytes());
    }
}

fn churn(seed: u64, segment_capacity: usize, allocate_probability: f64) {
    let mut rng = SmallRng::seed_from_u64(seed);
    let mut pool = SegmentPool::new(8, segment_capacity).unwrap();
    let mut model: BTreeMap<usize, (Item, u64)> = BTreeMap::new();
    let mut freed: Vec<usize> = Vec::new();
    let mut next_stamp: u64 = 1;

    for _ in 0..OPERATIONS {
        let roll: f64 = rng.random();

        if model.is_empty() || roll < allocate_probability {
            let item = pool.allocate();
            assert!(
                !model.contains_key(&item.index()),
                "index {} handed out while still live",
                item.index()
            );

            let bytes = pool.get_mut(item).unwrap();
            assert_eq!(bytes, &[0; 8], "fresh allocation is not zeroed");
            bytes.copy_from_slice(&next_stamp.to_le_bytes());

            model.insert(item.index(), (item, next_stamp));
            next_stamp += 1;
        } else if roll < allocate_probability + 0.05 && !freed.is_empty() {
            // Freeing an index that is no longer live must change nothing.
            let index = freed[rng.random_range(0..freed.len())];
            if !model.contains_key(&index) {
                assert!(!pool.free(index));
                assert!(!pool.has(index));
            }
        } else {
            let position = rng.random_range(0..model.len());
            let index = *model.keys().nth(position).unwrap();
            let (item, _) = model.remove(&index).unwrap();

            if rng.random_bool(0.5) {
                assert!(pool.free(index));
            } else {
                assert!(pool.free_item(item));
            }

            assert!(!pool.has(index));
            assert!(!pool.contains(item));
            freed.push(index);
        }

        check(&pool, &model);
    }
}

#[test]
fn balanced_churn() {
    churn(0x5EED, 4, 0.5);
}

#[test]
fn growing_churn() {
    churn(42, 8, 0.6);
}

#[test]
fn shrinking_churn() {
    // Mostly frees after an initial fill, exercising segment retirement everywhere in the chain.
    churn(7, 3, 0.45);
}

#[test]
fn churn_with_single_item_segments() {
    churn(1234, 1, 0.5);
}

#[test]
fn churn_with_default_capacity() {
    let mut rng = SmallRng::seed_from_u64(99);
    let mut pool = SegmentPool::builder().item_size(8).build().unwrap();
    let mut live: Vec<Item> = Vec::new();

    for _ in 0..OPERATIONS {
        if live.is_empty() || rng.random_bool(0.55) {
            live.push(pool.allocate());
        } else {
            let position = rng.random_range(0..live.len());
            let item = live.swap_remove(position);
            assert!(pool.free_item(item));
        }

        assert_eq!(pool.len(), live.len());
    }

    for item in live.drain(..) {
        assert!(pool.free_item(item));
    }

    assert!(pool.is_empty());
    assert_eq!(pool.segment_count(), 1);
}

#[test]
fn large_pool_allocates_and_frees_in_linear_time() {
    // Per-operation checks must stay local to one segment; a pool-wide walk per operation
    // would make this loop quadratic in debug builds.
    const ITEMS: usize = 200_000;

    let mut pool = SegmentPool::new(8, 128).unwrap();
    let items: Vec<Item> = (0..ITEMS).map(|_| pool.allocate()).collect();
    assert_eq!(pool.len(), ITEMS);
    assert_eq!(pool.segment_count(), ITEMS.div_ceil(128));

    for item in items {
        assert!(pool.free_item(item));
    }

    assert!(pool.is_empty());
    assert_eq!(pool.segment_count(), 1);
}
