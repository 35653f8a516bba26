//! Basic usage of the `segment_pool` crate:
//!
//! * Creating a pool.
//! * Allocating items and writing to them.
//! * Looking items up by their global index.
//! * Freeing items and reusing the holes they leave.

use segment_pool::SegmentPool;

fn main() {
    // Records of 16 bytes, four per segment.
    let mut pool = SegmentPool::new(16, 4).expect("parameters are non-zero");

    let records: Vec<_> = (0..10_u64)
        .map(|id| {
            let item = pool.allocate();
            let bytes = pool.get_mut(item).expect("just allocated");
            bytes[..8].copy_from_slice(&id.to_le_bytes());
            item
        })
        .collect();

    println!(
        "Pool holds {} items in {} segments, capacity {}",
        pool.len(),
        pool.segment_count(),
        pool.capacity()
    );

    // The index is all another component needs to keep to find the record again.
    let fifth = records[5].index();
    let slot = pool.lookup(fifth).expect("index of a live item resolves");
    println!("Record at index {fifth}: {:?}", &slot.bytes()[..8]);

    // Freeing from a middle segment leaves a hole that the next allocation fills.
    pool.free(fifth);
    let refill = pool.allocate();
    println!("Next allocation reused index {}", refill.index());

    // Draining a whole segment releases its memory; other indexes are unaffected.
    for item in &records[..4] {
        pool.free_item(*item);
    }

    println!(
        "After draining the first segment: {} segments, index 0 resolves: {}, index 6 holds: {:?}",
        pool.segment_count(),
        pool.lookup(0).is_some(),
        &pool.lookup(6).expect("still live").bytes()[..8]
    );
}
