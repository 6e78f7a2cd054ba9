//! Region tests
//!
//! Organized by component:
//! - Creation: parameter validation and rounding
//! - Allocation: placement, reuse, exact fits
//! - Deallocation: coalescing and protocol misuse
//! - Reallocation: in place, migration, failure paths
//! - Growth and Clear: block lifecycle
//! - Verification and Statistics

use super::*;

fn region(block_size: usize) -> Region {
    Region::create("test", block_size, 0).expect("region")
}

fn slot(offset: usize, size: usize, free: bool) -> SlotInfo {
    SlotInfo { offset, size, free }
}

fn fill(ptr: NonNull<u8>, byte: u8, len: usize) {
    // SAFETY: callers pass a live allocation of at least len bytes.
    unsafe { core::ptr::write_bytes(ptr.as_ptr(), byte, len) };
}

fn holds(ptr: NonNull<u8>, byte: u8, len: usize) -> bool {
    // SAFETY: callers pass a live allocation of at least len bytes.
    let bytes = unsafe { core::slice::from_raw_parts(ptr.as_ptr(), len) };
    bytes.iter().all(|&b| b == byte)
}

// ===== Creation Tests =====

#[test]
fn create_starts_with_one_free_block() {
    let region = region(1024);
    assert_eq!(region.name(), "test");
    assert_eq!(region.block_count(), 1);
    assert_eq!(region.block_free(0), Some(1024));
    assert_eq!(region.block_slot_count(0), Some(1));
    assert_eq!(region.slots(0), Some(vec![slot(0, 1024, true)]));
    assert_eq!(region.block_free(1), None);
    assert!(region.verify().is_ok());
}

#[test]
fn create_rounds_block_size_to_alignment() {
    let region = region(1001);
    assert_eq!(region.block_size(), 1008);
    assert_eq!(region.block_free(0), Some(1008));
}

#[test]
fn max_size_rounds_up_to_whole_blocks() {
    let region = Region::create("capped", 1024, 2500).expect("region");
    assert_eq!(region.max_blocks(), 3);

    let region = Region::create("exact", 1024, 2048).expect("region");
    assert_eq!(region.max_blocks(), 2);

    assert_eq!(Region::create("unbounded", 1024, 0).expect("region").max_blocks(), 0);
}

#[test]
fn max_blocks_uses_the_requested_block_size() {
    // 1008 / 1001 needs two blocks even though blocks are rounded to 1008.
    let mut region = Region::create("unaligned", 1001, 1008).expect("region");
    assert_eq!(region.block_size(), 1008);
    assert_eq!(region.max_blocks(), 2);

    assert!(region.allocate(900).is_some());
    assert!(region.allocate(900).is_some());
    assert_eq!(region.block_count(), 2);
    assert!(region.allocate(900).is_none());
}

#[test]
fn create_rejects_bad_parameters() {
    assert_eq!(Region::create("", 1024, 0).unwrap_err(), RegionError::MissingName);
    assert_eq!(Region::create("r", 0, 0).unwrap_err(), RegionError::ZeroBlockSize);
    assert_eq!(
        Region::create("r", 16, 0).unwrap_err(),
        RegionError::BlockSizeTooSmall { size: 16, min: MIN_SLOT_SIZE }
    );
    assert!(matches!(
        Region::create("r", usize::MAX, 0),
        Err(RegionError::BlockSizeTooLarge { .. })
    ));
}

#[test]
fn from_config_applies_every_field() {
    let config = RegionConfig {
        name: "configured".to_string(),
        block_size: 4096,
        max_size: 8192,
        verify: true,
    };
    let mut region = Region::from_config(&config).expect("region");
    assert_eq!(region.name(), "configured");
    assert_eq!(region.block_size(), 4096);
    assert_eq!(region.max_blocks(), 2);

    // Runs the checker after every step; the region must stay consistent.
    let ptr = region.allocate(300);
    assert!(ptr.is_some());
    region.free(ptr);
    assert!(region.verify().is_ok());
}

// ===== Allocation Tests =====

#[test]
fn allocate_splits_the_free_slot() {
    let mut region = region(1024);
    let ptr = region.allocate(100).expect("alloc");

    assert_eq!(region.usable_size(ptr), Some(104));
    assert_eq!(region.block_free(0), Some(904));
    assert_eq!(region.slots(0), Some(vec![slot(0, 120, false), slot(120, 904, true)]));
    assert!(region.verify().is_ok());
}

#[test]
fn allocations_are_aligned_and_disjoint() {
    let mut region = region(8192);
    let sizes = [1usize, 7, 8, 9, 16, 33, 100, 255, 513, 1000];

    let ptrs: Vec<_> = sizes
        .iter()
        .enumerate()
        .map(|(i, &size)| {
            let ptr = region.allocate(size).expect("alloc");
            assert_eq!(ptr.as_ptr() as usize % ALIGNMENT, 0, "size {} misaligned", size);
            fill(ptr, i as u8, size);
            ptr
        })
        .collect();

    for (i, (&ptr, &size)) in ptrs.iter().zip(&sizes).enumerate() {
        assert!(holds(ptr, i as u8, size), "allocation {} was overwritten", i);
    }
    assert!(region.verify().is_ok());
}

#[test]
fn zero_size_returns_none() {
    let mut region = region(1024);
    assert_eq!(region.try_allocate(0), Err(RegionError::ZeroSize));
    assert!(region.allocate(0).is_none());
    assert_eq!(region.block_free(0), Some(1024));
}

#[test]
fn oversized_request_creates_no_block() {
    let mut region = region(1024);
    assert!(region.allocate(2048).is_none());
    assert_eq!(
        region.try_allocate(1009),
        Err(RegionError::RequestTooLarge { requested: 1009, block_size: 1024 })
    );
    assert_eq!(region.block_count(), 1);
}

#[test]
fn largest_request_fills_a_block() {
    let mut region = region(1024);
    let ptr = region.allocate(1024 - HEADER_SIZE).expect("alloc");
    assert_eq!(region.block_free(0), Some(0));
    assert_eq!(region.block_slot_count(0), Some(1));
    region.free(Some(ptr));
    assert_eq!(region.block_free(0), Some(1024));
}

#[test]
fn small_remainder_is_absorbed() {
    let mut region = region(1024);
    // 1000-byte slot leaves 24 bytes, too small to split off.
    let ptr = region.allocate(984).expect("alloc");
    assert_eq!(region.usable_size(ptr), Some(1008));
    assert_eq!(region.block_free(0), Some(0));
    assert_eq!(region.block_slot_count(0), Some(1));
    assert!(region.verify().is_ok());
}

#[test]
fn freed_slot_is_reused() {
    let mut region = region(1024);
    let a = region.allocate(50).expect("a");
    let _b = region.allocate(60).expect("b");
    region.free(Some(a));

    let c = region.allocate(50).expect("c");
    assert_eq!(a, c);
    assert!(region.verify().is_ok());
}

#[test]
fn minimum_block_holds_one_small_allocation() {
    let mut region = region(MIN_SLOT_SIZE);
    let a = region.allocate(8).expect("a");
    assert_eq!(region.block_free(0), Some(0));

    let b = region.allocate(8).expect("b");
    assert_ne!(a, b);
    assert_eq!(region.block_count(), 2);

    assert!(matches!(region.try_allocate(9), Err(RegionError::RequestTooLarge { .. })));
}

// ===== Deallocation Tests =====

#[test]
fn free_restores_the_block() {
    let mut region = region(1024);
    let ptr = region.allocate(100);
    region.free(ptr);
    assert_eq!(region.block_free(0), Some(1024));
    assert_eq!(region.slots(0), Some(vec![slot(0, 1024, true)]));
}

#[test]
fn free_none_is_a_no_op() {
    let mut region = region(1024);
    region.free(None);
    assert_eq!(region.block_free(0), Some(1024));
}

#[test]
fn free_merges_backward_and_forward() {
    let mut region = region(1024);
    let a = region.allocate(100).expect("a");
    let b = region.allocate(100).expect("b");
    let c = region.allocate(100).expect("c");

    region.free(Some(a));
    region.free(Some(b));
    assert_eq!(
        region.slots(0),
        Some(vec![slot(0, 240, true), slot(240, 120, false), slot(360, 664, true)])
    );
    assert_eq!(region.block_free(0), Some(904));
    assert!(region.verify().is_ok());

    region.free(Some(c));
    assert_eq!(region.slots(0), Some(vec![slot(0, 1024, true)]));
    assert!(region.verify().is_ok());
}

#[test]
fn double_free_is_rejected_without_mutation() {
    let mut region = region(1024);
    let a = region.allocate(100).expect("a");
    let _b = region.allocate(100).expect("b");

    region.try_free(a).expect("first free");
    let before = region.stats();
    let slots = region.slots(0);

    assert_eq!(region.try_free(a), Err(RegionError::DoubleFree { addr: a.as_ptr() as usize }));
    region.free(Some(a));

    assert_eq!(region.stats(), before);
    assert_eq!(region.slots(0), slots);
    assert!(region.verify().is_ok());
}

#[test]
fn foreign_pointer_is_rejected() {
    let mut region = region(1024);
    let mut local = 0u64;
    let foreign = NonNull::from(&mut local).cast::<u8>();

    let err = region.try_free(foreign).unwrap_err();
    assert_eq!(err, RegionError::ForeignPointer { addr: foreign.as_ptr() as usize });
    assert_eq!(err.category(), crate::error::ErrorCategory::ProtocolMisuse);
    assert!(!region.owns(foreign));
}

#[test]
fn interior_pointer_is_not_freed() {
    let mut region = region(1024);
    let a = region.allocate(100).expect("a");
    // SAFETY: stays inside the 104-byte payload.
    let inner = unsafe { NonNull::new_unchecked(a.as_ptr().add(8)) };

    assert!(matches!(region.try_free(inner), Err(RegionError::DoubleFree { .. })));
    assert!(region.owns(a));
    assert_eq!(region.block_free(0), Some(904));
}

#[test]
fn freed_pointer_is_no_longer_owned() {
    let mut region = region(1024);
    let a = region.allocate(64).expect("a");
    assert!(region.owns(a));
    region.free(Some(a));
    assert!(!region.owns(a));
    assert_eq!(region.usable_size(a), None);
}

// ===== Reallocation Tests =====

#[test]
fn reallocate_none_allocates() {
    let mut region = region(1024);
    let ptr = region.reallocate(None, 64).expect("alloc");
    assert!(region.owns(ptr));
}

#[test]
fn reallocate_to_zero_keeps_the_allocation() {
    let mut region = region(1024);
    let ptr = region.allocate(64).expect("alloc");
    assert!(region.reallocate(Some(ptr), 0).is_none());
    assert_eq!(region.try_reallocate(Some(ptr), 0), Err(RegionError::ZeroSize));
    assert!(region.owns(ptr));
}

#[test]
fn reallocate_shrink_returns_same_pointer() {
    let mut region = region(1024);
    let ptr = region.allocate(200).expect("alloc");
    assert_eq!(region.reallocate(Some(ptr), 50), Some(ptr));
    assert_eq!(region.usable_size(ptr), Some(200));
}

#[test]
fn reallocate_grows_into_free_neighbour() {
    let mut region = region(1024);
    let _a = region.allocate(100).expect("a");
    let b = region.allocate(100).expect("b");
    fill(b, 0x5A, 100);

    assert_eq!(region.reallocate(Some(b), 200), Some(b));
    assert_eq!(region.usable_size(b), Some(200));
    assert!(holds(b, 0x5A, 100));
    assert_eq!(
        region.slots(0),
        Some(vec![slot(0, 120, false), slot(120, 216, false), slot(336, 688, true)])
    );
    assert!(region.verify().is_ok());
}

#[test]
fn reallocate_migrates_past_occupied_neighbour() {
    let mut region = region(1024);
    let a = region.allocate(100).expect("a");
    let _b = region.allocate(100).expect("b");
    fill(a, 0xA5, 100);

    let moved = region.reallocate(Some(a), 200).expect("realloc");
    assert_ne!(moved, a);
    assert!(holds(moved, 0xA5, 100));
    assert!(!region.owns(a));
    assert_eq!(region.slots(0).map(|slots| slots[0]), Some(slot(0, 120, true)));
    assert!(region.verify().is_ok());
}

#[test]
fn failed_reallocate_leaves_the_old_allocation() {
    let mut region = Region::create("capped", 1024, 1024).expect("region");
    let a = region.allocate(400).expect("a");
    let _b = region.allocate(100).expect("b");
    fill(a, 0x11, 400);

    assert!(region.reallocate(Some(a), 600).is_none());
    assert_eq!(
        region.try_reallocate(Some(a), 600),
        Err(RegionError::OutOfMemory { requested: 616, blocks: 1 })
    );
    assert!(region.owns(a));
    assert!(holds(a, 0x11, 400));
    assert!(region.verify().is_ok());
}

#[test]
fn reallocate_beyond_block_size_fails() {
    let mut region = region(1024);
    let a = region.allocate(100).expect("a");
    assert!(matches!(
        region.try_reallocate(Some(a), 2000),
        Err(RegionError::RequestTooLarge { .. })
    ));
    assert!(region.owns(a));
}

#[test]
fn reallocate_stale_pointer_is_rejected() {
    let mut region = region(1024);
    let a = region.allocate(100).expect("a");
    region.free(Some(a));
    assert_eq!(
        region.try_reallocate(Some(a), 200),
        Err(RegionError::NotLive { addr: a.as_ptr() as usize })
    );
}

#[test]
fn reallocate_interior_pointer_is_not_live() {
    let mut region = region(1024);
    let a = region.allocate(100).expect("a");
    // SAFETY: stays inside the 104-byte payload.
    let inner = unsafe { NonNull::new_unchecked(a.as_ptr().add(16)) };

    let err = region.try_reallocate(Some(inner), 200).unwrap_err();
    assert_eq!(err, RegionError::NotLive { addr: inner.as_ptr() as usize });
    assert_eq!(err.category(), crate::error::ErrorCategory::ProtocolMisuse);
    assert!(region.owns(a));
    assert_eq!(region.usable_size(a), Some(104));
}

// ===== Growth Tests =====

#[test]
fn growth_stops_at_the_cap() {
    let mut region = Region::create("capped", 1024, 3072).expect("region");
    let ptrs: Vec<_> = (0..3).map(|_| region.allocate(500).expect("alloc")).collect();
    assert_eq!(region.block_count(), 3);

    assert!(region.allocate(500).is_none());
    assert_eq!(
        region.try_allocate(500),
        Err(RegionError::OutOfMemory { requested: 520, blocks: 3 })
    );
    assert_eq!(region.block_count(), 3);

    // Space freed in an old block is found again without growing.
    region.free(Some(ptrs[1]));
    assert!(region.allocate(500).is_some());
    assert_eq!(region.block_count(), 3);
}

#[test]
fn unbounded_region_keeps_growing() {
    let mut region = region(1024);
    for _ in 0..(BLOCK_ARRAY_STEP + 4) {
        assert!(region.allocate(600).is_some());
    }
    assert_eq!(region.block_count(), BLOCK_ARRAY_STEP + 4);
    assert!(region.verify().is_ok());
}

// ===== Clear Tests =====

#[test]
fn clear_resets_every_block() {
    let mut region = region(1024);
    for _ in 0..5 {
        region.allocate(700);
    }
    assert_eq!(region.block_count(), 5);

    region.clear();
    for index in 0..5 {
        assert_eq!(region.block_free(index), Some(1024));
        assert_eq!(region.block_slot_count(index), Some(1));
    }
    assert_eq!(region.stats().live_allocations, 0);
    assert!(region.verify().is_ok());
}

#[test]
fn clear_is_idempotent() {
    let mut region = region(2048);
    region.allocate(100);
    region.clear();
    let once = region.stats();
    region.clear();
    assert_eq!(region.stats(), once);
}

#[test]
fn pointers_from_before_clear_are_stale() {
    let mut region = region(1024);
    let a = region.allocate(100).expect("a");
    region.clear();
    assert!(matches!(region.try_free(a), Err(RegionError::DoubleFree { .. })));
    assert_eq!(region.block_free(0), Some(1024));
}

// ===== Verification Tests =====

#[test]
fn verify_detects_a_smashed_header() {
    let mut region = region(1024);
    let a = region.allocate(100).expect("a");
    // SAFETY: the header sits HEADER_SIZE bytes before the payload, inside the block.
    unsafe { core::ptr::write_bytes(a.as_ptr().sub(HEADER_SIZE), 0, 4) };

    assert!(matches!(region.verify(), Err(RegionError::Corrupted { block: 0, .. })));
}

#[test]
fn verify_detects_broken_accounting() {
    let mut region = region(1024);
    let a = region.allocate(100).expect("a");
    // Mark the occupied slot free behind the region's back.
    // SAFETY: the free flag is byte 8 of the header.
    unsafe { *a.as_ptr().sub(HEADER_SIZE - 8) = 1 };

    let err = region.verify().unwrap_err();
    assert_eq!(err.category(), crate::error::ErrorCategory::Corruption);
}

// ===== Statistics Tests =====

#[test]
fn stats_track_allocations() {
    let mut region = region(1024);
    let _a = region.allocate(100).expect("a");
    let _b = region.allocate(200).expect("b");

    let stats = region.stats();
    assert_eq!(stats.block_count, 1);
    assert_eq!(stats.capacity, 1024);
    assert_eq!(stats.free_bytes, 1024 - 120 - 216);
    assert_eq!(stats.slot_count, 3);
    assert_eq!(stats.free_slots, 1);
    assert_eq!(stats.live_allocations, 2);
    assert_eq!(stats.largest_free_slot, 688);
}

#[test]
fn debug_output_names_the_region() {
    let region = Region::create("level-7", 1024, 0).expect("region");
    let debug = format!("{:?}", region);
    assert!(debug.contains("level-7"));
    assert!(debug.contains("block_count: 1"));
}
