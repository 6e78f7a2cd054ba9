//! Memory regions - named, block-segmented allocators
//!
//! Design: Three-layer architecture:
//! 1. Bin search inside a block (fast path, O(bins) per block)
//! 2. Block scan across the region, cheapest pre-filter first
//! 3. Block growth from the host allocator (slow path, capped)
//!
//! Not thread-safe. Wrap in [`SharedRegion`](crate::sync::SharedRegion) or
//! keep one region per thread.

mod block;
mod header;
mod verify;

#[cfg(test)]
mod tests;

pub use header::{
    align_up, bin_for_size, slot_size_for, ALIGNMENT, BIN_COUNT, HEADER_SIZE, MAX_BLOCK_SIZE,
    MIN_SLOT_SIZE, MIN_SPLIT_SIZE,
};

use std::collections::HashMap;
use core::ptr::NonNull;

use serde::Serialize;

use crate::config::RegionConfig;
use crate::error::{RegionError, RegionResult};
use crate::logging;
use block::Block;
use header::BLOCK_ARRAY_STEP;

/// Where an issued pointer lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Placement {
    block: usize,
    offset: u32,
}

/// Public view of one slot in a block's header chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SlotInfo {
    /// Offset of the header from the block start.
    pub offset: usize,
    /// Slot size including header.
    pub size: usize,
    pub free: bool,
}

/// Region statistics for monitoring and debugging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RegionStats {
    pub block_count: usize,
    pub block_size: usize,
    /// 0 when unbounded.
    pub max_blocks: usize,
    /// `block_count * block_size`.
    pub capacity: usize,
    /// Free bytes across all blocks, headers of free slots included.
    pub free_bytes: usize,
    pub slot_count: usize,
    pub free_slots: usize,
    pub live_allocations: usize,
    pub largest_free_slot: usize,
}

/// A named allocator owning one or more equally sized blocks
pub struct Region {
    name: String,
    blocks: Vec<Block>,
    block_size: usize,
    max_blocks: usize,
    /// Issued payload address -> slot location.
    live: HashMap<usize, Placement>,
    verify: bool,
}

impl Region {
    /// Create a region and its first block.
    ///
    /// `block_size` is rounded up to [`ALIGNMENT`]. `max_size` caps the total
    /// size at `ceil(max_size / block_size)` blocks; 0 leaves it unbounded.
    pub fn create(name: &str, block_size: usize, max_size: usize) -> RegionResult<Self> {
        Self::build(name, block_size, max_size, false).map_err(|err| {
            logging::log_create_failed(name, block_size, &err);
            err
        })
    }

    /// Create a region from its configuration section.
    pub fn from_config(config: &RegionConfig) -> RegionResult<Self> {
        Self::build(&config.name, config.block_size, config.max_size, config.verify).map_err(|err| {
            logging::log_create_failed(&config.name, config.block_size, &err);
            err
        })
    }

    fn build(name: &str, block_size: usize, max_size: usize, verify: bool) -> RegionResult<Self> {
        if name.is_empty() {
            return Err(RegionError::MissingName);
        }
        if block_size == 0 {
            return Err(RegionError::ZeroBlockSize);
        }
        // The cap counts blocks of the requested size, before alignment.
        let max_blocks = if max_size > 0 { max_size.div_ceil(block_size) } else { 0 };
        let block_size = align_up(block_size)
            .filter(|&size| size <= MAX_BLOCK_SIZE)
            .ok_or(RegionError::BlockSizeTooLarge { size: block_size, max: MAX_BLOCK_SIZE })?;
        if block_size < MIN_SLOT_SIZE {
            return Err(RegionError::BlockSizeTooSmall { size: block_size, min: MIN_SLOT_SIZE });
        }

        let mut region = Self {
            name: name.to_string(),
            blocks: Vec::new(),
            block_size,
            max_blocks,
            live: HashMap::new(),
            verify,
        };
        region.add_block()?;
        logging::log_region_created(&region.name, block_size, max_blocks);
        region.check();
        Ok(region)
    }

    /// Release every block and the region itself.
    pub fn destroy(self) {
        drop(self);
    }

    /// Reset every block to a single free slot, keeping the memory.
    ///
    /// Every pointer previously returned by this region becomes invalid.
    pub fn clear(&mut self) {
        for block in &mut self.blocks {
            block.reset();
        }
        self.live.clear();
        logging::log_region_cleared(&self.name, self.blocks.len());
        self.check();
    }

    /// Allocate `size` bytes, `None` on failure.
    ///
    /// Zero-sized requests return `None` without logging; every other
    /// failure is logged under the region's name.
    pub fn allocate(&mut self, size: usize) -> Option<NonNull<u8>> {
        match self.try_allocate(size) {
            Ok(ptr) => Some(ptr),
            Err(err) => {
                self.report(&err);
                None
            }
        }
    }

    /// Allocate `size` bytes, 8-byte aligned.
    pub fn try_allocate(&mut self, size: usize) -> RegionResult<NonNull<u8>> {
        if size == 0 {
            return Err(RegionError::ZeroSize);
        }
        let slot_size = self.slot_size(size)?;

        for index in 0..self.blocks.len() {
            if (self.blocks[index].size_free() as usize) < slot_size {
                continue;
            }
            if let Some(ptr) = self.place(index, slot_size) {
                return Ok(ptr);
            }
        }

        // Slow path: a fresh block always fits anything up to block_size.
        if self.can_grow() {
            self.add_block()?;
            if let Some(ptr) = self.place(self.blocks.len() - 1, slot_size) {
                return Ok(ptr);
            }
        }

        Err(RegionError::OutOfMemory { requested: slot_size, blocks: self.blocks.len() })
    }

    /// Resize an allocation, `None` on failure.
    ///
    /// `ptr == None` allocates. `size == 0` returns `None` and leaves `ptr`
    /// allocated; free it separately. On any failure the old allocation is
    /// untouched.
    pub fn reallocate(&mut self, ptr: Option<NonNull<u8>>, size: usize) -> Option<NonNull<u8>> {
        match self.try_reallocate(ptr, size) {
            Ok(ptr) => Some(ptr),
            Err(err) => {
                self.report(&err);
                None
            }
        }
    }

    /// Resize an allocation, growing in place when the next slot is free.
    pub fn try_reallocate(&mut self, ptr: Option<NonNull<u8>>, size: usize) -> RegionResult<NonNull<u8>> {
        let Some(ptr) = ptr else {
            return self.try_allocate(size);
        };
        if size == 0 {
            return Err(RegionError::ZeroSize);
        }
        let slot_size = self.slot_size(size)?;
        let placement = self.lookup(ptr)?;

        let block = &mut self.blocks[placement.block];
        let old_size = block.header(placement.offset).size as usize;
        if old_size >= slot_size {
            return Ok(ptr);
        }
        if block.grow_in_place(placement.offset, slot_size as u32) {
            logging::log_reallocation(&self.name, size, ptr.as_ptr(), true);
            self.check();
            return Ok(ptr);
        }

        // Migrate: the old slot stays intact until the new one exists.
        let new_ptr = self.try_allocate(size)?;
        let copy_len = old_size.min(slot_size) - HEADER_SIZE;
        // SAFETY: both payloads are live, at least copy_len bytes long, and
        // belong to distinct slots.
        unsafe {
            core::ptr::copy_nonoverlapping(ptr.as_ptr(), new_ptr.as_ptr(), copy_len);
        }
        self.release(ptr, placement);
        logging::log_reallocation(&self.name, size, new_ptr.as_ptr(), false);
        Ok(new_ptr)
    }

    /// Free an allocation. `None` is a no-op; double frees are logged and ignored.
    pub fn free(&mut self, ptr: Option<NonNull<u8>>) {
        let Some(ptr) = ptr else {
            return;
        };
        if let Err(err) = self.try_free(ptr) {
            self.report(&err);
        }
    }

    /// Free an allocation, reporting protocol misuse instead of logging it.
    pub fn try_free(&mut self, ptr: NonNull<u8>) -> RegionResult<()> {
        let placement = self.lookup(ptr).map_err(|err| match err {
            RegionError::NotLive { addr } => RegionError::DoubleFree { addr },
            other => other,
        })?;
        self.release(ptr, placement);
        Ok(())
    }

    /// Payload bytes available behind `ptr`, `None` if it isn't live.
    pub fn usable_size(&self, ptr: NonNull<u8>) -> Option<usize> {
        let placement = self.live.get(&(ptr.as_ptr() as usize))?;
        let header = self.blocks[placement.block].header(placement.offset);
        Some(header.size as usize - HEADER_SIZE)
    }

    /// Whether `ptr` is a live allocation of this region.
    pub fn owns(&self, ptr: NonNull<u8>) -> bool {
        self.live.contains_key(&(ptr.as_ptr() as usize))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Block cap, 0 when unbounded.
    pub fn max_blocks(&self) -> usize {
        self.max_blocks
    }

    /// Free bytes recorded for block `index`.
    pub fn block_free(&self, index: usize) -> Option<usize> {
        self.blocks.get(index).map(|block| block.size_free() as usize)
    }

    /// Slot count recorded for block `index`.
    pub fn block_slot_count(&self, index: usize) -> Option<usize> {
        self.blocks.get(index).map(|block| block.count() as usize)
    }

    /// The header chain of block `index`, in address order.
    pub fn slots(&self, index: usize) -> Option<Vec<SlotInfo>> {
        let block = self.blocks.get(index)?;
        Some(
            block
                .slots()
                .map(|(offset, header)| SlotInfo {
                    offset: offset as usize,
                    size: header.size as usize,
                    free: header.is_free(),
                })
                .collect(),
        )
    }

    /// Get region statistics
    pub fn stats(&self) -> RegionStats {
        let mut stats = RegionStats {
            block_count: self.blocks.len(),
            block_size: self.block_size,
            max_blocks: self.max_blocks,
            capacity: self.blocks.len() * self.block_size,
            free_bytes: 0,
            slot_count: 0,
            free_slots: 0,
            live_allocations: self.live.len(),
            largest_free_slot: 0,
        };
        for block in &self.blocks {
            stats.free_bytes += block.size_free() as usize;
            stats.slot_count += block.count() as usize;
            for (_, header) in block.slots().filter(|(_, header)| header.is_free()) {
                stats.free_slots += 1;
                stats.largest_free_slot = stats.largest_free_slot.max(header.size as usize);
            }
        }
        stats
    }

    fn slot_size(&self, size: usize) -> RegionResult<usize> {
        slot_size_for(size)
            .filter(|&slot_size| slot_size <= self.block_size)
            .ok_or(RegionError::RequestTooLarge { requested: size, block_size: self.block_size })
    }

    fn can_grow(&self) -> bool {
        self.max_blocks == 0 || self.blocks.len() < self.max_blocks
    }

    /// Try to carve `slot_size` bytes out of block `index`.
    fn place(&mut self, index: usize, slot_size: usize) -> Option<NonNull<u8>> {
        let block = &mut self.blocks[index];
        let offset = block.find_fit(slot_size as u32)?;
        block.take(offset, slot_size as u32);

        let ptr = block.payload(offset);
        self.live.insert(ptr.as_ptr() as usize, Placement { block: index, offset });
        logging::log_allocation(&self.name, slot_size, ptr.as_ptr());
        self.check();
        Some(ptr)
    }

    fn release(&mut self, ptr: NonNull<u8>, placement: Placement) {
        self.live.remove(&(ptr.as_ptr() as usize));
        let block = &mut self.blocks[placement.block];
        let size = block.header(placement.offset).size as usize;
        block.release(placement.offset);
        logging::log_deallocation(&self.name, size, ptr.as_ptr());
        self.check();
    }

    /// Resolve a caller pointer, classifying the failure when it isn't live.
    fn lookup(&self, ptr: NonNull<u8>) -> RegionResult<Placement> {
        let addr = ptr.as_ptr() as usize;
        if let Some(&placement) = self.live.get(&addr) {
            return Ok(placement);
        }
        // Newest blocks first, matching growth order.
        if self.blocks.iter().rev().any(|block| block.contains(addr)) {
            Err(RegionError::NotLive { addr })
        } else {
            Err(RegionError::ForeignPointer { addr })
        }
    }

    fn add_block(&mut self) -> RegionResult<()> {
        if self.blocks.len() == self.blocks.capacity() {
            let capacity = self.blocks.capacity() + BLOCK_ARRAY_STEP;
            self.blocks.try_reserve_exact(BLOCK_ARRAY_STEP).map_err(|_| {
                RegionError::HostAllocationFailed {
                    bytes: capacity * core::mem::size_of::<Block>(),
                }
            })?;
        }

        let block = Block::new(self.block_size)
            .ok_or(RegionError::HostAllocationFailed { bytes: self.block_size })?;
        self.blocks.push(block);
        logging::log_block_added(&self.name, self.blocks.len(), self.block_size);
        Ok(())
    }

    /// Run the invariant checker when the region was configured to.
    fn check(&self) {
        if self.verify {
            if let Err(err) = self.verify() {
                logging::log_region_error(&self.name, &err);
            }
        }
    }

    fn report(&self, err: &RegionError) {
        if *err != RegionError::ZeroSize {
            logging::log_region_error(&self.name, err);
        }
    }
}

impl Drop for Region {
    fn drop(&mut self) {
        logging::log_region_destroyed(&self.name, self.blocks.len());
    }
}

impl std::fmt::Debug for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Region")
            .field("name", &self.name)
            .field("block_size", &self.block_size)
            .field("block_count", &self.blocks.len())
            .field("max_blocks", &self.max_blocks)
            .field("live", &self.live.len())
            .finish()
    }
}
