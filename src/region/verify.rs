//! Invariant checker
//!
//! Walks every block and cross-checks the header chain, the free accounting,
//! the bins and the live-pointer table. Only reads; never repairs.

use super::block::Block;
use super::header::{bin_for_size, ALIGNMENT, BIN_COUNT, MIN_SLOT_SIZE, NIL};
use super::Region;
use crate::error::{RegionError, RegionResult};

impl Region {
    /// Check every structural invariant of the region.
    ///
    /// Per block: the header chain tiles the buffer exactly with `count`
    /// slots, boundary tags agree, `size_free` equals the sum of free slot
    /// sizes, no two free slots are adjacent, and every free slot sits in
    /// exactly one bin, the one its size maps to. Region-wide: the block cap
    /// holds and every live pointer names an occupied slot.
    pub fn verify(&self) -> RegionResult<()> {
        if self.max_blocks != 0 && self.blocks.len() > self.max_blocks {
            return Err(RegionError::Corrupted {
                block: self.blocks.len() - 1,
                reason: format!("{} blocks exceed the cap of {}", self.blocks.len(), self.max_blocks),
            });
        }

        for (index, block) in self.blocks.iter().enumerate() {
            if block.size() as usize != self.block_size {
                return Err(corrupted(index, format!("block size {} differs from region", block.size())));
            }
            check_block(block).map_err(|reason| corrupted(index, reason))?;
        }

        for (&addr, placement) in &self.live {
            let block = self.blocks.get(placement.block).ok_or_else(|| {
                corrupted(placement.block, format!("live pointer {:#x} names a missing block", addr))
            })?;
            if !block.is_slot_offset(placement.offset)
                || block.payload(placement.offset).as_ptr() as usize != addr
            {
                return Err(corrupted(placement.block, format!("live pointer {:#x} has a bad offset", addr)));
            }
            if block.header(placement.offset).is_free() {
                return Err(corrupted(placement.block, format!("live pointer {:#x} points at a free slot", addr)));
            }
        }

        Ok(())
    }
}

fn corrupted(block: usize, reason: String) -> RegionError {
    RegionError::Corrupted { block, reason }
}

fn check_block(block: &Block) -> Result<(), String> {
    let size = block.size();
    if block.size_free() > size {
        return Err(format!("size_free {} exceeds block size {}", block.size_free(), size));
    }

    // Header chain.
    let mut offset = 0u32;
    let mut prev_size = 0u32;
    let mut prev_free = false;
    let mut visited = 0u32;
    let mut free_total = 0u64;
    let mut free_offsets = Vec::new();

    while offset < size {
        if visited >= block.count() {
            return Err(format!("more than {} slots in the header chain", block.count()));
        }
        if !block.is_slot_offset(offset) {
            return Err(format!("slot at {} cannot hold a header", offset));
        }
        let header = block.header(offset);
        if (header.size as usize) < MIN_SLOT_SIZE || header.size as usize % ALIGNMENT != 0 {
            return Err(format!("slot at {} has invalid size {}", offset, header.size));
        }
        if header.size > size - offset {
            return Err(format!("slot at {} overruns the block", offset));
        }
        if header.prev_size != prev_size {
            return Err(format!(
                "slot at {} records predecessor size {}, found {}",
                offset, header.prev_size, prev_size
            ));
        }
        match header.free {
            0 => prev_free = false,
            1 => {
                if prev_free {
                    return Err(format!("adjacent free slots at {}", offset));
                }
                prev_free = true;
                free_total += header.size as u64;
                free_offsets.push(offset);
            }
            flag => return Err(format!("slot at {} has free flag {}", offset, flag)),
        }

        visited += 1;
        prev_size = header.size;
        offset += header.size;
    }

    if visited != block.count() {
        return Err(format!("walked {} slots, block records {}", visited, block.count()));
    }
    if free_total != block.size_free() as u64 {
        return Err(format!("free slots sum to {}, block records {}", free_total, block.size_free()));
    }

    // Bins. Offsets were collected in address order, so binary search works.
    let mut seen = vec![false; free_offsets.len()];
    for bin in 0..BIN_COUNT {
        let mut prev = NIL;
        let mut cursor = block.bin_head(bin).unwrap_or(NIL);
        while cursor != NIL {
            let index = free_offsets
                .binary_search(&cursor)
                .map_err(|_| format!("bin {} links {}, which is not a free slot", bin, cursor))?;
            if seen[index] {
                return Err(format!("free slot {} is linked more than once", cursor));
            }
            seen[index] = true;

            let header = block.header(cursor);
            if header.bin as usize != bin || bin_for_size(header.size as usize) != bin {
                return Err(format!(
                    "slot {} of size {} is in bin {} (records {})",
                    cursor, header.size, bin, header.bin
                ));
            }
            let links = block.links(cursor);
            if links.prev != prev {
                return Err(format!("slot {} has a broken back link", cursor));
            }
            prev = cursor;
            cursor = links.next;
        }
    }
    if let Some(missing) = seen.iter().position(|&linked| !linked) {
        return Err(format!("free slot {} is in no bin", free_offsets[missing]));
    }

    Ok(())
}
