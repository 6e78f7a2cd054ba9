//! Block management - one fixed-size buffer tiled by slots
//!
//! Design: the buffer is an owned byte arena. Slot headers and free-list links
//! are typed views at 8-aligned offsets into it, mutated in place. Six bin
//! heads index the free slots by size class.

use std::alloc::{alloc, dealloc, Layout};
use core::ptr::NonNull;

use super::header::{
    bin_for_size, FreeLinks, SlotHeader, ALIGNMENT, BIN_COUNT, BLOCK_ALIGN, HEADER_SIZE,
    MIN_SLOT_SIZE, MIN_SPLIT_SIZE, NIL,
};

/// A block buffer plus its free-space bookkeeping
pub(crate) struct Block {
    base: NonNull<u8>,
    layout: Layout,
    /// Sum of the sizes of all free slots, headers included.
    size_free: u32,
    /// Slots in the header chain, free and occupied.
    count: u32,
    bins: [u32; BIN_COUNT],
}

// SAFETY: the buffer is exclusively owned by the block and only touched
// through `&mut self` (writes) or `&self` (reads).
unsafe impl Send for Block {}

impl Block {
    /// Allocate a block buffer from the host and format it as one free slot.
    ///
    /// `size` must already be validated by the region (aligned, within bounds).
    pub fn new(size: usize) -> Option<Self> {
        debug_assert!(size >= MIN_SLOT_SIZE && size % ALIGNMENT == 0);
        let layout = Layout::from_size_align(size, BLOCK_ALIGN).ok()?;

        // SAFETY: layout has non-zero size.
        let base = NonNull::new(unsafe { alloc(layout) })?;

        let mut block = Self {
            base,
            layout,
            size_free: 0,
            count: 0,
            bins: [NIL; BIN_COUNT],
        };
        block.reset();
        Some(block)
    }

    #[inline]
    pub fn size(&self) -> u32 {
        self.layout.size() as u32
    }

    #[inline]
    pub fn size_free(&self) -> u32 {
        self.size_free
    }

    #[inline]
    pub fn count(&self) -> u32 {
        self.count
    }

    #[inline]
    pub fn bin_head(&self, bin: usize) -> Option<u32> {
        let head = self.bins[bin];
        (head != NIL).then_some(head)
    }

    /// Drop every slot and make the whole buffer one free slot.
    pub fn reset(&mut self) {
        self.size_free = self.size();
        self.count = 1;
        self.bins = [NIL; BIN_COUNT];
        self.write_header(0, SlotHeader::occupied(self.size(), 0));
        self.link(0);
    }

    /// Address range check for caller pointers.
    #[inline]
    pub fn contains(&self, addr: usize) -> bool {
        let start = self.base.as_ptr() as usize;
        addr >= start && addr < start + self.layout.size()
    }

    /// Pointer handed to callers for the slot at `offset`.
    #[inline]
    pub fn payload(&self, offset: u32) -> NonNull<u8> {
        debug_assert!(offset as usize + MIN_SLOT_SIZE <= self.layout.size());
        // SAFETY: every slot is at least MIN_SLOT_SIZE bytes, so the payload
        // start lies inside the buffer.
        unsafe { NonNull::new_unchecked(self.base.as_ptr().add(offset as usize + HEADER_SIZE)) }
    }

    /// True when a header (plus links) could live at `offset`.
    #[inline]
    pub fn is_slot_offset(&self, offset: u32) -> bool {
        offset as usize % ALIGNMENT == 0 && offset as usize + MIN_SLOT_SIZE <= self.layout.size()
    }

    #[inline]
    fn header_ptr(&self, offset: u32) -> *mut SlotHeader {
        debug_assert!(self.is_slot_offset(offset), "bad slot offset {}", offset);
        // SAFETY: offset is 8-aligned and in bounds, base is 16-aligned.
        unsafe { self.base.as_ptr().add(offset as usize).cast::<SlotHeader>() }
    }

    #[inline]
    fn links_ptr(&self, offset: u32) -> *mut FreeLinks {
        debug_assert!(self.is_slot_offset(offset), "bad slot offset {}", offset);
        // SAFETY: as above; links sit right after the header, inside MIN_SLOT_SIZE.
        unsafe { self.base.as_ptr().add(offset as usize + HEADER_SIZE).cast::<FreeLinks>() }
    }

    #[inline]
    pub fn header(&self, offset: u32) -> SlotHeader {
        // SAFETY: see header_ptr; SlotHeader is valid for any bit pattern.
        unsafe { self.header_ptr(offset).read() }
    }

    #[inline]
    fn write_header(&mut self, offset: u32, header: SlotHeader) {
        // SAFETY: see header_ptr.
        unsafe { self.header_ptr(offset).write(header) }
    }

    #[inline]
    fn header_mut(&mut self, offset: u32) -> &mut SlotHeader {
        // SAFETY: see header_ptr; `&mut self` guarantees exclusivity.
        unsafe { &mut *self.header_ptr(offset) }
    }

    #[inline]
    pub fn links(&self, offset: u32) -> FreeLinks {
        // SAFETY: see links_ptr; FreeLinks is valid for any bit pattern.
        unsafe { self.links_ptr(offset).read() }
    }

    #[inline]
    fn links_mut(&mut self, offset: u32) -> &mut FreeLinks {
        // SAFETY: see links_ptr.
        unsafe { &mut *self.links_ptr(offset) }
    }

    /// Offset of the physically following slot, if any.
    #[inline]
    pub fn next_offset(&self, offset: u32) -> Option<u32> {
        let end = offset + self.header(offset).size;
        (end < self.size()).then_some(end)
    }

    /// Offset of the physically preceding slot, if any.
    #[inline]
    pub fn prev_offset(&self, offset: u32) -> Option<u32> {
        let prev_size = self.header(offset).prev_size;
        (offset != 0).then(|| offset - prev_size)
    }

    /// Keep the follower's boundary tag in step with a resized slot.
    fn sync_follower(&mut self, offset: u32) {
        if let Some(next) = self.next_offset(offset) {
            let size = self.header(offset).size;
            self.header_mut(next).prev_size = size;
        }
    }

    /// Head-insert an unlinked slot into the bin matching its size.
    pub fn link(&mut self, offset: u32) {
        let size = self.header(offset).size;
        debug_assert!(!self.header(offset).is_free(), "slot {} is already linked", offset);

        let bin = bin_for_size(size as usize);
        let head = self.bins[bin];

        let header = self.header_mut(offset);
        header.free = 1;
        header.bin = bin as u8;

        *self.links_mut(offset) = FreeLinks { next: head, prev: NIL };
        if head != NIL {
            self.links_mut(head).prev = offset;
        }
        self.bins[bin] = offset;
    }

    /// Remove a free slot from its bin and mark it occupied.
    pub fn unlink(&mut self, offset: u32) {
        let header = self.header(offset);
        debug_assert!(header.is_free(), "slot {} is not free", offset);
        debug_assert!((header.bin as usize) < BIN_COUNT);

        let bin = header.bin as usize;
        let FreeLinks { next, prev } = self.links(offset);

        if prev != NIL {
            // Interior or tail.
            self.links_mut(prev).next = next;
            if next != NIL {
                self.links_mut(next).prev = prev;
            }
        } else {
            // Head, alone or with successors.
            debug_assert_eq!(self.bins[bin], offset, "slot {} is not the head of bin {}", offset, bin);
            self.bins[bin] = next;
            if next != NIL {
                self.links_mut(next).prev = NIL;
            }
        }

        let header = self.header_mut(offset);
        header.free = 0;
        header.bin = 0;
    }

    /// First free slot of at least `size` bytes, scanning from the ideal bin upward.
    ///
    /// Within a bin the first adequate slot wins, not the smallest.
    pub fn find_fit(&self, size: u32) -> Option<u32> {
        for bin in bin_for_size(size as usize)..BIN_COUNT {
            let mut cursor = self.bins[bin];
            while cursor != NIL {
                if self.header(cursor).size >= size {
                    return Some(cursor);
                }
                cursor = self.links(cursor).next;
            }
        }
        None
    }

    /// Occupy the free slot at `offset` with a `size`-byte allocation,
    /// splitting off the tail when it is large enough to stand alone.
    pub fn take(&mut self, offset: u32, size: u32) {
        let slot = self.header(offset);
        debug_assert!(slot.is_free() && slot.size >= size);

        self.unlink(offset);
        let remainder = slot.size - size;
        if remainder as usize >= MIN_SPLIT_SIZE {
            self.header_mut(offset).size = size;
            self.split_off(offset, remainder);
        }
        self.size_free -= self.header(offset).size;
    }

    /// Turn the `tail_size` bytes after the slot at `offset` into a free slot.
    fn split_off(&mut self, offset: u32, tail_size: u32) {
        let head_size = self.header(offset).size;
        let tail = offset + head_size;

        self.write_header(tail, SlotHeader::occupied(tail_size, head_size));
        self.count += 1;
        self.sync_follower(tail);
        self.link(tail);
    }

    /// Free the occupied slot at `offset`, merging with free neighbours on
    /// both sides. Returns the offset of the resulting free slot.
    pub fn release(&mut self, offset: u32) -> u32 {
        let slot = self.header(offset);
        debug_assert!(!slot.is_free(), "slot {} is already free", offset);

        self.size_free += slot.size;

        if let Some(next) = self.next_offset(offset) {
            let neighbour = self.header(next);
            if neighbour.is_free() {
                self.unlink(next);
                self.header_mut(offset).size += neighbour.size;
                self.count -= 1;
            }
        }

        let mut start = offset;
        if let Some(prev) = self.prev_offset(offset) {
            if self.header(prev).is_free() {
                self.unlink(prev);
                let size = self.header(offset).size;
                self.header_mut(prev).size += size;
                self.count -= 1;
                start = prev;
            }
        }

        self.sync_follower(start);
        self.link(start);
        start
    }

    /// Grow the occupied slot at `offset` to `size` bytes by absorbing a free
    /// follower. Returns false, untouched, when the follower can't cover it.
    pub fn grow_in_place(&mut self, offset: u32, size: u32) -> bool {
        let slot = self.header(offset);
        let Some(next) = self.next_offset(offset) else {
            return false;
        };
        let neighbour = self.header(next);
        if !neighbour.is_free() || slot.size + neighbour.size < size {
            return false;
        }

        self.unlink(next);
        self.size_free -= neighbour.size;
        self.count -= 1;

        let merged = slot.size + neighbour.size;
        let remainder = merged - size;
        if remainder as usize >= MIN_SPLIT_SIZE {
            self.header_mut(offset).size = size;
            self.split_off(offset, remainder);
            self.size_free += remainder;
        } else {
            self.header_mut(offset).size = merged;
            self.sync_follower(offset);
        }
        true
    }

    /// Walk the header chain from the start of the block.
    pub fn slots(&self) -> Slots<'_> {
        Slots { block: self, offset: 0, remaining: self.count }
    }
}

impl Drop for Block {
    fn drop(&mut self) {
        // SAFETY: base was allocated with exactly this layout.
        unsafe {
            dealloc(self.base.as_ptr(), self.layout);
        }
    }
}

/// Iterator over `(offset, header)` pairs of a block.
pub(crate) struct Slots<'a> {
    block: &'a Block,
    offset: u32,
    remaining: u32,
}

impl Iterator for Slots<'_> {
    type Item = (u32, SlotHeader);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 || !self.block.is_slot_offset(self.offset) {
            return None;
        }
        let offset = self.offset;
        let header = self.block.header(offset);
        if header.size == 0 {
            self.remaining = 0;
            return None;
        }
        self.offset = offset.saturating_add(header.size);
        self.remaining -= 1;
        Some((offset, header))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout_of(block: &Block) -> Vec<(u32, u32, bool)> {
        block.slots().map(|(off, h)| (off, h.size, h.is_free())).collect()
    }

    fn bin_members(block: &Block, bin: usize) -> Vec<u32> {
        let mut out = Vec::new();
        let mut cursor = block.bin_head(bin);
        while let Some(off) = cursor {
            out.push(off);
            let next = block.links(off).next;
            cursor = (next != NIL).then_some(next);
        }
        out
    }

    #[test]
    fn fresh_block_is_one_free_slot() {
        let block = Block::new(1024).expect("block");
        assert_eq!(block.size_free(), 1024);
        assert_eq!(block.count(), 1);
        assert_eq!(layout_of(&block), vec![(0, 1024, true)]);
        assert_eq!(bin_members(&block, 5), vec![0]);
    }

    #[test]
    fn payload_is_aligned() {
        let block = Block::new(256).expect("block");
        assert_eq!(block.payload(0).as_ptr() as usize % ALIGNMENT, 0);
        assert!(block.contains(block.payload(0).as_ptr() as usize));
    }

    #[test]
    fn take_splits_large_remainder() {
        let mut block = Block::new(1024).expect("block");
        block.take(0, 120);

        assert_eq!(layout_of(&block), vec![(0, 120, false), (120, 904, true)]);
        assert_eq!(block.size_free(), 904);
        assert_eq!(block.header(120).prev_size, 120);
        assert_eq!(bin_members(&block, 5), vec![120]);
    }

    #[test]
    fn take_consumes_small_remainder() {
        let mut block = Block::new(1024).expect("block");
        block.take(0, 1000);

        assert_eq!(layout_of(&block), vec![(0, 1024, false)]);
        assert_eq!(block.size_free(), 0);
        for bin in 0..BIN_COUNT {
            assert!(block.bin_head(bin).is_none());
        }
    }

    #[test]
    fn unlink_head_interior_and_tail() {
        let mut block = Block::new(1024).expect("block");
        // Four 48-byte slots separated by occupied 48-byte slots.
        let mut offset = 0;
        for _ in 0..8 {
            let fit = block.find_fit(48).expect("fit");
            assert_eq!(fit, block.bin_head(5).expect("tail slot"));
            block.take(fit, 48);
            offset += 48;
        }
        assert_eq!(offset, 384);
        for off in [0u32, 96, 192, 288] {
            block.release(off);
        }
        // Head-inserted, so most recently freed first.
        assert_eq!(bin_members(&block, 1), vec![288, 192, 96, 0]);

        block.unlink(192); // interior
        assert_eq!(bin_members(&block, 1), vec![288, 96, 0]);
        block.unlink(0); // tail
        assert_eq!(bin_members(&block, 1), vec![288, 96]);
        block.unlink(288); // head with successor
        assert_eq!(bin_members(&block, 1), vec![96]);
        assert_eq!(block.links(96).prev, NIL);
        block.unlink(96); // sole element
        assert!(block.bin_head(1).is_none());
    }

    #[test]
    fn release_merges_both_neighbours() {
        let mut block = Block::new(1024).expect("block");
        block.take(0, 120);
        block.take(120, 120);
        block.take(240, 120);

        assert_eq!(block.release(0), 0);
        assert_eq!(block.release(240), 240);
        assert_eq!(block.count(), 3);

        // Middle slot joins both sides into one.
        assert_eq!(block.release(120), 0);
        assert_eq!(layout_of(&block), vec![(0, 1024, true)]);
        assert_eq!(block.size_free(), 1024);
        assert_eq!(block.count(), 1);
    }

    #[test]
    fn grow_in_place_resplits() {
        let mut block = Block::new(1024).expect("block");
        block.take(0, 120);

        assert!(block.grow_in_place(0, 216));
        assert_eq!(layout_of(&block), vec![(0, 216, false), (216, 808, true)]);
        assert_eq!(block.size_free(), 808);
        assert_eq!(block.header(216).prev_size, 216);
    }

    #[test]
    fn grow_in_place_consumes_small_remainder() {
        let mut block = Block::new(256).expect("block");
        block.take(0, 120);
        assert_eq!(block.size_free(), 136);

        assert!(block.grow_in_place(0, 232));
        assert_eq!(layout_of(&block), vec![(0, 256, false)]);
        assert_eq!(block.size_free(), 0);
    }

    #[test]
    fn grow_in_place_refuses_occupied_follower() {
        let mut block = Block::new(1024).expect("block");
        block.take(0, 120);
        block.take(120, 120);

        assert!(!block.grow_in_place(0, 200));
        assert_eq!(block.header(0).size, 120);
    }

    #[test]
    fn reset_restores_single_slot() {
        let mut block = Block::new(512).expect("block");
        block.take(0, 64);
        block.take(64, 64);
        block.reset();
        assert_eq!(layout_of(&block), vec![(0, 512, true)]);
        assert_eq!(block.size_free(), 512);
        assert_eq!(bin_members(&block, 4), vec![0]);
    }
}
