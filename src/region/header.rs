//! Slot metadata - layout primitives for region blocks
//!
//! Design: every slot starts with a 16-byte header. A free slot additionally
//! stores its bin links in the first 8 bytes of its payload, so the smallest
//! slot (header + links) is 24 bytes. Links are block-relative offsets, never
//! addresses.

/// Size of the header prefixed to every slot.
pub const HEADER_SIZE: usize = 16;

/// Alignment of slot sizes and of every pointer handed to callers.
pub const ALIGNMENT: usize = 8;

/// Alignment of the raw block buffer itself.
pub(crate) const BLOCK_ALIGN: usize = 16;

/// Smallest slot that can hold a header plus free-list links.
pub const MIN_SLOT_SIZE: usize = HEADER_SIZE + core::mem::size_of::<FreeLinks>();

/// A split must leave at least this many bytes, otherwise the whole slot is consumed.
pub const MIN_SPLIT_SIZE: usize = 32;

/// Number of free-list bins per block.
pub const BIN_COUNT: usize = 6;

/// Block array grows in steps of this many entries.
pub(crate) const BLOCK_ARRAY_STEP: usize = 16;

/// Largest block addressable with 32-bit offsets (NIL stays out of range).
pub const MAX_BLOCK_SIZE: usize = (u32::MAX as usize - 1) & !(ALIGNMENT - 1);

/// Empty link / empty bin marker.
pub(crate) const NIL: u32 = u32::MAX;

/// Slot header (16 bytes) - prefixed before every slot in a block
///
/// `free` and `bin` are plain bytes rather than `bool`/enum so that reading
/// a damaged header is never undefined behavior; the verifier rejects bad
/// values instead.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SlotHeader {
    /// Total slot size including this header.
    pub size: u32,
    /// Size of the physically preceding slot, 0 for the first slot.
    pub prev_size: u32,
    pub free: u8,
    /// Bin index, meaningful only while free.
    pub bin: u8,
    _pad: [u8; 6],
}

impl SlotHeader {
    /// Create header for an occupied (not yet linked) slot
    #[inline]
    pub const fn occupied(size: u32, prev_size: u32) -> Self {
        Self { size, prev_size, free: 0, bin: 0, _pad: [0; 6] }
    }

    #[inline]
    pub const fn is_free(&self) -> bool {
        self.free != 0
    }
}

/// Intra-bin links stored in the payload of a free slot.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FreeLinks {
    pub next: u32,
    pub prev: u32,
}

/// Round `size` up to [`ALIGNMENT`], `None` on overflow.
#[inline]
pub const fn align_up(size: usize) -> Option<usize> {
    match size.checked_add(ALIGNMENT - 1) {
        Some(v) => Some(v & !(ALIGNMENT - 1)),
        None => None,
    }
}

/// Total slot size needed for a caller request of `size` bytes.
#[inline]
pub const fn slot_size_for(size: usize) -> Option<usize> {
    match size.checked_add(HEADER_SIZE) {
        Some(v) => align_up(v),
        None => None,
    }
}

/// Map a slot size to its free-list bin.
///
/// bin 0: [0, 32], 1: [33, 64], 2: [65, 128], 3: [129, 256],
/// 4: [257, 512], 5: [513, ..)
#[inline]
pub const fn bin_for_size(size: usize) -> usize {
    if size <= 32 {
        0
    } else if size <= 64 {
        1
    } else if size <= 128 {
        2
    } else if size <= 256 {
        3
    } else if size <= 512 {
        4
    } else {
        5
    }
}
