//! Region error types
//!
//! Every failure a region can report. The `Option`-returning entry points on
//! [`Region`](crate::Region) log these and hand back `None`; the `try_*`
//! variants surface them directly.

use thiserror::Error;

/// Broad classes of failure, used to pick a log severity and by callers
/// that only care about the kind of problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Invalid parameters at creation or in a config file.
    Configuration,
    /// A request that can never fit in a single block.
    Capacity,
    /// The host allocator refused memory, or the block cap was reached.
    OutOfMemory,
    /// Caller broke the allocation protocol (double free, foreign pointer).
    ProtocolMisuse,
    /// The invariant checker found an inconsistent block.
    Corruption,
}

/// Errors produced by region operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegionError {
    /// Region created without a name.
    #[error("region name must not be empty")]
    MissingName,

    /// Region created with a block size of zero.
    #[error("block size must be greater than zero")]
    ZeroBlockSize,

    /// Block cannot hold even a single minimum-size slot.
    #[error("block size {size} is below the minimum slot size {min}")]
    BlockSizeTooSmall {
        /// Requested block size.
        size: usize,
        /// Smallest usable block size.
        min: usize,
    },

    /// Block too large for 32-bit slot offsets.
    #[error("block size {size} exceeds the maximum of {max}")]
    BlockSizeTooLarge {
        /// Requested block size.
        size: usize,
        /// Largest supported block size.
        max: usize,
    },

    /// Malformed or unreadable configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Zero-byte request. Never logged by the `Option` API.
    #[error("zero-sized request")]
    ZeroSize,

    /// Request (plus header) larger than one block.
    #[error("request of {requested} bytes cannot fit in a block of {block_size} bytes")]
    RequestTooLarge {
        /// Bytes asked for by the caller.
        requested: usize,
        /// Region block size.
        block_size: usize,
    },

    /// No block had room and the region may not grow.
    #[error("out of memory: {requested} bytes unavailable across {blocks} blocks")]
    OutOfMemory {
        /// Aligned slot size that could not be placed.
        requested: usize,
        /// Blocks owned by the region at the time of failure.
        blocks: usize,
    },

    /// The process heap refused a block or the block array.
    #[error("host allocator failed to provide {bytes} bytes")]
    HostAllocationFailed {
        /// Size of the refused allocation.
        bytes: usize,
    },

    /// Pointer inside the region freed while not live.
    #[error("double free of pointer {addr:#x}")]
    DoubleFree {
        /// Offending address.
        addr: usize,
    },

    /// Pointer lies inside the region but is not a live allocation.
    #[error("pointer {addr:#x} is not a live allocation")]
    NotLive {
        /// Offending address.
        addr: usize,
    },

    /// Pointer was never issued by this region.
    #[error("pointer {addr:#x} does not belong to this region")]
    ForeignPointer {
        /// Offending address.
        addr: usize,
    },

    /// Invariant violation found by the checker.
    #[error("block {block} is corrupted: {reason}")]
    Corrupted {
        /// Index of the inconsistent block.
        block: usize,
        /// What the checker found.
        reason: String,
    },
}

impl RegionError {
    /// Category this error belongs to.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::MissingName
            | Self::ZeroBlockSize
            | Self::BlockSizeTooSmall { .. }
            | Self::BlockSizeTooLarge { .. }
            | Self::InvalidConfig(_) => ErrorCategory::Configuration,
            Self::ZeroSize | Self::RequestTooLarge { .. } => ErrorCategory::Capacity,
            Self::OutOfMemory { .. } | Self::HostAllocationFailed { .. } => {
                ErrorCategory::OutOfMemory
            }
            Self::DoubleFree { .. } | Self::NotLive { .. } | Self::ForeignPointer { .. } => {
                ErrorCategory::ProtocolMisuse
            }
            Self::Corrupted { .. } => ErrorCategory::Corruption,
        }
    }
}

/// Result type for region operations.
pub type RegionResult<T> = Result<T, RegionError>;
