//! memregion - named, block-segmented memory regions
//!
//! A region owns equally sized blocks carved from the host allocator. Each
//! block is tiled by header-prefixed slots; free slots are indexed by six
//! size-class bins and coalesce with their neighbours on release. Regions
//! grow one block at a time up to an optional cap.
//!
//! ```no_run
//! use memregion::Region;
//!
//! let mut region = Region::create("level", 64 * 1024, 0).unwrap();
//! let ptr = region.allocate(100);
//! region.free(ptr);
//! ```

pub mod bench;
pub mod clock;
pub mod config;
pub mod error;
pub mod logging;
pub mod region;
pub mod sync;

// Re-export core types
pub use bench::{run_benchmark, BenchReport};
pub use clock::{Clock, MonotonicClock};
pub use config::{BenchConfig, Config, LogSettings, RegionConfig};
pub use error::{ErrorCategory, RegionError, RegionResult};
pub use region::{Region, RegionStats, SlotInfo};
pub use sync::SharedRegion;
