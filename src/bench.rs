//! Self-benchmark: region allocator vs the platform allocator
//!
//! Replays the same request pattern against both: `allocations` requests
//! cycling through `sizes`, with every `free_every`-th one freed right away.
//! Only the allocation loop is timed; teardown is not.

use std::alloc::{alloc, dealloc, Layout};
use core::ptr::NonNull;

use serde::Serialize;

use crate::clock::Clock;
use crate::config::BenchConfig;
use crate::error::{RegionError, RegionResult};
use crate::logging;
use crate::region::{Region, ALIGNMENT};

/// Outcome of one benchmark run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BenchReport {
    pub allocations: usize,
    /// Requests freed immediately after allocation.
    pub early_frees: usize,
    pub system_seconds: f64,
    pub region_seconds: f64,
    /// Blocks the region needed.
    pub region_blocks: usize,
    /// Region requests that returned `None`.
    pub region_failures: usize,
}

/// Run the benchmark with the given clock.
pub fn run_benchmark<C: Clock>(config: &BenchConfig, clock: &C) -> RegionResult<BenchReport> {
    if config.sizes.is_empty() || config.sizes.contains(&0) {
        return Err(RegionError::InvalidConfig("benchmark sizes must be non-empty and non-zero".to_string()));
    }

    let freed_early = |i: usize| config.free_every != 0 && i % config.free_every == 0;
    let size_at = |i: usize| config.sizes[i % config.sizes.len()];

    // Platform allocator.
    let mut system: Vec<Option<(NonNull<u8>, Layout)>> = Vec::with_capacity(config.allocations);
    let start = clock.ticks();
    for i in 0..config.allocations {
        let layout = Layout::from_size_align(size_at(i), ALIGNMENT)
            .map_err(|e| RegionError::InvalidConfig(e.to_string()))?;
        // SAFETY: sizes are validated non-zero.
        let entry = NonNull::new(unsafe { alloc(layout) }).map(|ptr| (ptr, layout));
        if freed_early(i) {
            if let Some((ptr, layout)) = entry {
                // SAFETY: allocated just above with this layout.
                unsafe { dealloc(ptr.as_ptr(), layout) };
            }
            system.push(None);
        } else {
            system.push(entry);
        }
    }
    let system_ticks = clock.ticks().saturating_sub(start);
    for (ptr, layout) in system.into_iter().flatten() {
        // SAFETY: every remaining entry is live with its recorded layout.
        unsafe { dealloc(ptr.as_ptr(), layout) };
    }

    // Region allocator.
    let mut region = Region::create("Benchmark", config.block_size, 0)?;
    let mut failures = 0;
    let start = clock.ticks();
    for i in 0..config.allocations {
        let ptr = region.allocate(size_at(i));
        if ptr.is_none() {
            failures += 1;
        }
        if freed_early(i) {
            region.free(ptr);
        }
    }
    let region_ticks = clock.ticks().saturating_sub(start);
    let region_blocks = region.block_count();
    region.destroy();

    let report = BenchReport {
        allocations: config.allocations,
        early_frees: (0..config.allocations).filter(|&i| freed_early(i)).count(),
        system_seconds: clock.ticks_to_seconds(system_ticks),
        region_seconds: clock.ticks_to_seconds(region_ticks),
        region_blocks,
        region_failures: failures,
    };
    logging::log_benchmark(report.allocations, report.system_seconds, report.region_seconds);
    Ok(report)
}
