//! Logging utilities for memory regions
//!
//! Every region event is emitted through `tracing` under the
//! [`TARGET`] subsystem tag. Installing a subscriber is up to the host
//! program; [`init_logging`] provides the standard one.

use std::path::PathBuf;

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::Level;
use tracing_appender::{
    non_blocking::{NonBlocking, WorkerGuard},
    rolling,
};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

// Re-export tracing macros for use throughout the crate
pub use tracing::{debug, error, info, trace, warn};

use crate::error::{ErrorCategory, RegionError};

/// Subsystem tag attached to every region event.
pub const TARGET: &str = "memory_region";

/// How events are rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line, for terminals
    #[default]
    Pretty,
    /// One line per event
    Compact,
    /// Newline-delimited JSON objects
    Json,
}

/// Where rendered events go
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LogDestination {
    Stdout,
    #[default]
    Stderr,
    /// Daily-rotated files `<directory>/<prefix>.<date>`
    RollingFile { directory: PathBuf, prefix: String },
}

/// Subscriber settings for [`init_logging`]
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: Level,
    pub format: LogFormat,
    pub destination: LogDestination,
    /// Extra `EnvFilter` directives such as `memory_region=trace`.
    pub directives: Vec<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::new(Level::INFO)
    }
}

impl LogConfig {
    pub fn new(level: Level) -> Self {
        Self {
            level,
            format: LogFormat::default(),
            destination: LogDestination::default(),
            directives: Vec::new(),
        }
    }

    pub fn format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn destination(mut self, destination: LogDestination) -> Self {
        self.destination = destination;
        self
    }

    /// Add comma-separated filter directives.
    pub fn directives(mut self, directives: &str) -> Self {
        self.directives.extend(
            directives
                .split(',')
                .map(str::trim)
                .filter(|directive| !directive.is_empty())
                .map(str::to_string),
        );
        self
    }
}

/// Install the global `tracing` subscriber
///
/// Keep the returned guard alive until exit; dropping it flushes the
/// background writer. `None` means another subscriber was already installed
/// and nothing changed.
pub fn init_logging(config: LogConfig) -> Option<WorkerGuard> {
    let (writer, guard) = make_writer(&config.destination);

    let base = fmt::layer().with_writer(writer).with_target(true);
    let layer = match config.format {
        LogFormat::Pretty => base.pretty().boxed(),
        LogFormat::Compact => base.compact().boxed(),
        LogFormat::Json => base.json().boxed(),
    };

    tracing_subscriber::registry()
        .with(layer.with_filter(env_filter(&config)))
        .try_init()
        .ok()?;
    Some(guard)
}

/// Background writer for `destination`; lines are flushed when the guard drops.
fn make_writer(destination: &LogDestination) -> (NonBlocking, WorkerGuard) {
    match destination {
        LogDestination::Stdout => tracing_appender::non_blocking(std::io::stdout()),
        LogDestination::Stderr => tracing_appender::non_blocking(std::io::stderr()),
        LogDestination::RollingFile { directory, prefix } => {
            tracing_appender::non_blocking(rolling::daily(directory, prefix))
        }
    }
}

/// `RUST_LOG` first, then the configured level and directives on top.
fn env_filter(config: &LogConfig) -> EnvFilter {
    let filter = EnvFilter::from_default_env().add_directive(config.level.into());
    config.directives.iter().fold(filter, |filter, directive| match directive.parse() {
        Ok(parsed) => filter.add_directive(parsed),
        Err(_) => {
            warn!(target: TARGET, directive = %directive, "ignoring malformed filter directive");
            filter
        }
    })
}

static RUNTIME_GUARD: OnceCell<WorkerGuard> = OnceCell::new();

/// Install a compact stderr subscriber once per process
///
/// Region events are shown at DEBUG in debug builds and INFO otherwise.
pub fn init_runtime_logging() {
    RUNTIME_GUARD.get_or_init(|| {
        let level = if cfg!(debug_assertions) { Level::DEBUG } else { Level::INFO };
        let directive = format!("{}={}", TARGET, level.as_str().to_ascii_lowercase());
        let config = LogConfig::new(level).format(LogFormat::Compact).directives(&directive);
        match init_logging(config) {
            Some(guard) => guard,
            // Someone else owns the global subscriber; keep a dummy guard.
            None => tracing_appender::non_blocking(std::io::sink()).1,
        }
    });
}

/// Log region creation
#[inline]
pub fn log_region_created(region: &str, block_size: usize, max_blocks: usize) {
    debug!(target: TARGET, region, block_size, max_blocks, "region created");
}

/// Log a failed region creation
#[inline]
pub fn log_create_failed(region: &str, block_size: usize, err: &RegionError) {
    error!(target: TARGET, region, block_size, error = %err, "failed to create region");
}

/// Log block growth
#[inline]
pub fn log_block_added(region: &str, block_count: usize, block_size: usize) {
    info!(
        target: TARGET,
        region,
        block_count,
        total_size = block_count * block_size,
        "allocated new memory block"
    );
}

/// Log an allocation event
#[inline]
pub fn log_allocation(region: &str, size: usize, ptr: *const u8) {
    trace!(target: TARGET, region, size, ptr = ?ptr, "allocated memory");
}

/// Log a deallocation event
#[inline]
pub fn log_deallocation(region: &str, size: usize, ptr: *const u8) {
    trace!(target: TARGET, region, size, ptr = ?ptr, "deallocated memory");
}

/// Log a reallocation event
#[inline]
pub fn log_reallocation(region: &str, size: usize, ptr: *const u8, in_place: bool) {
    trace!(target: TARGET, region, size, ptr = ?ptr, in_place, "reallocated memory");
}

/// Log a region reset
#[inline]
pub fn log_region_cleared(region: &str, block_count: usize) {
    debug!(target: TARGET, region, block_count, "region cleared");
}

/// Log region teardown
#[inline]
pub fn log_region_destroyed(region: &str, block_count: usize) {
    debug!(target: TARGET, region, block_count, "region destroyed");
}

/// Log a failed operation at the severity of its category
///
/// Oversized requests are expected traffic and stay at DEBUG.
pub fn log_region_error(region: &str, err: &RegionError) {
    match err.category() {
        ErrorCategory::Capacity => debug!(target: TARGET, region, error = %err, "request rejected"),
        ErrorCategory::Configuration => error!(target: TARGET, region, error = %err, "invalid configuration"),
        ErrorCategory::OutOfMemory => error!(target: TARGET, region, error = %err, "allocation failed"),
        ErrorCategory::ProtocolMisuse => error!(target: TARGET, region, error = %err, "protocol misuse"),
        ErrorCategory::Corruption => error!(target: TARGET, region, error = %err, "memory verification failed"),
    }
}

/// Log benchmark results
#[inline]
pub fn log_benchmark(allocations: usize, system_seconds: f64, region_seconds: f64) {
    info!(
        target: TARGET,
        allocations,
        "Malloc: {:.6}, Region: {:.6}",
        system_seconds,
        region_seconds
    );
}
