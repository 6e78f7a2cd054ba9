//! Configuration for regions, the benchmark and logging
//!
//! Loaded from TOML; every field has a default so partial files work.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::Level;

use crate::error::{RegionError, RegionResult};
use crate::logging::{LogConfig, LogDestination, LogFormat};

/// File name prefix of rotated log files.
pub const LOG_FILE_PREFIX: &str = "memregion";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub region: RegionConfig,

    #[serde(default)]
    pub bench: BenchConfig,

    #[serde(default)]
    pub log: LogSettings,
}

/// Parameters of a single region.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegionConfig {
    #[serde(default = "default_region_name")]
    pub name: String,

    /// Bytes per block.
    #[serde(default = "default_block_size")]
    pub block_size: usize,

    /// Upper bound on total block memory, 0 for unbounded.
    #[serde(default)]
    pub max_size: usize,

    /// Check every invariant after each mutating call. Slow.
    #[serde(default)]
    pub verify: bool,
}

/// Parameters of the self-benchmark.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BenchConfig {
    #[serde(default = "default_allocations")]
    pub allocations: usize,

    /// Every n-th allocation is freed right away; 0 never frees early.
    #[serde(default = "default_free_every")]
    pub free_every: usize,

    /// Request sizes, used round-robin.
    #[serde(default = "default_sizes")]
    pub sizes: Vec<usize>,

    #[serde(default = "default_bench_block_size")]
    pub block_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogSettings {
    /// trace, debug, info, warn or error
    #[serde(default = "default_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,

    #[serde(default)]
    pub filter: Option<String>,

    /// Write daily-rotated files here instead of stderr.
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

impl Default for RegionConfig {
    fn default() -> Self {
        Self {
            name: default_region_name(),
            block_size: default_block_size(),
            max_size: 0,
            verify: false,
        }
    }
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            allocations: default_allocations(),
            free_every: default_free_every(),
            sizes: default_sizes(),
            block_size: default_bench_block_size(),
        }
    }
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::default(),
            filter: None,
            directory: None,
        }
    }
}

fn default_region_name() -> String { "default".to_string() }
fn default_block_size() -> usize { 1024 * 1024 }
fn default_allocations() -> usize { 20_000 }
fn default_free_every() -> usize { 16 }
fn default_sizes() -> Vec<usize> {
    vec![16, 32, 24, 100, 200, 500, 327, 537, 200, 17, 57, 387, 874, 204, 100, 22]
}
fn default_bench_block_size() -> usize { 32 * 1024 * 1024 }
fn default_level() -> String { "info".to_string() }

impl LogSettings {
    /// Convert to a logging configuration, rejecting unknown levels.
    pub fn to_log_config(&self) -> RegionResult<LogConfig> {
        let level = Level::from_str(&self.level)
            .map_err(|_| RegionError::InvalidConfig(format!("unknown log level '{}'", self.level)))?;

        let mut config = LogConfig::new(level).format(self.format);
        if let Some(filter) = &self.filter {
            config = config.directives(filter);
        }
        if let Some(directory) = &self.directory {
            config = config.destination(LogDestination::RollingFile {
                directory: directory.clone(),
                prefix: LOG_FILE_PREFIX.to_string(),
            });
        }
        Ok(config)
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> RegionResult<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| RegionError::InvalidConfig(format!("Failed to read config: {}", e)))?;

        Self::parse(&content)
    }

    /// Parse and validate configuration from a TOML string
    pub fn parse(content: &str) -> RegionResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| RegionError::InvalidConfig(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values no region or benchmark could run with.
    pub fn validate(&self) -> RegionResult<()> {
        if self.region.name.is_empty() {
            return Err(RegionError::MissingName);
        }
        if self.region.block_size == 0 || self.bench.block_size == 0 {
            return Err(RegionError::ZeroBlockSize);
        }
        if self.bench.sizes.is_empty() {
            return Err(RegionError::InvalidConfig("bench.sizes must not be empty".to_string()));
        }
        if self.bench.sizes.contains(&0) {
            return Err(RegionError::InvalidConfig("bench.sizes must be non-zero".to_string()));
        }
        self.log.to_log_config().map(|_| ())
    }

    /// Generate default configuration file content
    pub fn generate_default() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate config"))
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> RegionResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| RegionError::InvalidConfig(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, content)
            .map_err(|e| RegionError::InvalidConfig(format!("Failed to write config: {}", e)))
    }
}
