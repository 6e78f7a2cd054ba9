//! Region allocator self-benchmark
//!
//! Usage: `memregion [config.toml]`. Prints the report as JSON on stdout.

use std::path::Path;

use memregion::{logging, run_benchmark, Config, MonotonicClock};

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = match std::env::args().nth(1) {
        Some(path) => Config::load(Path::new(&path))?,
        None => Config::default(),
    };

    let _guard = logging::init_logging(config.log.to_log_config()?);

    let report = run_benchmark(&config.bench, &MonotonicClock::new())?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
