// src/core/performance.rs

//! Fits the tool's `n_cpus` and `mem_gb` options to what the machine can give.

use crate::models::{ConfigOptions, OptionValue};
use std::fs;
use std::path::Path;
use std::thread;

/// Tool option holding the CPU count.
pub const N_CPUS_KEY: &str = "n_cpus";
/// Tool option holding the memory limit in GiB.
pub const MEM_GB_KEY: &str = "mem_gb";

const MEMINFO_PATH: &str = "/proc/meminfo";

/// Machine resources visible to this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resources {
    /// Usable CPU count.
    pub cpus: i64,
    /// Available memory in whole GiB, if it could be determined.
    pub mem_gb: Option<i64>,
}

impl Resources {
    /// Detects what the running machine offers.
    pub fn detect() -> Self {
        let cpus = thread::available_parallelism()
            .map(|n| i64::try_from(n.get()).unwrap_or(i64::MAX))
            .unwrap_or(1);
        let mem_gb = fs::read_to_string(Path::new(MEMINFO_PATH))
            .ok()
            .and_then(|content| available_memory_gb(&content));
        log::info!(
            "Available resources: {} CPUs, {} GiB memory",
            cpus,
            mem_gb.map_or_else(|| "unknown".to_string(), |m| m.to_string())
        );
        Self { cpus, mem_gb }
    }
}

/// Sets `n_cpus` and `mem_gb`: unset or zero means everything available,
/// anything above what is available is clamped.
pub fn apply_performance_config(options: &mut ConfigOptions, resources: Resources) {
    let cpus = clamp_option(options.get(N_CPUS_KEY), resources.cpus, N_CPUS_KEY);
    options.insert(N_CPUS_KEY, OptionValue::Integer(cpus));

    match resources.mem_gb {
        Some(available) => {
            let mem = clamp_option(options.get(MEM_GB_KEY), available, MEM_GB_KEY);
            options.insert(MEM_GB_KEY, OptionValue::Integer(mem));
        }
        None => log::warn!("Could not determine available memory; leaving {} as configured.", MEM_GB_KEY),
    }
}

fn clamp_option(current: Option<&OptionValue>, available: i64, name: &str) -> i64 {
    match current.and_then(requested_amount) {
        Some(requested) if requested > available => {
            log::warn!("{} > number available, using max {}", name, available);
            available
        }
        Some(requested) if requested > 0 => {
            log::info!("{} using {} from config", name, requested);
            requested
        }
        _ => {
            log::info!("using {} = {} (maximum available)", name, available);
            available
        }
    }
}

/// Integer amount asked for by an option; floats are truncated toward zero.
#[allow(clippy::cast_possible_truncation)]
fn requested_amount(value: &OptionValue) -> Option<i64> {
    match value {
        OptionValue::Integer(n) => Some(*n),
        OptionValue::Float(x) if x.is_finite() => Some(x.trunc() as i64),
        OptionValue::Text(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Parses the `MemAvailable` line of `/proc/meminfo` into whole GiB.
fn available_memory_gb(meminfo: &str) -> Option<i64> {
    let kib: i64 = meminfo
        .lines()
        .find_map(|line| line.strip_prefix("MemAvailable:"))?
        .split_whitespace()
        .next()?
        .parse()
        .ok()?;
    Some(kib / (1024 * 1024))
}
