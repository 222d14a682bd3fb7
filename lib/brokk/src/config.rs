//! Environment knobs for callers that want a worker count without picking
//! one, plus their defaults.

use std::env;

/// Overrides the default worker count used by the demo binaries.
pub const ENV_WORKERS: &str = "BROKK_WORKERS";

/// Worker count from `BROKK_WORKERS`, falling back to the number of logical
/// CPUs. Never returns zero.
pub fn default_workers() -> usize {
    env::var(ENV_WORKERS)
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .unwrap_or_else(num_cpus::get)
        .max(1)
}
