//! Centralized environment variable names and default values for pipeline tuning.

// Environment variable names
pub const ENV_READERS: &str = "TALLY_READERS";
pub const ENV_WORKERS: &str = "TALLY_WORKERS";
pub const ENV_CHANNEL_CAP: &str = "TALLY_CHANNEL_CAP";
pub const ENV_ALLOW_EMPTY: &str = "TALLY_ALLOW_EMPTY";

// Defaults
/// Items buffered per channel before a producer blocks. Each intake item is a
/// whole file, so this also bounds how many loaded files sit in memory.
pub const DEFAULT_CHANNEL_CAP: usize = 8;
/// Reader threads mostly wait on I/O, so they may outnumber cores.
pub const READERS_PER_CORE: usize = 2;
pub const MAX_DEFAULT_READERS: usize = 32;

pub const DEFAULT_PATTERN: &str = "*.csv";
pub const DEFAULT_KEY_COLUMN: &str = "city_code";
pub const DEFAULT_VALUE_COLUMN: &str = "temperature";

/// Relative tolerance used when comparing pipeline output to the baseline.
pub const BASELINE_REL_TOL: f64 = 1e-9;
