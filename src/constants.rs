// src/constants.rs

/// Milliseconds in one second
pub const MS_PER_SEC: i64 = 1000;

/// Milliseconds in one day (24 * 60 * 60 * 1000)
pub const MS_PER_DAY: i64 = 86_400_000;

/// Largest gap between two samples that still lets them share a run
pub const MAX_RUN_GAP_MS: i64 = MS_PER_SEC;

/// Default poll interval of the sampler
pub const DEFAULT_TICK_MS: u64 = 200;

/// Default time the sampler waits for one active-window query
pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 1000;

/// Default period of the time-triggered buffer flush
pub const DEFAULT_FLUSH_INTERVAL_SECS: u64 = 5;

/// Default number of buffered samples that forces a flush
pub const DEFAULT_MAX_BUFFER: usize = 100;

/// Default period between two compaction passes (10 minutes)
pub const DEFAULT_COMPACTION_INTERVAL_SECS: u64 = 10 * 60;

/// Default period between two VACUUM runs (1 hour)
pub const DEFAULT_VACUUM_INTERVAL_SECS: u64 = 60 * 60;

/// SQLite busy timeout for both connections
pub const SQLITE_BUSY_TIMEOUT_MS: u64 = 5000;

/// Report rows longer than this are truncated
pub const MAX_REPORT_NAME_LEN: usize = 80;

pub const DB_FILE_NAME: &str = "screentime.db";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const ALIAS_FILE_NAME: &str = "alias.json";

/// Sub-program rule files, tried in this order
pub const SUBPROGRAM_FILE_NAMES: &[&str] =
    &["subprograms.yaml", "subprograms.yml", "subprograms.json"];
