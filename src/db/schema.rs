pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS screen_time (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp_ms INTEGER NOT NULL,
    app_id TEXT NOT NULL,
    title TEXT NOT NULL,
    duration_ms INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS aggregated_screen_time (
    timestamp_ms INTEGER NOT NULL,
    app_id TEXT NOT NULL,
    title TEXT NOT NULL,
    duration_ms INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_screen_time_timestamp ON screen_time(timestamp_ms);
CREATE INDEX IF NOT EXISTS idx_aggregated_screen_time_timestamp ON aggregated_screen_time(timestamp_ms);
"#;

/// Connection settings applied to every connection before use.
pub const PRAGMAS: &str = r#"
PRAGMA journal_mode=WAL;
PRAGMA synchronous=NORMAL;
"#;
