//! Shared test utilities.
//!
//! This module provides common setup functions used across test modules.

#![cfg(test)]

use crate::db::Database;
use chrono::{Local, NaiveDate, TimeZone};
use tempfile::{tempdir, TempDir};

/// Create a temporary on-disk test database with the schema applied.
///
/// Returns a tuple of (Database, TempDir). The TempDir must be kept alive
/// for the duration of the test to prevent the database file from being deleted.
pub fn setup_test_db() -> (Database, TempDir) {
    let dir = tempdir().expect("Failed to create temp directory for test DB");
    let db_path = dir.path().join("test.db");
    let db = Database::open(&db_path).expect("Failed to open test database");
    (db, dir)
}

/// Epoch milliseconds of a local wall-clock time.
pub fn local_ms(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32, milli: u32) -> i64 {
    let naive = NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|d| d.and_hms_milli_opt(hour, min, sec, milli))
        .expect("valid test date");
    Local
        .from_local_datetime(&naive)
        .earliest()
        .expect("test date exists in local time zone")
        .timestamp_millis()
}
