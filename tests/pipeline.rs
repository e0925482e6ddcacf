//! End-to-end: samples through the write buffer, compaction, and reports.

use chrono::{Local, NaiveDate, TimeZone};
use screentime_lib::buffer::{BufferConfig, SampleStore, WriteBuffer};
use screentime_lib::compactor::Compactor;
use screentime_lib::db::Database;
use screentime_lib::models::{Aggregate, Sample};
use screentime_lib::report::rules::{AliasRules, SubProgramRules};
use screentime_lib::report::{app_report, load_usage, usage_by, GroupBy, TimeRange, UsageKey};
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 15).unwrap()
}

fn at(hour: u32, min: u32, sec: u32, milli: u32) -> i64 {
    let naive = day().and_hms_milli_opt(hour, min, sec, milli).unwrap();
    Local.from_local_datetime(&naive).earliest().unwrap().timestamp_millis()
}

fn aggregate(timestamp_ms: i64, app_id: &str, title: &str, duration_ms: i64) -> Aggregate {
    Aggregate {
        timestamp_ms,
        app_id: app_id.into(),
        title: title.into(),
        duration_ms,
    }
}

fn total_ms(db: &Database) -> i64 {
    let range = TimeRange::from_dates(Some(day()), Some(day()), day()).unwrap();
    load_usage(db, range).unwrap().iter().map(|r| r.duration_ms).sum()
}

#[test]
fn buffered_samples_survive_compaction() {
    let dir = tempdir().unwrap();
    let db = Arc::new(Database::open(&dir.path().join("screentime.db")).unwrap());

    let store: Arc<dyn SampleStore> = Arc::<Database>::clone(&db);
    let buffer = WriteBuffer::new(
        store,
        BufferConfig {
            flush_interval: Duration::from_secs(3600),
            max_buffer: 100,
        },
    );
    buffer.start().unwrap();

    // 10 minutes of editing, a browser detour, then back to the editor
    let start = at(9, 0, 0, 0);
    let mut expected = 0;
    for i in 0..3_000 {
        buffer.add(Sample::new(start + i * 200, "kitty", "vim", 200));
        expected += 200;
    }
    let browser_start = start + 3_000 * 200;
    for i in 0..50 {
        buffer.add(Sample::new(browser_start + i * 200, "firefox", "Cats - YouTube", 200));
        expected += 200;
    }
    for i in 0..25 {
        buffer.add(Sample::new(browser_start + 50 * 200 + i * 200, "kitty", "vim", 200));
        expected += 200;
    }
    buffer.stop().unwrap();
    assert_eq!(total_ms(&db), expected);

    let compactor = Compactor::new(Arc::clone(&db), Duration::from_secs(600));
    let stats = compactor.run_once().unwrap();
    assert_eq!(stats.runs_folded, 2);
    assert_eq!(stats.samples_folded, 3_050);
    assert_eq!(stats.samples_left, 25);
    assert_eq!(total_ms(&db), expected);

    let again = compactor.run_once().unwrap();
    assert_eq!(again.runs_folded, 0);
    assert_eq!(total_ms(&db), expected);

    let range = TimeRange::from_dates(Some(day()), Some(day()), day()).unwrap();
    let records = load_usage(&db, range).unwrap();
    let by_app = usage_by(&records, GroupBy::App);
    let kitty = UsageKey {
        app_id: "kitty".into(),
        title: None,
    };
    assert_eq!(by_app.get(&kitty), Some(&(3_025 * 200)));

    let rows = app_report(&records, &SubProgramRules::default(), &AliasRules::default());
    let firefox = rows.iter().find(|row| row.name == "firefox").unwrap();
    assert_eq!(firefox.time_ms, 50 * 200);
}

#[test]
fn report_combines_raw_and_aggregated_rows() {
    let dir = tempdir().unwrap();
    let db = Database::open(&dir.path().join("screentime.db")).unwrap();

    db.bulk_insert_samples(&[
        Sample::new(at(10, 0, 0, 0), "A", "x", 200),
        Sample::new(at(10, 0, 0, 200), "A", "x", 200),
    ])
    .unwrap();
    db.insert_aggregate(&aggregate(at(8, 0, 0, 0), "A", "x", 5_000))
        .unwrap();

    let range = TimeRange::from_dates(Some(day()), None, day()).unwrap();
    let by_app = usage_by(&load_usage(&db, range).unwrap(), GroupBy::App);
    assert_eq!(by_app.len(), 1);
    assert_eq!(by_app.values().copied().collect::<Vec<_>>(), vec![5_400]);
}
