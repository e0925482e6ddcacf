pub mod helpers;
pub mod migrations;
pub mod schema;

use crate::constants::SQLITE_BUSY_TIMEOUT_MS;
use crate::error::{AppError, Result};
use crate::models::{Aggregate, Sample};
use crate::safe_lock;
use helpers::{in_transaction, logged};
use log::{debug, warn};
use rusqlite::{Connection, Transaction};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

/// SQLite store for raw samples and aggregates.
///
/// Every write goes through the single writer connection, whose mutex is
/// the write gate: buffer flushes, compaction folds and maintenance never
/// interleave. Reads use a second connection and, with WAL, only ever see
/// committed transactions.
pub struct Database {
    writer: Mutex<Connection>,
    reader: Mutex<Connection>,
    path: PathBuf,
}

fn open_connection(path: &Path) -> rusqlite::Result<Connection> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(Duration::from_millis(SQLITE_BUSY_TIMEOUT_MS))?;
    conn.execute_batch(schema::PRAGMAS)?;
    Ok(conn)
}

impl Database {
    /// Open (or create) the database file and bring the schema up to date.
    pub fn open(path: &Path) -> Result<Self> {
        let writer = open_connection(path)?;
        migrations::run(&writer)?;
        let reader = open_connection(path)?;
        debug!("Opened database at {}", path.display());

        Ok(Self {
            writer: Mutex::new(writer),
            reader: Mutex::new(reader),
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run a single write statement under the write gate.
    pub fn write<F, T>(&self, operation: &str, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T>,
    {
        let conn = safe_lock(&self.writer, "Database writer");
        f(&conn).map_err(|e| logged(operation, e))
    }

    /// Run `f` as one all-or-nothing transaction under the write gate.
    pub fn transaction<F, T>(&self, operation: &str, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction<'_>) -> rusqlite::Result<T>,
    {
        let mut conn = safe_lock(&self.writer, "Database writer");
        in_transaction(&mut conn, operation, f)
    }

    /// Run a query on the reader connection. Never waits for the write gate.
    pub fn read<F, T>(&self, operation: &str, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T>,
    {
        let conn = safe_lock(&self.reader, "Database reader");
        f(&conn).map_err(|e| logged(operation, e))
    }

    /// Run several queries on the reader connection inside one read
    /// transaction, so they all see the same committed snapshot.
    pub fn snapshot<F, T>(&self, operation: &str, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction<'_>) -> rusqlite::Result<T>,
    {
        let conn = safe_lock(&self.reader, "Database reader");
        let result = conn.unchecked_transaction().and_then(|tx| {
            let value = f(&tx)?;
            tx.commit()?;
            Ok(value)
        });
        result.map_err(|e| logged(operation, e))
    }

    // Raw samples

    pub fn insert_sample(&self, sample: &mut Sample) -> Result<()> {
        self.write("insert sample", |conn| sample.save(conn))
    }

    pub fn bulk_insert_samples(&self, samples: &[Sample]) -> Result<()> {
        if samples.is_empty() {
            return Ok(());
        }
        self.transaction("bulk insert samples", |tx| Sample::insert_all(tx, samples))
    }

    pub fn samples_in_range(&self, from_ms: i64, to_ms: i64) -> Result<Vec<Sample>> {
        self.read("load samples", |conn| Sample::find_in_range(conn, from_ms, to_ms))
    }

    pub fn all_samples(&self) -> Result<Vec<Sample>> {
        self.read("load all samples", Sample::find_all)
    }

    /// Returns whether a row was deleted.
    pub fn delete_sample(&self, id: i64) -> Result<bool> {
        self.write("delete sample", |conn| Sample::delete(conn, id))
            .map(|deleted| deleted > 0)
    }

    pub fn delete_samples_before(&self, before_ms: i64) -> Result<usize> {
        self.write("delete old samples", |conn| Sample::delete_before(conn, before_ms))
    }

    // Aggregates

    pub fn insert_aggregate(&self, aggregate: &Aggregate) -> Result<()> {
        self.write("insert aggregate", |conn| aggregate.save(conn))
    }

    pub fn bulk_insert_aggregates(&self, aggregates: &[Aggregate]) -> Result<()> {
        if aggregates.is_empty() {
            return Ok(());
        }
        self.transaction("bulk insert aggregates", |tx| Aggregate::insert_all(tx, aggregates))
    }

    pub fn aggregates_in_range(&self, from_ms: i64, to_ms: i64) -> Result<Vec<Aggregate>> {
        self.read("load aggregates", |conn| Aggregate::find_in_range(conn, from_ms, to_ms))
    }

    /// Samples and aggregates in `[from_ms, to_ms]` as of one snapshot.
    pub fn usage_in_range(
        &self,
        from_ms: i64,
        to_ms: i64,
    ) -> Result<(Vec<Sample>, Vec<Aggregate>)> {
        self.snapshot("load usage", |tx| {
            let samples = Sample::find_in_range(tx, from_ms, to_ms)?;
            let aggregates = Aggregate::find_in_range(tx, from_ms, to_ms)?;
            Ok((samples, aggregates))
        })
    }

    pub fn delete_aggregates_before(&self, before_ms: i64) -> Result<usize> {
        self.write("delete old aggregates", |conn| Aggregate::delete_before(conn, before_ms))
    }

    // Compaction and maintenance

    /// Insert `aggregate` and delete the samples it replaces in one
    /// transaction, so readers see either the samples or the aggregate.
    ///
    /// Fails with [`AppError::StaleRun`] and changes nothing if any of the
    /// samples was deleted since it was read.
    pub fn fold_run(&self, aggregate: &Aggregate, sample_ids: &[i64]) -> Result<()> {
        let mut conn = safe_lock(&self.writer, "Database writer");
        let tx = conn.transaction().map_err(|e| logged("fold run", e))?;

        let deleted = Sample::delete_many(&tx, sample_ids).map_err(|e| logged("fold run", e))?;
        if deleted != sample_ids.len() {
            // Dropping the transaction rolls the deletes back
            warn!(
                "Not folding {} samples of {}: only {deleted} are still stored",
                sample_ids.len(),
                aggregate.app_id
            );
            return Err(AppError::StaleRun {
                expected: sample_ids.len(),
                deleted,
            });
        }

        aggregate
            .save(&tx)
            .and_then(|()| tx.commit())
            .map_err(|e| logged("fold run", e))
    }

    /// Delete samples and aggregates older than `before_ms`.
    /// Returns `(samples, aggregates)` deleted.
    pub fn prune_before(&self, before_ms: i64) -> Result<(usize, usize)> {
        self.transaction("prune old records", |tx| {
            let samples = Sample::delete_before(tx, before_ms)?;
            let aggregates = Aggregate::delete_before(tx, before_ms)?;
            Ok((samples, aggregates))
        })
    }

    /// Reclaim free pages. Unrelated to data-level compaction.
    pub fn vacuum(&self) -> Result<()> {
        self.write("vacuum database", |conn| conn.execute_batch("VACUUM"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::setup_test_db;
    use std::sync::Arc;
    use std::thread;
    use tempfile::tempdir;

    fn count(db: &Database, table: &str) -> i64 {
        db.read("count rows", |conn| {
            conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
        })
        .unwrap()
    }

    #[test]
    fn test_database_opens() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let _db = Database::open(&db_path).unwrap();
        assert!(db_path.exists());
    }

    #[test]
    fn test_all_tables_created() {
        let (db, _dir) = setup_test_db();

        let expected_tables = ["screen_time", "aggregated_screen_time"];
        for table in &expected_tables {
            let count: i32 = db
                .read("check table", |conn| {
                    conn.query_row(
                        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                        [table],
                        |row| row.get(0),
                    )
                })
                .unwrap();
            assert_eq!(count, 1, "Table {table} should exist");
        }
    }

    #[test]
    fn test_wal_mode_enabled() {
        let (db, _dir) = setup_test_db();
        let mode: String = db
            .read("read journal mode", |conn| {
                conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))
            })
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
    }

    #[test]
    fn test_reopen_keeps_data() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");

        {
            let db = Database::open(&db_path).unwrap();
            db.bulk_insert_samples(&[Sample::new(1_000, "kitty", "vim", 200)])
                .unwrap();
        }

        // Opening again re-runs migrations against existing tables
        let db = Database::open(&db_path).unwrap();
        assert_eq!(count(&db, "screen_time"), 1);
    }

    #[test]
    fn test_insert_sample_assigns_id() {
        let (db, _dir) = setup_test_db();
        let mut sample = Sample::new(1_000, "kitty", "vim", 200);
        db.insert_sample(&mut sample).unwrap();

        let id = sample.id.unwrap();
        assert!(db.delete_sample(id).unwrap());
        assert!(!db.delete_sample(id).unwrap());
    }

    #[test]
    fn test_bulk_insert_rolls_back_on_bad_row() {
        let (db, _dir) = setup_test_db();
        db.write("install trigger", |conn| {
            conn.execute_batch(
                "CREATE TRIGGER reject_bad BEFORE INSERT ON screen_time
                 WHEN NEW.app_id = 'bad'
                 BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
            )
        })
        .unwrap();

        let batch = vec![
            Sample::new(1_000, "kitty", "vim", 200),
            Sample::new(1_200, "bad", "vim", 200),
            Sample::new(1_400, "kitty", "vim", 200),
        ];

        assert!(db.bulk_insert_samples(&batch).is_err());
        assert_eq!(count(&db, "screen_time"), 0, "No partial batch may be persisted");

        // The gate is released and later writes still succeed
        db.bulk_insert_samples(&batch[..1]).unwrap();
        assert_eq!(count(&db, "screen_time"), 1);
    }

    #[test]
    fn test_fold_run_is_atomic() {
        let (db, _dir) = setup_test_db();
        let mut pinned = Sample::new(1_000, "pinned", "vim", 200);
        db.insert_sample(&mut pinned).unwrap();
        db.write("install trigger", |conn| {
            conn.execute_batch(
                "CREATE TRIGGER keep_pinned BEFORE DELETE ON screen_time
                 WHEN OLD.app_id = 'pinned'
                 BEGIN SELECT RAISE(ABORT, 'pinned'); END;",
            )
        })
        .unwrap();

        let aggregate = Aggregate::from_sample(&pinned);
        assert!(db.fold_run(&aggregate, &[pinned.id.unwrap()]).is_err());

        assert_eq!(count(&db, "aggregated_screen_time"), 0);
        assert_eq!(count(&db, "screen_time"), 1);
    }

    #[test]
    fn test_fold_run_moves_samples_into_aggregate() {
        let (db, _dir) = setup_test_db();
        let mut a = Sample::new(1_000, "kitty", "vim", 200);
        let mut b = Sample::new(1_200, "kitty", "vim", 200);
        db.insert_sample(&mut a).unwrap();
        db.insert_sample(&mut b).unwrap();

        let mut aggregate = Aggregate::from_sample(&a);
        aggregate.absorb(&b);
        db.fold_run(&aggregate, &[a.id.unwrap(), b.id.unwrap()]).unwrap();

        assert!(db.all_samples().unwrap().is_empty());
        assert_eq!(db.aggregates_in_range(0, 10_000).unwrap(), vec![aggregate]);
    }

    #[test]
    fn test_fold_run_refuses_pruned_samples() {
        let (db, _dir) = setup_test_db();
        db.bulk_insert_samples(&[Sample::new(1_000, "kitty", "vim", 200)])
            .unwrap();
        let scanned = db.all_samples().unwrap();

        db.prune_before(5_000).unwrap();

        let aggregate = Aggregate::from_sample(&scanned[0]);
        match db.fold_run(&aggregate, &[scanned[0].id.unwrap()]) {
            Err(AppError::StaleRun { expected, deleted }) => {
                assert_eq!((expected, deleted), (1, 0));
            }
            other => panic!("Expected stale run, got {other:?}"),
        }
        assert_eq!(count(&db, "aggregated_screen_time"), 0);
    }

    #[test]
    fn test_partially_deleted_run_is_rolled_back() {
        let (db, _dir) = setup_test_db();
        let mut a = Sample::new(1_000, "kitty", "vim", 200);
        let mut b = Sample::new(1_200, "kitty", "vim", 200);
        db.insert_sample(&mut a).unwrap();
        db.insert_sample(&mut b).unwrap();
        let mut aggregate = Aggregate::from_sample(&a);
        aggregate.absorb(&b);
        let ids = [a.id.unwrap(), b.id.unwrap()];

        db.delete_sample(ids[1]).unwrap();

        assert!(matches!(
            db.fold_run(&aggregate, &ids),
            Err(AppError::StaleRun {
                expected: 2,
                deleted: 1
            })
        ));
        assert_eq!(db.all_samples().unwrap(), vec![a]);
        assert_eq!(count(&db, "aggregated_screen_time"), 0);
    }

    #[test]
    fn test_folding_same_run_twice_fails() {
        let (db, _dir) = setup_test_db();
        let mut a = Sample::new(1_000, "kitty", "vim", 200);
        db.insert_sample(&mut a).unwrap();
        let aggregate = Aggregate::from_sample(&a);

        db.fold_run(&aggregate, &[a.id.unwrap()]).unwrap();
        assert!(db.fold_run(&aggregate, &[a.id.unwrap()]).is_err());

        assert_eq!(db.aggregates_in_range(0, 10_000).unwrap(), vec![aggregate]);
    }

    #[test]
    fn test_usage_in_range_reads_both_tables() {
        let (db, _dir) = setup_test_db();
        db.bulk_insert_samples(&[
            Sample::new(1_000, "kitty", "vim", 200),
            Sample::new(20_000, "kitty", "vim", 200),
        ])
        .unwrap();
        db.insert_aggregate(&Aggregate {
            timestamp_ms: 2_000,
            app_id: "kitty".into(),
            title: "vim".into(),
            duration_ms: 400,
        })
        .unwrap();

        let (samples, aggregates) = db.usage_in_range(0, 10_000).unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(aggregates.len(), 1);
    }

    #[test]
    fn test_prune_before_touches_both_tables() {
        let (db, _dir) = setup_test_db();
        db.bulk_insert_samples(&[
            Sample::new(1_000, "kitty", "vim", 200),
            Sample::new(9_000, "kitty", "vim", 200),
        ])
        .unwrap();
        db.bulk_insert_aggregates(&[
            Aggregate {
                timestamp_ms: 2_000,
                app_id: "kitty".into(),
                title: "vim".into(),
                duration_ms: 400,
            },
            Aggregate {
                timestamp_ms: 8_000,
                app_id: "kitty".into(),
                title: "vim".into(),
                duration_ms: 400,
            },
        ])
        .unwrap();

        assert_eq!(db.prune_before(5_000).unwrap(), (1, 1));
        assert_eq!(db.samples_in_range(0, 10_000).unwrap().len(), 1);
        assert_eq!(db.aggregates_in_range(0, 10_000).unwrap().len(), 1);

        db.vacuum().unwrap();
    }

    #[test]
    fn test_readers_never_see_partial_batches() {
        let (db, _dir) = setup_test_db();
        let db = Arc::new(db);
        const BATCH: i64 = 50;

        let writer = {
            let db = Arc::clone(&db);
            thread::spawn(move || {
                for round in 0..20 {
                    let batch: Vec<Sample> = (0..BATCH)
                        .map(|i| Sample::new(round * 1_000 + i, "kitty", "vim", 200))
                        .collect();
                    db.bulk_insert_samples(&batch).unwrap();
                }
            })
        };

        for _ in 0..50 {
            let rows = count(&db, "screen_time");
            assert_eq!(rows % BATCH, 0, "Reader saw a partial batch: {rows} rows");
        }

        writer.join().unwrap();
        assert_eq!(count(&db, "screen_time"), 20 * BATCH);
    }
}
