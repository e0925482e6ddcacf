use crate::constants::{DEFAULT_COMPACTION_INTERVAL_SECS, MAX_RUN_GAP_MS};
use crate::db::Database;
use crate::error::Result;
use crate::lifecycle::StopSignal;
use crate::models::{Aggregate, Sample};
use crate::safe_lock;
use chrono::{Local, NaiveDate, TimeZone};
use log::{debug, error, info, warn};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// A closed run of samples and the aggregate that replaces it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Run {
    pub aggregate: Aggregate,
    pub sample_ids: Vec<i64>,
}

impl Run {
    fn start(sample: &Sample) -> Self {
        Self {
            aggregate: Aggregate::from_sample(sample),
            sample_ids: sample.id.into_iter().collect(),
        }
    }

    fn push(&mut self, sample: &Sample) {
        self.aggregate.absorb(sample);
        self.sample_ids.extend(sample.id);
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct RunPlan {
    /// Runs closed by a later sample, ready to fold.
    pub runs: Vec<Run>,
    /// Samples of the trailing run, which stay raw until a later pass.
    pub left: usize,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CompactionStats {
    pub runs_folded: usize,
    pub samples_folded: usize,
    pub samples_left: usize,
}

fn local_day(timestamp_ms: i64) -> Option<NaiveDate> {
    Local
        .timestamp_millis_opt(timestamp_ms)
        .single()
        .map(|dt| dt.date_naive())
}

/// Whether `next` extends the run whose latest sample is `prev`.
fn continues(prev: &Sample, next: &Sample) -> bool {
    if prev.app_id != next.app_id || prev.title != next.title {
        return false;
    }
    if next.timestamp_ms.saturating_sub(prev.timestamp_ms) > MAX_RUN_GAP_MS {
        return false;
    }
    // Midnight always splits a run
    match (local_day(prev.timestamp_ms), local_day(next.timestamp_ms)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// Group samples (ordered by timestamp, then id) into maximal runs.
///
/// Every run except the last is closed. The last one may still grow with
/// samples that have not been flushed yet, so it is only counted in `left`.
pub fn plan_runs(samples: &[Sample]) -> RunPlan {
    let mut plan = RunPlan::default();
    let mut open: Option<(Run, &Sample)> = None;

    for sample in samples {
        open = Some(match open.take() {
            Some((mut run, prev)) if continues(prev, sample) => {
                run.push(sample);
                (run, sample)
            }
            Some((run, _)) => {
                plan.runs.push(run);
                (Run::start(sample), sample)
            }
            None => (Run::start(sample), sample),
        });
    }

    plan.left = open.map_or(0, |(run, _)| run.sample_ids.len());
    plan
}

/// Background job folding closed runs of raw samples into aggregates.
pub struct Compactor {
    db: Arc<Database>,
    interval: Duration,
    stop: StopSignal,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Compactor {
    pub fn new(db: Arc<Database>, interval: Duration) -> Self {
        Self {
            db,
            interval,
            stop: StopSignal::new(),
            handle: Mutex::new(None),
        }
    }

    pub fn with_default_interval(db: Arc<Database>) -> Self {
        Self::new(db, Duration::from_secs(DEFAULT_COMPACTION_INTERVAL_SECS))
    }

    /// One compaction pass over every raw sample.
    ///
    /// Each run is folded in its own transaction. The first storage error
    /// ends the pass: runs folded before it stay committed, the rest are
    /// picked up next time.
    pub fn run_once(&self) -> Result<CompactionStats> {
        compact(&self.db)
    }

    pub fn start(&self) -> Result<()> {
        let mut handle = safe_lock(&self.handle, "Compactor");
        if handle.is_some() {
            return Ok(());
        }

        let db = Arc::clone(&self.db);
        let stop = self.stop.clone();
        let interval = self.interval;
        *handle = Some(
            thread::Builder::new()
                .name("compactor".into())
                .spawn(move || {
                    while !stop.wait(interval) {
                        if let Err(e) = compact(&db) {
                            error!("Compaction pass failed: {e}");
                        }
                    }
                })?,
        );

        info!("Compactor started (every {interval:?})");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        safe_lock(&self.handle, "Compactor").is_some()
    }

    /// Wake the loop and wait for the pass in progress, if any, to finish.
    pub fn stop(&self) {
        self.stop.stop();
        if let Some(handle) = safe_lock(&self.handle, "Compactor").take() {
            if handle.join().is_err() {
                warn!("Compactor thread panicked");
            }
        }
    }
}

fn compact(db: &Database) -> Result<CompactionStats> {
    let samples = db.all_samples()?;
    let plan = plan_runs(&samples);
    let mut stats = CompactionStats {
        samples_left: plan.left,
        ..CompactionStats::default()
    };

    for run in &plan.runs {
        db.fold_run(&run.aggregate, &run.sample_ids)?;
        stats.runs_folded += 1;
        stats.samples_folded += run.sample_ids.len();
    }

    debug!(
        "Compaction folded {} samples into {} aggregates, {} left raw",
        stats.samples_folded, stats.runs_folded, stats.samples_left
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{local_ms, setup_test_db};

    fn sample(id: i64, ts: i64, app: &str, title: &str) -> Sample {
        Sample {
            id: Some(id),
            ..Sample::new(ts, app, title, 200)
        }
    }

    fn total(db: &Database) -> i64 {
        let raw: i64 = db.all_samples().unwrap().iter().map(|s| s.duration_ms).sum();
        let folded: i64 = db
            .aggregates_in_range(i64::MIN, i64::MAX)
            .unwrap()
            .iter()
            .map(|a| a.duration_ms)
            .sum();
        raw + folded
    }

    // Mid-June keeps every test timestamp clear of DST transitions
    fn noon() -> i64 {
        local_ms(2024, 6, 15, 12, 0, 0, 0)
    }

    #[test]
    fn test_plan_groups_runs_and_leaves_trailing_run() {
        let t = noon();
        let samples = vec![
            sample(1, t, "kitty", "vim"),
            sample(2, t + 200, "kitty", "vim"),
            sample(3, t + 400, "firefox", "docs"),
            sample(4, t + 600, "kitty", "vim"),
            sample(5, t + 800, "kitty", "vim"),
        ];

        let plan = plan_runs(&samples);
        assert_eq!(plan.runs.len(), 2);
        assert_eq!(plan.runs[0].sample_ids, vec![1, 2]);
        assert_eq!(plan.runs[0].aggregate.timestamp_ms, t + 200);
        assert_eq!(plan.runs[0].aggregate.duration_ms, 400);
        assert_eq!(plan.runs[1].sample_ids, vec![3]);
        assert_eq!(plan.left, 2);
    }

    #[test]
    fn test_title_change_splits_run() {
        let t = noon();
        let plan = plan_runs(&[
            sample(1, t, "kitty", "vim"),
            sample(2, t + 200, "kitty", "htop"),
            sample(3, t + 400, "kitty", "htop"),
        ]);
        assert_eq!(plan.runs.len(), 1);
        assert_eq!(plan.runs[0].sample_ids, vec![1]);
        assert_eq!(plan.left, 2);
    }

    #[test]
    fn test_gap_threshold_is_inclusive() {
        let t = noon();
        let merged = plan_runs(&[
            sample(1, t, "kitty", "vim"),
            sample(2, t + 1_000, "kitty", "vim"),
            sample(3, t + 5_000, "firefox", "docs"),
        ]);
        assert_eq!(merged.runs[0].sample_ids, vec![1, 2]);

        let split = plan_runs(&[
            sample(1, t, "kitty", "vim"),
            sample(2, t + 1_001, "kitty", "vim"),
            sample(3, t + 5_000, "firefox", "docs"),
        ]);
        assert_eq!(split.runs.len(), 2);
        assert_eq!(split.runs[0].sample_ids, vec![1]);
        assert_eq!(split.runs[1].sample_ids, vec![2]);
    }

    #[test]
    fn test_midnight_splits_run() {
        let before = local_ms(2024, 6, 15, 23, 59, 59, 900);
        let after = local_ms(2024, 6, 16, 0, 0, 0, 100);
        assert_eq!(after - before, 200);

        let plan = plan_runs(&[
            sample(1, before, "kitty", "vim"),
            sample(2, after, "kitty", "vim"),
            sample(3, after + 60_000, "firefox", "docs"),
        ]);
        assert_eq!(plan.runs.len(), 2);
        assert_eq!(plan.runs[0].sample_ids, vec![1]);
        assert_eq!(plan.runs[1].sample_ids, vec![2]);
    }

    #[test]
    fn test_extreme_timestamps_do_not_overflow() {
        let plan = plan_runs(&[
            sample(1, i64::MIN, "kitty", "vim"),
            sample(2, i64::MAX, "kitty", "vim"),
        ]);
        assert_eq!(plan.runs.len(), 1);
        assert_eq!(plan.runs[0].sample_ids, vec![1]);
        assert_eq!(plan.left, 1);
    }

    #[test]
    fn test_empty_scan_plans_nothing() {
        assert_eq!(plan_runs(&[]), RunPlan::default());
    }

    #[test]
    fn test_single_sample_runs_become_aggregates() {
        let (db, _dir) = setup_test_db();
        let db = Arc::new(db);
        let t = noon();
        db.bulk_insert_samples(&[
            Sample::new(t, "kitty", "vim", 200),
            Sample::new(t + 200, "firefox", "docs", 200),
            Sample::new(t + 400, "kitty", "vim", 200),
        ])
        .unwrap();

        let stats = Compactor::with_default_interval(Arc::clone(&db)).run_once().unwrap();
        assert_eq!(
            stats,
            CompactionStats {
                runs_folded: 2,
                samples_folded: 2,
                samples_left: 1,
            }
        );

        let aggregates = db.aggregates_in_range(i64::MIN, i64::MAX).unwrap();
        assert_eq!(aggregates.len(), 2);
        assert!(aggregates.iter().all(|a| a.duration_ms == 200));
    }

    #[test]
    fn test_compaction_is_idempotent_and_preserves_duration() {
        let (db, _dir) = setup_test_db();
        let db = Arc::new(db);
        let t = noon();
        let samples: Vec<Sample> = (0..30)
            .map(|i| {
                let app = if i < 20 { "kitty" } else { "firefox" };
                Sample::new(t + i * 200, app, "main", 200)
            })
            .collect();
        db.bulk_insert_samples(&samples).unwrap();
        let before = total(&db);

        let compactor = Compactor::with_default_interval(Arc::clone(&db));
        let first = compactor.run_once().unwrap();
        assert_eq!(first.runs_folded, 1);
        assert_eq!(first.samples_folded, 20);
        assert_eq!(first.samples_left, 10);
        assert_eq!(total(&db), before);

        let second = compactor.run_once().unwrap();
        assert_eq!(second.runs_folded, 0);
        assert_eq!(second.samples_left, 10);
        assert_eq!(total(&db), before);
        assert_eq!(db.aggregates_in_range(i64::MIN, i64::MAX).unwrap().len(), 1);
    }

    #[test]
    fn test_storage_error_aborts_pass_but_keeps_earlier_folds() {
        let (db, _dir) = setup_test_db();
        let db = Arc::new(db);
        let t = noon();
        db.bulk_insert_samples(&[
            Sample::new(t, "kitty", "vim", 200),
            Sample::new(t + 200, "pinned", "x", 200),
            Sample::new(t + 400, "firefox", "docs", 200),
            Sample::new(t + 600, "kitty", "vim", 200),
        ])
        .unwrap();
        db.write("install trigger", |conn| {
            conn.execute_batch(
                "CREATE TRIGGER keep_pinned BEFORE DELETE ON screen_time
                 WHEN OLD.app_id = 'pinned'
                 BEGIN SELECT RAISE(ABORT, 'pinned'); END;",
            )
        })
        .unwrap();
        let before = total(&db);

        let compactor = Compactor::with_default_interval(Arc::clone(&db));
        assert!(compactor.run_once().is_err());

        // Only the run ahead of the failing one was folded
        let aggregates = db.aggregates_in_range(i64::MIN, i64::MAX).unwrap();
        assert_eq!(aggregates.len(), 1);
        assert_eq!(aggregates[0].app_id, "kitty");
        assert_eq!(db.all_samples().unwrap().len(), 3);
        assert_eq!(total(&db), before);
    }

    #[test]
    fn test_background_loop_compacts_and_stops() {
        let (db, _dir) = setup_test_db();
        let db = Arc::new(db);
        let t = noon();
        db.bulk_insert_samples(&[
            Sample::new(t, "kitty", "vim", 200),
            Sample::new(t + 200, "firefox", "docs", 200),
        ])
        .unwrap();

        let compactor = Compactor::new(Arc::clone(&db), Duration::from_millis(10));
        compactor.start().unwrap();
        assert!(compactor.is_running());

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while db.aggregates_in_range(i64::MIN, i64::MAX).unwrap().is_empty() {
            assert!(std::time::Instant::now() < deadline, "Compactor never ran");
            thread::sleep(Duration::from_millis(5));
        }

        compactor.stop();
        assert!(!compactor.is_running());
        assert_eq!(db.all_samples().unwrap().len(), 1);
    }
}
