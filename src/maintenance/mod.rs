use crate::constants::DEFAULT_VACUUM_INTERVAL_SECS;
use crate::db::Database;
use crate::error::Result;
use crate::lifecycle::StopSignal;
use crate::safe_lock;
use chrono::Utc;
use log::{debug, info, warn};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct MaintenanceConfig {
    pub vacuum_interval: Duration,
    /// Records older than this are deleted from both tables. `None` keeps
    /// everything.
    pub retention: Option<Duration>,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            vacuum_interval: Duration::from_secs(DEFAULT_VACUUM_INTERVAL_SECS),
            retention: None,
        }
    }
}

impl MaintenanceConfig {
    pub fn with_retention_days(mut self, days: u32) -> Self {
        self.retention = (days > 0).then(|| Duration::from_secs(u64::from(days) * 24 * 60 * 60));
        self
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MaintenanceStats {
    pub samples_pruned: usize,
    pub aggregates_pruned: usize,
}

/// Periodic retention pruning and VACUUM. Independent of compaction.
pub struct Maintenance {
    db: Arc<Database>,
    config: MaintenanceConfig,
    stop: StopSignal,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Maintenance {
    pub fn new(db: Arc<Database>, config: MaintenanceConfig) -> Self {
        Self {
            db,
            config,
            stop: StopSignal::new(),
            handle: Mutex::new(None),
        }
    }

    /// Prune records older than the retention window ending at `now_ms`,
    /// then reclaim free pages.
    pub fn run_once(&self, now_ms: i64) -> Result<MaintenanceStats> {
        maintain(&self.db, self.config.retention, now_ms)
    }

    pub fn start(&self) -> Result<()> {
        let mut handle = safe_lock(&self.handle, "Maintenance");
        if handle.is_some() {
            return Ok(());
        }

        let db = Arc::clone(&self.db);
        let stop = self.stop.clone();
        let MaintenanceConfig {
            vacuum_interval,
            retention,
        } = self.config;
        *handle = Some(
            thread::Builder::new()
                .name("maintenance".into())
                .spawn(move || {
                    while !stop.wait(vacuum_interval) {
                        // Non-fatal: next run retries
                        if let Err(e) = maintain(&db, retention, Utc::now().timestamp_millis()) {
                            warn!("Database maintenance failed: {e}");
                        }
                    }
                })?,
        );

        info!("Maintenance started (every {vacuum_interval:?}, retention {retention:?})");
        Ok(())
    }

    pub fn stop(&self) {
        self.stop.stop();
        if let Some(handle) = safe_lock(&self.handle, "Maintenance").take() {
            if handle.join().is_err() {
                warn!("Maintenance thread panicked");
            }
        }
    }
}

fn retention_cutoff(retention: Duration, now_ms: i64) -> i64 {
    let retention_ms = i64::try_from(retention.as_millis()).unwrap_or(i64::MAX);
    now_ms.saturating_sub(retention_ms)
}

fn maintain(db: &Database, retention: Option<Duration>, now_ms: i64) -> Result<MaintenanceStats> {
    let mut stats = MaintenanceStats::default();

    if let Some(retention) = retention {
        let cutoff = retention_cutoff(retention, now_ms);
        let (samples, aggregates) = db.prune_before(cutoff)?;
        stats = MaintenanceStats {
            samples_pruned: samples,
            aggregates_pruned: aggregates,
        };
        if samples + aggregates > 0 {
            info!("Retention pruned {samples} samples and {aggregates} aggregates");
        }
    }

    db.vacuum()?;
    debug!("Vacuumed {}", db.path().display());
    Ok(stats)
}
