use crate::buffer::BufferConfig;
use crate::constants::{
    CONFIG_FILE_NAME, DB_FILE_NAME, DEFAULT_COMPACTION_INTERVAL_SECS, DEFAULT_FLUSH_INTERVAL_SECS,
    DEFAULT_MAX_BUFFER, DEFAULT_PROBE_TIMEOUT_MS, DEFAULT_TICK_MS, DEFAULT_VACUUM_INTERVAL_SECS,
};
use crate::error::{AppError, Result};
use crate::maintenance::MaintenanceConfig;
use crate::tracker::SamplerConfig;
use directories::ProjectDirs;
use log::debug;
use serde::Deserialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Per-user directories: the database lives in `data_dir`, every
/// hand-edited file in `config_dir`.
#[derive(Debug, Clone)]
pub struct Paths {
    pub data_dir: PathBuf,
    pub config_dir: PathBuf,
}

impl Paths {
    pub fn discover() -> Result<Self> {
        let dirs = ProjectDirs::from("dev", "screentime", "screentime")
            .ok_or(AppError::NoProjectDirs)?;
        Ok(Self {
            data_dir: dirs.data_dir().to_path_buf(),
            config_dir: dirs.config_dir().to_path_buf(),
        })
    }

    /// Database file path, creating the data directory if needed.
    pub fn db_path(&self) -> Result<PathBuf> {
        fs::create_dir_all(&self.data_dir)?;
        Ok(self.data_dir.join(DB_FILE_NAME))
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join(CONFIG_FILE_NAME)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub daemon: DaemonConfig,
}

/// The `[daemon]` table of `config.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DaemonConfig {
    pub tick_ms: u64,
    pub probe_timeout_ms: u64,
    /// 0 disables idle detection.
    pub idle_threshold_secs: u64,
    pub flush_interval_secs: u64,
    pub max_buffer: usize,
    pub compaction_interval_secs: u64,
    pub vacuum_interval_secs: u64,
    /// 0 keeps records forever.
    pub retention_days: u32,
    pub fail_on_source_error: bool,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            tick_ms: DEFAULT_TICK_MS,
            probe_timeout_ms: DEFAULT_PROBE_TIMEOUT_MS,
            idle_threshold_secs: 0,
            flush_interval_secs: DEFAULT_FLUSH_INTERVAL_SECS,
            max_buffer: DEFAULT_MAX_BUFFER,
            compaction_interval_secs: DEFAULT_COMPACTION_INTERVAL_SECS,
            vacuum_interval_secs: DEFAULT_VACUUM_INTERVAL_SECS,
            retention_days: 0,
            fail_on_source_error: false,
        }
    }
}

impl Config {
    /// Read `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(contents) => Self::parse(&contents, path),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No config at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Parse and validate. `path` only labels errors.
    pub fn parse(contents: &str, path: &Path) -> Result<Self> {
        let config: Self = toml::from_str(contents).map_err(|e| AppError::Config {
            path: path.to_path_buf(),
            reason: e.message().to_string(),
        })?;
        config.daemon.validate().map_err(|reason| AppError::Config {
            path: path.to_path_buf(),
            reason,
        })?;
        Ok(config)
    }
}

impl DaemonConfig {
    fn validate(&self) -> std::result::Result<(), String> {
        let intervals = [
            ("tick_ms", self.tick_ms),
            ("probe_timeout_ms", self.probe_timeout_ms),
            ("flush_interval_secs", self.flush_interval_secs),
            ("compaction_interval_secs", self.compaction_interval_secs),
            ("vacuum_interval_secs", self.vacuum_interval_secs),
        ];
        if let Some((name, _)) = intervals.iter().find(|(_, value)| *value == 0) {
            return Err(format!("{name} must be greater than 0"));
        }
        if self.max_buffer == 0 {
            return Err("max_buffer must be at least 1".into());
        }
        Ok(())
    }

    pub fn sampler(&self) -> SamplerConfig {
        SamplerConfig {
            tick: Duration::from_millis(self.tick_ms),
            probe_timeout: Duration::from_millis(self.probe_timeout_ms),
            idle_threshold: (self.idle_threshold_secs > 0)
                .then(|| Duration::from_secs(self.idle_threshold_secs)),
            fail_on_source_error: self.fail_on_source_error,
        }
    }

    pub fn buffer(&self) -> BufferConfig {
        BufferConfig {
            flush_interval: Duration::from_secs(self.flush_interval_secs),
            max_buffer: self.max_buffer,
        }
    }

    pub fn compaction_interval(&self) -> Duration {
        Duration::from_secs(self.compaction_interval_secs)
    }

    pub fn maintenance(&self) -> MaintenanceConfig {
        MaintenanceConfig {
            vacuum_interval: Duration::from_secs(self.vacuum_interval_secs),
            retention: None,
        }
        .with_retention_days(self.retention_days)
    }
}
