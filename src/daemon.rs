use crate::buffer::{SampleStore, WriteBuffer};
use crate::compactor::Compactor;
use crate::config::DaemonConfig;
use crate::db::Database;
use crate::error::Result;
use crate::lifecycle::StopSignal;
use crate::maintenance::Maintenance;
use crate::platform::WindowSource;
use crate::tracker::Sampler;
use log::{error, info, warn};
use std::io;
use std::sync::Arc;
use std::thread;

/// Owns every background loop of the tracker and shuts them down in order.
pub struct Daemon {
    buffer: Arc<WriteBuffer>,
    compactor: Compactor,
    maintenance: Maintenance,
    sampler: Sampler,
    shutdown: StopSignal,
}

impl Daemon {
    pub fn new(db: Arc<Database>, source: Arc<dyn WindowSource>, config: &DaemonConfig) -> Self {
        let shutdown = StopSignal::new();
        let store: Arc<dyn SampleStore> = Arc::<Database>::clone(&db);
        let buffer = Arc::new(WriteBuffer::new(store, config.buffer()));
        let sampler = Sampler::new(source, Arc::clone(&buffer), config.sampler(), shutdown.clone());

        Self {
            compactor: Compactor::new(Arc::clone(&db), config.compaction_interval()),
            maintenance: Maintenance::new(db, config.maintenance()),
            buffer,
            sampler,
            shutdown,
        }
    }

    /// Raising this signal makes [`Daemon::wait`] return.
    pub fn shutdown_signal(&self) -> StopSignal {
        self.shutdown.clone()
    }

    /// Start storage-side loops first so the sampler never feeds a stopped
    /// buffer.
    pub fn start(&self) -> Result<()> {
        let started = self
            .maintenance
            .start()
            .and_then(|()| self.compactor.start())
            .and_then(|()| self.buffer.start())
            .and_then(|()| self.sampler.start());

        if let Err(e) = started {
            error!("Failed to start daemon: {e}");
            // Already-started loops still need their shutdown
            if let Err(stop_error) = self.stop() {
                warn!("Cleanup after failed start: {stop_error}");
            }
            return Err(e);
        }

        info!("Daemon started");
        Ok(())
    }

    pub fn wait(&self) {
        self.shutdown.wait_forever();
    }

    /// Stop sampling, flush the buffer, then stop compaction and maintenance.
    ///
    /// Every step runs even if an earlier one failed; the first error is
    /// returned.
    pub fn stop(&self) -> Result<()> {
        self.shutdown.stop();

        let sampled = self.sampler.stop();
        let flushed = self.buffer.stop();
        self.compactor.stop();
        self.maintenance.stop();

        info!("Daemon stopped");
        sampled.and(flushed)
    }

    /// Run until SIGINT/SIGTERM (or a fatal sampler error), then shut down.
    pub fn run(self) -> Result<()> {
        spawn_signal_watcher(self.shutdown_signal())?;
        self.start()?;
        self.wait();
        self.stop()
    }
}

/// Raise `shutdown` on the first SIGINT or SIGTERM.
pub fn spawn_signal_watcher(shutdown: StopSignal) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    thread::Builder::new()
        .name("signals".into())
        .spawn(move || {
            match runtime.block_on(wait_for_signal()) {
                Ok(name) => info!("Received {name}, shutting down"),
                Err(e) => error!("Signal handling failed, shutting down: {e}"),
            }
            shutdown.stop();
        })?;

    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() -> io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.map(|()| "SIGINT"),
        _ = terminate.recv() => Ok("SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> io::Result<&'static str> {
    tokio::signal::ctrl_c().await.map(|()| "Ctrl-C")
}
