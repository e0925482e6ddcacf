use crate::constants::{DEFAULT_FLUSH_INTERVAL_SECS, DEFAULT_MAX_BUFFER};
use crate::db::Database;
use crate::error::{AppError, Result};
use crate::models::Sample;
use crate::safe_lock;
use log::{debug, info, warn};
use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Destination of flushed samples.
pub trait SampleStore: Send + Sync {
    /// Persist the whole batch or nothing.
    fn bulk_insert_samples(&self, samples: &[Sample]) -> Result<()>;
}

impl SampleStore for Database {
    fn bulk_insert_samples(&self, samples: &[Sample]) -> Result<()> {
        Database::bulk_insert_samples(self, samples)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BufferConfig {
    pub flush_interval: Duration,
    pub max_buffer: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            flush_interval: Duration::from_secs(DEFAULT_FLUSH_INTERVAL_SECS),
            max_buffer: DEFAULT_MAX_BUFFER,
        }
    }
}

enum WriterCommand {
    Batch(Vec<Sample>),
    Shutdown,
}

struct Shared {
    pending: Mutex<Vec<Sample>>,
    store: Arc<dyn SampleStore>,
}

impl Shared {
    fn take(&self) -> Vec<Sample> {
        mem::take(&mut *safe_lock(&self.pending, "WriteBuffer"))
    }

    /// Put a failed batch back in front of anything added since.
    fn requeue(&self, mut batch: Vec<Sample>) {
        let mut pending = safe_lock(&self.pending, "WriteBuffer");
        batch.append(&mut pending);
        *pending = batch;
    }

    fn write(&self, batch: Vec<Sample>) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        match self.store.bulk_insert_samples(&batch) {
            Ok(()) => {
                debug!("Flushed {} samples", batch.len());
                Ok(())
            }
            Err(e) => {
                warn!("Failed to flush {} samples, keeping them for retry: {e}", batch.len());
                self.requeue(batch);
                Err(e)
            }
        }
    }
}

struct Writer {
    tx: Sender<WriterCommand>,
    handle: JoinHandle<()>,
}

/// In-memory queue between the sampler and storage.
///
/// `add` never touches storage: full batches are handed to a background
/// writer thread, which also flushes whatever is pending every
/// `flush_interval`. A batch the store rejects goes back to the front of the
/// queue and is retried by the next flush.
pub struct WriteBuffer {
    shared: Arc<Shared>,
    config: BufferConfig,
    running: AtomicBool,
    writer: Mutex<Option<Writer>>,
}

impl WriteBuffer {
    pub fn new(store: Arc<dyn SampleStore>, config: BufferConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                pending: Mutex::new(Vec::with_capacity(config.max_buffer)),
                store,
            }),
            config,
            running: AtomicBool::new(false),
            writer: Mutex::new(None),
        }
    }

    /// Spawn the writer thread. Calling `start` on a running buffer is a no-op.
    pub fn start(&self) -> Result<()> {
        let mut writer = safe_lock(&self.writer, "WriteBuffer writer");
        if writer.is_some() {
            return Ok(());
        }

        let (tx, rx) = mpsc::channel();
        let shared = Arc::clone(&self.shared);
        let flush_interval = self.config.flush_interval;
        let handle = thread::Builder::new()
            .name("buffer-writer".into())
            .spawn(move || writer_loop(&shared, &rx, flush_interval))?;

        *writer = Some(Writer { tx, handle });
        self.running.store(true, Ordering::SeqCst);
        info!(
            "Write buffer started (flush every {flush_interval:?}, max {} samples)",
            self.config.max_buffer
        );
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Queue a sample. Reaching `max_buffer` hands the whole queue to the
    /// writer thread before returning.
    ///
    /// Only the sample that brings the queue to exactly `max_buffer` does
    /// this. A requeued batch that already exceeds it waits for the timer.
    pub fn add(&self, sample: Sample) {
        let batch = {
            let mut pending = safe_lock(&self.shared.pending, "WriteBuffer");
            pending.push(sample);
            if pending.len() != self.config.max_buffer || !self.is_running() {
                return;
            }
            mem::take(&mut *pending)
        };
        self.send(batch);
    }

    /// Hand everything pending to the writer thread without waiting for it.
    pub fn flush(&self) {
        let batch = self.shared.take();
        if !batch.is_empty() {
            self.send(batch);
        }
    }

    /// Write everything pending on the calling thread.
    pub fn flush_now(&self) -> Result<()> {
        self.shared.write(self.shared.take())
    }

    pub fn len(&self) -> usize {
        safe_lock(&self.shared.pending, "WriteBuffer").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop the writer, wait for the batch it may be writing, then flush
    /// what is left synchronously.
    ///
    /// Returns [`AppError::Shutdown`] with the number of samples still in
    /// memory if the final flush fails.
    pub fn stop(&self) -> Result<()> {
        self.running.store(false, Ordering::SeqCst);

        let writer = safe_lock(&self.writer, "WriteBuffer writer").take();
        if let Some(Writer { tx, handle }) = writer {
            // The receiver only disappears once the thread has exited
            let _ = tx.send(WriterCommand::Shutdown);
            if handle.join().is_err() {
                warn!("Buffer writer thread panicked");
            }
        }

        match self.flush_now() {
            Ok(()) => {
                info!("Write buffer stopped");
                Ok(())
            }
            Err(e) => {
                let unflushed = self.len();
                warn!("Final flush failed with {unflushed} samples pending: {e}");
                Err(AppError::Shutdown { unflushed })
            }
        }
    }

    fn send(&self, batch: Vec<Sample>) {
        let writer = safe_lock(&self.writer, "WriteBuffer writer");
        let sent = match writer.as_ref() {
            Some(Writer { tx, .. }) => tx
                .send(WriterCommand::Batch(batch))
                .map_err(|mpsc::SendError(command)| command),
            None => Err(WriterCommand::Batch(batch)),
        };
        drop(writer);

        if let Err(WriterCommand::Batch(batch)) = sent {
            debug!("Buffer writer is not running, keeping {} samples", batch.len());
            self.shared.requeue(batch);
        }
    }
}

fn writer_loop(shared: &Shared, rx: &Receiver<WriterCommand>, flush_interval: Duration) {
    let mut last_flush = Instant::now();

    loop {
        let wait = flush_interval.saturating_sub(last_flush.elapsed());
        match rx.recv_timeout(wait) {
            Ok(WriterCommand::Batch(batch)) => {
                // Failures are requeued and logged inside `write`
                let _ = shared.write(batch);
            }
            Ok(WriterCommand::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }

        if last_flush.elapsed() >= flush_interval {
            let _ = shared.write(shared.take());
            last_flush = Instant::now();
        }
    }

    debug!("Buffer writer exiting");
}
