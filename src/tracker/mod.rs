use crate::buffer::WriteBuffer;
use crate::constants::{DEFAULT_PROBE_TIMEOUT_MS, DEFAULT_TICK_MS};
use crate::error::Result;
use crate::lifecycle::StopSignal;
use crate::models::Sample;
use crate::platform::{ActiveWindow, WindowError, WindowSource};
use crate::safe_lock;
use chrono::Utc;
use log::{debug, error, info, warn};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TryRecvError, TrySendError};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
pub struct SamplerConfig {
    pub tick: Duration,
    /// Longest the sampler waits for one active-window query.
    pub probe_timeout: Duration,
    /// Ticks are dropped once the user has been idle this long.
    pub idle_threshold: Option<Duration>,
    /// Stop sampling on the first source error instead of skipping the tick.
    pub fail_on_source_error: bool,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(DEFAULT_TICK_MS),
            probe_timeout: Duration::from_millis(DEFAULT_PROBE_TIMEOUT_MS),
            idle_threshold: None,
            fail_on_source_error: false,
        }
    }
}

struct Observation {
    window: Option<ActiveWindow>,
    idle: Option<Duration>,
}

/// Active-window queries run on one worker thread, at most one at a time.
struct Probe {
    requests: SyncSender<()>,
    responses: Receiver<std::result::Result<Observation, WindowError>>,
    timeout: Duration,
    in_flight: bool,
}

impl Probe {
    fn spawn(source: Arc<dyn WindowSource>, timeout: Duration) -> Result<Self> {
        let (requests, request_rx) = mpsc::sync_channel::<()>(1);
        let (response_tx, responses) = mpsc::channel();

        thread::Builder::new()
            .name("window-probe".into())
            .spawn(move || {
                while request_rx.recv().is_ok() {
                    let observation = source.active_window().map(|window| Observation {
                        window,
                        idle: source.idle_time(),
                    });
                    if response_tx.send(observation).is_err() {
                        break;
                    }
                }
            })?;

        Ok(Self {
            requests,
            responses,
            timeout,
            in_flight: false,
        })
    }

    /// Ask the source once. `Ok(None)` means a previous query is still
    /// running and this tick is skipped.
    fn query(&mut self) -> std::result::Result<Option<Observation>, WindowError> {
        if self.in_flight {
            match self.responses.try_recv() {
                // Too old to describe this tick
                Ok(_) => self.in_flight = false,
                Err(TryRecvError::Empty) => return Ok(None),
                Err(TryRecvError::Disconnected) => return Err(worker_gone()),
            }
        }

        match self.requests.try_send(()) {
            Ok(()) => {}
            Err(TrySendError::Full(())) => return Ok(None),
            Err(TrySendError::Disconnected(())) => return Err(worker_gone()),
        }

        match self.responses.recv_timeout(self.timeout) {
            Ok(observation) => observation.map(Some),
            Err(RecvTimeoutError::Timeout) => {
                self.in_flight = true;
                Err(WindowError::Timeout(self.timeout))
            }
            Err(RecvTimeoutError::Disconnected) => Err(worker_gone()),
        }
    }
}

fn worker_gone() -> WindowError {
    WindowError::CommandFailed {
        command: "window probe".into(),
        reason: "worker thread exited".into(),
    }
}

/// Fixed-interval loop turning the focused window into samples.
pub struct Sampler {
    source: Arc<dyn WindowSource>,
    buffer: Arc<WriteBuffer>,
    config: SamplerConfig,
    stop: StopSignal,
    handle: Mutex<Option<JoinHandle<Result<()>>>>,
}

impl Sampler {
    /// `stop` ends the loop; with `fail_on_source_error` the sampler also
    /// raises it itself, so owners sharing the signal shut down too.
    pub fn new(
        source: Arc<dyn WindowSource>,
        buffer: Arc<WriteBuffer>,
        config: SamplerConfig,
        stop: StopSignal,
    ) -> Self {
        Self {
            source,
            buffer,
            config,
            stop,
            handle: Mutex::new(None),
        }
    }

    pub fn start(&self) -> Result<()> {
        let mut handle = safe_lock(&self.handle, "Sampler");
        if handle.is_some() {
            return Ok(());
        }

        let probe = Probe::spawn(Arc::clone(&self.source), self.config.probe_timeout)?;
        let mut state = SamplerLoop {
            probe,
            buffer: Arc::clone(&self.buffer),
            config: self.config,
            last_error: None,
        };
        let stop = self.stop.clone();

        *handle = Some(
            thread::Builder::new()
                .name("sampler".into())
                .spawn(move || state.run(&stop))?,
        );

        info!(
            "Sampling {} every {:?}",
            self.source.name(),
            self.config.tick
        );
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        safe_lock(&self.handle, "Sampler")
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Stop sampling and return the error that ended the loop, if any.
    ///
    /// A source call stuck inside the probe worker is not waited for.
    pub fn stop(&self) -> Result<()> {
        self.stop.stop();
        let Some(handle) = safe_lock(&self.handle, "Sampler").take() else {
            return Ok(());
        };

        handle.join().unwrap_or_else(|_| {
            warn!("Sampler thread panicked");
            Ok(())
        })
    }
}

struct SamplerLoop {
    probe: Probe,
    buffer: Arc<WriteBuffer>,
    config: SamplerConfig,
    last_error: Option<String>,
}

impl SamplerLoop {
    fn run(&mut self, stop: &StopSignal) -> Result<()> {
        loop {
            let started = Instant::now();

            if let Err(e) = self.tick() {
                if self.config.fail_on_source_error {
                    error!("Active window query failed, stopping: {e}");
                    stop.stop();
                    return Err(e.into());
                }
                self.report(&e);
            } else {
                self.last_error = None;
            }

            if stop.wait(self.config.tick.saturating_sub(started.elapsed())) {
                debug!("Sampler stopped");
                return Ok(());
            }
        }
    }

    fn tick(&mut self) -> std::result::Result<(), WindowError> {
        // Stamp the sample with the start of the tick it covers
        let timestamp_ms = Utc::now().timestamp_millis();

        let Some(observation) = self.probe.query()? else {
            debug!("Previous window query still running, skipping tick");
            return Ok(());
        };

        if let (Some(threshold), Some(idle)) = (self.config.idle_threshold, observation.idle) {
            if idle >= threshold {
                return Ok(());
            }
        }

        let Some(window) = observation.window else {
            return Ok(());
        };
        if window.app_id.is_empty() {
            return Ok(());
        }

        let duration_ms = i64::try_from(self.config.tick.as_millis()).unwrap_or(i64::MAX);
        self.buffer
            .add(Sample::new(timestamp_ms, &window.app_id, &window.title, duration_ms));
        Ok(())
    }

    /// Warn once per distinct error; a failing source fails every tick.
    fn report(&mut self, e: &WindowError) {
        let message = e.to_string();
        if self.last_error.as_deref() == Some(message.as_str()) {
            debug!("Active window query failed again: {message}");
        } else {
            warn!("Active window query failed, skipping tick: {message}");
            self.last_error = Some(message);
        }
    }
}
