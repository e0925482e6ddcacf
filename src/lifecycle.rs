use crate::safe_lock;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

/// Stop flag shared between a background loop and its owner.
///
/// Loops sleep with [`StopSignal::wait`] instead of `thread::sleep`, so a
/// stop request wakes them immediately rather than after a full interval.
#[derive(Clone, Default)]
pub struct StopSignal {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        let (stopped, condvar) = &*self.inner;
        *safe_lock(stopped, "StopSignal") = true;
        condvar.notify_all();
    }

    pub fn is_stopped(&self) -> bool {
        let (stopped, _) = &*self.inner;
        *safe_lock(stopped, "StopSignal")
    }

    /// Sleep for `timeout` or until stopped. Returns true once stopped.
    pub fn wait(&self, timeout: Duration) -> bool {
        let (stopped, condvar) = &*self.inner;
        let guard = safe_lock(stopped, "StopSignal");
        let (guard, _) = condvar
            .wait_timeout_while(guard, timeout, |stopped| !*stopped)
            .unwrap_or_else(PoisonError::into_inner);
        *guard
    }

    /// Block until stopped.
    pub fn wait_forever(&self) {
        let (stopped, condvar) = &*self.inner;
        let guard = safe_lock(stopped, "StopSignal");
        let _guard = condvar
            .wait_while(guard, |stopped| !*stopped)
            .unwrap_or_else(PoisonError::into_inner);
    }
}
