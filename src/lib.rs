pub mod buffer;
pub mod cli;
pub mod compactor;
pub mod config;
pub mod constants;
pub mod daemon;
pub mod db;
pub mod error;
pub mod lifecycle;
pub mod maintenance;
pub mod models;
pub mod platform;
pub mod report;
pub mod tracker;

#[cfg(test)]
mod test_utils;

pub use error::{AppError, Result};

use log::warn;
use std::sync::{Mutex, MutexGuard};

/// Lock a mutex, recovering from poisoning if necessary
pub(crate) fn safe_lock<'a, T>(mutex: &'a Mutex<T>, context: &str) -> MutexGuard<'a, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!("{context} mutex was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}
