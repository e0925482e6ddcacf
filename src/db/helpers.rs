// src/db/helpers.rs

use crate::error::{is_busy, AppError, Result};
use rusqlite::{Connection, Transaction};

/// Run `f` inside one transaction on `conn`.
///
/// The transaction commits only if `f` succeeds; any error drops it, which
/// rolls back every statement `f` executed. Failures are logged with the
/// operation name before being returned.
///
/// # Example
/// ```ignore
/// in_transaction(&mut conn, "bulk insert samples", |tx| {
///     Sample::insert_all(tx, &batch)
/// })
/// ```
pub fn in_transaction<F, T>(conn: &mut Connection, operation: &str, f: F) -> Result<T>
where
    F: FnOnce(&Transaction<'_>) -> rusqlite::Result<T>,
{
    let result = conn.transaction().and_then(|tx| {
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    });

    result.map_err(|e| logged(operation, e))
}

/// Log a failed storage operation and convert it.
pub fn logged(operation: &str, e: rusqlite::Error) -> AppError {
    log_failure(operation, &e);
    e.into()
}

/// Log a failed storage operation. Busy/locked errors are expected under
/// contention and only warn.
pub fn log_failure(operation: &str, e: &rusqlite::Error) {
    if is_busy(e) {
        log::warn!("Failed to {operation}: database busy ({e})");
    } else {
        log::error!("Failed to {operation}: {e}");
    }
}
