//! Shared connection handling for `SQLite` backends.
//!
//! Provides mutex acquisition with poison recovery, connection opening and
//! pragma configuration used by both the contact and suggestion backends.

use crate::{Error, Result};
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Acquires a mutex lock, recovering from poison.
///
/// A panic in an earlier critical section leaves the connection usable, so
/// the inner value is taken and a warning is logged.
pub fn acquire_lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("SQLite mutex was poisoned, recovering");
            metrics::counter!("sqlite_mutex_poison_recovery_total").increment(1);
            poisoned.into_inner()
        },
    }
}

/// Configures a connection for concurrent use.
///
/// - **WAL mode**: concurrent readers with a single writer
/// - **NORMAL synchronous**: balances durability with performance
/// - **`busy_timeout`**: waits up to 5 seconds for locks
/// - **`foreign_keys`**: cascades phone/email rows on contact delete
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] if foreign keys cannot be enabled.
pub fn configure_connection(conn: &Connection) -> Result<()> {
    // journal_mode returns a row ("wal"/"memory"), so failures here are ignored.
    let _ = conn.pragma_update(None, "journal_mode", "WAL");
    let _ = conn.pragma_update(None, "synchronous", "NORMAL");
    let _ = conn.pragma_update(None, "busy_timeout", "5000");
    conn.pragma_update(None, "foreign_keys", "ON")
        .map_err(|e| Error::OperationFailed {
            operation: "enable_foreign_keys".to_string(),
            cause: e.to_string(),
        })?;
    Ok(())
}

/// Opens and configures a database file, creating parent directories.
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] if the directory or database cannot be opened.
pub fn open_database(path: &Path, operation: &str) -> Result<Connection> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|e| Error::OperationFailed {
            operation: format!("{operation}_create_dir"),
            cause: format!("{}: {e}", parent.display()),
        })?;
    }

    let conn = Connection::open(path).map_err(|e| Error::OperationFailed {
        operation: operation.to_string(),
        cause: format!("{}: {e}", path.display()),
    })?;
    configure_connection(&conn)?;
    Ok(conn)
}

/// Opens and configures an in-memory database.
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] if the database cannot be opened.
pub fn open_in_memory(operation: &str) -> Result<Connection> {
    let conn = Connection::open_in_memory().map_err(|e| Error::OperationFailed {
        operation: operation.to_string(),
        cause: e.to_string(),
    })?;
    configure_connection(&conn)?;
    Ok(conn)
}

/// Maps a `rusqlite` error into [`Error::OperationFailed`].
pub fn db_error(operation: &str) -> impl FnOnce(rusqlite::Error) -> Error + '_ {
    move |e| Error::OperationFailed {
        operation: operation.to_string(),
        cause: e.to_string(),
    }
}

/// Converts a u64 timestamp to i64 for `SQLite` storage.
#[allow(clippy::cast_possible_wrap)]
pub const fn to_db_timestamp(ts: u64) -> i64 {
    ts as i64
}

/// Converts an i64 from `SQLite` back to a u64 timestamp.
#[allow(clippy::cast_sign_loss)]
pub const fn from_db_timestamp(ts: i64) -> u64 {
    ts as u64
}
