//! Centralised database-busy retry budget.
//!
//! Every call site that might see `SQLITE_BUSY` goes through here instead
//! of hand-rolling a loop: callers never see a transient lock, only a
//! final `Busy` after the deadline elapses. This crate's public API is
//! synchronous throughout, so the backoff sleep below is a real
//! `std::thread::sleep` — callers on an async executor (`rhizome-api`)
//! are responsible for running store calls on the blocking thread pool
//! (`tokio::task::spawn_blocking`) rather than inline on an executor
//! thread.

use crate::error::StoreError;
use std::time::{Duration, Instant};

const INITIAL_BACKOFF: Duration = Duration::from_millis(5);
const MAX_BACKOFF: Duration = Duration::from_millis(200);

pub fn with_busy_retry<T>(
    deadline: Duration,
    mut f: impl FnMut() -> rusqlite::Result<T>,
) -> Result<T, StoreError> {
    let start = Instant::now();
    let mut backoff = INITIAL_BACKOFF;
    loop {
        match f() {
            Ok(v) => return Ok(v),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::DatabaseBusy
                    || e.code == rusqlite::ErrorCode::DatabaseLocked =>
            {
                if start.elapsed() >= deadline {
                    return Err(StoreError::Busy);
                }
                std::thread::sleep(backoff.min(deadline.saturating_sub(start.elapsed())));
                backoff = (backoff * 2).min(MAX_BACKOFF);
            }
            Err(e) => return Err(StoreError::Sql(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn succeeds_immediately_without_retry() {
        let mut calls = 0;
        let result = with_busy_retry(Duration::from_millis(50), || {
            calls += 1;
            Ok::<_, rusqlite::Error>(42)
        });
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls, 1);
    }

    #[test]
    fn surfaces_busy_after_deadline() {
        let result: Result<(), _> = with_busy_retry(Duration::from_millis(20), || {
            Err(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error {
                    code: rusqlite::ErrorCode::DatabaseBusy,
                    extended_code: 5,
                },
                None,
            ))
        });
        assert!(matches!(result, Err(StoreError::Busy)));
    }
}
