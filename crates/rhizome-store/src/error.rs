/// Status returned by the payload half of the store API. Reported to
/// callers verbatim, never adapted into a language-specific exception.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadStatus {
    New,
    Stored,
    Empty,
    TooBig,
    Evicted,
    WrongSize,
    WrongHash,
    CryptoFail,
    Busy,
    Error,
}

/// Internal/plumbing errors. [`PayloadStatus`] is what crosses the public
/// API boundary; `StoreError` is what crosses the rusqlite/fs boundary
/// beneath it and gets folded into a status by the caller.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database busy")]
    Busy,
    #[error("sqlite error: {0}")]
    Sql(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("hash mismatch")]
    WrongHash,
    #[error("wrong size: wrote {written} of expected {expected}")]
    WrongSize { written: u64, expected: u64 },
    #[error("payload exceeds store quota")]
    TooBig,
    #[error("writer already finished")]
    AlreadyFinished,
}

impl From<&StoreError> for PayloadStatus {
    fn from(e: &StoreError) -> Self {
        match e {
            StoreError::Busy => PayloadStatus::Busy,
            StoreError::WrongHash => PayloadStatus::WrongHash,
            StoreError::WrongSize { .. } => PayloadStatus::WrongSize,
            StoreError::TooBig => PayloadStatus::TooBig,
            StoreError::Sql(_) | StoreError::Io(_) | StoreError::AlreadyFinished => PayloadStatus::Error,
        }
    }
}
