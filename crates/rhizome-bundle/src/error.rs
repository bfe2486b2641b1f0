/// Status returned across the bundle boundary. Reported to callers
/// verbatim, same spirit as [`rhizome_store::PayloadStatus`] one layer
/// down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BundleStatus {
    New,
    Duplicate,
    Same,
    Old,
    Invalid,
    Fake,
    Readonly,
    Inconsistent,
    NoRoom,
    Busy,
    ManifestTooBig,
    Error,
}

/// The adapted form of an input-validity or resource-exhaustion error:
/// a classified status plus a human-readable message. Ownership of the
/// message is plain (Rust needs no caller-frees-the-string convention).
#[derive(Debug, Clone)]
pub struct BundleResult {
    pub status: BundleStatus,
    pub message: String,
}

impl BundleResult {
    pub fn new(status: BundleStatus, message: impl Into<String>) -> Self {
        Self { status, message: message.into() }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BundleError {
    #[error("store error: {0}")]
    Store(#[from] rhizome_store::StoreError),
    #[error("manifest error: {0}")]
    Manifest(#[from] rhizome_manifest::ManifestError),
    #[error("sign error: {0}")]
    Sign(#[from] rhizome_manifest::SignError),
    #[error("sqlite error: {0}")]
    Sql(#[from] rusqlite::Error),
}

impl From<&BundleError> for BundleStatus {
    fn from(e: &BundleError) -> Self {
        match e {
            BundleError::Store(rhizome_store::StoreError::Busy) => BundleStatus::Busy,
            BundleError::Store(rhizome_store::StoreError::TooBig) => BundleStatus::NoRoom,
            BundleError::Store(_) => BundleStatus::Error,
            BundleError::Manifest(_) => BundleStatus::Invalid,
            BundleError::Sign(rhizome_manifest::SignError::TooBig) => BundleStatus::ManifestTooBig,
            BundleError::Sign(_) => BundleStatus::Fake,
            BundleError::Sql(_) => BundleStatus::Error,
        }
    }
}
