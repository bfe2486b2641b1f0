//! The payload store: a content-addressed, resumable blob store backed by
//! SQLite for small payloads and the filesystem for large ones, with
//! size-quota eviction and a small expiring reader cache.

pub mod crypto;
pub mod db;
pub mod error;
pub mod eviction;
pub mod journal;
pub mod reader;
pub mod retry;
pub mod time;
pub mod writer;

pub use crypto::CryptoState;
pub use db::StoreRoot;
pub use error::{PayloadStatus, StoreError};
pub use eviction::{CleanupReport, QuotaParams};
pub use journal::JournalHashCache;
pub use reader::{Reader, ReaderCache};
pub use writer::{OpenWriteOutcome, Writer};

use rhizome_core::config::StoreConfig;
use rhizome_core::ids::FileHash;
use rusqlite::OptionalExtension;
use std::sync::Arc;

/// Looks up the status a fresh write of `hash` would settle into without
/// actually opening one: [`PayloadStatus::Stored`] if already present and
/// valid, [`PayloadStatus::New`] otherwise.
pub fn exists(store: &StoreRoot, hash: &FileHash) -> Result<PayloadStatus, StoreError> {
    let hex = hash.to_hex();
    let row = retry::with_busy_retry(db::DEFAULT_BUSY_DEADLINE, || {
        let conn = store.conn.lock().unwrap();
        conn.query_row("SELECT 1 FROM files WHERE id = ?1 AND datavalid = 1", [&hex], |_| Ok(()))
            .optional()
    })?;
    Ok(if row.is_some() { PayloadStatus::Stored } else { PayloadStatus::New })
}

/// The payload store as the rest of the crate sees it: a `StoreRoot` plus
/// the quota configuration needed to decide when a write must evict.
pub struct Store {
    pub root: Arc<StoreRoot>,
    pub config: StoreConfig,
    pub journal_hashes: JournalHashCache,
}

impl Store {
    pub fn open(config: StoreConfig) -> Result<Self, StoreError> {
        let root = Arc::new(StoreRoot::open(&config.path)?);
        Ok(Self { root, config, journal_hashes: JournalHashCache::new() })
    }

    pub fn exists(&self, hash: &FileHash) -> Result<PayloadStatus, StoreError> {
        exists(&self.root, hash)
    }

    /// Opens a writer for a payload of (if known) `expected_length` bytes,
    /// making room under the configured quota first. Returns a terminal
    /// [`PayloadStatus`] directly when no [`Writer`] needs to be created
    /// (already stored, empty, too big, or busy).
    pub fn open_write(
        &self,
        expected_hash: Option<FileHash>,
        expected_length: Option<u64>,
        crypto: Option<CryptoState>,
    ) -> Result<OpenWriteOutcome, StoreError> {
        if let Some(len) = expected_length {
            let params = QuotaParams {
                database_size: self.config.database_size,
                min_free_space: self.config.min_free_space,
                free_space_available: free_space_available(&self.config.path),
            };
            let (too_big, _report) = eviction::make_space(&self.root, &params, len)?;
            if too_big {
                return Ok(OpenWriteOutcome::Status(PayloadStatus::TooBig));
            }
        }
        Writer::open(
            self.root.clone(),
            expected_hash,
            expected_length,
            crypto,
            self.config.write_buffer_max,
            self.config.blob_threshold,
        )
    }

    pub fn open_read(&self, hash: FileHash, crypto: Option<CryptoState>) -> Result<Option<Reader>, StoreError> {
        Reader::open(self.root.clone(), hash, crypto)
    }

    /// Bytes currently occupied by stored payloads, read-only — does not
    /// run eviction the way [`Store::cleanup`] does.
    pub fn usage(&self) -> Result<u64, StoreError> {
        eviction::current_usage(&self.root)
    }

    /// Runs an unconditional eviction pass against the configured quota,
    /// independent of any particular incoming write.
    pub fn cleanup(&self) -> Result<CleanupReport, StoreError> {
        let params = QuotaParams {
            database_size: self.config.database_size,
            min_free_space: self.config.min_free_space,
            free_space_available: free_space_available(&self.config.path),
        };
        let (_too_big, report) = eviction::make_space(&self.root, &params, 0)?;
        Ok(report)
    }

    /// Extends a journal bundle by copying `length` bytes of an existing
    /// stored payload (`source_hash`), starting at `start`, into `writer`.
    /// Used when a journal's manifest grows without the caller needing to
    /// resend bytes it already handed over in a previous version.
    pub fn journal_pipe(&self, writer: &mut Writer, source_hash: FileHash, start: u64, length: u64) -> Result<(), StoreError> {
        let mut reader = match self.open_read(source_hash, None)? {
            Some(r) => r,
            None => return Err(StoreError::WrongHash),
        };
        const CHUNK: usize = 65536;
        let mut offset = start;
        let end = start + length;
        while offset < end {
            let want = (end - offset).min(CHUNK as u64) as usize;
            let bytes = reader.read_at(offset, want)?;
            if bytes.is_empty() {
                break;
            }
            writer.write_at(offset - start, &bytes)?;
            offset += bytes.len() as u64;
        }
        reader.close()?;
        Ok(())
    }

    /// Like [`Store::journal_pipe`], but for a writer whose hash state has
    /// already been seeded to cover these exact bytes (see
    /// [`JournalHashCache::resume`]) — the bytes are copied into the new
    /// payload's backend without being fed through the hasher again.
    pub fn journal_pipe_preseeded(&self, writer: &mut Writer, source_hash: FileHash, start: u64, length: u64) -> Result<(), StoreError> {
        let mut reader = match self.open_read(source_hash, None)? {
            Some(r) => r,
            None => return Err(StoreError::WrongHash),
        };
        const CHUNK: usize = 65536;
        let mut offset = start;
        let end = start + length;
        while offset < end {
            let want = (end - offset).min(CHUNK as u64) as usize;
            let bytes = reader.read_at(offset, want)?;
            if bytes.is_empty() {
                break;
            }
            writer.write_preseeded(&bytes)?;
            offset += bytes.len() as u64;
        }
        reader.close()?;
        Ok(())
    }
}

fn free_space_available(path: &std::path::Path) -> u64 {
    // Best-effort: an unreadable filesystem just means quota enforcement
    // falls back to `database_size` alone via `min_free_space == 0`-style
    // behaviour at the call site's discretion.
    match nix::sys::statvfs::statvfs(path) {
        Ok(stat) => stat.blocks_available() as u64 * stat.fragment_size() as u64,
        Err(_) => u64::MAX,
    }
}
