//! Streaming payload reader with sequential-read hash verification and a
//! small cache of recently-opened readers.

use crate::crypto::CryptoState;
use crate::db::{StoreRoot, DEFAULT_BUSY_DEADLINE};
use crate::error::StoreError;
use crate::retry::with_busy_retry;
use crate::time::now_ms;
use rhizome_core::ids::FileHash;
use rusqlite::OptionalExtension;
use sha2::{Digest, Sha512};
use std::collections::HashMap;
use std::io::{Read, Seek, SeekFrom};
use std::sync::Arc;
use std::time::{Duration, Instant};

enum Backend {
    External(std::fs::File),
    Blob { row_id: i64 },
}

pub struct Reader {
    store: Arc<StoreRoot>,
    hash: FileHash,
    length: u64,
    backend: Backend,
    crypto: Option<CryptoState>,
    /// Running hash, kept only while every read so far has been strictly
    /// sequential starting at 0.
    hasher: Option<Sha512>,
    hash_offset: u64,
    verified: Option<bool>,
}

impl Reader {
    pub fn open(store: Arc<StoreRoot>, hash: FileHash, crypto: Option<CryptoState>) -> Result<Option<Reader>, StoreError> {
        let hex = hash.to_hex();
        let row = with_busy_retry(DEFAULT_BUSY_DEADLINE, || {
            let conn = store.conn.lock().unwrap();
            conn.query_row(
                "SELECT length FROM files WHERE id = ?1 AND datavalid = 1",
                [&hex],
                |r| r.get::<_, i64>(0),
            )
            .optional()
        })?;
        let Some(length) = row else { return Ok(None) };
        let length = length as u64;

        let blob_path = store.blob_path(&hex);
        let backend = if blob_path.is_file() && blob_path.metadata()?.len() >= length {
            Backend::External(std::fs::File::open(&blob_path)?)
        } else {
            let row_id = with_busy_retry(DEFAULT_BUSY_DEADLINE, || {
                let conn = store.conn.lock().unwrap();
                conn.query_row("SELECT rowid FROM fileblobs WHERE id = ?1", [&hex], |r| r.get(0))
            })?;
            Backend::Blob { row_id }
        };

        Ok(Some(Reader {
            store,
            hash,
            length,
            backend,
            crypto,
            hasher: Some(Sha512::new()),
            hash_offset: 0,
            verified: None,
        }))
    }

    pub fn len(&self) -> u64 {
        self.length
    }

    pub fn read_at(&mut self, offset: u64, len: usize) -> Result<Vec<u8>, StoreError> {
        let len = len.min((self.length - offset.min(self.length)) as usize);
        let mut buf = vec![0u8; len];
        match &mut self.backend {
            Backend::External(file) => {
                file.seek(SeekFrom::Start(offset))?;
                file.read_exact(&mut buf)?;
            }
            Backend::Blob { row_id } => {
                let row_id = *row_id;
                let store = self.store.clone();
                let data = with_busy_retry(DEFAULT_BUSY_DEADLINE, || {
                    let conn = store.conn.lock().unwrap();
                    let mut blob = conn.blob_open(rusqlite::DatabaseName::Main, "fileblobs", "data", row_id, true)?;
                    let mut out = vec![0u8; len];
                    blob.seek(SeekFrom::Start(offset)).map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
                    blob.read_exact(&mut out).map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
                    Ok(out)
                })?;
                buf = data;
            }
        }

        if offset == self.hash_offset {
            if let Some(hasher) = &mut self.hasher {
                hasher.update(&buf);
            }
            self.hash_offset += buf.len() as u64;
        } else {
            // A non-sequential read breaks the running hash invariant.
            self.hasher = None;
        }

        if let Some(crypto) = &self.crypto {
            crypto.apply(offset, &mut buf);
        }
        Ok(buf)
    }

    /// Verifies the digest if the whole payload was read sequentially.
    /// Deletes the payload from the store on mismatch.
    pub fn close(mut self) -> Result<(), StoreError> {
        if self.hash_offset == self.length {
            if let Some(hasher) = self.hasher.take() {
                let digest: [u8; 64] = hasher.finalize().into();
                let ok = digest == self.hash.0;
                self.verified = Some(ok);
                if ok {
                    let hex = self.hash.to_hex();
                    let now = now_ms();
                    with_busy_retry(DEFAULT_BUSY_DEADLINE, || {
                        let conn = self.store.conn.lock().unwrap();
                        conn.execute("UPDATE files SET last_verified = ?1 WHERE id = ?2", rusqlite::params![now, hex])
                    })?;
                } else {
                    self.delete_corrupt()?;
                }
            }
        }
        Ok(())
    }

    fn delete_corrupt(&self) -> Result<(), StoreError> {
        let hex = self.hash.to_hex();
        with_busy_retry(DEFAULT_BUSY_DEADLINE, || {
            let conn = self.store.conn.lock().unwrap();
            conn.execute("DELETE FROM files WHERE id = ?1", [&hex])?;
            conn.execute("DELETE FROM fileblobs WHERE id = ?1", [&hex])
        })?;
        let _ = std::fs::remove_file(self.store.blob_path(&hex));
        Ok(())
    }
}

/// A small expiring cache of recently-opened readers keyed by
/// `(bundle_id, version)`, avoiding reopen cost during streaming access.
pub struct ReaderCache {
    expiry: Duration,
    entries: HashMap<(rhizome_core::ids::Bid, u64), (Instant, FileHash)>,
}

impl ReaderCache {
    pub fn new(expiry: Duration) -> Self {
        Self { expiry, entries: HashMap::new() }
    }

    pub fn remember(&mut self, bid: rhizome_core::ids::Bid, version: u64, hash: FileHash) {
        self.entries.insert((bid, version), (Instant::now(), hash));
    }

    pub fn lookup(&mut self, bid: rhizome_core::ids::Bid, version: u64) -> Option<FileHash> {
        self.sweep();
        self.entries.get(&(bid, version)).map(|(_, h)| *h)
    }

    fn sweep(&mut self) {
        let expiry = self.expiry;
        self.entries.retain(|_, (inserted, _)| inserted.elapsed() < expiry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
