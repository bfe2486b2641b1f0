//! Streaming payload writer: content-addressed, resumable, tolerant of
//! out-of-order `write_at` calls.

use crate::crypto::CryptoState;
use crate::db::{StoreRoot, DEFAULT_BUSY_DEADLINE};
use crate::error::{PayloadStatus, StoreError};
use crate::retry::with_busy_retry;
use crate::time::now_ms;
use rhizome_core::ids::FileHash;
use rusqlite::OptionalExtension;
use sha2::{Digest, Sha512};
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write as _};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_TEMP_ID: AtomicU64 = AtomicU64::new(1);

fn next_temp_id() -> u64 {
    (std::process::id() as u64) << 32 | NEXT_TEMP_ID.fetch_add(1, Ordering::Relaxed)
}

struct PendingBuf {
    offset: u64,
    data: Vec<u8>,
}

enum Backend {
    External { file: File, temp_path: PathBuf },
    Blob { temp_key: String },
}

pub enum OpenWriteOutcome {
    Writer(Writer),
    Status(PayloadStatus),
}

pub struct Writer {
    store: Arc<StoreRoot>,
    expected_hash: Option<FileHash>,
    expected_length: Option<u64>,
    length: Option<u64>,
    hasher: Sha512,
    crypto: Option<CryptoState>,
    pending: Vec<PendingBuf>,
    /// High-water mark of bytes that have been hashed (and, if applicable,
    /// encrypted). Always >= `written_offset`.
    file_offset: u64,
    /// High-water mark of bytes actually committed to the backend.
    written_offset: u64,
    /// Hashed/encrypted bytes waiting on a backend write that previously
    /// returned busy.
    ready: Vec<u8>,
    backend: Backend,
    buffered_bytes: usize,
    buffer_max: usize,
    finished: bool,
}

impl Writer {
    pub fn open(
        store: Arc<StoreRoot>,
        expected_hash: Option<FileHash>,
        expected_length: Option<u64>,
        crypto: Option<CryptoState>,
        buffer_max: usize,
        blob_threshold: u64,
    ) -> Result<OpenWriteOutcome, StoreError> {
        if expected_length == Some(0) {
            return Ok(OpenWriteOutcome::Status(PayloadStatus::Empty));
        }
        if let Some(hash) = expected_hash {
            match crate::exists(&store, &hash)? {
                PayloadStatus::Stored => return Ok(OpenWriteOutcome::Status(PayloadStatus::Stored)),
                PayloadStatus::Busy => return Ok(OpenWriteOutcome::Status(PayloadStatus::Busy)),
                _ => {}
            }
        }

        let temp_id = next_temp_id();
        let external = match expected_length {
            None => true,
            Some(len) => len > blob_threshold,
        };

        let backend = if external {
            let temp_path = store.temp_path(temp_id);
            let file = OpenOptions::new()
                .create(true)
                .truncate(true)
                .read(true)
                .write(true)
                .open(&temp_path)?;
            Backend::External { file, temp_path }
        } else {
            let temp_key = format!("tmp-{temp_id}");
            let len = expected_length.unwrap_or(0) as i64;
            with_busy_retry(DEFAULT_BUSY_DEADLINE, || {
                let conn = store.conn.lock().unwrap();
                conn.execute(
                    "INSERT INTO fileblobs(id, data) VALUES (?1, ZEROBLOB(?2))",
                    rusqlite::params![temp_key, len],
                )
            })?;
            Backend::Blob { temp_key }
        };

        Ok(OpenWriteOutcome::Writer(Writer {
            store,
            expected_hash,
            expected_length,
            length: expected_length,
            hasher: Sha512::new(),
            crypto,
            pending: Vec::new(),
            file_offset: 0,
            written_offset: 0,
            ready: Vec::new(),
            backend,
            buffered_bytes: 0,
            buffer_max,
            finished: false,
        }))
    }

    pub fn write(&mut self, bytes: &[u8]) -> Result<(), StoreError> {
        let offset = self.file_offset.max(self.pending_high_water());
        self.write_at(offset, bytes)
    }

    /// The running SHA-512 state over everything hashed so far. Journal
    /// appends cache this after a successful write so the next append that
    /// extends the same retained window can resume hashing from here
    /// instead of re-reading and re-hashing it.
    pub fn hash_state(&self) -> Sha512 {
        self.hasher.clone()
    }

    /// Seeds this freshly-opened writer with hash state already known to
    /// cover `[0, seeded_len)`, so bytes in that range never pass through
    /// the hasher a second time. Must be called before any `write`/
    /// `write_at`, and only once the same number of bytes has actually been
    /// placed in the backend via [`Writer::write_preseeded`].
    pub fn seed_hash_state(&mut self, hasher: Sha512, seeded_len: u64) {
        self.hasher = hasher;
        self.file_offset = seeded_len;
    }

    /// Writes `bytes` straight to the backend at the writer's current
    /// committed offset, without feeding them through the running hash.
    /// Used to replay a journal's retained prefix whose hash contribution
    /// is already accounted for by a prior [`Writer::seed_hash_state`] call.
    pub fn write_preseeded(&mut self, bytes: &[u8]) -> Result<(), StoreError> {
        if self.finished {
            return Err(StoreError::AlreadyFinished);
        }
        self.ready.extend_from_slice(bytes);
        self.flush_ready()
    }

    fn pending_high_water(&self) -> u64 {
        self.pending
            .last()
            .map(|p| p.offset + p.data.len() as u64)
            .unwrap_or(self.file_offset)
    }

    pub fn write_at(&mut self, offset: u64, bytes: &[u8]) -> Result<(), StoreError> {
        if self.finished {
            return Err(StoreError::AlreadyFinished);
        }
        if offset + (bytes.len() as u64) <= self.file_offset {
            // Entirely already hashed; nothing to do (idempotent resend).
            return Ok(());
        }
        let added = insert_pending(&mut self.pending, offset, bytes.to_vec(), self.file_offset);
        self.buffered_bytes += added;
        while self.buffered_bytes > self.buffer_max && self.pending.len() > 1 {
            // Drop the buffer furthest from being contiguous; the caller is
            // expected to resend it, same as a transient backend failure.
            if let Some(last) = self.pending.pop() {
                self.buffered_bytes -= last.data.len();
            }
        }
        self.advance_and_flush()
    }

    fn advance_and_flush(&mut self) -> Result<(), StoreError> {
        while let Some(front) = self.pending.first() {
            if front.offset != self.file_offset {
                break;
            }
            let front = self.pending.remove(0);
            self.buffered_bytes -= front.data.len();
            let mut chunk = front.data;
            if let Some(crypto) = &self.crypto {
                crypto.apply(self.file_offset, &mut chunk);
            }
            self.hasher.update(&chunk);
            self.file_offset += chunk.len() as u64;
            self.ready.extend_from_slice(&chunk);
        }
        self.flush_ready()
    }

    fn flush_ready(&mut self) -> Result<(), StoreError> {
        if self.ready.is_empty() {
            return Ok(());
        }
        match &mut self.backend {
            Backend::External { file, .. } => {
                file.seek(SeekFrom::Start(self.written_offset))?;
                file.write_all(&self.ready)?;
                self.written_offset += self.ready.len() as u64;
                self.ready.clear();
            }
            Backend::Blob { temp_key } => {
                let data = self.ready.clone();
                let offset = self.written_offset;
                let key = temp_key.clone();
                let store = self.store.clone();
                let result = with_busy_retry(DEFAULT_BUSY_DEADLINE, || {
                    let conn = store.conn.lock().unwrap();
                    let mut blob = conn.blob_open(rusqlite::DatabaseName::Main, "fileblobs", "data", row_id(&conn, &key)?, false)?;
                    blob.seek(SeekFrom::Start(offset)).map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
                    blob.write_all(&data).map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
                    Ok(())
                });
                match result {
                    Ok(()) => {
                        self.written_offset += self.ready.len() as u64;
                        self.ready.clear();
                    }
                    Err(StoreError::Busy) => {
                        // Leave `ready` staged; caller retries later.
                    }
                    Err(e) => return Err(e),
                }
            }
        }
        Ok(())
    }

    pub fn finish(self) -> Result<PayloadStatus, StoreError> {
        self.finish_with_hash().map(|(status, _)| status)
    }

    /// Same as [`Writer::finish`] but also returns the digest that was
    /// computed incrementally as bytes arrived. Journal appends use this to
    /// get the new payload's hash without re-reading the retained prefix
    /// back from the store just to hash it a second time.
    pub fn finish_with_hash(mut self) -> Result<(PayloadStatus, FileHash), StoreError> {
        if self.length.is_none() {
            self.length = Some(self.pending_high_water().max(self.file_offset));
        }
        // Drain everything contiguous; if a gap remains, the caller never
        // covered [0, length) and we report wrong_size.
        self.advance_and_flush()?;
        for _ in 0..10 {
            if self.ready.is_empty() {
                break;
            }
            self.flush_ready()?;
        }

        let expected = self.length.unwrap();
        if self.written_offset < expected {
            self.cleanup_on_failure();
            return Err(StoreError::WrongSize { written: self.written_offset, expected });
        }

        let digest: [u8; 64] = self.hasher.clone().finalize().into();
        let candidate = FileHash(digest);
        if let Some(expected_hash) = self.expected_hash {
            if expected_hash != candidate {
                self.cleanup_on_failure();
                return Err(StoreError::WrongHash);
            }
        }

        let hex = candidate.to_hex();
        let already_exists = with_busy_retry(DEFAULT_BUSY_DEADLINE, || {
            let conn = self.store.conn.lock().unwrap();
            conn.query_row("SELECT 1 FROM files WHERE id = ?1", [&hex], |_| Ok(()))
                .optional()
        })?
        .is_some();

        if already_exists {
            self.cleanup_on_failure();
            return Ok((PayloadStatus::Stored, candidate));
        }

        let now = now_ms();
        with_busy_retry(DEFAULT_BUSY_DEADLINE, || {
            let conn = self.store.conn.lock().unwrap();
            conn.execute(
                "INSERT INTO files(id, length, datavalid, inserttime, last_verified) VALUES (?1, ?2, 1, ?3, ?3)",
                rusqlite::params![hex, expected as i64, now],
            )
        })?;

        match &self.backend {
            Backend::External { temp_path, .. } => {
                let final_path = self.store.blob_path(&hex);
                std::fs::rename(temp_path, final_path)?;
            }
            Backend::Blob { temp_key } => {
                with_busy_retry(DEFAULT_BUSY_DEADLINE, || {
                    let conn = self.store.conn.lock().unwrap();
                    conn.execute("UPDATE fileblobs SET id = ?1 WHERE id = ?2", rusqlite::params![hex, temp_key])
                })?;
            }
        }

        self.finished = true;
        Ok((PayloadStatus::New, candidate))
    }

    fn cleanup_on_failure(&mut self) {
        self.finished = true;
        match &self.backend {
            Backend::External { temp_path, .. } => {
                let _ = std::fs::remove_file(temp_path);
            }
            Backend::Blob { temp_key } => {
                let conn = self.store.conn.lock().unwrap();
                let _ = conn.execute("DELETE FROM fileblobs WHERE id = ?1", [temp_key]);
            }
        }
    }
}

fn row_id(conn: &rusqlite::Connection, key: &str) -> rusqlite::Result<i64> {
    conn.query_row("SELECT rowid FROM fileblobs WHERE id = ?1", [key], |r| r.get(0))
}

/// Inserts `data` at `offset` into the sorted, non-overlapping pending
/// list, trimming against both the already-hashed prefix (`file_offset`)
/// and any already-cached buffer. Existing cached bytes always win over a
/// newly-arriving overlapping write. Returns the number of bytes actually
/// retained.
fn insert_pending(list: &mut Vec<PendingBuf>, offset: u64, data: Vec<u8>, file_offset: u64) -> usize {
    let mut segments = vec![(offset, data)];

    // Trim against the already-hashed prefix.
    segments = segments
        .into_iter()
        .filter_map(|(off, mut d)| {
            let end = off + d.len() as u64;
            if end <= file_offset {
                None
            } else if off < file_offset {
                let skip = (file_offset - off) as usize;
                d.drain(0..skip);
                Some((file_offset, d))
            } else {
                Some((off, d))
            }
        })
        .collect();

    for existing in list.iter() {
        let ex_off = existing.offset;
        let ex_end = existing.offset + existing.data.len() as u64;
        let mut next_segments = Vec::new();
        for (seg_off, seg_data) in segments {
            let seg_end = seg_off + seg_data.len() as u64;
            if seg_end <= ex_off || seg_off >= ex_end {
                next_segments.push((seg_off, seg_data));
                continue;
            }
            if seg_off < ex_off {
                let keep = (ex_off - seg_off) as usize;
                next_segments.push((seg_off, seg_data[..keep].to_vec()));
            }
            if seg_end > ex_end {
                let skip = (ex_end - seg_off) as usize;
                next_segments.push((ex_end, seg_data[skip..].to_vec()));
            }
        }
        segments = next_segments;
    }

    let mut added = 0;
    for (seg_off, seg_data) in segments {
        if seg_data.is_empty() {
            continue;
        }
        added += seg_data.len();
        let idx = list.partition_point(|p| p.offset < seg_off);
        list.insert(idx, PendingBuf { offset: seg_off, data: seg_data });
    }
    added
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (Arc<StoreRoot>, tempfile::TempDir) {
        let (s, tmp) = StoreRoot::open_in_memory().unwrap();
        (Arc::new(s), tmp)
    }

    #[test]
    fn sequential_write_hashes_in_order() {
        let (store, _tmp) = store();
        let outcome = Writer::open(store, None, Some(6), None, 1024, 131072).unwrap();
        let OpenWriteOutcome::Writer(mut w) = outcome else { panic!("expected writer") };
        w.write(b"hello\n").unwrap();
        let status = w.finish().unwrap();
        assert_eq!(status, PayloadStatus::New);
    }

    #[test]
    fn out_of_order_writes_produce_same_hash_as_sequential() {
        let (store_a, _tmp_a) = store();
        let OpenWriteOutcome::Writer(mut a) = Writer::open(store_a, None, Some(11), None, 1024, 131072).unwrap() else { panic!() };
        a.write(b"hello world").unwrap();
        assert_eq!(a.finish().unwrap(), PayloadStatus::New);

        let (store_b, _tmp_b) = store();
        let OpenWriteOutcome::Writer(mut b) = Writer::open(store_b, None, Some(11), None, 1024, 131072).unwrap() else { panic!() };
        b.write_at(6, b"world").unwrap();
        b.write_at(0, b"hello ").unwrap();
        assert_eq!(b.finish().unwrap(), PayloadStatus::New);
    }

    #[test]
    fn duplicate_payload_is_deduplicated() {
        let (store, _tmp) = store();
        let OpenWriteOutcome::Writer(mut first) = Writer::open(store.clone(), None, Some(6), None, 1024, 131072).unwrap() else { panic!() };
        first.write(b"hello\n").unwrap();
        assert_eq!(first.finish().unwrap(), PayloadStatus::New);

        let OpenWriteOutcome::Writer(mut second) = Writer::open(store, None, Some(6), None, 1024, 131072).unwrap() else { panic!() };
        second.write(b"hello\n").unwrap();
        assert_eq!(second.finish().unwrap(), PayloadStatus::Stored);
    }

    #[test]
    fn wrong_hash_is_rejected() {
        let (store, _tmp) = store();
        let wrong = FileHash([0xAB; 64]);
        let OpenWriteOutcome::Writer(mut w) = Writer::open(store, Some(wrong), Some(6), None, 1024, 131072).unwrap() else { panic!() };
        w.write(b"hello\n").unwrap();
        let err = w.finish().unwrap_err();
        assert!(matches!(err, StoreError::WrongHash));
    }

    #[test]
    fn empty_payload_short_circuits() {
        let (store, _tmp) = store();
        let outcome = Writer::open(store, None, Some(0), None, 1024, 131072).unwrap();
        assert!(matches!(outcome, OpenWriteOutcome::Status(PayloadStatus::Empty)));
    }

    #[test]
    fn overlapping_write_at_keeps_first_writer() {
        let mut list = Vec::new();
        let added_first = insert_pending(&mut list, 0, b"AAAA".to_vec(), 0);
        assert_eq!(added_first, 4);
        let added_second = insert_pending(&mut list, 2, b"BBBB".to_vec(), 0);
        // only bytes 4..6 of the second write are novel
        assert_eq!(added_second, 2);
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn large_payload_uses_external_backend() {
        let (store, _tmp) = store();
        let outcome = Writer::open(store, None, Some(200_000), None, 1_048_576, 131_072).unwrap();
        let OpenWriteOutcome::Writer(w) = outcome else { panic!("expected writer") };
        assert!(matches!(w.backend, Backend::External { .. }));
    }

    #[test]
    fn small_payload_uses_blob_backend() {
        let (store, _tmp) = store();
        let outcome = Writer::open(store, None, Some(10), None, 1_048_576, 131_072).unwrap();
        let OpenWriteOutcome::Writer(w) = outcome else { panic!("expected writer") };
        assert!(matches!(w.backend, Backend::Blob { .. }));
    }
}
