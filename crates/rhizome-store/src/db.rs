//! The opaque transactional key/blob store beneath the payload layer.
//!
//! Schema per the wire spec: `files` tracks every known payload by hash,
//! `fileblobs` holds small payloads inline, `manifests` indexes bundle
//! headers with a dedup index on `(service, name, sender, recipient,
//! filehash)`.

use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

pub const DEFAULT_BUSY_DEADLINE: Duration = Duration::from_secs(5);

pub struct StoreRoot {
    pub root: PathBuf,
    pub blob_dir: PathBuf,
    pub hash_dir: PathBuf,
    pub conn: Mutex<Connection>,
}

impl StoreRoot {
    pub fn open(root: impl AsRef<Path>) -> rusqlite::Result<Self> {
        let root = root.as_ref().to_path_buf();
        let blob_dir = root.join("blob");
        let hash_dir = root.join("hash");
        std::fs::create_dir_all(&blob_dir).expect("create blob dir");
        std::fs::create_dir_all(&hash_dir).expect("create hash dir");

        let conn = Connection::open(root.join("rhizome.db"))?;
        init_schema(&conn)?;
        Ok(Self { root, blob_dir, hash_dir, conn: Mutex::new(conn) })
    }

    pub fn open_in_memory() -> rusqlite::Result<(Self, tempfile::TempDir)> {
        let tmp = tempfile::tempdir().expect("tempdir");
        let store = Self::open(tmp.path())?;
        Ok((store, tmp))
    }

    pub fn blob_path(&self, hex_hash: &str) -> PathBuf {
        self.blob_dir.join(hex_hash)
    }

    pub fn temp_path(&self, temp_id: u64) -> PathBuf {
        self.blob_dir.join(temp_id.to_string())
    }

    pub fn hash_state_path(&self, hex_hash: &str) -> PathBuf {
        self.hash_dir.join(hex_hash)
    }
}

fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS files (
            id TEXT PRIMARY KEY,
            length INTEGER NOT NULL,
            datavalid INTEGER NOT NULL,
            inserttime INTEGER NOT NULL,
            last_verified INTEGER NOT NULL
        );
        CREATE TABLE IF NOT EXISTS fileblobs (
            id TEXT PRIMARY KEY,
            data BLOB
        );
        CREATE TABLE IF NOT EXISTS manifests (
            id TEXT PRIMARY KEY,
            manifest BLOB NOT NULL,
            version INTEGER NOT NULL,
            inserttime INTEGER NOT NULL,
            author TEXT,
            service TEXT,
            name TEXT,
            sender TEXT,
            recipient TEXT,
            filehash TEXT,
            filesize INTEGER NOT NULL,
            tail INTEGER
        );
        CREATE INDEX IF NOT EXISTS manifests_dedup
            ON manifests(service, name, sender, recipient, filehash);
        ",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_and_creates_schema() {
        let (store, _tmp) = StoreRoot::open_in_memory().unwrap();
        let conn = store.conn.lock().unwrap();
        let count: i64 = conn
            .query_row(
                "SELECT count(*) FROM sqlite_master WHERE type='table' AND name='files'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn blob_dir_and_hash_dir_exist() {
        let (store, _tmp) = StoreRoot::open_in_memory().unwrap();
        assert!(store.blob_dir.is_dir());
        assert!(store.hash_dir.is_dir());
    }
}
