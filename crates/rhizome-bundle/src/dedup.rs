//! Secondary-index lookups against the `manifests` table.

use rhizome_core::ids::Bid;
use rhizome_manifest::Manifest;
use rusqlite::{params, Connection, OptionalExtension};

/// A prior manifest row matching `(service, name, sender, recipient,
/// filehash)` — the same tuple the original used to decide whether an
/// incoming bundle is a resend of one already held.
pub struct DedupMatch {
    pub id: Bid,
    pub version: u64,
}

pub fn find_duplicate(conn: &Connection, manifest: &Manifest) -> rusqlite::Result<Option<DedupMatch>> {
    let filehash = manifest.filehash().map(|h| h.to_hex());
    conn.query_row(
        "SELECT id, version FROM manifests
         WHERE service IS ?1 AND name IS ?2 AND sender IS ?3 AND recipient IS ?4 AND filehash IS ?5",
        params![
            manifest.service(),
            manifest.name(),
            manifest.sender().map(|s| s.to_hex()),
            manifest.recipient().map(|s| s.to_hex()),
            filehash,
        ],
        |row| {
            let id_hex: String = row.get(0)?;
            let version: i64 = row.get(1)?;
            Ok((id_hex, version as u64))
        },
    )
    .optional()
    .map(|opt| {
        opt.and_then(|(id_hex, version)| Bid::from_hex(&id_hex).ok().map(|id| DedupMatch { id, version }))
    })
}

pub fn find_current_version(conn: &Connection, id: Bid) -> rusqlite::Result<Option<u64>> {
    conn.query_row("SELECT version FROM manifests WHERE id = ?1", [id.to_hex()], |r| r.get::<_, i64>(0))
        .optional()
        .map(|opt| opt.map(|v| v as u64))
}

pub fn store_manifest_row(conn: &Connection, manifest: &Manifest, author: Option<Bid>, inserttime: i64) -> rusqlite::Result<()> {
    let id = manifest.id().expect("manifest must carry id before storing");
    conn.execute(
        "INSERT INTO manifests(id, manifest, version, inserttime, author, service, name, sender, recipient, filehash, filesize, tail)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
         ON CONFLICT(id) DO UPDATE SET
            manifest = excluded.manifest,
            version = excluded.version,
            inserttime = excluded.inserttime,
            author = excluded.author,
            service = excluded.service,
            name = excluded.name,
            sender = excluded.sender,
            recipient = excluded.recipient,
            filehash = excluded.filehash,
            filesize = excluded.filesize,
            tail = excluded.tail",
        params![
            id.to_hex(),
            manifest.pack(),
            manifest.version().unwrap_or(0) as i64,
            inserttime,
            author.map(|a| a.to_hex()),
            manifest.service(),
            manifest.name(),
            manifest.sender().map(|s| s.to_hex()),
            manifest.recipient().map(|s| s.to_hex()),
            manifest.filehash().map(|h| h.to_hex()),
            manifest.filesize().unwrap_or(0) as i64,
            manifest.tail().map(|t| t as i64),
        ],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rhizome_core::ids::FileHash;

    fn conn() -> Connection {
        let c = Connection::open_in_memory().unwrap();
        c.execute_batch(
            "CREATE TABLE manifests (
                id TEXT PRIMARY KEY, manifest BLOB NOT NULL, version INTEGER NOT NULL,
                inserttime INTEGER NOT NULL, author TEXT, service TEXT, name TEXT,
                sender TEXT, recipient TEXT, filehash TEXT, filesize INTEGER NOT NULL, tail INTEGER
            );",
        )
        .unwrap();
        c
    }

    #[test]
    fn store_then_find_duplicate() {
        let conn = conn();
        let mut m = Manifest::new();
        m.set_id(Bid([1; 32]));
        m.set_version(1);
        m.set_filesize(5);
        m.set_filehash(FileHash([2; 64]));
        m.set_service("file");
        m.set_name("a.txt");
        store_manifest_row(&conn, &m, None, 100).unwrap();

        let mut probe = Manifest::new();
        probe.set_filesize(5);
        probe.set_filehash(FileHash([2; 64]));
        probe.set_service("file");
        probe.set_name("a.txt");
        let found = find_duplicate(&conn, &probe).unwrap().expect("duplicate found");
        assert_eq!(found.id, Bid([1; 32]));
        assert_eq!(found.version, 1);
    }

    #[test]
    fn no_duplicate_for_distinct_name() {
        let conn = conn();
        let mut m = Manifest::new();
        m.set_id(Bid([1; 32]));
        m.set_version(1);
        m.set_filesize(5);
        m.set_filehash(FileHash([2; 64]));
        m.set_service("file");
        m.set_name("a.txt");
        store_manifest_row(&conn, &m, None, 100).unwrap();

        let mut probe = Manifest::new();
        probe.set_filesize(5);
        probe.set_filehash(FileHash([2; 64]));
        probe.set_service("file");
        probe.set_name("b.txt");
        assert!(find_duplicate(&conn, &probe).unwrap().is_none());
    }
}
