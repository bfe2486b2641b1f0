//! Compose, finalise, and store a bundle: manifest default-filling,
//! author derivation, payload streaming, deduplication, and the
//! signed-and-stored terminal state.

use crate::dedup;
use crate::error::{BundleError, BundleResult, BundleStatus};
use ed25519_dalek::SigningKey;
use rhizome_core::ids::Identity;
use rhizome_manifest::{classify_authorship, sign, Keyring, Manifest};
use rhizome_store::{OpenWriteOutcome, PayloadStatus, Store};

fn local_keyring(secret: &SigningKey) -> Keyring {
    Keyring::with_local(Identity(secret.verifying_key().to_bytes()))
}

/// Caller-supplied inputs to [`compose_and_store`]. Anything left unset is
/// filled with a default the same way the original's manifest builder does.
pub struct ComposeRequest<'a> {
    pub manifest: Manifest,
    pub payload: &'a [u8],
    pub secret: &'a SigningKey,
    pub filename_hint: Option<&'a str>,
}

/// Fills in every defaultable core field that the caller left unset.
fn fill_defaults(manifest: &mut Manifest, filename_hint: Option<&str>) {
    if manifest.version().is_none() {
        manifest.set_version(rhizome_store::time::now_ms() as u64);
    }
    let needs_date = manifest.service().is_some()
        && !manifest.service().as_deref().unwrap_or("").starts_with("MeshMS");
    if needs_date && manifest.date().is_none() {
        manifest.set_date(rhizome_store::time::now_ms());
    }
    if manifest.service().as_deref() == Some("file") && manifest.name().is_none() {
        if let Some(hint) = filename_hint {
            manifest.set_name(hint);
        }
    }
    if manifest.crypt().is_none() {
        let encrypt = manifest.recipient().map(|r| !r.is_broadcast()).unwrap_or(false);
        if encrypt {
            manifest.set_crypt(true);
        }
    }
}

/// Composes, validates, streams the payload, deduplicates, finalises
/// (pack + self-sign) and stores a bundle's manifest row.
pub fn compose_and_store(store: &Store, req: ComposeRequest) -> Result<(Manifest, BundleResult), BundleError> {
    let mut manifest = req.manifest;
    let caller_supplied_id = manifest.id().is_some();
    let is_journal = manifest.is_journal();

    if let Some(existing_id) = manifest.id() {
        if existing_id != sign::id_from_signing_key(req.secret) {
            return Ok((manifest, BundleResult::new(BundleStatus::Fake, "manifest id does not match signing key")));
        }
    } else {
        manifest.set_id(sign::id_from_signing_key(req.secret));
    }

    fill_defaults(&mut manifest, req.filename_hint);

    // Stream the payload through the store before anything else touches
    // the manifest's filesize/filehash fields.
    let outcome = store.open_write(None, Some(req.payload.len() as u64), None)?;
    match outcome {
        OpenWriteOutcome::Status(PayloadStatus::TooBig) | OpenWriteOutcome::Status(PayloadStatus::Evicted) => {
            return Ok((manifest, BundleResult::new(BundleStatus::NoRoom, "payload exceeds store quota")));
        }
        OpenWriteOutcome::Status(PayloadStatus::Busy) => {
            return Ok((manifest, BundleResult::new(BundleStatus::Busy, "store busy")));
        }
        OpenWriteOutcome::Status(PayloadStatus::Empty) => {
            manifest.set_filesize(0);
        }
        OpenWriteOutcome::Status(status) => {
            return Ok((manifest, BundleResult::new(BundleStatus::Error, format!("unexpected write outcome: {status:?}"))));
        }
        OpenWriteOutcome::Writer(mut w) => {
            w.write(req.payload)?;
            let status = w.finish()?;
            match status {
                PayloadStatus::New | PayloadStatus::Stored => {}
                other => return Ok((manifest, BundleResult::new(BundleStatus::Error, format!("write failed: {other:?}")))),
            }
            let digest = sha512(req.payload);
            manifest.set_filesize(req.payload.len() as u64);
            manifest.set_filehash(rhizome_core::ids::FileHash(digest));
        }
    }

    if manifest.validate().is_err() {
        return Ok((manifest, BundleResult::new(BundleStatus::Invalid, "manifest fails required-field validation")));
    }

    let conn_guard = store.root.conn.lock().unwrap();

    if !caller_supplied_id && !is_journal {
        if let Some(dup) = dedup::find_duplicate(&conn_guard, &manifest)? {
            return Ok((
                manifest,
                BundleResult::new(BundleStatus::Duplicate, format!("duplicate of {} v{}", dup.id, dup.version)),
            ));
        }
    }

    if caller_supplied_id {
        if let Some(current_version) = dedup::find_current_version(&conn_guard, manifest.id().unwrap())? {
            let new_version = manifest.version().unwrap_or(0);
            if new_version < current_version {
                return Ok((manifest, BundleResult::new(BundleStatus::Old, "version older than stored copy")));
            }
            if new_version == current_version {
                return Ok((manifest, BundleResult::new(BundleStatus::Same, "version matches stored copy")));
            }
        }
    }
    drop(conn_guard);

    match sign::self_sign(&mut manifest, req.secret) {
        Ok(()) => {}
        Err(sign::SignError::TooBig) => {
            return Ok((manifest, BundleResult::new(BundleStatus::ManifestTooBig, "manifest exceeds size cap")))
        }
        Err(e) => return Ok((manifest, BundleResult::new(BundleStatus::Fake, e.to_string()))),
    }

    classify_authorship(&mut manifest, &local_keyring(req.secret));

    let conn_guard = store.root.conn.lock().unwrap();
    let author = Some(sign::id_from_signing_key(req.secret));
    dedup::store_manifest_row(&conn_guard, &manifest, author, rhizome_store::time::now_ms())?;
    drop(conn_guard);

    Ok((manifest, BundleResult::new(BundleStatus::New, "stored")))
}

/// Extends a journal bundle: drops `advance_by` bytes off the retained
/// window's head and appends `extra` bytes at the tail, in one atomic
/// manifest update. Piping the retained bytes forward and hashing the new
/// ones is handled by [`Store::journal_pipe`]/[`Store::journal_pipe_preseeded`]
/// — when `advance_by` is zero and this bundle's previous append is still
/// cached in [`Store::journal_hashes`], the retained prefix is replayed
/// straight into the new payload without being re-hashed.
pub fn journal_append(
    store: &Store,
    manifest: &mut Manifest,
    advance_by: u64,
    extra: &[u8],
    secret: &SigningKey,
) -> Result<BundleResult, BundleError> {
    if !manifest.is_journal() {
        return Ok(BundleResult::new(BundleStatus::Invalid, "not a journal bundle"));
    }
    let Some(bid) = manifest.id() else {
        return Ok(BundleResult::new(BundleStatus::Invalid, "journal bundle has no id"));
    };
    let tail = manifest.tail().unwrap_or(0);
    let old_filesize = manifest.filesize().unwrap_or(0);
    let old_hash = manifest.filehash();

    if advance_by > old_filesize {
        return Ok(BundleResult::new(BundleStatus::Invalid, "advance_by exceeds retained payload"));
    }
    let retained = old_filesize - advance_by;
    let new_filesize = retained + extra.len() as u64;
    let new_tail = tail + advance_by;

    let outcome = store.open_write(None, Some(new_filesize), None)?;
    let OpenWriteOutcome::Writer(mut w) = outcome else {
        return Ok(BundleResult::new(BundleStatus::NoRoom, "store rejected journal write"));
    };

    if retained > 0 {
        let hash = old_hash.expect("nonzero retained payload must have a filehash");
        let resumed = if advance_by == 0 { store.journal_hashes.resume(bid, tail, old_filesize) } else { None };
        if let Some(hasher) = resumed {
            w.seed_hash_state(hasher, retained);
            store.journal_pipe_preseeded(&mut w, hash, 0, retained)?;
        } else {
            store.journal_pipe(&mut w, hash, advance_by, retained)?;
        }
    }
    w.write_at(retained, extra)?;
    let hasher_snapshot = w.hash_state();
    let (status, digest) = w.finish_with_hash()?;
    if !matches!(status, PayloadStatus::New | PayloadStatus::Stored) {
        return Ok(BundleResult::new(BundleStatus::Error, format!("journal write failed: {status:?}")));
    }
    store.journal_hashes.checkpoint(&store.root.hash_dir, bid, new_tail, new_filesize, hasher_snapshot, digest);

    manifest.set_filesize(new_filesize);
    manifest.set_filehash(digest);
    manifest.set_tail(new_tail);
    manifest.set_version(new_tail + new_filesize);

    match sign::self_sign(manifest, secret) {
        Ok(()) => {}
        Err(sign::SignError::TooBig) => return Ok(BundleResult::new(BundleStatus::ManifestTooBig, "manifest exceeds size cap")),
        Err(e) => return Ok(BundleResult::new(BundleStatus::Fake, e.to_string())),
    }

    classify_authorship(manifest, &local_keyring(secret));

    let conn_guard = store.root.conn.lock().unwrap();
    dedup::store_manifest_row(&conn_guard, manifest, Some(sign::id_from_signing_key(secret)), rhizome_store::time::now_ms())?;
    drop(conn_guard);

    Ok(BundleResult::new(BundleStatus::New, "journal extended"))
}

fn sha512(data: &[u8]) -> [u8; 64] {
    use sha2::{Digest, Sha512};
    let mut h = Sha512::new();
    h.update(data);
    h.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    fn store() -> (Store, tempfile::TempDir) {
        let tmp = tempfile::tempdir().unwrap();
        let config = rhizome_core::config::StoreConfig {
            path: tmp.path().to_path_buf(),
            database_size: 0,
            min_free_space: 0,
            blob_threshold: 131072,
            write_buffer_max: 1_048_576,
            read_cache_expiry_ms: 5000,
        };
        (Store::open(config).unwrap(), tmp)
    }

    #[test]
    fn compose_new_bundle_succeeds() {
        let (store, _tmp) = store();
        let secret = SigningKey::generate(&mut OsRng);
        let mut manifest = Manifest::new();
        manifest.set_service("file");
        manifest.set_name("hello.txt");
        let req = ComposeRequest { manifest: manifest.clone(), payload: b"hello world", secret: &secret, filename_hint: Some("hello.txt") };
        let (stored, result) = compose_and_store(&store, req).unwrap();
        assert_eq!(result.status, BundleStatus::New);
        assert!(stored.self_signed);
        assert_eq!(stored.filesize(), Some(11));
    }

    #[test]
    fn composing_twice_is_detected_as_duplicate() {
        let (store, _tmp) = store();
        let secret = SigningKey::generate(&mut OsRng);
        let mut manifest = Manifest::new();
        manifest.set_service("file");
        manifest.set_name("dup.txt");
        let req1 = ComposeRequest { manifest: manifest.clone(), payload: b"same bytes", secret: &secret, filename_hint: Some("dup.txt") };
        compose_and_store(&store, req1).unwrap();

        let secret2 = SigningKey::generate(&mut OsRng);
        let req2 = ComposeRequest { manifest, payload: b"same bytes", secret: &secret2, filename_hint: Some("dup.txt") };
        let (_m, result) = compose_and_store(&store, req2).unwrap();
        assert_eq!(result.status, BundleStatus::Duplicate);
    }

    #[test]
    fn fake_author_is_rejected() {
        let (store, _tmp) = store();
        let secret = SigningKey::generate(&mut OsRng);
        let wrong_secret = SigningKey::generate(&mut OsRng);
        let mut manifest = Manifest::new();
        manifest.set_id(sign::id_from_signing_key(&secret));
        let req = ComposeRequest { manifest, payload: b"x", secret: &wrong_secret, filename_hint: None };
        let (_m, result) = compose_and_store(&store, req).unwrap();
        assert_eq!(result.status, BundleStatus::Fake);
    }

    #[test]
    fn journal_append_grows_payload_and_version() {
        let (store, _tmp) = store();
        let secret = SigningKey::generate(&mut OsRng);
        let mut manifest = Manifest::new();
        manifest.set_tail(0);
        manifest.set_service("file");
        let req = ComposeRequest { manifest, payload: b"first-", secret: &secret, filename_hint: None };
        let (mut stored, result) = compose_and_store(&store, req).unwrap();
        assert_eq!(result.status, BundleStatus::New);

        let result2 = journal_append(&store, &mut stored, 0, b"second", &secret).unwrap();
        assert_eq!(result2.status, BundleStatus::New);
        assert_eq!(stored.filesize(), Some(12));
        assert_eq!(stored.tail(), Some(0));
    }

    #[test]
    fn journal_append_advances_head_and_trims_retained_prefix() {
        let (store, _tmp) = store();
        let secret = SigningKey::generate(&mut OsRng);
        let mut manifest = Manifest::new();
        manifest.set_tail(0);
        manifest.set_service("file");
        let req = ComposeRequest { manifest, payload: b"ABCD", secret: &secret, filename_hint: None };
        let (mut stored, result) = compose_and_store(&store, req).unwrap();
        assert_eq!(result.status, BundleStatus::New);

        let result2 = journal_append(&store, &mut stored, 1, b"E", &secret).unwrap();
        assert_eq!(result2.status, BundleStatus::New);
        assert_eq!(stored.tail(), Some(1));
        assert_eq!(stored.filesize(), Some(4));

        let hash = stored.filehash().unwrap();
        let mut reader = store.open_read(hash, None).unwrap().unwrap();
        assert_eq!(reader.read_at(0, 4).unwrap(), b"BCDE");
    }

    #[test]
    fn journal_append_rejects_advance_past_retained_payload() {
        let (store, _tmp) = store();
        let secret = SigningKey::generate(&mut OsRng);
        let mut manifest = Manifest::new();
        manifest.set_tail(0);
        manifest.set_service("file");
        let req = ComposeRequest { manifest, payload: b"AB", secret: &secret, filename_hint: None };
        let (mut stored, _) = compose_and_store(&store, req).unwrap();

        let result = journal_append(&store, &mut stored, 99, b"x", &secret).unwrap();
        assert_eq!(result.status, BundleStatus::Invalid);
    }
}
