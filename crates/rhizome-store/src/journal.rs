//! Rolling hash-state cache for journal bundles.
//!
//! A journal's `filehash` always covers its retained window
//! `[tail, tail + filesize)`. As long as nothing drops bytes off the head
//! between two appends, extending that window by a handful of bytes does
//! not require re-reading and re-hashing the retained prefix: the SHA-512
//! state from the previous append is still sitting right here, ready to
//! absorb only the new bytes. Dropping bytes off the head (advancing the
//! tail) invalidates the cached state for that bundle, since a forward-only
//! hash can't un-hash a prefix; the next append after an advance pays for
//! one rehash of the new retained window, then resumes from there.
//!
//! The in-memory cache only survives the daemon's own lifetime. A plain
//! checkpoint marker is also written under the store's `hash` directory so
//! a restarted daemon has something to cross-check its next from-scratch
//! rehash against, even though the hasher state itself can't be serialised
//! across a restart.

use rhizome_core::ids::{Bid, FileHash};
use sha2::Sha512;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

struct CachedState {
    tail: u64,
    hashed_len: u64,
    hasher: Sha512,
}

#[derive(Default)]
pub struct JournalHashCache {
    entries: Mutex<HashMap<Bid, CachedState>>,
}

impl JournalHashCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a primed hasher if this cache still holds state for `id`
    /// covering exactly `[tail, tail + hashed_len)` — the window the next
    /// append needs to extend.
    pub fn resume(&self, id: Bid, tail: u64, hashed_len: u64) -> Option<Sha512> {
        let entries = self.entries.lock().unwrap();
        let cached = entries.get(&id)?;
        (cached.tail == tail && cached.hashed_len == hashed_len).then(|| cached.hasher.clone())
    }

    /// Records the hasher state after a successful append (or a from-scratch
    /// rehash following a head advance), and drops a checkpoint marker file
    /// alongside it.
    pub fn checkpoint(&self, hash_dir: &Path, id: Bid, tail: u64, hashed_len: u64, hasher: Sha512, digest: FileHash) {
        self.entries.lock().unwrap().insert(id, CachedState { tail, hashed_len, hasher });
        let marker = format!("{tail}:{hashed_len}:{}\n", digest.to_hex());
        let _ = std::fs::write(hash_dir.join(id.to_hex()), marker);
    }

    pub fn forget(&self, id: Bid) {
        self.entries.lock().unwrap().remove(&id);
    }
}
