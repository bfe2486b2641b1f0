//! The daemon's own signing identity: a single Ed25519 keypair persisted
//! next to the store, standing in for the full keyring the wire format
//! otherwise supports. Every bundle this daemon composes is self-signed
//! with this key, so its bundle id equals the key's public half.

use std::path::Path;

use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;

const IDENTITY_FILE: &str = "identity.key";

pub fn load_or_generate(store_root: &Path) -> anyhow::Result<SigningKey> {
    let path = store_root.join(IDENTITY_FILE);
    if let Ok(bytes) = std::fs::read(&path) {
        if let Ok(arr) = <[u8; 32]>::try_from(bytes.as_slice()) {
            return Ok(SigningKey::from_bytes(&arr));
        }
        tracing::warn!(path = %path.display(), "identity file has wrong length, regenerating");
    }

    let key = SigningKey::generate(&mut OsRng);
    std::fs::create_dir_all(store_root)?;
    std::fs::write(&path, key.to_bytes())?;
    tracing::info!(path = %path.display(), "generated new daemon identity");
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_load_returns_same_key() {
        let tmp = tempfile::tempdir().unwrap();
        let first = load_or_generate(tmp.path()).unwrap();
        let second = load_or_generate(tmp.path()).unwrap();
        assert_eq!(first.to_bytes(), second.to_bytes());
    }

    #[test]
    fn truncated_identity_file_is_regenerated() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join(IDENTITY_FILE), b"short").unwrap();
        let key = load_or_generate(tmp.path()).unwrap();
        assert_eq!(key.to_bytes().len(), 32);
    }
}
