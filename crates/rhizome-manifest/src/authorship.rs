//! Author-verification: classifies a signed manifest against a small
//! keyring of signing identities this process trusts.
//!
//! The wire format's full keyring (many known identities, persisted,
//! shared across a mesh of peers) isn't implemented here — only the
//! lookup shape it implies: a manifest's author is either this process's
//! own identity, an identity this process has chosen to trust, or
//! neither. That's enough to drive every [`Authorship`] transition the
//! manifest model defines.

use crate::manifest::{Authorship, Manifest};
use crate::sign;
use rhizome_core::ids::{Bid, Identity};
use std::collections::HashSet;

/// Signing identities this process is willing to vouch for: its own, plus
/// any others it has chosen to trust (e.g. the author of a bundle it has
/// already stored and verified before).
#[derive(Debug, Clone, Default)]
pub struct Keyring {
    local: Option<Identity>,
    trusted: HashSet<Identity>,
}

impl Keyring {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_local(local: Identity) -> Self {
        Keyring { local: Some(local), trusted: HashSet::new() }
    }

    pub fn trust(&mut self, id: Identity) {
        self.trusted.insert(id);
    }

    pub fn is_local(&self, id: Identity) -> bool {
        self.local == Some(id)
    }

    pub fn contains(&self, id: Identity) -> bool {
        self.trusted.contains(&id) || self.is_local(id)
    }
}

fn as_identity(bid: Bid) -> Identity {
    Identity(bid.0)
}

/// Classifies `manifest`'s authorship against `keyring` and records the
/// result on the manifest. Returns the same value for convenience.
///
/// - No signature at all → [`Authorship::Anonymous`].
/// - A signature present but cryptographically invalid →
///   [`Authorship::AuthenticationError`].
/// - A valid signature whose signing key (`id`) is this process's own →
///   [`Authorship::Local`].
/// - A valid signature whose signing key is in the keyring but isn't the
///   local identity → [`Authorship::Authentic`].
/// - A valid signature not in the keyring, with `sender` set and equal to
///   the signing key (the bundle is self-identifying as its own sender) →
///   [`Authorship::Remote`].
/// - A valid signature not in the keyring, with `sender` set but different
///   from the signing key (claiming to speak for someone it isn't) →
///   [`Authorship::Impostor`].
/// - A valid signature not in the keyring and no `sender` to cross-check →
///   [`Authorship::Unknown`].
pub fn classify_authorship(manifest: &mut Manifest, keyring: &Keyring) -> Authorship {
    let authorship = if manifest.signatures.is_empty() {
        Authorship::Anonymous
    } else if !sign::verify(manifest) {
        Authorship::AuthenticationError
    } else {
        match manifest.id() {
            Some(id) if keyring.is_local(as_identity(id)) => Authorship::Local,
            Some(id) if keyring.contains(as_identity(id)) => Authorship::Authentic,
            Some(id) => match manifest.sender() {
                Some(sender) if sender.0 == id.0 => Authorship::Remote,
                Some(_) => Authorship::Impostor,
                None => Authorship::Unknown,
            },
            None => Authorship::Unknown,
        }
    };
    manifest.authorship = authorship;
    authorship
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sign::id_from_signing_key;
    use ed25519_dalek::SigningKey;
    use rand::rngs::OsRng;

    fn signed(secret: &SigningKey) -> Manifest {
        let mut m = Manifest::new();
        m.set_id(id_from_signing_key(secret));
        m.set_version(1);
        m.set_filesize(0);
        sign::self_sign(&mut m, secret).unwrap();
        m
    }

    #[test]
    fn unsigned_manifest_is_anonymous() {
        let mut m = Manifest::new();
        let keyring = Keyring::new();
        assert_eq!(classify_authorship(&mut m, &keyring), Authorship::Anonymous);
    }

    #[test]
    fn tampered_signature_is_authentication_error() {
        let secret = SigningKey::generate(&mut OsRng);
        let mut m = signed(&secret);
        m.set_version(2); // invalidates the signature without re-signing
        let keyring = Keyring::new();
        assert_eq!(classify_authorship(&mut m, &keyring), Authorship::AuthenticationError);
    }

    #[test]
    fn own_identity_is_local() {
        let secret = SigningKey::generate(&mut OsRng);
        let mut m = signed(&secret);
        let keyring = Keyring::with_local(as_identity(id_from_signing_key(&secret)));
        assert_eq!(classify_authorship(&mut m, &keyring), Authorship::Local);
    }

    #[test]
    fn trusted_non_local_identity_is_authentic() {
        let secret = SigningKey::generate(&mut OsRng);
        let mut m = signed(&secret);
        let mut keyring = Keyring::with_local(Identity([0xee; 32]));
        keyring.trust(as_identity(id_from_signing_key(&secret)));
        assert_eq!(classify_authorship(&mut m, &keyring), Authorship::Authentic);
    }

    #[test]
    fn self_identifying_sender_is_remote() {
        let secret = SigningKey::generate(&mut OsRng);
        let mut m = Manifest::new();
        m.set_id(id_from_signing_key(&secret));
        m.set_sender(rhizome_core::ids::Sid(id_from_signing_key(&secret).0));
        m.set_version(1);
        m.set_filesize(0);
        sign::self_sign(&mut m, &secret).unwrap();
        let keyring = Keyring::new();
        assert_eq!(classify_authorship(&mut m, &keyring), Authorship::Remote);
    }

    #[test]
    fn mismatched_sender_is_impostor() {
        let secret = SigningKey::generate(&mut OsRng);
        let mut m = Manifest::new();
        m.set_id(id_from_signing_key(&secret));
        m.set_sender(rhizome_core::ids::Sid([0x11; 32]));
        m.set_version(1);
        m.set_filesize(0);
        sign::self_sign(&mut m, &secret).unwrap();
        let keyring = Keyring::new();
        assert_eq!(classify_authorship(&mut m, &keyring), Authorship::Impostor);
    }

    #[test]
    fn untrusted_no_sender_is_unknown() {
        let secret = SigningKey::generate(&mut OsRng);
        let mut m = signed(&secret);
        let keyring = Keyring::new();
        assert_eq!(classify_authorship(&mut m, &keyring), Authorship::Unknown);
    }
}
