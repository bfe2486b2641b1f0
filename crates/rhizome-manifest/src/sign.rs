//! Signature block encode/decode and self-signing.
//!
//! A signature block is a sequence of typed signatures appended after the
//! manifest body's terminating NUL. Only one type is recognised today:
//! `0x17` — an Ed25519 signature over the body hash, whose public key
//! equals the manifest `id` (a self-signature).

use crate::manifest::Manifest;
use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use rhizome_core::ids::Bid;
use sha2::{Digest, Sha512};

pub const SIGNATURE_TYPE_ED25519: u8 = 0x17;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub sig_type: u8,
    pub signature: [u8; 64],
    pub public_key: [u8; 32],
}

impl Signature {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + 64 + 32);
        out.push(self.sig_type);
        out.extend_from_slice(&self.signature);
        out.extend_from_slice(&self.public_key);
        out
    }
}

/// Parses every whole signature found in `buf`, stopping at the first
/// unrecognised type byte or truncated record (a short trailing fragment
/// is silently ignored, matching the tolerant framing the manifest format
/// already applies to its own body).
pub fn parse_signatures(buf: &[u8]) -> Vec<Signature> {
    let mut out = Vec::new();
    let mut offset = 0;
    while offset < buf.len() {
        let sig_type = buf[offset];
        match sig_type {
            SIGNATURE_TYPE_ED25519 => {
                let record_len = 1 + 64 + 32;
                if offset + record_len > buf.len() {
                    break;
                }
                let mut signature = [0u8; 64];
                signature.copy_from_slice(&buf[offset + 1..offset + 65]);
                let mut public_key = [0u8; 32];
                public_key.copy_from_slice(&buf[offset + 65..offset + 97]);
                out.push(Signature { sig_type, signature, public_key });
                offset += record_len;
            }
            _ => break,
        }
    }
    out
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignError {
    #[error("manifest has no bundle secret to sign with")]
    NoSecret,
    #[error("manifest id does not match the signing key's public key")]
    IdMismatch,
    #[error("signature block does not fit within the manifest size cap")]
    TooBig,
}

fn body_hash(body: &[u8]) -> [u8; 64] {
    let mut hasher = Sha512::new();
    hasher.update(body);
    hasher.finalize().into()
}

/// Appends a self-signature to `manifest`, using `secret` as the bundle's
/// Ed25519 signing key. `secret`'s public key must equal the manifest's
/// `id` field.
pub fn self_sign(manifest: &mut Manifest, secret: &SigningKey) -> Result<(), SignError> {
    let id = manifest.id().ok_or(SignError::NoSecret)?;
    let public_key = secret.verifying_key().to_bytes();
    if public_key != id.0 {
        return Err(SignError::IdMismatch);
    }
    let body = manifest.pack_body();
    let hash = body_hash(&body);
    manifest.set_body_hash(hash);
    let sig = secret.sign(&hash);
    let signature = Signature {
        sig_type: SIGNATURE_TYPE_ED25519,
        signature: sig.to_bytes(),
        public_key,
    };
    if body.len() + signature.to_bytes().len() > crate::manifest::MAX_MANIFEST_SIZE {
        return Err(SignError::TooBig);
    }
    manifest.signatures = vec![signature];
    manifest.self_signed = true;
    manifest.finalised = true;
    Ok(())
}

/// Rehashes the body and checks the first signatory's public key against
/// `id`. Sets `manifest.self_signed` on success; additional signatories
/// beyond the first are accepted but not trusted by this check.
pub fn verify(manifest: &mut Manifest) -> bool {
    let Some(id) = manifest.id() else {
        manifest.self_signed = false;
        return false;
    };
    let body = manifest.pack_body();
    let hash = body_hash(&body);
    manifest.set_body_hash(hash);

    let Some(first) = manifest.signatures.first() else {
        manifest.self_signed = false;
        return false;
    };
    if first.sig_type != SIGNATURE_TYPE_ED25519 || first.public_key != id.0 {
        manifest.self_signed = false;
        return false;
    }
    let Ok(verifying_key) = VerifyingKey::from_bytes(&first.public_key) else {
        manifest.self_signed = false;
        return false;
    };
    let sig = ed25519_dalek::Signature::from_bytes(&first.signature);
    let ok = verifying_key.verify(&hash, &sig).is_ok();
    manifest.self_signed = ok;
    ok
}

pub fn id_from_signing_key(secret: &SigningKey) -> Bid {
    Bid(secret.verifying_key().to_bytes())
}
