//! Fixed-width identifier types.
//!
//! Every identifier is a byte array with a canonical lowercase-hex text
//! form. Comparison is lexicographic on the underlying bytes, matching the
//! `memcmp`-style ordering the payload store and manifest dedup index rely
//! on.

use crate::error::CoreError;
use std::fmt;

macro_rules! fixed_id {
    ($name:ident, $len:expr, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub [u8; $len]);

        impl $name {
            pub const LEN: usize = $len;
            pub const STRLEN: usize = $len * 2;

            pub const fn zero() -> Self {
                Self([0u8; $len])
            }

            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            /// Parses exactly `STRLEN` hex characters, rejecting any
            /// trailing or leading garbage.
            pub fn from_hex(s: &str) -> Result<Self, CoreError> {
                if s.len() != Self::STRLEN {
                    return Err(CoreError::WrongHexLength {
                        expected: Self::STRLEN,
                        actual: s.len(),
                    });
                }
                let mut out = [0u8; $len];
                hex::decode_to_slice(s, &mut out).map_err(|_| CoreError::InvalidHex(0))?;
                Ok(Self(out))
            }

            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.to_hex())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.to_hex())
            }
        }

        impl From<[u8; $len]> for $name {
            fn from(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }
    };
}

fixed_id!(Sid, 32, "Subscriber identifier — a subscriber's public encryption key.");
fixed_id!(Identity, 32, "Signing public key of an identity in the keyring.");
fixed_id!(Bid, 32, "Bundle identifier — the signing public key of a bundle.");
fixed_id!(FileHash, 64, "SHA-512 digest of a payload's plaintext bytes.");
fixed_id!(BundleKey, 32, "Bundle key (BK) — combined with the author secret, recovers the bundle secret.");
fixed_id!(BundleSecretKey, 64, "Bundle secret key (BSK) — raw 64-byte secret, or SHA-512 of a passphrase.");

/// All-ones SID reserved for broadcast addressing.
pub const SID_BROADCAST: Sid = Sid([0xff; 32]);

impl Sid {
    /// Parses a SID, accepting the case-insensitive literal token
    /// `"broadcast"` as a shorthand for [`SID_BROADCAST`].
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        if s.eq_ignore_ascii_case("broadcast") {
            return Ok(SID_BROADCAST);
        }
        Sid::from_hex(s)
    }

    pub fn is_broadcast(&self) -> bool {
        *self == SID_BROADCAST
    }
}

impl BundleKey {
    /// A BK of all zero bytes means "no bundle key" (author undisclosed).
    pub fn is_none(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }
}
