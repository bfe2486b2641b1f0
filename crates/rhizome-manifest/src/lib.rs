//! Manifest model — parse/serialise text manifests, typed field accessors,
//! validity and signature rules.
//!
//! A manifest is an ordered sequence of `label=value` lines followed by a
//! NUL byte and a binary signature block. This crate never touches the
//! payload store; it only knows how to pack, parse and sign the header.

pub mod authorship;
pub mod error;
pub mod field;
pub mod manifest;
pub mod sign;

pub use authorship::{classify_authorship, Keyring};
pub use error::{FieldError, ManifestError};
pub use manifest::{Authorship, Manifest, ManifestSummary};
pub use sign::{SignError, Signature, SIGNATURE_TYPE_ED25519};
