//! Manifest parsing, packing, validation and the authorship state machine.

use crate::error::ManifestError;
use crate::field;
use crate::sign::Signature;
use rhizome_core::ids::{Bid, BundleKey, FileHash, Sid};

/// Maximum total manifest size (header + signature block), in bytes.
pub const MAX_MANIFEST_SIZE: usize = 8192;
/// Maximum label length.
pub const MAX_LABEL_LEN: usize = 80;
/// Maximum value length (strictly less than the manifest size cap).
pub const MAX_VALUE_LEN: usize = 8191;

/// Result of [`Manifest::inspect`] — the cheap pre-parse probe used by the
/// store to decide bundle-id uniqueness before paying for a full parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManifestSummary {
    pub id: Bid,
    pub version: u64,
    pub body_len: usize,
}

/// Author-verification state. Transitions are driven by [`Manifest::set_id`]
/// and [`Manifest::remove_bk`], which both collapse a previously-verified
/// `Authentic`/`Local` state back to `NotChecked` since the fact that
/// justified the prior state no longer holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Authorship {
    #[default]
    Anonymous,
    NotChecked,
    Authentic,
    Local,
    Remote,
    Impostor,
    Unknown,
    AuthenticationError,
}

/// A parsed or in-progress manifest: an ordered `label=value` field list
/// plus an appended binary signature block.
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    /// Canonical (lowercased label) insertion-ordered fields. This is the
    /// single source of truth — typed accessors are thin views over it, so
    /// a manifest that parses cleanly always re-packs byte-identical.
    fields: Vec<(String, String)>,
    /// Non-blocking validation complaints (service-specific field missing).
    pub malformed: Vec<String>,
    pub signatures: Vec<Signature>,
    pub finalised: bool,
    pub self_signed: bool,
    pub authorship: Authorship,
    body_hash: Option<[u8; 64]>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    // ── generic store ────────────────────────────────────────────────────

    pub fn get_raw(&self, label: &str) -> Option<String> {
        let lower = label.to_ascii_lowercase();
        self.fields.iter().find(|(l, _)| *l == lower).map(|(_, v)| v.clone())
    }

    pub fn set_raw(&mut self, label: &str, value: &str) {
        let lower = label.to_ascii_lowercase();
        if let Some(entry) = self.fields.iter_mut().find(|(l, _)| *l == lower) {
            entry.1 = value.to_string();
        } else {
            self.fields.push((lower, value.to_string()));
        }
        self.finalised = false;
    }

    pub fn remove_raw(&mut self, label: &str) {
        let lower = label.to_ascii_lowercase();
        self.fields.retain(|(l, _)| *l != lower);
        self.finalised = false;
    }

    pub fn iter_fields(&self) -> impl Iterator<Item = &(String, String)> {
        self.fields.iter()
    }

    // ── typed accessors ──────────────────────────────────────────────────

    pub fn id(&self) -> Option<Bid> {
        self.get_raw("id").and_then(|v| Bid::from_hex(&v).ok())
    }

    pub fn set_id(&mut self, id: Bid) {
        self.set_raw("id", &id.to_hex());
        if matches!(self.authorship, Authorship::Authentic | Authorship::Local) {
            self.authorship = Authorship::NotChecked;
        }
    }

    pub fn version(&self) -> Option<u64> {
        self.get_raw("version").and_then(|v| v.parse().ok())
    }

    pub fn set_version(&mut self, version: u64) {
        self.set_raw("version", &version.to_string());
    }

    pub fn filesize(&self) -> Option<u64> {
        self.get_raw("filesize").and_then(|v| v.parse().ok())
    }

    pub fn set_filesize(&mut self, filesize: u64) {
        self.set_raw("filesize", &filesize.to_string());
    }

    pub fn filehash(&self) -> Option<FileHash> {
        self.get_raw("filehash").and_then(|v| FileHash::from_hex(&v).ok())
    }

    pub fn set_filehash(&mut self, hash: FileHash) {
        self.set_raw("filehash", &hash.to_hex());
    }

    pub fn tail(&self) -> Option<u64> {
        self.get_raw("tail").and_then(|v| v.parse().ok())
    }

    pub fn set_tail(&mut self, tail: u64) {
        self.set_raw("tail", &tail.to_string());
    }

    pub fn is_journal(&self) -> bool {
        self.get_raw("tail").is_some()
    }

    pub fn bk(&self) -> Option<BundleKey> {
        self.get_raw("bk").and_then(|v| BundleKey::from_hex(&v).ok())
    }

    pub fn set_bk(&mut self, bk: BundleKey) {
        self.set_raw("bk", &bk.to_hex());
    }

    pub fn remove_bk(&mut self) {
        self.remove_raw("bk");
        if matches!(self.authorship, Authorship::Authentic | Authorship::Local) {
            self.authorship = Authorship::NotChecked;
        }
    }

    pub fn service(&self) -> Option<String> {
        self.get_raw("service")
    }

    pub fn set_service(&mut self, service: &str) {
        self.set_raw("service", service);
    }

    pub fn date(&self) -> Option<i64> {
        self.get_raw("date").and_then(|v| v.parse().ok())
    }

    pub fn set_date(&mut self, date: i64) {
        self.set_raw("date", &date.to_string());
    }

    pub fn sender(&self) -> Option<Sid> {
        self.get_raw("sender").and_then(|v| Sid::parse(&v).ok())
    }

    pub fn set_sender(&mut self, sender: Sid) {
        self.set_raw("sender", &sender.to_hex());
    }

    pub fn recipient(&self) -> Option<Sid> {
        self.get_raw("recipient").and_then(|v| Sid::parse(&v).ok())
    }

    pub fn set_recipient(&mut self, recipient: Sid) {
        self.set_raw("recipient", &recipient.to_hex());
    }

    pub fn name(&self) -> Option<String> {
        self.get_raw("name")
    }

    pub fn set_name(&mut self, name: &str) {
        self.set_raw("name", name);
    }

    pub fn crypt(&self) -> Option<bool> {
        self.get_raw("crypt").map(|v| v == "1")
    }

    pub fn set_crypt(&mut self, crypt: bool) {
        self.set_raw("crypt", if crypt { "1" } else { "0" });
    }

    // ── copy ─────────────────────────────────────────────────────────────

    /// Copies every core field present in `src` onto `self`, clearing any
    /// that `src` lacks. Driven entirely by the field table.
    pub fn copy_from(&mut self, src: &Manifest) {
        for f in field::CORE_FIELDS {
            (f.copy)(self, src);
        }
    }

    // ── inspect ──────────────────────────────────────────────────────────

    /// Scans for exactly `id` and `version` without unpacking every field.
    pub fn inspect(buf: &[u8]) -> Result<ManifestSummary, ManifestError> {
        let body_end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
        let mut id = None;
        let mut version = None;
        for line in buf[..body_end].split(|&b| b == b'\n') {
            let line = strip_cr(line);
            if line.is_empty() {
                continue;
            }
            let Some(eq) = line.iter().position(|&b| b == b'=') else {
                continue;
            };
            let label = std::str::from_utf8(&line[..eq]).unwrap_or("").to_ascii_lowercase();
            let value = std::str::from_utf8(&line[eq + 1..]).unwrap_or("");
            match label.as_str() {
                "id" => id = Bid::from_hex(value).ok(),
                "version" => version = value.parse::<u64>().ok(),
                _ => {}
            }
            if id.is_some() && version.is_some() {
                break;
            }
        }
        let id = id.ok_or(ManifestError::SyntaxError(0))?;
        let version = version.ok_or(ManifestError::SyntaxError(0))?;
        Ok(ManifestSummary { id, version, body_len: body_end })
    }

    // ── parse ────────────────────────────────────────────────────────────

    /// Parses a complete manifest buffer (header lines, NUL, signature
    /// block) into a `Manifest`. Syntax errors and duplicate fields fail
    /// the whole parse; malformed non-core fields are tolerated and
    /// recorded in `malformed`.
    pub fn parse(buf: &[u8]) -> Result<Manifest, ManifestError> {
        if buf.len() > MAX_MANIFEST_SIZE {
            return Err(ManifestError::Overflow { max: MAX_MANIFEST_SIZE });
        }
        let body_end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
        let mut manifest = Manifest::new();
        let mut seen = std::collections::HashSet::new();

        for (lineno, raw_line) in buf[..body_end].split(|&b| b == b'\n').enumerate() {
            let line = strip_cr(raw_line);
            if line.is_empty() {
                continue;
            }
            let Some(eq) = line.iter().position(|&b| b == b'=') else {
                return Err(ManifestError::SyntaxError(lineno));
            };
            let label_bytes = &line[..eq];
            let value_bytes = &line[eq + 1..];
            let label = std::str::from_utf8(label_bytes).map_err(|_| ManifestError::SyntaxError(lineno))?;
            if !is_valid_label(label) {
                return Err(ManifestError::SyntaxError(lineno));
            }
            if label.len() > MAX_LABEL_LEN {
                return Err(ManifestError::LabelTooLong(label.to_string()));
            }
            let value = std::str::from_utf8(value_bytes).map_err(|_| ManifestError::SyntaxError(lineno))?;
            if value.len() > MAX_VALUE_LEN || value.contains('\0') {
                return Err(ManifestError::SyntaxError(lineno));
            }

            let lower_label = label.to_ascii_lowercase();
            if !seen.insert(lower_label.clone()) {
                return Err(ManifestError::DuplicateField(lower_label));
            }

            match field::lookup(label) {
                Some(f) => {
                    if let Err(source) = (f.parse)(&mut manifest, value) {
                        return Err(ManifestError::InvalidCoreField { label: lower_label, source });
                    }
                }
                None => manifest.set_raw(label, value),
            }
        }

        if let Some(sig_bytes) = buf.get(body_end + 1..) {
            manifest.signatures = crate::sign::parse_signatures(sig_bytes);
        }

        manifest.run_soft_validation();
        Ok(manifest)
    }

    fn run_soft_validation(&mut self) {
        self.malformed.clear();
        let is_meshms = matches!(self.service().as_deref(), Some(s) if s.starts_with("MeshMS"));
        if self.service().as_deref() == Some("file") && self.name().is_none() {
            self.malformed.push("file service requires name".to_string());
        }
        if is_meshms && (self.sender().is_none() || self.recipient().is_none()) {
            self.malformed.push("MeshMS service requires sender and recipient".to_string());
        }
        if !is_meshms && self.service().is_some() && self.date().is_none() {
            self.malformed.push("non-messaging service requires date".to_string());
        }
    }

    // ── validate ─────────────────────────────────────────────────────────

    /// Hard requirements that block finalisation.
    pub fn validate(&self) -> Result<(), ManifestError> {
        let id = self.id();
        let version = self.version();
        let filesize = self.filesize();
        if id.is_none() {
            return Err(ManifestError::InvalidCoreField {
                label: "id".into(),
                source: crate::error::FieldError::BadGrammar,
            });
        }
        match version {
            None | Some(0) => {
                return Err(ManifestError::InvalidCoreField {
                    label: "version".into(),
                    source: crate::error::FieldError::MustBeNonZero,
                })
            }
            _ => {}
        }
        let Some(filesize) = filesize else {
            return Err(ManifestError::InvalidCoreField {
                label: "filesize".into(),
                source: crate::error::FieldError::BadGrammar,
            });
        };
        let has_hash = self.filehash().is_some();
        if (filesize > 0) != has_hash {
            return Err(ManifestError::InvalidCoreField {
                label: "filehash".into(),
                source: crate::error::FieldError::BadGrammar,
            });
        }
        Ok(())
    }

    // ── pack ─────────────────────────────────────────────────────────────

    /// Renders the body in field insertion order, NUL-terminated, followed
    /// by the signature block (if any).
    pub fn pack_body(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for (label, value) in &self.fields {
            out.extend_from_slice(label.as_bytes());
            out.push(b'=');
            out.extend_from_slice(value.as_bytes());
            out.push(b'\n');
        }
        out.push(0);
        out
    }

    pub fn pack(&self) -> Vec<u8> {
        let mut out = self.pack_body();
        for sig in &self.signatures {
            out.extend_from_slice(&sig.to_bytes());
        }
        out
    }

    pub fn body_hash(&self) -> Option<[u8; 64]> {
        self.body_hash
    }

    pub(crate) fn set_body_hash(&mut self, hash: [u8; 64]) {
        self.body_hash = Some(hash);
    }
}

fn strip_cr(line: &[u8]) -> &[u8] {
    if let Some((&b'\r', rest)) = line.split_last() {
        rest
    } else {
        line
    }
}

fn is_valid_label(label: &str) -> bool {
    let mut chars = label.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric())
}
