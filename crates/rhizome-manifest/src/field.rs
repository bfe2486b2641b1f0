//! The field table — the symmetrical tester/unsetter/copier/parser
//! quadruple that drives manifest overwrite and validation.
//!
//! Every core field is described once, here, by four small functions that
//! all operate on the manifest's generic `label=value` store. Adding a new
//! core field means adding one table row, not touching `validate`,
//! `copy_from`, or the parser's dispatch logic.

use crate::error::FieldError;
use crate::manifest::Manifest;
use rhizome_core::ids::{Bid, BundleKey, FileHash, Sid};

pub struct CoreField {
    pub label: &'static str,
    pub test: fn(&Manifest) -> bool,
    pub unset: fn(&mut Manifest),
    pub copy: fn(&mut Manifest, &Manifest),
    pub parse: fn(&mut Manifest, &str) -> Result<(), FieldError>,
}

fn generic_test(m: &Manifest, label: &str) -> bool {
    m.get_raw(label).is_some()
}

fn generic_unset(m: &mut Manifest, label: &str) {
    m.remove_raw(label);
}

fn generic_copy(dst: &mut Manifest, src: &Manifest, label: &str) {
    match src.get_raw(label) {
        Some(v) => dst.set_raw(label, &v),
        None => dst.remove_raw(label),
    }
}

fn non_zero_u64(v: &str) -> Result<u64, FieldError> {
    let n: u64 = v.parse().map_err(|_| FieldError::BadGrammar)?;
    if n == 0 {
        return Err(FieldError::MustBeNonZero);
    }
    Ok(n)
}

macro_rules! field_row {
    ($label:expr, $check:expr) => {
        CoreField {
            label: $label,
            test: |m| generic_test(m, $label),
            unset: |m| generic_unset(m, $label),
            copy: |d, s| generic_copy(d, s, $label),
            parse: |m, v| {
                $check(v)?;
                m.set_raw($label, v);
                Ok(())
            },
        }
    };
}

pub const CORE_FIELDS: &[CoreField] = &[
    field_row!("id", |v: &str| Bid::from_hex(v).map_err(|_| FieldError::BadGrammar)),
    field_row!("version", |v: &str| non_zero_u64(v)),
    field_row!("filesize", |v: &str| v.parse::<u64>().map_err(|_| FieldError::BadGrammar)),
    field_row!("filehash", |v: &str| FileHash::from_hex(v).map_err(|_| FieldError::BadGrammar)),
    field_row!("tail", |v: &str| v.parse::<u64>().map_err(|_| FieldError::BadGrammar)),
    field_row!("bk", |v: &str| BundleKey::from_hex(v).map_err(|_| FieldError::BadGrammar)),
    field_row!("service", |v: &str| {
        if v.is_empty() || !v.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.') {
            Err(FieldError::BadGrammar)
        } else {
            Ok(())
        }
    }),
    field_row!("date", |v: &str| v.parse::<i64>().map_err(|_| FieldError::BadGrammar)),
    field_row!("sender", |v: &str| Sid::parse(v).map_err(|_| FieldError::BadGrammar)),
    field_row!("recipient", |v: &str| Sid::parse(v).map_err(|_| FieldError::BadGrammar)),
    field_row!("name", |v: &str| {
        if v.contains('\n') || v.contains('\r') {
            Err(FieldError::BadGrammar)
        } else {
            Ok(())
        }
    }),
    field_row!("crypt", |v: &str| {
        if v == "0" || v == "1" {
            Ok(())
        } else {
            Err(FieldError::BadGrammar)
        }
    }),
];

pub fn lookup(label: &str) -> Option<&'static CoreField> {
    let lower = label.to_ascii_lowercase();
    CORE_FIELDS.iter().find(|f| f.label == lower)
}
