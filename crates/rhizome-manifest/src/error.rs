/// Why a single field's value was rejected by the field table.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FieldError {
    #[error("value does not match the expected grammar")]
    BadGrammar,
    #[error("integer overflow")]
    Overflow,
    #[error("value is zero but must be non-zero")]
    MustBeNonZero,
}

/// Whole-manifest parse failure classification. The distinction matters to
/// callers: a syntax error or duplicate field fails the whole parse, while
/// a malformed non-core field is tolerated and only recorded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ManifestError {
    #[error("syntax error at line {0}")]
    SyntaxError(usize),
    #[error("duplicate field {0:?}")]
    DuplicateField(String),
    #[error("invalid core field {label:?}: {source}")]
    InvalidCoreField { label: String, source: FieldError },
    #[error("manifest exceeds maximum size of {max} bytes")]
    Overflow { max: usize },
    #[error("manifest too big to fit signature block")]
    ManifestTooBig,
    #[error("label {0:?} exceeds maximum length")]
    LabelTooLong(String),
    #[error("cannot mutate a finalised manifest without clearing it first")]
    AlreadyFinalised,
}
