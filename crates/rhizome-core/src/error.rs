/// Errors raised while parsing or comparing wire-level identifiers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    #[error("expected {expected} hex chars, got {actual}")]
    WrongHexLength { expected: usize, actual: usize },

    #[error("invalid hex digit at byte {0}")]
    InvalidHex(usize),

    #[error("value is empty")]
    Empty,
}
