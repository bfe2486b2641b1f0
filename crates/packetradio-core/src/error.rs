#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("payload of {0} bytes exceeds the {1}-byte frame budget")]
    PayloadTooLarge(usize, usize),
    #[error("golay-protected length field is uncorrectable")]
    LengthUncorrectable,
    #[error("reed-solomon block is uncorrectable (more than 16 byte errors)")]
    ReedSolomonUncorrectable,
    #[error("frame is shorter than its declared length")]
    Truncated,
}
