//! Reed-Solomon(255,223) over the frame's header tail and payload.

use crate::error::FrameError;
use reed_solomon::{Decoder, Encoder};

pub const DATA_MAX: usize = 223;
pub const PARITY_LEN: usize = 32;

/// Computes the 32-byte parity block for `protected` (which must be at
/// most [`DATA_MAX`] bytes; shorter blocks are virtually zero-padded by
/// the encoder itself).
pub fn encode_parity(protected: &[u8]) -> [u8; PARITY_LEN] {
    debug_assert!(protected.len() <= DATA_MAX);
    let encoder = Encoder::new(PARITY_LEN);
    let encoded = encoder.encode(protected);
    let mut out = [0u8; PARITY_LEN];
    out.copy_from_slice(encoded.ecc());
    out
}

/// Corrects `protected` in place using the accompanying `parity` block.
/// Returns the number of byte errors corrected, or
/// [`FrameError::ReedSolomonUncorrectable`] if more than 16 byte errors
/// occurred (beyond the code's guaranteed correction radius).
pub fn correct(protected: &mut [u8], parity: &[u8; PARITY_LEN]) -> Result<usize, FrameError> {
    let mut combined = Vec::with_capacity(protected.len() + PARITY_LEN);
    combined.extend_from_slice(protected);
    combined.extend_from_slice(parity);
    let decoder = Decoder::new(PARITY_LEN);
    let recovered = decoder.correct(&mut combined, None).map_err(|_| FrameError::ReedSolomonUncorrectable)?;
    let corrected_data = recovered.data();
    let errors = protected.iter().zip(corrected_data).filter(|(a, b)| *a != *b).count();
    protected.copy_from_slice(&corrected_data[..protected.len()]);
    Ok(errors)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_without_errors() {
        let data = b"the quick brown fox".to_vec();
        let parity = encode_parity(&data);
        let mut corrupted = data.clone();
        let errors = correct(&mut corrupted, &parity).unwrap();
        assert_eq!(errors, 0);
        assert_eq!(corrupted, data);
    }

    #[test]
    fn corrects_a_handful_of_byte_errors() {
        let data = vec![7u8; 100];
        let parity = encode_parity(&data);
        let mut corrupted = data.clone();
        corrupted[0] ^= 0xFF;
        corrupted[50] ^= 0xFF;
        corrupted[99] ^= 0xFF;
        let errors = correct(&mut corrupted, &parity).unwrap();
        assert_eq!(errors, 3);
        assert_eq!(corrupted, data);
    }
}
