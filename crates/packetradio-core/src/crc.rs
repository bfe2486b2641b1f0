//! CRC-16 as used by the heartbeat frame (`heartbeat.rs`). The outer data
//! frame (`frame.rs`) relies on Reed-Solomon for integrity instead; this
//! checksum covers the short, unprotected heartbeat form.

const ALGORITHM: crc::Algorithm<u16> = crc::CRC_16_MCRF4XX;
const CRC16: crc::Crc<u16> = crc::Crc::<u16>::new(&ALGORITHM);

pub fn checksum(bytes: &[u8]) -> u16 {
    CRC16.checksum(bytes)
}

/// Computes the checksum with an extra message-id seed byte folded in
/// after `bytes`, the way the heartbeat frame's CRC is constructed (the
/// seed rides in the byte slot the real checksum later occupies).
pub fn checksum_seeded(bytes: &[u8], extra: u8) -> u16 {
    let mut digest = CRC16.digest();
    digest.update(bytes);
    digest.update(&[extra]);
    digest.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_is_deterministic() {
        let a = checksum(b"hello");
        let b = checksum(b"hello");
        assert_eq!(a, b);
    }

    #[test]
    fn checksum_detects_single_byte_change() {
        assert_ne!(checksum(b"hello"), checksum(b"hellp"));
    }

    #[test]
    fn seeded_checksum_differs_by_seed() {
        assert_ne!(checksum_seeded(b"hello", 0x66), checksum_seeded(b"hello", 0x00));
    }
}
