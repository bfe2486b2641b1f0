//! Little-endian fixed-width integer codecs.
//!
//! Manifests and wire frames never carry native-endian integers; every
//! multi-byte field on the wire is little-endian, read and written through
//! these helpers so there is exactly one place that gets it wrong if it
//! ever does.

pub fn write_u16(out: &mut [u8], v: u16) {
    out[..2].copy_from_slice(&v.to_le_bytes());
}

pub fn write_u32(out: &mut [u8], v: u32) {
    out[..4].copy_from_slice(&v.to_le_bytes());
}

pub fn write_u64(out: &mut [u8], v: u64) {
    out[..8].copy_from_slice(&v.to_le_bytes());
}

pub fn read_u16(buf: &[u8]) -> u16 {
    u16::from_le_bytes(buf[..2].try_into().unwrap())
}

pub fn read_u32(buf: &[u8]) -> u32 {
    u32::from_le_bytes(buf[..4].try_into().unwrap())
}

pub fn read_u64(buf: &[u8]) -> u64 {
    u64::from_le_bytes(buf[..8].try_into().unwrap())
}

/// Wraparound comparison for sequence-style counters that roll over (e.g.
/// the FEC frame's 6-bit sequence number once widened to a byte for
/// arithmetic). Mirrors signed-subtraction wraparound comparison.
pub fn compare_wrapped_u8(one: u8, two: u8) -> i32 {
    (one.wrapping_sub(two) as i8) as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_u16() {
        let mut buf = [0u8; 2];
        write_u16(&mut buf, 0x1234);
        assert_eq!(read_u16(&buf), 0x1234);
        assert_eq!(buf, [0x34, 0x12]);
    }

    #[test]
    fn round_trips_u32() {
        let mut buf = [0u8; 4];
        write_u32(&mut buf, 0xdead_beef);
        assert_eq!(read_u32(&buf), 0xdead_beef);
    }

    #[test]
    fn round_trips_u64() {
        let mut buf = [0u8; 8];
        write_u64(&mut buf, 0x0123_4567_89ab_cdef);
        assert_eq!(read_u64(&buf), 0x0123_4567_89ab_cdef);
    }

    #[test]
    fn wrapped_compare_detects_rollover() {
        assert!(compare_wrapped_u8(1, 0) > 0);
        assert!(compare_wrapped_u8(0, 1) < 0);
        assert!(compare_wrapped_u8(0, 255) > 0, "0 is one past 255");
        assert_eq!(compare_wrapped_u8(5, 5), 0);
    }
}
