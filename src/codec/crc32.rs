//! CRC-32 (IEEE 802.3 / ISO-HDLC, 0xEDB88320 reflected polynomial) used by
//! both the wire frame checksum and the PXNT header/data CRCs (§4.1).

use crc::{Crc, CRC_32_ISO_HDLC};

const CASTAGNOLI: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Computes the standard IEEE 802.3 CRC-32 of `data`.
#[must_use]
pub fn crc32(data: &[u8]) -> u32 {
    CASTAGNOLI.checksum(data)
}

/// Computes a CRC-32 over multiple byte slices without concatenating them
/// first — used for the PXNT footer's `Data CRC`, which covers
/// metadata + pixels + category map + category defs + optional sections as
/// they were streamed, not as a single buffer.
#[must_use]
pub fn crc32_segments(segments: &[&[u8]]) -> u32 {
    let mut digest = CASTAGNOLI.digest();
    for segment in segments {
        digest.update(segment);
    }
    digest.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_matches_known_value() {
        assert_eq!(crc32(b""), 0);
    }

    #[test]
    fn known_vector() {
        // CRC-32/ISO-HDLC of "123456789" is the textbook check value.
        assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn segments_match_concatenation() {
        let whole = crc32(b"hello world");
        let split = crc32_segments(&[b"hello ", b"world"]);
        assert_eq!(whole, split);
    }

    #[test]
    fn single_bit_flip_changes_checksum() {
        let mut data = b"the quick brown fox".to_vec();
        let original = crc32(&data);
        data[0] ^= 0x01;
        assert_ne!(crc32(&data), original);
    }
}
