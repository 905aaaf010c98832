//! MPEG-2 CRC-32 (spec.md §4.5): polynomial 0x04C11DB7, init 0xFFFFFFFF,
//! non-reflected, no final XOR.
//!
//! Grounded on the teacher's `psi/section.rs`, which reaches for the `crc`
//! crate's `CRC_32_MPEG_2` constant rather than hand-rolling a table, same
//! as the Python original's `tstools.crc32`.

use crc::{Crc, CRC_32_MPEG_2};

static MPEG2_CRC: Crc<u32> = Crc::<u32>::new(&CRC_32_MPEG_2);

/// Computes the MPEG-2 CRC-32 over `data`.
pub fn checksum(data: &[u8]) -> u32 {
    MPEG2_CRC.checksum(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_of_empty_is_initial_value() {
        // With init = 0xFFFFFFFF, no-reflect, no final XOR, and no input
        // bytes processed, the MPEG-2 CRC of an empty slice is the initial
        // register value.
        assert_eq!(checksum(&[]), 0xFFFF_FFFF);
    }

    #[test]
    fn checksum_is_deterministic() {
        let data = [0x00, 0xB0, 0x0D, 0x00, 0x01, 0xC1, 0x00, 0x00];
        assert_eq!(checksum(&data), checksum(&data));
    }

    #[test]
    fn checksum_detects_single_bit_flip() {
        let mut data = [0x00, 0xB0, 0x0D, 0x00, 0x01, 0xC1, 0x00, 0x00];
        let original = checksum(&data);
        data[3] ^= 0x01;
        assert_ne!(checksum(&data), original);
    }
}
