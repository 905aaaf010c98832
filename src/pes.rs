//! PES header parsing through PTS/DTS/ESCR (spec.md §4.7, §9 "PES path
//! partially unfinished in source"). Elementary-stream reassembly beyond
//! the optional header is out of scope.

use crate::time::decode_pts_dts;

/// Stream IDs that carry the optional PES header (spec.md §4.7).
fn has_optional_header(stream_id: u8) -> bool {
    stream_id == 0xBD || (0xC0..=0xEF).contains(&stream_id)
}

/// Decoded PTS/DTS/ESCR fields from a PES optional header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PesTimestamps {
    /// Presentation Time Stamp, 90 kHz ticks.
    pub pts: Option<u64>,
    /// Decoding Time Stamp, 90 kHz ticks.
    pub dts: Option<u64>,
    /// Elementary Stream Clock Reference, 27 MHz ticks (base * 300 +
    /// extension, same encoding as PCR).
    pub escr: Option<u64>,
}

/// A minimally parsed PES packet: enough to identify the stream and, when
/// the optional header is present, its timestamps.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PesHeader {
    /// `stream_id` byte.
    pub stream_id: u8,
    /// `PES_packet_length` (0 means unbounded, legal for video streams).
    pub pes_packet_length: u16,
    /// Timestamps decoded from the optional header, when present.
    pub timestamps: PesTimestampsOpt,
}

type PesTimestampsOpt = PesTimestamps;

/// Errors parsing a PES header (spec.md §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PesError {
    /// Fewer than 6 bytes: not even `start_code + stream_id + length`.
    #[error("PES payload shorter than the fixed 6-byte header")]
    Truncated,
    /// Missing the `00 00 01` start code.
    #[error("missing PES start code prefix")]
    NoStartCode,
    /// The optional header claimed a PTS/DTS/ESCR flag but not enough
    /// bytes remained to hold it.
    #[error("PES optional header truncated")]
    OptionalHeaderTruncated,
}

/// Parses a PES packet's header from `payload` (the reassembled bytes
/// starting at the `00 00 01` start code).
pub fn parse(payload: &[u8]) -> Result<PesHeader, PesError> {
    if payload.len() < 6 {
        return Err(PesError::Truncated);
    }
    if payload[0..3] != [0x00, 0x00, 0x01] {
        return Err(PesError::NoStartCode);
    }
    let stream_id = payload[3];
    let pes_packet_length = u16::from_be_bytes([payload[4], payload[5]]);

    let mut header = PesHeader {
        stream_id,
        pes_packet_length,
        timestamps: PesTimestamps::default(),
    };

    if !has_optional_header(stream_id) || payload.len() < 9 {
        return Ok(header);
    }

    let flags = payload[7];
    let pts_dts_flags = (flags & 0xC0) >> 6;
    let escr_flag = flags & 0x20 != 0;
    let header_data_length = payload[8] as usize;
    let optional_start = 9;
    let optional_end = optional_start + header_data_length;
    if optional_end > payload.len() {
        return Err(PesError::OptionalHeaderTruncated);
    }

    let mut cursor = optional_start;
    if pts_dts_flags & 0b10 != 0 {
        if cursor + 5 > optional_end {
            return Err(PesError::OptionalHeaderTruncated);
        }
        let bytes: [u8; 5] = payload[cursor..cursor + 5].try_into().unwrap();
        header.timestamps.pts = Some(decode_pts_dts(bytes));
        cursor += 5;
        if pts_dts_flags == 0b11 {
            if cursor + 5 > optional_end {
                return Err(PesError::OptionalHeaderTruncated);
            }
            let bytes: [u8; 5] = payload[cursor..cursor + 5].try_into().unwrap();
            header.timestamps.dts = Some(decode_pts_dts(bytes));
            cursor += 5;
        }
    }

    if escr_flag {
        if cursor + 6 > optional_end {
            return Err(PesError::OptionalHeaderTruncated);
        }
        let bytes = &payload[cursor..cursor + 6];
        // ESCR packs the same base*300+extension shape as PCR, but with its
        // own marker-bit interleaving (ISO/IEC 13818-1 Table 2-21); reuse
        // the PTS/DTS-style 33-bit extraction for the base and the last two
        // bits of each half for the 9-bit extension.
        let base = ((bytes[0] as u64 & 0x38) << 30)
            | ((bytes[0] as u64 & 0x03) << 28)
            | ((bytes[1] as u64) << 20)
            | ((bytes[2] as u64 & 0xF8) << 15)
            | ((bytes[2] as u64 & 0x03) << 13)
            | ((bytes[3] as u64) << 5)
            | ((bytes[4] as u64 & 0xF8) >> 3);
        let extension = ((bytes[4] as u64 & 0x03) << 7) | (bytes[5] as u64 >> 1);
        header.timestamps.escr = Some(base * 300 + extension);
    }

    Ok(header)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_short_payload() {
        assert_eq!(parse(&[0x00, 0x00, 0x01, 0xE0]), Err(PesError::Truncated));
    }

    #[test]
    fn rejects_missing_start_code() {
        let payload = [0x00, 0x00, 0x00, 0xE0, 0x00, 0x00];
        assert_eq!(parse(&payload), Err(PesError::NoStartCode));
    }

    #[test]
    fn video_stream_without_header_data_is_ok() {
        let payload = [0x00, 0x00, 0x01, 0xE0, 0x00, 0x00];
        let header = parse(&payload).unwrap();
        assert_eq!(header.stream_id, 0xE0);
        assert_eq!(header.timestamps.pts, None);
    }

    #[test]
    fn non_av_stream_id_skips_optional_header() {
        // 0xBC (program_stream_map) has no optional header per spec.md.
        let mut payload = vec![0x00, 0x00, 0x01, 0xBC, 0x00, 0x05];
        payload.extend([0x80, 0x80, 0x05, 0x21, 0x00, 0x01, 0x00, 0x01]);
        let header = parse(&payload).unwrap();
        assert_eq!(header.timestamps.pts, None);
    }

    #[test]
    fn decodes_pts_only() {
        let mut payload = vec![0x00, 0x00, 0x01, 0xE0, 0x00, 0x0A];
        payload.push(0x80); // marker bits
        payload.push(0x80); // PTS_DTS_flags = 10
        payload.push(0x05); // header_data_length
        payload.extend([0x21, 0x00, 0x01, 0x00, 0x01]); // PTS = 0
        let header = parse(&payload).unwrap();
        assert_eq!(header.timestamps.pts, Some(0));
        assert_eq!(header.timestamps.dts, None);
    }

    #[test]
    fn decodes_pts_and_dts() {
        let mut payload = vec![0x00, 0x00, 0x01, 0xE0, 0x00, 0x0F];
        payload.push(0x80);
        payload.push(0xC0); // PTS_DTS_flags = 11
        payload.push(0x0A);
        payload.extend([0x31, 0x00, 0x01, 0x00, 0x01]); // PTS
        payload.extend([0x11, 0x00, 0x01, 0x00, 0x01]); // DTS
        let header = parse(&payload).unwrap();
        assert_eq!(header.timestamps.pts, Some(0));
        assert_eq!(header.timestamps.dts, Some(0));
    }

    #[test]
    fn truncated_optional_header_is_rejected() {
        let mut payload = vec![0x00, 0x00, 0x01, 0xE0, 0x00, 0x0A];
        payload.push(0x80);
        payload.push(0x80);
        payload.push(0x05);
        payload.extend([0x21, 0x00]); // too short for a PTS
        assert_eq!(parse(&payload), Err(PesError::OptionalHeaderTruncated));
    }
}
