//! Program Map Table decoding (spec.md §4.7).

use crate::descriptors::{DescriptorError, DescriptorIter};
use crate::si::section::Section;

/// One elementary stream entry in a PMT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamInfo {
    /// `stream_type`.
    pub stream_type: u8,
    /// `elementary_PID`.
    pub elementary_pid: u16,
    /// Raw `(tag, value)` descriptor pairs for this stream.
    pub descriptors: Vec<(u8, Vec<u8>)>,
}

/// A decoded PMT section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pmt {
    /// `version_number`.
    pub version: u8,
    /// `current_next_indicator`.
    pub current_next: bool,
    /// `program_number` (the PMT's `table_id_extension`).
    pub program_number: u16,
    /// `PCR_PID`.
    pub pcr_pid: u16,
    /// Program-level descriptors.
    pub program_descriptors: Vec<(u8, Vec<u8>)>,
    /// Elementary streams declared by this PMT.
    pub streams: Vec<StreamInfo>,
    /// Descriptor loops (program-level or per-stream) that overran their
    /// declared length (spec.md §4.8, §7).
    pub descriptor_errors: Vec<DescriptorError>,
}

/// Errors specific to PMT body decoding (spec.md §7 recoverable class).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PmtError {
    /// The fixed 4-byte header didn't fit in the body.
    #[error("PMT body shorter than its fixed header")]
    Truncated,
}

/// Decodes a PMT body (spec.md §4.7): `reserved:3, PCR_PID:13, reserved:4,
/// program_info_length:12`, program descriptors, then a loop of
/// `stream_type:8, reserved:3, elementary_PID:13, reserved:4,
/// ES_info_length:12, <descriptors>`.
pub fn decode(section: &Section<'_>) -> Result<Pmt, PmtError> {
    let b = section.body;
    if b.len() < 4 {
        return Err(PmtError::Truncated);
    }
    let pcr_pid = (((b[0] & 0x1F) as u16) << 8) | b[1] as u16;
    let program_info_length = (((b[2] & 0x0F) as usize) << 8) | b[3] as usize;
    let descriptors_end = 4 + program_info_length;
    if descriptors_end > b.len() {
        return Err(PmtError::Truncated);
    }

    let mut descriptor_errors = Vec::new();
    let program_descriptors = collect_descriptors(&b[4..descriptors_end], &mut descriptor_errors);

    let mut idx = descriptors_end;
    let mut streams = Vec::new();
    while idx + 5 <= b.len() {
        let stream_type = b[idx];
        let elementary_pid = (((b[idx + 1] & 0x1F) as u16) << 8) | b[idx + 2] as u16;
        let es_info_length = (((b[idx + 3] & 0x0F) as usize) << 8) | b[idx + 4] as usize;
        let es_start = idx + 5;
        let es_end = es_start + es_info_length;
        if es_end > b.len() {
            return Err(PmtError::Truncated);
        }
        streams.push(StreamInfo {
            stream_type,
            elementary_pid,
            descriptors: collect_descriptors(&b[es_start..es_end], &mut descriptor_errors),
        });
        idx = es_end;
    }

    Ok(Pmt {
        version: section.version_number,
        current_next: section.current_next_indicator,
        program_number: section.table_id_extension,
        pcr_pid,
        program_descriptors,
        streams,
        descriptor_errors,
    })
}

fn collect_descriptors(data: &[u8], errors: &mut Vec<DescriptorError>) -> Vec<(u8, Vec<u8>)> {
    DescriptorIter::new(data)
        .filter_map(|result| match result {
            Ok(d) => Some((d.tag, d.data.to_vec())),
            Err(err) => {
                errors.push(err);
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::si::section;

    fn pmt_section_bytes(pcr_pid: u16, streams: &[(u8, u16)]) -> Vec<u8> {
        let mut b = vec![0xE0 | ((pcr_pid >> 8) as u8 & 0x1F), pcr_pid as u8, 0xF0, 0x00];
        for &(stream_type, pid) in streams {
            b.push(stream_type);
            b.push(0xE0 | ((pid >> 8) as u8 & 0x1F));
            b.push(pid as u8);
            b.push(0xF0);
            b.push(0x00);
        }
        let section_length = 5 + b.len() + 4;
        let mut s = vec![
            0x02,
            0x80 | (((section_length >> 8) & 0x0F) as u8),
            section_length as u8,
            0x00,
            0x01,
            0x01,
            0x00,
            0x00,
        ];
        s.extend_from_slice(&b);
        let crc = crate::crc::checksum(&s);
        s.extend_from_slice(&crc.to_be_bytes());
        s
    }

    #[test]
    fn decodes_one_elementary_stream() {
        let data = pmt_section_bytes(0x101, &[(0x1B, 0x101)]);
        let section = section::parse(&data).unwrap();
        let pmt = decode(&section).unwrap();
        assert_eq!(pmt.program_number, 1);
        assert_eq!(pmt.pcr_pid, 0x101);
        assert_eq!(pmt.streams.len(), 1);
        assert_eq!(pmt.streams[0].stream_type, 0x1B);
        assert_eq!(pmt.streams[0].elementary_pid, 0x101);
    }

    #[test]
    fn overflowing_descriptor_is_reported_but_decode_succeeds() {
        // program_info_length=3 but the one descriptor inside declares a
        // length that runs past it.
        let section = section::Section {
            table_id: 0x02,
            section_syntax_indicator: true,
            private_indicator: false,
            table_id_extension: 1,
            version_number: 0,
            current_next_indicator: true,
            section_number: 0,
            last_section_number: 0,
            body: &[0xE1, 0x00, 0xF0, 0x03, 0x48, 0x05, 0xAA],
            crc_ok: true,
            crc_computed: 0,
            crc_declared: 0,
        };
        let pmt = decode(&section).unwrap();
        assert_eq!(pmt.descriptor_errors.len(), 1);
        assert!(matches!(
            pmt.descriptor_errors[0],
            DescriptorError::Overflow { length: 5, .. }
        ));
    }

    #[test]
    fn truncated_header_is_rejected() {
        let section = section::Section {
            table_id: 0x02,
            section_syntax_indicator: true,
            private_indicator: false,
            table_id_extension: 1,
            version_number: 0,
            current_next_indicator: true,
            section_number: 0,
            last_section_number: 0,
            body: &[0x00, 0x01],
            crc_ok: true,
            crc_computed: 0,
            crc_declared: 0,
        };
        assert_eq!(decode(&section), Err(PmtError::Truncated));
    }
}
