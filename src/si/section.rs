//! Generic PSI/SI section header (spec.md §3 `PSISection`, §4.6 CRC
//! Validator): shared by PAT/PMT/SDT/EIT, with TDT branching off into its
//! own short-form reader.
//!
//! Grounded on the teacher's `psi/section.rs`, generalized to (a) take an
//! already-reassembled section buffer (no `pointer_field` handling — that
//! now lives in [`crate::reassembly`]) and (b) report a CRC mismatch as a
//! value instead of an `anyhow::bail!`, so callers can still decode the
//! body and emit a `CRCFailure` diagnostic per spec.md §7.

use crate::crc;

/// Errors that make a section impossible to decode at all (too short to
/// even contain its declared length, spec.md §7's "short section at EOF").
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SectionError {
    /// Fewer than 3 bytes: can't even read `table_id`/`section_length`.
    #[error("section shorter than the 3-byte generic header")]
    TooShort,
    /// The buffer held fewer bytes than `section_length + 3` declared.
    #[error("section truncated: declared {declared} bytes, have {have}")]
    Truncated {
        /// `section_length + 3`.
        declared: usize,
        /// Bytes actually present.
        have: usize,
    },
}

/// A decoded generic long-form section (`section_syntax_indicator = 1`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section<'a> {
    /// `table_id`.
    pub table_id: u8,
    /// `section_syntax_indicator`.
    pub section_syntax_indicator: bool,
    /// `private_indicator`.
    pub private_indicator: bool,
    /// `table_id_extension` (program_number / transport_stream_id, per
    /// table). Only meaningful when `section_syntax_indicator` is set.
    pub table_id_extension: u16,
    /// `version_number`.
    pub version_number: u8,
    /// `current_next_indicator`.
    pub current_next_indicator: bool,
    /// `section_number`.
    pub section_number: u8,
    /// `last_section_number`.
    pub last_section_number: u8,
    /// The bytes between the extended header and the trailing CRC.
    pub body: &'a [u8],
    /// `true` if the trailing CRC-32 matched; absent for short-form
    /// sections (handled separately, see [`crate::si::tdt`]).
    pub crc_ok: bool,
    /// The CRC-32 actually computed over the section.
    pub crc_computed: u32,
    /// The CRC-32 read from the section's trailing 4 bytes.
    pub crc_declared: u32,
}

/// Parses the 3-byte generic header shared by every section, long or
/// short form, and validates that `section_length` fits in `data`.
/// Returns `(table_id, section_syntax_indicator, private_indicator,
/// section_length, total_length)`.
fn generic_header(data: &[u8]) -> Result<(u8, bool, bool, usize, usize), SectionError> {
    if data.len() < 3 {
        return Err(SectionError::TooShort);
    }
    let table_id = data[0];
    let section_syntax_indicator = data[1] & 0x80 != 0;
    let private_indicator = data[1] & 0x40 != 0;
    let section_length = (((data[1] & 0x0F) as usize) << 8) | data[2] as usize;
    let total_length = 3 + section_length;
    if data.len() < total_length {
        return Err(SectionError::Truncated {
            declared: total_length,
            have: data.len(),
        });
    }
    Ok((
        table_id,
        section_syntax_indicator,
        private_indicator,
        section_length,
        total_length,
    ))
}

/// Parses a long-form section (`section_syntax_indicator = 1`) from a
/// complete, reassembled section buffer (spec.md §3/§4.6).
///
/// Callers that need a short-form table (TDT, `section_syntax_indicator =
/// 0`) should use [`crate::si::tdt::parse`] instead — this function
/// assumes the extended header and trailing CRC are present.
pub fn parse(data: &[u8]) -> Result<Section<'_>, SectionError> {
    let (table_id, section_syntax_indicator, private_indicator, section_length, total_length) =
        generic_header(data)?;

    if total_length < 3 + 5 + 4 {
        return Err(SectionError::Truncated {
            declared: total_length,
            have: data.len(),
        });
    }

    let crc_declared = u32::from_be_bytes(data[total_length - 4..total_length].try_into().unwrap());
    let crc_computed = crc::checksum(&data[..total_length - 4]);

    Ok(Section {
        table_id,
        section_syntax_indicator,
        private_indicator,
        table_id_extension: u16::from_be_bytes([data[3], data[4]]),
        version_number: (data[5] & 0x3E) >> 1,
        current_next_indicator: data[5] & 0x01 != 0,
        section_number: data[6],
        last_section_number: data[7],
        body: &data[8..total_length - 4],
        crc_ok: crc_declared == crc_computed,
        crc_computed,
        crc_declared,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_section(table_id: u8, table_id_extension: u16, body: &[u8]) -> Vec<u8> {
        let section_length = 5 + body.len() + 4;
        let mut s = vec![
            table_id,
            0x80 | (((section_length >> 8) & 0x0F) as u8),
            section_length as u8,
        ];
        s.extend_from_slice(&table_id_extension.to_be_bytes());
        s.push(0x01); // version 0, current_next=1
        s.push(0x00); // section_number
        s.push(0x00); // last_section_number
        s.extend_from_slice(body);
        let crc = crc::checksum(&s);
        s.extend_from_slice(&crc.to_be_bytes());
        s
    }

    #[test]
    fn parses_valid_section_with_matching_crc() {
        let data = build_section(0x00, 1, &[0xAA, 0xBB]);
        let section = parse(&data).unwrap();
        assert_eq!(section.table_id, 0x00);
        assert_eq!(section.table_id_extension, 1);
        assert!(section.current_next_indicator);
        assert!(section.crc_ok);
        assert_eq!(section.body, &[0xAA, 0xBB]);
    }

    #[test]
    fn flags_a_crc_mismatch_without_failing() {
        let mut data = build_section(0x00, 1, &[0xAA, 0xBB]);
        *data.last_mut().unwrap() ^= 0xFF;
        let section = parse(&data).unwrap();
        assert!(!section.crc_ok);
    }

    #[test]
    fn too_short_is_rejected() {
        assert_eq!(parse(&[0x00, 0x00]), Err(SectionError::TooShort));
    }

    #[test]
    fn truncated_body_is_rejected() {
        let mut data = build_section(0x00, 1, &[0xAA, 0xBB]);
        data.truncate(data.len() - 1);
        match parse(&data) {
            Err(SectionError::Truncated { .. }) => {}
            other => panic!("expected Truncated, got {other:?}"),
        }
    }
}
