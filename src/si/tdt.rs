//! Time and Date Table decoding (spec.md §4.7, §8 scenario 4): a
//! short-form table (`section_syntax_indicator = 0`), no extended header,
//! no CRC.

use chrono::{DateTime, Utc};

use crate::time::{decode_utc, TimeError};

/// A decoded TDT observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tdt {
    /// UTC timestamp, if the MJD/BCD fields decoded to a valid calendar
    /// date and time.
    pub utc: Option<DateTime<Utc>>,
}

/// Errors decoding a TDT section (spec.md §7, §8's malformed-BCD case).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TdtError {
    /// Fewer than 3 bytes: can't read the generic header.
    #[error("TDT section shorter than the 3-byte generic header")]
    TooShort,
    /// `table_id` wasn't 0x70.
    #[error("not a TDT section (table_id {0:#04x})")]
    WrongTableId(u8),
    /// Body didn't carry the full 5-byte MJD+BCD field.
    #[error("TDT body shorter than the 5-byte MJD+BCD field")]
    BodyTooShort,
    /// A BCD digit outside 0..=9 (spec.md §8: "decoder reports
    /// `MalformedBCD` and retains the previous TDT").
    #[error(transparent)]
    MalformedBcd(#[from] TimeError),
}

/// Decodes a TDT section (spec.md §4.7): body is `MJD(16) + BCD(24)` only,
/// taken from the 3-byte generic header onward (no `table_id_extension`,
/// no CRC).
pub fn parse(data: &[u8]) -> Result<Tdt, TdtError> {
    if data.len() < 3 {
        return Err(TdtError::TooShort);
    }
    let table_id = data[0];
    if table_id != crate::constants::TABLE_ID_TDT {
        return Err(TdtError::WrongTableId(table_id));
    }
    let section_length = (((data[1] & 0x0F) as usize) << 8) | data[2] as usize;
    let body = &data[3..(3 + section_length).min(data.len())];
    if body.len() < 5 {
        return Err(TdtError::BodyTooShort);
    }

    let mjd = u16::from_be_bytes([body[0], body[1]]);
    let bcd = [body[2], body[3], body[4]];
    let utc = decode_utc(mjd, bcd)?;
    Ok(Tdt { utc })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tdt_bytes(mjd: u16, bcd: [u8; 3]) -> Vec<u8> {
        let mut body = mjd.to_be_bytes().to_vec();
        body.extend_from_slice(&bcd);
        let section_length = body.len();
        let mut s = vec![0x70, (section_length >> 8) as u8 & 0x0F, section_length as u8];
        s.extend_from_slice(&body);
        s
    }

    #[test]
    fn decodes_2020_01_01() {
        // MJD 58849 = 2020-01-01.
        let data = tdt_bytes(58849, [0x12, 0x34, 0x56]);
        let tdt = parse(&data).unwrap();
        let utc = tdt.utc.unwrap();
        assert_eq!(utc.to_rfc3339(), "2020-01-01T12:34:56+00:00");
    }

    #[test]
    fn wrong_table_id_is_rejected() {
        let mut data = tdt_bytes(58849, [0x12, 0x34, 0x56]);
        data[0] = 0x73;
        assert_eq!(parse(&data), Err(TdtError::WrongTableId(0x73)));
    }

    #[test]
    fn malformed_bcd_is_reported() {
        let data = tdt_bytes(58849, [0xFA, 0x00, 0x00]);
        match parse(&data) {
            Err(TdtError::MalformedBcd(_)) => {}
            other => panic!("expected MalformedBcd, got {other:?}"),
        }
    }
}
