//! Adaptation field decoding (spec.md §4.3): PCR/OPCR, splicing point,
//! private data, the extension, and stuffing validation.
//!
//! Grounded on the teacher's inline PCR extraction in
//! `processor/mod.rs::process_packet` and its splice-countdown legality
//! check, generalized into a standalone decoder that returns structured
//! data instead of updating TR-101 counters directly.

use crate::time::decode_pcr;

/// Errors decoding an adaptation field (spec.md §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AdaptationError {
    /// `adaptation_field_length` would run past the end of the packet.
    #[error("adaptation_field_length {0} overflows the 188-byte packet")]
    LengthOverflow(u8),
    /// A flag claimed a fixed-size sub-field (PCR, OPCR, splice point) but
    /// not enough bytes remained to hold it.
    #[error("adaptation field too short for a flagged sub-field")]
    Truncated,
    /// The trailing stuffing bytes weren't all `0xFF` (spec.md §3, §4.3).
    #[error("adaptation field stuffing byte at offset {0} is not 0xFF")]
    StuffingCorrupt(usize),
}

/// The `adaptation_field_extension` (spec.md §4.3, present only when
/// `adaptation_field_extension_flag` is set).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AdaptationExtension {
    /// `ltw_flag`: legal time window fields present.
    pub ltw_flag: bool,
    /// `piecewise_rate_flag`: piecewise rate field present.
    pub piecewise_rate_flag: bool,
    /// `seamless_splice_flag`: `DTS_next_AU`/`splice_type` fields present.
    pub seamless_splice_flag: bool,
    /// `ltw_valid_flag` and `ltw_offset`, when `ltw_flag` is set.
    pub ltw_offset: Option<u16>,
    /// 22-bit piecewise rate, when `piecewise_rate_flag` is set.
    pub piecewise_rate: Option<u32>,
    /// `splice_type` nibble and `DTS_next_AU` (90 kHz), when
    /// `seamless_splice_flag` is set.
    pub splice_type_and_dts: Option<(u8, u64)>,
}

/// A fully decoded adaptation field.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AdaptationField {
    /// `discontinuity_indicator`.
    pub discontinuity_indicator: bool,
    /// `random_access_indicator`: the next PES/section starts here.
    pub random_access_indicator: bool,
    /// `elementary_stream_priority_indicator`.
    pub es_priority_indicator: bool,
    /// Decoded PCR (27 MHz ticks), when `PCR_flag` is set.
    pub pcr: Option<u64>,
    /// Decoded OPCR (27 MHz ticks), when `OPCR_flag` is set.
    pub opcr: Option<u64>,
    /// `splice_countdown`, when `splicing_point_flag` is set.
    pub splice_countdown: Option<i8>,
    /// Raw `transport_private_data`, when `transport_private_data_flag` is
    /// set.
    pub private_data: Vec<u8>,
    /// Decoded extension, when `adaptation_field_extension_flag` is set.
    pub extension: Option<AdaptationExtension>,
    /// Number of stuffing (`0xFF`) bytes padding the field out to its
    /// declared length.
    pub stuffing_bytes: usize,
}

/// Decodes the adaptation field starting at `packet[4]`
/// (`adaptation_field_length` byte) given it is known to be present.
///
/// `packet` is the full 188-byte packet; only bytes `4..4+1+length` are
/// read.
pub fn parse(packet: &[u8; 188]) -> Result<AdaptationField, AdaptationError> {
    let length = packet[4] as usize;
    if 5 + length > packet.len() {
        return Err(AdaptationError::LengthOverflow(packet[4]));
    }
    if length == 0 {
        return Ok(AdaptationField::default());
    }

    let flags = packet[5];
    let discontinuity_indicator = flags & 0x80 != 0;
    let random_access_indicator = flags & 0x40 != 0;
    let es_priority_indicator = flags & 0x20 != 0;
    let pcr_flag = flags & 0x10 != 0;
    let opcr_flag = flags & 0x08 != 0;
    let splicing_point_flag = flags & 0x04 != 0;
    let private_data_flag = flags & 0x02 != 0;
    let extension_flag = flags & 0x01 != 0;

    let mut cursor = 6usize;
    let field_end = 5 + length;

    let mut take = |n: usize, cursor: &mut usize| -> Result<&[u8], AdaptationError> {
        if *cursor + n > field_end {
            return Err(AdaptationError::Truncated);
        }
        let slice = &packet[*cursor..*cursor + n];
        *cursor += n;
        Ok(slice)
    };

    let pcr = if pcr_flag {
        let bytes: [u8; 6] = take(6, &mut cursor)?.try_into().unwrap();
        Some(decode_pcr(bytes))
    } else {
        None
    };

    let opcr = if opcr_flag {
        let bytes: [u8; 6] = take(6, &mut cursor)?.try_into().unwrap();
        Some(decode_pcr(bytes))
    } else {
        None
    };

    let splice_countdown = if splicing_point_flag {
        Some(take(1, &mut cursor)?[0] as i8)
    } else {
        None
    };

    let private_data = if private_data_flag {
        let len = take(1, &mut cursor)?[0] as usize;
        take(len, &mut cursor)?.to_vec()
    } else {
        Vec::new()
    };

    let extension = if extension_flag {
        Some(parse_extension(&mut take, &mut cursor)?)
    } else {
        None
    };

    let stuffing_bytes = field_end.saturating_sub(cursor);
    if let Some(offset) = packet[cursor..field_end].iter().position(|&b| b != 0xFF) {
        return Err(AdaptationError::StuffingCorrupt(cursor + offset));
    }

    Ok(AdaptationField {
        discontinuity_indicator,
        random_access_indicator,
        es_priority_indicator,
        pcr,
        opcr,
        splice_countdown,
        private_data,
        extension,
        stuffing_bytes,
    })
}

fn parse_extension<'a>(
    take: &mut impl FnMut(usize, &mut usize) -> Result<&'a [u8], AdaptationError>,
    cursor: &mut usize,
) -> Result<AdaptationExtension, AdaptationError> {
    let ext_len = take(1, cursor)?[0] as usize;
    let ext_end = *cursor + ext_len;

    let flags = take(1, cursor)?[0];
    let ltw_flag = flags & 0x80 != 0;
    let piecewise_rate_flag = flags & 0x40 != 0;
    let seamless_splice_flag = flags & 0x20 != 0;

    let mut ext = AdaptationExtension {
        ltw_flag,
        piecewise_rate_flag,
        seamless_splice_flag,
        ..Default::default()
    };

    if ltw_flag {
        let bytes = take(2, cursor)?;
        let valid = bytes[0] & 0x80 != 0;
        let offset = (((bytes[0] & 0x7F) as u16) << 8) | bytes[1] as u16;
        ext.ltw_offset = valid.then_some(offset);
    }
    if piecewise_rate_flag {
        let bytes = take(3, cursor)?;
        let rate =
            (((bytes[0] & 0x3F) as u32) << 16) | ((bytes[1] as u32) << 8) | bytes[2] as u32;
        ext.piecewise_rate = Some(rate);
    }
    if seamless_splice_flag {
        let bytes = take(5, cursor)?;
        let splice_type = (bytes[0] & 0xF0) >> 4;
        let dts = crate::time::decode_pts_dts(bytes.try_into().unwrap());
        ext.splice_type_and_dts = Some((splice_type, dts));
    }

    // Reserved bytes within the extension that weren't consumed by any flag.
    if *cursor < ext_end {
        *cursor = ext_end;
    }

    Ok(ext)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet_with_adaptation(body: &[u8]) -> [u8; 188] {
        let mut p = [0xFFu8; 188];
        p[0] = 0x47;
        p[4] = body.len() as u8;
        p[5..5 + body.len()].copy_from_slice(body);
        p
    }

    #[test]
    fn zero_length_is_empty() {
        let packet = packet_with_adaptation(&[]);
        let af = parse(&packet).unwrap();
        assert_eq!(af, AdaptationField::default());
    }

    #[test]
    fn discontinuity_and_random_access_flags() {
        let packet = packet_with_adaptation(&[0xC0]);
        let af = parse(&packet).unwrap();
        assert!(af.discontinuity_indicator);
        assert!(af.random_access_indicator);
    }

    #[test]
    fn decodes_pcr() {
        let mut body = vec![0x10]; // PCR_flag only
        body.extend([0x00, 0x00, 0x00, 0x00, 0x80, 0x00]); // base=1, ext=0
        let packet = packet_with_adaptation(&body);
        let af = parse(&packet).unwrap();
        assert_eq!(af.pcr, Some(300));
    }

    #[test]
    fn decodes_splice_countdown_as_signed() {
        let body = vec![0x04, 0xFFu8]; // splicing_point_flag, countdown = -1
        let packet = packet_with_adaptation(&body);
        let af = parse(&packet).unwrap();
        assert_eq!(af.splice_countdown, Some(-1));
    }

    #[test]
    fn stuffing_bytes_counted_after_private_data() {
        let mut body = vec![0x02, 0x02, 0xAA, 0xBB]; // private_data_flag, len 2
        body.extend([0xFF, 0xFF, 0xFF]);
        let packet = packet_with_adaptation(&body);
        let af = parse(&packet).unwrap();
        assert_eq!(af.private_data, vec![0xAA, 0xBB]);
        assert_eq!(af.stuffing_bytes, 3);
    }

    #[test]
    fn corrupt_stuffing_is_rejected() {
        let mut body = vec![0x02, 0x02, 0xAA, 0xBB]; // private_data_flag, len 2
        body.extend([0xFF, 0x00, 0xFF]); // one stuffing byte isn't 0xFF
        let packet = packet_with_adaptation(&body);
        assert_eq!(parse(&packet), Err(AdaptationError::StuffingCorrupt(10)));
    }

    #[test]
    fn length_overflow_is_rejected() {
        let mut packet = [0xFFu8; 188];
        packet[0] = 0x47;
        packet[4] = 250; // can't fit in the remaining packet
        assert_eq!(parse(&packet), Err(AdaptationError::LengthOverflow(250)));
    }

    #[test]
    fn truncated_pcr_flag_is_rejected() {
        let packet = packet_with_adaptation(&[0x10, 0x00, 0x00]); // PCR flag, only 2 of 6 bytes
        assert_eq!(parse(&packet), Err(AdaptationError::Truncated));
    }
}
