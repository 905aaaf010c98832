//! Time field decoding shared by TDT/TOT/EIT: Modified Julian Date,
//! BCD-encoded clock digits, and PCR/OPCR/PTS/DTS timestamp arithmetic
//! (spec.md §4.5, §4.7).
//!
//! The teacher carries two separate, disagreeing MJD implementations
//! (`tr101.rs` and `psi/tdt.rs` era code); the Python original also uses an
//! off-by-one constant (`MJD_TO_UNIX = 40588` compensated by a `+ 1` in the
//! same expression). This module is the single coherent replacement
//! (SPEC_FULL.md Open Question resolution, see DESIGN.md): Modified Julian
//! Date is always `days_since(1858-11-17)`, and `40587` is the MJD of the
//! Unix epoch, so no compensating `+ 1` is needed.

use chrono::{DateTime, Duration, NaiveDate, Utc};

use crate::constants::{MJD_UNIX_EPOCH, PCR_CLOCK_HZ, PTS_CLOCK_HZ};

/// Errors decoding a BCD-packed time or date field (spec.md §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TimeError {
    /// A nibble in a BCD field held a value outside 0..=9.
    #[error("malformed BCD digit {0:#x}")]
    MalformedBcd(u8),
}

/// Decodes a 16-bit Modified Julian Date into a UTC calendar date.
///
/// Returns `None` if the MJD is implausible (before the Unix epoch or far
/// enough in the future to overflow `chrono`'s range); spec.md treats this
/// as a decode failure rather than a panic.
pub fn mjd_to_date(mjd: u16) -> Option<NaiveDate> {
    let days_since_epoch = mjd as i64 - MJD_UNIX_EPOCH;
    NaiveDate::from_ymd_opt(1970, 1, 1)?.checked_add_signed(Duration::days(days_since_epoch))
}

/// Decodes one BCD digit pair (e.g. the hour byte of a UTC time field).
/// Each nibble must be 0..=9.
fn bcd_byte(byte: u8) -> Result<u8, TimeError> {
    let high = byte >> 4;
    let low = byte & 0x0F;
    if high > 9 {
        return Err(TimeError::MalformedBcd(byte));
    }
    if low > 9 {
        return Err(TimeError::MalformedBcd(byte));
    }
    Ok(high * 10 + low)
}

/// A BCD-encoded hour:minute:second triple (EN 300 468 `UTC_time`/`duration`
/// fields).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BcdTime {
    /// Hours (0..=99 nominally, always 0..=23 for `UTC_time`).
    pub hours: u8,
    /// Minutes, 0..=59.
    pub minutes: u8,
    /// Seconds, 0..=59.
    pub seconds: u8,
}

impl BcdTime {
    /// Decodes a 3-byte BCD hour/minute/second field.
    pub fn parse(bytes: [u8; 3]) -> Result<Self, TimeError> {
        Ok(Self {
            hours: bcd_byte(bytes[0])?,
            minutes: bcd_byte(bytes[1])?,
            seconds: bcd_byte(bytes[2])?,
        })
    }

    /// Total seconds represented by this field, useful for `duration`.
    pub fn as_seconds(&self) -> u32 {
        self.hours as u32 * 3600 + self.minutes as u32 * 60 + self.seconds as u32
    }
}

/// Combines a 2-byte MJD and a 3-byte BCD time into a full UTC timestamp,
/// as used by `UTC_time` fields in TDT/TOT/EIT (spec.md §4.5/§4.8).
pub fn decode_utc(mjd: u16, bcd: [u8; 3]) -> Result<Option<DateTime<Utc>>, TimeError> {
    let time = BcdTime::parse(bcd)?;
    Ok(mjd_to_date(mjd).and_then(|date| {
        date.and_hms_opt(
            time.hours.min(23) as u32,
            time.minutes.min(59) as u32,
            time.seconds.min(59) as u32,
        )
        .map(|naive| naive.and_utc())
    }))
}

/// Decodes a 33-bit PCR/OPCR base from its packed 6-byte field, per
/// spec.md §4.3: `base` runs at 90 kHz, `extension` at 27 MHz, and the
/// combined value in 27 MHz ticks is `base * 300 + extension`.
pub fn decode_pcr(bytes: [u8; 6]) -> u64 {
    let base = ((bytes[0] as u64) << 25)
        | ((bytes[1] as u64) << 17)
        | ((bytes[2] as u64) << 9)
        | ((bytes[3] as u64) << 1)
        | ((bytes[4] as u64) >> 7);
    let extension = (((bytes[4] & 0x01) as u64) << 8) | bytes[5] as u64;
    base * 300 + extension
}

/// Converts a combined 27 MHz PCR value into seconds, for diagnostics.
pub fn pcr_to_seconds(pcr_ticks: u64) -> f64 {
    pcr_ticks as f64 / PCR_CLOCK_HZ
}

/// Decodes a 5-byte PTS/DTS field (spec.md §4.7): 3-bit marker prefix,
/// 33-bit timestamp at 90 kHz, ignoring the two synchronization marker
/// bits interleaved per ISO/IEC 13818-1 Table 2-21.
pub fn decode_pts_dts(bytes: [u8; 5]) -> u64 {
    (((bytes[0] & 0x0E) as u64) << 29)
        | ((bytes[1] as u64) << 22)
        | (((bytes[2] & 0xFE) as u64) << 14)
        | ((bytes[3] as u64) << 7)
        | ((bytes[4] & 0xFE) as u64 >> 1)
}

/// Converts a 90 kHz PTS/DTS value into seconds, for diagnostics.
pub fn pts_to_seconds(pts_ticks: u64) -> f64 {
    pts_ticks as f64 / PTS_CLOCK_HZ as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mjd_of_unix_epoch_is_1970_01_01() {
        let date = mjd_to_date(40587).unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(1970, 1, 1).unwrap());
    }

    #[test]
    fn mjd_one_day_later() {
        let date = mjd_to_date(40588).unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(1970, 1, 2).unwrap());
    }

    #[test]
    fn bcd_time_decodes_digits() {
        let t = BcdTime::parse([0x12, 0x34, 0x56]).unwrap();
        assert_eq!(t, BcdTime { hours: 12, minutes: 34, seconds: 56 });
        assert_eq!(t.as_seconds(), 12 * 3600 + 34 * 60 + 56);
    }

    #[test]
    fn bcd_time_rejects_non_decimal_nibble() {
        let err = BcdTime::parse([0xFA, 0x00, 0x00]).unwrap_err();
        assert_eq!(err, TimeError::MalformedBcd(0xFA));
    }

    #[test]
    fn decode_utc_combines_mjd_and_bcd() {
        let ts = decode_utc(40587, [0x00, 0x00, 0x00]).unwrap().unwrap();
        assert_eq!(ts.to_rfc3339(), "1970-01-01T00:00:00+00:00");
    }

    #[test]
    fn pcr_round_trips_base_and_extension() {
        // base = 1 (its LSB is the top bit of byte 4), extension = 0:
        // combined ticks = base * 300 + extension = 300.
        let bytes = [0x00, 0x00, 0x00, 0x00, 0x80, 0x00];
        assert_eq!(decode_pcr(bytes), 300);
    }

    #[test]
    fn pcr_extension_adds_to_base() {
        // base = 0, extension = 5.
        let bytes = [0x00, 0x00, 0x00, 0x00, 0x00, 0x05];
        assert_eq!(decode_pcr(bytes), 5);
    }

    #[test]
    fn pts_decodes_zero() {
        assert_eq!(decode_pts_dts([0x21, 0x00, 0x01, 0x00, 0x01]), 0);
    }
}
