//! Event Information Table decoding (spec.md §4.7): present/following and
//! schedule sections for the actual or another transport stream, and the
//! short/extended event and component descriptors.

use chrono::{DateTime, Utc};

use crate::constants::{
    DESCRIPTOR_TAG_COMPONENT, DESCRIPTOR_TAG_EXTENDED_EVENT, DESCRIPTOR_TAG_SHORT_EVENT,
};
use crate::descriptors::{DescriptorError, DescriptorIter};
use crate::si::section::Section;
use crate::time::{decode_utc, BcdTime};

/// Decoded short event descriptor (tag 0x4D).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortEvent {
    /// ISO 639 3-character language code.
    pub language: String,
    /// Event name.
    pub name: String,
    /// Short event text.
    pub text: String,
}

/// Decoded extended event descriptor (tag 0x4E), possibly spread across
/// several descriptors in sequence (`descriptor_number`/`last_descriptor_number`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtendedEvent {
    /// `descriptor_number` (low nibble of the first byte).
    pub part_number: u8,
    /// `last_descriptor_number` (high nibble of the first byte).
    pub last_part_number: u8,
    /// ISO 639 3-character language code.
    pub language: String,
    /// Raw `(description, item)` pairs from the items loop.
    pub items: Vec<(String, String)>,
    /// Extended text for this part.
    pub text: String,
}

/// Decoded component descriptor (tag 0x50).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Component {
    /// `stream_content` (4 bits).
    pub stream_content: u8,
    /// `component_type`.
    pub component_type: u8,
    /// `component_tag`.
    pub component_tag: u8,
}

/// One decoded EIT event entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// `event_id`.
    pub event_id: u16,
    /// Decoded `start_time` (MJD + BCD), if the fields were valid.
    pub start: Option<DateTime<Utc>>,
    /// `duration` as an hour/minute/second triple.
    pub duration: BcdTime,
    /// `running_status`.
    pub running_status: u8,
    /// `free_CA_mode`.
    pub free_ca_mode: bool,
    /// Short event descriptors attached to this event.
    pub short_events: Vec<ShortEvent>,
    /// Extended event descriptor parts attached to this event.
    pub extended_events: Vec<ExtendedEvent>,
    /// Component descriptors attached to this event.
    pub components: Vec<Component>,
}

/// A decoded EIT section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Eit {
    /// `version_number`.
    pub version: u8,
    /// `current_next_indicator`.
    pub current_next: bool,
    /// `service_id` (the EIT's `table_id_extension`).
    pub service_id: u16,
    /// `transport_stream_id`.
    pub transport_stream_id: u16,
    /// `original_network_id`.
    pub original_network_id: u16,
    /// Events carried by this section.
    pub events: Vec<Event>,
    /// Descriptor loops that overran their declared length (spec.md §4.8,
    /// §7).
    pub descriptor_errors: Vec<DescriptorError>,
}

/// Errors decoding an EIT body (spec.md §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum EitError {
    /// Body didn't carry the fixed 6-byte header.
    #[error("EIT body shorter than its fixed header")]
    Truncated,
}

/// Decodes an EIT body (spec.md §4.7): skip 6 bytes
/// (`transport_stream_id:16, original_network_id:16,
/// segment_last_section_number:8, last_table_id:8`), then loop per event.
/// BCD decode failures on an individual event's start/duration are
/// tolerated (the event is kept with `start = None` / a best-effort
/// duration) rather than discarding the whole section, since one
/// malformed event shouldn't hide the rest of the schedule.
pub fn decode(section: &Section<'_>) -> Result<Eit, EitError> {
    let b = section.body;
    if b.len() < 6 {
        return Err(EitError::Truncated);
    }
    let transport_stream_id = u16::from_be_bytes([b[0], b[1]]);
    let original_network_id = u16::from_be_bytes([b[2], b[3]]);

    let mut events = Vec::new();
    let mut descriptor_errors = Vec::new();
    let mut idx = 6usize;
    while idx + 12 <= b.len() {
        let event_id = u16::from_be_bytes([b[idx], b[idx + 1]]);
        let mjd = u16::from_be_bytes([b[idx + 2], b[idx + 3]]);
        let start_bcd = [b[idx + 4], b[idx + 5], b[idx + 6]];
        let duration_bcd = [b[idx + 7], b[idx + 8], b[idx + 9]];
        let running_status = (b[idx + 10] & 0xE0) >> 5;
        let free_ca_mode = b[idx + 10] & 0x10 != 0;
        let desc_len = (((b[idx + 10] & 0x0F) as usize) << 8) | b[idx + 11] as usize;
        let desc_start = idx + 12;
        let desc_end = desc_start + desc_len;
        if desc_end > b.len() {
            break;
        }

        let start = decode_utc(mjd, start_bcd).ok().flatten();
        let duration = BcdTime::parse(duration_bcd).unwrap_or(BcdTime { hours: 0, minutes: 0, seconds: 0 });

        let mut short_events = Vec::new();
        let mut extended_events = Vec::new();
        let mut components = Vec::new();
        for result in DescriptorIter::new(&b[desc_start..desc_end]) {
            let descriptor = match result {
                Ok(descriptor) => descriptor,
                Err(err) => {
                    descriptor_errors.push(err);
                    continue;
                }
            };
            match descriptor.tag {
                DESCRIPTOR_TAG_SHORT_EVENT if descriptor.data.len() >= 4 => {
                    let language = decode_ascii(&descriptor.data[..3]);
                    let name_len = descriptor.data[3] as usize;
                    let name_start = 4;
                    let name_end = name_start + name_len;
                    if name_end > descriptor.data.len() {
                        continue;
                    }
                    let name = decode_ascii(&descriptor.data[name_start..name_end]);
                    let text_len_idx = name_end;
                    let text_len = descriptor.data.get(text_len_idx).copied().unwrap_or(0) as usize;
                    let text_start = text_len_idx + 1;
                    let text_end = text_start + text_len;
                    let text = if text_end <= descriptor.data.len() {
                        decode_ascii(&descriptor.data[text_start..text_end])
                    } else {
                        String::new()
                    };
                    short_events.push(ShortEvent { language, name, text });
                }
                DESCRIPTOR_TAG_EXTENDED_EVENT if descriptor.data.len() >= 4 => {
                    let part_number = (descriptor.data[0] & 0xF0) >> 4;
                    let last_part_number = descriptor.data[0] & 0x0F;
                    let language = decode_ascii(&descriptor.data[1..4]);
                    let items_len = descriptor.data[4] as usize;
                    let items_start = 5;
                    let items_end = items_start + items_len;
                    let mut items = Vec::new();
                    if items_end <= descriptor.data.len() {
                        let mut i = items_start;
                        while i < items_end {
                            let desc_len = descriptor.data[i] as usize;
                            let desc_str_start = i + 1;
                            let desc_str_end = desc_str_start + desc_len;
                            if desc_str_end > items_end {
                                break;
                            }
                            let item_len = descriptor.data[desc_str_end] as usize;
                            let item_start = desc_str_end + 1;
                            let item_end = item_start + item_len;
                            if item_end > items_end {
                                break;
                            }
                            items.push((
                                decode_ascii(&descriptor.data[desc_str_start..desc_str_end]),
                                decode_ascii(&descriptor.data[item_start..item_end]),
                            ));
                            i = item_end;
                        }
                    }
                    let text = if items_end < descriptor.data.len() {
                        let text_len = descriptor.data[items_end] as usize;
                        let text_start = items_end + 1;
                        let text_end = text_start + text_len;
                        if text_end <= descriptor.data.len() {
                            decode_ascii(&descriptor.data[text_start..text_end])
                        } else {
                            String::new()
                        }
                    } else {
                        String::new()
                    };
                    extended_events.push(ExtendedEvent {
                        part_number,
                        last_part_number,
                        language,
                        items,
                        text,
                    });
                }
                DESCRIPTOR_TAG_COMPONENT if descriptor.data.len() >= 6 => {
                    components.push(Component {
                        stream_content: descriptor.data[0] & 0x0F,
                        component_type: descriptor.data[1],
                        component_tag: descriptor.data[2],
                    });
                }
                _ => {}
            }
        }

        events.push(Event {
            event_id,
            start,
            duration,
            running_status,
            free_ca_mode,
            short_events,
            extended_events,
            components,
        });
        idx = desc_end;
    }

    Ok(Eit {
        version: section.version_number,
        current_next: section.current_next_indicator,
        service_id: section.table_id_extension,
        transport_stream_id,
        original_network_id,
        events,
        descriptor_errors,
    })
}

fn decode_ascii(bytes: &[u8]) -> String {
    String::from_utf8(bytes.to_vec()).unwrap_or_else(|_| bytes.iter().map(|&b| b as char).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::si::section;

    fn eit_section_bytes() -> Vec<u8> {
        let mut short_event = vec![b'e', b'n', b'g'];
        short_event.push(b"Title".len() as u8);
        short_event.extend_from_slice(b"Title");
        short_event.push(b"Text".len() as u8);
        short_event.extend_from_slice(b"Text");

        let mut desc = vec![0x4D, short_event.len() as u8];
        desc.extend_from_slice(&short_event);

        let mut event = vec![0x00, 0x01]; // event_id = 1
        event.extend_from_slice(&58849u16.to_be_bytes()); // MJD 2020-01-01
        event.extend_from_slice(&[0x12, 0x34, 0x56]); // start BCD
        event.extend_from_slice(&[0x01, 0x00, 0x00]); // duration BCD
        event.push(0xE0 | (((desc.len() >> 8) as u8) & 0x0F));
        event.push(desc.len() as u8);
        event.extend_from_slice(&desc);

        let mut b = vec![0x00, 0x01, 0x00, 0x02, 0xFF, 0x4E]; // ts_id, on_id, last_section, last_table_id
        b.extend_from_slice(&event);

        let section_length = 5 + b.len() + 4;
        let mut s = vec![
            0x4E,
            0x80 | (((section_length >> 8) & 0x0F) as u8),
            section_length as u8,
            0x00,
            0x01, // service_id = 1
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
    fn overflowing_descriptor_is_reported_but_decode_succeeds() {
        // One event whose 3-byte descriptor loop holds a descriptor
        // declaring length 5.
        let body: &[u8] = &[
            0x00, 0x01, 0x00, 0x02, 0xFF, 0x4E, // header
            0x00, 0x01, // event_id
            0xE5, 0xE1, // MJD 58849
            0x12, 0x34, 0x56, // start BCD
            0x00, 0x00, 0x00, // duration BCD
            0x00, 0x03, // running/free/desc_len
            0x50, 0x05, 0xAA, // descriptor overflowing its 3-byte loop
        ];
        let section = section::Section {
            table_id: 0x4E,
            section_syntax_indicator: true,
            private_indicator: false,
            table_id_extension: 1,
            version_number: 0,
            current_next_indicator: true,
            section_number: 0,
            last_section_number: 0,
            body,
            crc_ok: true,
            crc_computed: 0,
            crc_declared: 0,
        };
        let eit = decode(&section).unwrap();
        assert_eq!(eit.events.len(), 1);
        assert_eq!(eit.descriptor_errors.len(), 1);
        assert!(matches!(
            eit.descriptor_errors[0],
            DescriptorError::Overflow { length: 5, .. }
        ));
    }

    #[test]
    fn decodes_event_with_short_event_descriptor() {
        let data = eit_section_bytes();
        let section = section::parse(&data).unwrap();
        let eit = decode(&section).unwrap();
        assert_eq!(eit.service_id, 1);
        assert_eq!(eit.events.len(), 1);
        let event = &eit.events[0];
        assert_eq!(event.event_id, 1);
        assert_eq!(event.start.unwrap().to_rfc3339(), "2020-01-01T12:34:56+00:00");
        assert_eq!(event.duration.as_seconds(), 3600);
        assert_eq!(event.short_events.len(), 1);
        assert_eq!(event.short_events[0].language, "eng");
        assert_eq!(event.short_events[0].name, "Title");
        assert_eq!(event.short_events[0].text, "Text");
    }
}
