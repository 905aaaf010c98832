//! Descriptor loop parsing (spec.md §4.6): `(tag, length, value)` tuples
//! shared by PMT, SDT, and EIT.
//!
//! Grounded on the Python original's `parse_descriptors` and the teacher's
//! inline per-table descriptor loops (`psi/sdt.rs`, `processor/mod.rs`),
//! generalized into one reusable scanner instead of being re-duplicated in
//! every table decoder.

/// A single raw descriptor: a tag byte and its value bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Descriptor<'a> {
    /// The `descriptor_tag` byte.
    pub tag: u8,
    /// The descriptor's value bytes (excludes the tag/length header).
    pub data: &'a [u8],
}

/// Errors produced while walking a descriptor loop (spec.md §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DescriptorError {
    /// A descriptor's declared length ran past the end of the loop.
    #[error("descriptor at offset {offset} declares length {length} beyond the loop")]
    Overflow {
        /// Byte offset (within the loop) where the descriptor header began.
        offset: usize,
        /// The declared `descriptor_length`.
        length: u8,
    },
}

/// Iterates the `(tag, length, value)` tuples of a descriptor loop.
///
/// `data` must already be sliced down to exactly the descriptor loop's
/// bytes (callers compute that bound from the surrounding table's
/// `*_descriptors_length` field).
pub struct DescriptorIter<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> DescriptorIter<'a> {
    /// Wraps `data` for iteration from the start.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }
}

impl<'a> Iterator for DescriptorIter<'a> {
    type Item = Result<Descriptor<'a>, DescriptorError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset + 2 > self.data.len() {
            return None;
        }
        let tag = self.data[self.offset];
        let length = self.data[self.offset + 1];
        let value_start = self.offset + 2;
        let value_end = value_start + length as usize;
        if value_end > self.data.len() {
            let err = DescriptorError::Overflow {
                offset: self.offset,
                length,
            };
            // Stop the loop; a single overflow means the rest of the bytes
            // can't be trusted to contain further tag/length pairs.
            self.offset = self.data.len();
            return Some(Err(err));
        }
        self.offset = value_end;
        Some(Ok(Descriptor {
            tag,
            data: &self.data[value_start..value_end],
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_two_descriptors() {
        let data = [0x48, 0x02, 0xAA, 0xBB, 0x4D, 0x01, 0xCC];
        let out: Vec<_> = DescriptorIter::new(&data).collect::<Result<_, _>>().unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0], Descriptor { tag: 0x48, data: &[0xAA, 0xBB] });
        assert_eq!(out[1], Descriptor { tag: 0x4D, data: &[0xCC] });
    }

    #[test]
    fn empty_loop_yields_nothing() {
        assert!(DescriptorIter::new(&[]).next().is_none());
    }

    #[test]
    fn overflowing_length_reports_error_and_stops() {
        let data = [0x48, 0x05, 0xAA];
        let mut it = DescriptorIter::new(&data);
        match it.next() {
            Some(Err(DescriptorError::Overflow { offset: 0, length: 5 })) => {}
            other => panic!("expected Overflow, got {other:?}"),
        }
        assert!(it.next().is_none());
    }
}
