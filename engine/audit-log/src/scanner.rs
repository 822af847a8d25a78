//! Delimiter-aware FIX field scanner
//!
//! Splits a raw `tag=value<SOH>` buffer into fields without assuming any
//! field order. Values are returned as byte ranges into the original buffer
//! so the same scan can drive both message-type lookup and in-place
//! redaction.

use std::ops::Range;

/// FIX field delimiter
pub const SOH: u8 = 0x01;

/// Tag carrying the message type
pub const MSG_TYPE_TAG: u32 = 35;

/// One `tag=value` field of a raw message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field<'a> {
    /// Tag bytes as they appear on the wire
    pub tag: &'a [u8],
    /// Value span, from the byte after `=` up to (excluding) the next delimiter
    pub value: Range<usize>,
}

impl Field<'_> {
    /// Numeric tag, if the tag bytes are a decimal number
    pub fn tag_number(&self) -> Option<u32> {
        std::str::from_utf8(self.tag).ok()?.parse().ok()
    }
}

/// Iterator over the fields of a raw message
#[derive(Debug, Clone)]
pub struct FieldScanner<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> FieldScanner<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }
}

impl<'a> Iterator for FieldScanner<'a> {
    type Item = Field<'a>;

    fn next(&mut self) -> Option<Field<'a>> {
        while self.pos < self.buf.len() {
            let start = self.pos;
            // An unterminated trailing field runs to the end of the buffer
            let end = self.buf[start..].iter().position(|&b| b == SOH).map_or(self.buf.len(), |i| start + i);
            self.pos = end + 1;

            let segment = &self.buf[start..end];
            if let Some(eq) = segment.iter().position(|&b| b == b'=') {
                return Some(Field { tag: &segment[..eq], value: start + eq + 1..end });
            }
        }
        None
    }
}

/// Scan the fields of `buf`
pub fn fields(buf: &[u8]) -> FieldScanner<'_> {
    FieldScanner::new(buf)
}

/// Value of the first tag-35 field, wherever it appears
pub fn msg_type(buf: &[u8]) -> Option<&str> {
    fields(buf)
        .find(|field| field.tag_number() == Some(MSG_TYPE_TAG))
        .and_then(|field| std::str::from_utf8(&buf[field.value]).ok())
}
