//! Filtering and redaction applied before a message reaches the audit trail

use crate::scanner::{fields, Field, MSG_TYPE_TAG, SOH};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Range;

/// Token that replaces every redacted value, whatever its length
pub const REDACTION_MARKER: &[u8] = b"******";

/// Direction of a message relative to this engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Incoming,
    Outgoing,
}

/// Which message types are dropped and which tags are masked, per message type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedactionPolicy {
    /// Message types never written to the message log
    pub filtered_msg_types: BTreeSet<String>,

    /// Sensitive tags per message type
    pub rules: BTreeMap<String, BTreeSet<u32>>,

    /// Apply `rules` to incoming messages as well as outgoing ones
    pub redact_incoming: bool,
}

impl Default for RedactionPolicy {
    /// Market data snapshots and refreshes are filtered; credentials on
    /// NewOrderSingle (467, 2001, 2002) and the Logon password (554) are masked.
    fn default() -> Self {
        Self::empty()
            .with_filtered("W")
            .with_filtered("X")
            .with_rule("D", [467, 2001, 2002])
            .with_rule("A", [554])
    }
}

impl RedactionPolicy {
    /// Log everything unchanged
    pub fn empty() -> Self {
        Self { filtered_msg_types: BTreeSet::new(), rules: BTreeMap::new(), redact_incoming: false }
    }

    pub fn with_filtered(mut self, msg_type: impl Into<String>) -> Self {
        self.filtered_msg_types.insert(msg_type.into());
        self
    }

    pub fn with_rule(mut self, msg_type: impl Into<String>, tags: impl IntoIterator<Item = u32>) -> Self {
        self.rules.entry(msg_type.into()).or_default().extend(tags);
        self
    }

    pub fn with_redact_incoming(mut self, redact_incoming: bool) -> Self {
        self.redact_incoming = redact_incoming;
        self
    }

    pub fn is_filtered(&self, msg_type: &str) -> bool {
        self.filtered_msg_types.contains(msg_type)
    }

    /// Prepare `raw` for the message log.
    ///
    /// Returns `None` when the message type is filtered. The buffer is scanned
    /// once; the message type and every sensitive value span come from that
    /// single pass. A message without a type field is passed through.
    pub fn apply<'a>(&self, raw: &'a [u8], direction: Direction) -> Option<Cow<'a, [u8]>> {
        let scanned: Vec<Field<'_>> = fields(raw).collect();
        let msg_type = scanned
            .iter()
            .find(|field| field.tag_number() == Some(MSG_TYPE_TAG))
            .and_then(|field| std::str::from_utf8(&raw[field.value.clone()]).ok());

        let Some(msg_type) = msg_type else {
            return Some(Cow::Borrowed(raw));
        };
        if self.is_filtered(msg_type) {
            return None;
        }
        if direction == Direction::Incoming && !self.redact_incoming {
            return Some(Cow::Borrowed(raw));
        }
        let Some(tags) = self.rules.get(msg_type) else {
            return Some(Cow::Borrowed(raw));
        };

        let spans: Vec<Range<usize>> = scanned
            .iter()
            .filter(|field| !field.value.is_empty())
            .filter(|field| field.tag_number().is_some_and(|tag| tags.contains(&tag)))
            .map(|field| field.value.clone())
            .collect();

        if spans.is_empty() {
            return Some(Cow::Borrowed(raw));
        }
        Some(Cow::Owned(splice_marker(raw, &spans)))
    }
}

/// Copy of `buf` with the value of every occurrence of each tag in `tags`
/// replaced by [`REDACTION_MARKER`]. Absent tags and empty values are left alone.
pub fn redact_tags(buf: &[u8], tags: &[u32]) -> Vec<u8> {
    let spans: Vec<Range<usize>> = fields(buf)
        .filter(|field| !field.value.is_empty())
        .filter(|field| field.tag_number().is_some_and(|tag| tags.contains(&tag)))
        .map(|field| field.value)
        .collect();
    splice_marker(buf, &spans)
}

/// Rebuild `raw` with each span (ascending, non-overlapping) swapped for the marker
fn splice_marker(raw: &[u8], spans: &[Range<usize>]) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len() + spans.len() * REDACTION_MARKER.len());
    let mut copied = 0;
    for span in spans {
        out.extend_from_slice(&raw[copied..span.start]);
        out.extend_from_slice(REDACTION_MARKER);
        copied = span.end;
    }
    out.extend_from_slice(&raw[copied..]);
    out
}

/// Swap SOH delimiters for a printable byte. Only ever called after scanning.
pub fn display_delimited(msg: Cow<'_, [u8]>, delimiter: Option<u8>) -> Cow<'_, [u8]> {
    match delimiter {
        Some(d) if msg.contains(&SOH) => {
            let mut owned = msg.into_owned();
            owned.iter_mut().filter(|b| **b == SOH).for_each(|b| *b = d);
            Cow::Owned(owned)
        }
        _ => msg,
    }
}
