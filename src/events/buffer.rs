//! Event parameter buffers.
//!
//! Wire layout: `[0x01] { [len:1][name:len][count:4-LE] }*`. The first byte
//! is a fixed marker, present once anything has been subscribed. Records
//! follow back to back with no padding.

use crate::error::{Result, SessionError};
use std::ops::Range;

/// Leading byte of a non-empty event buffer.
pub const EVENT_BUFFER_MARKER: u8 = 0x01;

/// Longest event name the server accepts, in bytes.
pub const MAX_EVENT_NAME_LEN: usize = 127;

const COUNT_LEN: usize = 4;

/// Reject names the wire format cannot carry.
pub fn validate_event_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(SessionError::InvalidArgument(
            "Zero length event names not permitted".into(),
        ));
    }
    if name.len() > MAX_EVENT_NAME_LEN {
        return Err(SessionError::InvalidArgument(format!(
            "Event name is too long ({} bytes, max {})",
            name.len(),
            MAX_EVENT_NAME_LEN
        )));
    }
    Ok(())
}

/// Append one record. The caller guarantees `name` is 1..=127 bytes.
pub(crate) fn encode_record(out: &mut Vec<u8>, name: &[u8], count: u32) {
    out.push(name.len() as u8);
    out.extend_from_slice(name);
    out.extend_from_slice(&count.to_le_bytes());
}

/// One decoded record, borrowing its name from the buffer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventRecord<'a> {
    pub name: &'a [u8],
    pub count: u32,
    /// Byte range of the whole record within its buffer.
    pub range: Range<usize>,
}

impl EventRecord<'_> {
    /// Name as text, replacing invalid UTF-8.
    pub fn name_lossy(&self) -> String {
        String::from_utf8_lossy(self.name).into_owned()
    }

    /// Byte range of the 4-byte counter within its buffer.
    pub fn count_range(&self) -> Range<usize> {
        self.range.end - COUNT_LEN..self.range.end
    }
}

/// Forward-only cursor over the records of an event buffer.
#[derive(Clone, Debug)]
pub struct EventCursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> EventCursor<'a> {
    /// Position the cursor on the first record, past the marker byte.
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            pos: usize::from(!buf.is_empty()),
        }
    }

    pub fn at_end(&self) -> bool {
        self.pos >= self.buf.len()
    }

    /// Decode the record under the cursor.
    pub fn current(&self) -> Result<EventRecord<'a>> {
        if self.at_end() {
            return Err(SessionError::InternalInconsistency(
                "Event cursor read past the end of the buffer".into(),
            ));
        }

        let start = self.pos;
        let name_len = self.buf[start] as usize;
        let name_start = start + 1;
        let count_start = name_start + name_len;
        let end = count_start + COUNT_LEN;

        if name_len == 0 || end > self.buf.len() {
            return Err(SessionError::InternalInconsistency(format!(
                "Truncated event record at offset {} ({} bytes available)",
                start,
                self.buf.len() - start
            )));
        }

        let mut count = [0u8; COUNT_LEN];
        count.copy_from_slice(&self.buf[count_start..end]);

        Ok(EventRecord {
            name: &self.buf[name_start..count_start],
            count: u32::from_le_bytes(count),
            range: start..end,
        })
    }

    /// Move to the next record.
    pub fn advance(&mut self) -> Result<()> {
        let record = self.current()?;
        self.pos = record.range.end;
        Ok(())
    }
}

impl<'a> Iterator for EventCursor<'a> {
    type Item = Result<EventRecord<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.at_end() {
            return None;
        }
        match self.current() {
            Ok(record) => {
                self.pos = record.range.end;
                Some(Ok(record))
            }
            Err(e) => {
                // Stop after reporting a malformed record.
                self.pos = self.buf.len();
                Some(Err(e))
            }
        }
    }
}

/// The subscription buffer and its paired counts buffer, kept in lockstep.
///
/// The subscription buffer carries the baseline counts that are sent to the
/// server. The counts buffer holds the last counts the server returned.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EventBuffers {
    events: Vec<u8>,
    counts: Vec<u8>,
}

impl EventBuffers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes sent to the server on each exchange.
    pub fn subscription(&self) -> &[u8] {
        &self.events
    }

    /// Counts from the last exchange.
    pub fn counts(&self) -> &[u8] {
        &self.counts
    }

    /// True if nothing has ever been subscribed, or every record was removed.
    pub fn is_empty(&self) -> bool {
        self.events.len() <= 1
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn record_count(&self) -> usize {
        EventCursor::new(&self.events).count()
    }

    /// Event names in registration order.
    pub fn names(&self) -> Vec<String> {
        EventCursor::new(&self.events)
            .filter_map(|r| r.ok())
            .map(|r| r.name_lossy())
            .collect()
    }

    /// Append a record with a count of 1 to both buffers.
    pub fn append(&mut self, name: &str) -> Result<()> {
        validate_event_name(name)?;

        if self.events.is_empty() {
            self.events.push(EVENT_BUFFER_MARKER);
            self.counts.push(EVENT_BUFFER_MARKER);
        }

        let start = self.events.len();
        encode_record(&mut self.events, name.as_bytes(), 1);
        self.counts.extend_from_slice(&self.events[start..]);
        Ok(())
    }

    /// Remove the first record named `name` from both buffers.
    ///
    /// Returns the record's index, or `None` if no record matched.
    pub fn remove(&mut self, name: &str) -> Result<Option<usize>> {
        validate_event_name(name)?;

        if self.is_empty() {
            return Ok(None);
        }

        let mut events = EventCursor::new(&self.events);
        let mut counts = EventCursor::new(&self.counts);
        let mut index = 0;

        while !events.at_end() {
            if counts.at_end() {
                return Err(SessionError::InternalInconsistency(
                    "Event counts buffer is shorter than the subscription buffer".into(),
                ));
            }
            let event = events.current()?;
            let count = counts.current()?;

            if event.name == name.as_bytes() {
                let (event_range, count_range) = (event.range, count.range);
                self.events.drain(event_range);
                self.counts.drain(count_range);
                return Ok(Some(index));
            }

            events.advance()?;
            counts.advance()?;
            index += 1;
        }

        Ok(None)
    }

    /// Overwrite one record's baseline count in the subscription buffer.
    pub(crate) fn set_baseline(&mut self, count_range: Range<usize>, count: u32) {
        self.events[count_range].copy_from_slice(&count.to_le_bytes());
    }

    /// Replace the counts buffer with the server's latest answer.
    pub(crate) fn store_counts(&mut self, fresh: &[u8]) {
        self.counts.clear();
        self.counts.extend_from_slice(fresh);
    }
}
