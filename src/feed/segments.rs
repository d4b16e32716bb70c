//! Segment log backing the feed
//!
//! Appended payloads are kept as reference-counted `Bytes` segments tagged with
//! their starting offset in the feed. Segments are released from the front
//! once every attached cursor has moved past them.

use std::collections::VecDeque;

use bytes::{Bytes, BytesMut};

/// A stored segment and its starting offset in the feed
#[derive(Debug, Clone)]
struct Segment {
    start: u64,
    data: Bytes,
}

impl Segment {
    fn end(&self) -> u64 {
        self.start + self.data.len() as u64
    }
}

/// Result of reading the log at a given position
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum LogRead {
    /// Bytes available at the position
    Data(Bytes),
    /// The position is at the append position; nothing to read yet
    Empty,
    /// The position was released before it could be read
    Lagged { missed: u64 },
}

/// Append-only log of byte segments
#[derive(Debug, Default)]
pub(super) struct SegmentLog {
    segments: VecDeque<Segment>,
    /// Feed offset of the first retained byte
    base: u64,
    /// Append position
    head: u64,
    /// Bytes currently retained
    retained: usize,
}

impl SegmentLog {
    pub(super) fn new() -> Self {
        Self::default()
    }

    pub(super) fn head(&self) -> u64 {
        self.head
    }

    pub(super) fn base(&self) -> u64 {
        self.base
    }

    pub(super) fn retained_bytes(&self) -> usize {
        self.retained
    }

    pub(super) fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Append a segment at the head. Empty segments are ignored.
    pub(super) fn push(&mut self, data: Bytes) {
        if data.is_empty() {
            return;
        }

        let len = data.len();
        self.segments.push_back(Segment {
            start: self.head,
            data,
        });
        self.head += len as u64;
        self.retained += len;
    }

    /// Read up to `max` bytes starting at `pos`
    ///
    /// A read that fits inside one segment is a zero-copy slice. Otherwise the
    /// following segments are coalesced into one buffer until `max` is reached.
    pub(super) fn read_from(&self, pos: u64, max: usize) -> LogRead {
        if pos < self.base {
            return LogRead::Lagged {
                missed: self.base - pos,
            };
        }
        if pos >= self.head || max == 0 {
            return LogRead::Empty;
        }

        // First segment whose end lies past `pos`
        let idx = self.segments.partition_point(|seg| seg.end() <= pos);
        let Some(first) = self.segments.get(idx) else {
            return LogRead::Empty;
        };

        let offset = (pos - first.start) as usize;
        let head_piece = first.data.slice(offset..);
        if head_piece.len() >= max {
            return LogRead::Data(head_piece.slice(..max));
        }
        if idx + 1 == self.segments.len() {
            return LogRead::Data(head_piece);
        }

        let available = (self.head - pos) as usize;
        let mut chunk = BytesMut::with_capacity(available.min(max));
        chunk.extend_from_slice(&head_piece);
        for seg in self.segments.iter().skip(idx + 1) {
            let room = max - chunk.len();
            if room == 0 {
                break;
            }
            let take = seg.data.len().min(room);
            chunk.extend_from_slice(&seg.data[..take]);
        }

        LogRead::Data(chunk.freeze())
    }

    /// Release every segment that ends at or before `pos`
    pub(super) fn release_before(&mut self, pos: u64) {
        while let Some(front) = self.segments.front() {
            if front.end() > pos {
                break;
            }
            if let Some(seg) = self.segments.pop_front() {
                self.retained -= seg.data.len();
                self.base = seg.end();
            }
        }

        if self.segments.is_empty() {
            self.base = self.head;
        }
    }

    /// Drop oldest segments until at most `max_bytes` are retained
    ///
    /// The newest segment is always kept. Returns the number of bytes dropped.
    pub(super) fn enforce_cap(&mut self, max_bytes: usize) -> usize {
        let mut dropped = 0;
        while self.retained > max_bytes && self.segments.len() > 1 {
            if let Some(seg) = self.segments.pop_front() {
                self.retained -= seg.data.len();
                self.base = seg.end();
                dropped += seg.data.len();
            }
        }
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log_with(parts: &[&'static [u8]]) -> SegmentLog {
        let mut log = SegmentLog::new();
        for part in parts {
            log.push(Bytes::from_static(part));
        }
        log
    }

    #[test]
    fn test_push_advances_head() {
        let log = log_with(&[b"AA", b"BBB"]);

        assert_eq!(log.head(), 5);
        assert_eq!(log.base(), 0);
        assert_eq!(log.retained_bytes(), 5);
        assert_eq!(log.segment_count(), 2);
    }

    #[test]
    fn test_empty_push_ignored() {
        let mut log = SegmentLog::new();
        log.push(Bytes::new());

        assert_eq!(log.head(), 0);
        assert_eq!(log.segment_count(), 0);
    }

    #[test]
    fn test_read_at_head_is_empty() {
        let log = log_with(&[b"AA"]);

        assert_eq!(log.read_from(2, 1024), LogRead::Empty);
    }

    #[test]
    fn test_read_coalesces_segments() {
        let log = log_with(&[b"AA", b"BB", b"CC"]);

        assert_eq!(
            log.read_from(0, 1024),
            LogRead::Data(Bytes::from_static(b"AABBCC"))
        );
        assert_eq!(
            log.read_from(3, 1024),
            LogRead::Data(Bytes::from_static(b"BCC"))
        );
    }

    #[test]
    fn test_read_respects_max_chunk() {
        let log = log_with(&[b"AAAA", b"BBBB"]);

        assert_eq!(log.read_from(0, 3), LogRead::Data(Bytes::from_static(b"AAA")));
        assert_eq!(
            log.read_from(3, 3),
            LogRead::Data(Bytes::from_static(b"ABB"))
        );
        assert_eq!(
            log.read_from(6, 3),
            LogRead::Data(Bytes::from_static(b"BB"))
        );
    }

    #[test]
    fn test_release_before_keeps_partial_segment() {
        let mut log = log_with(&[b"AA", b"BB", b"CC"]);

        log.release_before(3);

        assert_eq!(log.base(), 2);
        assert_eq!(log.retained_bytes(), 4);
        assert_eq!(
            log.read_from(3, 1024),
            LogRead::Data(Bytes::from_static(b"BCC"))
        );
        assert_eq!(log.read_from(1, 1024), LogRead::Lagged { missed: 1 });
    }

    #[test]
    fn test_release_all_moves_base_to_head() {
        let mut log = log_with(&[b"AA", b"BB"]);

        log.release_before(log.head());

        assert_eq!(log.base(), 4);
        assert_eq!(log.retained_bytes(), 0);
        assert_eq!(log.segment_count(), 0);
        assert_eq!(log.read_from(4, 1024), LogRead::Empty);
    }

    #[test]
    fn test_enforce_cap_keeps_newest() {
        let mut log = log_with(&[b"AAAA", b"BBBB", b"CCCC"]);

        let dropped = log.enforce_cap(5);

        assert_eq!(dropped, 8);
        assert_eq!(log.base(), 8);
        assert_eq!(log.retained_bytes(), 4);
        assert_eq!(log.read_from(0, 1024), LogRead::Lagged { missed: 8 });
    }
}
