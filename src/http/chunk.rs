//! Response body chunks and the zero-copy composite buffer.
//!
//! A [`BodyChunk`] is handed from the application to the write path exactly
//! once. It is deliberately not `Clone`: the only ways out of a chunk are
//! [`BodyChunk::into_bytes`] (the bytes move into a write or an accumulator)
//! and [`BodyChunk::release`] (the bytes are dropped unwritten). Both consume
//! the chunk, so a chunk can never be written after release or released twice.

use std::collections::VecDeque;
use std::io::IoSlice;

use bytes::{Buf, Bytes};

/// One piece of a response body.
#[derive(Debug)]
pub struct BodyChunk {
    data: Bytes,
    last: bool,
}

impl BodyChunk {
    /// Creates a non-final chunk.
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            last: false,
        }
    }

    /// Creates the final chunk of a response.
    pub fn last(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            last: true,
        }
    }

    /// Creates an empty final chunk, the usual end of a streamed body.
    pub fn end() -> Self {
        Self::last(Bytes::new())
    }

    /// Whether this is the final chunk of the response.
    pub fn is_last(&self) -> bool {
        self.last
    }

    /// Number of readable bytes in the chunk.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Takes the bytes out of the chunk for writing or buffering.
    pub fn into_bytes(self) -> Bytes {
        self.data
    }

    /// Drops the chunk without writing it.
    pub fn release(self) {
        tracing::trace!(len = self.data.len(), last = self.last, "Released body chunk");
    }
}

/// A logical buffer made of several `Bytes` segments.
///
/// Pushing a segment only stores the reference-counted handle, so building a
/// composite never copies the underlying storage. The composite implements
/// [`Buf`] (including vectored access), which lets the transport hand all
/// segments to a single `writev`.
#[derive(Debug, Default)]
pub struct CompositeBuf {
    segments: VecDeque<Bytes>,
    remaining: usize,
}

impl CompositeBuf {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a segment. Empty segments are skipped.
    pub fn push(&mut self, segment: Bytes) {
        if segment.is_empty() {
            return;
        }
        self.remaining += segment.len();
        self.segments.push_back(segment);
    }

    /// Appends every segment of another composite, in order.
    pub fn append(&mut self, other: CompositeBuf) {
        for segment in other.segments {
            self.push(segment);
        }
    }

    /// Total number of readable bytes across all segments.
    pub fn len(&self) -> usize {
        self.remaining
    }

    pub fn is_empty(&self) -> bool {
        self.remaining == 0
    }

    /// Number of non-empty segments held.
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Consumes the composite, yielding its segments in write order.
    pub fn into_segments(self) -> impl Iterator<Item = Bytes> {
        self.segments.into_iter()
    }

    /// Drops every segment.
    pub fn clear(&mut self) {
        self.segments.clear();
        self.remaining = 0;
    }
}

impl FromIterator<Bytes> for CompositeBuf {
    fn from_iter<I: IntoIterator<Item = Bytes>>(iter: I) -> Self {
        let mut buf = CompositeBuf::new();
        for segment in iter {
            buf.push(segment);
        }
        buf
    }
}

impl Buf for CompositeBuf {
    fn remaining(&self) -> usize {
        self.remaining
    }

    fn chunk(&self) -> &[u8] {
        self.segments.front().map(|s| s.as_ref()).unwrap_or(&[])
    }

    fn advance(&mut self, mut cnt: usize) {
        assert!(cnt <= self.remaining, "advance past end of CompositeBuf");
        self.remaining -= cnt;

        while cnt > 0 {
            let Some(front) = self.segments.front_mut() else {
                break;
            };
            if cnt < front.len() {
                front.advance(cnt);
                break;
            }
            cnt -= front.len();
            self.segments.pop_front();
        }
    }

    fn chunks_vectored<'a>(&'a self, dst: &mut [IoSlice<'a>]) -> usize {
        let mut filled = 0;
        for (slot, segment) in dst.iter_mut().zip(self.segments.iter()) {
            *slot = IoSlice::new(segment);
            filled += 1;
        }
        filled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_crosses_segment_boundaries() {
        let mut buf: CompositeBuf = [
            Bytes::from_static(b"abc"),
            Bytes::from_static(b"de"),
            Bytes::from_static(b"fgh"),
        ]
        .into_iter()
        .collect();

        buf.advance(4);
        assert_eq!(buf.remaining(), 4);
        assert_eq!(buf.chunk(), b"e");
        assert_eq!(buf.segment_count(), 2);

        buf.advance(1);
        assert_eq!(buf.chunk(), b"fgh");
    }

    #[test]
    fn empty_segments_are_skipped() {
        let mut buf = CompositeBuf::new();
        buf.push(Bytes::new());
        buf.push(Bytes::from_static(b"x"));
        buf.push(Bytes::new());

        assert_eq!(buf.segment_count(), 1);
        assert_eq!(buf.len(), 1);
    }
}
