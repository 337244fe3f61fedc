//! Fixed-size rechunking and byte-window filtering for chunked streams.

use bytes::{Bytes, BytesMut};

use crate::interval::Interval;

/// Rechunks arbitrarily-sized byte chunks into fixed-size output chunks.
///
/// Every output chunk except the one returned by [`BufferAggregator::flush`]
/// has exactly `part_size` bytes; the concatenation of all outputs equals
/// the concatenation of all inputs.
#[derive(Debug)]
pub struct BufferAggregator {
    part_size: usize,
    buf: BytesMut,
}

impl BufferAggregator {
    /// Create an aggregator producing chunks of `part_size` bytes (minimum 1).
    pub fn new(part_size: usize) -> Self {
        Self {
            part_size: part_size.max(1),
            buf: BytesMut::new(),
        }
    }

    /// Append a chunk and return the full-sized chunks now available.
    pub fn push(&mut self, chunk: Bytes) -> Vec<Bytes> {
        self.buf.extend_from_slice(&chunk);
        let mut out = Vec::new();
        while self.buf.len() >= self.part_size {
            out.push(self.buf.split_to(self.part_size).freeze());
        }
        out
    }

    /// Return any trailing partial chunk.
    pub fn flush(&mut self) -> Option<Bytes> {
        if self.buf.is_empty() {
            None
        } else {
            Some(self.buf.split().freeze())
        }
    }

    /// Number of bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }
}

/// Clips a chunked stream to a requested byte window.
///
/// The filter tracks the absolute stream offset across chunks and yields
/// only the slice of each chunk that intersects the target interval, so a
/// response that starts earlier or runs longer than the requested window
/// (a 200 to a ranged request, or an over-wide 206) still produces exactly
/// the requested bytes.
#[derive(Debug)]
pub struct RangeFilter {
    target: Interval,
    stream_offset: u64,
}

impl RangeFilter {
    /// Create a filter for `target`, with the stream starting at `stream_offset`.
    pub fn new(target: Interval, stream_offset: u64) -> Self {
        Self {
            target,
            stream_offset,
        }
    }

    /// Advance past `chunk` and return the slice overlapping the target.
    pub fn accept(&mut self, chunk: &Bytes) -> Option<Bytes> {
        let local = self.target.intersect(self.stream_offset, chunk.len());
        self.stream_offset += chunk.len() as u64;
        if local.is_empty() {
            None
        } else {
            Some(chunk.slice(local.start() as usize..local.end() as usize))
        }
    }

    /// True once the stream offset has passed the end of the target window.
    pub fn done(&self) -> bool {
        self.stream_offset >= self.target.end()
    }

    /// Current absolute stream offset.
    pub fn stream_offset(&self) -> u64 {
        self.stream_offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iv(start: u64, end: u64) -> Interval {
        Interval::new(start, end).unwrap()
    }

    #[test]
    fn aggregator_emits_fixed_sizes() {
        let mut agg = BufferAggregator::new(4);
        let out = agg.push(Bytes::from_static(b"abcdefghij"));
        assert_eq!(out, vec![Bytes::from_static(b"abcd"), Bytes::from_static(b"efgh")]);
        assert_eq!(agg.buffered(), 2);
        assert_eq!(agg.flush(), Some(Bytes::from_static(b"ij")));
        assert_eq!(agg.flush(), None);
    }

    #[test]
    fn aggregator_spans_input_boundaries() {
        let mut agg = BufferAggregator::new(5);
        let mut out = Vec::new();
        for chunk in [&b"ab"[..], &b"cde"[..], &b"f"[..], &b"ghijk"[..]] {
            out.extend(agg.push(Bytes::copy_from_slice(chunk)));
        }
        if let Some(tail) = agg.flush() {
            out.push(tail);
        }
        let joined: Vec<u8> = out.iter().flat_map(|b| b.to_vec()).collect();
        assert_eq!(joined, b"abcdefghijk");
        assert!(out[..out.len() - 1].iter().all(|b| b.len() == 5));
    }

    #[test]
    fn aggregator_exact_multiple_leaves_nothing() {
        let mut agg = BufferAggregator::new(3);
        let out = agg.push(Bytes::from_static(b"abcdef"));
        assert_eq!(out.len(), 2);
        assert_eq!(agg.flush(), None);
    }

    #[test]
    fn aggregator_part_size_clamped() {
        let mut agg = BufferAggregator::new(0);
        let out = agg.push(Bytes::from_static(b"ab"));
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn filter_clips_to_window() {
        // Stream carries [0,200); we want [50,150).
        let mut filter = RangeFilter::new(iv(50, 150), 0);
        let data: Vec<u8> = (0..200u8).map(|i| i as u8).collect();

        let mut collected = Vec::new();
        for chunk in data.chunks(33) {
            if let Some(slice) = filter.accept(&Bytes::copy_from_slice(chunk)) {
                collected.extend_from_slice(&slice);
            }
        }
        assert_eq!(collected, &data[50..150]);
        assert!(filter.done());
    }

    #[test]
    fn filter_handles_offset_streams() {
        // Stream begins at absolute offset 100; window is [120,140).
        let mut filter = RangeFilter::new(iv(120, 140), 100);
        let chunk = Bytes::from_static(&[7u8; 60]);
        let slice = filter.accept(&chunk).unwrap();
        assert_eq!(slice.len(), 20);
        assert_eq!(filter.stream_offset(), 160);
        assert!(filter.done());
    }

    #[test]
    fn filter_emits_nothing_past_window() {
        let mut filter = RangeFilter::new(iv(0, 10), 0);
        assert!(filter.accept(&Bytes::from_static(&[0u8; 10])).is_some());
        assert!(filter.accept(&Bytes::from_static(&[0u8; 10])).is_none());
    }

    #[test]
    fn filter_emits_nothing_before_window() {
        let mut filter = RangeFilter::new(iv(100, 110), 0);
        assert!(filter.accept(&Bytes::from_static(&[0u8; 50])).is_none());
        assert!(!filter.done());
    }
}
