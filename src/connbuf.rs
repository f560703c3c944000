//! Per-connection growable read and write regions.
//!
//! Two independent regions, not a ring. The read region accumulates raw
//! socket bytes until a full frame is parseable; frames are consumed by
//! advancing `parse_idx`, and both cursors reset to zero once they meet.
//! The write region accumulates serialized responses; flushed bytes are
//! dropped by advancing `start`, with the same reset rule. Capacity doubles
//! on overflow and never shrinks. Invariants:
//! `0 <= parse_idx <= end <= capacity` and `0 <= start <= end <= capacity`.

/// Initial capacity of each region.
pub const INIT_BUF_LEN: usize = 1024;

/// Inbound half: raw bytes in, frames out.
#[derive(Debug)]
pub struct ReadRegion {
    buf: Vec<u8>,
    parse_idx: usize,
    end: usize,
}

impl ReadRegion {
    pub fn new() -> Self {
        ReadRegion {
            buf: vec![0; INIT_BUF_LEN],
            parse_idx: 0,
            end: 0,
        }
    }

    /// Writable tail of the region, for the next socket read. Grows first
    /// when full, so the returned slice is never empty.
    pub fn spare(&mut self) -> &mut [u8] {
        if self.end == self.buf.len() {
            self.buf.resize(self.buf.len() * 2, 0);
        }
        &mut self.buf[self.end..]
    }

    /// Record `n` bytes appended by a socket read into `spare()`.
    pub fn advance_end(&mut self, n: usize) {
        debug_assert!(self.end + n <= self.buf.len());
        self.end += n;
    }

    /// Bytes received but not yet consumed as frames.
    pub fn parseable(&self) -> &[u8] {
        &self.buf[self.parse_idx..self.end]
    }

    /// Consume one parsed frame of `n` bytes. When the parse cursor catches
    /// up with the end cursor, both move back to the start of the region to
    /// bound growth.
    pub fn consume(&mut self, n: usize) {
        debug_assert!(self.parse_idx + n <= self.end);
        self.parse_idx += n;
        if self.parse_idx == self.end {
            self.parse_idx = 0;
            self.end = 0;
        }
    }

    #[cfg(test)]
    fn capacity(&self) -> usize {
        self.buf.len()
    }
}

impl Default for ReadRegion {
    fn default() -> Self {
        Self::new()
    }
}

/// Outbound half: serialized responses in, socket writes out.
#[derive(Debug)]
pub struct WriteRegion {
    buf: Vec<u8>,
    start: usize,
    end: usize,
}

impl WriteRegion {
    pub fn new() -> Self {
        WriteRegion {
            buf: vec![0; INIT_BUF_LEN],
            start: 0,
            end: 0,
        }
    }

    /// Append a serialized frame, doubling capacity until it fits.
    pub fn push(&mut self, frame: &[u8]) {
        while self.buf.len() < self.end + frame.len() {
            self.buf.resize(self.buf.len() * 2, 0);
        }
        self.buf[self.end..self.end + frame.len()].copy_from_slice(frame);
        self.end += frame.len();
    }

    /// Bytes produced but not yet flushed to the socket.
    pub fn pending(&self) -> &[u8] {
        &self.buf[self.start..self.end]
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Drop `n` bytes the socket accepted; cursors reset once drained.
    pub fn consume(&mut self, n: usize) {
        debug_assert!(self.start + n <= self.end);
        self.start += n;
        if self.start == self.end {
            self.start = 0;
            self.end = 0;
        }
    }

    #[cfg(test)]
    fn capacity(&self) -> usize {
        self.buf.len()
    }
}

impl Default for WriteRegion {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_region_accumulates_and_resets() {
        let mut r = ReadRegion::new();
        let spare = r.spare();
        spare[..3].copy_from_slice(b"abc");
        r.advance_end(3);
        assert_eq!(r.parseable(), b"abc");

        r.consume(1);
        assert_eq!(r.parseable(), b"bc");

        // Consuming everything resets both cursors.
        r.consume(2);
        assert_eq!(r.parseable(), b"");
        let spare = r.spare();
        assert_eq!(spare.len(), INIT_BUF_LEN);
    }

    #[test]
    fn read_region_doubles_when_full() {
        let mut r = ReadRegion::new();
        let n = r.spare().len();
        r.advance_end(n);
        assert_eq!(r.capacity(), INIT_BUF_LEN);

        // Full region: asking for spare space doubles the capacity.
        let spare = r.spare();
        assert_eq!(spare.len(), INIT_BUF_LEN);
        assert_eq!(r.capacity(), 2 * INIT_BUF_LEN);
        // Earlier bytes survive the growth.
        assert_eq!(r.parseable().len(), INIT_BUF_LEN);
    }

    #[test]
    fn write_region_flushes_and_resets() {
        let mut w = WriteRegion::new();
        assert!(w.is_empty());
        w.push(b"response-one");
        w.push(b"two");
        assert_eq!(w.pending(), b"response-onetwo");

        w.consume(8);
        assert_eq!(w.pending(), b"-onetwo");
        w.consume(7);
        assert!(w.is_empty());
        assert_eq!(w.pending(), b"");
    }

    #[test]
    fn write_region_grows_for_large_frames() {
        let mut w = WriteRegion::new();
        let big = vec![0xabu8; 3 * INIT_BUF_LEN];
        w.push(&big);
        assert_eq!(w.pending(), &big[..]);
        assert_eq!(w.capacity(), 4 * INIT_BUF_LEN);

        // Capacity never shrinks.
        w.consume(big.len());
        assert!(w.is_empty());
        assert_eq!(w.capacity(), 4 * INIT_BUF_LEN);
    }
}
