use bytes::BytesMut;

use crate::codec::PacketHeader;

/// Two-phase receive buffer: header bytes first, then body bytes.
///
/// The buffer is always sized to exactly the bytes the current phase needs.
/// Callers fill it (possibly across many partial reads) and only interpret
/// the contents once [`is_full`](Self::is_full) reports true.
#[derive(Debug)]
pub struct ReceiveState {
    buf: BytesMut,
    position: usize,
    header: Option<PacketHeader>,
    header_length: usize,
}

impl ReceiveState {
    /// Create a receive state expecting a header of `header_length` bytes.
    pub fn new(header_length: usize) -> Self {
        let mut state = Self {
            buf: BytesMut::with_capacity(header_length),
            position: 0,
            header: None,
            header_length,
        };
        state.prepare_for_header();
        state
    }

    /// Re-arm for the next header; drops any current header.
    pub fn prepare_for_header(&mut self) {
        self.reset(self.header_length, None);
    }

    /// Switch to the body phase of the packet described by `header`.
    ///
    /// A zero-length body leaves the state immediately full.
    pub fn prepare_for_packet(&mut self, header: PacketHeader) {
        self.reset(header.body_length, Some(header));
    }

    fn reset(&mut self, target_length: usize, header: Option<PacketHeader>) {
        self.buf.clear();
        self.buf.resize(target_length, 0);
        self.position = 0;
        self.header = header;
    }

    /// Header of the packet whose body is being read, if in the body phase.
    pub fn header(&self) -> Option<&PacketHeader> {
        self.header.as_ref()
    }

    /// Whether the state is collecting header bytes.
    pub fn is_header_phase(&self) -> bool {
        self.header.is_none()
    }

    /// Fixed header length this state was created with.
    pub fn header_length(&self) -> usize {
        self.header_length
    }

    /// Bytes still required to complete the current phase.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.position
    }

    /// Whether the current phase has all of its bytes.
    pub fn is_full(&self) -> bool {
        self.position == self.buf.len()
    }

    /// Copy as much of `src` as the current phase still needs.
    ///
    /// Returns the number of bytes consumed.
    pub fn write(&mut self, src: &[u8]) -> usize {
        let n = src.len().min(self.remaining());
        self.buf[self.position..self.position + n].copy_from_slice(&src[..n]);
        self.position += n;
        n
    }

    /// The unfilled tail of the current phase, for reading into directly.
    pub fn unfilled_mut(&mut self) -> &mut [u8] {
        let position = self.position;
        &mut self.buf[position..]
    }

    /// Mark `n` bytes of [`unfilled_mut`](Self::unfilled_mut) as filled.
    pub fn advance(&mut self, n: usize) {
        assert!(n <= self.remaining(), "advance past end of receive phase");
        self.position += n;
    }

    /// Bytes collected for the current phase.
    pub fn filled(&self) -> &[u8] {
        &self.buf[..self.position]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_in_header_phase() {
        let state = ReceiveState::new(10);
        assert!(state.is_header_phase());
        assert_eq!(state.remaining(), 10);
        assert!(!state.is_full());
        assert!(state.header().is_none());
    }

    #[test]
    fn partial_writes_accumulate_until_full() {
        let mut state = ReceiveState::new(4);
        assert_eq!(state.write(b"ab"), 2);
        assert!(!state.is_full());
        assert_eq!(state.remaining(), 2);

        // Surplus input is left for the caller.
        assert_eq!(state.write(b"cdef"), 2);
        assert!(state.is_full());
        assert_eq!(state.filled(), b"abcd");
    }

    #[test]
    fn body_phase_is_sized_to_declared_length() {
        let mut state = ReceiveState::new(4);
        state.write(b"hdr!");
        state.prepare_for_packet(PacketHeader::new(7, 3));

        assert!(!state.is_header_phase());
        assert_eq!(state.header().map(|h| h.packet_id), Some(7));
        assert_eq!(state.remaining(), 3);
        assert!(state.filled().is_empty());
    }

    #[test]
    fn zero_length_body_is_immediately_full() {
        let mut state = ReceiveState::new(4);
        state.prepare_for_packet(PacketHeader::new(0, 0));
        assert!(state.is_full());
        assert!(!state.is_header_phase());
    }

    #[test]
    fn rearm_returns_to_header_phase() {
        let mut state = ReceiveState::new(4);
        state.prepare_for_packet(PacketHeader::new(1, 2));
        state.write(b"xy");
        state.prepare_for_header();

        assert!(state.is_header_phase());
        assert_eq!(state.remaining(), 4);
    }

    #[test]
    fn direct_fill_through_unfilled_slice() {
        let mut state = ReceiveState::new(3);
        state.unfilled_mut()[..2].copy_from_slice(b"ok");
        state.advance(2);
        assert_eq!(state.filled(), b"ok");
        assert_eq!(state.remaining(), 1);
    }

    #[test]
    #[should_panic(expected = "advance past end")]
    fn advance_beyond_phase_panics() {
        let mut state = ReceiveState::new(2);
        state.advance(3);
    }
}
