//! WebSocket frame parsing and serialization (RFC 6455 framing)
//!
//! The encoder side is a handful of pure functions; the decoder is an
//! incremental state machine that tolerates arbitrary byte-level chunking
//! from the transport, suspending at every state boundary where fewer bytes
//! are available than the state requires.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{CloseReason, Error, Result};
use crate::mask::apply_mask;
use crate::utf8::validate_utf8;
use crate::{MAX_FRAME_HEADER_SIZE, MEDIUM_MESSAGE_THRESHOLD, SMALL_MESSAGE_THRESHOLD};

/// WebSocket opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    /// Continuation frame
    Continuation,
    /// Text frame
    Text,
    /// Binary frame
    Binary,
    /// Connection close
    Close,
    /// Ping
    Ping,
    /// Pong
    Pong,
    /// Reserved opcodes 0x3-0x7 and 0xB-0xF; only valid once an extension
    /// defines them, which none negotiated here does
    Reserved(u8),
}

impl OpCode {
    /// Decode an opcode from the low nibble of the first header byte.
    #[inline]
    pub fn from_u8(byte: u8) -> Self {
        match byte & 0x0F {
            0x0 => OpCode::Continuation,
            0x1 => OpCode::Text,
            0x2 => OpCode::Binary,
            0x8 => OpCode::Close,
            0x9 => OpCode::Ping,
            0xA => OpCode::Pong,
            other => OpCode::Reserved(other),
        }
    }

    /// The wire nibble for this opcode.
    #[inline]
    pub fn as_u8(self) -> u8 {
        match self {
            OpCode::Continuation => 0x0,
            OpCode::Text => 0x1,
            OpCode::Binary => 0x2,
            OpCode::Close => 0x8,
            OpCode::Ping => 0x9,
            OpCode::Pong => 0xA,
            OpCode::Reserved(b) => b & 0x0F,
        }
    }

    /// Check if this is a control opcode
    #[inline]
    pub fn is_control(self) -> bool {
        matches!(self, OpCode::Close | OpCode::Ping | OpCode::Pong)
    }

    /// Check if this is a data opcode
    #[inline]
    pub fn is_data(self) -> bool {
        matches!(self, OpCode::Continuation | OpCode::Text | OpCode::Binary)
    }

    /// Check if this opcode is reserved
    #[inline]
    pub fn is_reserved(self) -> bool {
        matches!(self, OpCode::Reserved(_))
    }
}

/// A parsed WebSocket frame header
#[derive(Debug, Clone)]
pub struct FrameHeader {
    /// Final fragment flag
    pub fin: bool,
    /// RSV1 (extension bit, must be 0 without a negotiated extension)
    pub rsv1: bool,
    /// RSV2 (reserved)
    pub rsv2: bool,
    /// RSV3 (reserved)
    pub rsv3: bool,
    /// Frame opcode
    pub opcode: OpCode,
    /// Mask flag (true iff sent by a client)
    pub masked: bool,
    /// Payload length
    pub payload_len: u64,
    /// Masking key (present iff masked)
    pub mask: Option<[u8; 4]>,
}

impl FrameHeader {
    /// Total encoded header size in bytes.
    #[inline]
    pub fn header_size(&self) -> usize {
        let mut size = 2;
        if self.payload_len > MEDIUM_MESSAGE_THRESHOLD as u64 {
            size += 8;
        } else if self.payload_len > SMALL_MESSAGE_THRESHOLD as u64 {
            size += 2;
        }
        if self.masked {
            size += 4;
        }
        size
    }

    /// Encode the header into `buf`.
    ///
    /// Byte 0 is `fin << 7 | rsv | opcode`; byte 1 carries the mask flag and
    /// the 7-bit length field, extended by 16 or 64 big-endian bits when the
    /// payload exceeds 125 or 65535 bytes. The 4 raw masking-key bytes follow
    /// the length when present.
    pub fn encode(&self, buf: &mut BytesMut) {
        let mut b0 = self.opcode.as_u8();
        if self.fin {
            b0 |= 0x80;
        }
        if self.rsv1 {
            b0 |= 0x40;
        }
        if self.rsv2 {
            b0 |= 0x20;
        }
        if self.rsv3 {
            b0 |= 0x10;
        }
        buf.put_u8(b0);

        let mask_bit = if self.masked { 0x80 } else { 0x00 };
        if self.payload_len <= SMALL_MESSAGE_THRESHOLD as u64 {
            buf.put_u8(mask_bit | self.payload_len as u8);
        } else if self.payload_len <= MEDIUM_MESSAGE_THRESHOLD as u64 {
            buf.put_u8(mask_bit | 126);
            buf.put_u16(self.payload_len as u16);
        } else {
            buf.put_u8(mask_bit | 127);
            buf.put_u64(self.payload_len);
        }

        if let Some(mask) = self.mask {
            buf.put_slice(&mask);
        }
    }
}

/// A complete WebSocket frame
#[derive(Debug, Clone)]
pub struct Frame {
    /// Frame header
    pub header: FrameHeader,
    /// Frame payload (already unmasked)
    pub payload: Bytes,
}

impl Frame {
    /// Create a new unmasked frame
    pub fn new(opcode: OpCode, payload: Bytes, fin: bool) -> Self {
        Self {
            header: FrameHeader {
                fin,
                rsv1: false,
                rsv2: false,
                rsv3: false,
                opcode,
                masked: false,
                payload_len: payload.len() as u64,
                mask: None,
            },
            payload,
        }
    }

    /// Create a text frame
    #[inline]
    pub fn text(data: impl Into<Bytes>) -> Self {
        Self::new(OpCode::Text, data.into(), true)
    }

    /// Create a binary frame
    #[inline]
    pub fn binary(data: impl Into<Bytes>) -> Self {
        Self::new(OpCode::Binary, data.into(), true)
    }

    /// Create a ping frame
    #[inline]
    pub fn ping(data: impl Into<Bytes>) -> Self {
        Self::new(OpCode::Ping, data.into(), true)
    }

    /// Create a pong frame
    #[inline]
    pub fn pong(data: impl Into<Bytes>) -> Self {
        Self::new(OpCode::Pong, data.into(), true)
    }

    /// Create a close frame carrying a status code and reason
    pub fn close(code: u16, reason: &str) -> Self {
        let mut payload = BytesMut::with_capacity(2 + reason.len());
        payload.put_u16(code);
        payload.put_slice(reason.as_bytes());
        Self::new(OpCode::Close, payload.freeze(), true)
    }

    /// Create an empty close frame
    #[inline]
    pub fn close_empty() -> Self {
        Self::new(OpCode::Close, Bytes::new(), true)
    }

    /// Check if this is a control frame
    #[inline]
    pub fn is_control(&self) -> bool {
        self.header.opcode.is_control()
    }

    /// Check if this is the final fragment
    #[inline]
    pub fn is_final(&self) -> bool {
        self.header.fin
    }

    /// Get the payload as a string (for text frames)
    pub fn as_text(&self) -> Result<&str> {
        if !validate_utf8(&self.payload) {
            return Err(Error::InvalidUtf8);
        }
        // SAFETY: validated above
        Ok(unsafe { std::str::from_utf8_unchecked(&self.payload) })
    }

    /// Parse a close frame payload into code and reason.
    pub fn parse_close(&self) -> Option<CloseReason> {
        if self.payload.len() < 2 {
            return None;
        }
        let code = u16::from_be_bytes([self.payload[0], self.payload[1]]);
        let reason = if self.payload.len() > 2 {
            String::from_utf8_lossy(&self.payload[2..]).into_owned()
        } else {
            String::new()
        };
        Some(CloseReason::new(code, reason))
    }
}

/// Parser state, one per suspension point of the incremental scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseState {
    /// Waiting for the 2 base header bytes
    HeaderPending,
    /// Waiting for the 16-bit extended payload length
    ExtendedLen16Pending,
    /// Waiting for the 64-bit extended payload length
    ExtendedLen64Pending,
    /// Waiting for the 4 masking-key bytes
    MaskPending,
    /// Waiting for `payload_len` payload bytes
    PayloadPending,
}

/// Incremental frame parser
///
/// Never assumes one transport read yields a whole frame: every call either
/// consumes what it can and suspends (`Ok(None)`), or completes exactly one
/// frame. Declared lengths are validated against the frame cap before any
/// payload is buffered.
pub struct FrameParser {
    state: ParseState,
    /// Accumulated header bytes (max 2 + 8 + 4)
    header_buf: [u8; MAX_FRAME_HEADER_SIZE],
    header_len: usize,
    /// Where the masking key starts inside `header_buf`
    mask_offset: usize,
    /// Header of the frame currently being parsed
    pending: Option<FrameHeader>,
    /// Maximum accepted payload length per frame
    max_frame_size: usize,
    /// Server sockets require the mask flag; client sockets forbid it
    require_masked: bool,
}

impl FrameParser {
    /// Create a new frame parser.
    ///
    /// `require_masked` is true on the server side (clients must mask) and
    /// false on the client side (servers must not).
    pub fn new(max_frame_size: usize, require_masked: bool) -> Self {
        Self {
            state: ParseState::HeaderPending,
            header_buf: [0; MAX_FRAME_HEADER_SIZE],
            header_len: 0,
            mask_offset: 0,
            pending: None,
            max_frame_size,
            require_masked,
        }
    }

    /// Reset for the next frame.
    fn reset(&mut self) {
        self.state = ParseState::HeaderPending;
        self.header_len = 0;
        self.mask_offset = 0;
        self.pending = None;
    }

    /// Move bytes from `buf` into the header buffer until it holds `target`
    /// bytes. Returns false when the transport has not delivered enough yet.
    fn fill(&mut self, buf: &mut BytesMut, target: usize) -> bool {
        let take = (target - self.header_len).min(buf.len());
        self.header_buf[self.header_len..self.header_len + take].copy_from_slice(&buf[..take]);
        self.header_len += take;
        buf.advance(take);
        self.header_len == target
    }

    /// Parse a frame from the buffer.
    ///
    /// Returns `Ok(Some(frame))` when a complete frame was parsed,
    /// `Ok(None)` when more data is needed, `Err` on a protocol violation.
    pub fn parse(&mut self, buf: &mut BytesMut) -> Result<Option<Frame>> {
        loop {
            match self.state {
                ParseState::HeaderPending => {
                    if !self.fill(buf, 2) {
                        return Ok(None);
                    }
                    self.parse_base_header()?;
                }

                ParseState::ExtendedLen16Pending => {
                    if !self.fill(buf, 4) {
                        return Ok(None);
                    }
                    let len = u16::from_be_bytes([self.header_buf[2], self.header_buf[3]]) as u64;
                    if len < 126 {
                        return Err(Error::Protocol("payload length not minimally encoded"));
                    }
                    self.finish_length(len)?;
                }

                ParseState::ExtendedLen64Pending => {
                    if !self.fill(buf, 10) {
                        return Ok(None);
                    }
                    let len = u64::from_be_bytes([
                        self.header_buf[2],
                        self.header_buf[3],
                        self.header_buf[4],
                        self.header_buf[5],
                        self.header_buf[6],
                        self.header_buf[7],
                        self.header_buf[8],
                        self.header_buf[9],
                    ]);
                    if len <= MEDIUM_MESSAGE_THRESHOLD as u64 {
                        return Err(Error::Protocol("payload length not minimally encoded"));
                    }
                    if len >> 63 != 0 {
                        return Err(Error::Protocol("payload length MSB must be 0"));
                    }
                    self.finish_length(len)?;
                }

                ParseState::MaskPending => {
                    let target = self.mask_offset + 4;
                    if !self.fill(buf, target) {
                        return Ok(None);
                    }
                    let key = [
                        self.header_buf[self.mask_offset],
                        self.header_buf[self.mask_offset + 1],
                        self.header_buf[self.mask_offset + 2],
                        self.header_buf[self.mask_offset + 3],
                    ];
                    // pending is always set before MaskPending is entered
                    self.pending.as_mut().unwrap().mask = Some(key);
                    self.state = ParseState::PayloadPending;
                }

                ParseState::PayloadPending => {
                    let header = self.pending.as_ref().unwrap();
                    let payload_len = header.payload_len as usize;
                    if buf.len() < payload_len {
                        return Ok(None);
                    }

                    let mut payload = buf.split_to(payload_len);
                    if let Some(key) = header.mask {
                        apply_mask(&mut payload, key);
                    }

                    let frame = Frame {
                        header: self.pending.take().unwrap(),
                        payload: payload.freeze(),
                    };
                    self.reset();
                    return Ok(Some(frame));
                }
            }
        }
    }

    /// Decode the two base header bytes and pick the next state.
    fn parse_base_header(&mut self) -> Result<()> {
        let b0 = self.header_buf[0];
        let b1 = self.header_buf[1];

        let fin = b0 & 0x80 != 0;
        let rsv1 = b0 & 0x40 != 0;
        let rsv2 = b0 & 0x20 != 0;
        let rsv3 = b0 & 0x10 != 0;

        // No extension is negotiated, so all rsv bits must be zero.
        if rsv1 || rsv2 || rsv3 {
            return Err(Error::Protocol("reserved bits set without extension"));
        }

        let opcode = OpCode::from_u8(b0);
        if opcode.is_reserved() {
            return Err(Error::InvalidFrame("reserved opcode"));
        }
        if opcode.is_control() && !fin {
            return Err(Error::Protocol("control frame must not be fragmented"));
        }

        let masked = b1 & 0x80 != 0;
        if self.require_masked && !masked {
            return Err(Error::Protocol("client frames must be masked"));
        }
        if !self.require_masked && masked {
            return Err(Error::Protocol("server frames must not be masked"));
        }

        self.pending = Some(FrameHeader {
            fin,
            rsv1,
            rsv2,
            rsv3,
            opcode,
            masked,
            payload_len: 0,
            mask: None,
        });

        match b1 & 0x7F {
            126 => {
                self.state = ParseState::ExtendedLen16Pending;
                Ok(())
            }
            127 => {
                self.state = ParseState::ExtendedLen64Pending;
                Ok(())
            }
            len => self.finish_length(len as u64),
        }
    }

    /// Validate the resolved payload length and transition onward.
    ///
    /// Rejecting the declared length here is what guarantees a hostile
    /// length field never causes a buffer of that size to be allocated.
    fn finish_length(&mut self, len: u64) -> Result<()> {
        let header = self.pending.as_mut().unwrap();
        if header.opcode.is_control() && len > 125 {
            return Err(Error::Protocol("control frame payload exceeds 125 bytes"));
        }
        if len > self.max_frame_size as u64 {
            return Err(Error::FrameTooLarge);
        }
        header.payload_len = len;

        if header.masked {
            self.mask_offset = self.header_len;
            self.state = ParseState::MaskPending;
        } else {
            self.state = ParseState::PayloadPending;
        }
        Ok(())
    }
}

/// Encode a complete frame into `buf`.
///
/// When a masking key is supplied the payload is copied and masked in place;
/// otherwise it is appended raw.
pub fn encode_frame(
    buf: &mut BytesMut,
    opcode: OpCode,
    payload: &[u8],
    fin: bool,
    mask: Option<[u8; 4]>,
) {
    let header = FrameHeader {
        fin,
        rsv1: false,
        rsv2: false,
        rsv3: false,
        opcode,
        masked: mask.is_some(),
        payload_len: payload.len() as u64,
        mask,
    };
    buf.reserve(header.header_size() + payload.len());
    header.encode(buf);

    if let Some(key) = mask {
        let start = buf.len();
        buf.put_slice(payload);
        apply_mask(&mut buf[start..], key);
    } else {
        buf.put_slice(payload);
    }
}

/// Encapsulate `payload` in a single frame and return its wire bytes.
pub fn compose_frame(payload: &[u8], opcode: OpCode, fin: bool, mask: Option<[u8; 4]>) -> Bytes {
    let mut buf = BytesMut::with_capacity(MAX_FRAME_HEADER_SIZE + payload.len());
    encode_frame(&mut buf, opcode, payload, fin, mask);
    buf.freeze()
}

/// Split `payload` into wire frames of at most `max_frame_bytes` payload each
/// (0 = unlimited, producing a single frame).
///
/// The first frame carries the real opcode, subsequent frames carry
/// `Continuation`, and only the last has `fin` set. `mask` is drawn once per
/// frame, so a client source can hand out a fresh key each time while the
/// draft 4-6 derived key stays constant.
pub fn compose_frames(
    payload: &[u8],
    opcode: OpCode,
    max_frame_bytes: usize,
    mut mask: impl FnMut() -> Option<[u8; 4]>,
) -> Vec<Bytes> {
    if payload.is_empty() {
        return vec![compose_frame(payload, opcode, true, mask())];
    }

    let chunk_size = if max_frame_bytes == 0 {
        payload.len()
    } else {
        max_frame_bytes
    };
    let count = payload.len().div_ceil(chunk_size);

    payload
        .chunks(chunk_size)
        .enumerate()
        .map(|(i, chunk)| {
            let op = if i == 0 { opcode } else { OpCode::Continuation };
            compose_frame(chunk, op, i + 1 == count, mask())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mask::generate_mask;

    fn parse_all(parser: &mut FrameParser, bytes: &[u8]) -> Result<Vec<Frame>> {
        let mut buf = BytesMut::from(bytes);
        let mut frames = Vec::new();
        while let Some(frame) = parser.parse(&mut buf)? {
            frames.push(frame);
        }
        Ok(frames)
    }

    #[test]
    fn opcode_roundtrip() {
        for b in 0u8..16 {
            assert_eq!(OpCode::from_u8(b).as_u8(), b);
        }
        assert!(OpCode::Ping.is_control());
        assert!(OpCode::Pong.is_control());
        assert!(OpCode::Close.is_control());
        assert!(OpCode::Text.is_data());
        assert!(OpCode::Binary.is_data());
        assert!(OpCode::Continuation.is_data());
        assert!(OpCode::Reserved(0x3).is_reserved());
        assert!(OpCode::Reserved(0xB).is_reserved());
    }

    #[test]
    fn parse_small_unmasked() {
        let mut parser = FrameParser::new(1024 * 1024, false);
        let frames = parse_all(&mut parser, &[0x81, 0x05, b'h', b'e', b'l', b'l', b'o']).unwrap();
        assert_eq!(frames.len(), 1);
        assert!(frames[0].header.fin);
        assert_eq!(frames[0].header.opcode, OpCode::Text);
        assert_eq!(frames[0].payload.as_ref(), b"hello");
    }

    #[test]
    fn parse_small_masked() {
        let mut parser = FrameParser::new(1024 * 1024, true);
        let mask = [0x37, 0xfa, 0x21, 0x3d];
        let mut payload = *b"Hello";
        apply_mask(&mut payload, mask);

        let mut bytes = vec![0x81, 0x85];
        bytes.extend_from_slice(&mask);
        bytes.extend_from_slice(&payload);

        let frames = parse_all(&mut parser, &bytes).unwrap();
        assert_eq!(frames[0].payload.as_ref(), b"Hello");
        assert_eq!(frames[0].header.mask, Some(mask));
    }

    #[test]
    fn parse_empty_payload() {
        let mut parser = FrameParser::new(1024, false);
        let frames = parse_all(&mut parser, &[0x82, 0x00]).unwrap();
        assert_eq!(frames[0].header.opcode, OpCode::Binary);
        assert!(frames[0].payload.is_empty());
    }

    #[test]
    fn roundtrip_all_length_encodings() {
        // 7-bit, 16-bit, and 64-bit length fields
        for len in [0usize, 1, 125, 126, 65535, 65536, 100_000] {
            let payload: Vec<u8> = (0..len).map(|i| i as u8).collect();
            let wire = compose_frame(&payload, OpCode::Binary, true, None);

            let mut parser = FrameParser::new(1 << 20, false);
            let mut buf = BytesMut::from(wire.as_ref());
            let frame = parser.parse(&mut buf).unwrap().unwrap();
            assert!(frame.header.fin);
            assert_eq!(frame.header.opcode, OpCode::Binary);
            assert_eq!(frame.header.payload_len, len as u64);
            assert_eq!(frame.payload.as_ref(), &payload[..]);
        }
    }

    #[test]
    fn header_encoding_boundaries() {
        let wire = compose_frame(&[0u8; 126], OpCode::Binary, true, None);
        assert_eq!(wire[1], 126);
        assert_eq!(u16::from_be_bytes([wire[2], wire[3]]), 126);

        let wire = compose_frame(&[0u8; 65536], OpCode::Binary, true, None);
        assert_eq!(wire[1], 127);
        assert_eq!(
            u64::from_be_bytes([
                wire[2], wire[3], wire[4], wire[5], wire[6], wire[7], wire[8], wire[9]
            ]),
            65536
        );
    }

    #[test]
    fn byte_at_a_time_parsing() {
        // Masked 200-byte frame drip-fed one byte per call.
        let payload: Vec<u8> = (0..200).map(|i| i as u8).collect();
        let mask = [0xde, 0xad, 0xbe, 0xef];
        let wire = compose_frame(&payload, OpCode::Binary, true, Some(mask));

        let mut parser = FrameParser::new(1024, true);
        let mut buf = BytesMut::new();
        let mut result = None;
        for (i, byte) in wire.iter().enumerate() {
            buf.extend_from_slice(&[*byte]);
            match parser.parse(&mut buf).unwrap() {
                Some(frame) => {
                    assert_eq!(i, wire.len() - 1, "frame completed early");
                    result = Some(frame);
                }
                None => assert!(i < wire.len() - 1),
            }
        }
        let frame = result.expect("frame never completed");
        assert_eq!(frame.payload.as_ref(), &payload[..]);
    }

    #[test]
    fn compose_frames_reconstructs_payload() {
        let payload: Vec<u8> = (0..1000).map(|i| (i % 251) as u8).collect();
        let frames = compose_frames(&payload, OpCode::Binary, 100, || None);
        assert_eq!(frames.len(), 10);

        let mut parser = FrameParser::new(1024, false);
        let mut collected = Vec::new();
        for (i, wire) in frames.iter().enumerate() {
            let parsed = parse_all(&mut parser, wire).unwrap().remove(0);
            let expected_op = if i == 0 {
                OpCode::Binary
            } else {
                OpCode::Continuation
            };
            assert_eq!(parsed.header.opcode, expected_op);
            assert_eq!(parsed.header.fin, i == frames.len() - 1);
            collected.extend_from_slice(&parsed.payload);
        }
        assert_eq!(collected, payload);
    }

    #[test]
    fn compose_frames_masked_and_unlimited() {
        let payload = b"masked fragmentation";
        let frames = compose_frames(payload, OpCode::Text, 0, || Some(generate_mask()));
        assert_eq!(frames.len(), 1);

        let mut parser = FrameParser::new(1024, true);
        let frame = parse_all(&mut parser, &frames[0]).unwrap().remove(0);
        assert_eq!(frame.payload.as_ref(), payload);
    }

    #[test]
    fn compose_frames_empty_payload() {
        let frames = compose_frames(&[], OpCode::Text, 16, || None);
        assert_eq!(frames.len(), 1);
        let mut parser = FrameParser::new(1024, false);
        let frame = parse_all(&mut parser, &frames[0]).unwrap().remove(0);
        assert!(frame.header.fin);
        assert!(frame.payload.is_empty());
    }

    #[test]
    fn fragmented_control_frame_rejected() {
        let mut parser = FrameParser::new(1024, false);
        // Ping without FIN
        let err = parse_all(&mut parser, &[0x09, 0x00]).unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[test]
    fn oversized_control_frame_rejected() {
        let mut parser = FrameParser::new(1 << 20, false);
        // Ping declaring a 200-byte payload through the 16-bit length field
        let err = parse_all(&mut parser, &[0x89, 126, 0x00, 0xC8]).unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[test]
    fn oversized_declared_length_rejected_without_payload() {
        let mut parser = FrameParser::new(1024, false);
        // 64-bit length of 2^32, no payload bytes supplied at all: the cap
        // must trip on the header alone.
        let mut bytes = vec![0x82, 127];
        bytes.extend_from_slice(&(1u64 << 32).to_be_bytes());
        let err = parse_all(&mut parser, &bytes).unwrap_err();
        assert!(matches!(err, Error::FrameTooLarge));
    }

    #[test]
    fn reserved_bits_rejected() {
        let mut parser = FrameParser::new(1024, false);
        let err = parse_all(&mut parser, &[0x81 | 0x40, 0x00]).unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[test]
    fn reserved_opcode_rejected() {
        let mut parser = FrameParser::new(1024, false);
        let err = parse_all(&mut parser, &[0x83, 0x00]).unwrap_err();
        assert!(matches!(err, Error::InvalidFrame(_)));
    }

    #[test]
    fn mask_flag_policy_enforced() {
        // Server side: unmasked client frame is a violation.
        let mut server = FrameParser::new(1024, true);
        assert!(parse_all(&mut server, &[0x81, 0x01, b'a']).is_err());

        // Client side: masked server frame is a violation.
        let mut client = FrameParser::new(1024, false);
        assert!(parse_all(&mut client, &[0x81, 0x81, 0, 0, 0, 0, b'a']).is_err());
    }

    #[test]
    fn non_minimal_lengths_rejected() {
        let mut parser = FrameParser::new(1 << 20, false);
        // 16-bit field holding a value < 126
        assert!(parse_all(&mut parser, &[0x82, 126, 0x00, 0x05]).is_err());

        let mut parser = FrameParser::new(1 << 20, false);
        // 64-bit field holding a value <= 65535
        let mut bytes = vec![0x82, 127];
        bytes.extend_from_slice(&100u64.to_be_bytes());
        assert!(parse_all(&mut parser, &bytes).is_err());
    }

    #[test]
    fn close_frame_helpers() {
        let frame = Frame::close(1000, "goodbye");
        assert_eq!(frame.header.opcode, OpCode::Close);
        let close = frame.parse_close().unwrap();
        assert_eq!(close.code, 1000);
        assert_eq!(close.reason, "goodbye");

        assert!(Frame::close_empty().parse_close().is_none());
    }
}
