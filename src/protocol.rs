//! WebSocket protocol state machine
//!
//! Per-connection message reassembly, control-frame handling, and the
//! closing-handshake bookkeeping, on top of the incremental frame parser.
//! One `Protocol` exists per connection and is driven strictly in byte
//! arrival order; connections never share decoding state.

use std::time::{Duration, Instant};

use bytes::{Buf, Bytes, BytesMut};

use crate::error::{CloseReason, Error, Result};
use crate::frame::{compose_frames, encode_frame, Frame, FrameParser, OpCode};
use crate::mask::{generate_mask, generate_mask_v4};
use crate::utf8::{validate_utf8, validate_utf8_partial};

/// WebSocket endpoint role
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Client (must mask frames)
    Client,
    /// Server (must not mask frames)
    Server,
}

/// Negotiated protocol version.
///
/// A closed, frozen set: RFC 6455 (13), the hybi drafts 4-8 that share its
/// framing, and the hixie-76 legacy version 0 with its 0x00..0xFF text
/// framing. Selected once at handshake time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Version {
    /// hixie-76 / hybi-00
    V0,
    /// hybi-04
    V4,
    /// hybi-05
    V5,
    /// hybi-06
    V6,
    /// hybi-07
    V7,
    /// hybi-08 (also sent by hybi-09..12 peers)
    V8,
    /// RFC 6455
    V13,
}

impl Version {
    /// Parse the value of a `Sec-WebSocket-Version` header.
    pub fn from_number(n: u8) -> Option<Version> {
        match n {
            0 => Some(Version::V0),
            4 => Some(Version::V4),
            5 => Some(Version::V5),
            6 => Some(Version::V6),
            7 => Some(Version::V7),
            8 => Some(Version::V8),
            13 => Some(Version::V13),
            _ => None,
        }
    }

    /// The numeric version carried in handshake headers.
    pub fn number(self) -> u8 {
        match self {
            Version::V0 => 0,
            Version::V4 => 4,
            Version::V5 => 5,
            Version::V6 => 6,
            Version::V7 => 7,
            Version::V8 => 8,
            Version::V13 => 13,
        }
    }

    /// Whether this version uses RFC 6455-style framing (everything but 0).
    #[inline]
    pub fn hybi_framing(self) -> bool {
        !matches!(self, Version::V0)
    }

    /// Drafts 4-6 derive the client masking key from the handshake instead
    /// of choosing a fresh one per frame.
    #[inline]
    pub fn uses_derived_mask(self) -> bool {
        matches!(self, Version::V4 | Version::V5 | Version::V6)
    }
}

/// WebSocket message (complete, possibly assembled from fragments)
#[derive(Debug, Clone)]
pub enum Message {
    /// Text message (UTF-8 validated)
    Text(Bytes),
    /// Binary message
    Binary(Bytes),
    /// Ping message
    Ping(Bytes),
    /// Pong message
    Pong(Bytes),
    /// Close message
    Close(Option<CloseReason>),
}

impl Message {
    /// Create a text message from a string
    #[inline]
    pub fn text(s: impl Into<String>) -> Self {
        Message::Text(Bytes::from(s.into()))
    }

    /// Create a binary message
    #[inline]
    pub fn binary(data: impl Into<Bytes>) -> Self {
        Message::Binary(data.into())
    }

    /// Create a ping message
    #[inline]
    pub fn ping(data: impl Into<Bytes>) -> Self {
        Message::Ping(data.into())
    }

    /// Check if this is a close message
    #[inline]
    pub fn is_close(&self) -> bool {
        matches!(self, Message::Close(_))
    }

    /// Check if this is a text message
    #[inline]
    pub fn is_text(&self) -> bool {
        matches!(self, Message::Text(_))
    }

    /// Check if this is a binary message
    #[inline]
    pub fn is_binary(&self) -> bool {
        matches!(self, Message::Binary(_))
    }

    /// Check if this is a control message
    #[inline]
    pub fn is_control(&self) -> bool {
        matches!(
            self,
            Message::Ping(_) | Message::Pong(_) | Message::Close(_)
        )
    }

    /// Get message as text (None for non-text messages)
    #[inline]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Message::Text(b) => {
                // SAFETY: text payloads are UTF-8 validated during parsing
                Some(unsafe { std::str::from_utf8_unchecked(b) })
            }
            _ => None,
        }
    }

    /// Get the raw payload bytes
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Message::Text(b) | Message::Binary(b) | Message::Ping(b) | Message::Pong(b) => b,
            Message::Close(_) => &[],
        }
    }

    /// Consume the message, returning the payload
    pub fn into_bytes(self) -> Bytes {
        match self {
            Message::Text(b) | Message::Binary(b) | Message::Ping(b) | Message::Pong(b) => b,
            Message::Close(_) => Bytes::new(),
        }
    }
}

impl From<String> for Message {
    fn from(s: String) -> Self {
        Message::Text(Bytes::from(s))
    }
}

impl From<&str> for Message {
    fn from(s: &str) -> Self {
        Message::Text(Bytes::copy_from_slice(s.as_bytes()))
    }
}

impl From<Vec<u8>> for Message {
    fn from(v: Vec<u8>) -> Self {
        Message::Binary(Bytes::from(v))
    }
}

impl From<Bytes> for Message {
    fn from(b: Bytes) -> Self {
        Message::Binary(b)
    }
}

/// Per-connection protocol state machine
///
/// Handles incremental frame decoding, message reassembly, control frames
/// interleaved between fragments, and both directions of the closing
/// handshake. Protocol violations are terminal for the connection; the
/// matching close status code is available via [`Error::close_code`].
pub struct Protocol {
    role: Role,
    version: Version,
    parser: FrameParser,
    /// Reassembly buffer for the in-progress message
    fragment_buf: BytesMut,
    /// Opcode of the open fragmented message, if any
    fragment_opcode: Option<OpCode>,
    max_message_size: usize,
    /// Close reason received from the peer, echoed in our close reply
    pending_close: Option<CloseReason>,
    close_sent: bool,
    close_received: bool,
    /// Departure time of the most recent ping
    ping_sent: Option<Instant>,
    last_rtt: Option<Duration>,
    /// Handshake-derived masking key for drafts 4-6 client sockets
    static_mask: Option<[u8; 4]>,
    /// Largest data-frame payload to send; 0 sends each message whole
    write_frame_size: usize,
    /// Version 0: currently inside a 0x00..0xFF frame
    v0_in_frame: bool,
}

impl Protocol {
    /// Create a protocol handler for one connection.
    pub fn new(role: Role, version: Version, max_frame_size: usize, max_message_size: usize) -> Self {
        let require_masked = role == Role::Server;
        Self {
            role,
            version,
            parser: FrameParser::new(max_frame_size, require_masked),
            fragment_buf: BytesMut::new(),
            fragment_opcode: None,
            max_message_size,
            pending_close: None,
            close_sent: false,
            close_received: false,
            ping_sent: None,
            last_rtt: None,
            static_mask: None,
            write_frame_size: 0,
            v0_in_frame: false,
        }
    }

    /// Seed the draft 4-6 masking key from the handshake key and nonce.
    ///
    /// Only meaningful for client sockets on versions that derive the key;
    /// everything else keeps per-frame random keys.
    pub fn with_legacy_mask(mut self, key: &str, nonce: &str) -> Self {
        if self.role == Role::Client && self.version.uses_derived_mask() {
            self.static_mask = Some(generate_mask_v4(key, nonce));
        }
        self
    }

    /// Fragment outgoing data messages into frames of at most `size` payload
    /// bytes. Zero (the default) sends every message as a single frame.
    pub fn set_write_frame_size(&mut self, size: usize) {
        self.write_frame_size = size;
    }

    /// Endpoint role
    #[inline]
    pub fn role(&self) -> Role {
        self.role
    }

    /// Negotiated version
    #[inline]
    pub fn version(&self) -> Version {
        self.version
    }

    /// True once both sides have sent a close frame.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.close_sent && self.close_received
    }

    /// True if our close frame went out.
    #[inline]
    pub fn close_sent(&self) -> bool {
        self.close_sent
    }

    /// True if the peer's close frame arrived.
    #[inline]
    pub fn close_received(&self) -> bool {
        self.close_received
    }

    /// Round-trip time of the most recent ping/pong exchange.
    #[inline]
    pub fn last_rtt(&self) -> Option<Duration> {
        self.last_rtt
    }

    fn outgoing_mask(&self) -> Option<[u8; 4]> {
        if self.role != Role::Client {
            return None;
        }
        match self.static_mask {
            Some(key) => Some(key),
            None => Some(generate_mask()),
        }
    }

    /// Process incoming bytes and return the completed messages, in arrival
    /// order.
    ///
    /// Partial frames are retained internally; feeding one byte at a time is
    /// valid. Control frames arriving between fragments of a data message
    /// are surfaced without disturbing reassembly.
    pub fn process(&mut self, buf: &mut BytesMut) -> Result<Vec<Message>> {
        let mut messages = Vec::new();
        self.process_into(buf, &mut messages)?;
        Ok(messages)
    }

    /// `process` into a caller-owned buffer, reusable across calls.
    pub fn process_into(&mut self, buf: &mut BytesMut, messages: &mut Vec<Message>) -> Result<()> {
        messages.clear();

        if !self.version.hybi_framing() {
            return self.process_v0(buf, messages);
        }

        while !buf.is_empty() {
            match self.parser.parse(buf)? {
                Some(frame) => {
                    if let Some(msg) = self.handle_frame(frame)? {
                        messages.push(msg);
                    }
                }
                None => break,
            }
        }
        Ok(())
    }

    /// Dispatch one structurally complete frame.
    fn handle_frame(&mut self, frame: Frame) -> Result<Option<Message>> {
        match frame.header.opcode {
            OpCode::Continuation => self.handle_continuation(frame),
            OpCode::Text => self.handle_data(frame, OpCode::Text),
            OpCode::Binary => self.handle_data(frame, OpCode::Binary),
            OpCode::Close => self.handle_close(frame),
            OpCode::Ping => Ok(Some(Message::Ping(frame.payload))),
            OpCode::Pong => {
                self.last_rtt = self.ping_sent.take().map(|sent| sent.elapsed());
                Ok(Some(Message::Pong(frame.payload)))
            }
            // The parser rejects these before they get here.
            OpCode::Reserved(_) => Err(Error::InvalidFrame("reserved opcode")),
        }
    }

    /// Text or binary frame: either a whole message or the start of a
    /// fragmented one.
    fn handle_data(&mut self, frame: Frame, opcode: OpCode) -> Result<Option<Message>> {
        if self.fragment_opcode.is_some() {
            return Err(Error::Protocol("data frame while reassembly in progress"));
        }

        if frame.header.fin {
            if frame.payload.len() > self.max_message_size {
                return Err(Error::MessageTooLarge);
            }
            if opcode == OpCode::Text {
                if !validate_utf8(&frame.payload) {
                    return Err(Error::InvalidUtf8);
                }
                Ok(Some(Message::Text(frame.payload)))
            } else {
                Ok(Some(Message::Binary(frame.payload)))
            }
        } else {
            self.start_fragment(opcode, frame.payload)?;
            Ok(None)
        }
    }

    fn handle_continuation(&mut self, frame: Frame) -> Result<Option<Message>> {
        let opcode = self
            .fragment_opcode
            .ok_or(Error::Protocol("continuation frame without open message"))?;

        if self.fragment_buf.len() + frame.payload.len() > self.max_message_size {
            return Err(Error::MessageTooLarge);
        }
        self.fragment_buf.extend_from_slice(&frame.payload);

        if frame.header.fin {
            self.complete_fragment(opcode)
        } else {
            if opcode == OpCode::Text && !validate_utf8_partial(&self.fragment_buf) {
                return Err(Error::InvalidUtf8);
            }
            Ok(None)
        }
    }

    fn start_fragment(&mut self, opcode: OpCode, payload: Bytes) -> Result<()> {
        if payload.len() > self.max_message_size {
            return Err(Error::MessageTooLarge);
        }
        self.fragment_opcode = Some(opcode);
        self.fragment_buf.clear();
        self.fragment_buf.extend_from_slice(&payload);

        if opcode == OpCode::Text && !validate_utf8_partial(&self.fragment_buf) {
            return Err(Error::InvalidUtf8);
        }
        Ok(())
    }

    fn complete_fragment(&mut self, opcode: OpCode) -> Result<Option<Message>> {
        self.fragment_opcode = None;
        let data = self.fragment_buf.split().freeze();

        match opcode {
            OpCode::Text => {
                if !validate_utf8(&data) {
                    return Err(Error::InvalidUtf8);
                }
                Ok(Some(Message::Text(data)))
            }
            OpCode::Binary => Ok(Some(Message::Binary(data))),
            _ => Err(Error::Protocol("invalid fragment opcode")),
        }
    }

    /// Close frame from the peer.
    ///
    /// A present payload must carry at least the 16-bit status code, and any
    /// trailing reason bytes must be valid text.
    fn handle_close(&mut self, frame: Frame) -> Result<Option<Message>> {
        let reason = if frame.payload.len() >= 2 {
            let code = u16::from_be_bytes([frame.payload[0], frame.payload[1]]);
            if !CloseReason::is_valid_code(code) {
                return Err(Error::InvalidCloseCode(code));
            }

            let text = &frame.payload[2..];
            if !validate_utf8(text) {
                return Err(Error::InvalidUtf8);
            }
            Some(CloseReason::new(
                code,
                String::from_utf8_lossy(text).into_owned(),
            ))
        } else if frame.payload.is_empty() {
            None
        } else {
            return Err(Error::Protocol("close payload shorter than status code"));
        };

        self.close_received = true;
        self.pending_close = reason.clone();
        Ok(Some(Message::Close(reason)))
    }

    /// Version 0 legacy framing: text frames are 0x00 <utf-8> 0xFF, the
    /// closing handshake is the two-byte sequence 0xFF 0x00.
    fn process_v0(&mut self, buf: &mut BytesMut, messages: &mut Vec<Message>) -> Result<()> {
        loop {
            if !self.v0_in_frame {
                if buf.is_empty() {
                    return Ok(());
                }
                match buf[0] {
                    0x00 => {
                        buf.advance(1);
                        self.v0_in_frame = true;
                        self.fragment_buf.clear();
                    }
                    0xFF => {
                        if buf.len() < 2 {
                            return Ok(());
                        }
                        if buf[1] != 0x00 {
                            return Err(Error::Protocol("malformed legacy close frame"));
                        }
                        buf.advance(2);
                        self.close_received = true;
                        messages.push(Message::Close(None));
                        return Ok(());
                    }
                    _ => return Err(Error::Protocol("expected legacy frame delimiter")),
                }
            } else if let Some(end) = buf.iter().position(|b| *b == 0xFF) {
                if self.fragment_buf.len() + end > self.max_message_size {
                    return Err(Error::MessageTooLarge);
                }
                self.fragment_buf.extend_from_slice(&buf[..end]);
                buf.advance(end + 1);
                self.v0_in_frame = false;

                let data = self.fragment_buf.split().freeze();
                if !validate_utf8(&data) {
                    return Err(Error::InvalidUtf8);
                }
                messages.push(Message::Text(data));
            } else {
                if self.fragment_buf.len() + buf.len() > self.max_message_size {
                    return Err(Error::MessageTooLarge);
                }
                self.fragment_buf.extend_from_slice(buf);
                buf.clear();
                return Ok(());
            }
        }
    }

    /// Encode an outgoing message into `buf`, masking on the client side.
    pub fn encode_message(&mut self, msg: &Message, buf: &mut BytesMut) -> Result<()> {
        if !self.version.hybi_framing() {
            return self.encode_message_v0(msg, buf);
        }

        match msg {
            Message::Text(b) => self.encode_data(OpCode::Text, b, buf),
            Message::Binary(b) => self.encode_data(OpCode::Binary, b, buf),
            Message::Ping(b) => {
                self.ping_sent = Some(Instant::now());
                encode_frame(buf, OpCode::Ping, b, true, self.outgoing_mask());
            }
            Message::Pong(b) => encode_frame(buf, OpCode::Pong, b, true, self.outgoing_mask()),
            Message::Close(reason) => {
                self.close_sent = true;
                let payload = close_payload(reason.as_ref());
                encode_frame(buf, OpCode::Close, &payload, true, self.outgoing_mask());
            }
        }
        Ok(())
    }

    /// Data messages honor the write fragmentation threshold; control frames
    /// always go out whole.
    fn encode_data(&self, opcode: OpCode, payload: &[u8], buf: &mut BytesMut) {
        if self.write_frame_size == 0 || payload.len() <= self.write_frame_size {
            encode_frame(buf, opcode, payload, true, self.outgoing_mask());
            return;
        }
        for frame in compose_frames(payload, opcode, self.write_frame_size, || {
            self.outgoing_mask()
        }) {
            buf.extend_from_slice(&frame);
        }
    }

    fn encode_message_v0(&mut self, msg: &Message, buf: &mut BytesMut) -> Result<()> {
        match msg {
            Message::Text(b) => {
                buf.reserve(b.len() + 2);
                buf.extend_from_slice(&[0x00]);
                buf.extend_from_slice(b);
                buf.extend_from_slice(&[0xFF]);
                Ok(())
            }
            Message::Close(_) => {
                self.close_sent = true;
                buf.extend_from_slice(&[0xFF, 0x00]);
                Ok(())
            }
            Message::Binary(_) => Err(Error::Protocol("binary not supported before version 4")),
            Message::Ping(_) | Message::Pong(_) => {
                Err(Error::Protocol("ping not supported before version 4"))
            }
        }
    }

    /// Encode a ping and start the round-trip timer.
    pub fn encode_ping(&mut self, data: &[u8], buf: &mut BytesMut) -> Result<()> {
        if !self.version.hybi_framing() {
            return Err(Error::Protocol("ping not supported before version 4"));
        }
        self.ping_sent = Some(Instant::now());
        encode_frame(buf, OpCode::Ping, data, true, self.outgoing_mask());
        Ok(())
    }

    /// Encode the pong echo for a received ping, same application data.
    pub fn encode_pong(&mut self, ping_data: &[u8], buf: &mut BytesMut) {
        encode_frame(buf, OpCode::Pong, ping_data, true, self.outgoing_mask());
    }

    /// Encode the close reply, relaying the peer's status code and reason.
    pub fn encode_close_response(&mut self, buf: &mut BytesMut) {
        if !self.version.hybi_framing() {
            self.close_sent = true;
            buf.extend_from_slice(&[0xFF, 0x00]);
            return;
        }
        self.close_sent = true;
        let payload = close_payload(self.pending_close.as_ref());
        encode_frame(buf, OpCode::Close, &payload, true, self.outgoing_mask());
    }
}

fn close_payload(reason: Option<&CloseReason>) -> Bytes {
    match reason {
        Some(r) => {
            let mut p = BytesMut::with_capacity(2 + r.reason.len());
            p.extend_from_slice(&r.code.to_be_bytes());
            p.extend_from_slice(r.reason.as_bytes());
            p.freeze()
        }
        None => Bytes::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRAME_CAP: usize = 1 << 20;
    const MSG_CAP: usize = 1 << 22;

    fn server() -> Protocol {
        Protocol::new(Role::Server, Version::V13, FRAME_CAP, MSG_CAP)
    }

    fn client() -> Protocol {
        Protocol::new(Role::Client, Version::V13, FRAME_CAP, MSG_CAP)
    }

    /// Masked wire bytes for one frame, as a client would send them.
    fn client_frame(opcode: OpCode, payload: &[u8], fin: bool) -> Vec<u8> {
        let mut buf = BytesMut::new();
        encode_frame(&mut buf, opcode, payload, fin, Some(generate_mask()));
        buf.to_vec()
    }

    #[test]
    fn single_text_message() {
        let mut protocol = server();
        let mut buf = BytesMut::from(&client_frame(OpCode::Text, b"Hello", true)[..]);
        let messages = protocol.process(&mut buf).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].as_text(), Some("Hello"));
    }

    #[test]
    fn fragmented_reassembly_under_arbitrary_chunking() {
        let payload: Vec<u8> = (0..4096).map(|i| (i % 256) as u8).collect();

        // Split the message into frames of varying sizes, then feed the wire
        // bytes in awkward chunk sizes across many calls.
        for frame_size in [1usize, 7, 100, 1000, 4096] {
            let wire: Vec<u8> =
                compose_frames(&payload, OpCode::Binary, frame_size, || Some(generate_mask()))
                .iter()
                .flat_map(|f| f.to_vec())
                .collect();

            for chunk_size in [1usize, 3, 13, 512, wire.len()] {
                let mut protocol = server();
                let mut buf = BytesMut::new();
                let mut received = Vec::new();
                for chunk in wire.chunks(chunk_size) {
                    buf.extend_from_slice(chunk);
                    received.extend(protocol.process(&mut buf).unwrap());
                }
                assert_eq!(received.len(), 1, "frame={} chunk={}", frame_size, chunk_size);
                assert_eq!(received[0].as_bytes(), &payload[..]);
                assert!(received[0].is_binary());
            }
        }
    }

    #[test]
    fn ping_interleaved_between_fragments() {
        let mut protocol = server();
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&client_frame(OpCode::Text, b"Hel", false));
        buf.extend_from_slice(&client_frame(OpCode::Ping, b"tick", true));
        buf.extend_from_slice(&client_frame(OpCode::Continuation, b"lo", true));

        let messages = protocol.process(&mut buf).unwrap();
        assert_eq!(messages.len(), 2);
        assert!(matches!(&messages[0], Message::Ping(p) if p.as_ref() == b"tick"));
        assert_eq!(messages[1].as_text(), Some("Hello"));

        // Pong echo carries the ping's application data.
        let mut out = BytesMut::new();
        protocol.encode_pong(messages[0].as_bytes(), &mut out);
        assert_eq!(out[0], 0x8A);
        assert_eq!(out[1], 0x04);
        assert_eq!(&out[2..], b"tick");
    }

    #[test]
    fn continuation_without_open_message_rejected() {
        let mut protocol = server();
        let mut buf = BytesMut::from(&client_frame(OpCode::Continuation, b"x", true)[..]);
        assert!(matches!(
            protocol.process(&mut buf),
            Err(Error::Protocol(_))
        ));
    }

    #[test]
    fn process_into_keeps_messages_before_violation() {
        let mut protocol = server();
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&client_frame(OpCode::Text, b"kept", true));
        buf.extend_from_slice(&client_frame(OpCode::Continuation, b"stray", true));

        // The violation is terminal, but the message completed before it
        // must still come out.
        let mut messages = Vec::new();
        let err = protocol.process_into(&mut buf, &mut messages).unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].as_text(), Some("kept"));
    }

    #[test]
    fn outgoing_messages_fragment_at_the_write_threshold() {
        let mut sender = client();
        sender.set_write_frame_size(100);

        let payload: Vec<u8> = (0..350).map(|i| (i % 256) as u8).collect();
        let mut wire = BytesMut::new();
        sender
            .encode_message(&Message::binary(payload.clone()), &mut wire)
            .unwrap();

        // Four frames on the wire, one message after reassembly.
        let mut receiver = server();
        let received = receiver.process(&mut wire).unwrap();
        assert_eq!(received.len(), 1);
        assert!(received[0].is_binary());
        assert_eq!(received[0].as_bytes(), &payload[..]);

        // Messages at or below the threshold stay a single frame.
        let mut small_sender = server();
        small_sender.set_write_frame_size(100);
        let mut wire = BytesMut::new();
        small_sender
            .encode_message(&Message::text("small"), &mut wire)
            .unwrap();
        assert_eq!(wire[0], 0x81);
        assert_eq!(wire[1], 0x05);
    }

    #[test]
    fn data_frame_during_reassembly_rejected() {
        let mut protocol = server();
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&client_frame(OpCode::Binary, b"part", false));
        buf.extend_from_slice(&client_frame(OpCode::Binary, b"again", true));
        assert!(matches!(
            protocol.process(&mut buf),
            Err(Error::Protocol(_))
        ));
    }

    #[test]
    fn message_cap_enforced_across_fragments() {
        let mut protocol = Protocol::new(Role::Server, Version::V13, FRAME_CAP, 10);
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&client_frame(OpCode::Binary, b"123456", false));
        buf.extend_from_slice(&client_frame(OpCode::Continuation, b"7890AB", true));
        assert!(matches!(
            protocol.process(&mut buf),
            Err(Error::MessageTooLarge)
        ));
    }

    #[test]
    fn closing_handshake_bookkeeping() {
        // Peer closes first: we echo, then both flags are set.
        let mut protocol = server();
        let mut buf = BytesMut::from(&client_frame(OpCode::Close, &close_bytes(1000, "bye"), true)[..]);
        let messages = protocol.process(&mut buf).unwrap();
        assert!(messages[0].is_close());
        assert!(protocol.close_received());
        assert!(!protocol.close_sent());

        let mut out = BytesMut::new();
        protocol.encode_close_response(&mut out);
        assert!(protocol.is_closed());

        // The echo relays the peer's code and reason.
        assert_eq!(out[0], 0x88);
        assert_eq!(u16::from_be_bytes([out[2], out[3]]), 1000);
        assert_eq!(&out[4..], b"bye");
    }

    #[test]
    fn close_initiated_locally() {
        let mut protocol = server();
        let mut out = BytesMut::new();
        protocol
            .encode_message(&Message::Close(Some(CloseReason::new(1001, ""))), &mut out)
            .unwrap();
        assert!(protocol.close_sent());
        assert!(!protocol.is_closed());

        let mut buf = BytesMut::from(&client_frame(OpCode::Close, &close_bytes(1001, ""), true)[..]);
        protocol.process(&mut buf).unwrap();
        assert!(protocol.is_closed());
    }

    #[test]
    fn close_payload_validation() {
        // 1-byte payload cannot hold a status code.
        let mut protocol = server();
        let mut buf = BytesMut::from(&client_frame(OpCode::Close, &[0x03], true)[..]);
        assert!(matches!(
            protocol.process(&mut buf),
            Err(Error::Protocol(_))
        ));

        // Out-of-range status code.
        let mut protocol = server();
        let mut buf = BytesMut::from(&client_frame(OpCode::Close, &close_bytes(1005, ""), true)[..]);
        assert!(matches!(
            protocol.process(&mut buf),
            Err(Error::InvalidCloseCode(1005))
        ));

        // Reason must be valid text.
        let mut protocol = server();
        let mut payload = close_bytes(1000, "");
        payload.extend_from_slice(&[0xff, 0xfe]);
        let mut buf = BytesMut::from(&client_frame(OpCode::Close, &payload, true)[..]);
        assert!(matches!(protocol.process(&mut buf), Err(Error::InvalidUtf8)));
    }

    #[test]
    fn pong_updates_round_trip_time() {
        let mut protocol = client();
        let mut out = BytesMut::new();
        protocol.encode_ping(b"rtt", &mut out).unwrap();
        assert!(protocol.last_rtt().is_none());

        // Server pongs are unmasked.
        let mut buf = BytesMut::new();
        encode_frame(&mut buf, OpCode::Pong, b"rtt", true, None);
        let messages = protocol.process(&mut buf).unwrap();
        assert!(matches!(messages[0], Message::Pong(_)));
        assert!(protocol.last_rtt().is_some());
    }

    #[test]
    fn client_encoding_is_masked_server_is_not() {
        let mut out = BytesMut::new();
        client()
            .encode_message(&Message::text("hi"), &mut out)
            .unwrap();
        assert_eq!(out[1] & 0x80, 0x80);

        let mut out = BytesMut::new();
        server()
            .encode_message(&Message::text("hi"), &mut out)
            .unwrap();
        assert_eq!(out[0], 0x81);
        assert_eq!(out[1], 0x02);
        assert_eq!(&out[2..], b"hi");
    }

    #[test]
    fn derived_mask_for_draft_versions() {
        let mut protocol = Protocol::new(Role::Client, Version::V4, FRAME_CAP, MSG_CAP)
            .with_legacy_mask("a1b2c3", "45");
        let mut out = BytesMut::new();
        protocol.encode_message(&Message::text("x"), &mut out).unwrap();
        // Key bytes sit right after the 2-byte header.
        assert_eq!(&out[2..6], &generate_mask_v4("a1b2c3", "45"));
    }

    #[test]
    fn v0_text_roundtrip_with_partial_reads() {
        let mut protocol = Protocol::new(Role::Server, Version::V0, FRAME_CAP, MSG_CAP);

        let wire = [
            &[0x00][..],
            "hello κόσμε".as_bytes(),
            &[0xFF, 0x00],
            b"again",
            &[0xFF],
        ]
        .concat();

        let mut buf = BytesMut::new();
        let mut received = Vec::new();
        for chunk in wire.chunks(3) {
            buf.extend_from_slice(chunk);
            received.extend(protocol.process(&mut buf).unwrap());
        }
        assert_eq!(received.len(), 2);
        assert_eq!(received[0].as_text(), Some("hello κόσμε"));
        assert_eq!(received[1].as_text(), Some("again"));
    }

    #[test]
    fn v0_close_and_unsupported_messages() {
        let mut protocol = Protocol::new(Role::Server, Version::V0, FRAME_CAP, MSG_CAP);
        let mut buf = BytesMut::from(&[0xFF, 0x00][..]);
        let messages = protocol.process(&mut buf).unwrap();
        assert!(messages[0].is_close());
        assert!(protocol.close_received());

        let mut out = BytesMut::new();
        assert!(protocol
            .encode_message(&Message::binary(&b"raw"[..]), &mut out)
            .is_err());
        assert!(protocol.encode_ping(b"", &mut out).is_err());

        protocol.encode_close_response(&mut out);
        assert!(protocol.is_closed());
        assert_eq!(&out[..], &[0xFF, 0x00]);
    }

    #[test]
    fn v0_text_encoding() {
        let mut protocol = Protocol::new(Role::Server, Version::V0, FRAME_CAP, MSG_CAP);
        let mut out = BytesMut::new();
        protocol
            .encode_message(&Message::text("legacy"), &mut out)
            .unwrap();
        assert_eq!(out[0], 0x00);
        assert_eq!(out[out.len() - 1], 0xFF);
        assert_eq!(&out[1..out.len() - 1], b"legacy");
    }

    fn close_bytes(code: u16, reason: &str) -> Vec<u8> {
        let mut v = code.to_be_bytes().to_vec();
        v.extend_from_slice(reason.as_bytes());
        v
    }
}
