//! WebSocket stream implementation
//!
//! This module provides the main `WebSocketStream` type: a message-level
//! `Stream` + `Sink` over any async byte transport. Pings are answered
//! automatically, the close handshake is echoed, and protocol violations
//! queue the matching close frame before the error is surfaced.

use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::{Buf, Bytes, BytesMut};
use futures_core::Stream;
use futures_sink::Sink;
use pin_project_lite::pin_project;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use crate::Config;
use crate::error::{CloseReason, Error, Result};
use crate::protocol::{Message, Protocol, Role, Version};

/// Default high water mark for backpressure (64KB)
const DEFAULT_HIGH_WATER_MARK: usize = 64 * 1024;

/// Default low water mark for backpressure (16KB)
const DEFAULT_LOW_WATER_MARK: usize = 16 * 1024;

pin_project! {
    /// A WebSocket stream over an async transport
    ///
    /// This type implements both `Stream<Item = Result<Message>>` for receiving
    /// and `Sink<Message>` for sending messages.
    ///
    /// Incoming pings are answered with pongs transparently; the ping still
    /// surfaces as a message so callers can observe liveness. A close frame
    /// from the peer is echoed back before `Message::Close` is yielded, after
    /// which the stream is terminated.
    ///
    /// # Backpressure
    ///
    /// When the write buffer exceeds the high water mark, `is_backpressured()`
    /// returns true and producers should flush before sending more.
    pub struct WebSocketStream<S> {
        #[pin]
        inner: S,
        protocol: Protocol,
        read_buf: BytesMut,
        write_buf: BytesMut,
        state: StreamState,
        // Unparsed bytes are sitting in read_buf (handshake leftover or a
        // fresh read)
        read_dirty: bool,
        // Messages decoded but not yet yielded
        pending_messages: VecDeque<Message>,
        // Terminal decode error, surfaced after the messages that preceded it
        pending_error: Option<Error>,
        high_water_mark: usize,
        low_water_mark: usize,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamState {
    /// Normal operation
    Open,
    /// Close frame sent, waiting for the peer's
    CloseSent,
    /// Connection closed
    Closed,
}

impl<S> WebSocketStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Create a WebSocket stream from an already-upgraded connection
    pub fn from_raw(inner: S, role: Role, version: Version, config: Config) -> Self {
        let protocol = Protocol::new(role, version, config.max_frame_size, config.max_message_size);
        Self::from_protocol(inner, protocol, config, None)
    }

    /// Create a WebSocket stream, seeding frame bytes that arrived in the
    /// same read as the handshake.
    pub fn from_parts(
        inner: S,
        role: Role,
        version: Version,
        config: Config,
        leftover: Option<Bytes>,
    ) -> Self {
        let protocol = Protocol::new(role, version, config.max_frame_size, config.max_message_size);
        Self::from_protocol(inner, protocol, config, leftover)
    }

    /// Create a WebSocket stream around a pre-built protocol handler.
    ///
    /// This is the constructor the acceptor and connector use; it lets them
    /// seed draft-specific state such as the derived masking key.
    pub fn from_protocol(
        inner: S,
        mut protocol: Protocol,
        config: Config,
        leftover: Option<Bytes>,
    ) -> Self {
        protocol.set_write_frame_size(config.max_write_frame_size);

        let mut read_buf = BytesMut::with_capacity(crate::RECV_BUFFER_SIZE);
        let read_dirty = match leftover {
            Some(data) if !data.is_empty() => {
                read_buf.extend_from_slice(&data);
                true
            }
            _ => false,
        };

        Self {
            inner,
            protocol,
            read_buf,
            write_buf: BytesMut::with_capacity(config.write_buffer_size),
            state: StreamState::Open,
            read_dirty,
            pending_messages: VecDeque::new(),
            pending_error: None,
            high_water_mark: DEFAULT_HIGH_WATER_MARK,
            low_water_mark: DEFAULT_LOW_WATER_MARK,
        }
    }

    /// Create a server-side RFC 6455 stream
    pub fn server(inner: S, config: Config) -> Self {
        Self::from_raw(inner, Role::Server, Version::V13, config)
    }

    /// Create a client-side RFC 6455 stream
    pub fn client(inner: S, config: Config) -> Self {
        Self::from_raw(inner, Role::Client, Version::V13, config)
    }

    /// Get a reference to the underlying stream
    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    /// Get a mutable reference to the underlying stream
    pub fn get_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    /// Consume the WebSocket stream and return the underlying stream
    pub fn into_inner(self) -> S {
        self.inner
    }

    /// Negotiated protocol version
    pub fn version(&self) -> Version {
        self.protocol.version()
    }

    /// Check if the connection is closed
    pub fn is_closed(&self) -> bool {
        self.state == StreamState::Closed
    }

    /// Round-trip time of the most recent ping/pong exchange
    pub fn last_rtt(&self) -> Option<Duration> {
        self.protocol.last_rtt()
    }

    /// Check if the write buffer is backpressured
    ///
    /// Returns `true` when the write buffer has exceeded the high water mark.
    /// Producers should pause sending until the buffer drains below the low
    /// water mark.
    #[inline]
    pub fn is_backpressured(&self) -> bool {
        self.write_buf.len() > self.high_water_mark
    }

    /// Check if the write buffer is below the low water mark
    #[inline]
    pub fn is_write_buffer_low(&self) -> bool {
        self.write_buf.len() <= self.low_water_mark
    }

    /// Get the current write buffer size in bytes
    #[inline]
    pub fn write_buffer_len(&self) -> usize {
        self.write_buf.len()
    }

    /// Get the current read buffer size in bytes
    #[inline]
    pub fn read_buffer_len(&self) -> usize {
        self.read_buf.len()
    }

    /// Set the high water mark for backpressure (default 64KB)
    #[inline]
    pub fn set_high_water_mark(&mut self, size: usize) {
        self.high_water_mark = size;
    }

    /// Set the low water mark for backpressure (default 16KB)
    #[inline]
    pub fn set_low_water_mark(&mut self, size: usize) {
        self.low_water_mark = size;
    }

    /// Send a ping and flush it, starting the round-trip timer.
    ///
    /// The matching pong updates [`last_rtt`](Self::last_rtt) when it is
    /// later read from the stream.
    pub async fn ping(&mut self, data: &[u8]) -> Result<()> {
        if self.state != StreamState::Open {
            return Err(Error::ConnectionClosed);
        }
        self.protocol.encode_ping(data, &mut self.write_buf)?;
        self.flush_write_buf().await
    }

    /// Send a close frame and flush it.
    ///
    /// The connection stays half-open until the peer's close frame is read
    /// from the stream.
    pub async fn close(&mut self, code: u16, reason: &str) -> Result<()> {
        if self.state != StreamState::Open {
            return Ok(());
        }

        let close = Message::Close(Some(CloseReason::new(code, reason)));
        self.protocol.encode_message(&close, &mut self.write_buf)?;
        self.state = StreamState::CloseSent;

        self.flush_write_buf().await
    }

    /// Flush the write buffer to the underlying stream
    async fn flush_write_buf(&mut self) -> Result<()> {
        use tokio::io::AsyncWriteExt;

        while !self.write_buf.is_empty() {
            let n = self.inner.write(&self.write_buf).await?;
            if n == 0 {
                return Err(Error::ConnectionClosed);
            }
            self.write_buf.advance(n);
        }

        self.inner.flush().await?;
        Ok(())
    }

    /// Read more data from the underlying stream into the read buffer
    fn poll_read_more(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<usize>> {
        let this = self.project();

        let mut temp = [0u8; 8192];
        let mut buf = ReadBuf::new(&mut temp);

        match this.inner.poll_read(cx, &mut buf) {
            Poll::Ready(Ok(())) => {
                let filled = buf.filled();
                this.read_buf.extend_from_slice(filled);
                Poll::Ready(Ok(filled.len()))
            }
            Poll::Ready(Err(e)) => Poll::Ready(Err(e)),
            Poll::Pending => Poll::Pending,
        }
    }

    /// Drain the write buffer; Pending leaves the remainder queued.
    fn poll_write_buf(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<()>> {
        let mut this = self.project();

        while !this.write_buf.is_empty() {
            match this.inner.as_mut().poll_write(cx, this.write_buf.chunk()) {
                Poll::Ready(Ok(0)) => return Poll::Ready(Err(Error::ConnectionClosed)),
                Poll::Ready(Ok(n)) => {
                    this.write_buf.advance(n);
                }
                Poll::Ready(Err(e)) => return Poll::Ready(Err(e.into())),
                Poll::Pending => return Poll::Pending,
            }
        }
        Poll::Ready(Ok(()))
    }

    /// Process read buffer and extract messages.
    ///
    /// On a decode error, the messages that completed before the offending
    /// frame are still queued; the error is returned for the caller to stash
    /// so they get delivered first.
    fn process_read_buf(&mut self) -> Result<()> {
        if self.read_buf.is_empty() {
            return Ok(());
        }

        let mut messages = Vec::new();
        let result = self.protocol.process_into(&mut self.read_buf, &mut messages);
        self.pending_messages.extend(messages);
        result
    }

    /// Take the next pending message
    fn next_pending_message(&mut self) -> Option<Message> {
        self.pending_messages.pop_front()
    }

    /// Queue the close frame matching a protocol violation so the peer sees
    /// the right status code before the connection dies.
    fn queue_error_close(&mut self, error: &Error) {
        if self.state != StreamState::Open || self.protocol.close_sent() {
            return;
        }
        let close = Message::Close(Some(CloseReason::new(error.close_code(), "")));
        if self.protocol.encode_message(&close, &mut self.write_buf).is_ok() {
            self.state = StreamState::CloseSent;
        }
    }
}

impl<S> Stream for WebSocketStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    type Item = Result<Message>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if self.state == StreamState::Closed {
                return Poll::Ready(None);
            }

            // First, return any pending messages
            if let Some(msg) = self.as_mut().get_mut().next_pending_message() {
                match &msg {
                    Message::Ping(data) => {
                        // Queue the pong and push it out opportunistically;
                        // anything left over rides with the next flush.
                        let data = data.clone();
                        let this = self.as_mut().get_mut();
                        this.protocol.encode_pong(&data, &mut this.write_buf);
                        if let Poll::Ready(Err(e)) = self.as_mut().poll_write_buf(cx) {
                            return Poll::Ready(Some(Err(e)));
                        }
                    }
                    Message::Close(reason) => {
                        let reason = reason.clone();
                        let this = self.as_mut().get_mut();
                        if this.state == StreamState::Open {
                            this.protocol.encode_close_response(&mut this.write_buf);
                        }
                        this.state = StreamState::Closed;
                        let _ = self.as_mut().poll_write_buf(cx);
                        return Poll::Ready(Some(Ok(Message::Close(reason))));
                    }
                    _ => {}
                }

                return Poll::Ready(Some(Ok(msg)));
            }

            // A decode error only surfaces once the messages ahead of it
            // have been yielded.
            if let Some(e) = self.as_mut().get_mut().pending_error.take() {
                self.as_mut().get_mut().queue_error_close(&e);
                let _ = self.as_mut().poll_write_buf(cx);
                return Poll::Ready(Some(Err(e)));
            }

            // Parse bytes already buffered (handshake leftover or the last
            // read) before touching the transport again.
            if self.read_dirty {
                let this = self.as_mut().get_mut();
                this.read_dirty = false;
                if let Err(e) = this.process_read_buf() {
                    this.pending_error = Some(e);
                }
                continue;
            }

            match self.as_mut().poll_read_more(cx) {
                Poll::Ready(Ok(0)) => {
                    // EOF
                    self.as_mut().get_mut().state = StreamState::Closed;
                    return Poll::Ready(None);
                }
                Poll::Ready(Ok(_n)) => {
                    self.as_mut().get_mut().read_dirty = true;
                }
                Poll::Ready(Err(e)) => {
                    return Poll::Ready(Some(Err(e.into())));
                }
                Poll::Pending => {
                    return Poll::Pending;
                }
            }
        }
    }
}

impl<S> Sink<Message> for WebSocketStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    type Error = Error;

    fn poll_ready(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<()>> {
        if self.state == StreamState::Closed {
            return Poll::Ready(Err(Error::ConnectionClosed));
        }
        // Drain under backpressure instead of growing without bound.
        if self.is_backpressured() {
            return self.poll_write_buf(cx);
        }
        Poll::Ready(Ok(()))
    }

    fn start_send(self: Pin<&mut Self>, item: Message) -> Result<()> {
        let this = self.get_mut();

        if this.state == StreamState::Closed {
            return Err(Error::ConnectionClosed);
        }

        if item.is_close() {
            this.state = StreamState::CloseSent;
        }

        this.protocol.encode_message(&item, &mut this.write_buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<()>> {
        match self.as_mut().poll_write_buf(cx) {
            Poll::Ready(Ok(())) => {}
            other => return other,
        }

        match Pin::new(&mut self.as_mut().get_mut().inner).poll_flush(cx) {
            Poll::Ready(Ok(())) => Poll::Ready(Ok(())),
            Poll::Ready(Err(e)) => Poll::Ready(Err(e.into())),
            Poll::Pending => Poll::Pending,
        }
    }

    fn poll_close(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<()>> {
        if self.state == StreamState::Open {
            let close = Message::Close(Some(CloseReason::new(CloseReason::NORMAL, "")));
            if let Err(e) = self.as_mut().start_send(close) {
                return Poll::Ready(Err(e));
            }
        }

        match self.as_mut().poll_flush(cx) {
            Poll::Ready(Ok(())) => {}
            Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
            Poll::Pending => return Poll::Pending,
        }

        match Pin::new(&mut self.as_mut().get_mut().inner).poll_shutdown(cx) {
            Poll::Ready(Ok(())) => {
                self.as_mut().get_mut().state = StreamState::Closed;
                Poll::Ready(Ok(()))
            }
            Poll::Ready(Err(e)) => Poll::Ready(Err(e.into())),
            Poll::Pending => Poll::Pending,
        }
    }
}
