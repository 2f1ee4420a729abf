//! # Wavesock: WebSocket wire-protocol engine
//!
//! A complete RFC 6455 implementation that also speaks the frozen draft
//! versions still found in the wild: hybi-04 through hybi-08 and the
//! hixie-76 legacy protocol (version 0) with its `0x00..0xFF` text framing.
//!
//! ## Layers
//!
//! - **Frame codec**: incremental parsing and encoding of individual frames,
//!   tolerant of arbitrary partial reads
//! - **Protocol**: per-connection state machine handling fragmentation,
//!   control frames, masking policy, and the closing handshake
//! - **Handshake**: HTTP upgrade parsing, the SHA-1 accept exchange, and the
//!   version 0 MD5 challenge
//! - **Stream**: async `Stream` + `Sink` of messages over any transport,
//!   with automatic pong replies and close echoing
//!
//! ## Example
//!
//! ```ignore
//! use wavesock::{Acceptor, Config, Message};
//! use futures_util::{SinkExt, StreamExt};
//! use tokio::net::TcpListener;
//!
//! let listener = TcpListener::bind("0.0.0.0:8080").await?;
//! let acceptor = Acceptor::new(Config::default());
//!
//! let (stream, _) = listener.accept().await?;
//! let (mut ws, _handshake) = acceptor.accept(stream).await?;
//!
//! while let Some(msg) = ws.next().await {
//!     match msg? {
//!         Message::Text(text) => ws.send(Message::Text(text)).await?,
//!         Message::Close(_) => break,
//!         _ => {}
//!     }
//! }
//! ```

pub mod client;
pub mod error;
pub mod frame;
pub mod handshake;
pub mod mask;
pub mod protocol;
pub mod server;
pub mod stream;
pub mod utf8;

pub use client::{connect, connect_with_version};
pub use error::{CloseReason, Error, Result};
pub use frame::{Frame, FrameHeader, OpCode};
pub use handshake::HandshakeResult;
pub use protocol::{Message, Protocol, Role, Version};
pub use server::Acceptor;
pub use stream::WebSocketStream;

/// Default receive buffer size (64KB for high throughput)
pub const RECV_BUFFER_SIZE: usize = 64 * 1024;

/// Default write buffer size (16KB)
pub const WRITE_BUFFER_SIZE: usize = 16 * 1024;

/// Maximum WebSocket frame header size (2 + 8 + 4 = 14 bytes)
pub const MAX_FRAME_HEADER_SIZE: usize = 14;

/// Small message threshold (< 126 bytes uses 2-byte header)
pub const SMALL_MESSAGE_THRESHOLD: usize = 125;

/// Medium message threshold (< 64KB uses 4-byte header)
pub const MEDIUM_MESSAGE_THRESHOLD: usize = 65535;

/// WebSocket GUID for handshake
pub const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Configuration for WebSocket connections
///
/// # Example
///
/// ```
/// use wavesock::Config;
///
/// let config = Config::builder()
///     .max_message_size(16 * 1024 * 1024)
///     .max_frame_size(1024 * 1024)
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum reassembled message size (default: 64MB)
    pub max_message_size: usize,
    /// Maximum single frame size (default: 16MB)
    pub max_frame_size: usize,
    /// Write buffer size (default: 16KB)
    pub write_buffer_size: usize,
    /// Largest outgoing data-frame payload; 0 sends each message as a
    /// single frame (default: 0)
    pub max_write_frame_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_message_size: 64 * 1024 * 1024,
            max_frame_size: 16 * 1024 * 1024,
            write_buffer_size: WRITE_BUFFER_SIZE,
            max_write_frame_size: 0,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }
}

/// Builder for WebSocket configuration
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder with default values
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    /// Set maximum message size
    pub fn max_message_size(mut self, size: usize) -> Self {
        self.config.max_message_size = size;
        self
    }

    /// Set maximum frame size
    pub fn max_frame_size(mut self, size: usize) -> Self {
        self.config.max_frame_size = size;
        self
    }

    /// Set write buffer size
    pub fn write_buffer_size(mut self, size: usize) -> Self {
        self.config.write_buffer_size = size;
        self
    }

    /// Fragment outgoing data messages into frames of at most `size` bytes
    pub fn max_write_frame_size(mut self, size: usize) -> Self {
        self.config.max_write_frame_size = size;
        self
    }

    /// Build the configuration
    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::Config;
    pub use crate::error::{CloseReason, Error, Result};
    pub use crate::frame::{Frame, OpCode};
    pub use crate::protocol::{Message, Role, Version};
    pub use crate::server::Acceptor;
    pub use crate::stream::WebSocketStream;
}
