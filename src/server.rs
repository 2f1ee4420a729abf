//! WebSocket server acceptance
//!
//! `Acceptor` performs the opening handshake on an incoming transport and
//! promotes it to a [`WebSocketStream`] speaking whichever protocol version
//! the client negotiated.
//!
//! # Example
//!
//! ```ignore
//! use wavesock::{Acceptor, Config};
//! use tokio::net::TcpListener;
//!
//! let listener = TcpListener::bind("0.0.0.0:8080").await?;
//! let acceptor = Acceptor::new(Config::default());
//!
//! while let Ok((stream, _)) = listener.accept().await {
//!     let (ws, handshake) = acceptor.accept(stream).await?;
//!     // handle ws...
//! }
//! ```

use std::future::Future;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, warn};

use crate::Config;
use crate::error::{Error, Result};
use crate::handshake::{self, HandshakeResult};
use crate::protocol::{Protocol, Role};
use crate::stream::WebSocketStream;

/// Server-side connection acceptor
#[derive(Debug, Clone, Default)]
pub struct Acceptor {
    config: Config,
}

impl Acceptor {
    /// Create an acceptor with the given configuration
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Get the acceptor configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Accept a WebSocket connection on an existing stream
    ///
    /// Performs the HTTP upgrade handshake (including the version 0 MD5
    /// challenge for hixie-76 clients) and returns the promoted stream
    /// together with the handshake result.
    pub async fn accept<S>(&self, mut stream: S) -> Result<(WebSocketStream<S>, HandshakeResult)>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let result = handshake::server_handshake(&mut stream).await?;

        debug!(
            path = %result.path,
            version = result.version.number(),
            protocol = ?result.protocol,
            "websocket connection accepted"
        );

        let protocol = Protocol::new(
            Role::Server,
            result.version,
            self.config.max_frame_size,
            self.config.max_message_size,
        );
        let ws = WebSocketStream::from_protocol(
            stream,
            protocol,
            self.config.clone(),
            result.leftover.clone(),
        );

        Ok((ws, result))
    }

    /// Serve WebSocket connections from a TCP listener
    ///
    /// Accepts connections in a loop and spawns the handler for each
    /// successful upgrade. Handshake failures are logged and skipped.
    pub async fn serve<F, Fut>(&self, listener: tokio::net::TcpListener, handler: F) -> Result<()>
    where
        F: Fn(WebSocketStream<tokio::net::TcpStream>, HandshakeResult) -> Fut
            + Clone
            + Send
            + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        loop {
            let (stream, addr) = listener.accept().await.map_err(Error::Io)?;

            let handler = handler.clone();
            let acceptor = self.clone();

            tokio::spawn(async move {
                match acceptor.accept(stream).await {
                    Ok((ws, result)) => {
                        handler(ws, result).await;
                    }
                    Err(e) => {
                        warn!(peer = %addr, error = %e, "websocket handshake failed");
                    }
                }
            });
        }
    }
}
