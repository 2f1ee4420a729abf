//! WebSocket client connection
//!
//! Performs the opening handshake over an already-established transport and
//! promotes it to a [`WebSocketStream`].

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use crate::Config;
use crate::error::Result;
use crate::handshake::{self, generate_accept_key, HandshakeResult};
use crate::protocol::{Protocol, Role, Version};
use crate::stream::WebSocketStream;

/// Connect as an RFC 6455 client over an established transport.
///
/// The caller supplies the connected stream (TCP, TLS, anything async);
/// this performs the upgrade and returns the message-level stream.
pub async fn connect<S>(
    stream: S,
    host: &str,
    path: &str,
    config: Config,
) -> Result<(WebSocketStream<S>, HandshakeResult)>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    connect_with_version(stream, host, path, Version::V13, None, None, config).await
}

/// Connect speaking a specific protocol version.
///
/// Versions 4 through 13 share the SHA-1 key exchange; for the draft
/// versions 4-6 the frame masking key is derived from the handshake
/// instead of drawn per frame.
pub async fn connect_with_version<S>(
    mut stream: S,
    host: &str,
    path: &str,
    version: Version,
    origin: Option<&str>,
    protocol: Option<&str>,
    config: Config,
) -> Result<(WebSocketStream<S>, HandshakeResult)>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let result =
        handshake::client_handshake(&mut stream, host, path, version, origin, protocol).await?;

    debug!(
        host = %host,
        path = %path,
        version = version.number(),
        protocol = ?result.protocol,
        "websocket connection established"
    );

    let mut proto = Protocol::new(
        Role::Client,
        version,
        config.max_frame_size,
        config.max_message_size,
    );
    if version.uses_derived_mask() {
        // Drafts 4-6 fix the masking key for the whole connection, derived
        // from the digits of the handshake key and accept token.
        if let Some(key) = result.key.as_deref() {
            let accept = generate_accept_key(key);
            proto = proto.with_legacy_mask(key, &accept);
        }
    }

    let ws = WebSocketStream::from_protocol(stream, proto, config, result.leftover.clone());
    Ok((ws, result))
}
