//! WebSocket opening handshake
//!
//! HTTP upgrade parsing and response construction for every supported
//! protocol version. RFC 6455 and the hybi drafts 4-8 share the SHA-1
//! accept-key exchange; version 0 (hixie-76) instead answers an MD5
//! challenge built from two space-and-digit keys and an 8-byte body.

use base64::Engine;
use bytes::{BufMut, Bytes, BytesMut};
use md5::Md5;
use sha1::{Digest, Sha1};

use crate::WS_GUID;
use crate::error::{Error, Result};
use crate::protocol::Version;

/// Maximum HTTP header size (8KB should be enough for any reasonable request)
const MAX_HEADER_SIZE: usize = 8192;

/// WebSocket handshake request (server-side)
#[derive(Debug)]
pub struct HandshakeRequest<'a> {
    /// The request path
    pub path: &'a str,
    /// The Host header
    pub host: Option<&'a str>,
    /// The Origin / Sec-WebSocket-Origin header (optional)
    pub origin: Option<&'a str>,
    /// The Sec-WebSocket-Key header (versions 4 and up)
    pub key: Option<&'a str>,
    /// The Sec-WebSocket-Key1 header (version 0 only)
    pub key1: Option<&'a str>,
    /// The Sec-WebSocket-Key2 header (version 0 only)
    pub key2: Option<&'a str>,
    /// Negotiated protocol version
    pub version: Version,
    /// The Sec-WebSocket-Protocol header (optional)
    pub protocol: Option<&'a str>,
    /// The Sec-WebSocket-Extensions header (optional)
    pub extensions: Option<&'a str>,
}

/// Parse a WebSocket upgrade request
///
/// Returns the parsed request and the number of bytes consumed. For version 0
/// an 8-byte challenge body follows the headers and is NOT included in the
/// consumed count.
pub fn parse_request(buf: &[u8]) -> Result<Option<(HandshakeRequest<'_>, usize)>> {
    if buf.len() > MAX_HEADER_SIZE {
        return Err(Error::InvalidHttp("request too large"));
    }

    let mut headers = [httparse::EMPTY_HEADER; 32];
    let mut req = httparse::Request::new(&mut headers);

    match req.parse(buf) {
        Ok(httparse::Status::Complete(len)) => {
            if req.method != Some("GET") {
                return Err(Error::InvalidHttp("method must be GET"));
            }

            let mut key = None;
            let mut key1 = None;
            let mut key2 = None;
            let mut version = None;
            let mut host = None;
            let mut origin = None;
            let mut protocol = None;
            let mut extensions = None;
            let mut upgrade = false;
            let mut connection_upgrade = false;

            for header in req.headers.iter() {
                let name = header.name.to_ascii_lowercase();
                let value = std::str::from_utf8(header.value)
                    .map_err(|_| Error::InvalidHttp("invalid header value"))?;

                match name.as_str() {
                    "sec-websocket-key" => key = Some(value),
                    "sec-websocket-key1" => key1 = Some(value),
                    "sec-websocket-key2" => key2 = Some(value),
                    "sec-websocket-version" => version = Some(value),
                    "sec-websocket-protocol" => protocol = Some(value),
                    "sec-websocket-extensions" => extensions = Some(value),
                    "host" => host = Some(value),
                    // hixie-76 spells it Origin, hybi-04..06 Sec-WebSocket-Origin
                    "origin" | "sec-websocket-origin" => origin = Some(value),
                    "upgrade" => {
                        if value.to_ascii_lowercase().contains("websocket") {
                            upgrade = true;
                        }
                    }
                    "connection" => {
                        if value.to_ascii_lowercase().contains("upgrade") {
                            connection_upgrade = true;
                        }
                    }
                    _ => {}
                }
            }

            if !upgrade {
                return Err(Error::Handshake("missing Upgrade: websocket"));
            }
            if !connection_upgrade {
                return Err(Error::Handshake("missing Connection: Upgrade"));
            }

            // Version 0 clients send no version header; they are identified
            // by the Key1/Key2 pair instead.
            let version = match version {
                Some(v) => {
                    let n: u8 = v
                        .trim()
                        .parse()
                        .map_err(|_| Error::Handshake("malformed Sec-WebSocket-Version"))?;
                    Version::from_number(n)
                        .ok_or(Error::Handshake("unsupported WebSocket version"))?
                }
                None if key1.is_some() && key2.is_some() => Version::V0,
                None => return Err(Error::Handshake("missing Sec-WebSocket-Version")),
            };

            if version == Version::V0 {
                if key1.is_none() || key2.is_none() {
                    return Err(Error::Handshake("missing Sec-WebSocket-Key1/Key2"));
                }
            } else if key.is_none() {
                return Err(Error::Handshake("missing Sec-WebSocket-Key"));
            }

            let path = req.path.unwrap_or("/");

            Ok(Some((
                HandshakeRequest {
                    path,
                    host,
                    origin,
                    key,
                    key1,
                    key2,
                    version,
                    protocol,
                    extensions,
                },
                len,
            )))
        }
        Ok(httparse::Status::Partial) => Ok(None),
        Err(_) => Err(Error::InvalidHttp("failed to parse HTTP request")),
    }
}

/// Generate the Sec-WebSocket-Accept key
///
/// This computes: Base64(SHA-1(key + GUID))
#[inline]
pub fn generate_accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    let hash = hasher.finalize();
    base64::engine::general_purpose::STANDARD.encode(hash)
}

/// Decode one hixie-76 key header: the embedded decimal digits divided by
/// the number of spaces.
fn v0_key_number(key: &str) -> Result<u32> {
    let digits: String = key.chars().filter(char::is_ascii_digit).collect();
    let spaces = key.chars().filter(|c| *c == ' ').count() as u64;
    if digits.is_empty() || spaces == 0 {
        return Err(Error::Handshake("malformed legacy key"));
    }
    let number: u64 = digits
        .parse()
        .map_err(|_| Error::Handshake("malformed legacy key"))?;
    if number % spaces != 0 {
        return Err(Error::Handshake("malformed legacy key"));
    }
    Ok((number / spaces) as u32)
}

/// Solve the hixie-76 challenge: MD5 over both key numbers (big-endian)
/// concatenated with the 8-byte request body.
pub fn solve_v0_challenge(key1: &str, key2: &str, body: &[u8; 8]) -> Result<[u8; 16]> {
    let mut material = [0u8; 16];
    material[..4].copy_from_slice(&v0_key_number(key1)?.to_be_bytes());
    material[4..8].copy_from_slice(&v0_key_number(key2)?.to_be_bytes());
    material[8..].copy_from_slice(body);
    Ok(Md5::digest(material).into())
}

/// Build a WebSocket upgrade response (versions 4 and up)
pub fn build_response(accept_key: &str, protocol: Option<&str>, extensions: Option<&str>) -> Bytes {
    let mut buf = BytesMut::with_capacity(256);

    buf.put_slice(b"HTTP/1.1 101 Switching Protocols\r\n");
    buf.put_slice(b"Upgrade: websocket\r\n");
    buf.put_slice(b"Connection: Upgrade\r\n");
    buf.put_slice(b"Sec-WebSocket-Accept: ");
    buf.put_slice(accept_key.as_bytes());
    buf.put_slice(b"\r\n");

    if let Some(proto) = protocol {
        buf.put_slice(b"Sec-WebSocket-Protocol: ");
        buf.put_slice(proto.as_bytes());
        buf.put_slice(b"\r\n");
    }

    if let Some(ext) = extensions {
        buf.put_slice(b"Sec-WebSocket-Extensions: ");
        buf.put_slice(ext.as_bytes());
        buf.put_slice(b"\r\n");
    }

    buf.put_slice(b"\r\n");
    buf.freeze()
}

/// Build a hixie-76 upgrade response, ending with the 16-byte challenge
/// answer as the body.
pub fn build_response_v0(
    origin: Option<&str>,
    location: &str,
    protocol: Option<&str>,
    challenge_response: &[u8; 16],
) -> Bytes {
    let mut buf = BytesMut::with_capacity(256);

    buf.put_slice(b"HTTP/1.1 101 WebSocket Protocol Handshake\r\n");
    buf.put_slice(b"Upgrade: WebSocket\r\n");
    buf.put_slice(b"Connection: Upgrade\r\n");

    if let Some(origin) = origin {
        buf.put_slice(b"Sec-WebSocket-Origin: ");
        buf.put_slice(origin.as_bytes());
        buf.put_slice(b"\r\n");
    }

    buf.put_slice(b"Sec-WebSocket-Location: ");
    buf.put_slice(location.as_bytes());
    buf.put_slice(b"\r\n");

    if let Some(proto) = protocol {
        buf.put_slice(b"Sec-WebSocket-Protocol: ");
        buf.put_slice(proto.as_bytes());
        buf.put_slice(b"\r\n");
    }

    buf.put_slice(b"\r\n");
    buf.put_slice(challenge_response);
    buf.freeze()
}

/// Build a WebSocket upgrade request (client-side, versions 4 and up)
pub fn build_request(
    host: &str,
    path: &str,
    key: &str,
    version: Version,
    origin: Option<&str>,
    protocol: Option<&str>,
    extensions: Option<&str>,
) -> Bytes {
    let mut buf = BytesMut::with_capacity(512);

    buf.put_slice(b"GET ");
    buf.put_slice(path.as_bytes());
    buf.put_slice(b" HTTP/1.1\r\n");
    buf.put_slice(b"Host: ");
    buf.put_slice(host.as_bytes());
    buf.put_slice(b"\r\n");
    buf.put_slice(b"Upgrade: websocket\r\n");
    buf.put_slice(b"Connection: Upgrade\r\n");
    buf.put_slice(b"Sec-WebSocket-Key: ");
    buf.put_slice(key.as_bytes());
    buf.put_slice(b"\r\n");
    buf.put_slice(b"Sec-WebSocket-Version: ");
    buf.put_slice(version.number().to_string().as_bytes());
    buf.put_slice(b"\r\n");

    if let Some(origin) = origin {
        buf.put_slice(b"Origin: ");
        buf.put_slice(origin.as_bytes());
        buf.put_slice(b"\r\n");
    }

    if let Some(proto) = protocol {
        buf.put_slice(b"Sec-WebSocket-Protocol: ");
        buf.put_slice(proto.as_bytes());
        buf.put_slice(b"\r\n");
    }

    if let Some(ext) = extensions {
        buf.put_slice(b"Sec-WebSocket-Extensions: ");
        buf.put_slice(ext.as_bytes());
        buf.put_slice(b"\r\n");
    }

    buf.put_slice(b"\r\n");
    buf.freeze()
}

/// Generate a random WebSocket key (client-side)
pub fn generate_key() -> String {
    let mut bytes = [0u8; 16];
    fastrand::fill(&mut bytes);
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// WebSocket handshake response (client-side parsing)
#[derive(Debug)]
pub struct HandshakeResponse<'a> {
    /// HTTP status code
    pub status: u16,
    /// The Sec-WebSocket-Accept header
    pub accept: Option<&'a str>,
    /// The Sec-WebSocket-Protocol header
    pub protocol: Option<&'a str>,
    /// The Sec-WebSocket-Extensions header
    pub extensions: Option<&'a str>,
}

/// Parse a WebSocket upgrade response (client-side)
pub fn parse_response(buf: &[u8]) -> Result<Option<(HandshakeResponse<'_>, usize)>> {
    if buf.len() > MAX_HEADER_SIZE {
        return Err(Error::InvalidHttp("response too large"));
    }

    let mut headers = [httparse::EMPTY_HEADER; 32];
    let mut res = httparse::Response::new(&mut headers);

    match res.parse(buf) {
        Ok(httparse::Status::Complete(len)) => {
            let status = res.code.unwrap_or(0);

            if status != 101 {
                return Err(Error::Handshake("expected 101 Switching Protocols"));
            }

            let mut accept = None;
            let mut protocol = None;
            let mut extensions = None;

            for header in res.headers.iter() {
                let name = header.name.to_ascii_lowercase();
                let value = std::str::from_utf8(header.value)
                    .map_err(|_| Error::InvalidHttp("invalid header value"))?;

                match name.as_str() {
                    "sec-websocket-accept" => accept = Some(value),
                    "sec-websocket-protocol" => protocol = Some(value),
                    "sec-websocket-extensions" => extensions = Some(value),
                    _ => {}
                }
            }

            Ok(Some((
                HandshakeResponse {
                    status,
                    accept,
                    protocol,
                    extensions,
                },
                len,
            )))
        }
        Ok(httparse::Status::Partial) => Ok(None),
        Err(_) => Err(Error::InvalidHttp("failed to parse HTTP response")),
    }
}

/// Validate the server's accept key (client-side)
pub fn validate_accept_key(sent_key: &str, received_accept: &str) -> bool {
    generate_accept_key(sent_key) == received_accept
}

/// Result of a successful handshake
#[derive(Debug)]
pub struct HandshakeResult {
    /// The request path
    pub path: String,
    /// The Host header, if the peer sent one
    pub host: Option<String>,
    /// The Origin header, if the peer sent one
    pub origin: Option<String>,
    /// The Sec-WebSocket-Key the client sent (None for version 0)
    pub key: Option<String>,
    /// Negotiated protocol version
    pub version: Version,
    /// Negotiated subprotocol
    pub protocol: Option<String>,
    /// Negotiated extensions
    pub extensions: Option<String>,
    /// Leftover data after the HTTP exchange (if any)
    pub leftover: Option<Bytes>,
}

/// Perform server-side handshake
pub async fn server_handshake<S>(stream: &mut S) -> Result<HandshakeResult>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let mut buf = BytesMut::with_capacity(4096);

    loop {
        if buf.len() > MAX_HEADER_SIZE {
            return Err(Error::InvalidHttp("request too large"));
        }

        let n = stream.read_buf(&mut buf).await?;
        if n == 0 {
            return Err(Error::ConnectionClosed);
        }

        let Some((req, consumed)) = parse_request(&buf)? else {
            continue;
        };

        // Version 0 carries an 8-byte challenge body after the headers.
        if req.version == Version::V0 && buf.len() < consumed + 8 {
            continue;
        }

        let path = req.path.to_string();
        let host = req.host.map(String::from);
        let origin = req.origin.map(String::from);
        let key = req.key.map(String::from);
        let version = req.version;
        let protocol = req.protocol.map(String::from);
        let extensions = req.extensions.map(String::from);

        let (response, consumed) = if version == Version::V0 {
            let key1 = req.key1.ok_or(Error::Handshake("missing Sec-WebSocket-Key1"))?;
            let key2 = req.key2.ok_or(Error::Handshake("missing Sec-WebSocket-Key2"))?;
            let mut body = [0u8; 8];
            body.copy_from_slice(&buf[consumed..consumed + 8]);
            let answer = solve_v0_challenge(key1, key2, &body)?;

            let location = format!("ws://{}{}", req.host.unwrap_or("localhost"), req.path);
            (
                build_response_v0(req.origin, &location, req.protocol, &answer),
                consumed + 8,
            )
        } else {
            let accept_key = generate_accept_key(req.key.unwrap_or(""));
            (build_response(&accept_key, req.protocol, None), consumed)
        };

        stream.write_all(&response).await?;
        stream.flush().await?;

        // Frames may ride in on the same read as the HTTP request.
        let leftover = if consumed < buf.len() {
            Some(buf.split_off(consumed).freeze())
        } else {
            None
        };

        return Ok(HandshakeResult {
            path,
            host,
            origin,
            key,
            version,
            protocol,
            extensions,
            leftover,
        });
    }
}

/// Perform client-side handshake
///
/// Version 0 is accept-only on this engine; client connections speak the
/// SHA-1 key exchange shared by versions 4 through 13.
pub async fn client_handshake<S>(
    stream: &mut S,
    host: &str,
    path: &str,
    version: Version,
    origin: Option<&str>,
    protocol: Option<&str>,
) -> Result<HandshakeResult>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    if version == Version::V0 {
        return Err(Error::Handshake("version 0 is server-side only"));
    }

    let key = generate_key();
    let request = build_request(host, path, &key, version, origin, protocol, None);

    stream.write_all(&request).await?;
    stream.flush().await?;

    let mut buf = BytesMut::with_capacity(4096);

    loop {
        if buf.len() > MAX_HEADER_SIZE {
            return Err(Error::InvalidHttp("response too large"));
        }

        let n = stream.read_buf(&mut buf).await?;
        if n == 0 {
            return Err(Error::ConnectionClosed);
        }

        if let Some((res, consumed)) = parse_response(&buf)? {
            let accept = res
                .accept
                .ok_or(Error::Handshake("missing Sec-WebSocket-Accept"))?;
            if !validate_accept_key(&key, accept) {
                return Err(Error::Handshake("invalid Sec-WebSocket-Accept"));
            }

            let res_protocol = res.protocol.map(String::from);
            let res_extensions = res.extensions.map(String::from);

            let leftover = if consumed < buf.len() {
                Some(buf.split_off(consumed).freeze())
            } else {
                None
            };

            return Ok(HandshakeResult {
                path: path.to_string(),
                host: Some(host.to_string()),
                origin: origin.map(String::from),
                key: Some(key),
                version,
                protocol: res_protocol,
                extensions: res_extensions,
                leftover,
            });
        }
    }
}
