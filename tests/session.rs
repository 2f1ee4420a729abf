//! End-to-end sessions: handshake, message exchange, and the closing
//! handshake over an in-memory duplex transport.

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::io::duplex;
use wavesock::{connect, connect_with_version, Acceptor, CloseReason, Config, Message, Version};

fn echo_server<S>(io: S) -> tokio::task::JoinHandle<()>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let acceptor = Acceptor::new(Config::default());
        let (mut ws, _) = acceptor.accept(io).await.unwrap();
        while let Some(msg) = ws.next().await {
            match msg.unwrap() {
                msg @ (Message::Text(_) | Message::Binary(_)) => {
                    ws.send(msg).await.unwrap();
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    })
}

#[tokio::test]
async fn text_echo_and_close_handshake() {
    let (client_io, server_io) = duplex(16 * 1024);
    let server = echo_server(server_io);

    let (mut ws, result) = connect(client_io, "example.com", "/echo", Config::default())
        .await
        .unwrap();
    assert_eq!(result.version, Version::V13);

    ws.send(Message::text("hello over the wire")).await.unwrap();
    let echo = ws.next().await.unwrap().unwrap();
    assert_eq!(echo.as_text(), Some("hello over the wire"));

    // Initiate the close handshake and wait for the peer's echo.
    ws.close(CloseReason::NORMAL, "done").await.unwrap();
    loop {
        match ws.next().await {
            Some(Ok(Message::Close(reason))) => {
                assert_eq!(reason, Some(CloseReason::new(1000, "done")));
                break;
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => panic!("unexpected error: {}", e),
            None => break,
        }
    }

    server.await.unwrap();
}

#[tokio::test]
async fn large_binary_message_uses_extended_length() {
    let (client_io, server_io) = duplex(16 * 1024);
    let server = echo_server(server_io);

    let (mut ws, _) = connect(client_io, "example.com", "/", Config::default())
        .await
        .unwrap();

    // Above 65535 bytes, so the 64-bit length encoding is on the wire in
    // both directions.
    let payload: Vec<u8> = (0..70_000).map(|i| (i % 251) as u8).collect();
    ws.send(Message::Binary(Bytes::from(payload.clone())))
        .await
        .unwrap();

    let echo = ws.next().await.unwrap().unwrap();
    assert!(echo.is_binary());
    assert_eq!(echo.as_bytes(), &payload[..]);

    drop(ws);
    server.await.unwrap();
}

#[tokio::test]
async fn ping_measures_round_trip() {
    let (client_io, server_io) = duplex(4096);
    let server = echo_server(server_io);

    let (mut ws, _) = connect(client_io, "example.com", "/", Config::default())
        .await
        .unwrap();

    assert!(ws.last_rtt().is_none());
    ws.ping(b"latency").await.unwrap();

    // The server answers pings while polling for messages.
    let pong = ws.next().await.unwrap().unwrap();
    assert!(matches!(pong, Message::Pong(ref p) if p.as_ref() == b"latency"));
    assert!(ws.last_rtt().is_some());

    drop(ws);
    server.await.unwrap();
}

#[tokio::test]
async fn draft_version_negotiation() {
    for version in [Version::V4, Version::V7, Version::V8] {
        let (client_io, server_io) = duplex(16 * 1024);

        let server = tokio::spawn(async move {
            let acceptor = Acceptor::new(Config::default());
            let (mut ws, result) = acceptor.accept(server_io).await.unwrap();
            assert_eq!(result.version, version);
            let msg = ws.next().await.unwrap().unwrap();
            ws.send(msg).await.unwrap();
        });

        let (mut ws, result) = connect_with_version(
            client_io,
            "example.com",
            "/draft",
            version,
            Some("http://example.com"),
            None,
            Config::default(),
        )
        .await
        .unwrap();
        assert_eq!(result.version, version);

        ws.send(Message::text("draft traffic")).await.unwrap();
        let echo = ws.next().await.unwrap().unwrap();
        assert_eq!(echo.as_text(), Some("draft traffic"));

        drop(ws);
        server.await.unwrap();
    }
}

#[tokio::test]
async fn server_speaks_hixie_76() {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let (mut client_io, server_io) = duplex(4096);

    let server = tokio::spawn(async move {
        let acceptor = Acceptor::new(Config::default());
        let (mut ws, result) = acceptor.accept(server_io).await.unwrap();
        assert_eq!(result.version, Version::V0);
        assert_eq!(result.path, "/demo");

        let msg = ws.next().await.unwrap().unwrap();
        assert_eq!(msg.as_text(), Some("legacy hello"));
        ws.send(Message::text("legacy reply")).await.unwrap();

        // Peer-initiated 0xFF 0x00 close.
        let close = ws.next().await.unwrap().unwrap();
        assert!(close.is_close());
    });

    // Handshake from draft-hixie-thewebsocketprotocol-76, section 1.2.
    let request = b"GET /demo HTTP/1.1\r\n\
        Host: example.com\r\n\
        Connection: Upgrade\r\n\
        Sec-WebSocket-Key2: 12998 5 Y3 1  .P00\r\n\
        Upgrade: WebSocket\r\n\
        Sec-WebSocket-Key1: 4 @1  46546xW%0l 1 5\r\n\
        Origin: http://example.com\r\n\
        \r\n\
        ^n:ds[4U";
    client_io.write_all(request).await.unwrap();

    // Response headers end at the blank line; the 16-byte challenge answer
    // from the draft follows.
    let mut response = Vec::new();
    loop {
        let mut byte = [0u8; 1];
        client_io.read_exact(&mut byte).await.unwrap();
        response.push(byte[0]);
        if response.ends_with(b"\r\n\r\n") {
            break;
        }
    }
    let head = String::from_utf8(response).unwrap();
    assert!(head.contains("101 WebSocket Protocol Handshake"));
    assert!(head.contains("Sec-WebSocket-Location: ws://example.com/demo"));

    let mut answer = [0u8; 16];
    client_io.read_exact(&mut answer).await.unwrap();
    assert_eq!(&answer, b"8jKS'y:G*Co,Wxa-");

    // Legacy text framing both ways.
    client_io.write_all(b"\x00legacy hello\xFF").await.unwrap();

    let mut reply = [0u8; 14];
    client_io.read_exact(&mut reply).await.unwrap();
    assert_eq!(&reply, b"\x00legacy reply\xFF");

    client_io.write_all(&[0xFF, 0x00]).await.unwrap();
    server.await.unwrap();
}

#[tokio::test]
async fn unmasked_client_frame_is_refused_with_1002() {
    use tokio::io::AsyncWriteExt;

    let (client_io, server_io) = duplex(4096);

    let server = tokio::spawn(async move {
        let acceptor = Acceptor::new(Config::default());
        let (mut ws, _) = acceptor.accept(server_io).await.unwrap();
        let err = ws.next().await.unwrap().unwrap_err();
        assert_eq!(err.close_code(), 1002);
    });

    let (ws, _) = connect(client_io, "example.com", "/", Config::default())
        .await
        .unwrap();

    // Bypass the client encoder and write a raw unmasked text frame.
    let mut raw = ws.into_inner();
    raw.write_all(&[0x81, 0x03, b'b', b'a', b'd']).await.unwrap();
    raw.flush().await.unwrap();

    server.await.unwrap();
}
