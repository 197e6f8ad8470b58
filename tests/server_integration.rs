//! End-to-end integration test: a real `PixnetServer` over a loopback TCP
//! socket, driven by a hand-rolled client using the same framed wire codec
//! (§8 scenario 1: handshake → frame → event → graceful close).

use std::collections::HashMap;
use std::time::Duration;

use pixnet::page::{Behavior, CategoryDef, CategoryMap, Page, PixelBuffer, PixelFormat};
use pixnet::session::{read_framed, write_framed, SUPPORTED_VERSION};
use pixnet::wire::messages::{Ack, Capabilities, Event, Handshake};
use pixnet::wire::Message;
use pixnet::{PixnetServer, ServerConfig, ServerEvent};

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

fn test_page() -> Page {
    let mut categories = HashMap::new();
    categories.insert(
        1,
        CategoryDef {
            id: 1,
            name: "button".to_string(),
            priority: 0,
            behavior: Behavior::EmitEvent {
                event_name: "click".to_string(),
                event_type: "ui".to_string(),
                debounce_ms: 50,
            },
            extended_properties: Vec::new(),
        },
    );
    Page {
        pixels: PixelBuffer::new(2, 2, PixelFormat::Rgba8, vec![0u8; 16]).unwrap(),
        category_map: CategoryMap::new(2, 2, vec![1, 0, 0, 0]).unwrap(),
        categories,
        metadata: None,
        animation: None,
        audio: None,
        extended_metadata: None,
    }
}

async fn read_one(stream: &mut TcpStream, buf: &mut BytesMut) -> Message {
    loop {
        if let Some(msg) = read_framed(buf).unwrap() {
            return msg;
        }
        let n = stream.read_buf(buf).await.unwrap();
        assert!(n > 0, "server closed connection unexpectedly");
    }
}

#[tokio::test]
async fn full_handshake_frame_and_event_round_trip() {
    let config = ServerConfig::new().with_keepalive(Duration::from_secs(30), Duration::from_secs(10));
    let (server, mut events) = PixnetServer::new(config, Capabilities::default());

    let server_for_listen = server.clone();
    let listen_handle = tokio::spawn(async move {
        let _ = server_for_listen.listen(17621).await;
    });
    // Give the listener a moment to bind before connecting.
    tokio::time::sleep(Duration::from_millis(50)).await;

    server.publish_page(test_page()).await;

    let mut stream = TcpStream::connect(("127.0.0.1", 17621)).await.unwrap();
    let mut buf = BytesMut::with_capacity(4096);

    let handshake = Message::Handshake(Handshake {
        version: SUPPORTED_VERSION,
        capabilities: Capabilities::default(),
        user_agent: "integration-test".to_string(),
    });
    stream.write_all(&write_framed(&handshake, false).unwrap()).await.unwrap();

    let ack = read_one(&mut stream, &mut buf).await;
    let session_id = match ack {
        Message::Ack(Ack { session_id, .. }) => session_id,
        other => panic!("expected Ack, got {other:?}"),
    };
    assert_ne!(session_id, 0);

    match events.recv().await.unwrap() {
        ServerEvent::Connected { session_id: connected_id } => assert_eq!(connected_id, session_id),
        other => panic!("expected Connected, got {other:?}"),
    }

    // The page published before connecting should be pushed once active.
    let frame = read_one(&mut stream, &mut buf).await;
    assert!(matches!(frame, Message::Frame(_)));

    let event = Message::Event(Event {
        session_id,
        sequence: 0,
        zone_id: 1,
        event_type: 0,
        timestamp: 0,
        mouse_x: 0,
        mouse_y: 0,
        modifiers: 0,
        name: "click".to_string(),
        payload: Vec::new(),
    });
    stream.write_all(&write_framed(&event, false).unwrap()).await.unwrap();

    match events.recv().await.unwrap() {
        ServerEvent::Emit { session_id: emit_session, zone_id, name, .. } => {
            assert_eq!(emit_session, session_id);
            assert_eq!(zone_id, 1);
            assert_eq!(name, "click");
        }
        other => panic!("expected Emit, got {other:?}"),
    }

    drop(stream);
    listen_handle.abort();
}

#[tokio::test]
async fn version_mismatch_is_rejected_over_real_socket() {
    let (server, _events) = PixnetServer::new(ServerConfig::default(), Capabilities::default());
    let server_for_listen = server.clone();
    let listen_handle = tokio::spawn(async move {
        let _ = server_for_listen.listen(17622).await;
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let mut stream = TcpStream::connect(("127.0.0.1", 17622)).await.unwrap();
    let mut buf = BytesMut::with_capacity(4096);

    let handshake = Message::Handshake(Handshake {
        version: 99,
        capabilities: Capabilities::default(),
        user_agent: "integration-test".to_string(),
    });
    stream.write_all(&write_framed(&handshake, false).unwrap()).await.unwrap();

    let reply = read_one(&mut stream, &mut buf).await;
    assert!(matches!(reply, Message::Error(_)));

    listen_handle.abort();
}
