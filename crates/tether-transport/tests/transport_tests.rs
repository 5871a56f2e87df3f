//! Transport Layer Tests
//!
//! Tests for the WebSocket transport against a local echo server:
//! - Connection establishment
//! - Text and binary round trips
//! - Server-initiated close codes
//! - Client-initiated close
//! - Error handling

use bytes::Bytes;
use std::time::Duration;
use tether_core::Frame;
use tether_test_utils::{EchoServer, ECHO_CLOSE_PREFIX};
use tether_transport::{
    Transport, TransportError, TransportEvent, TransportReceiver, TransportSender,
    WebSocketTransport,
};
use tokio::time::timeout;

async fn next_event<R: TransportReceiver>(receiver: &mut R) -> TransportEvent {
    timeout(Duration::from_secs(5), receiver.recv())
        .await
        .expect("timed out waiting for transport event")
        .expect("event stream ended")
}

#[tokio::test]
async fn test_opened_is_first_event() {
    let server = EchoServer::start().await;
    let transport = WebSocketTransport::new();

    let (sender, mut receiver) = transport.connect(&server.url()).await.unwrap();

    assert!(matches!(next_event(&mut receiver).await, TransportEvent::Opened));
    assert!(sender.is_connected());
}

#[tokio::test]
async fn test_text_round_trip() {
    let server = EchoServer::start().await;
    let transport = WebSocketTransport::new();
    let (sender, mut receiver) = transport.connect(&server.url()).await.unwrap();
    next_event(&mut receiver).await;

    sender
        .send(Frame::Text(r#"{"topic":"prices","v":1}"#.into()))
        .await
        .unwrap();

    match next_event(&mut receiver).await {
        TransportEvent::Frame(Frame::Text(text)) => {
            assert_eq!(text, r#"{"topic":"prices","v":1}"#)
        }
        other => panic!("unexpected event: {:?}", other),
    }
}

#[tokio::test]
async fn test_binary_round_trip() {
    let server = EchoServer::start().await;
    let transport = WebSocketTransport::new();
    let (sender, mut receiver) = transport.connect(&server.url()).await.unwrap();
    next_event(&mut receiver).await;

    let payload = Bytes::from_static(&[0x00, 0xff, 0x10, 0x80]);
    sender.send(Frame::Binary(payload.clone())).await.unwrap();

    match next_event(&mut receiver).await {
        TransportEvent::Frame(Frame::Binary(data)) => assert_eq!(data, payload),
        other => panic!("unexpected event: {:?}", other),
    }
}

#[tokio::test]
async fn test_frames_arrive_in_order() {
    let server = EchoServer::start().await;
    let transport = WebSocketTransport::new();
    let (sender, mut receiver) = transport.connect(&server.url()).await.unwrap();
    next_event(&mut receiver).await;

    for i in 0..20 {
        sender.send(Frame::Text(format!("msg-{}", i))).await.unwrap();
    }

    for i in 0..20 {
        match next_event(&mut receiver).await {
            TransportEvent::Frame(Frame::Text(text)) => assert_eq!(text, format!("msg-{}", i)),
            other => panic!("unexpected event: {:?}", other),
        }
    }
}

#[tokio::test]
async fn test_server_close_code_is_reported() {
    let server = EchoServer::start().await;
    let transport = WebSocketTransport::new();
    let (sender, mut receiver) = transport.connect(&server.url()).await.unwrap();
    next_event(&mut receiver).await;

    sender
        .send(Frame::Text(format!("{}4001", ECHO_CLOSE_PREFIX)))
        .await
        .unwrap();

    match next_event(&mut receiver).await {
        TransportEvent::Closed { code, .. } => assert_eq!(code, 4001),
        other => panic!("unexpected event: {:?}", other),
    }
}

#[tokio::test]
async fn test_client_close_stops_sending() {
    let server = EchoServer::start().await;
    let transport = WebSocketTransport::new();
    let (sender, mut receiver) = transport.connect(&server.url()).await.unwrap();
    next_event(&mut receiver).await;

    sender.close(1000, "done").await.unwrap();
    assert!(!sender.is_connected());

    let result = sender.send(Frame::Text("late".into())).await;
    assert!(matches!(result, Err(TransportError::NotConnected)));
}

#[tokio::test]
async fn test_invalid_scheme_rejected() {
    let transport = WebSocketTransport::new();
    let result = transport.connect("http://127.0.0.1:1/").await;
    assert!(matches!(result, Err(TransportError::InvalidUrl(_))));
}

#[tokio::test]
async fn test_concurrent_connections() {
    let server = EchoServer::start().await;
    let transport = WebSocketTransport::new();

    let mut handles = Vec::new();
    for i in 0..5 {
        let transport = transport.clone();
        let url = server.url();
        handles.push(tokio::spawn(async move {
            let (sender, mut receiver) = transport.connect(&url).await.unwrap();
            next_event(&mut receiver).await;
            sender.send(Frame::Text(format!("client-{}", i))).await.unwrap();
            match next_event(&mut receiver).await {
                TransportEvent::Frame(Frame::Text(text)) => text == format!("client-{}", i),
                _ => false,
            }
        }));
    }

    for handle in handles {
        assert!(handle.await.unwrap());
    }
    assert_eq!(server.connection_count(), 5);
}
