//! WebSocketConnector against a loopback tungstenite server.

use futures::SinkExt;
use siem_lite::channel::{StreamConnection, StreamConnector, WebSocketConnector};
use siem_lite::event_processing::StreamMessage;
use tokio::net::TcpListener;
use tokio_test::{assert_err, assert_ok};
use tokio_tungstenite::tungstenite::Message;

/// Serve `frames` to the first client, then close the socket.
async fn serve_frames(frames: Vec<Message>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut socket = tokio_tungstenite::accept_async(tcp).await.unwrap();
        for frame in frames {
            socket.send(frame).await.unwrap();
        }
        let _ = socket.close(None).await;
    });

    format!("ws://{}/api/socket", addr)
}

#[tokio::test]
async fn should_decode_text_and_binary_frames() {
    let new_log = r#"{"event":"new_log","data":{"timestamp":"2024-01-16T14:30:00Z","ip":"10.0.0.5","event":"LOGIN_FAILED"}}"#;
    let stats = r#"{"event":"stats_update","data":{"totalLogs":3}}"#;
    let url = serve_frames(vec![
        Message::Text(new_log.to_string()),
        Message::Binary(stats.as_bytes().to_vec()),
    ])
    .await;

    let mut connection = assert_ok!(WebSocketConnector::new(url).connect().await);

    match connection.next_message().await {
        Some(Ok(StreamMessage::NewLog(event))) => {
            assert_eq!(event.actor_address, "10.0.0.5");
            assert_eq!(event.event_type, "LOGIN_FAILED");
        }
        other => panic!("Expected new_log, got {:?}", other),
    }
    match connection.next_message().await {
        Some(Ok(StreamMessage::StatsUpdate(stats))) => assert_eq!(stats.total_logs, Some(3)),
        other => panic!("Expected stats_update, got {:?}", other),
    }
}

#[tokio::test]
async fn should_end_connection_when_server_closes() {
    let url = serve_frames(Vec::new()).await;

    let mut connection = assert_ok!(WebSocketConnector::new(url).connect().await);

    assert!(connection.next_message().await.is_none());
}

#[tokio::test]
async fn should_report_malformed_frame_without_closing() {
    let url = serve_frames(vec![
        Message::Text("not json".to_string()),
        Message::Text(r#"{"event":"new_alert","data":{"id":7}}"#.to_string()),
    ])
    .await;

    let mut connection = assert_ok!(WebSocketConnector::new(url).connect().await);

    let first = connection.next_message().await.unwrap();
    assert!(!assert_err!(first).is_transport());
    assert!(matches!(
        connection.next_message().await,
        Some(Ok(StreamMessage::NewAlert(_)))
    ));
}

#[tokio::test]
async fn should_fail_to_connect_to_closed_port() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let result = WebSocketConnector::new(format!("ws://{}", addr)).connect().await;

    assert!(result.err().map(|e| e.is_transport()).unwrap_or(false));
}
