//! End-to-end lookup protocol scenarios over loopback TCP

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use swarmq_common::DirectoryConfig;
use swarmq_directory::directory::Directory;
use swarmq_protocol::{read_len_prefixed, Command, MAGIC_V1};

async fn start_directory() -> Arc<Directory> {
    let mut config = DirectoryConfig::default();
    config.tcp_address = "127.0.0.1:0".to_string();
    config.http_address = "127.0.0.1:0".to_string();
    config.broadcast_address = "127.0.0.1".to_string();

    let directory = Directory::new(config).await.expect("failed to bind directory");
    let runner = directory.clone();
    tokio::spawn(async move {
        let _ = runner.main().await;
    });
    directory
}

async fn connect(directory: &Directory) -> TcpStream {
    let mut stream = TcpStream::connect(directory.tcp_addr())
        .await
        .expect("failed to connect");
    stream.write_all(MAGIC_V1).await.expect("failed to send magic");
    stream
}

async fn send(stream: &mut TcpStream, command: Command) -> Vec<u8> {
    let bytes = command.to_bytes().expect("failed to encode command");
    stream.write_all(&bytes).await.expect("failed to send command");
    read_len_prefixed(stream).await.expect("failed to read reply")
}

async fn identify(stream: &mut TcpStream) -> serde_json::Value {
    let reply = send(
        stream,
        Command::Identify {
            body: json!({
                "broadcast_address": "host.example",
                "hostname": "test-host",
                "tcp_port": 4150,
                "http_port": 4151,
                "version": "1.0",
            }),
        },
    )
    .await;
    serde_json::from_slice(&reply).expect("identify reply should decode as JSON")
}

async fn read_eof(stream: &mut TcpStream) {
    let mut buf = [0u8; 16];
    let n = stream.read(&mut buf).await.expect("read after close");
    assert_eq!(n, 0, "server should have closed the connection");
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..250 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn test_handshake_and_register_topic() {
    let directory = start_directory().await;
    let mut stream = connect(&directory).await;

    let reply = identify(&mut stream).await;
    assert!(!reply["version"].as_str().unwrap_or_default().is_empty());
    assert_eq!(
        reply["tcp_port"].as_u64().unwrap(),
        directory.tcp_addr().port() as u64
    );
    assert_eq!(
        reply["http_port"].as_u64().unwrap(),
        directory.http_addr().port() as u64
    );

    let reply = send(
        &mut stream,
        Command::Register {
            topic: "orders".to_string(),
            channel: None,
        },
    )
    .await;
    assert_eq!(reply, b"OK");

    let producers = directory.db.find_producers("topic", "orders", "");
    assert_eq!(producers.len(), 1);
    assert_eq!(
        producers[0].peer_info.id,
        stream.local_addr().unwrap().to_string()
    );
}

#[tokio::test]
async fn test_ephemeral_channel_cleanup() {
    let directory = start_directory().await;
    let mut stream = connect(&directory).await;
    identify(&mut stream).await;

    let reply = send(
        &mut stream,
        Command::Register {
            topic: "orders".to_string(),
            channel: Some("payments#ephemeral".to_string()),
        },
    )
    .await;
    assert_eq!(reply, b"OK");
    assert_eq!(
        directory
            .db
            .find_registrations("channel", "orders", "payments#ephemeral")
            .len(),
        1
    );

    let reply = send(
        &mut stream,
        Command::Unregister {
            topic: "orders".to_string(),
            channel: Some("payments#ephemeral".to_string()),
        },
    )
    .await;
    assert_eq!(reply, b"OK");

    // the emptied ephemeral registration is gone entirely
    assert!(directory
        .db
        .find_registrations("channel", "orders", "payments#ephemeral")
        .is_empty());
}

#[tokio::test]
async fn test_register_before_identify_is_fatal() {
    let directory = start_directory().await;
    let mut stream = connect(&directory).await;

    let reply = send(
        &mut stream,
        Command::Register {
            topic: "x".to_string(),
            channel: None,
        },
    )
    .await;
    assert_eq!(reply, b"E_INVALID client must IDENTIFY");
    read_eof(&mut stream).await;
}

#[tokio::test]
async fn test_bad_topic_name_is_fatal() {
    let directory = start_directory().await;
    let mut stream = connect(&directory).await;
    identify(&mut stream).await;

    let reply = send(
        &mut stream,
        Command::Register {
            topic: "bad/name".to_string(),
            channel: None,
        },
    )
    .await;
    assert!(reply.starts_with(b"E_BAD_TOPIC"));
    read_eof(&mut stream).await;
}

#[tokio::test]
async fn test_identify_missing_fields_is_fatal() {
    let directory = start_directory().await;
    let mut stream = connect(&directory).await;

    let reply = send(
        &mut stream,
        Command::Identify {
            body: json!({ "broadcast_address": "host.example" }),
        },
    )
    .await;
    assert_eq!(reply, b"E_BAD_BODY IDENTIFY missing fields");
    read_eof(&mut stream).await;
}

#[tokio::test]
async fn test_identify_twice_is_fatal() {
    let directory = start_directory().await;
    let mut stream = connect(&directory).await;
    identify(&mut stream).await;

    let reply = send(
        &mut stream,
        Command::Identify {
            body: json!({
                "broadcast_address": "host.example",
                "tcp_port": 4150,
                "http_port": 4151,
                "version": "1.0",
            }),
        },
    )
    .await;
    assert_eq!(reply, b"E_INVALID cannot IDENTIFY again");
    read_eof(&mut stream).await;
}

#[tokio::test]
async fn test_ping_updates_heartbeat() {
    let directory = start_directory().await;

    // PING is allowed before IDENTIFY and is a no-op then
    let mut stream = connect(&directory).await;
    let reply = send(&mut stream, Command::Ping).await;
    assert_eq!(reply, b"OK");

    identify(&mut stream).await;
    let producers = directory.db.find_producers("client", "", "");
    assert_eq!(producers.len(), 1);
    let before = producers[0].peer_info.last_update();
    assert!(before > 0);

    tokio::time::sleep(Duration::from_millis(5)).await;
    let reply = send(&mut stream, Command::Ping).await;
    assert_eq!(reply, b"OK");
    assert!(producers[0].peer_info.last_update() > before);
}

#[tokio::test]
async fn test_disconnect_cleanup() {
    let directory = start_directory().await;
    let mut stream = connect(&directory).await;
    identify(&mut stream).await;

    let reply = send(
        &mut stream,
        Command::Register {
            topic: "orders".to_string(),
            channel: Some("payments".to_string()),
        },
    )
    .await;
    assert_eq!(reply, b"OK");
    assert_eq!(directory.db.find_producers("topic", "orders", "").len(), 1);

    drop(stream);

    wait_until(|| directory.db.find_producers("topic", "orders", "").is_empty()).await;
    assert!(directory
        .db
        .find_producers("channel", "orders", "payments")
        .is_empty());
    // the non-ephemeral channel key survives with an empty producer set
    assert_eq!(
        directory
            .db
            .find_registrations("channel", "orders", "payments")
            .len(),
        1
    );
}

#[tokio::test]
async fn test_unregister_topic_sweeps_channels() {
    let directory = start_directory().await;
    let mut stream = connect(&directory).await;
    identify(&mut stream).await;

    send(
        &mut stream,
        Command::Register {
            topic: "orders".to_string(),
            channel: Some("payments".to_string()),
        },
    )
    .await;

    let reply = send(
        &mut stream,
        Command::Unregister {
            topic: "orders".to_string(),
            channel: None,
        },
    )
    .await;
    assert_eq!(reply, b"OK");

    assert!(directory.db.find_producers("topic", "orders", "").is_empty());
    assert!(directory
        .db
        .find_producers("channel", "orders", "payments")
        .is_empty());
}

#[tokio::test]
async fn test_bad_magic_closes_connection() {
    let directory = start_directory().await;
    let mut stream = TcpStream::connect(directory.tcp_addr())
        .await
        .expect("failed to connect");
    stream.write_all(b"  V9").await.expect("failed to send magic");

    let reply = read_len_prefixed(&mut stream).await.expect("failed to read reply");
    assert_eq!(reply, b"E_BAD_PROTOCOL");
    read_eof(&mut stream).await;
}

#[tokio::test]
async fn test_unknown_command_is_fatal() {
    let directory = start_directory().await;
    let mut stream = connect(&directory).await;

    stream.write_all(b"BOGUS\n").await.expect("failed to send");
    let reply = read_len_prefixed(&mut stream).await.expect("failed to read reply");
    assert_eq!(reply, b"E_INVALID invalid command BOGUS");
    read_eof(&mut stream).await;
}
