use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixListener;
use tokio::time::Instant;

use uranus_connector::{Connector, ConnectorError, UnixConnector};

#[tokio::test]
async fn test_unix_frames_are_newline_delimited() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hackernel.sock");
    let listener = UnixListener::bind(&path).unwrap();

    let kernel = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        let mut lines = BufReader::new(read_half).lines();
        let first = lines.next_line().await.unwrap().unwrap();
        write_half
            .write_all(b"{\"type\":\"osinfo::report\"}\n")
            .await
            .unwrap();
        first
    });

    let connector = UnixConnector::new(&path);
    connector.connect().await.unwrap();
    connector.send(r#"{"type":"user::proc::enable"}"#).await.unwrap();

    let frame = connector.receive().await.unwrap();
    assert_eq!(frame, r#"{"type":"osinfo::report"}"#);
    assert_eq!(kernel.await.unwrap(), r#"{"type":"user::proc::enable"}"#);

    connector.close().await.unwrap();
    assert!(matches!(connector.send("x").await, Err(ConnectorError::NotConnected)));
}

#[tokio::test]
async fn test_unix_peer_hang_up_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hackernel.sock");
    let listener = UnixListener::bind(&path).unwrap();

    let kernel = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        drop(stream);
    });

    let connector = UnixConnector::new(&path);
    connector.connect().await.unwrap();
    kernel.await.unwrap();

    assert!(matches!(connector.receive().await, Err(ConnectorError::Closed)));
}

#[tokio::test]
async fn test_unix_shutdown_unblocks_receive() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hackernel.sock");
    let listener = UnixListener::bind(&path).unwrap();

    let kernel = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        // Hold the stream open without writing.
        tokio::time::sleep(Duration::from_secs(30)).await;
        drop(stream);
    });

    let connector = Arc::new(UnixConnector::new(&path));
    connector.connect().await.unwrap();

    let pending = {
        let connector = connector.clone();
        tokio::spawn(async move { connector.receive().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    connector.shutdown(Instant::now()).await.unwrap();

    let result = tokio::time::timeout(Duration::from_secs(5), pending)
        .await
        .expect("receive should be released by shutdown")
        .unwrap();
    assert!(matches!(result, Err(ConnectorError::Shutdown)));

    connector.close().await.unwrap();
    kernel.abort();
}

#[tokio::test]
async fn test_unix_connect_without_listener_fails() {
    let dir = tempfile::tempdir().unwrap();
    let connector = UnixConnector::new(dir.path().join("missing.sock"));
    assert!(matches!(connector.connect().await, Err(ConnectorError::Io(_))));
}

#[tokio::test]
async fn test_unix_non_utf8_frame_keeps_channel_open() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hackernel.sock");
    let listener = UnixListener::bind(&path).unwrap();

    let kernel = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        stream
            .write_all(b"{\"type\":\"audit::proc::report\",\"cmd\":\"/tmp/\xff\x1f/bin/ls\",\"judge\":1}\n")
            .await
            .unwrap();
        stream
            .write_all(b"{\"type\":\"osinfo::report\"}\r\n")
            .await
            .unwrap();
        stream
    });

    let connector = UnixConnector::new(&path);
    connector.connect().await.unwrap();

    let bad = connector.receive().await;
    assert!(matches!(bad, Err(ConnectorError::InvalidFrame(_))));
    assert!(bad.unwrap_err().is_frame_error());
    assert_eq!(connector.receive().await.unwrap(), r#"{"type":"osinfo::report"}"#);

    connector.close().await.unwrap();
    drop(kernel.await.unwrap());
}
