//! End-to-end scenarios against a live server, talking the wire protocol
//! directly over a real TCP socket.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

/// Bind on an ephemeral port, spawn the server on it, and return the port
/// the client should connect to.
async fn spawn_server() -> u16 {
    let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let commands = std::sync::Arc::new(bluebox::commands::CommandTable::new());
    let store = std::sync::Arc::new(bluebox::store::Store::new());
    let stats = std::sync::Arc::new(bluebox::stats::Stats::new());

    tokio::spawn(async move {
        loop {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::spawn(bluebox::connection::handle(
                socket,
                std::sync::Arc::clone(&commands),
                std::sync::Arc::clone(&store),
                std::sync::Arc::clone(&stats),
            ));
        }
    });

    port
}

async fn connect(port: u16) -> TcpStream {
    TcpStream::connect(("127.0.0.1", port)).await.unwrap()
}

async fn roundtrip(stream: &mut TcpStream, request: &[u8], expect: &[u8]) {
    stream.write_all(request).await.unwrap();
    let mut buf = vec![0u8; expect.len()];
    timeout(Duration::from_secs(5), stream.read_exact(&mut buf))
        .await
        .expect("timed out waiting for reply")
        .unwrap();
    assert_eq!(buf, expect);
}

#[tokio::test]
async fn inline_ping() {
    let port = spawn_server().await;
    let mut stream = connect(port).await;
    roundtrip(&mut stream, b"PING\r\n", b"+PONG\r\n").await;
}

#[tokio::test]
async fn multibulk_ping() {
    let port = spawn_server().await;
    let mut stream = connect(port).await;
    roundtrip(&mut stream, b"*1\r\n$4\r\nPING\r\n", b"+PONG\r\n").await;
}

#[tokio::test]
async fn ping_with_message() {
    let port = spawn_server().await;
    let mut stream = connect(port).await;
    roundtrip(
        &mut stream,
        b"*2\r\n$4\r\nping\r\n$5\r\nhello\r\n",
        b"$5\r\nhello\r\n",
    )
    .await;
}

#[tokio::test]
async fn set_then_get() {
    let port = spawn_server().await;
    let mut stream = connect(port).await;
    roundtrip(
        &mut stream,
        b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$1\r\nv\r\n",
        b"+OK\r\n",
    )
    .await;
    roundtrip(&mut stream, b"*2\r\n$3\r\nGET\r\n$1\r\nk\r\n", b"$1\r\nv\r\n").await;
}

#[tokio::test]
async fn get_missing_is_null_bulk() {
    let port = spawn_server().await;
    let mut stream = connect(port).await;
    roundtrip(
        &mut stream,
        b"*2\r\n$3\r\nGET\r\n$7\r\nmissing\r\n",
        b"$-1\r\n",
    )
    .await;
}

#[tokio::test]
async fn del_and_dbsize() {
    let port = spawn_server().await;
    let mut stream = connect(port).await;
    roundtrip(
        &mut stream,
        b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$1\r\nv\r\n",
        b"+OK\r\n",
    )
    .await;
    roundtrip(
        &mut stream,
        b"*3\r\n$3\r\nDEL\r\n$1\r\nk\r\n$1\r\nx\r\n",
        b":1\r\n",
    )
    .await;
    roundtrip(&mut stream, b"*1\r\n$6\r\nDBSIZE\r\n", b":0\r\n").await;
}

#[tokio::test]
async fn unknown_inline_command_keeps_connection_open() {
    let port = spawn_server().await;
    let mut stream = connect(port).await;
    roundtrip(
        &mut stream,
        b"hello world\r\n",
        b"-ERR unknown command\r\n",
    )
    .await;
    // the connection is still usable afterwards
    roundtrip(&mut stream, b"PING\r\n", b"+PONG\r\n").await;
}

#[tokio::test]
async fn bad_bulk_prefix_closes_connection() {
    let port = spawn_server().await;
    let mut stream = connect(port).await;
    roundtrip(
        &mut stream,
        b"%1\r\n",
        b"-ERR Protocol error: expected '$', got '%'\r\n",
    )
    .await;
    let mut buf = [0u8; 1];
    let n = timeout(Duration::from_secs(5), stream.read(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(n, 0, "connection should be closed after a protocol error");
}

#[tokio::test]
async fn quit_closes_after_reply() {
    let port = spawn_server().await;
    let mut stream = connect(port).await;
    roundtrip(&mut stream, b"*1\r\n$4\r\nQUIT\r\n", b"+OK\r\n").await;
    let mut buf = [0u8; 1];
    let n = timeout(Duration::from_secs(5), stream.read(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(n, 0, "connection should be closed after QUIT");
}

#[tokio::test]
async fn empty_bulk_round_trips() {
    let port = spawn_server().await;
    let mut stream = connect(port).await;
    roundtrip(
        &mut stream,
        b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$0\r\n\r\n",
        b"+OK\r\n",
    )
    .await;
    roundtrip(&mut stream, b"*2\r\n$3\r\nGET\r\n$1\r\nk\r\n", b"$0\r\n\r\n").await;
}
