//! One-shot HTTP server over a local TCP socket for client tests.
//!
//! The response has no `Content-Length`; its body ends when the connection
//! closes, and each chunk is written separately so clients see split reads.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// Canned response played back to the first connection.
pub(crate) struct StubReply {
    pub status: u16,
    pub content_type: &'static str,
    pub chunks: Vec<Vec<u8>>,
}

impl StubReply {
    pub fn json(status: u16, body: &str) -> Self {
        Self {
            status,
            content_type: "application/json",
            chunks: vec![body.as_bytes().to_vec()],
        }
    }

    pub fn event_stream(chunks: Vec<Vec<u8>>) -> Self {
        Self {
            status: 200,
            content_type: "text/event-stream",
            chunks,
        }
    }
}

/// Serve `reply` once. Returns the base URL and a handle resolving to the raw
/// request body.
pub(crate) async fn serve_once(reply: StubReply) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind stub");
    let addr = listener.local_addr().expect("stub addr");
    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.expect("accept");
        let body = read_request(&mut socket).await;
        let head = format!(
            "HTTP/1.1 {} Stub\r\nContent-Type: {}\r\nConnection: close\r\n\r\n",
            reply.status, reply.content_type
        );
        socket.write_all(head.as_bytes()).await.expect("write head");
        for chunk in &reply.chunks {
            socket.write_all(chunk).await.expect("write chunk");
            socket.flush().await.expect("flush chunk");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        socket.shutdown().await.expect("shutdown");
        body
    });
    (format!("http://{addr}"), handle)
}

/// An address nothing listens on.
pub(crate) async fn refused_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);
    format!("http://{addr}")
}

async fn read_request(socket: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        if let Some(end) = find(&buf, b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
            let length = head
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|value| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= end + 4 + length {
                return String::from_utf8_lossy(&buf[end + 4..end + 4 + length]).into_owned();
            }
        }
        let n = socket.read(&mut chunk).await.expect("read request");
        if n == 0 {
            return String::new();
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
