//! Loopback servers for socket-bound tests.
//!
//! [`mock_server`] starts a wiremock portal. [`spawn_raw_portal`] serves the
//! same session and captcha endpoints from a bare TCP listener, so archive
//! bodies can be paced, cut short or given a false `Content-Length`, which
//! wiremock cannot do.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use wiremock::MockServer;

use super::portal::{CAPTCHA_PATH, INDEX_PATH, STATE_DOWNLOAD_PATH, captcha_png};

/// Set to `1`, `true` or `yes` to fail instead of skipping without loopback.
const REQUIRE_SOCKETS_ENV: &str = "SICAR_REQUIRE_SOCKET_TESTS";

/// Returns `true` (after a notice) when 127.0.0.1 cannot be bound.
fn loopback_unavailable() -> bool {
    let error = match std::net::TcpListener::bind("127.0.0.1:0") {
        Ok(_) => return false,
        Err(error) => error,
    };
    let required = std::env::var(REQUIRE_SOCKETS_ENV)
        .is_ok_and(|value| matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes"));
    assert!(
        !required,
        "loopback bind failed ({error}) and {REQUIRE_SOCKETS_ENV} is set"
    );
    eprintln!("loopback bind failed ({error}); skipping portal test");
    true
}

/// Starts a wiremock server, or `None` when sockets are unavailable.
pub async fn mock_server() -> Option<MockServer> {
    if loopback_unavailable() {
        None
    } else {
        Some(MockServer::start().await)
    }
}

/// How the raw portal answers `downloadBase`.
#[derive(Debug, Clone)]
pub struct ArchiveScript {
    /// `Content-Length` to announce; `None` leaves the body close-delimited.
    pub content_length: Option<u64>,
    /// Body pieces, written in order.
    pub chunks: Vec<Vec<u8>>,
    /// Pause before each piece after the first.
    pub chunk_delay: Duration,
    /// How long the connection stays open after the last piece.
    pub hold_open: Duration,
}

impl ArchiveScript {
    /// A correctly framed body sent in one piece.
    pub fn whole(body: Vec<u8>) -> Self {
        Self {
            content_length: Some(body.len() as u64),
            chunks: vec![body],
            chunk_delay: Duration::ZERO,
            hold_open: Duration::ZERO,
        }
    }

    /// A correctly framed body trickled out `piece` bytes at a time.
    pub fn trickle(body: &[u8], piece: usize, delay: Duration) -> Self {
        Self {
            content_length: Some(body.len() as u64),
            chunks: body.chunks(piece).map(<[u8]>::to_vec).collect(),
            chunk_delay: delay,
            hold_open: Duration::ZERO,
        }
    }

    /// Announces `declared` bytes regardless of what is sent.
    pub fn declaring(mut self, declared: u64) -> Self {
        self.content_length = Some(declared);
        self
    }

    /// Keeps the socket open, silent, after the last piece.
    pub fn then_stall(mut self, hold_open: Duration) -> Self {
        self.hold_open = hold_open;
        self
    }
}

/// Serves a minimal portal on a loopback port and returns its base URL.
///
/// Every answer carries `Connection: close`, so each request arrives on a
/// fresh connection.
pub async fn spawn_raw_portal(script: ArchiveScript) -> Option<String> {
    if loopback_unavailable() {
        return None;
    }
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind raw portal");
    let addr = listener.local_addr().expect("raw portal address");
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(answer(stream, script.clone()));
        }
    });
    Some(format!("http://{addr}"))
}

async fn answer(mut stream: TcpStream, script: ArchiveScript) {
    let Some(request_path) = read_request_path(&mut stream).await else {
        return;
    };
    let _ = match request_path.as_str() {
        INDEX_PATH => {
            let head = "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nSet-Cookie: JSESSIONID=raw-session; Path=/\r\n";
            write_whole(&mut stream, head, b"<html>SICAR</html>").await
        }
        CAPTCHA_PATH => {
            let head = "HTTP/1.1 200 OK\r\nContent-Type: image/png\r\n";
            write_whole(&mut stream, head, &captcha_png()).await
        }
        STATE_DOWNLOAD_PATH => write_archive(&mut stream, &script).await,
        _ => write_whole(&mut stream, "HTTP/1.1 404 Not Found\r\n", b"").await,
    };
}

/// Reads the request head and returns its path without the query.
async fn read_request_path(stream: &mut TcpStream) -> Option<String> {
    let mut head = Vec::new();
    let mut buf = [0_u8; 1024];
    while !head.windows(4).any(|window| window == b"\r\n\r\n") {
        let read = stream.read(&mut buf).await.ok()?;
        if read == 0 {
            return None;
        }
        head.extend_from_slice(&buf[..read]);
    }
    let head = String::from_utf8_lossy(&head);
    let target = head.split_whitespace().nth(1)?;
    target.split('?').next().map(str::to_string)
}

async fn write_whole(stream: &mut TcpStream, head: &str, body: &[u8]) -> std::io::Result<()> {
    let framing = format!("Content-Length: {}\r\nConnection: close\r\n\r\n", body.len());
    stream.write_all(head.as_bytes()).await?;
    stream.write_all(framing.as_bytes()).await?;
    stream.write_all(body).await?;
    stream.shutdown().await
}

async fn write_archive(stream: &mut TcpStream, script: &ArchiveScript) -> std::io::Result<()> {
    let mut head = String::from("HTTP/1.1 200 OK\r\nContent-Type: application/zip\r\n");
    if let Some(length) = script.content_length {
        head.push_str(&format!("Content-Length: {length}\r\n"));
    }
    head.push_str("Connection: close\r\n\r\n");
    stream.write_all(head.as_bytes()).await?;

    for (index, chunk) in script.chunks.iter().enumerate() {
        if index > 0 {
            tokio::time::sleep(script.chunk_delay).await;
        }
        stream.write_all(chunk).await?;
        stream.flush().await?;
    }
    tokio::time::sleep(script.hold_open).await;
    stream.shutdown().await
}
