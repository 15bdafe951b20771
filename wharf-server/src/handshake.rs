//! Upgrade handshake and raw-request routing
//!
//! The engine answers the HTTP side of the WebSocket handshake itself: it
//! reads the request head from the raw stream, validates the upgrade, writes
//! the 101 response, and only then hands the stream to the framing
//! collaborator. Requests that are not upgrade requests are routed to the
//! optional raw-request handler instead of ever becoming message
//! connections.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use bytes::Bytes;
use sha1::{Digest, Sha1};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

/// Accept-key suffix fixed by RFC 6455
const WEBSOCKET_MAGIC: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Only protocol version 13 is spoken
const WEBSOCKET_VERSION: &str = "13";

/// Upper bound on one request head
const MAX_HEAD_SIZE: usize = 8192;

/// Failures while reading or validating a request head
///
/// These never leave the accept path; each one turns into a log line and a
/// dropped or rejected connection.
#[derive(Debug, Error)]
pub(crate) enum HandshakeError {
    /// Head grew past [`MAX_HEAD_SIZE`] without a blank line
    #[error("request head exceeds {MAX_HEAD_SIZE} bytes")]
    HeadTooLarge,

    /// Peer closed the stream mid-head
    #[error("peer closed before completing the request head")]
    UnexpectedEof,

    /// Head did not arrive within the handshake timeout
    #[error("timed out reading the request head")]
    Timeout,

    /// Head is not parseable HTTP
    #[error("malformed request head: {0}")]
    Malformed(String),

    /// Upgrade intent with an unusable handshake
    #[error("unusable upgrade request: {0}")]
    BadUpgrade(String),

    /// Transport failure while reading or writing the head
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// HTTP request head captured from a peer
///
/// Header names are lowercased at parse time; repeated fields keep the last
/// value.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// Request method
    pub method: String,
    /// Request path
    pub path: String,
    /// Header fields, names lowercased
    pub headers: HashMap<String, String>,
    /// Peer socket address
    pub remote_addr: SocketAddr,
}

impl HttpRequest {
    /// Look up a header by name, case-insensitively
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }
}

/// The original upgrade request, delivered with the connect notification
pub type UpgradeRequest = HttpRequest;

/// Response produced by a raw-request handler
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// Status code
    pub status: u16,
    /// Reason phrase
    pub reason: String,
    /// Additional header fields
    pub headers: Vec<(String, String)>,
    /// Response body
    pub body: Bytes,
}

impl HttpResponse {
    /// Create an empty response with the given status
    pub fn new(status: u16, reason: impl Into<String>) -> Self {
        Self {
            status,
            reason: reason.into(),
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    /// Create a 200 response carrying a text/plain body
    pub fn text(body: impl Into<String>) -> Self {
        Self::new(200, "OK")
            .with_header("Content-Type", "text/plain; charset=utf-8")
            .with_body(body.into())
    }

    /// Create a 404 response with no body
    pub fn not_found() -> Self {
        Self::new(404, "Not Found")
    }

    /// Add a header field
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Replace the body
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Render the response to wire bytes; Content-Length is always written
    pub(crate) fn render(&self) -> Vec<u8> {
        let mut out = format!("HTTP/1.1 {} {}\r\n", self.status, self.reason).into_bytes();
        for (name, value) in &self.headers {
            out.extend_from_slice(format!("{}: {}\r\n", name, value).as_bytes());
        }
        out.extend_from_slice(
            format!("Content-Length: {}\r\nConnection: close\r\n\r\n", self.body.len()).as_bytes(),
        );
        out.extend_from_slice(&self.body);
        out
    }
}

/// Application hook for plain HTTP requests arriving on a listener
///
/// Invoked for every request that is not a WebSocket upgrade. Request bodies
/// are not delivered; the hook sees the head only. Without a configured
/// handler the engine answers 400 Bad Request.
#[async_trait]
pub trait HttpRequestHandler: Send + Sync {
    /// Produce the response for one request
    async fn handle(&self, request: HttpRequest) -> HttpResponse;
}

/// Read one request head, stopping at the blank line
///
/// Accumulates chunks until the header terminator arrives, bounded by
/// [`MAX_HEAD_SIZE`] and by the handshake timeout.
pub(crate) async fn read_request_head<S>(
    stream: &mut S,
    handshake_timeout: Duration,
) -> Result<Vec<u8>, HandshakeError>
where
    S: AsyncRead + Unpin,
{
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 1024];

    let read_result = timeout(handshake_timeout, async {
        loop {
            let n = stream.read(&mut chunk).await?;
            if n == 0 {
                return Err(HandshakeError::UnexpectedEof);
            }

            buffer.extend_from_slice(&chunk[..n]);

            // End of headers (double CRLF)
            if buffer.windows(4).any(|w| w == b"\r\n\r\n") {
                return Ok(());
            }

            if buffer.len() > MAX_HEAD_SIZE {
                return Err(HandshakeError::HeadTooLarge);
            }
        }
    })
    .await;

    match read_result {
        Ok(Ok(())) => Ok(buffer),
        Ok(Err(e)) => Err(e),
        Err(_) => Err(HandshakeError::Timeout),
    }
}

/// Parse a request head, returning the request and the head length in bytes
///
/// Bytes past the returned length were pipelined after the head and belong
/// to whatever follows the handshake.
pub(crate) fn parse_request(
    head: &[u8],
    remote_addr: SocketAddr,
) -> Result<(HttpRequest, usize), HandshakeError> {
    let mut header_storage = [httparse::EMPTY_HEADER; 64];
    let mut parsed = httparse::Request::new(&mut header_storage);

    let head_len = match parsed
        .parse(head)
        .map_err(|e| HandshakeError::Malformed(e.to_string()))?
    {
        httparse::Status::Complete(len) => len,
        httparse::Status::Partial => {
            return Err(HandshakeError::Malformed("incomplete request head".to_string()));
        }
    };

    let mut headers = HashMap::with_capacity(parsed.headers.len());
    for header in parsed.headers.iter() {
        headers.insert(
            header.name.to_ascii_lowercase(),
            String::from_utf8_lossy(header.value).into_owned(),
        );
    }

    let request = HttpRequest {
        method: parsed.method.unwrap_or("GET").to_string(),
        path: parsed.path.unwrap_or("/").to_string(),
        headers,
        remote_addr,
    };

    Ok((request, head_len))
}

/// Check whether a request declares WebSocket upgrade intent
pub(crate) fn is_upgrade_request(request: &HttpRequest) -> bool {
    let upgrade = request
        .header("upgrade")
        .map(|v| v.to_ascii_lowercase().contains("websocket"))
        .unwrap_or(false);
    let connection = request
        .header("connection")
        .map(|v| v.to_ascii_lowercase().contains("upgrade"))
        .unwrap_or(false);
    upgrade && connection
}

/// Validate an upgrade request and extract the client key
pub(crate) fn validate_upgrade(request: &HttpRequest) -> Result<&str, HandshakeError> {
    if !request.method.eq_ignore_ascii_case("GET") {
        return Err(HandshakeError::BadUpgrade(format!(
            "method {} is not GET",
            request.method
        )));
    }

    match request.header("sec-websocket-version") {
        Some(WEBSOCKET_VERSION) => {}
        Some(other) => {
            return Err(HandshakeError::BadUpgrade(format!(
                "unsupported protocol version {}",
                other
            )));
        }
        None => {
            return Err(HandshakeError::BadUpgrade(
                "missing Sec-WebSocket-Version".to_string(),
            ));
        }
    }

    request
        .header("sec-websocket-key")
        .filter(|key| !key.is_empty())
        .ok_or_else(|| HandshakeError::BadUpgrade("missing Sec-WebSocket-Key".to_string()))
}

/// Compute the Sec-WebSocket-Accept value for a client key
pub(crate) fn compute_accept_key(client_key: &str) -> String {
    let combined = format!("{}{}", client_key, WEBSOCKET_MAGIC);
    let hash = Sha1::digest(combined.as_bytes());
    general_purpose::STANDARD.encode(hash)
}

/// Render the 101 response completing an upgrade
pub(crate) fn upgrade_response(accept_key: &str) -> String {
    format!(
        "HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Accept: {}\r\n\r\n",
        accept_key
    )
}

/// Render a bodyless response for the rejection paths
pub(crate) fn simple_response(status: u16, reason: &str) -> String {
    format!(
        "HTTP/1.1 {} {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        status, reason
    )
}

/// Write response bytes and flush
pub(crate) async fn write_response<S>(stream: &mut S, bytes: &[u8]) -> std::io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    stream.write_all(bytes).await?;
    stream.flush().await
}
