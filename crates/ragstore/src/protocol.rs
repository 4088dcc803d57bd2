//! Embedding server wire protocol.
//!
//! A long-lived sidecar keeps an embedding model warm; queries reach it
//! with one request and one reply over a fresh TCP connection per call.
//! Connections are never pooled: each call opens, exchanges and closes its
//! own channel, so concurrent callers share no connection state.
//!
//! Every message is `[u32 payload_len BE][payload]` where the payload is a
//! MessagePack map.
//!
//! - Request: `{chunks: [str], model_name: str, ...options}`
//! - Reply: `{embeddings: [[f32]]}`, or `{error: str}` when the server
//!   failed. A reply without `embeddings` is a protocol violation.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use ragstore_core::{Error, Options, Result};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};

use crate::embedding::{EmbedContext, EmbeddingProvider};
use crate::matrix::EmbeddingMatrix;

/// Largest payload either side will accept (256 MiB).
pub const MAX_FRAME_LEN: u32 = 256 * 1024 * 1024;

/// Default bound on waiting for a reply.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

// ── Messages ─────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct OutgoingRequest<'a> {
    chunks: &'a [&'a str],
    model_name: &'a str,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    options: Option<&'a Options>,
}

/// A request as decoded by the server.
#[derive(Debug, Clone, Deserialize)]
pub struct EmbedRequest {
    /// Texts to embed.
    pub chunks: Vec<String>,
    /// Model requested by the client.
    pub model_name: String,
    /// Any additional fields sent by the client.
    #[serde(flatten)]
    pub options: Options,
}

/// A reply as sent by the server.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmbedReply {
    /// One row per request chunk.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embeddings: Option<Vec<Vec<f32>>>,
    /// Server-side failure description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ── Framing ──────────────────────────────────────────────────────────

/// Write one length-prefixed frame.
pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    payload: &[u8],
) -> std::io::Result<()> {
    let len = u32::try_from(payload.len())
        .ok()
        .filter(|len| *len <= MAX_FRAME_LEN)
        .ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("frame too large: {} bytes", payload.len()),
            )
        })?;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await
}

/// Read one length-prefixed frame.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> std::io::Result<Vec<u8>> {
    let mut header = [0u8; 4];
    reader.read_exact(&mut header).await?;
    let len = u32::from_be_bytes(header);
    if len > MAX_FRAME_LEN {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("frame too large: {len} bytes"),
        ));
    }
    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload).await?;
    Ok(payload)
}

/// Request keys owned by the protocol; options may not override them.
const RESERVED_FIELDS: [&str; 2] = ["chunks", "model_name"];

/// Encode a request map.
///
/// Option keys that collide with `chunks` or `model_name` are dropped so
/// the map never carries duplicate keys.
pub fn encode_request(
    chunks: &[&str],
    model_name: &str,
    options: Option<&Options>,
) -> Result<Vec<u8>> {
    let filtered: Options;
    let options = match options {
        Some(opts) if RESERVED_FIELDS.iter().any(|key| opts.contains_key(*key)) => {
            log::warn!(
                "dropping reserved keys {RESERVED_FIELDS:?} from embedding request options"
            );
            filtered = opts
                .iter()
                .filter(|(key, _)| !RESERVED_FIELDS.contains(&key.as_str()))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect();
            Some(&filtered)
        }
        other => other,
    };
    rmp_serde::to_vec_named(&OutgoingRequest {
        chunks,
        model_name,
        options,
    })
    .map_err(|e| Error::serialization(format!("failed to encode embedding request: {e}")))
}

/// Decode a reply payload into a matrix.
///
/// Fails with a protocol violation when the payload is not a map, when
/// `embeddings` is absent, or when its rows are ragged.
pub fn decode_reply(payload: &[u8]) -> Result<EmbeddingMatrix> {
    // rmp-serde would otherwise fill struct fields from an array by position.
    if !is_map(payload) {
        return Err(Error::protocol("reply is not a MessagePack map"));
    }
    let reply: EmbedReply = rmp_serde::from_slice(payload)
        .map_err(|e| Error::protocol(format!("undecodable reply: {e}")))?;

    match (reply.embeddings, reply.error) {
        (Some(rows), _) => EmbeddingMatrix::from_rows(rows)
            .map_err(|e| Error::protocol(format!("malformed `embeddings`: {e}"))),
        (None, Some(message)) => Err(Error::protocol(format!(
            "reply is missing required field `embeddings` (server error: {message})"
        ))),
        (None, None) => Err(Error::protocol(
            "reply is missing required field `embeddings`",
        )),
    }
}

/// True when the payload starts with a fixmap, map16 or map32 marker.
fn is_map(payload: &[u8]) -> bool {
    matches!(payload.first().copied(), Some(0x80..=0x8f | 0xde | 0xdf))
}

// ── Client ───────────────────────────────────────────────────────────

/// Client for a running embedding server.
#[derive(Debug, Clone)]
pub struct EmbeddingServerClient {
    host: String,
    port: u16,
    timeout: Duration,
}

impl EmbeddingServerClient {
    /// Create a client for `host:port` with the default timeout.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Set the bound on waiting for a reply.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The `host:port` this client talks to.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The reply timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Embed `chunks` on the server.
    ///
    /// Opens a fresh connection, sends one request, waits at most the
    /// configured timeout for one reply, and closes the connection on
    /// every exit path. Connection failures are returned as
    /// [`Error::Transport`] without retrying; an expired wait is
    /// [`Error::Timeout`].
    pub async fn compute(
        &self,
        chunks: &[&str],
        model_name: &str,
        options: Option<&Options>,
    ) -> Result<EmbeddingMatrix> {
        let addr = self.addr();
        let payload = encode_request(chunks, model_name, options)?;

        let mut stream = match tokio::time::timeout(self.timeout, TcpStream::connect(&addr)).await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(Error::transport(&addr, e)),
            Err(_) => {
                return Err(Error::transport(
                    &addr,
                    std::io::Error::new(std::io::ErrorKind::TimedOut, "connect timed out"),
                ));
            }
        };
        log::debug!("sending {} chunks to embedding server at {addr}", chunks.len());

        let outcome = tokio::time::timeout(self.timeout, exchange(&mut stream, &payload)).await;

        // Best effort: the peer may already be gone. Dropping the stream
        // releases the socket either way.
        let _ = stream.shutdown().await;
        drop(stream);

        let reply = match outcome {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => return Err(Error::transport(&addr, e)),
            Err(_) => {
                log::warn!(
                    "embedding server at {addr} did not reply within {}ms",
                    self.timeout.as_millis()
                );
                return Err(Error::timeout(addr, self.timeout));
            }
        };

        decode_reply(&reply)
    }
}

async fn exchange(stream: &mut TcpStream, payload: &[u8]) -> std::io::Result<Vec<u8>> {
    write_frame(stream, payload).await?;
    read_frame(stream).await
}

// ── Server ───────────────────────────────────────────────────────────

/// Sidecar that answers embedding requests with a warm provider.
pub struct EmbeddingServer {
    listener: TcpListener,
    provider: Arc<dyn EmbeddingProvider>,
}

impl EmbeddingServer {
    /// Bind a listener. Use port 0 to let the OS choose.
    pub async fn bind(addr: impl ToSocketAddrs, provider: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener, provider })
    }

    /// The bound address.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// The bound port.
    pub fn port(&self) -> Result<u16> {
        Ok(self.local_addr()?.port())
    }

    /// Accept and answer exactly one connection.
    pub async fn serve_one(&self) -> Result<()> {
        let (stream, peer) = self.listener.accept().await?;
        handle_connection(stream, self.provider.as_ref())
            .await
            .map_err(|e| Error::transport(peer.to_string(), e))
    }

    /// Answer connections until the task is dropped.
    pub async fn serve(self) -> Result<()> {
        log::info!(
            "embedding server listening on {} with provider '{}'",
            self.local_addr()?,
            self.provider.name()
        );
        loop {
            let (stream, peer) = self.listener.accept().await?;
            let provider = Arc::clone(&self.provider);
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, provider.as_ref()).await {
                    log::warn!("embedding request from {peer} failed: {e}");
                }
            });
        }
    }
}

impl std::fmt::Debug for EmbeddingServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingServer")
            .field("addr", &self.listener.local_addr().ok())
            .field("provider", &self.provider.name())
            .finish()
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    provider: &dyn EmbeddingProvider,
) -> std::io::Result<()> {
    let payload = read_frame(&mut stream).await?;
    let reply = answer(&payload, provider).await;
    let bytes = rmp_serde::to_vec_named(&reply)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;
    write_frame(&mut stream, &bytes).await?;
    stream.shutdown().await
}

async fn answer(payload: &[u8], provider: &dyn EmbeddingProvider) -> EmbedReply {
    let request: EmbedRequest = match rmp_serde::from_slice(payload) {
        Ok(request) => request,
        Err(e) => {
            return EmbedReply {
                embeddings: None,
                error: Some(format!("undecodable request: {e}")),
            };
        }
    };

    let texts: Vec<&str> = request.chunks.iter().map(String::as_str).collect();
    let ctx = EmbedContext::new(&request.model_name).with_options(Some(&request.options));
    match provider.embed_batch(&texts, &ctx).await {
        Ok(rows) => EmbedReply {
            embeddings: Some(rows),
            error: None,
        },
        Err(e) => EmbedReply {
            embeddings: None,
            error: Some(e.to_string()),
        },
    }
}

// ============================================================================
// Tests
// ============================================================================
