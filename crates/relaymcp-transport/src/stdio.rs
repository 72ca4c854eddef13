//! STDIO transport: a single-session boundary collaborator. One process
//! owns exactly one stdio session for its lifetime; there is no
//! multiplexing and no `mcp-session-id` header.
//!
//! Framing is newline-delimited JSON: one envelope (or batch array) per
//! line, no embedded newlines, UTF-8 only.

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use tokio::io::{BufReader, Stdin, Stdout};
use tokio::sync::Mutex;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};
use tracing::{debug, trace, warn};

use relaymcp_protocol::jsonrpc::JsonRpcResponse;

use crate::error::{TransportError, TransportResult};
use crate::traits::{InboundEnvelope, Routing, Transport};

/// The fixed session id every stdio connection is given — there being
/// exactly one session per stdio transport for the life of the process.
pub const STDIO_SESSION_ID: &str = "stdio";

/// STDIO transport: one `Session` for the process lifetime, created on
/// transport attach and torn down when stdin closes.
pub struct StdioTransport {
    reader: Mutex<FramedRead<BufReader<Stdin>, LinesCodec>>,
    writer: Mutex<FramedWrite<Stdout, LinesCodec>>,
}

impl StdioTransport {
    /// Attach to the process's stdin/stdout.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            reader: Mutex::new(FramedRead::new(
                BufReader::new(tokio::io::stdin()),
                LinesCodec::new(),
            )),
            writer: Mutex::new(FramedWrite::new(tokio::io::stdout(), LinesCodec::new())),
        })
    }

    /// Write a JSON-RPC parse-error response (`-32700`, `id: null`) directly
    /// to stdout, bypassing the dispatcher entirely — a line that never
    /// parsed as JSON can't be routed to a session for a normal response.
    async fn write_parse_error(&self) {
        let response = JsonRpcResponse::parse_error("invalid JSON");
        let line = match serde_json::to_string(&response) {
            Ok(line) => line,
            Err(err) => {
                warn!(%err, "failed to serialize parse-error response");
                return;
            }
        };
        let mut writer = self.writer.lock().await;
        if let Err(err) = futures::SinkExt::send(&mut *writer, line).await {
            warn!(%err, "failed to write parse-error response to stdout");
        }
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn recv(&self) -> Option<InboundEnvelope> {
        loop {
            let mut reader = self.reader.lock().await;
            match reader.next().await {
                Some(Ok(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    trace!(%line, "stdio line received");
                    match serde_json::from_str::<Value>(&line) {
                        Ok(payload) => {
                            return Some(InboundEnvelope {
                                session_id: STDIO_SESSION_ID.to_string(),
                                payload,
                                bearer_token: None,
                            });
                        }
                        Err(err) => {
                            warn!(%err, "malformed stdio line, replying with a parse error");
                            drop(reader);
                            self.write_parse_error().await;
                            continue;
                        }
                    }
                }
                Some(Err(err)) => {
                    warn!(%err, "stdio framing error");
                    continue;
                }
                None => {
                    debug!("stdin closed, stdio transport ending");
                    return None;
                }
            }
        }
    }

    async fn send(&self, payload: Value, routing: Routing) -> TransportResult<()> {
        // A single-session transport: every routing target resolves to the
        // one stdio session. Reject anything addressed elsewhere.
        match &routing {
            Routing::Response { session_id, .. } | Routing::ToSession { session_id } => {
                if session_id != STDIO_SESSION_ID {
                    return Err(TransportError::UnknownTarget(session_id.clone()));
                }
            }
            Routing::Broadcast => {}
        }

        let line = serde_json::to_string(&payload)?;
        let mut writer = self.writer.lock().await;
        futures::SinkExt::send(&mut *writer, line)
            .await
            .map_err(|e| TransportError::Framing(e.to_string()))
    }
}
