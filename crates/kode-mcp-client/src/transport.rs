// Copyright (c) 2025-2026 Kode Contributors <dev@kode.tools>
//
// SPDX-License-Identifier: Apache-2.0
//! MCP transports: newline-delimited JSON-RPC over a child process's
//! stdin/stdout, and server-sent events over HTTP.
//!
//! Both transports share the same request/response bookkeeping: every
//! outgoing request gets a fresh numeric id and a oneshot slot; a background
//! reader task routes responses back by id.  When the reader ends, all
//! in-flight requests fail with [`McpError::Closed`].

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::oneshot;
use tokio_util::codec::{FramedRead, LinesCodec};
use tracing::{debug, warn};

use crate::McpError;

#[async_trait]
pub trait Transport: Send + Sync {
    async fn request(&self, method: &str, params: Value) -> Result<Value, McpError>;
    async fn notify(&self, method: &str, params: Value) -> Result<(), McpError>;
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    id: Option<u64>,
    result: Option<Value>,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<Value, McpError>>>>>;

fn route_response(pending: &PendingMap, line: &str) {
    let parsed: JsonRpcResponse = match serde_json::from_str(line) {
        Ok(r) => r,
        Err(e) => {
            debug!(error = %e, "ignoring non-response line from server");
            return;
        }
    };
    let Some(id) = parsed.id else {
        // Server-initiated notification; nothing routes to it.
        return;
    };
    let Some(slot) = pending.lock().unwrap().remove(&id) else {
        warn!(id, "response for unknown request id");
        return;
    };
    let outcome = match (parsed.result, parsed.error) {
        (_, Some(e)) => Err(McpError::Server {
            code: e.code,
            message: e.message,
        }),
        (Some(r), None) => Ok(r),
        (None, None) => Ok(Value::Null),
    };
    let _ = slot.send(outcome);
}

fn fail_all_pending(pending: &PendingMap) {
    let mut map = pending.lock().unwrap();
    for (_, slot) in map.drain() {
        let _ = slot.send(Err(McpError::Closed));
    }
}

// ─── stdio ────────────────────────────────────────────────────────────────────

/// Child process speaking newline-delimited JSON-RPC on stdin/stdout.
/// Stderr is piped into the log under the server's name.
pub struct StdioTransport {
    stdin: tokio::sync::Mutex<ChildStdin>,
    pending: PendingMap,
    next_id: AtomicU64,
    /// Held so the child is killed when the transport is dropped.
    _child: Child,
}

impl StdioTransport {
    pub fn spawn(
        server_name: &str,
        command: &str,
        args: &[String],
        env: &HashMap<String, String>,
    ) -> Result<Self, McpError> {
        let mut cmd = Command::new(command);
        cmd.args(args)
            .envs(env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        let mut child = cmd.spawn()?;

        let stdin = child.stdin.take().ok_or(McpError::Closed)?;
        let stdout = child.stdout.take().ok_or(McpError::Closed)?;
        let stderr = child.stderr.take().ok_or(McpError::Closed)?;

        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));

        let reader_pending = Arc::clone(&pending);
        tokio::spawn(async move {
            let mut framed = FramedRead::new(stdout, LinesCodec::new());
            while let Some(Ok(line)) = framed.next().await {
                route_response(&reader_pending, &line);
            }
            fail_all_pending(&reader_pending);
        });

        let name = server_name.to_string();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                warn!(server = %name, "{line}");
            }
        });

        Ok(Self {
            stdin: tokio::sync::Mutex::new(stdin),
            pending,
            next_id: AtomicU64::new(1),
            _child: child,
        })
    }

    async fn send_line(&self, payload: &Value) -> Result<(), McpError> {
        let mut line = serde_json::to_string(payload)
            .map_err(|e| McpError::Protocol(e.to_string()))?;
        line.push('\n');
        let mut stdin = self.stdin.lock().await;
        stdin.write_all(line.as_bytes()).await?;
        stdin.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn request(&self, method: &str, params: Value) -> Result<Value, McpError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().unwrap().insert(id, tx);
        let payload = json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params });
        if let Err(e) = self.send_line(&payload).await {
            self.pending.lock().unwrap().remove(&id);
            return Err(e);
        }
        rx.await.map_err(|_| McpError::Closed)?
    }

    async fn notify(&self, method: &str, params: Value) -> Result<(), McpError> {
        self.send_line(&json!({ "jsonrpc": "2.0", "method": method, "params": params }))
            .await
    }
}

// ─── SSE ──────────────────────────────────────────────────────────────────────

/// Server-sent-events transport: requests go out as HTTP POSTs to the
/// endpoint the server announces on the event stream; responses come back as
/// `message` events.
pub struct SseTransport {
    http: reqwest::Client,
    endpoint: String,
    pending: PendingMap,
    next_id: AtomicU64,
}

impl SseTransport {
    /// Open the event stream and wait for the server's `endpoint` event.
    /// The caller bounds the whole handshake with its connect timeout.
    pub async fn connect(url: &str) -> Result<Self, McpError> {
        let http = reqwest::Client::new();
        let response = http
            .get(url)
            .header("accept", "text/event-stream")
            .send()
            .await?
            .error_for_status()?;

        let base = url::origin_of(url);
        let mut body = response.bytes_stream();
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));

        // Read events until the endpoint announcement arrives, then hand the
        // stream to a background task that routes message events.
        let mut parser = SseParser::default();
        let mut endpoint: Option<String> = None;
        'outer: while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            for event in parser.push(&chunk) {
                if event.name == "endpoint" {
                    endpoint = Some(join_endpoint(&base, event.data.trim()));
                    break 'outer;
                }
            }
        }
        let endpoint = endpoint
            .ok_or_else(|| McpError::Protocol("no endpoint event on SSE stream".into()))?;
        debug!(%endpoint, "sse endpoint established");

        let reader_pending = Arc::clone(&pending);
        tokio::spawn(async move {
            while let Some(Ok(chunk)) = body.next().await {
                for event in parser.push(&chunk) {
                    if event.name == "message" {
                        route_response(&reader_pending, &event.data);
                    }
                }
            }
            fail_all_pending(&reader_pending);
        });

        Ok(Self {
            http,
            endpoint,
            pending,
            next_id: AtomicU64::new(1),
        })
    }
}

#[async_trait]
impl Transport for SseTransport {
    async fn request(&self, method: &str, params: Value) -> Result<Value, McpError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().unwrap().insert(id, tx);
        let payload = json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params });
        let post = self.http.post(&self.endpoint).json(&payload).send().await;
        if let Err(e) = post.and_then(|r| r.error_for_status()) {
            self.pending.lock().unwrap().remove(&id);
            return Err(e.into());
        }
        rx.await.map_err(|_| McpError::Closed)?
    }

    async fn notify(&self, method: &str, params: Value) -> Result<(), McpError> {
        let payload = json!({ "jsonrpc": "2.0", "method": method, "params": params });
        self.http
            .post(&self.endpoint)
            .json(&payload)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

fn join_endpoint(base: &str, endpoint: &str) -> String {
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        endpoint.to_string()
    } else {
        format!("{base}{endpoint}")
    }
}

mod url {
    /// Scheme + authority of a URL, with any path stripped.
    pub fn origin_of(url: &str) -> String {
        if let Some(scheme_end) = url.find("://") {
            let after = scheme_end + 3;
            match url[after..].find('/') {
                Some(path) => url[..after + path].to_string(),
                None => url.to_string(),
            }
        } else {
            url.to_string()
        }
    }
}

/// Incremental SSE frame parser: `event:`/`data:` fields accumulate until a
/// blank line dispatches the event.
#[derive(Default)]
struct SseParser {
    buffer: String,
    current_event: String,
    current_data: String,
}

struct SseEvent {
    name: String,
    data: String,
}

impl SseParser {
    fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.push_str(&String::from_utf8_lossy(chunk));
        let mut events = Vec::new();
        while let Some(pos) = self.buffer.find('\n') {
            let line = self.buffer[..pos].trim_end_matches('\r').to_string();
            self.buffer.drain(..=pos);
            if line.is_empty() {
                if !self.current_data.is_empty() || !self.current_event.is_empty() {
                    events.push(SseEvent {
                        name: if self.current_event.is_empty() {
                            "message".into()
                        } else {
                            std::mem::take(&mut self.current_event)
                        },
                        data: std::mem::take(&mut self.current_data),
                    });
                    self.current_event.clear();
                }
            } else if let Some(rest) = line.strip_prefix("event:") {
                self.current_event = rest.trim().to_string();
            } else if let Some(rest) = line.strip_prefix("data:") {
                if !self.current_data.is_empty() {
                    self.current_data.push('\n');
                }
                self.current_data.push_str(rest.trim_start());
            }
        }
        events
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
