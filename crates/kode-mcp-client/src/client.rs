// Copyright (c) 2025-2026 Kode Contributors <dev@kode.tools>
//
// SPDX-License-Identifier: Apache-2.0
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde_json::{json, Value};
use tracing::{info, warn};

use kode_config::{GlobalConfig, McpServerConfig};
use kode_tools::Tool;

use crate::adapter::{adapt_prompt, adapt_tool, McpPrompt};
use crate::config::{list_servers, ConfigScope, ScopedServer};
use crate::transport::{SseTransport, StdioTransport, Transport};
use crate::McpError;

/// Hard ceiling on the protocol handshake.  A server that cannot initialize
/// within this window is recorded as failed; reconnection is explicit.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

const PROTOCOL_VERSION: &str = "2024-11-05";

/// A successfully initialized server connection.
pub struct ConnectedClient {
    pub name: String,
    pub scope: ConfigScope,
    pub capabilities: Value,
    transport: Arc<dyn Transport>,
}

impl ConnectedClient {
    pub fn supports_tools(&self) -> bool {
        self.capabilities.get("tools").is_some()
    }

    pub fn supports_prompts(&self) -> bool {
        self.capabilities.get("prompts").is_some()
    }

    pub async fn list_tools(&self) -> Result<Vec<Arc<dyn Tool>>, McpError> {
        let result = self.transport.request("tools/list", json!({})).await?;
        let defs = result
            .get("tools")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        Ok(defs
            .iter()
            .filter_map(|def| adapt_tool(&self.name, def, Arc::clone(&self.transport)))
            .collect())
    }

    pub async fn list_prompts(&self) -> Result<Vec<McpPrompt>, McpError> {
        let result = self.transport.request("prompts/list", json!({})).await?;
        let defs = result
            .get("prompts")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        Ok(defs
            .iter()
            .filter_map(|def| adapt_prompt(&self.name, def))
            .collect())
    }
}

/// A configured server's connection state.  Failures are kept in the list so
/// the UI can show per-server status without a separate store, and so a bad
/// server is not retried on every tool listing.
pub enum McpClient {
    Connected(ConnectedClient),
    Failed { name: String, error: String },
}

impl McpClient {
    pub fn name(&self) -> &str {
        match self {
            McpClient::Connected(c) => &c.name,
            McpClient::Failed { name, .. } => name,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, McpClient::Failed { .. })
    }
}

/// Connect to one server, racing the handshake against [`CONNECT_TIMEOUT`].
pub async fn connect(server: &ScopedServer) -> McpClient {
    match tokio::time::timeout(CONNECT_TIMEOUT, initialize(server)).await {
        Ok(Ok(client)) => {
            info!(server = %server.name, scope = %server.scope, "mcp server connected");
            McpClient::Connected(client)
        }
        Ok(Err(e)) => {
            warn!(server = %server.name, error = %e, "mcp connect failed");
            McpClient::Failed {
                name: server.name.clone(),
                error: e.to_string(),
            }
        }
        Err(_) => {
            warn!(server = %server.name, "mcp connect timed out");
            McpClient::Failed {
                name: server.name.clone(),
                error: format!("handshake timed out after {CONNECT_TIMEOUT:?}"),
            }
        }
    }
}

async fn initialize(server: &ScopedServer) -> Result<ConnectedClient, McpError> {
    let transport: Arc<dyn Transport> = match &server.config {
        McpServerConfig::Stdio { command, args, env } => {
            Arc::new(StdioTransport::spawn(&server.name, command, args, env)?)
        }
        McpServerConfig::Sse { url } => Arc::new(SseTransport::connect(url).await?),
    };

    let result = transport
        .request(
            "initialize",
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {},
                "clientInfo": {
                    "name": "kode",
                    "version": env!("CARGO_PKG_VERSION"),
                }
            }),
        )
        .await?;
    transport
        .notify("notifications/initialized", json!({}))
        .await?;

    Ok(ConnectedClient {
        name: server.name.clone(),
        scope: server.scope,
        capabilities: result.get("capabilities").cloned().unwrap_or(json!({})),
        transport,
    })
}

/// Process-wide registry of MCP clients, built once at startup and shared
/// across tool invocations.
pub struct McpRegistry {
    clients: Vec<Arc<McpClient>>,
}

impl McpRegistry {
    pub fn empty() -> Self {
        Self {
            clients: Vec::new(),
        }
    }

    /// Connect every startable configured server concurrently.  `.mcprc`
    /// servers without a stored approval are skipped.
    pub async fn startup(global: &GlobalConfig, project_dir: &Path) -> Self {
        let servers = list_servers(global, project_dir);
        let startable: Vec<_> = servers.into_iter().filter(|s| s.is_startable()).collect();
        let clients = join_all(startable.iter().map(connect)).await;
        Self {
            clients: clients.into_iter().map(Arc::new).collect(),
        }
    }

    pub fn list_clients(&self) -> &[Arc<McpClient>] {
        &self.clients
    }

    /// Remote tools from every connected client declaring the capability.
    /// Per-client failures are logged and skipped.
    pub async fn list_tools(&self) -> Vec<Arc<dyn Tool>> {
        let mut tools = Vec::new();
        for client in &self.clients {
            let McpClient::Connected(c) = client.as_ref() else {
                continue;
            };
            if !c.supports_tools() {
                continue;
            }
            match c.list_tools().await {
                Ok(mut remote) => tools.append(&mut remote),
                Err(e) => warn!(server = %c.name, error = %e, "tools/list failed"),
            }
        }
        tools
    }

    /// Remote prompts, namespaced `mcp__<server>__<name>`.
    pub async fn list_prompts(&self) -> Vec<McpPrompt> {
        let mut prompts = Vec::new();
        for client in &self.clients {
            let McpClient::Connected(c) = client.as_ref() else {
                continue;
            };
            if !c.supports_prompts() {
                continue;
            }
            match c.list_prompts().await {
                Ok(mut remote) => prompts.append(&mut remote),
                Err(e) => warn!(server = %c.name, error = %e, "prompts/list failed"),
            }
        }
        prompts
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
