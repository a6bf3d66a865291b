// Copyright (c) 2025-2026 Kode Contributors <dev@kode.tools>
//
// SPDX-License-Identifier: Apache-2.0
mod adapter;
mod client;
mod config;
mod error;
mod transport;

pub use adapter::{adapt_tool, McpPrompt, McpToolAdapter};
pub use client::{connect, ConnectedClient, McpClient, McpRegistry, CONNECT_TIMEOUT};
pub use config::{list_servers, ApprovalStatus, ConfigScope, ScopedServer};
pub use error::McpError;
pub use transport::{SseTransport, StdioTransport, Transport};
