// Copyright (c) 2025-2026 Kode Contributors <dev@kode.tools>
//
// SPDX-License-Identifier: MIT
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use futures::{stream, Stream};
use serde_json::Value;

use kode_config::ToolsConfig;
use kode_model::{Message, ToolResultContent};

/// Identity used by the permission gate to look up approvals.
///
/// Shell-like tools key on a safe command prefix (`bash(git)`); all other
/// tools key on the bare tool name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PermissionKey {
    pub tool: String,
    pub prefix: Option<String>,
}

impl PermissionKey {
    pub fn tool_only(tool: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            prefix: None,
        }
    }

    pub fn with_prefix(tool: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            prefix: Some(prefix.into()),
        }
    }
}

impl std::fmt::Display for PermissionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.prefix {
            Some(p) => write!(f, "{}({p})", self.tool),
            None => write!(f, "{}", self.tool),
        }
    }
}

/// Outcome of a shell-like tool's prefix extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrefixResult {
    /// First safe token of the command, reusable as a permission key.
    Safe(String),
    /// The command contains substitution/chaining constructs; the gate must
    /// always deny it.
    InjectionDetected,
}

/// Immutable per-invocation context handed to a tool.
#[derive(Clone)]
pub struct ToolUseContext {
    pub cwd: PathBuf,
    pub config: ToolsConfig,
    /// Read-only snapshot of the conversation history at dispatch time.
    pub history: Arc<Vec<Message>>,
}

impl ToolUseContext {
    pub fn new(cwd: PathBuf) -> Self {
        Self {
            cwd,
            config: ToolsConfig::default(),
            history: Arc::new(Vec::new()),
        }
    }
}

impl Default for ToolUseContext {
    fn default() -> Self {
        Self::new(std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
    }
}

/// Terminal output of one tool invocation.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub content: ToolResultContent,
    pub is_error: bool,
    /// Structured payload forwarded on the tool-result user message for UI
    /// rendering (`tool_use_result`).  Opaque to the loop.
    pub payload: Option<Value>,
}

impl ToolOutput {
    pub fn ok(content: impl Into<ToolResultContent>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
            payload: None,
        }
    }

    pub fn err(message: impl Into<ToolResultContent>) -> Self {
        Self {
            content: message.into(),
            is_error: true,
            payload: None,
        }
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }
}

/// One item yielded by a running tool: any number of progress items followed
/// by exactly one result, which ends the stream.
#[derive(Debug, Clone)]
pub enum ToolStreamItem {
    /// Human-readable progress text, forwarded as a progress message tagged
    /// with the tool-use id.
    Progress(String),
    Result(ToolOutput),
}

pub type ToolStream = Pin<Box<dyn Stream<Item = ToolStreamItem> + Send>>;

/// Convenience for the common single-result case.
pub fn single_result(output: ToolOutput) -> ToolStream {
    Box::pin(stream::once(async move { ToolStreamItem::Result(output) }))
}

/// Trait every built-in and MCP-adapted tool implements.
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON Schema for the input object.
    fn input_schema(&self) -> Value;
    /// Read-only tools may be dispatched concurrently and are exempt from
    /// permission prompts.
    fn is_read_only(&self) -> bool;
    /// Tools can be switched off wholesale (feature flags, missing binaries).
    fn is_enabled(&self) -> bool {
        true
    }
    /// Permission-prefix extractor for shell-like tools.  `None` means the
    /// gate keys on the tool name alone.
    fn prefix(&self, _input: &Value) -> Option<PrefixResult> {
        None
    }
    /// Rewrite the input before validation and permission checks, e.g. strip
    /// a `cd <cwd> && ` prelude so permission keys stay stable.
    fn normalize_input(&self, input: Value, _ctx: &ToolUseContext) -> Value {
        input
    }
    /// Semantic validation beyond the JSON schema.  Runs after schema
    /// validation and before the permission gate.
    async fn validate_input(&self, _input: &Value, _ctx: &ToolUseContext) -> Result<(), String> {
        Ok(())
    }
    /// Execute.  The returned stream yields zero or more progress items and
    /// terminates with exactly one result.  Implementations must not panic on
    /// bad input; return an `is_error` result instead.
    fn call(&self, input: Value, ctx: ToolUseContext) -> ToolStream;
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use futures::StreamExt;
    use serde_json::json;

    use super::*;

    #[test]
    fn permission_key_display_with_prefix() {
        let k = PermissionKey::with_prefix("bash", "git");
        assert_eq!(k.to_string(), "bash(git)");
    }

    #[test]
    fn permission_key_display_tool_only() {
        let k = PermissionKey::tool_only("edit");
        assert_eq!(k.to_string(), "edit");
    }

    #[test]
    fn tool_output_ok_is_not_error() {
        let o = ToolOutput::ok("fine");
        assert!(!o.is_error);
        assert_eq!(o.content.as_text(), "fine");
    }

    #[test]
    fn tool_output_err_sets_flag() {
        let o = ToolOutput::err("bad");
        assert!(o.is_error);
    }

    #[test]
    fn tool_output_payload_attaches() {
        let o = ToolOutput::ok("x").with_payload(json!({"lines": 3}));
        assert_eq!(o.payload.unwrap()["lines"], 3);
    }

    #[tokio::test]
    async fn single_result_yields_exactly_one_item() {
        let mut s = single_result(ToolOutput::ok("done"));
        assert!(matches!(
            s.next().await,
            Some(ToolStreamItem::Result(_))
        ));
        assert!(s.next().await.is_none());
    }
}
