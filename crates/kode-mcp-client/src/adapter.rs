// Copyright (c) 2025-2026 Kode Contributors <dev@kode.tools>
//
// SPDX-License-Identifier: Apache-2.0
//! Adapters turning remote MCP tools and prompts into their local shapes.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::warn;

use kode_model::{ContentBlock, ToolResultContent};
use kode_tools::{Tool, ToolOutput, ToolStream, ToolUseContext};

use crate::transport::Transport;

/// A remote prompt, surfaced as a `prompt`-kind command named
/// `mcp__<server>__<name>`.
#[derive(Debug, Clone)]
pub struct McpPrompt {
    pub name: String,
    pub description: String,
    pub arguments: Vec<String>,
}

/// Build the local tool value for one entry of a `tools/list` response.
/// Entries without a name are dropped.
pub fn adapt_tool(
    server: &str,
    def: &Value,
    transport: Arc<dyn Transport>,
) -> Option<Arc<dyn Tool>> {
    let remote_name = def.get("name")?.as_str()?.to_string();
    Some(Arc::new(McpToolAdapter {
        name: format!("mcp__{server}__{remote_name}"),
        remote_name,
        description: def
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string(),
        // The remote JSON Schema is forwarded as-is; semantic validation is
        // the server's job.
        input_schema: def.get("inputSchema").cloned().unwrap_or(json!({})),
        transport,
    }))
}

/// Build the prompt value for one entry of a `prompts/list` response.
pub fn adapt_prompt(server: &str, def: &Value) -> Option<McpPrompt> {
    let name = def.get("name")?.as_str()?;
    Some(McpPrompt {
        name: format!("mcp__{server}__{name}"),
        description: def
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string(),
        arguments: def
            .get("arguments")
            .and_then(Value::as_array)
            .map(|args| {
                args.iter()
                    .filter_map(|a| a.get("name").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default(),
    })
}

pub struct McpToolAdapter {
    name: String,
    remote_name: String,
    description: String,
    input_schema: Value,
    transport: Arc<dyn Transport>,
}

#[async_trait]
impl Tool for McpToolAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn input_schema(&self) -> Value {
        self.input_schema.clone()
    }

    /// Remote tools have unknown side effects; treat them as writes so they
    /// are never dispatched concurrently and always pass the gate.
    fn is_read_only(&self) -> bool {
        false
    }

    fn call(&self, input: Value, _ctx: ToolUseContext) -> ToolStream {
        let transport = Arc::clone(&self.transport);
        let remote_name = self.remote_name.clone();
        let tool_name = self.name.clone();
        single_result_from(async move {
            let response = transport
                .request(
                    "tools/call",
                    json!({ "name": remote_name, "arguments": input }),
                )
                .await;
            match response {
                Ok(result) => convert_result(&result),
                Err(e) => {
                    warn!(tool = %tool_name, error = %e, "mcp tool call failed");
                    ToolOutput::err(format!("MCP tool call failed: {e}"))
                }
            }
        })
    }
}

fn single_result_from(
    fut: impl std::future::Future<Output = ToolOutput> + Send + 'static,
) -> ToolStream {
    Box::pin(futures::stream::once(async move {
        kode_tools::ToolStreamItem::Result(fut.await)
    }))
}

/// Convert a `tools/call` result (a string, an array of text/image blocks,
/// or an error) into the local output shape.
fn convert_result(result: &Value) -> ToolOutput {
    let is_error = result
        .get("isError")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let content = match result.get("content") {
        Some(Value::String(s)) => ToolResultContent::Text(s.clone()),
        Some(Value::Array(items)) => {
            let blocks: Vec<ContentBlock> = items
                .iter()
                .filter_map(|item| match item.get("type").and_then(Value::as_str) {
                    Some("text") => item
                        .get("text")
                        .and_then(Value::as_str)
                        .map(ContentBlock::text),
                    Some("image") => Some(ContentBlock::Image {
                        media_type: item
                            .get("mimeType")
                            .and_then(Value::as_str)
                            .unwrap_or("image/png")
                            .to_string(),
                        data: item
                            .get("data")
                            .and_then(Value::as_str)
                            .unwrap_or("")
                            .to_string(),
                    }),
                    _ => None,
                })
                .collect();
            if blocks.len() == 1 {
                if let ContentBlock::Text { text } = &blocks[0] {
                    ToolResultContent::Text(text.clone())
                } else {
                    ToolResultContent::Blocks(blocks)
                }
            } else {
                ToolResultContent::Blocks(blocks)
            }
        }
        _ => ToolResultContent::Text(String::new()),
    };

    ToolOutput {
        content,
        is_error,
        payload: Some(result.clone()),
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::McpError;

    struct EchoTransport;

    #[async_trait]
    impl Transport for EchoTransport {
        async fn request(&self, method: &str, params: Value) -> Result<Value, McpError> {
            assert_eq!(method, "tools/call");
            Ok(json!({
                "content": [{"type": "text", "text": format!("called {}", params["name"])}],
                "isError": false
            }))
        }
        async fn notify(&self, _method: &str, _params: Value) -> Result<(), McpError> {
            Ok(())
        }
    }

    #[test]
    fn adapter_namespaces_the_tool_name() {
        let def = json!({"name": "search", "description": "d", "inputSchema": {"type": "object"}});
        let tool = adapt_tool("docs", &def, Arc::new(EchoTransport)).unwrap();
        assert_eq!(tool.name(), "mcp__docs__search");
        assert!(!tool.is_read_only());
    }

    #[test]
    fn adapter_drops_nameless_tools() {
        assert!(adapt_tool("s", &json!({"description": "x"}), Arc::new(EchoTransport)).is_none());
    }

    #[test]
    fn adapter_forwards_remote_schema_verbatim() {
        let schema = json!({"type": "object", "properties": {"q": {"type": "string"}}});
        let def = json!({"name": "t", "inputSchema": schema});
        let tool = adapt_tool("s", &def, Arc::new(EchoTransport)).unwrap();
        assert_eq!(tool.input_schema(), schema);
    }

    #[tokio::test]
    async fn call_converts_text_content() {
        use futures::StreamExt;
        let def = json!({"name": "t", "inputSchema": {}});
        let tool = adapt_tool("s", &def, Arc::new(EchoTransport)).unwrap();
        let mut stream = tool.call(json!({"q": "x"}), ToolUseContext::default());
        match stream.next().await.unwrap() {
            kode_tools::ToolStreamItem::Result(r) => {
                assert!(!r.is_error);
                assert_eq!(r.content.as_text(), "called \"t\"");
            }
            other => panic!("unexpected item: {other:?}"),
        }
    }

    #[test]
    fn convert_result_string_content() {
        let out = convert_result(&json!({"content": "plain", "isError": false}));
        assert_eq!(out.content.as_text(), "plain");
    }

    #[test]
    fn convert_result_error_flag() {
        let out = convert_result(&json!({"content": "boom", "isError": true}));
        assert!(out.is_error);
    }

    #[test]
    fn convert_result_mixed_blocks() {
        let out = convert_result(&json!({
            "content": [
                {"type": "text", "text": "caption"},
                {"type": "image", "mimeType": "image/png", "data": "QUJD"}
            ]
        }));
        match out.content {
            ToolResultContent::Blocks(blocks) => assert_eq!(blocks.len(), 2),
            _ => panic!("expected blocks"),
        }
    }

    #[test]
    fn prompt_adapter_collects_argument_names() {
        let def = json!({
            "name": "review",
            "description": "review a PR",
            "arguments": [{"name": "pr"}, {"name": "focus"}]
        });
        let p = adapt_prompt("gh", &def).unwrap();
        assert_eq!(p.name, "mcp__gh__review");
        assert_eq!(p.arguments, vec!["pr", "focus"]);
    }
}
