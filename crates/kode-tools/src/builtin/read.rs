// Copyright (c) 2025-2026 Kode Contributors <dev@kode.tools>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::tool::{single_result, Tool, ToolOutput, ToolStream, ToolUseContext};

/// Default number of lines returned when the caller does not specify a limit.
const DEFAULT_LINE_LIMIT: usize = 2000;

/// Hard byte ceiling applied in addition to the line limit.
const MAX_BYTES: usize = 256 * 1024;

pub struct FileReadTool;

#[async_trait]
impl Tool for FileReadTool {
    fn name(&self) -> &str {
        "read"
    }

    fn description(&self) -> &str {
        "Reads a file from the local filesystem. 'file_path' must be provided.\n\
         Optional 'offset' (1-indexed line to start from) and 'limit' (max lines)\n\
         paginate large files. When more lines exist, a notice shows the next offset."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "Absolute or relative path to the file"
                },
                "offset": {
                    "type": "integer",
                    "description": "1-indexed line number to start reading from (default 1)"
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum number of lines to return"
                }
            },
            "required": ["file_path"]
        })
    }

    fn is_read_only(&self) -> bool {
        true
    }

    fn call(&self, input: Value, ctx: ToolUseContext) -> ToolStream {
        let path_arg = input
            .get("file_path")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();
        let offset = input.get("offset").and_then(Value::as_u64).unwrap_or(1) as usize;
        let limit = input
            .get("limit")
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_LINE_LIMIT as u64) as usize;

        let expanded = shellexpand::tilde(&path_arg).to_string();
        let path = ctx.cwd.join(&expanded);
        debug!(path = %path.display(), offset, limit, "read tool");

        let output = match std::fs::read_to_string(&path) {
            Err(e) => ToolOutput::err(format!("Cannot read {}: {e}", path.display())),
            Ok(text) => {
                let lines: Vec<&str> = text.lines().collect();
                let start = offset.saturating_sub(1).min(lines.len());
                let window: Vec<&str> = lines[start..].iter().take(limit).copied().collect();
                let mut body = window.join("\n");
                if body.len() > MAX_BYTES {
                    let cut = (0..=MAX_BYTES)
                        .rev()
                        .find(|&i| body.is_char_boundary(i))
                        .unwrap_or(0);
                    body.truncate(cut);
                    body.push_str("\n[content truncated]");
                }
                let shown = window.len();
                if start + shown < lines.len() {
                    body.push_str(&format!(
                        "\n[{} more lines; continue with offset {}]",
                        lines.len() - start - shown,
                        start + shown + 1
                    ));
                }
                ToolOutput::ok(body).with_payload(json!({
                    "file_path": path.display().to_string(),
                    "total_lines": lines.len(),
                    "lines_shown": shown,
                }))
            }
        };
        single_result(output)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::*;
    use crate::tool::ToolStreamItem;

    async fn run(input: Value, ctx: ToolUseContext) -> ToolOutput {
        let mut stream = FileReadTool.call(input, ctx);
        match stream.next().await.unwrap() {
            ToolStreamItem::Result(r) => r,
            other => panic!("unexpected item: {other:?}"),
        }
    }

    #[tokio::test]
    async fn reads_whole_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "one\ntwo\nthree").unwrap();
        let out = run(
            json!({"file_path": "a.txt"}),
            ToolUseContext::new(dir.path().to_path_buf()),
        )
        .await;
        assert!(!out.is_error);
        assert_eq!(out.content.as_text(), "one\ntwo\nthree");
    }

    #[tokio::test]
    async fn offset_and_limit_paginate() {
        let dir = tempfile::tempdir().unwrap();
        let text = (1..=10).map(|i| format!("line{i}")).collect::<Vec<_>>().join("\n");
        std::fs::write(dir.path().join("b.txt"), text).unwrap();
        let out = run(
            json!({"file_path": "b.txt", "offset": 3, "limit": 2}),
            ToolUseContext::new(dir.path().to_path_buf()),
        )
        .await;
        let text = out.content.as_text();
        assert!(text.starts_with("line3\nline4"));
        assert!(text.contains("continue with offset 5"), "{text}");
    }

    #[tokio::test]
    async fn missing_file_is_an_error_result() {
        let dir = tempfile::tempdir().unwrap();
        let out = run(
            json!({"file_path": "nope.txt"}),
            ToolUseContext::new(dir.path().to_path_buf()),
        )
        .await;
        assert!(out.is_error);
        assert!(out.content.as_text().contains("Cannot read"));
    }

    #[tokio::test]
    async fn payload_reports_line_counts() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("c.txt"), "x\ny").unwrap();
        let out = run(
            json!({"file_path": "c.txt"}),
            ToolUseContext::new(dir.path().to_path_buf()),
        )
        .await;
        let payload = out.payload.unwrap();
        assert_eq!(payload["total_lines"], 2);
        assert_eq!(payload["lines_shown"], 2);
    }
}
