// Copyright (c) 2025-2026 Kode Contributors <dev@kode.tools>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::tool::{single_result, Tool, ToolOutput, ToolStream, ToolUseContext};

pub struct FileWriteTool;

#[async_trait]
impl Tool for FileWriteTool {
    fn name(&self) -> &str {
        "write"
    }

    fn description(&self) -> &str {
        "Writes a file, replacing any existing content.\n\
         Parent directories are created as needed."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file_path": { "type": "string", "description": "File to write" },
                "content": { "type": "string", "description": "Full new file content" }
            },
            "required": ["file_path", "content"]
        })
    }

    fn is_read_only(&self) -> bool {
        false
    }

    fn call(&self, input: Value, ctx: ToolUseContext) -> ToolStream {
        let file_path = input
            .get("file_path")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();
        let content = input
            .get("content")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();
        let path = ctx.cwd.join(shellexpand::tilde(&file_path).to_string());
        debug!(path = %path.display(), bytes = content.len(), "write tool");

        let output = (|| {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| format!("Cannot create {}: {e}", parent.display()))?;
            }
            std::fs::write(&path, &content)
                .map_err(|e| format!("Cannot write {}: {e}", path.display()))?;
            Ok::<_, String>(
                ToolOutput::ok(format!(
                    "Wrote {} bytes to {}",
                    content.len(),
                    path.display()
                ))
                .with_payload(json!({
                    "file_path": path.display().to_string(),
                    "bytes": content.len(),
                })),
            )
        })();

        single_result(output.unwrap_or_else(ToolOutput::err))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
