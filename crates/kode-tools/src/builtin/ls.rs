// Copyright (c) 2025-2026 Kode Contributors <dev@kode.tools>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::tool::{single_result, Tool, ToolOutput, ToolStream, ToolUseContext};

/// Maximum number of entries returned for one directory.
const MAX_ENTRIES: usize = 1000;

pub struct LsTool;

#[async_trait]
impl Tool for LsTool {
    fn name(&self) -> &str {
        "ls"
    }

    fn description(&self) -> &str {
        "Lists a directory. 'path' defaults to the working directory.\n\
         Directories are suffixed with '/'; entries are sorted by name."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Directory to list (default: working directory)"
                }
            }
        })
    }

    fn is_read_only(&self) -> bool {
        true
    }

    fn call(&self, input: Value, ctx: ToolUseContext) -> ToolStream {
        let path_arg = input.get("path").and_then(Value::as_str).unwrap_or(".");
        let expanded = shellexpand::tilde(path_arg).to_string();
        let path = ctx.cwd.join(expanded);

        let output = match std::fs::read_dir(&path) {
            Err(e) => ToolOutput::err(format!("Cannot list {}: {e}", path.display())),
            Ok(entries) => {
                let mut names: Vec<String> = entries
                    .filter_map(Result::ok)
                    .map(|e| {
                        let mut name = e.file_name().to_string_lossy().into_owned();
                        if e.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                            name.push('/');
                        }
                        name
                    })
                    .collect();
                names.sort();
                let total = names.len();
                names.truncate(MAX_ENTRIES);
                let mut body = names.join("\n");
                if total > MAX_ENTRIES {
                    body.push_str(&format!("\n[{} more entries omitted]", total - MAX_ENTRIES));
                }
                ToolOutput::ok(body).with_payload(json!({ "entries": total }))
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

    #[tokio::test]
    async fn lists_sorted_with_dir_suffix() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.txt"), "").unwrap();
        std::fs::create_dir(dir.path().join("a")).unwrap();
        let mut stream = LsTool.call(json!({}), ToolUseContext::new(dir.path().to_path_buf()));
        match stream.next().await.unwrap() {
            ToolStreamItem::Result(r) => {
                assert_eq!(r.content.as_text(), "a/\nb.txt");
            }
            other => panic!("unexpected item: {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_dir_is_error_result() {
        let dir = tempfile::tempdir().unwrap();
        let mut stream = LsTool.call(
            json!({"path": "does-not-exist"}),
            ToolUseContext::new(dir.path().to_path_buf()),
        );
        match stream.next().await.unwrap() {
            ToolStreamItem::Result(r) => assert!(r.is_error),
            other => panic!("unexpected item: {other:?}"),
        }
    }
}
