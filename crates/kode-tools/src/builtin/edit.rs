// Copyright (c) 2025-2026 Kode Contributors <dev@kode.tools>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Value};
use similar::TextDiff;
use tracing::debug;

use crate::tool::{single_result, Tool, ToolOutput, ToolStream, ToolUseContext};

pub struct FileEditTool;

#[async_trait]
impl Tool for FileEditTool {
    fn name(&self) -> &str {
        "edit"
    }

    fn description(&self) -> &str {
        "Performs an exact string replacement in a file.\n\
         'old_string' must occur exactly once unless 'replace_all' is set;\n\
         an empty 'old_string' creates the file with 'new_string' as content."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file_path": { "type": "string", "description": "File to modify" },
                "old_string": { "type": "string", "description": "Exact text to replace" },
                "new_string": { "type": "string", "description": "Replacement text" },
                "replace_all": {
                    "type": "boolean",
                    "description": "Replace every occurrence (default false)"
                }
            },
            "required": ["file_path", "old_string", "new_string"]
        })
    }

    fn is_read_only(&self) -> bool {
        false
    }

    async fn validate_input(&self, input: &Value, ctx: &ToolUseContext) -> Result<(), String> {
        let file_path = input.get("file_path").and_then(Value::as_str).unwrap_or("");
        let old = input.get("old_string").and_then(Value::as_str).unwrap_or("");
        let new = input.get("new_string").and_then(Value::as_str).unwrap_or("");
        let replace_all = input
            .get("replace_all")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        if old == new {
            return Err("old_string and new_string are identical; nothing to do".into());
        }
        let path = ctx.cwd.join(shellexpand::tilde(file_path).to_string());
        if old.is_empty() {
            if path.exists() {
                return Err(format!(
                    "{} already exists; empty old_string only creates new files",
                    path.display()
                ));
            }
            return Ok(());
        }
        let text = std::fs::read_to_string(&path)
            .map_err(|e| format!("Cannot read {}: {e}", path.display()))?;
        let count = text.matches(old).count();
        if count == 0 {
            return Err("old_string not found in the file".into());
        }
        if count > 1 && !replace_all {
            return Err(format!(
                "old_string occurs {count} times; provide more context or set replace_all"
            ));
        }
        Ok(())
    }

    fn call(&self, input: Value, ctx: ToolUseContext) -> ToolStream {
        let file_path = input
            .get("file_path")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();
        let old = input
            .get("old_string")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();
        let new = input
            .get("new_string")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();
        let replace_all = input
            .get("replace_all")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let path = ctx.cwd.join(shellexpand::tilde(&file_path).to_string());
        debug!(path = %path.display(), replace_all, "edit tool");

        let output = (|| {
            let before = if old.is_empty() {
                String::new()
            } else {
                std::fs::read_to_string(&path)
                    .map_err(|e| format!("Cannot read {}: {e}", path.display()))?
            };
            let after = if old.is_empty() {
                new.clone()
            } else if replace_all {
                before.replace(&old, &new)
            } else {
                before.replacen(&old, &new, 1)
            };
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| format!("Cannot create {}: {e}", parent.display()))?;
            }
            std::fs::write(&path, &after)
                .map_err(|e| format!("Cannot write {}: {e}", path.display()))?;

            let changed = TextDiff::from_lines(&before, &after)
                .iter_all_changes()
                .filter(|c| c.tag() != similar::ChangeTag::Equal)
                .count();
            Ok::<_, String>(
                ToolOutput::ok(format!("Edited {}", path.display())).with_payload(json!({
                    "file_path": path.display().to_string(),
                    "changed_lines": changed,
                })),
            )
        })();

        single_result(output.unwrap_or_else(ToolOutput::err))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
