// Copyright (c) 2025-2026 Kode Contributors <dev@kode.tools>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Value};
use walkdir::WalkDir;

use crate::tool::{single_result, Tool, ToolOutput, ToolStream, ToolUseContext};

/// Maximum number of matching lines returned; leading matches are the most
/// relevant, so the tail is dropped.
const MAX_MATCHES: usize = 300;

/// Files larger than this are skipped (likely binaries or build output).
const MAX_FILE_BYTES: u64 = 2 * 1024 * 1024;

pub struct GrepTool;

#[async_trait]
impl Tool for GrepTool {
    fn name(&self) -> &str {
        "grep"
    }

    fn description(&self) -> &str {
        "Searches file contents with a regular expression.\n\
         'pattern' is required; optional 'path' restricts the search root and\n\
         'include' filters file names by glob-like suffix (e.g. \"*.rs\").\n\
         Output is 'path:line_number:line' per match, leading matches first."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "Regular expression to search for"
                },
                "path": {
                    "type": "string",
                    "description": "Directory to search (default: working directory)"
                },
                "include": {
                    "type": "string",
                    "description": "Only search files matching this name pattern, e.g. \"*.rs\""
                }
            },
            "required": ["pattern"]
        })
    }

    fn is_read_only(&self) -> bool {
        true
    }

    fn call(&self, input: Value, ctx: ToolUseContext) -> ToolStream {
        let pattern = input
            .get("pattern")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();
        let include = input
            .get("include")
            .and_then(Value::as_str)
            .map(str::to_string);
        let root = input
            .get("path")
            .and_then(Value::as_str)
            .map(|p| ctx.cwd.join(shellexpand::tilde(p).to_string()))
            .unwrap_or_else(|| ctx.cwd.clone());

        let regex = match regex::Regex::new(&pattern) {
            Ok(re) => re,
            Err(e) => return single_result(ToolOutput::err(format!("invalid pattern: {e}"))),
        };

        let mut lines: Vec<String> = Vec::new();
        let mut total = 0usize;
        'walk: for entry in WalkDir::new(&root)
            .follow_links(false)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
        {
            if entry.metadata().map(|m| m.len()).unwrap_or(0) > MAX_FILE_BYTES {
                continue;
            }
            let rel = entry
                .path()
                .strip_prefix(&root)
                .unwrap_or(entry.path())
                .to_string_lossy()
                .into_owned();
            if let Some(inc) = &include {
                if !name_matches(&rel, inc) {
                    continue;
                }
            }
            let Ok(text) = std::fs::read_to_string(entry.path()) else {
                continue;
            };
            for (n, line) in text.lines().enumerate() {
                if regex.is_match(line) {
                    total += 1;
                    if lines.len() < MAX_MATCHES {
                        lines.push(format!("{rel}:{}:{line}", n + 1));
                    } else {
                        break 'walk;
                    }
                }
            }
        }

        let mut body = lines.join("\n");
        if body.is_empty() {
            body = "No matches found".into();
        } else if total > MAX_MATCHES {
            body.push_str("\n[more matches omitted; use a more specific pattern]");
        }
        single_result(ToolOutput::ok(body).with_payload(json!({ "matches": total })))
    }
}

/// Suffix-style name filter: `*.rs` matches any path ending in `.rs`; a bare
/// name must match the file name exactly.
fn name_matches(path: &str, include: &str) -> bool {
    if let Some(suffix) = include.strip_prefix('*') {
        path.ends_with(suffix)
    } else {
        path.rsplit('/').next() == Some(include)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
