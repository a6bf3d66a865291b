// Copyright (c) 2025-2026 Kode Contributors <dev@kode.tools>
//
// SPDX-License-Identifier: MIT
use std::time::SystemTime;

use async_trait::async_trait;
use serde_json::{json, Value};
use walkdir::WalkDir;

use crate::tool::{single_result, Tool, ToolOutput, ToolStream, ToolUseContext};

/// Maximum number of matches returned.
const MAX_MATCHES: usize = 500;

pub struct GlobTool;

#[async_trait]
impl Tool for GlobTool {
    fn name(&self) -> &str {
        "glob"
    }

    fn description(&self) -> &str {
        "Finds files whose path matches a glob pattern ('**' crosses directories).\n\
         Results are sorted by modification time, newest first."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "Glob pattern, e.g. \"src/**/*.rs\""
                },
                "path": {
                    "type": "string",
                    "description": "Directory to search (default: working directory)"
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
        let root = input
            .get("path")
            .and_then(Value::as_str)
            .map(|p| ctx.cwd.join(shellexpand::tilde(p).to_string()))
            .unwrap_or_else(|| ctx.cwd.clone());

        let regex = match glob_to_regex(&pattern) {
            Some(re) => re,
            None => return single_result(ToolOutput::err(format!("invalid pattern: {pattern}"))),
        };

        let mut matches: Vec<(SystemTime, String)> = Vec::new();
        for entry in WalkDir::new(&root)
            .follow_links(false)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
        {
            let rel = entry
                .path()
                .strip_prefix(&root)
                .unwrap_or(entry.path())
                .to_string_lossy()
                .into_owned();
            if regex.is_match(&rel) {
                let mtime = entry
                    .metadata()
                    .ok()
                    .and_then(|m| m.modified().ok())
                    .unwrap_or(SystemTime::UNIX_EPOCH);
                matches.push((mtime, rel));
            }
        }
        matches.sort_by(|a, b| b.0.cmp(&a.0));
        let total = matches.len();
        matches.truncate(MAX_MATCHES);

        let mut body = matches
            .into_iter()
            .map(|(_, p)| p)
            .collect::<Vec<_>>()
            .join("\n");
        if body.is_empty() {
            body = "No files found".into();
        } else if total > MAX_MATCHES {
            body.push_str(&format!("\n[{} more matches omitted]", total - MAX_MATCHES));
        }
        single_result(ToolOutput::ok(body).with_payload(json!({ "matches": total })))
    }
}

/// Translate a glob pattern into an anchored regex.  `**` crosses directory
/// separators, `*` and `?` do not.
fn glob_to_regex(pattern: &str) -> Option<regex::Regex> {
    let mut re = String::from("^");
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => {
                if chars.peek() == Some(&'*') {
                    chars.next();
                    // Collapse "**/" so it also matches zero directories.
                    if chars.peek() == Some(&'/') {
                        chars.next();
                        re.push_str("(?:[^/]*/)*");
                    } else {
                        re.push_str(".*");
                    }
                } else {
                    re.push_str("[^/]*");
                }
            }
            '?' => re.push_str("[^/]"),
            c => re.push_str(&regex::escape(&c.to_string())),
        }
    }
    re.push('$');
    regex::Regex::new(&re).ok()
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::*;
    use crate::tool::ToolStreamItem;

    async fn run(input: Value, ctx: ToolUseContext) -> ToolOutput {
        let mut stream = GlobTool.call(input, ctx);
        match stream.next().await.unwrap() {
            ToolStreamItem::Result(r) => r,
            other => panic!("unexpected item: {other:?}"),
        }
    }

    #[test]
    fn double_star_crosses_directories() {
        let re = glob_to_regex("src/**/*.rs").unwrap();
        assert!(re.is_match("src/a/b/c.rs"));
        assert!(re.is_match("src/main.rs"));
        assert!(!re.is_match("tests/main.rs"));
    }

    #[test]
    fn single_star_stays_within_a_directory() {
        let re = glob_to_regex("*.rs").unwrap();
        assert!(re.is_match("main.rs"));
        assert!(!re.is_match("src/main.rs"));
    }

    #[tokio::test]
    async fn finds_matching_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/lib.rs"), "").unwrap();
        std::fs::write(dir.path().join("src/notes.md"), "").unwrap();
        let out = run(
            json!({"pattern": "src/**/*.rs"}),
            ToolUseContext::new(dir.path().to_path_buf()),
        )
        .await;
        assert_eq!(out.content.as_text(), "src/lib.rs");
    }

    #[tokio::test]
    async fn no_matches_says_so() {
        let dir = tempfile::tempdir().unwrap();
        let out = run(
            json!({"pattern": "**/*.zig"}),
            ToolUseContext::new(dir.path().to_path_buf()),
        )
        .await;
        assert!(!out.is_error);
        assert_eq!(out.content.as_text(), "No files found");
    }
}
