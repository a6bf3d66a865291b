// Copyright (c) 2025-2026 Kode Contributors <dev@kode.tools>
//
// SPDX-License-Identifier: Apache-2.0
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::debug;

use crate::tool::{PrefixResult, Tool, ToolOutput, ToolStream, ToolStreamItem, ToolUseContext};

/// Hard byte ceiling for combined stdout + stderr returned to the model.
const OUTPUT_LIMIT_BYTES: usize = 20_000;

/// Characters whose presence makes a command impossible to authorize by its
/// first token: anything after them may run a different program entirely.
const INJECTION_MARKERS: &[&str] = &["$(", "`", "&&", "||", ";", "|", "\n", ">", "<"];

/// Built-in tool that runs a shell command.
pub struct BashTool;

#[async_trait]
impl Tool for BashTool {
    fn name(&self) -> &str {
        "bash"
    }

    fn description(&self) -> &str {
        "Execute a shell command and return stdout + stderr.\n\
         'command' is required. Optional 'timeout' (milliseconds) caps execution;\n\
         values above the configured ceiling are clamped.\n\
         Output is capped at ~20 KB; larger output is truncated with a marker.\n\
         Prefer non-interactive commands; avoid commands that require a TTY."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The shell command to execute."
                },
                "timeout": {
                    "type": "integer",
                    "description": "Execution timeout in milliseconds (optional)"
                }
            },
            "required": ["command"]
        })
    }

    fn is_read_only(&self) -> bool {
        false
    }

    /// Strip the `cd <cwd> && ` prelude the model habitually prepends, so the
    /// permission key stays stable across working-directory changes.
    fn normalize_input(&self, mut input: Value, ctx: &ToolUseContext) -> Value {
        if let Some(command) = input.get("command").and_then(Value::as_str) {
            let prelude = format!("cd {} && ", ctx.cwd.display());
            if let Some(rest) = command.strip_prefix(&prelude) {
                input["command"] = Value::String(rest.to_string());
            }
        }
        input
    }

    fn prefix(&self, input: &Value) -> Option<PrefixResult> {
        let command = input.get("command").and_then(Value::as_str).unwrap_or("");
        Some(extract_command_prefix(command))
    }

    async fn validate_input(&self, input: &Value, _ctx: &ToolUseContext) -> Result<(), String> {
        let command = input.get("command").and_then(Value::as_str).unwrap_or("");
        if command.trim().is_empty() {
            return Err("command must not be empty".into());
        }
        Ok(())
    }

    fn call(&self, input: Value, ctx: ToolUseContext) -> ToolStream {
        let (tx, rx) = mpsc::channel(8);
        tokio::spawn(async move {
            let command = input
                .get("command")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string();
            let timeout_ms = input
                .get("timeout")
                .and_then(Value::as_u64)
                .map(|t| t.min(ctx.config.bash_max_timeout_ms))
                .unwrap_or(ctx.config.bash_default_timeout_ms);

            debug!(cmd = %command, timeout_ms, "executing bash tool");
            let _ = tx
                .send(ToolStreamItem::Progress(format!("$ {command}")))
                .await;

            let mut cmd = Command::new("bash");
            cmd.arg("-c")
                .arg(&command)
                .current_dir(&ctx.cwd)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true);

            // When the consumer drops the stream (cancellation), bail out so
            // the pending child is dropped and killed rather than left to
            // run to completion.
            let waited = tokio::select! {
                _ = tx.closed() => return,
                waited = tokio::time::timeout(
                    Duration::from_millis(timeout_ms),
                    async { cmd.spawn()?.wait_with_output().await },
                ) => waited,
            };
            let output = match waited {
                Err(_) => {
                    let _ = tx
                        .send(ToolStreamItem::Result(ToolOutput::err(format!(
                            "Command timed out after {timeout_ms} ms"
                        ))))
                        .await;
                    return;
                }
                Ok(Err(e)) => {
                    let _ = tx
                        .send(ToolStreamItem::Result(ToolOutput::err(format!(
                            "Failed to run command: {e}"
                        ))))
                        .await;
                    return;
                }
                Ok(Ok(output)) => output,
            };

            let stdout = String::from_utf8_lossy(&output.stdout);
            let stderr = String::from_utf8_lossy(&output.stderr);
            let mut text = String::new();
            text.push_str(stdout.trim_end());
            if !stderr.trim().is_empty() {
                if !text.is_empty() {
                    text.push('\n');
                }
                text.push_str(stderr.trim_end());
            }
            if text.len() > OUTPUT_LIMIT_BYTES {
                let cut = floor_char_boundary(&text, OUTPUT_LIMIT_BYTES);
                text.truncate(cut);
                text.push_str("\n[output truncated]");
            }

            let result = if output.status.success() {
                ToolOutput::ok(text).with_payload(json!({
                    "exit_code": 0,
                    "stdout_bytes": output.stdout.len(),
                    "stderr_bytes": output.stderr.len(),
                }))
            } else {
                let code = output.status.code().unwrap_or(-1);
                if !text.is_empty() {
                    text.push('\n');
                }
                text.push_str(&format!("Exit code {code}"));
                ToolOutput::err(text).with_payload(json!({ "exit_code": code }))
            };
            let _ = tx.send(ToolStreamItem::Result(result)).await;
        });
        Box::pin(ReceiverStream::new(rx))
    }
}

/// First safe token of a shell command, or the injection sentinel when the
/// command contains constructs that could run something other than that
/// token.
pub fn extract_command_prefix(command: &str) -> PrefixResult {
    let trimmed = command.trim();
    if INJECTION_MARKERS.iter().any(|m| trimmed.contains(m)) {
        return PrefixResult::InjectionDetected;
    }
    match trimmed.split_whitespace().next() {
        Some(token) => PrefixResult::Safe(token.to_string()),
        None => PrefixResult::InjectionDetected,
    }
}

fn floor_char_boundary(s: &str, mut idx: usize) -> usize {
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use futures::StreamExt;
    use serde_json::json;

    use super::*;

    async fn run(tool: &BashTool, input: Value) -> (Vec<String>, ToolOutput) {
        let mut stream = tool.call(input, ToolUseContext::default());
        let mut progress = Vec::new();
        loop {
            match stream.next().await.expect("stream must terminate with a result") {
                ToolStreamItem::Progress(p) => progress.push(p),
                ToolStreamItem::Result(r) => return (progress, r),
            }
        }
    }

    // ── Prefix extraction ─────────────────────────────────────────────────────

    #[test]
    fn prefix_is_first_token() {
        assert_eq!(
            extract_command_prefix("git status --short"),
            PrefixResult::Safe("git".into())
        );
    }

    #[test]
    fn prefix_detects_command_substitution() {
        assert_eq!(
            extract_command_prefix("echo $(rm -rf /)"),
            PrefixResult::InjectionDetected
        );
        assert_eq!(
            extract_command_prefix("echo `id`"),
            PrefixResult::InjectionDetected
        );
    }

    #[test]
    fn prefix_detects_chaining() {
        for cmd in ["ls && rm x", "ls || rm x", "ls; rm x", "ls | sh"] {
            assert_eq!(
                extract_command_prefix(cmd),
                PrefixResult::InjectionDetected,
                "{cmd}"
            );
        }
    }

    #[test]
    fn empty_command_is_not_a_safe_prefix() {
        assert_eq!(extract_command_prefix("   "), PrefixResult::InjectionDetected);
    }

    // ── cd-prelude normalization ──────────────────────────────────────────────

    #[test]
    fn normalize_strips_cd_cwd_prelude() {
        let tool = BashTool;
        let ctx = ToolUseContext::new("/work/project".into());
        let input = json!({"command": "cd /work/project && git status"});
        let norm = tool.normalize_input(input, &ctx);
        assert_eq!(norm["command"], "git status");
    }

    #[test]
    fn normalize_keeps_other_cd_preludes() {
        let tool = BashTool;
        let ctx = ToolUseContext::new("/work/project".into());
        let input = json!({"command": "cd /elsewhere && git status"});
        let norm = tool.normalize_input(input, &ctx);
        assert_eq!(norm["command"], "cd /elsewhere && git status");
    }

    // ── Execution ─────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn echo_command_captures_stdout() {
        let (progress, result) = run(&BashTool, json!({"command": "echo hello"})).await;
        assert!(!result.is_error);
        assert_eq!(result.content.as_text(), "hello");
        assert!(progress.iter().any(|p| p.contains("echo hello")));
    }

    #[tokio::test]
    async fn failing_command_reports_exit_code() {
        let (_, result) = run(&BashTool, json!({"command": "exit 3"})).await;
        assert!(result.is_error);
        assert!(result.content.as_text().contains("Exit code 3"));
    }

    #[tokio::test]
    async fn timeout_is_enforced() {
        let (_, result) = run(&BashTool, json!({"command": "sleep 5", "timeout": 50})).await;
        assert!(result.is_error);
        assert!(result.content.as_text().contains("timed out"));
    }

    #[tokio::test]
    async fn validate_rejects_empty_command() {
        let tool = BashTool;
        let err = tool
            .validate_input(&json!({"command": "  "}), &ToolUseContext::default())
            .await
            .unwrap_err();
        assert!(err.contains("empty"));
    }
}
