// Copyright (c) 2025-2026 Kode Contributors <dev@kode.tools>
//
// SPDX-License-Identifier: Apache-2.0
//! The tool execution controller.
//!
//! Takes the tool_use blocks of one assistant message and drives each through
//! validation, the permission gate, and execution, streaming progress and
//! terminal results to the UI as they happen.  A set made up entirely of
//! read-only tools runs concurrently (bounded fan-out); any write tool in
//! the set forces serial dispatch in emission order, so write/write and
//! read/write interleavings the model may not have intended cannot occur.

use std::sync::{Arc, Mutex};

use futures::StreamExt;
use serde_json::Value;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, warn};

use kode_model::{Message, CANCEL_MESSAGE};
use kode_tools::{
    validate_against_schema, PermissionDecision, PermissionGate, ToolRegistry, ToolStreamItem,
    ToolUseContext,
};

use crate::events::AgentEvent;
use crate::reminders::{ReminderEvent, ReminderService};
use crate::request::RequestContext;

/// Bounded fan-out for concurrent (all-read-only) dispatch.
pub const MAX_CONCURRENT_TOOLS: usize = 10;

/// Error bodies longer than this are cut down with a middle ellipsis.
const ERROR_TRUNCATE_CHARS: usize = 10_000;

/// One tool_use block extracted from an assistant message.
#[derive(Debug, Clone)]
pub struct ToolUseRequest {
    pub id: String,
    pub name: String,
    pub input: Value,
}

/// What a dispatch produced: terminal tool-result messages in tool-use
/// emission order (exactly one per id), and whether cancellation fired.
pub struct DispatchOutcome {
    pub results: Vec<Message>,
    pub aborted: bool,
}

#[derive(Clone)]
pub struct ToolExecutor {
    tools: Arc<ToolRegistry>,
    gate: Arc<PermissionGate>,
    /// Shared with the driver so tool completions can queue reminders for
    /// the next turn (currently: file reads).
    reminders: Arc<Mutex<ReminderService>>,
}

/// Internal merge-channel item: (tool-use index, message, is_terminal).
type Emitted = (usize, Message, bool);

impl ToolExecutor {
    pub fn new(
        tools: Arc<ToolRegistry>,
        gate: Arc<PermissionGate>,
        reminders: Arc<Mutex<ReminderService>>,
    ) -> Self {
        Self {
            tools,
            gate,
            reminders,
        }
    }

    /// True when every tool in the set is read-only, the condition for
    /// concurrent dispatch.  Unknown tools count as writes.
    pub fn all_read_only(&self, uses: &[ToolUseRequest]) -> bool {
        uses.iter().all(|u| {
            self.tools
                .get(&u.name)
                .map(|t| t.is_read_only())
                .unwrap_or(false)
        })
    }

    pub async fn dispatch(
        &self,
        uses: Vec<ToolUseRequest>,
        ctx: ToolUseContext,
        request: &RequestContext,
        tx: &mpsc::Sender<AgentEvent>,
    ) -> DispatchOutcome {
        let n = uses.len();
        if n == 0 {
            return DispatchOutcome {
                results: Vec::new(),
                aborted: request.is_aborted(),
            };
        }
        let siblings: Vec<String> = uses.iter().map(|u| u.id.clone()).collect();
        let uses = Arc::new(uses);
        let concurrent = self.all_read_only(&uses);
        debug!(count = n, concurrent, "dispatching tool uses");

        let (emit, mut merged) = mpsc::channel::<Emitted>(64);
        let mut workers = Vec::new();

        if concurrent {
            let semaphore = Arc::new(Semaphore::new(MAX_CONCURRENT_TOOLS));
            for index in 0..n {
                let executor = self.clone();
                let uses = Arc::clone(&uses);
                let siblings = siblings.clone();
                let ctx = ctx.clone();
                let request = request.clone();
                let emit = emit.clone();
                let semaphore = Arc::clone(&semaphore);
                workers.push(tokio::spawn(async move {
                    let Ok(_permit) = semaphore.acquire().await else {
                        return;
                    };
                    executor
                        .run_one(index, &uses[index], &siblings, &ctx, &request, &emit)
                        .await;
                }));
            }
        } else {
            let executor = self.clone();
            let uses = Arc::clone(&uses);
            let siblings = siblings.clone();
            let ctx = ctx.clone();
            let request = request.clone();
            let emit = emit.clone();
            workers.push(tokio::spawn(async move {
                for index in 0..uses.len() {
                    if request.is_aborted() {
                        break;
                    }
                    executor
                        .run_one(index, &uses[index], &siblings, &ctx, &request, &emit)
                        .await;
                }
            }));
        }
        drop(emit);

        let mut results: Vec<Option<Message>> = (0..n).map(|_| None).collect();
        let mut aborted = false;
        while results.iter().any(Option::is_none) {
            tokio::select! {
                biased;
                _ = request.cancelled() => {
                    aborted = true;
                    break;
                }
                item = merged.recv() => match item {
                    Some((index, message, terminal)) => {
                        let _ = tx.send(AgentEvent::Message(message.clone())).await;
                        if terminal {
                            results[index] = Some(message);
                        }
                    }
                    None => break,
                }
            }
        }

        if aborted {
            // Stop whatever is still running (dropping a tool stream kills
            // its child process) and close out every unterminated id so the
            // UI's in-flight set clears.
            for worker in &workers {
                worker.abort();
            }
            for (index, slot) in results.iter_mut().enumerate() {
                if slot.is_none() {
                    let message = cancellation_result(&uses[index].id);
                    let _ = tx.send(AgentEvent::Message(message.clone())).await;
                    *slot = Some(message);
                }
            }
        } else {
            // A worker ended without a terminal result (tool stream bug).
            for (index, slot) in results.iter_mut().enumerate() {
                if slot.is_none() {
                    warn!(id = %uses[index].id, "tool ended without a result");
                    let message = error_result(
                        &uses[index].id,
                        "Tool execution ended without producing a result",
                    );
                    let _ = tx.send(AgentEvent::Message(message.clone())).await;
                    *slot = Some(message);
                }
            }
        }

        DispatchOutcome {
            results: results.into_iter().flatten().collect(),
            aborted: aborted || request.is_aborted(),
        }
    }

    /// Run one tool use through the full pipeline, sending progress and the
    /// terminal message into the merge channel.  Cancellation is handled by
    /// the merge loop; a permission `abort` outcome cancels the request and
    /// lets the merge loop close this id out.
    async fn run_one(
        &self,
        index: usize,
        use_: &ToolUseRequest,
        siblings: &[String],
        ctx: &ToolUseContext,
        request: &RequestContext,
        emit: &mpsc::Sender<Emitted>,
    ) {
        if request.is_aborted() {
            return;
        }

        let Some(tool) = self.tools.get(&use_.name) else {
            let msg = error_result(
                &use_.id,
                format!("No such tool available: {}", use_.name),
            );
            let _ = emit.send((index, msg, true)).await;
            return;
        };

        if let Err(mut message) = validate_against_schema(&tool.input_schema(), &use_.input) {
            // The model calling the file-read tool with no arguments is
            // common enough to deserve a targeted nudge.
            if use_.name == "read" && use_.input.get("file_path").is_none() {
                message.push_str(
                    "\nHint: call read with {\"file_path\": \"path/to/file\"}.",
                );
            }
            let msg = error_result(&use_.id, format!("InputValidationError: {message}"));
            let _ = emit.send((index, msg, true)).await;
            return;
        }

        let input = tool.normalize_input(use_.input.clone(), ctx);

        if let Err(message) = tool.validate_input(&input, ctx).await {
            let msg = error_result(&use_.id, message);
            let _ = emit.send((index, msg, true)).await;
            return;
        }

        match self.gate.can_use_tool(tool.as_ref(), &input, ctx).await {
            PermissionDecision::Allow => {}
            PermissionDecision::Deny { message, abort } => {
                if abort {
                    request.abort();
                    return;
                }
                let msg = error_result(&use_.id, message);
                let _ = emit.send((index, msg, true)).await;
                return;
            }
        }

        // File-read reminders key on the normalized input path.
        let read_path = (use_.name == "read")
            .then(|| input.get("file_path").and_then(Value::as_str))
            .flatten()
            .map(str::to_string);

        let mut stream = tool.call(input, ctx.clone());
        while let Some(item) = stream.next().await {
            match item {
                ToolStreamItem::Progress(text) => {
                    let msg = progress_message(&use_.id, siblings.to_vec(), &use_.name, &text);
                    let _ = emit.send((index, msg, false)).await;
                }
                ToolStreamItem::Result(output) => {
                    if !output.is_error {
                        if let Some(path) = &read_path {
                            self.reminders.lock().unwrap().notify(
                                ReminderEvent::FileRead,
                                format!("file_read:{path}"),
                                format!(
                                    "The file {path} was read earlier in this session. \
                                     Re-read it before editing if it may have changed \
                                     externally."
                                ),
                            );
                        }
                    }
                    let content = if output.is_error {
                        kode_model::ToolResultContent::Text(truncate_middle(
                            &output.content.as_text(),
                            ERROR_TRUNCATE_CHARS,
                        ))
                    } else {
                        output.content
                    };
                    let mut msg = Message::tool_result(&use_.id, content, output.is_error);
                    if let Message::User(u) = &mut msg {
                        u.tool_use_result = output.payload;
                    }
                    let _ = emit.send((index, msg, true)).await;
                    return;
                }
            }
        }
        // Stream ended without a result; the merge loop fills in an error.
    }
}

fn progress_message(id: &str, siblings: Vec<String>, tool_name: &str, text: &str) -> Message {
    let payload = match Message::assistant_text(text, tool_name) {
        Message::Assistant(a) => a,
        _ => unreachable!(),
    };
    Message::progress(id, siblings, payload)
}

fn error_result(id: &str, message: impl Into<String>) -> Message {
    Message::tool_result(id, truncate_middle(&message.into(), ERROR_TRUNCATE_CHARS), true)
}

fn cancellation_result(id: &str) -> Message {
    Message::tool_result(id, CANCEL_MESSAGE, true)
}

/// Cut `s` down to roughly `max` characters by removing the middle.
fn truncate_middle(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let keep = max / 2;
    let head: String = s.chars().take(keep).collect();
    let tail_start = s.chars().count() - keep;
    let tail: String = s.chars().skip(tail_start).collect();
    let omitted = s.chars().count() - 2 * keep;
    format!("{head}\n\n... [{omitted} characters truncated] ...\n\n{tail}")
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::json;
    use tokio::sync::mpsc;
    use tokio_stream::wrappers::ReceiverStream;

    use kode_config::PolicyMode;
    use kode_model::ContentBlock;
    use kode_tools::{
        tool::single_result, PermissionOutcome, StaticPermissionHandler, Tool, ToolOutput,
        ToolStream,
    };

    use super::*;
    use crate::request::RequestType;

    /// Records dispatch order and simulates work with a short sleep.
    struct SlowTool {
        name: &'static str,
        read_only: bool,
        delay: Duration,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &str {
            self.name
        }
        fn description(&self) -> &str {
            "test tool"
        }
        fn input_schema(&self) -> Value {
            json!({ "type": "object" })
        }
        fn is_read_only(&self) -> bool {
            self.read_only
        }
        fn call(&self, _input: Value, _ctx: ToolUseContext) -> ToolStream {
            let name = self.name;
            let delay = self.delay;
            let log = Arc::clone(&self.log);
            let (tx, rx) = mpsc::channel(4);
            tokio::spawn(async move {
                log.lock().unwrap().push(format!("{name}:start"));
                tokio::time::sleep(delay).await;
                log.lock().unwrap().push(format!("{name}:end"));
                let _ = tx
                    .send(ToolStreamItem::Result(ToolOutput::ok(format!("{name} done"))))
                    .await;
            });
            Box::pin(ReceiverStream::new(rx))
        }
    }

    /// Emits one progress item then blocks until cancelled.
    struct HangingTool;

    #[async_trait]
    impl Tool for HangingTool {
        fn name(&self) -> &str {
            "hang"
        }
        fn description(&self) -> &str {
            "hangs forever"
        }
        fn input_schema(&self) -> Value {
            json!({ "type": "object" })
        }
        fn is_read_only(&self) -> bool {
            false
        }
        fn call(&self, _input: Value, _ctx: ToolUseContext) -> ToolStream {
            let (tx, rx) = mpsc::channel(4);
            tokio::spawn(async move {
                let _ = tx
                    .send(ToolStreamItem::Progress("still working".into()))
                    .await;
                tokio::time::sleep(Duration::from_secs(3600)).await;
            });
            Box::pin(ReceiverStream::new(rx))
        }
    }

    struct StrictTool;

    #[async_trait]
    impl Tool for StrictTool {
        fn name(&self) -> &str {
            "strict"
        }
        fn description(&self) -> &str {
            "requires a path"
        }
        fn input_schema(&self) -> Value {
            json!({
                "type": "object",
                "properties": { "path": { "type": "string" } },
                "required": ["path"]
            })
        }
        fn is_read_only(&self) -> bool {
            true
        }
        async fn validate_input(&self, input: &Value, _ctx: &ToolUseContext) -> Result<(), String> {
            if input["path"] == "/forbidden" {
                return Err("path is forbidden".into());
            }
            Ok(())
        }
        fn call(&self, _input: Value, _ctx: ToolUseContext) -> ToolStream {
            single_result(ToolOutput::ok("strict ok"))
        }
    }

    fn allow_all_gate() -> Arc<PermissionGate> {
        Arc::new(PermissionGate::new(
            PolicyMode::Default,
            true,
            Box::new(StaticPermissionHandler(PermissionOutcome::AllowTemporary)),
        ))
    }

    fn executor_with(tools: Vec<Arc<dyn Tool>>, gate: Arc<PermissionGate>) -> ToolExecutor {
        let mut registry = ToolRegistry::new();
        for tool in tools {
            registry.register_arc(tool);
        }
        ToolExecutor::new(
            Arc::new(registry),
            gate,
            Arc::new(Mutex::new(ReminderService::new())),
        )
    }

    fn use_req(id: &str, name: &str, input: Value) -> ToolUseRequest {
        ToolUseRequest {
            id: id.into(),
            name: name.into(),
            input,
        }
    }

    async fn collect_until_closed(mut rx: mpsc::Receiver<AgentEvent>) -> Vec<Message> {
        let mut out = Vec::new();
        while let Some(ev) = rx.recv().await {
            if let AgentEvent::Message(m) = ev {
                out.push(m);
            }
        }
        out
    }

    // ── Concurrency policy ────────────────────────────────────────────────────

    #[tokio::test]
    async fn read_only_set_runs_concurrently() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let exec = executor_with(
            vec![
                Arc::new(SlowTool {
                    name: "r1",
                    read_only: true,
                    delay: Duration::from_millis(50),
                    log: Arc::clone(&log),
                }),
                Arc::new(SlowTool {
                    name: "r2",
                    read_only: true,
                    delay: Duration::from_millis(50),
                    log: Arc::clone(&log),
                }),
            ],
            allow_all_gate(),
        );
        let (tx, rx) = mpsc::channel(64);
        let request = RequestContext::new(RequestType::Query);
        let outcome = exec
            .dispatch(
                vec![use_req("a", "r1", json!({})), use_req("b", "r2", json!({}))],
                ToolUseContext::default(),
                &request,
                &tx,
            )
            .await;
        drop(tx);
        let _ = collect_until_closed(rx).await;

        assert_eq!(outcome.results.len(), 2);
        let order = log.lock().unwrap().clone();
        // Both tools started before either finished, i.e. concurrent dispatch.
        let r1_end = order.iter().position(|e| e == "r1:end").unwrap();
        let r2_start = order.iter().position(|e| e == "r2:start").unwrap();
        assert!(r2_start < r1_end, "read-only tools must overlap: {order:?}");
    }

    #[tokio::test]
    async fn write_tool_forces_serial_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let exec = executor_with(
            vec![
                Arc::new(SlowTool {
                    name: "reader",
                    read_only: true,
                    delay: Duration::from_millis(40),
                    log: Arc::clone(&log),
                }),
                Arc::new(SlowTool {
                    name: "writer",
                    read_only: false,
                    delay: Duration::from_millis(10),
                    log: Arc::clone(&log),
                }),
            ],
            allow_all_gate(),
        );
        let (tx, rx) = mpsc::channel(64);
        let request = RequestContext::new(RequestType::Query);
        let _ = exec
            .dispatch(
                vec![
                    use_req("a", "reader", json!({})),
                    use_req("b", "writer", json!({})),
                ],
                ToolUseContext::default(),
                &request,
                &tx,
            )
            .await;
        drop(tx);
        let _ = collect_until_closed(rx).await;

        let order = log.lock().unwrap().clone();
        assert_eq!(
            order,
            vec!["reader:start", "reader:end", "writer:start", "writer:end"],
            "the reader must fully complete before the writer starts"
        );
    }

    // ── Result pairing ────────────────────────────────────────────────────────

    #[tokio::test]
    async fn results_come_back_in_emission_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        // First tool is slower, so it completes second; results must still
        // be returned in emission order a, b.
        let exec = executor_with(
            vec![
                Arc::new(SlowTool {
                    name: "slow",
                    read_only: true,
                    delay: Duration::from_millis(60),
                    log: Arc::clone(&log),
                }),
                Arc::new(SlowTool {
                    name: "fast",
                    read_only: true,
                    delay: Duration::from_millis(5),
                    log,
                }),
            ],
            allow_all_gate(),
        );
        let (tx, rx) = mpsc::channel(64);
        let request = RequestContext::new(RequestType::Query);
        let outcome = exec
            .dispatch(
                vec![
                    use_req("a", "slow", json!({})),
                    use_req("b", "fast", json!({})),
                ],
                ToolUseContext::default(),
                &request,
                &tx,
            )
            .await;
        drop(tx);
        let _ = collect_until_closed(rx).await;

        let ids: Vec<_> = outcome
            .results
            .iter()
            .map(|m| m.tool_result_id().unwrap().to_string())
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn missing_tool_yields_error_result() {
        let exec = executor_with(vec![], allow_all_gate());
        let (tx, rx) = mpsc::channel(64);
        let request = RequestContext::new(RequestType::Query);
        let outcome = exec
            .dispatch(
                vec![use_req("a", "ghost", json!({}))],
                ToolUseContext::default(),
                &request,
                &tx,
            )
            .await;
        drop(tx);
        let _ = collect_until_closed(rx).await;

        match &outcome.results[0].content()[0] {
            ContentBlock::ToolResult {
                content, is_error, ..
            } => {
                assert!(is_error);
                assert_eq!(content.as_text(), "No such tool available: ghost");
            }
            _ => panic!("expected tool_result"),
        }
    }

    #[tokio::test]
    async fn schema_failure_never_reaches_the_tool() {
        let exec = executor_with(vec![Arc::new(StrictTool)], allow_all_gate());
        let (tx, rx) = mpsc::channel(64);
        let request = RequestContext::new(RequestType::Query);
        let outcome = exec
            .dispatch(
                vec![use_req("a", "strict", json!({}))],
                ToolUseContext::default(),
                &request,
                &tx,
            )
            .await;
        drop(tx);
        let _ = collect_until_closed(rx).await;

        match &outcome.results[0].content()[0] {
            ContentBlock::ToolResult {
                content, is_error, ..
            } => {
                assert!(is_error);
                assert!(content.as_text().contains("InputValidationError"));
                assert!(content.as_text().contains("'path'"));
            }
            _ => panic!("expected tool_result"),
        }
    }

    #[tokio::test]
    async fn validate_input_hook_failure_is_reported() {
        let exec = executor_with(vec![Arc::new(StrictTool)], allow_all_gate());
        let (tx, rx) = mpsc::channel(64);
        let request = RequestContext::new(RequestType::Query);
        let outcome = exec
            .dispatch(
                vec![use_req("a", "strict", json!({"path": "/forbidden"}))],
                ToolUseContext::default(),
                &request,
                &tx,
            )
            .await;
        drop(tx);
        let _ = collect_until_closed(rx).await;

        match &outcome.results[0].content()[0] {
            ContentBlock::ToolResult {
                content, is_error, ..
            } => {
                assert!(is_error);
                assert_eq!(content.as_text(), "path is forbidden");
            }
            _ => panic!("expected tool_result"),
        }
    }

    #[tokio::test]
    async fn permission_denial_becomes_error_result() {
        let gate = Arc::new(PermissionGate::new(
            PolicyMode::Plan,
            true,
            Box::new(StaticPermissionHandler(PermissionOutcome::AllowTemporary)),
        ));
        let log = Arc::new(Mutex::new(Vec::new()));
        let exec = executor_with(
            vec![Arc::new(SlowTool {
                name: "writer",
                read_only: false,
                delay: Duration::from_millis(1),
                log,
            })],
            gate,
        );
        let (tx, rx) = mpsc::channel(64);
        let request = RequestContext::new(RequestType::Query);
        let outcome = exec
            .dispatch(
                vec![use_req("a", "writer", json!({}))],
                ToolUseContext::default(),
                &request,
                &tx,
            )
            .await;
        drop(tx);
        let _ = collect_until_closed(rx).await;

        match &outcome.results[0].content()[0] {
            ContentBlock::ToolResult {
                content, is_error, ..
            } => {
                assert!(is_error);
                assert!(content.as_text().contains("plan mode"));
            }
            _ => panic!("expected tool_result"),
        }
    }

    // ── Cancellation ──────────────────────────────────────────────────────────

    #[tokio::test]
    async fn cancellation_mid_tool_emits_cancel_result_after_progress() {
        let exec = executor_with(vec![Arc::new(HangingTool)], allow_all_gate());
        let (tx, mut rx) = mpsc::channel(64);
        let request = RequestContext::new(RequestType::Query);

        let exec2 = exec.clone();
        let request2 = request.clone();
        let handle = tokio::spawn(async move {
            exec2
                .dispatch(
                    vec![use_req("a", "hang", json!({}))],
                    ToolUseContext::default(),
                    &request2,
                    &tx,
                )
                .await
        });

        // Wait for the progress message, then cancel.
        let first = rx.recv().await.unwrap();
        match &first {
            AgentEvent::Message(Message::Progress(p)) => assert_eq!(p.tool_use_id, "a"),
            other => panic!("expected progress first, got {other:?}"),
        }
        request.abort();

        let outcome = handle.await.unwrap();
        assert!(outcome.aborted);
        assert_eq!(outcome.results.len(), 1);
        match &outcome.results[0].content()[0] {
            ContentBlock::ToolResult {
                content, is_error, ..
            } => {
                assert!(is_error);
                assert_eq!(content.as_text(), CANCEL_MESSAGE);
            }
            _ => panic!("expected tool_result"),
        }
    }

    #[tokio::test]
    async fn cancellation_closes_out_every_unterminated_id() {
        let exec = executor_with(vec![Arc::new(HangingTool)], allow_all_gate());
        let (tx, mut rx) = mpsc::channel(64);
        let request = RequestContext::new(RequestType::Query);

        let exec2 = exec.clone();
        let request2 = request.clone();
        let handle = tokio::spawn(async move {
            exec2
                .dispatch(
                    vec![
                        use_req("a", "hang", json!({})),
                        use_req("b", "hang", json!({})),
                    ],
                    ToolUseContext::default(),
                    &request2,
                    &tx,
                )
                .await
        });
        let _ = rx.recv().await;
        request.abort();

        let outcome = handle.await.unwrap();
        // Exactly one terminal result per dispatched id.
        assert_eq!(outcome.results.len(), 2);
        let ids: Vec<_> = outcome
            .results
            .iter()
            .map(|m| m.tool_result_id().unwrap().to_string())
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn pre_aborted_request_cancels_without_running_anything() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let exec = executor_with(
            vec![Arc::new(SlowTool {
                name: "r",
                read_only: true,
                delay: Duration::from_millis(1),
                log: Arc::clone(&log),
            })],
            allow_all_gate(),
        );
        let (tx, rx) = mpsc::channel(64);
        let request = RequestContext::new(RequestType::Query);
        request.abort();
        let outcome = exec
            .dispatch(
                vec![use_req("a", "r", json!({}))],
                ToolUseContext::default(),
                &request,
                &tx,
            )
            .await;
        drop(tx);
        let _ = collect_until_closed(rx).await;

        assert!(outcome.aborted);
        assert_eq!(outcome.results.len(), 1);
        assert!(log.lock().unwrap().is_empty());
    }

    // ── Reminder wiring ───────────────────────────────────────────────────────

    struct FakeReadTool;

    #[async_trait]
    impl Tool for FakeReadTool {
        fn name(&self) -> &str {
            "read"
        }
        fn description(&self) -> &str {
            "fake file reader"
        }
        fn input_schema(&self) -> Value {
            json!({
                "type": "object",
                "properties": { "file_path": { "type": "string" } },
                "required": ["file_path"]
            })
        }
        fn is_read_only(&self) -> bool {
            true
        }
        fn call(&self, input: Value, _ctx: ToolUseContext) -> ToolStream {
            if input["file_path"] == "/missing" {
                return single_result(ToolOutput::err("no such file"));
            }
            single_result(ToolOutput::ok("file contents"))
        }
    }

    #[tokio::test]
    async fn successful_read_queues_a_file_read_reminder() {
        let exec = executor_with(vec![Arc::new(FakeReadTool)], allow_all_gate());
        let (tx, rx) = mpsc::channel(64);
        let request = RequestContext::new(RequestType::Query);
        let _ = exec
            .dispatch(
                vec![use_req("a", "read", json!({"file_path": "src/lib.rs"}))],
                ToolUseContext::default(),
                &request,
                &tx,
            )
            .await;
        drop(tx);
        let _ = collect_until_closed(rx).await;

        let due = exec.reminders.lock().unwrap().drain_due();
        assert_eq!(due.len(), 1);
        assert!(due[0].contains("src/lib.rs"), "{due:?}");
    }

    #[tokio::test]
    async fn failed_read_queues_no_reminder() {
        let exec = executor_with(vec![Arc::new(FakeReadTool)], allow_all_gate());
        let (tx, rx) = mpsc::channel(64);
        let request = RequestContext::new(RequestType::Query);
        let _ = exec
            .dispatch(
                vec![use_req("a", "read", json!({"file_path": "/missing"}))],
                ToolUseContext::default(),
                &request,
                &tx,
            )
            .await;
        drop(tx);
        let _ = collect_until_closed(rx).await;

        assert!(exec.reminders.lock().unwrap().drain_due().is_empty());
    }

    // ── Error formatting ──────────────────────────────────────────────────────

    #[test]
    fn truncate_middle_keeps_head_and_tail() {
        let s = "a".repeat(6000) + &"b".repeat(6000);
        let cut = truncate_middle(&s, 10_000);
        assert!(cut.len() < s.len());
        assert!(cut.starts_with("aaaa"));
        assert!(cut.ends_with("bbbb"));
        assert!(cut.contains("characters truncated"));
    }

    #[test]
    fn truncate_middle_short_strings_untouched() {
        assert_eq!(truncate_middle("short", 10_000), "short");
    }
}
