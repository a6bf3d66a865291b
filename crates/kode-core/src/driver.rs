// Copyright (c) 2025-2026 Kode Contributors <dev@kode.tools>
//
// SPDX-License-Identifier: Apache-2.0
//! The conversation driver: one user request becomes a chain of turns, each
//! turn one model call plus zero or more tool dispatches, recursing on the
//! extended history until the model answers without requesting tools.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use async_recursion::async_recursion;
use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use kode_config::{CompactionConfig, ToolsConfig};
use kode_model::{
    normalize_for_api, AssistantMessage, CompletionRequest, ContentBlock, Message, ModelProvider,
    ResponseEvent, TokenUsage, INTERRUPT_MESSAGE, INTERRUPT_MESSAGE_FOR_TOOL_USE,
};
use kode_tools::{PermissionGate, ToolRegistry, ToolUseContext};

use crate::compactor::{CompactionOutcome, Compactor};
use crate::events::AgentEvent;
use crate::executor::{ToolExecutor, ToolUseRequest};
use crate::prompts::build_system_prompt;
use crate::reminders::{ReminderEvent, ReminderService};
use crate::request::RequestContext;

/// History length past which the long-session reminder fires (once).
const LONG_SESSION_MESSAGES: usize = 120;

/// Optional pre-dispatch hook: two completions are requested in parallel and
/// the comparator picks the reply to keep.  Applied before any tool runs;
/// the rejected reply is dropped wholesale.
pub trait BinaryFeedback: Send + Sync {
    /// Return 0 to keep `a`, anything else to keep `b`.
    fn choose(&self, a: &AssistantMessage, b: &AssistantMessage) -> usize;
}

pub struct ConversationOptions {
    pub system_prompt_lines: Vec<String>,
    /// Appended to the system prompt as `<context name="k">v</context>`.
    pub context_vars: BTreeMap<String, String>,
    pub compaction: CompactionConfig,
    pub tools_config: ToolsConfig,
    pub cwd: PathBuf,
    pub binary_feedback: Option<Arc<dyn BinaryFeedback>>,
}

impl Default for ConversationOptions {
    fn default() -> Self {
        Self {
            system_prompt_lines: vec!["You are kode, a terminal-based coding assistant.".into()],
            context_vars: BTreeMap::new(),
            compaction: CompactionConfig::default(),
            tools_config: ToolsConfig::default(),
            cwd: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            binary_feedback: None,
        }
    }
}

enum CallOutcome {
    Assistant(AssistantMessage),
    Interrupted,
}

/// Owns the message history for a sequence of requests and drives the
/// turn loop.  Tools receive an immutable snapshot of the history; all
/// mutation happens here.
pub struct Conversation {
    model: Arc<dyn ModelProvider>,
    tools: Arc<ToolRegistry>,
    executor: ToolExecutor,
    compactor: Compactor,
    /// Shared with the executor, whose tool completions queue reminders.
    reminders: Arc<Mutex<ReminderService>>,
    history: Vec<Message>,
    options: ConversationOptions,
    gate: Arc<PermissionGate>,
}

impl Conversation {
    pub fn new(
        model: Arc<dyn ModelProvider>,
        tools: Arc<ToolRegistry>,
        gate: Arc<PermissionGate>,
        options: ConversationOptions,
    ) -> Self {
        let reminders = Arc::new(Mutex::new(ReminderService::new()));
        let executor = ToolExecutor::new(
            Arc::clone(&tools),
            Arc::clone(&gate),
            Arc::clone(&reminders),
        );
        let compactor = Compactor::new(options.compaction.clone(), Arc::clone(&model));
        Self {
            model,
            tools,
            executor,
            compactor,
            reminders,
            history: Vec::new(),
            options,
            gate,
        }
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn replace_history(&mut self, messages: Vec<Message>) {
        self.history = messages;
    }

    /// Reset history (the `/clear` command).
    pub fn clear(&mut self) {
        self.history.clear();
    }

    /// Queue a reminder from outside the loop (todo updates, file watchers).
    pub fn notify_reminder(
        &self,
        event: ReminderEvent,
        key: impl Into<String>,
        text: impl Into<String>,
    ) {
        self.reminders.lock().unwrap().notify(event, key, text);
    }

    pub fn gate(&self) -> &Arc<PermissionGate> {
        &self.gate
    }

    /// Force an LLM summary compaction (the `/compact` command).
    pub async fn compact(&mut self) -> CompactionOutcome {
        self.compactor.compact_via_summary(&mut self.history).await
    }

    /// Append a user message and drive the request to completion, streaming
    /// events through `tx`.
    pub async fn submit(
        &mut self,
        input: &str,
        tx: mpsc::Sender<AgentEvent>,
        request: RequestContext,
    ) -> anyhow::Result<()> {
        self.submit_messages(vec![Message::user_text(input)], tx, request)
            .await
    }

    /// Like [`submit`] but with pre-built messages (prompt commands).
    pub async fn submit_messages(
        &mut self,
        messages: Vec<Message>,
        tx: mpsc::Sender<AgentEvent>,
        request: RequestContext,
    ) -> anyhow::Result<()> {
        self.history.extend(messages);
        let result = self.run_turn(&tx, &request).await;
        let _ = tx.send(AgentEvent::TurnComplete).await;
        result
    }

    #[async_recursion]
    async fn run_turn(
        &mut self,
        tx: &mpsc::Sender<AgentEvent>,
        request: &RequestContext,
    ) -> anyhow::Result<()> {
        let _ = tx
            .send(AgentEvent::TurnStart {
                request_id: request.id(),
            })
            .await;
        self.gate.begin_turn();

        let compaction = self.compactor.maybe_compact(&mut self.history).await;
        if compaction.compacted {
            let _ = tx
                .send(AgentEvent::ContextCompacted {
                    tokens_before: compaction.tokens_before,
                    tokens_after: compaction.tokens_after,
                    strategy: compaction.strategy,
                })
                .await;
        }

        let due = {
            let mut reminders = self.reminders.lock().unwrap();
            // Tool-result user messages carry tool output, not user text;
            // only genuine user input is scanned for mentions.
            if let Some(latest_user) = self
                .history
                .iter()
                .rev()
                .find(|m| matches!(m, Message::User(_)) && !m.is_tool_result())
            {
                reminders.scan_mentions(&latest_user.text());
            }
            if self.history.len() >= LONG_SESSION_MESSAGES {
                reminders.notify(
                    ReminderEvent::LongSession,
                    "long_session",
                    "This session has grown long; earlier context may have been \
                     compacted away. Re-read files before editing them.",
                );
            }
            reminders.drain_due()
        };
        ReminderService::inject(&due, &mut self.history);

        if request.is_aborted() {
            self.yield_interrupt(tx, INTERRUPT_MESSAGE).await;
            return Ok(());
        }

        let assistant = match self.call_model(request).await {
            Ok(CallOutcome::Interrupted) => {
                self.yield_interrupt(tx, INTERRUPT_MESSAGE).await;
                return Ok(());
            }
            Ok(CallOutcome::Assistant(a)) => a,
            Err(e) => {
                // Request-scoped failure: surfaced as a final assistant
                // message, never a crash of the loop.
                warn!(error = %e, "model call failed");
                let msg = Message::Assistant(api_error_message(&e, self.model.model_name()));
                let _ = tx.send(AgentEvent::Message(msg.clone())).await;
                self.history.push(msg);
                return Ok(());
            }
        };

        let uses: Vec<ToolUseRequest> = assistant
            .content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::ToolUse { id, name, input } => Some(ToolUseRequest {
                    id: id.clone(),
                    name: name.clone(),
                    input: input.clone(),
                }),
                _ => None,
            })
            .collect();

        let assistant_msg = Message::Assistant(assistant);
        let _ = tx.send(AgentEvent::Message(assistant_msg.clone())).await;
        self.history.push(assistant_msg);

        // A turn without tool uses closes the conversation driver.
        if uses.is_empty() {
            return Ok(());
        }

        debug!(count = uses.len(), "assistant requested tool uses");
        let ctx = ToolUseContext {
            cwd: self.options.cwd.clone(),
            config: self.options.tools_config.clone(),
            history: Arc::new(self.history.clone()),
        };
        let outcome = self.executor.dispatch(uses, ctx, request, tx).await;

        // Terminal results enter the history in tool-use emission order, so
        // the next call's input pairs every tool_use with its result.
        self.history.extend(outcome.results.iter().cloned());

        if outcome.aborted {
            self.yield_interrupt(tx, INTERRUPT_MESSAGE_FOR_TOOL_USE).await;
            return Ok(());
        }

        self.run_turn(tx, request).await
    }

    async fn yield_interrupt(&mut self, tx: &mpsc::Sender<AgentEvent>, sentinel: &str) {
        let msg = Message::assistant_text(sentinel, self.model.model_name());
        let _ = tx.send(AgentEvent::Message(msg.clone())).await;
        self.history.push(msg);
    }

    fn build_request(&self) -> CompletionRequest {
        let system_prompt = build_system_prompt(
            &self.options.system_prompt_lines,
            &self.options.context_vars,
        );
        let previous_response_id = self.history.iter().rev().find_map(|m| match m {
            Message::Assistant(a) => a.response_id.clone(),
            _ => None,
        });
        CompletionRequest {
            messages: normalize_for_api(&self.history),
            system_prompt,
            tools: self.tools.schemas(),
            previous_response_id,
            max_tokens: None,
        }
    }

    async fn call_model(&self, request: &RequestContext) -> anyhow::Result<CallOutcome> {
        let req = self.build_request();
        let Some(comparator) = self.options.binary_feedback.clone() else {
            return self.one_completion(req, request).await;
        };

        // Binary feedback: both completions run in parallel and share the
        // request's cancellation.  One side failing is tolerated when the
        // other succeeds.
        let (a, b) = tokio::join!(
            self.one_completion(req.clone(), request),
            self.one_completion(req, request)
        );
        match (a, b) {
            (Ok(CallOutcome::Interrupted), _) | (_, Ok(CallOutcome::Interrupted)) => {
                Ok(CallOutcome::Interrupted)
            }
            (Ok(CallOutcome::Assistant(x)), Ok(CallOutcome::Assistant(y))) => {
                let keep = if comparator.choose(&x, &y) == 0 { x } else { y };
                Ok(CallOutcome::Assistant(keep))
            }
            (Ok(x), Err(e)) => {
                warn!(error = %e, "one binary-feedback completion failed; keeping the other");
                Ok(x)
            }
            (Err(e), Ok(y)) => {
                warn!(error = %e, "one binary-feedback completion failed; keeping the other");
                Ok(y)
            }
            (Err(e), Err(_)) => Err(e),
        }
    }

    /// One model call, assembled into a complete assistant message.
    /// Cancellation is observed both before the call and between streamed
    /// events.
    async fn one_completion(
        &self,
        req: CompletionRequest,
        request: &RequestContext,
    ) -> anyhow::Result<CallOutcome> {
        let started = Instant::now();

        let mut stream = tokio::select! {
            biased;
            _ = request.cancelled() => return Ok(CallOutcome::Interrupted),
            result = self.model.complete(req) => result?,
        };

        let mut blocks: Vec<ContentBlock> = Vec::new();
        let mut text_buf = String::new();
        let mut thinking_buf = String::new();
        let mut usage = TokenUsage::default();
        let mut response_id = None;

        loop {
            let event = tokio::select! {
                biased;
                _ = request.cancelled() => return Ok(CallOutcome::Interrupted),
                event = stream.next() => event,
            };
            let Some(event) = event else { break };
            match event? {
                ResponseEvent::ThinkingDelta(delta) => thinking_buf.push_str(&delta),
                ResponseEvent::TextDelta(delta) => {
                    flush_thinking(&mut blocks, &mut thinking_buf);
                    text_buf.push_str(&delta);
                }
                ResponseEvent::ToolUse { id, name, input } => {
                    flush_thinking(&mut blocks, &mut thinking_buf);
                    flush_text(&mut blocks, &mut text_buf);
                    blocks.push(ContentBlock::tool_use(id, name, input));
                }
                ResponseEvent::Usage {
                    input_tokens,
                    output_tokens,
                    cache_read_tokens,
                    cache_write_tokens,
                } => {
                    usage = TokenUsage {
                        input_tokens,
                        output_tokens,
                        cache_read_tokens,
                        cache_write_tokens,
                    };
                }
                ResponseEvent::ResponseId(id) => response_id = Some(id),
                ResponseEvent::Done => break,
                ResponseEvent::Error(e) => warn!("model stream warning: {e}"),
            }
        }
        flush_thinking(&mut blocks, &mut thinking_buf);
        flush_text(&mut blocks, &mut text_buf);

        Ok(CallOutcome::Assistant(AssistantMessage {
            uuid: uuid::Uuid::new_v4(),
            content: blocks,
            cost_usd: 0.0,
            duration_ms: started.elapsed().as_millis() as u64,
            model: self.model.model_name().to_string(),
            usage,
            response_id,
            is_api_error: false,
        }))
    }
}

fn flush_text(blocks: &mut Vec<ContentBlock>, buf: &mut String) {
    if !buf.is_empty() {
        blocks.push(ContentBlock::text(std::mem::take(buf)));
    }
}

fn flush_thinking(blocks: &mut Vec<ContentBlock>, buf: &mut String) {
    if !buf.is_empty() {
        blocks.push(ContentBlock::Thinking {
            thinking: std::mem::take(buf),
        });
    }
}

fn api_error_message(error: &anyhow::Error, model: &str) -> AssistantMessage {
    AssistantMessage {
        uuid: uuid::Uuid::new_v4(),
        content: vec![ContentBlock::text(format!("API Error: {error}"))],
        cost_usd: 0.0,
        duration_ms: 0,
        model: model.to_string(),
        usage: TokenUsage::default(),
        response_id: None,
        is_api_error: true,
    }
}
