// Copyright (c) 2025-2026 Kode Contributors <dev@kode.tools>
//
// SPDX-License-Identifier: Apache-2.0
//! Pure transformations over message lists.
//!
//! The UI works with *normalized* messages (one content block each) so it can
//! address individual blocks; the API wants the opposite shape (progress
//! dropped, tool-result runs coalesced into one user message).  Both
//! directions live here, together with the derived id-sets the driver and UI
//! use to decide whether a turn is closed.

use std::collections::HashSet;

use uuid::Uuid;

use crate::{
    AssistantMessage, ContentBlock, Message, ToolResultContent, UserMessage, NO_CONTENT_MESSAGE,
};

/// Split multi-block messages so each output message carries exactly one
/// content block.  Cost and duration on assistant messages are divided
/// pro-rata across the split.  Progress messages pass through unchanged.
pub fn normalize(messages: &[Message]) -> Vec<Message> {
    let mut out = Vec::with_capacity(messages.len());
    for msg in messages {
        match msg {
            Message::Progress(_) => out.push(msg.clone()),
            Message::User(u) => {
                if u.content.len() <= 1 {
                    out.push(msg.clone());
                    continue;
                }
                for block in &u.content {
                    out.push(Message::User(UserMessage {
                        uuid: Uuid::new_v4(),
                        content: vec![block.clone()],
                        tool_use_result: u.tool_use_result.clone(),
                        options: u.options.clone(),
                    }));
                }
            }
            Message::Assistant(a) => {
                if a.content.len() <= 1 {
                    out.push(msg.clone());
                    continue;
                }
                let n = a.content.len() as f64;
                for block in &a.content {
                    out.push(Message::Assistant(AssistantMessage {
                        uuid: Uuid::new_v4(),
                        content: vec![block.clone()],
                        cost_usd: a.cost_usd / n,
                        duration_ms: (a.duration_ms as f64 / n) as u64,
                        model: a.model.clone(),
                        usage: a.usage,
                        response_id: a.response_id.clone(),
                        is_api_error: a.is_api_error,
                    }));
                }
            }
        }
    }
    out
}

/// Shape the history for the LLM API: progress messages are dropped, runs of
/// consecutive tool-result user messages are coalesced into one user message
/// carrying all result blocks, and content that reduces to the empty string
/// is replaced by the no-content sentinel.
///
/// `is_error` is per-block, so errored and successful results coalesce into
/// the same message without loss.
pub fn normalize_for_api(messages: &[Message]) -> Vec<Message> {
    let mut out: Vec<Message> = Vec::with_capacity(messages.len());
    for msg in messages {
        match msg {
            Message::Progress(_) => continue,
            Message::Assistant(a) => out.push(Message::Assistant(fill_empty_assistant(a))),
            Message::User(u) => {
                let filled = fill_empty_user(u);
                let coalesced = match (out.last_mut(), filled.content.first()) {
                    (
                        Some(Message::User(prev)),
                        Some(ContentBlock::ToolResult { .. }),
                    ) if is_all_tool_results(prev) => {
                        prev.content.extend(filled.content.clone());
                        true
                    }
                    _ => false,
                };
                if !coalesced {
                    out.push(Message::User(filled));
                }
            }
        }
    }
    out
}

fn is_all_tool_results(u: &UserMessage) -> bool {
    !u.content.is_empty()
        && u.content
            .iter()
            .all(|b| matches!(b, ContentBlock::ToolResult { .. }))
}

fn fill_empty_assistant(a: &AssistantMessage) -> AssistantMessage {
    let mut a = a.clone();
    if a.content.is_empty() {
        a.content = vec![ContentBlock::text(NO_CONTENT_MESSAGE)];
        return a;
    }
    for block in &mut a.content {
        if let ContentBlock::Text { text } = block {
            if text.trim().is_empty() {
                *text = NO_CONTENT_MESSAGE.to_string();
            }
        }
    }
    a
}

fn fill_empty_user(u: &UserMessage) -> UserMessage {
    let mut u = u.clone();
    for block in &mut u.content {
        match block {
            ContentBlock::Text { text } if text.trim().is_empty() => {
                *text = NO_CONTENT_MESSAGE.to_string();
            }
            ContentBlock::ToolResult { content, .. } if content.is_empty_text() => {
                *content = ToolResultContent::Text(NO_CONTENT_MESSAGE.to_string());
            }
            _ => {}
        }
    }
    u
}

/// Move each tool-result message to sit immediately after its originating
/// tool-use (and after any progress messages for that id).  Idempotent;
/// preserves the relative order of unrelated messages.
pub fn reorder(normalized: &[Message]) -> Vec<Message> {
    let mut out: Vec<Message> = Vec::with_capacity(normalized.len());
    for msg in normalized {
        if let Some(rid) = msg.tool_result_id().map(str::to_string) {
            let anchor = out
                .iter()
                .rposition(|m| references_tool_use(m, &rid))
                .map(|p| p + 1);
            match anchor {
                Some(pos) => out.insert(pos, msg.clone()),
                // No originating tool_use in sight; leave the result where
                // it is rather than inventing an order.
                None => out.push(msg.clone()),
            }
        } else {
            out.push(msg.clone());
        }
    }
    out
}

fn references_tool_use(msg: &Message, id: &str) -> bool {
    match msg {
        Message::Progress(p) => p.tool_use_id == id,
        _ => msg.content().iter().any(|b| match b {
            ContentBlock::ToolUse { id: bid, .. } => bid == id,
            ContentBlock::ToolResult { tool_use_id, .. } => tool_use_id == id,
            _ => false,
        }),
    }
}

/// Ids of tool uses with no terminal tool-result yet, in emission order.
pub fn unresolved_tool_use_ids(normalized: &[Message]) -> Vec<String> {
    let resolved: HashSet<&str> = normalized
        .iter()
        .filter_map(|m| m.tool_result_id())
        .collect();
    let mut out = Vec::new();
    for msg in normalized {
        if matches!(msg, Message::Progress(_)) {
            continue;
        }
        for block in msg.content() {
            if let ContentBlock::ToolUse { id, .. } = block {
                if !resolved.contains(id.as_str()) {
                    out.push(id.clone());
                }
            }
        }
    }
    out
}

/// Unresolved tool-use ids that have already produced at least one progress
/// message, the UI's "spinner" set.
pub fn in_progress_tool_use_ids(normalized: &[Message]) -> Vec<String> {
    let started: HashSet<&str> = normalized
        .iter()
        .filter_map(|m| match m {
            Message::Progress(p) => Some(p.tool_use_id.as_str()),
            _ => None,
        })
        .collect();
    unresolved_tool_use_ids(normalized)
        .into_iter()
        .filter(|id| started.contains(id.as_str()))
        .collect()
}

/// Tool-use blocks whose terminal result carries `is_error`.
pub fn errored_tool_uses(normalized: &[Message]) -> Vec<ContentBlock> {
    let errored: HashSet<&str> = normalized
        .iter()
        .flat_map(|m| m.content())
        .filter_map(|b| match b {
            ContentBlock::ToolResult {
                tool_use_id,
                is_error: true,
                ..
            } => Some(tool_use_id.as_str()),
            _ => None,
        })
        .collect();
    normalized
        .iter()
        .filter(|m| !matches!(m, Message::Progress(_)))
        .flat_map(|m| m.content())
        .filter(|b| match b {
            ContentBlock::ToolUse { id, .. } => errored.contains(id.as_str()),
            _ => false,
        })
        .cloned()
        .collect()
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
