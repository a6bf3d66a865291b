// Copyright (c) 2025-2026 Kode Contributors <dev@kode.tools>
//
// SPDX-License-Identifier: Apache-2.0
//! Retention strategies: shrink a message history under a token budget.
//!
//! Strategies operate on whole messages only, so tool_use/tool_result pairs
//! and thinking blocks stay attached to the message that carries them.

use std::collections::{HashMap, HashSet};

use kode_model::{count_tokens, ContentBlock, Message};

/// Number of trailing messages every strategy keeps verbatim for continuity.
const RECENT_KEEP: usize = 5;

/// Keywords that mark an older assistant message as important enough to
/// survive `preserve_important` retention.  Deliberately language-sensitive;
/// see [`apply_retention_with_predicate`] for the override hook.
const IMPORTANT_KEYWORDS: &[&str] = &["error", "failed", "warning", "critical", "issue"];

/// Topics surfaced in the `smart_compression` summary line.
const TOPIC_KEYWORDS: &[&str] = &[
    "build", "test", "error", "config", "file", "install", "deploy", "fix", "refactor",
];

#[derive(Debug, Clone)]
pub enum RetentionStrategy {
    /// Drop the oldest messages until the tail fits; `preserve_count`
    /// overrides the token budget when given.
    PreserveRecent {
        max_tokens: u64,
        preserve_count: Option<usize>,
    },
    /// Keep the last [`RECENT_KEEP`] messages plus every important older one.
    PreserveImportant { max_tokens: u64 },
    /// Replace the older portion of the history with one synthetic summary
    /// message.
    SmartCompression { max_tokens: u64 },
    /// Reserved hook: the compactor escalates to an LLM-produced summary.
    /// As a pure retention strategy this is a pass-through.
    AutoCompact { max_tokens: u64 },
}

#[derive(Debug, Clone)]
pub struct RetentionOutcome {
    pub messages: Vec<Message>,
    pub removed: usize,
    pub tokens: u64,
    pub strategy: &'static str,
    pub summary: Option<String>,
}

/// Default importance predicate: user messages always matter; assistant
/// messages matter when their text mentions one of the failure keywords.
pub fn is_important(msg: &Message) -> bool {
    match msg {
        Message::User(_) => true,
        Message::Assistant(a) => {
            let text = a
                .content
                .iter()
                .filter_map(|b| match b {
                    kode_model::ContentBlock::Text { text } => Some(text.to_lowercase()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join(" ");
            IMPORTANT_KEYWORDS.iter().any(|k| text.contains(k))
        }
        Message::Progress(_) => false,
    }
}

pub fn apply_retention(strategy: &RetentionStrategy, messages: &[Message]) -> RetentionOutcome {
    apply_retention_with_predicate(strategy, messages, is_important)
}

/// Like [`apply_retention`] but with a caller-supplied importance predicate
/// for `preserve_important`.
pub fn apply_retention_with_predicate(
    strategy: &RetentionStrategy,
    messages: &[Message],
    important: fn(&Message) -> bool,
) -> RetentionOutcome {
    match strategy {
        RetentionStrategy::PreserveRecent {
            max_tokens,
            preserve_count,
        } => preserve_recent(messages, *max_tokens, *preserve_count),
        RetentionStrategy::PreserveImportant { max_tokens } => {
            preserve_important(messages, *max_tokens, important)
        }
        RetentionStrategy::SmartCompression { .. } => smart_compression(messages),
        RetentionStrategy::AutoCompact { .. } => RetentionOutcome {
            messages: messages.to_vec(),
            removed: 0,
            tokens: count_tokens(messages),
            strategy: "auto_compact",
            summary: None,
        },
    }
}

fn preserve_recent(
    messages: &[Message],
    max_tokens: u64,
    preserve_count: Option<usize>,
) -> RetentionOutcome {
    let kept: Vec<Message> = match preserve_count {
        Some(n) => messages[messages.len().saturating_sub(n)..].to_vec(),
        None => {
            let mut start = 0;
            while start < messages.len() && count_tokens(&messages[start..]) > max_tokens {
                start += 1;
            }
            messages[start..].to_vec()
        }
    };
    RetentionOutcome {
        removed: messages.len() - kept.len(),
        tokens: count_tokens(&kept),
        strategy: "preserve_recent",
        summary: None,
        messages: kept,
    }
}

fn preserve_important(
    messages: &[Message],
    _max_tokens: u64,
    important: fn(&Message) -> bool,
) -> RetentionOutcome {
    let recent_start = messages.len().saturating_sub(RECENT_KEEP);
    let mut keep: HashSet<usize> = (recent_start..messages.len()).collect();

    // Deduplicate older important messages by content equality so repeated
    // errors do not crowd out the rest.
    let mut seen: HashSet<String> = HashSet::new();
    for (i, msg) in messages[..recent_start].iter().enumerate() {
        if !important(msg) {
            continue;
        }
        let fingerprint = serde_json::to_string(msg.content()).unwrap_or_default();
        if seen.insert(fingerprint) {
            keep.insert(i);
        }
    }

    // A kept tool_result must not lose its originating tool_use: the
    // assistant message carrying the matching ToolUse block is retained even
    // when the importance predicate would drop it.
    let use_positions: HashMap<&str, usize> = messages
        .iter()
        .enumerate()
        .flat_map(|(i, msg)| {
            msg.content().iter().filter_map(move |b| match b {
                ContentBlock::ToolUse { id, .. } => Some((id.as_str(), i)),
                _ => None,
            })
        })
        .collect();
    let kept_result_ids: Vec<&str> = keep
        .iter()
        .flat_map(|&i| messages[i].content())
        .filter_map(|b| match b {
            ContentBlock::ToolResult { tool_use_id, .. } => Some(tool_use_id.as_str()),
            _ => None,
        })
        .collect();
    for id in kept_result_ids {
        if let Some(&position) = use_positions.get(id) {
            keep.insert(position);
        }
    }

    let mut keep_indices: Vec<usize> = keep.into_iter().collect();
    keep_indices.sort_unstable();

    let kept: Vec<Message> = keep_indices
        .into_iter()
        .map(|i| messages[i].clone())
        .collect();
    RetentionOutcome {
        removed: messages.len() - kept.len(),
        tokens: count_tokens(&kept),
        strategy: "preserve_important",
        summary: None,
        messages: kept,
    }
}

fn smart_compression(messages: &[Message]) -> RetentionOutcome {
    // Recent tail: the final ≈30% or 10 messages, whichever is smaller.
    let recent_count = ((messages.len() as f64 * 0.3).ceil() as usize).min(10);
    let split = messages.len().saturating_sub(recent_count);
    let (older, recent) = messages.split_at(split);

    if older.is_empty() {
        return RetentionOutcome {
            messages: messages.to_vec(),
            removed: 0,
            tokens: count_tokens(messages),
            strategy: "smart_compression",
            summary: None,
        };
    }

    let users = older
        .iter()
        .filter(|m| matches!(m, Message::User(_)))
        .count();
    let assistants = older
        .iter()
        .filter(|m| matches!(m, Message::Assistant(_)))
        .count();
    let tool_calls = older
        .iter()
        .flat_map(|m| m.tool_use_blocks())
        .count();
    let topics = extract_topics(older);

    let summary_text = format!(
        "[Summary of earlier conversation: {users} user messages, {assistants} assistant \
         messages, {tool_calls} tool invocations. Topics: {}]",
        if topics.is_empty() {
            "general discussion".to_string()
        } else {
            topics.join(", ")
        }
    );
    let summary = Message::assistant_text(&summary_text, "context-manager");

    let mut kept = Vec::with_capacity(recent.len() + 1);
    kept.push(summary);
    kept.extend_from_slice(recent);
    RetentionOutcome {
        removed: older.len(),
        tokens: count_tokens(&kept),
        strategy: "smart_compression",
        summary: Some(summary_text),
        messages: kept,
    }
}

fn extract_topics(messages: &[Message]) -> Vec<String> {
    let text: String = messages
        .iter()
        .map(|m| m.text().to_lowercase())
        .collect::<Vec<_>>()
        .join(" ");
    TOPIC_KEYWORDS
        .iter()
        .filter(|k| text.contains(*k))
        .take(5)
        .map(|k| k.to_string())
        .collect()
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
