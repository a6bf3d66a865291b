// Copyright (c) 2025-2026 Kode Contributors <dev@kode.tools>
//
// SPDX-License-Identifier: Apache-2.0
//! The auto-compactor: decides before every model call whether the history
//! must shrink, applies the user-preferred retention strategy, and escalates
//! to an LLM-produced summary when deterministic shrinking is not enough.

use std::sync::Arc;

use futures::StreamExt;
use tracing::{debug, warn};

use kode_config::{CompactionConfig, CompactionPreference};
use kode_model::{
    count_tokens, normalize_for_api, CompletionRequest, Message, ModelProvider, ResponseEvent,
};

use crate::prompts::COMPRESSION_PROMPT;
use crate::retention::{apply_retention, RetentionStrategy};

/// Fraction of the budget at which compaction fires.
pub const COMPACT_TRIGGER_FRACTION: f64 = 0.7;

/// Synthetic user message announcing a compaction to the model.
const COMPACTION_NOTICE: &str = "[Earlier conversation history was compacted to stay within \
the context window. The assistant message directly below summarises what was removed.]";

#[derive(Debug, Clone)]
pub struct CompactionOutcome {
    pub compacted: bool,
    pub tokens_before: u64,
    pub tokens_after: u64,
    pub strategy: String,
}

pub struct Compactor {
    config: CompactionConfig,
    model: Arc<dyn ModelProvider>,
}

impl Compactor {
    pub fn new(config: CompactionConfig, model: Arc<dyn ModelProvider>) -> Self {
        Self { config, model }
    }

    /// Shrink `messages` in place when they exceed the trigger fraction of
    /// the budget.  Returns what happened for event reporting.
    pub async fn maybe_compact(&self, messages: &mut Vec<Message>) -> CompactionOutcome {
        let budget = self.config.max_context_tokens as u64;
        let tokens_before = count_tokens(messages);
        let target = (budget as f64 * COMPACT_TRIGGER_FRACTION) as u64;

        if budget == 0 || tokens_before <= target {
            return CompactionOutcome {
                compacted: false,
                tokens_before,
                tokens_after: tokens_before,
                strategy: "none".into(),
            };
        }

        let strategy = match self.config.preference {
            CompactionPreference::Aggressive => RetentionStrategy::PreserveRecent {
                max_tokens: target,
                preserve_count: None,
            },
            CompactionPreference::Balanced => RetentionStrategy::PreserveImportant {
                max_tokens: target,
            },
            CompactionPreference::Conservative => RetentionStrategy::SmartCompression {
                max_tokens: target,
            },
        };

        let outcome = apply_retention(&strategy, messages);
        debug!(
            strategy = outcome.strategy,
            removed = outcome.removed,
            tokens = outcome.tokens,
            "retention applied"
        );

        if outcome.tokens <= budget {
            let mut kept = Vec::with_capacity(outcome.messages.len() + 1);
            if outcome.removed > 0 {
                kept.push(Message::user_text(COMPACTION_NOTICE));
            }
            kept.extend(outcome.messages);
            let tokens_after = count_tokens(&kept);
            *messages = kept;
            return CompactionOutcome {
                compacted: true,
                tokens_before,
                tokens_after,
                strategy: outcome.strategy.into(),
            };
        }

        // Deterministic shrinking was not enough; ask the model for a
        // replacement summary.
        self.compact_via_summary(messages).await
    }

    /// Replace the history with the compaction notice plus an LLM-produced
    /// summary.  Also the implementation of the `/compact` command.  When
    /// the summary call fails (or is disabled), falls back to dropping the
    /// oldest messages, a path that never needs a model call.
    pub async fn compact_via_summary(&self, messages: &mut Vec<Message>) -> CompactionOutcome {
        let budget = self.config.max_context_tokens as u64;
        let target = (budget as f64 * COMPACT_TRIGGER_FRACTION) as u64;
        let tokens_before = count_tokens(messages);

        // The original history is kept intact until the summary call
        // succeeds.
        if self.config.auto_compact_enabled {
            match self.summarize(messages).await {
                Ok(summary) if !summary.trim().is_empty() => {
                    let replacement = vec![
                        Message::user_text(COMPACTION_NOTICE),
                        Message::assistant_text(&summary, self.model.model_name()),
                    ];
                    let tokens_after = count_tokens(&replacement);
                    *messages = replacement;
                    return CompactionOutcome {
                        compacted: true,
                        tokens_before,
                        tokens_after,
                        strategy: "auto_compact".into(),
                    };
                }
                Ok(_) => warn!("compaction summary came back empty; falling back"),
                Err(e) => warn!(error = %e, "compaction summary call failed; falling back"),
            }
        }

        let fallback = apply_retention(
            &RetentionStrategy::PreserveRecent {
                max_tokens: target,
                preserve_count: None,
            },
            messages,
        );
        let mut kept = vec![Message::user_text(COMPACTION_NOTICE)];
        kept.extend(fallback.messages);
        let tokens_after = count_tokens(&kept);
        *messages = kept;
        CompactionOutcome {
            compacted: true,
            tokens_before,
            tokens_after,
            strategy: "preserve_recent".into(),
        }
    }

    /// One tool-free model call producing the eight-section summary.
    async fn summarize(&self, messages: &[Message]) -> anyhow::Result<String> {
        let mut api_messages = normalize_for_api(messages);
        api_messages.push(Message::user_text(COMPRESSION_PROMPT));
        let req = CompletionRequest {
            messages: api_messages,
            system_prompt: String::new(),
            tools: Vec::new(),
            previous_response_id: None,
            max_tokens: None,
        };
        let mut stream = self.model.complete(req).await?;
        let mut text = String::new();
        while let Some(event) = stream.next().await {
            match event? {
                ResponseEvent::TextDelta(delta) => text.push_str(&delta),
                ResponseEvent::Done => break,
                ResponseEvent::Error(e) => warn!("summary stream warning: {e}"),
                _ => {}
            }
        }
        Ok(text)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use kode_model::ScriptedMockProvider;

    use super::*;

    fn config(preference: CompactionPreference, budget: usize) -> CompactionConfig {
        CompactionConfig {
            preference,
            max_context_tokens: budget,
            auto_compact_enabled: true,
        }
    }

    fn chatter(n: usize) -> Vec<Message> {
        (0..n)
            .map(|i| Message::user_text(format!("message number {i} with some padding text")))
            .collect()
    }

    #[tokio::test]
    async fn under_threshold_is_a_no_op() {
        let compactor = Compactor::new(
            config(CompactionPreference::Balanced, 100_000),
            Arc::new(ScriptedMockProvider::always_text("unused")),
        );
        let mut msgs = chatter(5);
        let before = msgs.len();
        let outcome = compactor.maybe_compact(&mut msgs).await;
        assert!(!outcome.compacted);
        assert_eq!(msgs.len(), before);
        assert_eq!(outcome.strategy, "none");
    }

    #[tokio::test]
    async fn aggressive_preference_uses_preserve_recent() {
        let compactor = Compactor::new(
            config(CompactionPreference::Aggressive, 200),
            Arc::new(ScriptedMockProvider::always_text("unused")),
        );
        let mut msgs = chatter(60);
        let outcome = compactor.maybe_compact(&mut msgs).await;
        assert!(outcome.compacted);
        assert_eq!(outcome.strategy, "preserve_recent");
        assert!(outcome.tokens_after < outcome.tokens_before);
        // The compaction notice leads the new history.
        assert!(msgs[0].text().contains("compacted"));
    }

    #[tokio::test]
    async fn conservative_preference_uses_smart_compression() {
        let compactor = Compactor::new(
            config(CompactionPreference::Conservative, 2_000),
            Arc::new(ScriptedMockProvider::always_text("unused")),
        );
        let mut msgs = chatter(80);
        let outcome = compactor.maybe_compact(&mut msgs).await;
        assert!(outcome.compacted);
        assert_eq!(outcome.strategy, "smart_compression");
    }

    #[tokio::test]
    async fn escalates_to_llm_summary_when_strategy_is_not_enough() {
        // Balanced keeps all user messages, so for a history of user-only
        // chatter it cannot shrink below budget, so the LLM summary path runs.
        let provider = ScriptedMockProvider::new(vec![ScriptedMockProvider::text_script(
            "## Technical Context\nsummarised",
        )]);
        let compactor = Compactor::new(config(CompactionPreference::Balanced, 150), Arc::new(provider));
        let mut msgs = chatter(60);
        let outcome = compactor.maybe_compact(&mut msgs).await;
        assert!(outcome.compacted);
        assert_eq!(outcome.strategy, "auto_compact");
        assert_eq!(msgs.len(), 2, "notice + summary replace the history");
        assert!(msgs[1].text().contains("summarised"));
        assert!(outcome.tokens_after < outcome.tokens_before);
    }

    #[tokio::test]
    async fn failed_summary_falls_back_to_preserve_recent() {
        let compactor = Compactor::new(
            config(CompactionPreference::Balanced, 150),
            Arc::new(ScriptedMockProvider::failing("rate limited")),
        );
        let mut msgs = chatter(60);
        let outcome = compactor.maybe_compact(&mut msgs).await;
        assert!(outcome.compacted);
        assert_eq!(outcome.strategy, "preserve_recent");
        assert!(!msgs.is_empty());
    }

    #[tokio::test]
    async fn summary_request_carries_the_compression_prompt() {
        let provider = Arc::new(ScriptedMockProvider::new(vec![
            ScriptedMockProvider::text_script("summary"),
        ]));
        let compactor = Compactor::new(
            config(CompactionPreference::Balanced, 150),
            Arc::clone(&provider) as Arc<dyn ModelProvider>,
        );
        let mut msgs = chatter(60);
        let _ = compactor.maybe_compact(&mut msgs).await;
        let req = provider.last_request.lock().unwrap();
        let last = req.as_ref().unwrap().messages.last().unwrap().text();
        assert!(last.contains("## Key Decisions"));
    }
}
