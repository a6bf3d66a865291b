// Copyright (c) 2025-2026 Kode Contributors <dev@kode.tools>
//
// SPDX-License-Identifier: MIT
//! System reminders: event-driven hints injected inline into the next user
//! message, wrapped in `<system-reminder>` tags.
//!
//! Volume is bounded three ways: each key fires at most once per session,
//! mention reminders expire after a short freshness window, and a session
//! cap limits the total.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use tracing::debug;

use kode_model::{ContentBlock, Message};

/// Mention reminders older than this are stale and silently dropped.
const MENTION_FRESHNESS: Duration = Duration::from_secs(5);

/// Default maximum number of reminders per session.
const SESSION_CAP: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReminderEvent {
    TodoUpdated,
    FileRead,
    FileChanged,
    AgentMention,
    FileMention,
    ModelMention,
    LongSession,
}

impl ReminderEvent {
    fn is_mention(self) -> bool {
        matches!(
            self,
            ReminderEvent::AgentMention | ReminderEvent::FileMention | ReminderEvent::ModelMention
        )
    }
}

struct PendingReminder {
    event: ReminderEvent,
    key: String,
    text: String,
    created: Instant,
}

pub struct ReminderService {
    pending: Vec<PendingReminder>,
    emitted_keys: HashSet<String>,
    emitted_count: usize,
    cap: usize,
}

impl ReminderService {
    pub fn new() -> Self {
        Self::with_cap(SESSION_CAP)
    }

    pub fn with_cap(cap: usize) -> Self {
        Self {
            pending: Vec::new(),
            emitted_keys: HashSet::new(),
            emitted_count: 0,
            cap,
        }
    }

    /// Queue a reminder.  Duplicate keys (already queued or already emitted
    /// this session) are suppressed.
    pub fn notify(&mut self, event: ReminderEvent, key: impl Into<String>, text: impl Into<String>) {
        let key = key.into();
        if self.emitted_keys.contains(&key) || self.pending.iter().any(|p| p.key == key) {
            debug!(%key, "duplicate reminder suppressed");
            return;
        }
        self.pending.push(PendingReminder {
            event,
            key,
            text: text.into(),
            created: Instant::now(),
        });
    }

    /// Scan user text for `@`-mentions and queue the matching reminders.
    /// Path-like mentions (containing `/` or `.`) count as file mentions,
    /// `@model…` as a model mention, anything else as an agent mention.
    pub fn scan_mentions(&mut self, text: &str) {
        for token in text.split_whitespace() {
            let Some(rest) = token.strip_prefix('@') else {
                continue;
            };
            let rest = rest.trim_end_matches(|c: char| {
                !c.is_alphanumeric() && !matches!(c, '/' | '.' | '_' | '-')
            });
            if rest.is_empty() {
                continue;
            }
            let (event, reminder) = if rest.contains('/') || rest.contains('.') {
                (
                    ReminderEvent::FileMention,
                    format!(
                        "The user mentioned the file {rest}. Read it with the read tool \
                         if its contents are relevant to the request."
                    ),
                )
            } else if rest.starts_with("model") {
                (
                    ReminderEvent::ModelMention,
                    format!("The user mentioned @{rest}; they may be asking about model selection."),
                )
            } else {
                (
                    ReminderEvent::AgentMention,
                    format!("The user mentioned @{rest}; it may refer to a subagent."),
                )
            };
            self.notify(event, format!("mention:{rest}"), reminder);
        }
    }

    /// Take the reminders due for the next turn.  Stale mentions are
    /// dropped; the session cap bounds how many are returned.
    pub fn drain_due(&mut self) -> Vec<String> {
        let now = Instant::now();
        let mut due = Vec::new();
        for reminder in self.pending.drain(..) {
            if reminder.event.is_mention()
                && now.duration_since(reminder.created) > MENTION_FRESHNESS
            {
                debug!(key = %reminder.key, "stale mention reminder dropped");
                continue;
            }
            if self.emitted_count >= self.cap {
                debug!(key = %reminder.key, "session reminder cap reached");
                continue;
            }
            self.emitted_keys.insert(reminder.key);
            self.emitted_count += 1;
            due.push(reminder.text);
        }
        due
    }

    /// Prepend `reminders` to the latest user message's first text block,
    /// each wrapped in `<system-reminder>` tags.  Progress and assistant
    /// messages are never touched.
    pub fn inject(reminders: &[String], messages: &mut [Message]) {
        if reminders.is_empty() {
            return;
        }
        let wrapped: String = reminders
            .iter()
            .map(|r| format!("<system-reminder>{r}</system-reminder>\n"))
            .collect();
        let Some(Message::User(user)) = messages
            .iter_mut()
            .rev()
            .find(|m| matches!(m, Message::User(_)))
        else {
            return;
        };
        match user
            .content
            .iter_mut()
            .find(|b| matches!(b, ContentBlock::Text { .. }))
        {
            Some(ContentBlock::Text { text }) => {
                *text = format!("{wrapped}{text}");
            }
            _ => user.content.insert(0, ContentBlock::text(wrapped)),
        }
    }
}

impl Default for ReminderService {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reminders_are_drained_once() {
        let mut svc = ReminderService::new();
        svc.notify(ReminderEvent::TodoUpdated, "todo", "todo list changed");
        assert_eq!(svc.drain_due(), vec!["todo list changed"]);
        assert!(svc.drain_due().is_empty());
    }

    #[test]
    fn duplicate_keys_are_suppressed_for_the_session() {
        let mut svc = ReminderService::new();
        svc.notify(ReminderEvent::FileRead, "file:/a", "read /a");
        let _ = svc.drain_due();
        svc.notify(ReminderEvent::FileRead, "file:/a", "read /a again");
        assert!(svc.drain_due().is_empty(), "same key must not fire twice");
    }

    #[test]
    fn queued_duplicates_collapse() {
        let mut svc = ReminderService::new();
        svc.notify(ReminderEvent::FileRead, "k", "one");
        svc.notify(ReminderEvent::FileRead, "k", "two");
        assert_eq!(svc.drain_due().len(), 1);
    }

    #[test]
    fn session_cap_bounds_volume() {
        let mut svc = ReminderService::with_cap(2);
        for i in 0..5 {
            svc.notify(ReminderEvent::FileRead, format!("k{i}"), format!("r{i}"));
        }
        assert_eq!(svc.drain_due().len(), 2);
        // Cap is for the session, not per drain.
        svc.notify(ReminderEvent::FileRead, "late", "late reminder");
        assert!(svc.drain_due().is_empty());
    }

    #[test]
    fn fresh_mentions_are_delivered() {
        let mut svc = ReminderService::new();
        svc.notify(ReminderEvent::FileMention, "m", "@file mentioned");
        assert_eq!(svc.drain_due().len(), 1);
    }

    #[test]
    fn scan_classifies_path_mentions_as_files() {
        let mut svc = ReminderService::new();
        svc.scan_mentions("please look at @src/main.rs and @README.md first");
        let due = svc.drain_due();
        assert_eq!(due.len(), 2);
        assert!(due[0].contains("src/main.rs"));
        assert!(due[1].contains("README.md"));
    }

    #[test]
    fn scan_classifies_bare_mentions_as_agents() {
        let mut svc = ReminderService::new();
        svc.scan_mentions("ask @reviewer to take a look");
        let due = svc.drain_due();
        assert_eq!(due.len(), 1);
        assert!(due[0].contains("@reviewer"));
        assert!(due[0].contains("subagent"));
    }

    #[test]
    fn scan_strips_trailing_punctuation() {
        let mut svc = ReminderService::new();
        svc.scan_mentions("what about @src/lib.rs?");
        let due = svc.drain_due();
        assert_eq!(due.len(), 1);
        assert!(due[0].contains("src/lib.rs"));
        assert!(!due[0].contains("lib.rs?"));
    }

    #[test]
    fn scan_is_deduplicated_across_turns() {
        let mut svc = ReminderService::new();
        svc.scan_mentions("see @notes.txt");
        let _ = svc.drain_due();
        svc.scan_mentions("again, see @notes.txt");
        assert!(svc.drain_due().is_empty(), "same mention must not re-fire");
    }

    #[test]
    fn scan_ignores_text_without_mentions() {
        let mut svc = ReminderService::new();
        svc.scan_mentions("nothing to see here, not even an email-like a@b");
        assert!(svc.drain_due().is_empty());
    }

    #[test]
    fn injection_wraps_and_prepends_to_latest_user_text() {
        let mut messages = vec![
            Message::user_text("earlier"),
            Message::assistant_text("reply", "m"),
            Message::user_text("the actual question"),
        ];
        ReminderService::inject(&["todo list changed".to_string()], &mut messages);
        let text = messages[2].text();
        assert!(text.starts_with("<system-reminder>todo list changed</system-reminder>"));
        assert!(text.ends_with("the actual question"));
        assert_eq!(messages[0].text(), "earlier", "older messages untouched");
    }

    #[test]
    fn injection_with_no_user_message_is_a_no_op() {
        let mut messages = vec![Message::assistant_text("only assistant", "m")];
        ReminderService::inject(&["r".to_string()], &mut messages);
        assert_eq!(messages[0].text(), "only assistant");
    }

    #[test]
    fn empty_reminder_list_changes_nothing() {
        let mut messages = vec![Message::user_text("q")];
        ReminderService::inject(&[], &mut messages);
        assert_eq!(messages[0].text(), "q");
    }
}
