// Copyright (c) 2025-2026 Kode Contributors <dev@kode.tools>
//
// SPDX-License-Identifier: MIT
mod commands;
mod compactor;
mod driver;
mod events;
mod executor;
mod prompts;
mod reminders;
mod request;
mod retention;

pub use commands::{
    Command, CommandContext, CommandKind, CommandRegistry, ControlAction, Dispatched,
};
pub use compactor::{Compactor, CompactionOutcome, COMPACT_TRIGGER_FRACTION};
pub use driver::{BinaryFeedback, Conversation, ConversationOptions};
pub use events::AgentEvent;
pub use executor::{ToolExecutor, ToolUseRequest};
pub use prompts::{build_system_prompt, COMPRESSION_PROMPT};
pub use reminders::{ReminderEvent, ReminderService};
pub use request::{AbortBarrier, RequestContext, RequestType};
pub use retention::{
    apply_retention, apply_retention_with_predicate, is_important, RetentionOutcome,
    RetentionStrategy,
};
