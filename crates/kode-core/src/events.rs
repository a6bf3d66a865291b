// Copyright (c) 2025-2026 Kode Contributors <dev@kode.tools>
//
// SPDX-License-Identifier: MIT
use uuid::Uuid;

use kode_model::Message;

/// Events streamed from the conversation driver to its consumer (REPL, TUI).
#[derive(Debug, Clone)]
pub enum AgentEvent {
    /// A new turn of the request has started.
    TurnStart { request_id: Uuid },
    /// A conversation message was yielded: the assistant reply, a progress
    /// message for an in-flight tool use, or a terminal tool-result.
    Message(Message),
    /// The context manager replaced part of the history.
    ContextCompacted {
        tokens_before: u64,
        tokens_after: u64,
        strategy: String,
    },
    /// The driver finished processing the user's request.
    TurnComplete,
    /// A recoverable error worth showing to the user.
    Error(String),
}
