// Copyright (c) 2025-2026 Kode Contributors <dev@kode.tools>
//
// SPDX-License-Identifier: Apache-2.0
use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::Message;

pub type ResponseStream = Pin<Box<dyn Stream<Item = anyhow::Result<ResponseEvent>> + Send>>;

/// A tool definition offered to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    /// JSON Schema of the input object.
    pub input_schema: serde_json::Value,
}

/// One completion request.  The message list must already be in API shape
/// (see [`crate::normalize_for_api`]): no progress messages, tool-result runs
/// coalesced.
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    pub messages: Vec<Message>,
    pub system_prompt: String,
    pub tools: Vec<ToolSchema>,
    /// Server-side conversation handle from the previous assistant message,
    /// for providers that keep state.  Opaque.
    pub previous_response_id: Option<String>,
    pub max_tokens: Option<u32>,
}

/// A single streamed event from the model.
#[derive(Debug, Clone)]
pub enum ResponseEvent {
    TextDelta(String),
    /// Reasoning delta (extended thinking).  Accumulated into a thinking
    /// block on the assistant message.
    ThinkingDelta(String),
    /// A complete tool invocation request.
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    /// Server-side conversation handle for this response.
    ResponseId(String),
    Usage {
        input_tokens: u32,
        output_tokens: u32,
        cache_read_tokens: u32,
        cache_write_tokens: u32,
    },
    /// The stream finished normally.
    Done,
    /// A recoverable, non-fatal warning from the stream.
    Error(String),
}

/// The seam between the agent loop and any concrete LLM backend.
///
/// Wire-level drivers are out of scope for this crate; the conversation
/// driver only depends on this trait, and tests script it with
/// [`crate::ScriptedMockProvider`].
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Provider name for status display.
    fn name(&self) -> &str;

    /// Model identifier as reported to users and stamped on messages.
    fn model_name(&self) -> &str;

    /// Send a completion request and return a streaming response.
    async fn complete(&self, req: CompletionRequest) -> anyhow::Result<ResponseStream>;
}
