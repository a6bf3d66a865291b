// Copyright (c) 2025-2026 Kode Contributors <dev@kode.tools>
//
// SPDX-License-Identifier: Apache-2.0
mod markers;
mod message;
mod mock;
mod normalize;
mod provider;
mod tokens;

pub use markers::*;
pub use message::{
    AssistantMessage, ContentBlock, Message, ProgressMessage, TokenUsage, ToolResultContent,
    UserMessage, UserMessageOptions,
};
pub use mock::{MockProvider, ScriptedMockProvider};
pub use normalize::{
    errored_tool_uses, in_progress_tool_use_ids, normalize, normalize_for_api, reorder,
    unresolved_tool_use_ids,
};
pub use provider::{CompletionRequest, ModelProvider, ResponseEvent, ResponseStream, ToolSchema};
pub use tokens::count_tokens;
