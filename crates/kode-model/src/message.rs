// Copyright (c) 2025-2026 Kode Contributors <dev@kode.tools>
//
// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─── Content blocks ───────────────────────────────────────────────────────────

/// A single content block inside a message.
///
/// `tool_use` / `tool_result` pairing is the backbone of the agent loop:
/// every `tool_use` id emitted by the assistant must eventually be answered
/// by exactly one `tool_result` block carrying the same id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    Image {
        media_type: String,
        /// Base64-encoded image bytes.
        data: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        content: ToolResultContent,
        #[serde(default)]
        is_error: bool,
    },
    /// Opaque reasoning payload.  Preserved for the remainder of the
    /// assistant trajectory it belongs to; never edited or reordered.
    Thinking {
        thinking: String,
    },
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn tool_use(id: impl Into<String>, name: impl Into<String>, input: serde_json::Value) -> Self {
        Self::ToolUse {
            id: id.into(),
            name: name.into(),
            input,
        }
    }

    pub fn tool_result(
        tool_use_id: impl Into<String>,
        content: impl Into<ToolResultContent>,
        is_error: bool,
    ) -> Self {
        Self::ToolResult {
            tool_use_id: tool_use_id.into(),
            content: content.into(),
            is_error,
        }
    }
}

/// Content carried by a `tool_result` block: a plain string or nested blocks
/// (text + images from rich tools).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolResultContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl ToolResultContent {
    /// Plain-text rendering; image blocks are elided.
    pub fn as_text(&self) -> String {
        match self {
            Self::Text(t) => t.clone(),
            Self::Blocks(blocks) => blocks
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    pub fn is_empty_text(&self) -> bool {
        match self {
            Self::Text(t) => t.trim().is_empty(),
            Self::Blocks(blocks) => blocks.is_empty(),
        }
    }
}

impl From<String> for ToolResultContent {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&str> for ToolResultContent {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

// ─── Messages ─────────────────────────────────────────────────────────────────

/// Token usage reported by the provider for one assistant message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub cache_read_tokens: u32,
    pub cache_write_tokens: u32,
}

/// Flags a user message may carry about how it was produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserMessageOptions {
    #[serde(default)]
    pub is_koding_request: bool,
    #[serde(default)]
    pub is_custom_command: bool,
    #[serde(default)]
    pub command_name: Option<String>,
    #[serde(default)]
    pub command_args: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserMessage {
    pub uuid: Uuid,
    pub content: Vec<ContentBlock>,
    /// Structured payload of the tool result this message acknowledges, for
    /// UI rendering.  Opaque to the driver.
    #[serde(default)]
    pub tool_use_result: Option<serde_json::Value>,
    #[serde(default)]
    pub options: UserMessageOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssistantMessage {
    pub uuid: Uuid,
    pub content: Vec<ContentBlock>,
    pub cost_usd: f64,
    pub duration_ms: u64,
    pub model: String,
    #[serde(default)]
    pub usage: TokenUsage,
    /// Server-side conversation handle for providers that keep state.
    /// Opaque: stored and passed back verbatim with the next request.
    #[serde(default)]
    pub response_id: Option<String>,
    #[serde(default)]
    pub is_api_error: bool,
}

/// Transient message attached to an in-flight tool use.  Never sent to the
/// model; dropped by [`crate::normalize_for_api`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressMessage {
    pub uuid: Uuid,
    pub tool_use_id: String,
    /// The ids of all tool uses dispatched together with this one.
    pub sibling_tool_use_ids: Vec<String>,
    /// Assistant-shaped payload describing the progress.
    pub content: Box<AssistantMessage>,
}

/// A message in the conversation history.  Immutable once yielded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Message {
    User(UserMessage),
    Assistant(AssistantMessage),
    Progress(ProgressMessage),
}

impl Message {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self::User(UserMessage {
            uuid: Uuid::new_v4(),
            content: vec![ContentBlock::text(text)],
            tool_use_result: None,
            options: UserMessageOptions::default(),
        })
    }

    pub fn user_blocks(content: Vec<ContentBlock>) -> Self {
        Self::User(UserMessage {
            uuid: Uuid::new_v4(),
            content,
            tool_use_result: None,
            options: UserMessageOptions::default(),
        })
    }

    pub fn assistant_text(text: impl Into<String>, model: impl Into<String>) -> Self {
        Self::Assistant(AssistantMessage {
            uuid: Uuid::new_v4(),
            content: vec![ContentBlock::text(text)],
            cost_usd: 0.0,
            duration_ms: 0,
            model: model.into(),
            usage: TokenUsage::default(),
            response_id: None,
            is_api_error: false,
        })
    }

    pub fn assistant_blocks(content: Vec<ContentBlock>, model: impl Into<String>) -> Self {
        Self::Assistant(AssistantMessage {
            uuid: Uuid::new_v4(),
            content,
            cost_usd: 0.0,
            duration_ms: 0,
            model: model.into(),
            usage: TokenUsage::default(),
            response_id: None,
            is_api_error: false,
        })
    }

    /// A terminal tool-result user message for `tool_use_id`.
    pub fn tool_result(
        tool_use_id: impl Into<String>,
        content: impl Into<ToolResultContent>,
        is_error: bool,
    ) -> Self {
        Self::User(UserMessage {
            uuid: Uuid::new_v4(),
            content: vec![ContentBlock::tool_result(tool_use_id, content, is_error)],
            tool_use_result: None,
            options: UserMessageOptions::default(),
        })
    }

    pub fn progress(
        tool_use_id: impl Into<String>,
        sibling_tool_use_ids: Vec<String>,
        content: AssistantMessage,
    ) -> Self {
        Self::Progress(ProgressMessage {
            uuid: Uuid::new_v4(),
            tool_use_id: tool_use_id.into(),
            sibling_tool_use_ids,
            content: Box::new(content),
        })
    }

    pub fn uuid(&self) -> Uuid {
        match self {
            Message::User(m) => m.uuid,
            Message::Assistant(m) => m.uuid,
            Message::Progress(m) => m.uuid,
        }
    }

    pub fn content(&self) -> &[ContentBlock] {
        match self {
            Message::User(m) => &m.content,
            Message::Assistant(m) => &m.content,
            Message::Progress(m) => &m.content.content,
        }
    }

    /// All `tool_use` blocks in this message, in emission order.
    pub fn tool_use_blocks(&self) -> Vec<&ContentBlock> {
        self.content()
            .iter()
            .filter(|b| matches!(b, ContentBlock::ToolUse { .. }))
            .collect()
    }

    /// The id of the tool result this message answers, when it is a
    /// tool-result message.
    pub fn tool_result_id(&self) -> Option<&str> {
        match self {
            Message::User(m) => m.content.iter().find_map(|b| match b {
                ContentBlock::ToolResult { tool_use_id, .. } => Some(tool_use_id.as_str()),
                _ => None,
            }),
            _ => None,
        }
    }

    pub fn is_tool_result(&self) -> bool {
        self.tool_result_id().is_some()
    }

    /// Concatenated text of all text blocks.
    pub fn text(&self) -> String {
        self.content()
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Approximate token count for budget decisions.  Conservative upper
    /// bound: serialized content length at 4 bytes per token, rounded up,
    /// never below 1.
    pub fn approx_tokens(&self) -> u64 {
        let bytes: usize = self
            .content()
            .iter()
            .map(|b| match b {
                ContentBlock::Text { text } => text.len(),
                ContentBlock::Thinking { thinking } => thinking.len(),
                ContentBlock::Image { data, .. } => data.len() / 3,
                ContentBlock::ToolUse { name, input, .. } => {
                    name.len() + input.to_string().len()
                }
                ContentBlock::ToolResult { content, .. } => match content {
                    ToolResultContent::Text(t) => t.len(),
                    ToolResultContent::Blocks(blocks) => blocks
                        .iter()
                        .map(|b| match b {
                            ContentBlock::Text { text } => text.len(),
                            ContentBlock::Image { data, .. } => data.len() / 3,
                            _ => 0,
                        })
                        .sum(),
                },
            })
            .sum();
        ((bytes as u64) + 3) / 4 + 1
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
