// Copyright (c) 2025-2026 Kode Contributors <dev@kode.tools>
//
// SPDX-License-Identifier: MIT
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream;
use serde_json::Value;

use crate::{
    provider::ResponseStream, CompletionRequest, ContentBlock, Message, ModelProvider,
    ResponseEvent,
};

/// Deterministic mock provider.  Echoes the last user text back as the
/// assistant response.  Used by the REPL when no real provider is configured
/// and by smoke tests.
#[derive(Default)]
pub struct MockProvider;

#[async_trait]
impl ModelProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }
    fn model_name(&self) -> &str {
        "mock-model"
    }

    async fn complete(&self, req: CompletionRequest) -> anyhow::Result<ResponseStream> {
        let reply = req
            .messages
            .iter()
            .rev()
            .find_map(|m| match m {
                Message::User(u) => u.content.iter().find_map(|b| match b {
                    ContentBlock::Text { text } => Some(text.clone()),
                    _ => None,
                }),
                _ => None,
            })
            .unwrap_or_else(|| "[no input]".into());

        let events: Vec<anyhow::Result<ResponseEvent>> = vec![
            Ok(ResponseEvent::TextDelta(format!("MOCK: {reply}"))),
            Ok(ResponseEvent::Usage {
                input_tokens: 10,
                output_tokens: 10,
                cache_read_tokens: 0,
                cache_write_tokens: 0,
            }),
            Ok(ResponseEvent::Done),
        ];
        Ok(Box::pin(stream::iter(events)))
    }
}

/// A pre-scripted mock provider.  Each `complete` call pops the next event
/// script from the front of the queue, so tests can specify exact multi-turn
/// sequences, including tool uses, without network access.
///
/// The last request seen is recorded so tests can inspect what the driver
/// actually sent (message shape, system prompt, tool list).
pub struct ScriptedMockProvider {
    scripts: Arc<Mutex<Vec<Vec<ResponseEvent>>>>,
    pub last_request: Arc<Mutex<Option<CompletionRequest>>>,
    /// When set, `complete` returns this error instead of a stream.
    fail_with: Arc<Mutex<Option<String>>>,
}

impl ScriptedMockProvider {
    pub fn new(scripts: Vec<Vec<ResponseEvent>>) -> Self {
        Self {
            scripts: Arc::new(Mutex::new(scripts)),
            last_request: Arc::new(Mutex::new(None)),
            fail_with: Arc::new(Mutex::new(None)),
        }
    }

    /// A provider that answers every call with the same text.
    pub fn always_text(text: impl Into<String>) -> Self {
        let text = text.into();
        // A generous number of copies; turns beyond this end with Done only.
        let scripts = (0..32).map(|_| Self::text_script(&text)).collect();
        Self::new(scripts)
    }

    /// A provider whose next `complete` call fails with an API error.
    pub fn failing(message: impl Into<String>) -> Self {
        let s = Self::new(vec![]);
        *s.fail_with.lock().unwrap() = Some(message.into());
        s
    }

    /// Event script for a plain text reply.
    pub fn text_script(text: &str) -> Vec<ResponseEvent> {
        vec![
            ResponseEvent::TextDelta(text.to_string()),
            ResponseEvent::Usage {
                input_tokens: 5,
                output_tokens: 5,
                cache_read_tokens: 0,
                cache_write_tokens: 0,
            },
            ResponseEvent::Done,
        ]
    }

    /// Event script for a turn requesting the given tool uses.
    pub fn tool_use_script(uses: Vec<(&str, &str, Value)>) -> Vec<ResponseEvent> {
        let mut events: Vec<ResponseEvent> = uses
            .into_iter()
            .map(|(id, name, input)| ResponseEvent::ToolUse {
                id: id.to_string(),
                name: name.to_string(),
                input,
            })
            .collect();
        events.push(ResponseEvent::Done);
        events
    }

    /// Number of scripts not yet consumed.
    pub fn remaining(&self) -> usize {
        self.scripts.lock().unwrap().len()
    }
}

#[async_trait]
impl ModelProvider for ScriptedMockProvider {
    fn name(&self) -> &str {
        "mock"
    }
    fn model_name(&self) -> &str {
        "scripted-mock"
    }

    async fn complete(&self, req: CompletionRequest) -> anyhow::Result<ResponseStream> {
        *self.last_request.lock().unwrap() = Some(req);
        if let Some(msg) = self.fail_with.lock().unwrap().take() {
            anyhow::bail!("{msg}");
        }
        let script = {
            let mut scripts = self.scripts.lock().unwrap();
            if scripts.is_empty() {
                vec![ResponseEvent::Done]
            } else {
                scripts.remove(0)
            }
        };
        let events: Vec<anyhow::Result<ResponseEvent>> =
            script.into_iter().map(Ok).collect();
        Ok(Box::pin(stream::iter(events)))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
