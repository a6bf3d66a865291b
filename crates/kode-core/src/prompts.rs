// Copyright (c) 2025-2026 Kode Contributors <dev@kode.tools>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::BTreeMap;

/// Fixed prompt used by `/compact` and by auto-compaction escalation.  The
/// resulting assistant message replaces the conversation history, so the
/// section structure matters more than brevity.
pub const COMPRESSION_PROMPT: &str = "\
Summarise the conversation so far for continuation in a fresh context window. \
Produce EXACTLY the following eight Markdown sections, in this order, and no others. \
Be information-dense: keep file paths, commands, error messages, and decisions verbatim \
where they matter.

## Technical Context
Development environment, languages, frameworks, and tooling in use.

## Project Overview
What the project is and which parts of it the conversation touched.

## Code Changes
Every file created or modified, with a short note on what changed and why.

## Debugging & Issues
Problems encountered, their root causes, and how they were (or were not) resolved.

## Current Status
Where the work stands right now.

## Pending Tasks
Everything still to be done, in priority order.

## User Preferences
Style, workflow, and communication preferences the user has expressed.

## Key Decisions
Significant technical decisions made and the reasoning behind them.";

/// Join the configured system prompt lines and append each context entry as
/// a named section.  Entries are emitted in key order so the prompt is
/// stable across turns (a prerequisite for provider-side prompt caching).
pub fn build_system_prompt(lines: &[String], context: &BTreeMap<String, String>) -> String {
    let mut prompt = lines.join("\n");
    for (key, value) in context {
        prompt.push_str(&format!("\n<context name=\"{key}\">{value}</context>"));
    }
    prompt
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compression_prompt_has_all_eight_headings() {
        for heading in [
            "## Technical Context",
            "## Project Overview",
            "## Code Changes",
            "## Debugging & Issues",
            "## Current Status",
            "## Pending Tasks",
            "## User Preferences",
            "## Key Decisions",
        ] {
            assert!(COMPRESSION_PROMPT.contains(heading), "missing {heading}");
        }
    }

    #[test]
    fn system_prompt_joins_lines() {
        let prompt = build_system_prompt(
            &["first".to_string(), "second".to_string()],
            &BTreeMap::new(),
        );
        assert_eq!(prompt, "first\nsecond");
    }

    #[test]
    fn context_entries_become_named_sections() {
        let mut ctx = BTreeMap::new();
        ctx.insert("cwd".to_string(), "/work".to_string());
        let prompt = build_system_prompt(&["base".to_string()], &ctx);
        assert!(prompt.contains("<context name=\"cwd\">/work</context>"));
    }

    #[test]
    fn context_sections_are_in_key_order() {
        let mut ctx = BTreeMap::new();
        ctx.insert("z".to_string(), "last".to_string());
        ctx.insert("a".to_string(), "first".to_string());
        let prompt = build_system_prompt(&[], &ctx);
        let a = prompt.find("name=\"a\"").unwrap();
        let z = prompt.find("name=\"z\"").unwrap();
        assert!(a < z);
    }
}
