// Copyright (c) 2025-2026 Kode Contributors <dev@kode.tools>
//
// SPDX-License-Identifier: MIT
use crate::Message;

/// Conservative upper-bound token count for a message list.
///
/// No provider tokenizer is consulted: a fixed ≈4-bytes-per-token estimate
/// (rounded up per message, plus a small per-message envelope overhead) is
/// enough for retention decisions and is monotonic in content length and in
/// list length.
pub fn count_tokens(messages: &[Message]) -> u64 {
    messages.iter().map(|m| m.approx_tokens() + 4).sum()
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_list_counts_zero() {
        assert_eq!(count_tokens(&[]), 0);
    }

    #[test]
    fn longer_content_counts_more() {
        let short = vec![Message::user_text("hi")];
        let long = vec![Message::user_text("hi there, this is a longer message")];
        assert!(count_tokens(&long) > count_tokens(&short));
    }

    #[test]
    fn monotonic_under_append() {
        let mut msgs = vec![Message::user_text("one")];
        let before = count_tokens(&msgs);
        msgs.push(Message::user_text(""));
        assert!(count_tokens(&msgs) >= before);
        msgs.push(Message::assistant_text("reply", "m"));
        assert!(count_tokens(&msgs) > before);
    }

    #[test]
    fn four_bytes_roughly_one_token() {
        let msgs = vec![Message::user_text("a".repeat(4000))];
        let tokens = count_tokens(&msgs);
        // 4000 bytes ≈ 1000 tokens; the estimate must stay the same order of
        // magnitude while never under-counting.
        assert!(tokens >= 1000);
        assert!(tokens < 1200);
    }
}
