//! Word-count token heuristic, used by context assembly to stay within the
//! single-call and map-batch token budgets without a real tokenizer in the
//! loop.

use rag_core::RetrievedChunk;

/// Roughly 1.3 tokens per word across mixed-language content, plus a small
/// formatting overhead.
pub fn estimate_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }

    let words = text.split_whitespace().count();
    ((words as f64 * 1.3) + 5.0).ceil() as usize
}

pub fn estimate_chunks_tokens(chunks: &[RetrievedChunk]) -> usize {
    chunks
        .iter()
        .map(|c| estimate_tokens(&c.chunk.content))
        .sum()
}

pub fn would_exceed_limit(current_tokens: usize, new_text: &str, max_tokens: usize) -> bool {
    let new_tokens = estimate_tokens(new_text);
    current_tokens + new_tokens > max_tokens
}

pub fn estimate_system_tokens(system_prompt: &str, context: &str) -> usize {
    estimate_tokens(system_prompt) + estimate_tokens(context) + 10
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_estimation_scales_with_word_count() {
        let text = "Ini adalah dokumen test yang berisi informasi";
        let tokens = estimate_tokens(text);
        assert!(tokens >= 13 && tokens <= 16);
    }

    #[test]
    fn empty_string_is_zero_tokens() {
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn would_exceed_respects_budget() {
        let current = 1000;
        let text = "word ".repeat(500);
        assert!(would_exceed_limit(current, &text, 1500));
        assert!(!would_exceed_limit(current, &text, 2000));
    }
}
