//! Excerpt windows for the LLM stages.
//!
//! Documents are cut into consecutive, non-overlapping word windows sized to
//! a token budget. Stage 1 screens these windows in order. Stage 2 either
//! sends the whole document or one window centred on the excerpt that stage 1
//! found positive.

/// Approximate words per token (WordPiece/BPE average).
const WORDS_PER_TOKEN: f32 = 0.75;

/// A contiguous run of words from a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Excerpt {
    pub index: usize,
    /// Offset of the first word in the document.
    pub word_start: usize,
    pub text: String,
    pub token_count: usize,
}

/// Rough token estimation: words / 0.75.
pub fn estimate_tokens(text: &str) -> usize {
    let words = text.split_whitespace().count();
    ((words as f32) / WORDS_PER_TOKEN).ceil() as usize
}

/// Words that fit in `tokens`; never less than one.
pub fn words_for_tokens(tokens: usize) -> usize {
    ((tokens as f32 * WORDS_PER_TOKEN) as usize).max(1)
}

pub fn fits(text: &str, max_tokens: usize) -> bool {
    estimate_tokens(text) <= max_tokens
}

/// Split into windows of at most `max_tokens` tokens each.
pub fn split_excerpts(text: &str, max_tokens: usize) -> Vec<Excerpt> {
    let words: Vec<&str> = text.split_whitespace().collect();
    let per = words_for_tokens(max_tokens);

    words
        .chunks(per)
        .enumerate()
        .map(|(index, chunk)| {
            let text = chunk.join(" ");
            Excerpt {
                index,
                word_start: index * per,
                token_count: estimate_tokens(&text),
                text,
            }
        })
        .collect()
}

/// Word offset at the middle of excerpt `index` from [`split_excerpts`]
/// with the same `max_tokens`.
pub fn excerpt_midpoint(index: usize, max_tokens: usize) -> usize {
    let per = words_for_tokens(max_tokens);
    index * per + per / 2
}

/// A window of at most `budget_tokens` tokens centred on word `center`,
/// shifted inwards when it would run past either end of the document.
pub fn window_around(text: &str, center: usize, budget_tokens: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return String::new();
    }
    let width = words_for_tokens(budget_tokens).min(words.len());
    let center = center.min(words.len() - 1);
    let start = center.saturating_sub(width / 2).min(words.len() - width);
    words[start..start + width].join(" ")
}
