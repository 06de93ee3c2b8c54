// Chunking module
// Splits document text into overlapping, token-bounded chunks while
// preserving sentence boundaries where possible


use std::sync::OnceLock;

use fancy_regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::tokenizer::TokenCounter;

/// Token budgets for document chunking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Target chunk size in tokens
    pub target_tokens: usize,
    /// Minimum chunk size in tokens (smaller chunks are discarded)
    pub min_tokens: usize,
    /// Maximum chunk size in tokens before forced word-level splitting
    pub max_tokens: usize,
    /// Overlap seeded between adjacent chunks, in tokens
    pub overlap_tokens: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            target_tokens: 512,
            min_tokens: 100,
            max_tokens: 800,
            overlap_tokens: 50,
        }
    }
}

/// Break after `.`, `!`, or `?` followed by whitespace. A best-effort
/// heuristic, not a full sentence tokenizer; abbreviations are not
/// special-cased.
fn sentence_boundary() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?<=[.!?])\s+").expect("sentence boundary pattern is valid")
    })
}

/// Split text into sentences for boundary preservation.
#[inline]
pub fn split_into_sentences(text: &str) -> Vec<String> {
    sentence_boundary()
        .split(text.trim())
        .filter_map(|part| part.ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Chunk `text` into overlapping segments bounded by the configured token
/// budgets.
///
/// Sentences are accumulated greedily up to `target_tokens`; when a chunk
/// closes, the next one is seeded with a trailing word-boundary overlap of
/// at most `overlap_tokens`. A single sentence over `max_tokens` is split
/// by words instead, with no overlap between the word-level pieces.
/// Buffers below `min_tokens` are discarded, including the final one --
/// trailing content can be lost, which is an accepted tradeoff.
///
/// Empty or whitespace-only input yields an empty sequence. Never fails;
/// tokenizer failures degrade to approximate counts.
#[inline]
pub fn chunk_text(text: &str, config: &ChunkingConfig, tokens: &TokenCounter) -> Vec<String> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let sentences = split_into_sentences(text);
    if sentences.is_empty() {
        return Vec::new();
    }

    let mut chunks: Vec<String> = Vec::new();
    let mut current_chunk = String::new();
    let mut current_tokens = 0usize;

    for sentence in &sentences {
        let sentence_tokens = tokens.count(sentence);

        if sentence_tokens > config.max_tokens {
            split_oversized_sentence(sentence, config, tokens, &mut chunks);
            continue;
        }

        let potential_tokens = current_tokens + sentence_tokens;

        if potential_tokens > config.target_tokens && !current_chunk.is_empty() {
            if current_tokens >= config.min_tokens {
                chunks.push(current_chunk.trim().to_string());
            }

            if config.overlap_tokens > 0 && !chunks.is_empty() {
                let overlap = trailing_overlap(&current_chunk, config.overlap_tokens, tokens);
                current_chunk = if overlap.is_empty() {
                    sentence.clone()
                } else {
                    format!("{} {}", overlap, sentence)
                };
                current_tokens = tokens.count(&current_chunk);
            } else {
                current_chunk = sentence.clone();
                current_tokens = sentence_tokens;
            }
        } else {
            if current_chunk.is_empty() {
                current_chunk = sentence.clone();
            } else {
                current_chunk.push(' ');
                current_chunk.push_str(sentence);
            }
            current_tokens = potential_tokens;
        }
    }

    if !current_chunk.is_empty() && current_tokens >= config.min_tokens {
        chunks.push(current_chunk.trim().to_string());
    }

    debug!(
        "Chunked text into {} chunks (avg {} tokens)",
        chunks.len(),
        chunks.iter().map(|c| tokens.count(c)).sum::<usize>() / chunks.len().max(1)
    );

    chunks
}

/// Pack the words of an oversized sentence into sub-chunks bounded by
/// `target_tokens`, applying the same `min_tokens` discard rule.
fn split_oversized_sentence(
    sentence: &str,
    config: &ChunkingConfig,
    tokens: &TokenCounter,
    chunks: &mut Vec<String>,
) {
    let mut word_chunk = String::new();

    for word in sentence.split_whitespace() {
        if word_chunk.is_empty() {
            word_chunk = word.to_string();
            continue;
        }

        let candidate = format!("{} {}", word_chunk, word);
        if tokens.count(&candidate) > config.target_tokens {
            if tokens.count(&word_chunk) >= config.min_tokens {
                chunks.push(word_chunk.trim().to_string());
            }
            word_chunk = word.to_string();
        } else {
            word_chunk = candidate;
        }
    }

    if !word_chunk.is_empty() && tokens.count(&word_chunk) >= config.min_tokens {
        chunks.push(word_chunk.trim().to_string());
    }
}

/// Minimal word-boundary suffix of `text` whose token count does not
/// exceed `overlap_tokens`.
fn trailing_overlap(text: &str, overlap_tokens: usize, tokens: &TokenCounter) -> String {
    if tokens.count(text) <= overlap_tokens {
        return text.trim().to_string();
    }

    let mut overlap = String::new();
    for word in text.split_whitespace().rev() {
        let candidate = if overlap.is_empty() {
            word.to_string()
        } else {
            format!("{} {}", word, overlap)
        };

        if tokens.count(&candidate) <= overlap_tokens {
            overlap = candidate;
        } else {
            break;
        }
    }

    overlap
}
