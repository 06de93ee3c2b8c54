// Tokenizer adapter
// Wraps the cl100k_base BPE tokenizer with a character-based fallback


use std::sync::Arc;

use tiktoken_rs::{CoreBPE, cl100k_base};
use tracing::warn;

/// Counts tokens in text. Deterministic for a given text and mode.
///
/// When the underlying BPE tokenizer cannot be constructed, every count
/// degrades to `len(text) / 4` (rounded down). Callers must not assume
/// exact counts in degraded mode.
#[derive(Clone)]
pub struct TokenCounter {
    bpe: Option<Arc<CoreBPE>>,
}

impl TokenCounter {
    #[inline]
    pub fn new() -> Self {
        match cl100k_base() {
            Ok(bpe) => Self {
                bpe: Some(Arc::new(bpe)),
            },
            Err(e) => {
                warn!(
                    "Tokenizer unavailable, falling back to character approximation: {}",
                    e
                );
                Self { bpe: None }
            }
        }
    }

    /// Counter that always uses the character approximation.
    #[inline]
    pub fn approximate() -> Self {
        Self { bpe: None }
    }

    /// Whether counts come from the real tokenizer rather than the
    /// character approximation.
    #[inline]
    pub fn is_exact(&self) -> bool {
        self.bpe.is_some()
    }

    /// Count tokens in `text`. Never fails.
    #[inline]
    pub fn count(&self, text: &str) -> usize {
        self.bpe.as_ref().map_or_else(
            || text.len() / 4,
            |bpe| bpe.encode_ordinary(text).len(),
        )
    }
}

impl Default for TokenCounter {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TokenCounter {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCounter")
            .field("mode", &if self.is_exact() { "bpe" } else { "approximate" })
            .finish()
    }
}
