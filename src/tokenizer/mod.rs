/// Tokenizer module for converting text to token IDs and vice versa
///
/// This module defines the encode/decode contract callers rely on,
/// currently backed by Hugging Face `tokenizers` models.
pub mod huggingface;

pub use huggingface::{HfLoader, HfTokenizer};

use crate::error::TokenizerError;

/// Converts between text and sequences of token IDs.
///
/// # Thread Safety
/// Implementations are shared process-wide behind an `Arc`, so they must be
/// `Send + Sync` and take `&self` for every operation.
pub trait TextTokenizer: Send + Sync {
    /// Encode `text` into token IDs, optionally adding the model's special tokens.
    fn encode(&self, text: &str, add_special_tokens: bool) -> Result<Vec<u32>, TokenizerError>;

    /// Decode token IDs back into text, optionally dropping special tokens.
    fn decode(&self, ids: &[u32], skip_special_tokens: bool) -> Result<String, TokenizerError>;

    /// Number of tokens `text` encodes to, special tokens excluded.
    fn count_tokens(&self, text: &str) -> Result<usize, TokenizerError> {
        Ok(self.encode(text, false)?.len())
    }
}
