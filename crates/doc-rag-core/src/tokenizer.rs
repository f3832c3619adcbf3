//! Byte-pair-encoding tokenizer shared by every sizing decision.
//!
//! Wraps `tiktoken-rs`'s `cl100k_base` encoding (the encoding of the
//! OpenAI embedding models) so chunk sizes, overlap spans, and context
//! budgets are all measured in the same units.
//!
//! # Decoding token slices
//!
//! A BPE token is a byte sequence, and a multi-byte character can be
//! split across two tokens. Decoding an arbitrary slice of a token
//! sequence can therefore yield invalid UTF-8. The slicing helpers
//! ([`Tokenizer::head`], [`Tokenizer::tail`], [`Tokenizer::windows`])
//! nudge slice boundaries by a token or two until the slice decodes,
//! which keeps them lossless at the cost of being approximately, not
//! exactly, the requested size.

use std::sync::Arc;

use tiktoken_rs::CoreBPE;

use crate::error::{RagError, Result};

/// Name of the encoding used throughout the pipeline.
pub const ENCODING_NAME: &str = "cl100k_base";

/// Cheap-to-clone handle on a loaded BPE encoding.
#[derive(Clone)]
pub struct Tokenizer {
    bpe: Arc<CoreBPE>,
}

impl std::fmt::Debug for Tokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tokenizer")
            .field("encoding", &ENCODING_NAME)
            .finish()
    }
}

impl Tokenizer {
    /// Load the `cl100k_base` encoding.
    pub fn cl100k() -> Result<Self> {
        let bpe = tiktoken_rs::cl100k_base().map_err(|e| RagError::Tokenizer(e.to_string()))?;
        Ok(Self { bpe: Arc::new(bpe) })
    }

    pub fn encoding_name(&self) -> &'static str {
        ENCODING_NAME
    }

    /// Number of tokens in `text`. Empty text is zero tokens.
    pub fn count_tokens(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        self.bpe.encode_ordinary(text).len()
    }

    /// Encode text to token ids. Special-token markup is treated as text.
    pub fn encode(&self, text: &str) -> Vec<u32> {
        if text.is_empty() {
            return Vec::new();
        }
        self.bpe.encode_ordinary(text)
    }

    /// Decode token ids back to text.
    ///
    /// Fails if the ids do not form valid UTF-8 (a slice that cuts through
    /// a multi-byte character).
    pub fn decode(&self, tokens: &[u32]) -> Result<String> {
        if tokens.is_empty() {
            return Ok(String::new());
        }
        self.bpe
            .decode(tokens.to_vec())
            .map_err(|e| RagError::Tokenizer(e.to_string()))
    }

    /// Text of the first `max_tokens` tokens of `text`.
    ///
    /// Returns `text` unchanged when it already fits.
    pub fn head(&self, text: &str, max_tokens: usize) -> String {
        let tokens = self.encode(text);
        if tokens.len() <= max_tokens {
            return text.to_string();
        }
        if max_tokens == 0 {
            return String::new();
        }
        let end = self.decodable_end(&tokens, 0, max_tokens);
        self.decode(&tokens[..end]).unwrap_or_default()
    }

    /// Text of the last `max_tokens` tokens of `text`.
    ///
    /// Returns `text` unchanged when it already fits.
    pub fn tail(&self, text: &str, max_tokens: usize) -> String {
        let tokens = self.encode(text);
        if tokens.len() <= max_tokens {
            return text.to_string();
        }
        if max_tokens == 0 {
            return String::new();
        }
        let start = self.decodable_start(&tokens, tokens.len() - max_tokens);
        self.decode(&tokens[start..]).unwrap_or_default()
    }

    /// Split `text` into consecutive windows of about `size` tokens each.
    ///
    /// Windows may cut words in half. Concatenating the windows yields the
    /// original text.
    pub fn windows(&self, text: &str, size: usize) -> Vec<String> {
        let tokens = self.encode(text);
        if tokens.is_empty() || size == 0 {
            return Vec::new();
        }

        let mut out = Vec::new();
        let mut start = 0;
        while start < tokens.len() {
            let end = self.decodable_end(&tokens, start, (start + size).min(tokens.len()));
            match self.decode(&tokens[start..end]) {
                Ok(piece) => out.push(piece),
                Err(_) => break,
            }
            start = end;
        }
        out
    }

    /// Largest end `<= want` (or, failing that, smallest end `> want`)
    /// such that `tokens[start..end]` decodes.
    fn decodable_end(&self, tokens: &[u32], start: usize, want: usize) -> usize {
        let mut end = want;
        while end > start + 1 {
            if self.decode(&tokens[start..end]).is_ok() {
                return end;
            }
            end -= 1;
        }
        if self.decode(&tokens[start..end]).is_ok() {
            return end;
        }
        let mut end = want + 1;
        while end < tokens.len() {
            if self.decode(&tokens[start..end]).is_ok() {
                return end;
            }
            end += 1;
        }
        tokens.len()
    }

    /// Smallest start `>= want` (or, failing that, largest start `< want`)
    /// such that `tokens[start..]` decodes.
    fn decodable_start(&self, tokens: &[u32], want: usize) -> usize {
        let mut start = want;
        while start + 1 < tokens.len() {
            if self.decode(&tokens[start..]).is_ok() {
                return start;
            }
            start += 1;
        }
        let mut start = want;
        while start > 0 {
            start -= 1;
            if self.decode(&tokens[start..]).is_ok() {
                return start;
            }
        }
        0
    }
}
