//! Construction-time configuration for the tokenizer.
//!
//! The host supplies the two GPT-2 vocabulary files as text plus a padding
//! policy. Everything is validated once, when a [`crate::BatchEncoder`] or
//! [`crate::BpeTokenizer`] is built, and never re-parsed per call.

use std::num::NonZeroUsize;
use std::path::Path;

use serde::Deserialize;

use crate::error::TokenizerError;

/// The GPT-2 end-of-text marker, used as both special and unknown token by default.
pub const END_OF_TEXT: &str = "<|endoftext|>";

/// How rows of a batch are padded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PaddingLength {
    /// Pad every batch to its own longest row (`-1`).
    #[default]
    Dynamic,
    /// Truncate or pad every row to exactly this many tokens.
    Fixed(NonZeroUsize),
}

impl PaddingLength {
    /// Fixed padding to `n` tokens; `None` when `n` is zero.
    pub fn fixed(n: usize) -> Option<Self> {
        NonZeroUsize::new(n).map(PaddingLength::Fixed)
    }

    /// Cap on the number of tokens produced per row.
    pub fn max_length(self) -> usize {
        match self {
            PaddingLength::Dynamic => usize::MAX,
            PaddingLength::Fixed(n) => n.get(),
        }
    }
}

impl TryFrom<i64> for PaddingLength {
    type Error = TokenizerError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(PaddingLength::Dynamic),
            n if n > 0 => usize::try_from(n)
                .ok()
                .and_then(PaddingLength::fixed)
                .ok_or(TokenizerError::InvalidPaddingLength(value)),
            _ => Err(TokenizerError::InvalidPaddingLength(value)),
        }
    }
}

fn default_padding_length() -> i64 {
    -1
}

fn default_special_tokens() -> Vec<String> {
    vec![END_OF_TEXT.to_string()]
}

fn default_unk_token() -> String {
    END_OF_TEXT.to_string()
}

/// Raw configuration record as supplied by the host.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenizerConfig {
    /// Contents of `vocab.json`: a JSON object mapping token strings to ids.
    pub vocab: String,
    /// Contents of `merges.txt`: ordered `left right` pairs.
    pub merges: String,
    /// `-1` for dynamic padding, otherwise a positive fixed row length.
    #[serde(default = "default_padding_length")]
    pub padding_length: i64,
    /// Literal strings emitted as single ids, never split or merged.
    #[serde(default = "default_special_tokens")]
    pub special_tokens: Vec<String>,
    /// Token whose id stands in for bytes the vocabulary cannot represent.
    #[serde(default = "default_unk_token")]
    pub unk_token: String,
}

impl TokenizerConfig {
    /// Configuration with GPT-2 defaults: dynamic padding and `<|endoftext|>`.
    pub fn new(vocab: impl Into<String>, merges: impl Into<String>) -> Self {
        Self {
            vocab: vocab.into(),
            merges: merges.into(),
            padding_length: default_padding_length(),
            special_tokens: default_special_tokens(),
            unk_token: default_unk_token(),
        }
    }

    pub fn with_padding_length(mut self, padding_length: i64) -> Self {
        self.padding_length = padding_length;
        self
    }

    pub fn with_special_tokens(mut self, special_tokens: Vec<String>) -> Self {
        self.special_tokens = special_tokens;
        self
    }

    /// Read `vocab.json` and `merges.txt` from disk.
    pub fn from_files(
        vocab_path: &Path,
        merges_path: &Path,
        padding_length: i64,
    ) -> Result<Self, TokenizerError> {
        let vocab = std::fs::read_to_string(vocab_path)?;
        let merges = std::fs::read_to_string(merges_path)?;
        Ok(Self::new(vocab, merges).with_padding_length(padding_length))
    }

    /// Validated padding policy.
    pub fn padding(&self) -> Result<PaddingLength, TokenizerError> {
        PaddingLength::try_from(self.padding_length)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_padding_length_values() {
        assert_eq!(PaddingLength::try_from(-1).unwrap(), PaddingLength::Dynamic);
        assert_eq!(PaddingLength::try_from(1).unwrap(), PaddingLength::fixed(1).unwrap());
        assert_eq!(PaddingLength::try_from(512).unwrap(), PaddingLength::fixed(512).unwrap());
    }

    #[test]
    fn test_padding_length_rejects_other_values() {
        for bad in [0, -2, i64::MIN] {
            let err = PaddingLength::try_from(bad).unwrap_err();
            assert!(matches!(err, TokenizerError::InvalidPaddingLength(v) if v == bad));
            assert!(err.is_config());
        }
    }

    #[test]
    fn test_max_length() {
        assert_eq!(PaddingLength::Dynamic.max_length(), usize::MAX);
        assert_eq!(PaddingLength::fixed(7).unwrap().max_length(), 7);
        assert_eq!(PaddingLength::default(), PaddingLength::Dynamic);
    }

    #[test]
    fn test_fixed_rejects_zero() {
        assert_eq!(PaddingLength::fixed(0), None);
        assert!(matches!(
            PaddingLength::try_from(0),
            Err(TokenizerError::InvalidPaddingLength(0))
        ));
    }

    #[test]
    fn test_defaults() {
        let config = TokenizerConfig::new("{}", "a b");
        assert_eq!(config.padding_length, -1);
        assert_eq!(config.special_tokens, vec![END_OF_TEXT.to_string()]);
        assert_eq!(config.unk_token, END_OF_TEXT);
        assert_eq!(config.padding().unwrap(), PaddingLength::Dynamic);
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let json = r#"{"vocab": "{\"a\": 0}", "merges": "a a"}"#;
        let config: TokenizerConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.vocab, r#"{"a": 0}"#);
        assert_eq!(config.padding_length, -1);
        assert_eq!(config.unk_token, END_OF_TEXT);
    }

    #[test]
    fn test_deserialize_explicit_fields() {
        let json = r#"{
            "vocab": "{}",
            "merges": "",
            "padding_length": 16,
            "special_tokens": ["<s>", "</s>"],
            "unk_token": "<unk>"
        }"#;
        let config: TokenizerConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.padding().unwrap(), PaddingLength::fixed(16).unwrap());
        assert_eq!(config.special_tokens, vec!["<s>", "</s>"]);
        assert_eq!(config.unk_token, "<unk>");
    }

    #[test]
    fn test_from_files() {
        let dir = tempfile::tempdir().unwrap();
        let vocab_path = dir.path().join("vocab.json");
        let merges_path = dir.path().join("merges.txt");
        std::fs::write(&vocab_path, r#"{"a": 0, "b": 1, "ab": 2}"#).unwrap();
        std::fs::write(&merges_path, "#version: 0.2\na b\n").unwrap();

        let config = TokenizerConfig::from_files(&vocab_path, &merges_path, 8).unwrap();
        assert!(config.vocab.contains("\"ab\""));
        assert!(config.merges.ends_with("a b\n"));
        assert_eq!(config.padding().unwrap(), PaddingLength::fixed(8).unwrap());
    }

    #[test]
    fn test_from_files_missing() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.json");
        let err = TokenizerConfig::from_files(&missing, &missing, -1).unwrap_err();
        assert!(matches!(err, TokenizerError::Io(_)));
        assert!(!err.is_config());
    }
}
