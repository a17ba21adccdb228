//! Byte-level BPE tokenizer for GPT-2 family vocabularies.
//!
//! Encoding a string runs four stages:
//! 1. Split out special tokens, which map straight to their reserved ids.
//! 2. Pre-tokenize each remaining span into GPT-2 word/number/punctuation/space chunks.
//! 3. Map every UTF-8 byte of a chunk to its byte-level symbol.
//! 4. Merge symbols by rank until no merge rule applies.
//!
//! Output stops as soon as `max_length` ids have been produced, even in the
//! middle of a chunk.

use tracing::debug;

use super::pretokenize::PreTokenizer;
use super::vocab::{Segment, VocabTable};
use super::Tokenizer;
use crate::config::TokenizerConfig;
use crate::error::TokenizerError;

/// GPT-2 style byte-level BPE tokenizer.
///
/// Immutable once built. Scratch buffers are local to each
/// [`BpeTokenizer::tokenize`] call, so one instance can serve any number of
/// threads.
#[derive(Debug)]
pub struct BpeTokenizer {
    vocab: VocabTable,
}

impl BpeTokenizer {
    /// Build a tokenizer from host-supplied vocabulary and merges text.
    pub fn new(config: &TokenizerConfig) -> Result<Self, TokenizerError> {
        let vocab = VocabTable::load(
            &config.vocab,
            &config.merges,
            &config.special_tokens,
            &config.unk_token,
        )?;
        Ok(Self::from_vocab(vocab))
    }

    pub fn from_vocab(vocab: VocabTable) -> Self {
        debug!(vocab_size = vocab.vocab_size(), "BPE tokenizer initialized");
        Self { vocab }
    }

    pub fn vocab(&self) -> &VocabTable {
        &self.vocab
    }

    /// Encode `text` into at most `max_length` token ids.
    pub fn tokenize(&self, text: &str, max_length: usize) -> Vec<u32> {
        let mut ids = Vec::new();
        if text.is_empty() || max_length == 0 {
            return ids;
        }

        let mut symbols = Vec::new();
        let mut merged = Vec::new();

        'segments: for segment in self.vocab.split_by_special_tokens(text) {
            if ids.len() >= max_length {
                break;
            }
            let span = match segment {
                Segment::Special(id) => {
                    ids.push(id);
                    continue;
                }
                Segment::Text(span) => span,
            };

            for chunk in PreTokenizer::new(span) {
                symbols.clear();
                symbols.extend(chunk.bytes().map(|b| self.vocab.byte_symbol(b)));
                merged.clear();
                self.vocab.bpe_into(&symbols, &mut merged);

                let room = max_length - ids.len();
                if merged.len() >= room {
                    ids.extend_from_slice(&merged[..room]);
                    break 'segments;
                }
                ids.extend_from_slice(&merged);
            }
        }

        ids
    }
}

impl Tokenizer for BpeTokenizer {
    fn tokenize(&self, text: &str, max_length: usize) -> Vec<u32> {
        BpeTokenizer::tokenize(self, text, max_length)
    }

    fn vocab_size(&self) -> usize {
        self.vocab.vocab_size()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::tokenizer::byte_codec::ByteCodec;
    use std::collections::BTreeMap;

    pub(crate) const EOT_ID: u32 = 50256;

    /// Builds a GPT-2 shaped configuration.
    ///
    /// Every byte placeholder is a token whose id equals the byte value, so
    /// `b'h'` is id 104 and the space placeholder "Ġ" is id 32. `extra`
    /// tokens are numbered from 256 in order, and `<|endoftext|>` is 50256.
    pub(crate) fn gpt2_config(extra: &[&str], merges: &[&str]) -> TokenizerConfig {
        let codec = ByteCodec::global();
        let mut vocab = BTreeMap::new();
        for b in 0..=255u8 {
            vocab.insert(codec.encode(b).to_string(), b as u32);
        }
        for (i, token) in extra.iter().enumerate() {
            vocab.insert(token.to_string(), 256 + i as u32);
        }
        vocab.insert("<|endoftext|>".to_string(), EOT_ID);

        let vocab = serde_json::to_string(&vocab).unwrap();
        let merges = format!("#version: 0.2\n{}\n", merges.join("\n"));
        TokenizerConfig::new(vocab, merges)
    }

    /// Tokens 256.. and the merges that build "hello" and " world".
    pub(crate) fn hello_world_tokenizer() -> BpeTokenizer {
        let config = gpt2_config(
            &[
                "he", "ll", "hell", "hello", "Ġw", "or", "Ġwor", "ld", "Ġworld", "hi",
            ],
            &[
                "h e", "l l", "he ll", "hell o", "Ġ w", "o r", "Ġw or", "l d", "Ġwor ld", "h i",
            ],
        );
        BpeTokenizer::new(&config).unwrap()
    }

    const HELLO: u32 = 259;
    const SPACE_WORLD: u32 = 264;
    const HI: u32 = 265;

    #[test]
    fn test_encode_hello_world() {
        let tok = hello_world_tokenizer();
        assert_eq!(tok.tokenize("hello world", usize::MAX), vec![HELLO, SPACE_WORLD]);
    }

    #[test]
    fn test_empty_input() {
        let tok = hello_world_tokenizer();
        for max_length in [0, 1, 10, usize::MAX] {
            assert!(tok.tokenize("", max_length).is_empty());
        }
    }

    #[test]
    fn test_zero_max_length() {
        let tok = hello_world_tokenizer();
        assert!(tok.tokenize("hello", 0).is_empty());
        assert!(tok.tokenize("<|endoftext|>", 0).is_empty());
    }

    #[test]
    fn test_special_token_alone() {
        let tok = hello_world_tokenizer();
        assert_eq!(tok.tokenize("<|endoftext|>", usize::MAX), vec![EOT_ID]);
    }

    #[test]
    fn test_special_token_ignores_merges() {
        // Even with no useful merges at all, the special token is atomic.
        let config = gpt2_config(&[], &["< |"]);
        let tok = BpeTokenizer::new(&config).unwrap();
        assert_eq!(tok.tokenize("<|endoftext|>", usize::MAX), vec![EOT_ID]);
    }

    #[test]
    fn test_special_token_between_text() {
        let tok = hello_world_tokenizer();
        assert_eq!(
            tok.tokenize("hello<|endoftext|> world", usize::MAX),
            vec![HELLO, EOT_ID, SPACE_WORLD]
        );
    }

    #[test]
    fn test_special_token_counts_toward_max_length() {
        let tok = hello_world_tokenizer();
        assert_eq!(tok.tokenize("hello<|endoftext|> world", 2), vec![HELLO, EOT_ID]);
        assert_eq!(tok.tokenize("<|endoftext|>hello", 1), vec![EOT_ID]);
    }

    #[test]
    fn test_unmerged_bytes_use_byte_ids() {
        let tok = hello_world_tokenizer();
        // No merges for "xyz": one id per byte.
        assert_eq!(tok.tokenize("xyz", usize::MAX), vec![120, 121, 122]);
        // "é" is two UTF-8 bytes, each its own symbol.
        assert_eq!(tok.tokenize("é", usize::MAX), vec![0xC3, 0xA9]);
    }

    #[test]
    fn test_leading_space_becomes_placeholder() {
        let tok = hello_world_tokenizer();
        // " hi" -> "Ġhi": "h i" merges, the space stays a byte symbol.
        assert_eq!(tok.tokenize(" hi", usize::MAX), vec![32, HI]);
    }

    #[test]
    fn test_truncates_mid_chunk() {
        let tok = hello_world_tokenizer();
        // "xyz" is one chunk of three ids; only the first two fit.
        assert_eq!(tok.tokenize("xyz", 2), vec![120, 121]);
        assert_eq!(tok.tokenize("hello xyz", 3), vec![HELLO, 32, 120]);
    }

    #[test]
    fn test_truncation_is_prefix() {
        let tok = hello_world_tokenizer();
        let text = "hello world<|endoftext|>xyz hi, 123 é";
        let full = tok.tokenize(text, usize::MAX);
        for n in 0..=full.len() + 2 {
            let truncated = tok.tokenize(text, n);
            assert!(truncated.len() <= n);
            assert_eq!(truncated, full[..n.min(full.len())], "max_length {n}");
        }
    }

    #[test]
    fn test_deterministic() {
        let tok = hello_world_tokenizer();
        let text = "hello  world\n\nhello, world! 2024 <|endoftext|>";
        assert_eq!(tok.tokenize(text, usize::MAX), tok.tokenize(text, usize::MAX));
    }

    #[test]
    fn test_missing_merged_token_falls_back_to_bytes() {
        // "x y" is ranked but "xy" is not a token.
        let config = gpt2_config(&["he"], &["x y", "h e"]);
        let tok = BpeTokenizer::new(&config).unwrap();
        assert_eq!(tok.tokenize("xy", usize::MAX), vec![120, 121]);
        assert_eq!(tok.tokenize("xy he", usize::MAX), vec![120, 121, 32, 256]);
    }

    #[test]
    fn test_bytes_missing_from_vocab_use_unknown() {
        let config = TokenizerConfig::new(r#"{"a": 0, "b": 1, "ab": 2}"#, "a b");
        let tok = BpeTokenizer::new(&config).unwrap();
        let unk = tok.vocab().unk_id();
        assert_eq!(unk, 3);
        assert_eq!(tok.tokenize("ab", usize::MAX), vec![2]);
        assert_eq!(tok.tokenize("abz", usize::MAX), vec![2, unk]);
    }

    #[test]
    fn test_config_errors_abort_construction() {
        let config = TokenizerConfig::new("", "a b");
        assert!(BpeTokenizer::new(&config).unwrap_err().is_config());
        let config = TokenizerConfig::new(r#"{"a": 0}"#, "a");
        assert!(BpeTokenizer::new(&config).unwrap_err().is_config());
    }

    #[test]
    fn test_trait_dispatch() {
        let tok = hello_world_tokenizer();
        let tok: &dyn Tokenizer = &tok;
        assert_eq!(tok.tokenize("hello", usize::MAX), vec![HELLO]);
        // 256 bytes, 10 merged tokens and the end-of-text marker.
        assert_eq!(tok.vocab_size(), 267);
    }

    #[test]
    fn test_concurrent_use() {
        let tok = hello_world_tokenizer();
        let expected = tok.tokenize("hello world hi", usize::MAX);
        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..50 {
                        assert_eq!(tok.tokenize("hello world hi", usize::MAX), expected);
                    }
                });
            }
        });
    }

    #[test]
    fn test_configured_special_tokens() {
        // "<|end|>" is new and gets the next free id; "<|endoftext|>" keeps 50256.
        let config = gpt2_config(&["he"], &["h e"]).with_special_tokens(vec![
            "<|end|>".to_string(),
            "<|endoftext|>".to_string(),
        ]);
        let tok = BpeTokenizer::new(&config).unwrap();
        let end = tok.vocab().token_id("<|end|>").unwrap();
        assert_eq!(end, EOT_ID + 1);
        assert_eq!(
            tok.tokenize("he<|end|><|endoftext|>he", usize::MAX),
            vec![256, end, EOT_ID, 256]
        );
        // Without its configuration entry the same string is plain text.
        let plain = BpeTokenizer::new(&gpt2_config(&["he"], &["h e"])).unwrap();
        assert_eq!(plain.tokenize("<|end|>", usize::MAX).len(), 7);
    }

    #[test]
    fn test_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<BpeTokenizer>();
    }
}
