//! Tokenizer trait and utilities for turning text into padded id batches.
//!
//! This module defines the [`Tokenizer`] trait implemented by [`BpeTokenizer`],
//! the building blocks it is made of (byte codec, vocabulary tables,
//! pre-tokenizer) and the batch encoding and padding utilities used by
//! [`BatchEncoder`].

pub mod batch;
pub mod bpe;
pub mod byte_codec;
pub mod pretokenize;
pub mod vocab;

pub use batch::{BatchEncoder, BatchEncoding};
pub use bpe::BpeTokenizer;
pub use byte_codec::ByteCodec;
pub use pretokenize::PreTokenizer;
pub use vocab::{Segment, VocabTable};

/// A tokenizer that converts text to token IDs.
///
/// All implementations must be thread-safe (`Send + Sync`) for concurrent use
/// across multiple threads.
pub trait Tokenizer: Send + Sync {
    /// Encode text into at most `max_length` token IDs.
    ///
    /// Truncation is a hard cutoff: output is always a prefix of the
    /// untruncated encoding.
    fn tokenize(&self, text: &str, max_length: usize) -> Vec<u32>;

    /// Return the total vocabulary size.
    fn vocab_size(&self) -> usize;
}

impl<T: Tokenizer + ?Sized> Tokenizer for Box<T> {
    fn tokenize(&self, text: &str, max_length: usize) -> Vec<u32> {
        (**self).tokenize(text, max_length)
    }

    fn vocab_size(&self) -> usize {
        (**self).vocab_size()
    }
}

/// Encode a batch of texts using the given tokenizer.
///
/// Each text is encoded independently. Returns one `Vec<u32>` per input text.
pub fn encode_batch<S: AsRef<str>>(
    tokenizer: &dyn Tokenizer,
    texts: &[S],
    max_length: usize,
) -> Vec<Vec<u32>> {
    texts
        .iter()
        .map(|text| tokenizer.tokenize(text.as_ref(), max_length))
        .collect()
}

/// Lay token ID sequences out as a row-major `[rows, width]` matrix.
///
/// Returns a tuple of `(input_ids, attention_mask)`:
/// - `input_ids`: each row holds its tokens followed by `pad_id` up to `width`;
///   rows longer than `width` are cut.
/// - `attention_mask`: `1` for real tokens and `0` for padding positions.
pub fn pad_sequences(sequences: &[Vec<u32>], width: usize, pad_id: i64) -> (Vec<i64>, Vec<i64>) {
    let mut ids = Vec::with_capacity(sequences.len() * width);
    let mut mask = Vec::with_capacity(sequences.len() * width);

    for seq in sequences {
        let real_len = seq.len().min(width);

        ids.extend(seq[..real_len].iter().map(|&id| i64::from(id)));
        ids.resize(ids.len() + width - real_len, pad_id);

        mask.resize(mask.len() + real_len, 1);
        mask.resize(mask.len() + width - real_len, 0);
    }

    (ids, mask)
}
