//! Batch encoding: tokenize many strings and lay them out as padded id and
//! attention-mask matrices.

use serde::Serialize;
use tracing::debug;

use super::{encode_batch, pad_sequences, BpeTokenizer, Tokenizer};
use crate::config::{PaddingLength, TokenizerConfig};
use crate::error::TokenizerError;

/// Id written into padding positions of `input_ids`.
pub const PAD_ID: i64 = 0;

/// Padded token ids and attention mask for a batch of strings.
///
/// Both buffers are row-major with shape `shape`: the outer dimensions of the
/// input batch followed by the pad width.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchEncoding {
    pub shape: Vec<usize>,
    pub input_ids: Vec<i64>,
    pub attention_mask: Vec<i64>,
}

impl BatchEncoding {
    /// Length of every row, the last dimension of `shape`.
    pub fn pad_width(&self) -> usize {
        self.shape.last().copied().unwrap_or(0)
    }

    pub fn num_rows(&self) -> usize {
        self.shape[..self.shape.len().saturating_sub(1)].iter().product()
    }

    /// Ids and mask of row `index`, or `None` when out of range.
    pub fn row(&self, index: usize) -> Option<(&[i64], &[i64])> {
        if index >= self.num_rows() {
            return None;
        }
        let width = self.pad_width();
        let range = index * width..(index + 1) * width;
        Some((&self.input_ids[range.clone()], &self.attention_mask[range]))
    }
}

/// Tokenizes batches of strings and pads them according to a fixed policy.
#[derive(Debug)]
pub struct BatchEncoder<T: Tokenizer = BpeTokenizer> {
    tokenizer: T,
    padding: PaddingLength,
}

impl BatchEncoder<BpeTokenizer> {
    /// Validate `config` and build the BPE tables.
    ///
    /// The padding policy is checked before the vocabulary is parsed, so a bad
    /// `padding_length` is reported even when the vocabulary is also invalid.
    pub fn new(config: &TokenizerConfig) -> Result<Self, TokenizerError> {
        let padding = config.padding()?;
        let tokenizer = BpeTokenizer::new(config)?;
        Ok(Self::with_tokenizer(tokenizer, padding))
    }
}

impl<T: Tokenizer> BatchEncoder<T> {
    pub fn with_tokenizer(tokenizer: T, padding: PaddingLength) -> Self {
        Self { tokenizer, padding }
    }

    pub fn tokenizer(&self) -> &T {
        &self.tokenizer
    }

    pub fn padding(&self) -> PaddingLength {
        self.padding
    }

    /// Encode a flat batch of strings into a `[texts.len(), width]` encoding.
    pub fn encode<S: AsRef<str>>(&self, texts: &[S]) -> BatchEncoding {
        self.encode_rows(texts, vec![texts.len()])
    }

    /// Encode a batch whose strings are laid out row-major in `outer_shape`.
    ///
    /// The result has shape `outer_shape` followed by the pad width.
    pub fn encode_with_shape<S: AsRef<str>>(
        &self,
        texts: &[S],
        outer_shape: &[usize],
    ) -> Result<BatchEncoding, TokenizerError> {
        let expected: usize = outer_shape.iter().product();
        if expected != texts.len() {
            return Err(TokenizerError::ShapeMismatch {
                shape: outer_shape.to_vec(),
                expected,
                actual: texts.len(),
            });
        }
        Ok(self.encode_rows(texts, outer_shape.to_vec()))
    }

    fn encode_rows<S: AsRef<str>>(&self, texts: &[S], mut shape: Vec<usize>) -> BatchEncoding {
        let sequences = encode_batch(&self.tokenizer, texts, self.padding.max_length());
        let width = match self.padding {
            PaddingLength::Dynamic => sequences.iter().map(Vec::len).max().unwrap_or(0),
            PaddingLength::Fixed(n) => n.get(),
        };
        let (input_ids, attention_mask) = pad_sequences(&sequences, width, PAD_ID);

        debug!(rows = texts.len(), width, "encoded batch");
        shape.push(width);
        BatchEncoding {
            shape,
            input_ids,
            attention_mask,
        }
    }
}
