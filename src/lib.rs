pub mod cli;
pub mod config;
pub mod error;
pub mod tokenizer;

pub use config::{PaddingLength, TokenizerConfig};
pub use error::TokenizerError;
pub use tokenizer::{BatchEncoder, BatchEncoding, BpeTokenizer, Tokenizer};
