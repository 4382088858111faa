//! Error types for batch collation and vocabularies.

use thiserror::Error;

use crate::tokenizer::TokenId;

/// Result type alias for seqbatch operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// A merge was asked to collate zero elements.
    #[error("cannot merge an empty batch")]
    EmptyBatch,

    /// A batch leaf does not match the category of its siblings.
    #[error("unsupported batch element: {0}")]
    UnsupportedType(String),

    /// Elements disagree on rank, or an array could not be shaped.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    /// A mapping element lacks a key present in the first element.
    #[error("missing key in batch element: {0}")]
    MissingKey(String),

    /// Word lookup miss with no unknown-token fallback allowed.
    #[error("unknown word: '{0}'")]
    UnknownWord(String),

    /// `allow_any_word` is set but the vocabulary has no unknown token.
    #[error("allow_any_word requires an <UNK> or <unk> token")]
    MissingUnknownToken,

    #[error("vocabulary used before it was built or restored")]
    UninitializedVocabulary,

    /// Symbol outside the alphabet of a character/byte vocabulary.
    #[error("symbol not in alphabet: {0}")]
    UnknownSymbol(String),

    /// Index outside the alphabet of a character/byte vocabulary.
    #[error("index not in alphabet: {0}")]
    UnknownIndex(TokenId),

    #[error("ignore index {index} is out of range for {len} symbols")]
    InvalidIgnoreIndex { index: usize, len: usize },

    #[error("invalid vocabulary snapshot: {0}")]
    InvalidSnapshot(String),

    #[error("tokenization failed: {0}")]
    Tokenize(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<fancy_regex::Error> for Error {
    fn from(err: fancy_regex::Error) -> Self {
        Error::Tokenize(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
