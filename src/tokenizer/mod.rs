mod ext;
mod split;
mod symbol;
mod word;

pub use split::*;
pub use symbol::*;
pub use word::*;

pub type Token = String;
pub type TokenId = u64;

use anyhow::Result;

pub trait Tokenizer: Send + Sync {
    fn encode(&self, string: &str) -> Result<Vec<TokenId>>;
    fn decode(&self, tokens: &[TokenId]) -> Result<String>;
    fn vocab_size(&self) -> usize;
}

/// A sentence, either raw text or already split into tokens.
#[derive(Clone, Debug, PartialEq)]
pub enum Sentence {
    Raw(String),
    Tokenized(Vec<Token>),
}

impl From<&str> for Sentence {
    fn from(text: &str) -> Self {
        Sentence::Raw(text.to_string())
    }
}

impl From<String> for Sentence {
    fn from(text: String) -> Self {
        Sentence::Raw(text)
    }
}

impl From<Vec<Token>> for Sentence {
    fn from(tokens: Vec<Token>) -> Self {
        Sentence::Tokenized(tokens)
    }
}

impl From<Vec<&str>> for Sentence {
    fn from(tokens: Vec<&str>) -> Self {
        Sentence::Tokenized(tokens.into_iter().map(str::to_string).collect())
    }
}

/// Argument and result of [`WordVocabulary::call`]. Text and tokens encode
/// to indices, indices decode to tokens.
#[derive(Clone, Debug, PartialEq)]
pub enum Sequence {
    Text(String),
    Tokens(Vec<Token>),
    Indices(Vec<TokenId>),
}
