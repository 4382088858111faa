use fancy_regex::Regex;

use super::ext::StrTokenExt;
use super::{Sentence, Token};
use crate::error::Result;

/// Runs of word characters, or single characters that are neither word
/// characters nor whitespace.
pub const WORD_PATTERN: &str = r"\w+|[^\w\s]";

#[derive(Clone, Debug)]
pub enum Splitter {
    Punctuation(Regex),
    Whitespace,
}

impl Splitter {
    pub fn new(split_punctuation: bool) -> Result<Self> {
        if split_punctuation {
            Ok(Splitter::Punctuation(Regex::new(WORD_PATTERN)?))
        } else {
            Ok(Splitter::Whitespace)
        }
    }

    pub fn splits_punctuation(&self) -> bool {
        matches!(self, Splitter::Punctuation(_))
    }

    /// Already tokenized sentences pass through unchanged.
    pub fn split(&self, sentence: &Sentence) -> Result<Vec<Token>> {
        let text = match sentence {
            Sentence::Tokenized(tokens) => return Ok(tokens.clone()),
            Sentence::Raw(text) => text.as_str(),
        };

        match self {
            Splitter::Punctuation(pattern) => Ok(text.regex_tokens(pattern)?),
            Splitter::Whitespace => Ok(text.whitespace_tokens()),
        }
    }
}
