use std::collections::{BTreeSet, HashMap};
use std::fmt::Debug;
use std::hash::Hash;
use std::ops::Add;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::debug;

use super::{TokenId, Tokenizer};
use crate::error::{Error, Result};

/// Unit of a [`SymbolVocabulary`] alphabet.
pub trait Symbol:
    Copy + Ord + Hash + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Sequence form that encodes to, and decodes from, indices.
    type Text: Clone + Debug + PartialEq;

    fn split(text: &Self::Text) -> Vec<Self>;
    fn join(symbols: Vec<Self>) -> Self::Text;

    fn of_str(text: &str) -> Vec<Self>;
    fn to_string_lossy(symbols: Vec<Self>) -> String;
}

impl Symbol for char {
    type Text = String;

    fn split(text: &String) -> Vec<char> {
        text.chars().collect()
    }

    fn join(symbols: Vec<char>) -> String {
        symbols.into_iter().collect()
    }

    fn of_str(text: &str) -> Vec<char> {
        text.chars().collect()
    }

    fn to_string_lossy(symbols: Vec<char>) -> String {
        Self::join(symbols)
    }
}

/// Bytes decode to raw byte strings, which need not be valid UTF-8.
impl Symbol for u8 {
    type Text = Vec<u8>;

    fn split(text: &Vec<u8>) -> Vec<u8> {
        text.clone()
    }

    fn join(symbols: Vec<u8>) -> Vec<u8> {
        symbols
    }

    fn of_str(text: &str) -> Vec<u8> {
        text.as_bytes().to_vec()
    }

    fn to_string_lossy(symbols: Vec<u8>) -> String {
        String::from_utf8_lossy(&symbols).into_owned()
    }
}

/// A symbol pinned to a fixed index, used for padding and masking.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct IgnoreSymbol<S> {
    pub symbol: S,
    pub index: usize,
}

/// Persisted state of a [`SymbolVocabulary`]: its alphabet.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SymbolSnapshot<S: Ord> {
    pub chars: BTreeSet<S>,
}

/// Argument and result of [`SymbolVocabulary::call`].
#[derive(Clone, Debug, PartialEq)]
pub enum SymbolSequence<T> {
    Text(T),
    Indices(Vec<TokenId>),
}

/// Dense index over a fixed alphabet, in sorted order apart from the
/// optional ignore symbol.
#[derive(Clone, Debug)]
pub struct SymbolVocabulary<S: Symbol> {
    to_index: HashMap<S, TokenId>,
    from_index: HashMap<TokenId, S>,
    ignore: Option<IgnoreSymbol<S>>,
    initialized: bool,
}

pub type CharVocabulary = SymbolVocabulary<char>;
pub type ByteVocabulary = SymbolVocabulary<u8>;

impl<S: Symbol> SymbolVocabulary<S> {
    /// An empty vocabulary, usable once [`rebuild`](Self::rebuild) or
    /// [`load_snapshot`](Self::load_snapshot) has run.
    pub fn new(ignore: Option<IgnoreSymbol<S>>) -> Self {
        Self {
            to_index: HashMap::new(),
            from_index: HashMap::new(),
            ignore,
            initialized: false,
        }
    }

    pub fn from_set(
        symbols: impl IntoIterator<Item = S>,
        ignore: Option<IgnoreSymbol<S>>,
    ) -> Result<Self> {
        let mut vocab = Self::new(ignore);
        vocab.rebuild(symbols)?;
        Ok(vocab)
    }

    /// Reassigns indices for `symbols`. The ignore symbol is added if absent
    /// and placed at its pinned index.
    pub fn rebuild(&mut self, symbols: impl IntoIterator<Item = S>) -> Result<()> {
        let mut ordered: Vec<S> = symbols
            .into_iter()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        if let Some(ignore) = self.ignore {
            ordered.retain(|symbol| *symbol != ignore.symbol);
            if ignore.index > ordered.len() {
                return Err(Error::InvalidIgnoreIndex {
                    index: ignore.index,
                    len: ordered.len(),
                });
            }
            ordered.insert(ignore.index, ignore.symbol);
        }

        self.to_index = ordered
            .iter()
            .enumerate()
            .map(|(i, symbol)| (*symbol, i as TokenId))
            .collect();
        self.from_index = ordered
            .into_iter()
            .enumerate()
            .map(|(i, symbol)| (i as TokenId, symbol))
            .collect();
        self.initialized = true;
        debug!(len = self.len(), "built symbol vocabulary");

        Ok(())
    }

    pub fn len(&self) -> usize {
        self.to_index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.to_index.is_empty()
    }

    pub fn ignore(&self) -> Option<IgnoreSymbol<S>> {
        self.ignore
    }

    pub fn index_of(&self, symbol: S) -> Result<TokenId> {
        self.to_index
            .get(&symbol)
            .copied()
            .ok_or_else(|| Error::UnknownSymbol(format!("{symbol:?}")))
    }

    pub fn symbol_at(&self, index: TokenId) -> Result<S> {
        self.from_index
            .get(&index)
            .copied()
            .ok_or(Error::UnknownIndex(index))
    }

    pub fn encode_text(&self, text: &S::Text) -> Result<Vec<TokenId>> {
        self.ensure_initialized()?;
        S::split(text)
            .into_iter()
            .map(|symbol| self.index_of(symbol))
            .collect()
    }

    pub fn decode_indices(&self, indices: &[TokenId]) -> Result<S::Text> {
        self.ensure_initialized()?;
        let symbols = indices
            .iter()
            .map(|i| self.symbol_at(*i))
            .collect::<Result<Vec<_>>>()?;
        Ok(S::join(symbols))
    }

    /// Encodes text, decodes indices. An empty index list is returned as it is.
    pub fn call(&self, sequence: SymbolSequence<S::Text>) -> Result<SymbolSequence<S::Text>> {
        self.ensure_initialized()?;
        match sequence {
            SymbolSequence::Indices(indices) if indices.is_empty() => {
                Ok(SymbolSequence::Indices(indices))
            }
            SymbolSequence::Text(text) => self.encode_text(&text).map(SymbolSequence::Indices),
            SymbolSequence::Indices(indices) => {
                self.decode_indices(&indices).map(SymbolSequence::Text)
            }
        }
    }

    pub fn snapshot(&self) -> SymbolSnapshot<S> {
        SymbolSnapshot {
            chars: self.to_index.keys().copied().collect(),
        }
    }

    /// Rebuilds from a snapshot, keeping this vocabulary's ignore settings.
    pub fn load_snapshot(&mut self, snapshot: SymbolSnapshot<S>) -> Result<()> {
        self.rebuild(snapshot.chars)
    }

    /// Vocabulary over the symbols of both operands, with the ignore
    /// settings of `self`.
    pub fn union(&self, other: &Self) -> Result<Self> {
        Self::from_set(
            self.to_index.keys().chain(other.to_index.keys()).copied(),
            self.ignore,
        )
    }

    fn ensure_initialized(&self) -> Result<()> {
        if self.initialized {
            Ok(())
        } else {
            Err(Error::UninitializedVocabulary)
        }
    }
}

impl<S: Symbol> Add for &SymbolVocabulary<S> {
    type Output = Result<SymbolVocabulary<S>>;

    fn add(self, other: Self) -> Self::Output {
        self.union(other)
    }
}

impl<S: Symbol> Tokenizer for SymbolVocabulary<S> {
    fn encode(&self, string: &str) -> anyhow::Result<Vec<TokenId>> {
        self.ensure_initialized()?;
        Ok(S::of_str(string)
            .into_iter()
            .map(|symbol| self.index_of(symbol))
            .collect::<Result<Vec<_>>>()?)
    }

    fn decode(&self, tokens: &[TokenId]) -> anyhow::Result<String> {
        self.ensure_initialized()?;
        let symbols = tokens
            .iter()
            .map(|i| self.symbol_at(*i))
            .collect::<Result<Vec<_>>>()?;
        Ok(S::to_string_lossy(symbols))
    }

    fn vocab_size(&self) -> usize {
        self.len()
    }
}
