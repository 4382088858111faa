use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::Add;

use burn::config::Config;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Sentence, Sequence, Splitter, Token, TokenId, Tokenizer};
use crate::error::{self, Error};

/// Padding token, always mapped to [`PAD_INDEX`].
pub const PAD_TOKEN: &str = "<pad>";
pub const PAD_INDEX: TokenId = 0;

/// Tokens looked up, in order, as the unknown-word fallback.
pub const UNK_TOKENS: [&str; 2] = ["<UNK>", "<unk>"];

#[derive(Config, Debug)]
pub struct WordVocabularyConfig {
    /// Map out-of-vocabulary words to the unknown token instead of failing.
    #[config(default = false)]
    pub allow_any_word: bool,
    /// Split punctuation into separate tokens rather than splitting on
    /// whitespace only.
    #[config(default = true)]
    pub split_punctuation: bool,
}

/// Persisted state of a [`WordVocabulary`].
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct WordVocabularySnapshot {
    pub words: BTreeMap<Token, TokenId>,
    pub inv_words: BTreeMap<TokenId, Token>,
    pub unk_index: Option<TokenId>,
    pub allow_any_word: bool,
    pub split_punctuation: bool,
}

/// Bidirectional word <-> index table built from a corpus.
#[derive(Clone, Debug)]
pub struct WordVocabulary {
    words: HashMap<Token, TokenId>,
    inv_words: HashMap<TokenId, Token>,
    unk_index: Option<TokenId>,
    allow_any_word: bool,
    splitter: Splitter,
    initialized: bool,
}

impl WordVocabulary {
    /// An empty vocabulary holding only the padding token. It must be
    /// [`finalize`](Self::finalize)d before use.
    pub fn new(config: &WordVocabularyConfig) -> error::Result<Self> {
        let mut vocab = Self {
            words: HashMap::new(),
            inv_words: HashMap::new(),
            unk_index: None,
            allow_any_word: config.allow_any_word,
            splitter: Splitter::new(config.split_punctuation)?,
            initialized: false,
        };
        vocab.add_word(PAD_TOKEN);
        debug_assert_eq!(vocab.index_of(PAD_TOKEN), Some(PAD_INDEX));

        Ok(vocab)
    }

    /// Builds a vocabulary from every distinct token of `sentences`, added
    /// in sorted order after the padding token.
    pub fn from_sentences<S, I>(
        sentences: I,
        config: &WordVocabularyConfig,
    ) -> error::Result<Self>
    where
        S: Into<Sentence>,
        I: IntoIterator<Item = S>,
    {
        let mut vocab = Self::new(config)?;
        let mut words = BTreeSet::new();
        for sentence in sentences {
            words.extend(vocab.split_sentence(&sentence.into())?);
        }
        vocab.extend(words);
        vocab.finalize()?;
        debug!(len = vocab.len(), "built word vocabulary");

        Ok(vocab)
    }

    pub fn from_snapshot(snapshot: WordVocabularySnapshot) -> error::Result<Self> {
        if snapshot.words.get(PAD_TOKEN) != Some(&PAD_INDEX)
            || snapshot.inv_words.get(&PAD_INDEX).map(String::as_str) != Some(PAD_TOKEN)
        {
            return Err(Error::InvalidSnapshot(format!(
                "{PAD_TOKEN} must map to index {PAD_INDEX}"
            )));
        }
        if snapshot.words.len() != snapshot.inv_words.len() {
            return Err(Error::InvalidSnapshot(format!(
                "{} words but {} indices",
                snapshot.words.len(),
                snapshot.inv_words.len()
            )));
        }
        if let Some((word, index)) = snapshot
            .words
            .iter()
            .find(|(word, index)| snapshot.inv_words.get(*index) != Some(*word))
        {
            return Err(Error::InvalidSnapshot(format!(
                "'{word}' maps to index {index}, which does not map back to it"
            )));
        }
        if let Some(unk) = snapshot.unk_index {
            if !snapshot.inv_words.contains_key(&unk) {
                return Err(Error::InvalidSnapshot(format!(
                    "unknown token index {unk} is not in the vocabulary"
                )));
            }
        }

        Ok(Self {
            words: snapshot.words.into_iter().collect(),
            inv_words: snapshot.inv_words.into_iter().collect(),
            unk_index: snapshot.unk_index,
            allow_any_word: snapshot.allow_any_word,
            splitter: Splitter::new(snapshot.split_punctuation)?,
            initialized: true,
        })
    }

    pub fn snapshot(&self) -> WordVocabularySnapshot {
        WordVocabularySnapshot {
            words: self.words.iter().map(|(w, i)| (w.clone(), *i)).collect(),
            inv_words: self.inv_words.iter().map(|(i, w)| (*i, w.clone())).collect(),
            unk_index: self.unk_index,
            allow_any_word: self.allow_any_word,
            split_punctuation: self.splitter.splits_punctuation(),
        }
    }

    /// Adds the words not yet present, in iteration order.
    pub fn extend<W: AsRef<str>>(&mut self, words: impl IntoIterator<Item = W>) {
        for word in words {
            self.add_word(word.as_ref());
        }
    }

    /// Resolves the unknown token and marks the vocabulary ready for use.
    pub fn finalize(&mut self) -> error::Result<()> {
        self.unk_index = UNK_TOKENS
            .iter()
            .find_map(|token| self.words.get(*token).copied());
        if self.allow_any_word && self.unk_index.is_none() {
            return Err(Error::MissingUnknownToken);
        }
        self.initialized = true;

        Ok(())
    }

    fn add_word(&mut self, word: &str) {
        if self.words.contains_key(word) {
            return;
        }
        let next_id = self.words.len() as TokenId;
        self.words.insert(word.to_string(), next_id);
        self.inv_words.insert(next_id, word.to_string());
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn contains(&self, word: &str) -> bool {
        self.words.contains_key(word)
    }

    pub fn index_of(&self, word: &str) -> Option<TokenId> {
        self.words.get(word).copied()
    }

    pub fn unk_index(&self) -> Option<TokenId> {
        self.unk_index
    }

    pub fn split_sentence(&self, sentence: &Sentence) -> error::Result<Vec<Token>> {
        self.splitter.split(sentence)
    }

    /// Index of `word`, falling back to the unknown token when
    /// `allow_any_word` is set.
    pub fn encode_word(&self, word: &str) -> error::Result<TokenId> {
        match (self.words.get(word), self.unk_index) {
            (Some(index), _) => Ok(*index),
            (None, Some(unk)) if self.allow_any_word => Ok(unk),
            (None, _) => Err(Error::UnknownWord(word.to_string())),
        }
    }

    /// Word at `index`, or a visible placeholder for an invalid index.
    pub fn decode_index(&self, index: TokenId) -> Token {
        match self.inv_words.get(&index) {
            Some(word) => word.clone(),
            None => format!("<!INV: {index}!>"),
        }
    }

    pub fn sentence_to_indices(&self, sentence: &Sentence) -> error::Result<Vec<TokenId>> {
        self.ensure_initialized()?;
        self.split_sentence(sentence)?
            .iter()
            .map(|word| self.encode_word(word))
            .collect()
    }

    pub fn indices_to_sentence(&self, indices: &[TokenId]) -> error::Result<Vec<Token>> {
        self.ensure_initialized()?;
        Ok(indices.iter().map(|i| self.decode_index(*i)).collect())
    }

    /// Encodes text or tokens, decodes indices. Empty token and index lists
    /// are returned as they are.
    pub fn call(&self, sequence: Sequence) -> error::Result<Sequence> {
        match sequence {
            Sequence::Tokens(tokens) if tokens.is_empty() => Ok(Sequence::Tokens(tokens)),
            Sequence::Indices(indices) if indices.is_empty() => Ok(Sequence::Indices(indices)),
            Sequence::Text(text) => self
                .sentence_to_indices(&Sentence::Raw(text))
                .map(Sequence::Indices),
            Sequence::Tokens(tokens) => self
                .sentence_to_indices(&Sentence::Tokenized(tokens))
                .map(Sequence::Indices),
            Sequence::Indices(indices) => self.indices_to_sentence(&indices).map(Sequence::Tokens),
        }
    }

    /// Vocabulary over the tokens of both operands.
    pub fn union(&self, other: &WordVocabulary) -> error::Result<WordVocabulary> {
        let config = WordVocabularyConfig::new()
            .with_allow_any_word(self.allow_any_word && other.allow_any_word)
            .with_split_punctuation(self.splitter.splits_punctuation());
        let words: BTreeSet<&str> = self
            .words
            .keys()
            .chain(other.words.keys())
            .map(String::as_str)
            .collect();

        let mut vocab = WordVocabulary::new(&config)?;
        vocab.extend(words);
        vocab.finalize()?;

        Ok(vocab)
    }

    /// Maps indices of `other` to indices of `self`, for tokens known to both.
    pub fn map_from(&self, other: &WordVocabulary) -> HashMap<TokenId, TokenId> {
        self.words
            .iter()
            .filter_map(|(word, index)| other.words.get(word).map(|theirs| (*theirs, *index)))
            .collect()
    }

    fn ensure_initialized(&self) -> error::Result<()> {
        if self.initialized {
            Ok(())
        } else {
            Err(Error::UninitializedVocabulary)
        }
    }
}

impl Add for &WordVocabulary {
    type Output = error::Result<WordVocabulary>;

    fn add(self, other: Self) -> Self::Output {
        self.union(other)
    }
}

impl Tokenizer for WordVocabulary {
    fn encode(&self, string: &str) -> anyhow::Result<Vec<TokenId>> {
        Ok(self.sentence_to_indices(&Sentence::from(string))?)
    }

    fn decode(&self, tokens: &[TokenId]) -> anyhow::Result<String> {
        Ok(self.indices_to_sentence(tokens)?.join(" "))
    }

    fn vocab_size(&self) -> usize {
        self.len()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn config(allow_any_word: bool, split_punctuation: bool) -> WordVocabularyConfig {
        WordVocabularyConfig::new()
            .with_allow_any_word(allow_any_word)
            .with_split_punctuation(split_punctuation)
    }

    fn abc() -> WordVocabulary {
        WordVocabulary::from_sentences(["a b", "b c"], &config(false, true)).unwrap()
    }

    #[test]
    fn builds_sorted_after_pad() {
        let vocab = abc();
        assert_eq!(vocab.len(), 4);
        assert_eq!(vocab.index_of(PAD_TOKEN), Some(PAD_INDEX));
        assert_eq!(vocab.index_of("a"), Some(1));
        assert_eq!(vocab.index_of("b"), Some(2));
        assert_eq!(vocab.index_of("c"), Some(3));

        assert_eq!(vocab.encode_word("b"), Ok(2));
        assert_eq!(vocab.decode_index(2), "b");
        assert_eq!(vocab.decode_index(99), "<!INV: 99!>");
    }

    #[test]
    fn unknown_word_fails_without_fallback() {
        let vocab = abc();
        assert_eq!(
            vocab.sentence_to_indices(&"a d".into()),
            Err(Error::UnknownWord("d".to_string()))
        );
    }

    #[test]
    fn unknown_word_falls_back_to_unk() {
        let vocab = WordVocabulary::from_sentences(
            [Sentence::from(vec!["<unk>", "a"])],
            &config(true, true),
        )
        .unwrap();
        let unk = vocab.index_of("<unk>").unwrap();

        assert_eq!(vocab.unk_index(), Some(unk));
        assert_eq!(vocab.sentence_to_indices(&"a zebra".into()), Ok(vec![2, unk]));
    }

    #[test]
    fn allow_any_word_requires_unk_token() {
        let result = WordVocabulary::from_sentences(["a b"], &config(true, true));
        assert_eq!(result.unwrap_err(), Error::MissingUnknownToken);
    }

    #[test]
    fn uninitialized_vocabulary_is_rejected() {
        let vocab = WordVocabulary::new(&WordVocabularyConfig::new()).unwrap();
        assert_eq!(
            vocab.sentence_to_indices(&"a".into()),
            Err(Error::UninitializedVocabulary)
        );
        assert_eq!(
            vocab.indices_to_sentence(&[0]),
            Err(Error::UninitializedVocabulary)
        );
    }

    #[test]
    fn extend_then_finalize() {
        let mut vocab = WordVocabulary::new(&WordVocabularyConfig::new()).unwrap();
        vocab.extend(["x", "y", "x", PAD_TOKEN]);
        vocab.finalize().unwrap();
        assert_eq!(vocab.len(), 3);
        assert_eq!(vocab.index_of("y"), Some(2));
    }

    #[test]
    fn round_trips_known_sentences() {
        let vocab = WordVocabulary::from_sentences(
            ["The cat, the hat.", "A dog!"],
            &WordVocabularyConfig::new(),
        )
        .unwrap();
        let sentence = "the dog, The hat!";

        let indices = vocab.sentence_to_indices(&sentence.into()).unwrap();
        let words = vocab.indices_to_sentence(&indices).unwrap();
        assert_eq!(words, vocab.split_sentence(&sentence.into()).unwrap());
        assert_eq!(
            vocab.decode(&vocab.encode("A cat").unwrap()).unwrap(),
            "A cat"
        );
    }

    #[test]
    fn whitespace_mode_keeps_punctuation_attached() {
        let vocab =
            WordVocabulary::from_sentences(["hi, there"], &config(false, false)).unwrap();
        assert!(vocab.contains("hi,"));
        assert!(!vocab.contains(","));
    }

    #[test]
    fn call_dispatches_on_content() {
        let vocab = abc();

        assert_eq!(
            vocab.call(Sequence::Text("c a".into())),
            Ok(Sequence::Indices(vec![3, 1]))
        );
        assert_eq!(
            vocab.call(Sequence::Tokens(vec!["b".into()])),
            Ok(Sequence::Indices(vec![2]))
        );
        assert_eq!(
            vocab.call(Sequence::Indices(vec![1, 7])),
            Ok(Sequence::Tokens(vec!["a".into(), "<!INV: 7!>".into()]))
        );
        assert_eq!(
            vocab.call(Sequence::Indices(vec![])),
            Ok(Sequence::Indices(vec![]))
        );

        let uninitialized = WordVocabulary::new(&WordVocabularyConfig::new()).unwrap();
        assert_eq!(
            uninitialized.call(Sequence::Tokens(vec![])),
            Ok(Sequence::Tokens(vec![]))
        );
    }

    #[test]
    fn snapshot_restores_through_json() {
        let vocab = WordVocabulary::from_sentences(
            [Sentence::from(vec!["<UNK>", "x"]), Sentence::from("y, z")],
            &config(true, false),
        )
        .unwrap();

        let json = serde_json::to_string(&vocab.snapshot()).unwrap();
        let snapshot: WordVocabularySnapshot = serde_json::from_str(&json).unwrap();
        let restored = WordVocabulary::from_snapshot(snapshot).unwrap();

        assert_eq!(restored.snapshot(), vocab.snapshot());
        assert_eq!(
            restored.sentence_to_indices(&"x q".into()).unwrap(),
            vec![vocab.index_of("x").unwrap(), vocab.unk_index().unwrap()]
        );
    }

    #[test]
    fn snapshot_without_pad_is_rejected() {
        let mut snapshot = abc().snapshot();
        snapshot.words.remove(PAD_TOKEN);
        assert!(matches!(
            WordVocabulary::from_snapshot(snapshot),
            Err(Error::InvalidSnapshot(_))
        ));
    }

    #[test]
    fn snapshot_with_unequal_maps_is_rejected() {
        let mut snapshot = abc().snapshot();
        snapshot.inv_words.insert(9, "extra".to_string());
        assert!(matches!(
            WordVocabulary::from_snapshot(snapshot),
            Err(Error::InvalidSnapshot(_))
        ));
    }

    #[test]
    fn snapshot_with_inconsistent_maps_is_rejected() {
        let vocab = WordVocabulary::from_sentences(
            [Sentence::from(vec!["<UNK>", "x"])],
            &config(true, true),
        )
        .unwrap();
        let unk = vocab.unk_index().unwrap();

        let mut snapshot = vocab.snapshot();
        snapshot.inv_words.insert(unk, "zzz".to_string());
        assert!(matches!(
            WordVocabulary::from_snapshot(snapshot),
            Err(Error::InvalidSnapshot(_))
        ));

        let mut snapshot = vocab.snapshot();
        snapshot.unk_index = Some(42);
        assert!(matches!(
            WordVocabulary::from_snapshot(snapshot),
            Err(Error::InvalidSnapshot(_))
        ));
    }

    #[test]
    fn upper_case_unk_wins_over_lower_case() {
        let vocab = WordVocabulary::from_sentences(
            [Sentence::from(vec!["<unk>", "<UNK>", "a"])],
            &config(true, true),
        )
        .unwrap();

        assert_eq!(vocab.unk_index(), vocab.index_of("<UNK>"));
        assert_ne!(vocab.unk_index(), vocab.index_of("<unk>"));
        assert_eq!(vocab.encode_word("zebra"), Ok(vocab.index_of("<UNK>").unwrap()));
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = config(true, false);
        let restored: WordVocabularyConfig =
            serde_json::from_str(&serde_json::to_string(&config).unwrap()).unwrap();
        assert!(restored.allow_any_word);
        assert!(!restored.split_punctuation);
    }

    #[test]
    fn union_contains_both() {
        let left = abc();
        let right = WordVocabulary::from_sentences(["c d e"], &WordVocabularyConfig::new()).unwrap();

        let both = (&left + &right).unwrap();

        assert!(both.len() >= left.len().max(right.len()));
        assert_eq!(both.len(), 6);
        assert_eq!(both.index_of(PAD_TOKEN), Some(PAD_INDEX));
        for word in ["a", "b", "c", "d", "e"] {
            assert!(both.contains(word), "missing {word}");
        }
    }

    #[test]
    fn maps_indices_between_vocabularies() {
        let left = abc();
        let right = WordVocabulary::from_sentences(["c a z"], &WordVocabularyConfig::new()).unwrap();

        let mapping = left.map_from(&right);

        assert_eq!(mapping.len(), 3);
        assert_eq!(mapping[&right.index_of("c").unwrap()], left.index_of("c").unwrap());
        assert_eq!(mapping[&right.index_of("a").unwrap()], left.index_of("a").unwrap());
        assert_eq!(mapping[&PAD_INDEX], PAD_INDEX);
        assert!(!mapping.contains_key(&right.index_of("z").unwrap()));
    }
}
