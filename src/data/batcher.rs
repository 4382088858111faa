use std::sync::Arc;

use burn::{
    data::dataloader::batcher::Batcher,
    tensor::{backend::Backend, Int, Tensor},
};
use derive_new::new;
use tracing::debug;

use crate::data::{Element, Padded, VarLengthCollate};
use crate::error::{Error, Result};
use crate::tokenizer::{Sentence, WordVocabulary};

impl Batcher<Element, Result<Padded>> for VarLengthCollate {
    fn batch(&self, items: Vec<Element>) -> Result<Padded> {
        self.merge(items)
    }
}

#[derive(new, Clone, Debug)]
pub struct TextItem {
    pub text: String,
}

#[derive(Clone, Debug)]
pub struct SequenceBatch<B: Backend> {
    /// Token ids, `[batch_size, max_len]`, padded with the collate pad value.
    pub tokens: Tensor<B, 2, Int>,
    /// Number of real tokens in every row.
    pub lengths: Tensor<B, 1, Int>,
}

/// Encodes texts with a shared vocabulary and pads them batch-first.
///
/// The batch dimension configured on the collator is ignored; token rows are
/// always stacked along dimension 0.
#[derive(new)]
pub struct SequenceBatcher<B: Backend> {
    vocabulary: Arc<WordVocabulary>,
    collate: VarLengthCollate,
    device: B::Device,
}

impl<B: Backend> SequenceBatcher<B> {
    fn encode(&self, item: &TextItem) -> Result<Element> {
        let ids = self
            .vocabulary
            .sentence_to_indices(&Sentence::from(item.text.as_str()))?;
        let length = ids.len() as i64;
        let tokens: Vec<i64> = ids.into_iter().map(|id| id as i64).collect();

        Ok(Element::map([
            ("tokens", Element::from(tokens)),
            ("length", Element::from(length)),
        ]))
    }
}

impl<B: Backend> Batcher<TextItem, Result<SequenceBatch<B>>> for SequenceBatcher<B> {
    fn batch(&self, items: Vec<TextItem>) -> Result<SequenceBatch<B>> {
        let elements = items
            .iter()
            .map(|item| self.encode(item))
            .collect::<Result<Vec<_>>>()?;

        let config = self.collate.config().clone().with_batch_dim(0);
        let merged = VarLengthCollate::new(config).merge(elements)?;

        let field = |key: &str| merged.get(key).ok_or_else(|| Error::MissingKey(key.to_string()));
        let tokens: Tensor<B, 2, Int> = field("tokens")?.to_int_tensor(&self.device)?;
        let lengths: Tensor<B, 1, Int> = field("length")?.to_int_tensor(&self.device)?;
        debug!(dims = ?tokens.dims(), "built sequence batch");

        Ok(SequenceBatch { tokens, lengths })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::data::CollateConfig;
    use crate::tokenizer::{WordVocabularyConfig, PAD_INDEX};
    use burn::backend::NdArray;
    use ndarray::array;

    type TestBackend = NdArray<f32>;

    fn vocabulary() -> Arc<WordVocabulary> {
        let vocab = WordVocabulary::from_sentences(
            ["the cat sat", "the dog"],
            &WordVocabularyConfig::new(),
        )
        .unwrap();
        Arc::new(vocab)
    }

    #[test]
    fn collate_batcher_merges_elements() {
        let collate = VarLengthCollate::new(CollateConfig::new().with_batch_dim(0));
        let merged = collate
            .batch(vec![
                Element::from(vec![1i64, 2]),
                Element::from(vec![3i64]),
            ])
            .unwrap();
        assert_eq!(merged, Padded::Int(array![[1i64, 2], [3, 0]].into_dyn()));
    }

    #[test]
    fn sequence_batcher_pads_batch_first() {
        let vocab = vocabulary();
        let batcher = SequenceBatcher::<TestBackend>::new(
            vocab.clone(),
            VarLengthCollate::new(CollateConfig::new()),
            Default::default(),
        );

        let batch = batcher
            .batch(vec![TextItem::new("the dog".into()), TextItem::new("the cat sat".into())])
            .unwrap();

        assert_eq!(batch.tokens.dims(), [2, 3]);
        let the = vocab.index_of("the").unwrap() as i64;
        let dog = vocab.index_of("dog").unwrap() as i64;
        let cat = vocab.index_of("cat").unwrap() as i64;
        let sat = vocab.index_of("sat").unwrap() as i64;
        assert_eq!(
            batch.tokens.into_data().convert::<i64>().value,
            vec![the, dog, PAD_INDEX as i64, the, cat, sat]
        );
        assert_eq!(batch.lengths.into_data().convert::<i64>().value, vec![2, 3]);
    }

    #[test]
    fn sequence_batcher_rejects_unknown_words() {
        let batcher = SequenceBatcher::<TestBackend>::new(
            vocabulary(),
            VarLengthCollate::new(CollateConfig::new()),
            Default::default(),
        );
        let err = batcher.batch(vec![TextItem::new("the bird".into())]).unwrap_err();
        assert_eq!(err, Error::UnknownWord("bird".into()));
    }
}
