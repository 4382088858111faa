use std::collections::BTreeMap;

use anyhow::Result;
use burn::tensor::backend::Backend;

use crate::data::Padded;

/// Named top-level entries of a merged batch, as handed to a model.
pub type NamedBatch = BTreeMap<String, Padded>;

/// What a trainable model exposes to the data pipeline.
///
/// Implementations live with the models; nothing in this crate calls them.
pub trait ModelInterface<B: Backend> {
    /// Model-ready representation of a batch.
    type Input;
    /// Raw result of a forward pass.
    type Output;
    /// Task-level reading of an [`Output`](Self::Output).
    type Decoded;

    fn create_input(&self, data: &NamedBatch, device: &B::Device) -> Result<Self::Input>;

    fn decode_outputs(&self, outputs: &Self::Output) -> Result<Self::Decoded>;

    fn forward(&self, data: &NamedBatch, device: &B::Device) -> Result<Self::Output>;
}
