use std::collections::BTreeMap;

use burn::config::Config;
use extend::ext;
use ndarray::{Array1, ArrayD, Axis, IxDyn, Slice};
use tracing::{debug, trace, warn};

use crate::data::element::{ArrayLeaf, Category, Element, Padded, Scalar};
use crate::error::{self, Error};

#[derive(Config, Debug)]
pub struct CollateConfig {
    /// Fill value for cells without source data. Cast to the leaf's dtype.
    #[config(default = 0.0)]
    pub pad_value: f64,
    /// Position of the new batch axis. The default of 1 gives the
    /// sequence-first `[time, batch, ...]` layout.
    #[config(default = 1)]
    pub batch_dim: usize,
}

#[ext(name = BatchShapeExt)]
impl<A> [ArrayD<A>] {
    /// Elementwise maximum of every dimension, and whether that dimension's
    /// size differs anywhere in the batch.
    fn max_dims(&self) -> error::Result<(Vec<usize>, Vec<bool>)> {
        let first = self.first().ok_or(Error::EmptyBatch)?;
        let mut max_shape = first.shape().to_vec();
        let mut varies = vec![false; max_shape.len()];

        for (i, array) in self.iter().enumerate().skip(1) {
            let shape = array.shape();
            if shape.len() != max_shape.len() {
                return Err(Error::ShapeMismatch(format!(
                    "element {i} has rank {}, element 0 has rank {}",
                    shape.len(),
                    max_shape.len()
                )));
            }
            for (d, &size) in shape.iter().enumerate() {
                varies[d] |= size != max_shape[d];
                max_shape[d] = max_shape[d].max(size);
            }
        }

        Ok((max_shape, varies))
    }
}

/// Stacks differently sized arrays of equal rank along a new batch axis.
///
/// The result is allocated once and filled with `pad`; every element is then
/// copied into its own slot, narrowed along the dimensions that vary across
/// the batch. If `batch_dim` is past the elements' rank the batch axis is
/// placed at 0 instead.
pub fn merge_var_len_array<A: Clone>(
    batch: &[ArrayD<A>],
    pad: A,
    batch_dim: usize,
) -> error::Result<ArrayD<A>> {
    let (max_shape, varies) = batch.max_dims()?;

    let axis = if batch_dim <= max_shape.len() {
        batch_dim
    } else {
        warn!(
            batch_dim,
            rank = max_shape.len(),
            "batch dimension out of range, stacking along dimension 0"
        );
        0
    };

    let mut shape = max_shape;
    shape.insert(axis, batch.len());
    trace!(?shape, ?varies, "merging arrays");

    let mut out = ArrayD::from_elem(IxDyn(&shape), pad);
    for (i, array) in batch.iter().enumerate() {
        let mut slot = out.index_axis_mut(Axis(axis), i);
        for (d, _) in varies.iter().enumerate().filter(|(_, varies)| **varies) {
            slot.slice_axis_inplace(Axis(d), Slice::from(0..array.shape()[d]));
        }
        slot.assign(array);
    }

    Ok(out)
}

/// Merges batches of [`Element`]s into [`Padded`] batches.
#[derive(Clone, Debug)]
pub struct VarLengthCollate {
    config: CollateConfig,
}

impl VarLengthCollate {
    pub fn new(config: CollateConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CollateConfig {
        &self.config
    }

    pub fn merge(&self, batch: Vec<Element>) -> error::Result<Padded> {
        let category = batch.first().ok_or(Error::EmptyBatch)?.category();
        if let Some(other) = batch.iter().find(|e| e.category() != category) {
            return Err(Error::UnsupportedType(format!(
                "batch mixes {category} with {}",
                other.category()
            )));
        }
        debug!(%category, size = batch.len(), "merging batch");

        match category {
            Category::Mapping => self.merge_maps(batch),
            Category::Array => self.merge_arrays(batch.into_iter().filter_map(|e| match e {
                Element::Array(a) => Some(a),
                _ => None,
            })),
            Category::Tokens => Ok(Padded::Tokens(
                batch
                    .into_iter()
                    .filter_map(|e| match e {
                        Element::Tokens(tokens) => Some(tokens),
                        _ => None,
                    })
                    .collect(),
            )),
            Category::ScalarList => self.merge_scalar_lists(batch),
            Category::Scalar => Ok(merge_scalars(
                batch
                    .into_iter()
                    .filter_map(|e| match e {
                        Element::Scalar(s) => Some(s),
                        _ => None,
                    })
                    .collect(),
            )),
            Category::Text => Ok(Padded::Text(
                batch
                    .into_iter()
                    .filter_map(|e| match e {
                        Element::Text(text) => Some(text),
                        _ => None,
                    })
                    .collect(),
            )),
        }
    }

    fn merge_maps(&self, batch: Vec<Element>) -> error::Result<Padded> {
        let mut maps: Vec<BTreeMap<String, Element>> = batch
            .into_iter()
            .filter_map(|e| match e {
                Element::Map(map) => Some(map),
                _ => None,
            })
            .collect();
        let keys: Vec<String> = maps[0].keys().cloned().collect();

        let mut out = BTreeMap::new();
        for key in keys {
            let column = maps
                .iter_mut()
                .map(|map| map.remove(&key).ok_or_else(|| Error::MissingKey(key.clone())))
                .collect::<error::Result<Vec<_>>>()?;
            trace!(%key, "merging mapping entry");
            let merged = self.merge(column)?;
            out.insert(key, merged);
        }

        Ok(Padded::Map(out))
    }

    /// The output dtype follows the first array; the rest are cast to it.
    fn merge_arrays(&self, arrays: impl Iterator<Item = ArrayLeaf>) -> error::Result<Padded> {
        let mut arrays = arrays.peekable();
        match arrays.peek() {
            Some(ArrayLeaf::Float(_)) => {
                let batch: Vec<ArrayD<f32>> = arrays.map(ArrayLeaf::into_float).collect();
                merge_var_len_array(&batch, self.config.pad_value as f32, self.config.batch_dim)
                    .map(Padded::Float)
            }
            Some(ArrayLeaf::Int(_)) => {
                let batch: Vec<ArrayD<i64>> = arrays.map(ArrayLeaf::into_int).collect();
                merge_var_len_array(&batch, self.config.pad_value as i64, self.config.batch_dim)
                    .map(Padded::Int)
            }
            None => Err(Error::EmptyBatch),
        }
    }

    fn merge_scalar_lists(&self, batch: Vec<Element>) -> error::Result<Padded> {
        let lists: Vec<Vec<Scalar>> = batch
            .into_iter()
            .filter_map(|e| match e {
                Element::Scalars(list) => Some(list),
                _ => None,
            })
            .collect();
        let float = lists.iter().flatten().any(Scalar::is_float);

        let arrays = lists.into_iter().map(|list| {
            if float {
                ArrayLeaf::Float(list.into_iter().map(Scalar::as_f32).collect::<Array1<_>>().into_dyn())
            } else {
                ArrayLeaf::Int(list.into_iter().map(Scalar::as_i64).collect::<Array1<_>>().into_dyn())
            }
        });
        self.merge_arrays(arrays)
    }
}

fn merge_scalars(scalars: Vec<Scalar>) -> Padded {
    if scalars.iter().any(Scalar::is_float) {
        let values: Array1<f32> = scalars.into_iter().map(Scalar::as_f32).collect();
        Padded::Float(values.into_dyn())
    } else {
        let values: Array1<i64> = scalars.into_iter().map(Scalar::as_i64).collect();
        Padded::Int(values.into_dyn())
    }
}
