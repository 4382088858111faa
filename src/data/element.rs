use std::collections::BTreeMap;
use std::fmt;

use burn::tensor::{backend::Backend, Tensor};
use burn_tensor::{Data, Int, Shape};
use ndarray::{Array, ArrayD, Dimension, IxDyn};
use serde_json::{json, Value};

use crate::error::{Error, Result};

/// Leaf category of a batch element, checked in this order during a merge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Category {
    Mapping,
    Array,
    Tokens,
    ScalarList,
    Scalar,
    Text,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Category::Mapping => "mapping",
            Category::Array => "array",
            Category::Tokens => "token list",
            Category::ScalarList => "scalar list",
            Category::Scalar => "scalar",
            Category::Text => "string",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Scalar {
    Int(i64),
    Float(f64),
}

impl Scalar {
    pub fn is_float(&self) -> bool {
        matches!(self, Scalar::Float(_))
    }

    pub fn as_f32(self) -> f32 {
        match self {
            Scalar::Int(v) => v as f32,
            Scalar::Float(v) => v as f32,
        }
    }

    pub fn as_i64(self) -> i64 {
        match self {
            Scalar::Int(v) => v,
            Scalar::Float(v) => v as i64,
        }
    }
}

/// Numeric n-d array leaf.
#[derive(Clone, Debug, PartialEq)]
pub enum ArrayLeaf {
    Float(ArrayD<f32>),
    Int(ArrayD<i64>),
}

impl ArrayLeaf {
    pub fn shape(&self) -> &[usize] {
        match self {
            ArrayLeaf::Float(a) => a.shape(),
            ArrayLeaf::Int(a) => a.shape(),
        }
    }

    pub fn into_float(self) -> ArrayD<f32> {
        match self {
            ArrayLeaf::Float(a) => a,
            ArrayLeaf::Int(a) => a.mapv(|v| v as f32),
        }
    }

    pub fn into_int(self) -> ArrayD<i64> {
        match self {
            ArrayLeaf::Float(a) => a.mapv(|v| v as i64),
            ArrayLeaf::Int(a) => a,
        }
    }
}

/// One item of a batch, possibly nested.
///
/// All items of a batch must share the same structure; only the sizes of
/// array leaves may differ.
#[derive(Clone, Debug, PartialEq)]
pub enum Element {
    Map(BTreeMap<String, Element>),
    Array(ArrayLeaf),
    /// An already tokenized sentence. Never padded.
    Tokens(Vec<String>),
    Scalars(Vec<Scalar>),
    Scalar(Scalar),
    Text(String),
}

impl Element {
    pub fn category(&self) -> Category {
        match self {
            Element::Map(_) => Category::Mapping,
            Element::Array(_) => Category::Array,
            Element::Tokens(_) => Category::Tokens,
            Element::Scalars(_) => Category::ScalarList,
            Element::Scalar(_) => Category::Scalar,
            Element::Text(_) => Category::Text,
        }
    }

    /// Builds a mapping element from `(key, value)` pairs.
    pub fn map<K, V, I>(entries: I) -> Self
    where
        K: Into<String>,
        V: Into<Element>,
        I: IntoIterator<Item = (K, V)>,
    {
        Element::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl<D: Dimension> From<Array<f32, D>> for Element {
    fn from(array: Array<f32, D>) -> Self {
        Element::Array(ArrayLeaf::Float(array.into_dyn()))
    }
}

impl<D: Dimension> From<Array<i64, D>> for Element {
    fn from(array: Array<i64, D>) -> Self {
        Element::Array(ArrayLeaf::Int(array.into_dyn()))
    }
}

impl From<Vec<i64>> for Element {
    fn from(values: Vec<i64>) -> Self {
        Element::Scalars(values.into_iter().map(Scalar::Int).collect())
    }
}

impl From<Vec<f64>> for Element {
    fn from(values: Vec<f64>) -> Self {
        Element::Scalars(values.into_iter().map(Scalar::Float).collect())
    }
}

impl From<Vec<String>> for Element {
    fn from(tokens: Vec<String>) -> Self {
        Element::Tokens(tokens)
    }
}

impl From<i64> for Element {
    fn from(value: i64) -> Self {
        Element::Scalar(Scalar::Int(value))
    }
}

impl From<f64> for Element {
    fn from(value: f64) -> Self {
        Element::Scalar(Scalar::Float(value))
    }
}

impl From<&str> for Element {
    fn from(text: &str) -> Self {
        Element::Text(text.to_string())
    }
}

impl From<String> for Element {
    fn from(text: String) -> Self {
        Element::Text(text)
    }
}

impl TryFrom<Value> for Element {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => map
                .into_iter()
                .map(|(key, value)| Ok((key, Element::try_from(value)?)))
                .collect::<Result<BTreeMap<_, _>>>()
                .map(Element::Map),
            Value::String(text) => Ok(Element::Text(text)),
            Value::Array(items) => match items.first() {
                None => Ok(Element::Scalars(Vec::new())),
                Some(Value::String(_)) => items
                    .into_iter()
                    .map(|item| match item {
                        Value::String(token) => Ok(token),
                        other => Err(Error::UnsupportedType(format!(
                            "token list mixes strings with {other}"
                        ))),
                    })
                    .collect::<Result<Vec<_>>>()
                    .map(Element::Tokens),
                Some(Value::Array(_)) => nested_array(&items).map(Element::Array),
                Some(_) => items
                    .iter()
                    .map(json_scalar)
                    .collect::<Result<Vec<_>>>()
                    .map(Element::Scalars),
            },
            other => json_scalar(&other).map(Element::Scalar),
        }
    }
}

fn json_scalar(value: &Value) -> Result<Scalar> {
    match value {
        Value::Number(n) => match n.as_i64() {
            Some(v) => Ok(Scalar::Int(v)),
            None => n
                .as_f64()
                .map(Scalar::Float)
                .ok_or_else(|| Error::UnsupportedType(format!("number {n}"))),
        },
        Value::Bool(b) => Ok(Scalar::Int(i64::from(*b))),
        other => Err(Error::UnsupportedType(format!("json value {other}"))),
    }
}

/// Shape of a nested JSON array, read along the first entry of every level.
fn nested_shape(items: &[Value]) -> Vec<usize> {
    let mut shape = vec![items.len()];
    let mut current = items.first();
    while let Some(Value::Array(inner)) = current {
        shape.push(inner.len());
        current = inner.first();
    }
    shape
}

fn fill_nested(items: &[Value], shape: &[usize], out: &mut Vec<Scalar>) -> Result<()> {
    if items.len() != shape[0] {
        return Err(Error::ShapeMismatch(format!(
            "ragged nested array: expected {} entries, found {}",
            shape[0],
            items.len()
        )));
    }
    for item in items {
        match item {
            Value::Array(inner) if shape.len() > 1 => fill_nested(inner, &shape[1..], out)?,
            Value::Array(_) => {
                return Err(Error::ShapeMismatch(
                    "nested array is deeper than its first entry".to_string(),
                ))
            }
            _ if shape.len() > 1 => {
                return Err(Error::ShapeMismatch(
                    "nested array mixes scalars and arrays".to_string(),
                ))
            }
            value => out.push(json_scalar(value)?),
        }
    }
    Ok(())
}

fn nested_array(items: &[Value]) -> Result<ArrayLeaf> {
    let shape = nested_shape(items);
    let mut values = Vec::with_capacity(shape.iter().product());
    fill_nested(items, &shape, &mut values)?;

    let to_shape_err = |err: ndarray::ShapeError| Error::ShapeMismatch(err.to_string());
    if values.iter().any(Scalar::is_float) {
        let data = values.into_iter().map(Scalar::as_f32).collect();
        ArrayD::from_shape_vec(IxDyn(&shape), data)
            .map(ArrayLeaf::Float)
            .map_err(to_shape_err)
    } else {
        let data = values.into_iter().map(Scalar::as_i64).collect();
        ArrayD::from_shape_vec(IxDyn(&shape), data)
            .map(ArrayLeaf::Int)
            .map_err(to_shape_err)
    }
}

/// A merged batch. Mirrors the structure of a single [`Element`], with every
/// array leaf carrying an extra batch dimension.
#[derive(Clone, Debug, PartialEq)]
pub enum Padded {
    Map(BTreeMap<String, Padded>),
    Float(ArrayD<f32>),
    Int(ArrayD<i64>),
    Tokens(Vec<Vec<String>>),
    Text(Vec<String>),
}

impl Padded {
    pub fn get(&self, key: &str) -> Option<&Padded> {
        match self {
            Padded::Map(map) => map.get(key),
            _ => None,
        }
    }

    /// Unwraps a mapping batch into its named top-level entries.
    pub fn into_map(self) -> Result<BTreeMap<String, Padded>> {
        match self {
            Padded::Map(map) => Ok(map),
            other => Err(Error::UnsupportedType(format!(
                "expected a mapping batch, found {}",
                other.kind()
            ))),
        }
    }

    pub fn as_float(&self) -> Option<&ArrayD<f32>> {
        match self {
            Padded::Float(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<&ArrayD<i64>> {
        match self {
            Padded::Int(a) => Some(a),
            _ => None,
        }
    }

    pub fn shape(&self) -> Option<&[usize]> {
        match self {
            Padded::Float(a) => Some(a.shape()),
            Padded::Int(a) => Some(a.shape()),
            _ => None,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Padded::Map(_) => "mapping",
            Padded::Float(_) => "float array",
            Padded::Int(_) => "int array",
            Padded::Tokens(_) => "token lists",
            Padded::Text(_) => "strings",
        }
    }

    /// Renders the batch as JSON; arrays become `{"shape": .., "data": ..}`
    /// with data in row-major order.
    pub fn to_json(&self) -> Value {
        match self {
            Padded::Map(map) => Value::Object(
                map.iter()
                    .map(|(key, value)| (key.clone(), value.to_json()))
                    .collect(),
            ),
            Padded::Float(a) => json!({
                "shape": a.shape(),
                "data": a.iter().copied().collect::<Vec<_>>(),
            }),
            Padded::Int(a) => json!({
                "shape": a.shape(),
                "data": a.iter().copied().collect::<Vec<_>>(),
            }),
            Padded::Tokens(tokens) => json!(tokens),
            Padded::Text(text) => json!(text),
        }
    }

    /// Copies a numeric leaf into a float tensor of rank `D`.
    pub fn to_float_tensor<B: Backend, const D: usize>(
        &self,
        device: &B::Device,
    ) -> Result<Tensor<B, D>> {
        let (shape, values): (&[usize], Vec<f32>) = match self {
            Padded::Float(a) => (a.shape(), a.iter().copied().collect()),
            Padded::Int(a) => (a.shape(), a.iter().map(|v| *v as f32).collect()),
            other => {
                return Err(Error::UnsupportedType(format!(
                    "expected an array leaf, found {}",
                    other.kind()
                )))
            }
        };
        let dims = tensor_dims::<D>(shape)?;

        Ok(Tensor::<B, D>::from_data(
            Data::new(values, Shape::new(dims)).convert(),
            device,
        ))
    }

    /// Copies an integer leaf into an int tensor of rank `D`.
    pub fn to_int_tensor<B: Backend, const D: usize>(
        &self,
        device: &B::Device,
    ) -> Result<Tensor<B, D, Int>> {
        let Padded::Int(array) = self else {
            return Err(Error::UnsupportedType(format!(
                "expected an int array, found {}",
                self.kind()
            )));
        };
        let dims = tensor_dims::<D>(array.shape())?;
        let values: Vec<i64> = array.iter().copied().collect();

        Ok(Tensor::<B, D, Int>::from_data(
            Data::new(values, Shape::new(dims)).convert(),
            device,
        ))
    }
}

fn tensor_dims<const D: usize>(shape: &[usize]) -> Result<[usize; D]> {
    shape.try_into().map_err(|_| {
        Error::ShapeMismatch(format!("expected rank {D}, found shape {shape:?}"))
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use burn::backend::NdArray;
    use ndarray::array;

    type TestBackend = NdArray<f32>;

    #[test]
    fn json_object_becomes_mapping() {
        let value = json!({"tokens": ["a", "b"], "len": 2, "score": 0.5, "name": "x"});
        let element = Element::try_from(value).unwrap();

        let Element::Map(map) = element else {
            panic!("expected mapping");
        };
        assert_eq!(map["tokens"], Element::Tokens(vec!["a".into(), "b".into()]));
        assert_eq!(map["len"], Element::Scalar(Scalar::Int(2)));
        assert_eq!(map["score"], Element::Scalar(Scalar::Float(0.5)));
        assert_eq!(map["name"], Element::Text("x".into()));
    }

    #[test]
    fn json_numbers_become_scalar_list() {
        let element = Element::try_from(json!([1, 2, 3])).unwrap();
        assert_eq!(element, Element::from(vec![1i64, 2, 3]));
        assert_eq!(element.category(), Category::ScalarList);
    }

    #[test]
    fn json_nested_numbers_become_array() {
        let element = Element::try_from(json!([[1, 2], [3, 4.5], [5, 6]])).unwrap();
        let Element::Array(ArrayLeaf::Float(a)) = element else {
            panic!("expected float array");
        };
        assert_eq!(a.shape(), &[3, 2]);
        assert_eq!(a[[1, 1]], 4.5);
    }

    #[test]
    fn json_ragged_array_is_rejected() {
        let err = Element::try_from(json!([[1, 2], [3]])).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch(_)));

        let err = Element::try_from(json!([[1, 2], 3])).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch(_)));
    }

    #[test]
    fn json_null_is_unsupported() {
        let err = Element::try_from(json!({"x": null})).unwrap_err();
        assert!(matches!(err, Error::UnsupportedType(_)));
    }

    #[test]
    fn padded_to_json() {
        let padded = Padded::Map(BTreeMap::from([(
            "x".to_string(),
            Padded::Int(array![[1i64, 2], [3, 0]].into_dyn()),
        )]));
        assert_eq!(
            padded.to_json(),
            json!({"x": {"shape": [2, 2], "data": [1, 2, 3, 0]}})
        );
    }

    #[test]
    fn into_map_requires_mapping() {
        assert!(Padded::Text(vec!["a".into()]).into_map().is_err());
        assert!(Padded::Map(BTreeMap::new()).into_map().unwrap().is_empty());
    }

    #[test]
    fn padded_to_tensor_checks_rank() {
        let device = Default::default();
        let padded = Padded::Int(array![[1i64, 2, 3], [4, 5, 6]].into_dyn());

        let tensor = padded.to_int_tensor::<TestBackend, 2>(&device).unwrap();
        assert_eq!(tensor.dims(), [2, 3]);
        assert_eq!(
            tensor.into_data().convert::<i64>().value,
            vec![1, 2, 3, 4, 5, 6]
        );

        let floats = padded.to_float_tensor::<TestBackend, 2>(&device).unwrap();
        assert_eq!(floats.into_data().value, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);

        assert!(padded.to_int_tensor::<TestBackend, 3>(&device).is_err());
        assert!(Padded::Text(vec![])
            .to_float_tensor::<TestBackend, 1>(&device)
            .is_err());
    }
}
