//! Variable-length batch collation and vocabularies for sequence models.

pub mod data;
pub mod error;
pub mod model;
pub mod tokenizer;

pub use error::{Error, Result};
