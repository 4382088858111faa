pub mod batcher;
mod collate;
mod element;

pub use batcher::*;
pub use collate::*;
pub use element::*;
