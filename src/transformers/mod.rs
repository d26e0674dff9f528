//! # Transformers Module
//!
//! Built-in [`Transformer`](crate::Transformer) implementations for stage bodies.
//!
//! - [`MapTransformer`]: total function `T -> T`
//! - [`TryMapTransformer`]: fallible function `T -> Result<T, E>`
//!
//! Custom bodies implement [`Transformer`](crate::Transformer) directly.

mod map_transformer;
mod try_map_transformer;

pub use map_transformer::MapTransformer;
pub use try_map_transformer::TryMapTransformer;
