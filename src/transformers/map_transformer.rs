//! Map transformer for relay stages.
//!
//! [`MapTransformer`] applies a total function to each item. It is the body
//! behind [`Stage::map`](crate::Stage::map) and never fails, so its error
//! strategy is irrelevant in practice.
//!
//! ```rust
//! use relay::Transformer;
//! use relay::transformers::MapTransformer;
//!
//! let double = MapTransformer::new(|x: i64| x * 2).with_name("double");
//! assert_eq!(double.component_info().name, "double");
//! ```

use crate::error::BoxError;
use crate::{StageConfig, Transformer};
use async_trait::async_trait;
use std::marker::PhantomData;

/// A transformer that applies a function to each item.
pub struct MapTransformer<F, T>
where
  F: FnMut(T) -> T + Send + 'static,
  T: std::fmt::Debug + Clone + Send + Sync + 'static,
{
  /// The function to apply to each item.
  pub f: F,
  /// Configuration for the stage, including error handling strategy.
  pub config: StageConfig<T>,
  _phantom: PhantomData<fn(T) -> T>,
}

impl<F, T> MapTransformer<F, T>
where
  F: FnMut(T) -> T + Send + 'static,
  T: std::fmt::Debug + Clone + Send + Sync + 'static,
{
  /// Creates a new `MapTransformer` with the given function.
  pub fn new(f: F) -> Self {
    Self {
      f,
      config: StageConfig::default(),
      _phantom: PhantomData,
    }
  }
}

impl<F, T> Clone for MapTransformer<F, T>
where
  F: FnMut(T) -> T + Send + Clone + 'static,
  T: std::fmt::Debug + Clone + Send + Sync + 'static,
{
  fn clone(&self) -> Self {
    Self {
      f: self.f.clone(),
      config: self.config.clone(),
      _phantom: PhantomData,
    }
  }
}

#[async_trait]
impl<F, T> Transformer<T> for MapTransformer<F, T>
where
  F: FnMut(T) -> T + Send + 'static,
  T: std::fmt::Debug + Clone + Send + Sync + 'static,
{
  async fn transform(&mut self, item: T) -> Result<T, BoxError> {
    Ok((self.f)(item))
  }

  fn get_config_impl(&self) -> &StageConfig<T> {
    &self.config
  }

  fn get_config_mut_impl(&mut self) -> &mut StageConfig<T> {
    &mut self.config
  }
}
