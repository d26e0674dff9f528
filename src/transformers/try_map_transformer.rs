//! Fallible map transformer for relay stages.
//!
//! [`TryMapTransformer`] applies a function that may fail. Failures are turned
//! into [`StreamError`](crate::error::StreamError)s by the stage worker and
//! handled with the configured [`ErrorStrategy`](crate::error::ErrorStrategy).

use crate::error::BoxError;
use crate::{StageConfig, Transformer};
use async_trait::async_trait;
use std::marker::PhantomData;

/// A transformer that applies a fallible function to each item.
pub struct TryMapTransformer<F, T, E>
where
  F: FnMut(T) -> Result<T, E> + Send + 'static,
  T: std::fmt::Debug + Clone + Send + Sync + 'static,
  E: std::error::Error + Send + Sync + 'static,
{
  /// The function to apply to each item.
  pub f: F,
  /// Configuration for the stage, including error handling strategy.
  pub config: StageConfig<T>,
  _phantom: PhantomData<fn(T) -> Result<T, E>>,
}

impl<F, T, E> TryMapTransformer<F, T, E>
where
  F: FnMut(T) -> Result<T, E> + Send + 'static,
  T: std::fmt::Debug + Clone + Send + Sync + 'static,
  E: std::error::Error + Send + Sync + 'static,
{
  /// Creates a new `TryMapTransformer` with the given function.
  pub fn new(f: F) -> Self {
    Self {
      f,
      config: StageConfig::default(),
      _phantom: PhantomData,
    }
  }
}

#[async_trait]
impl<F, T, E> Transformer<T> for TryMapTransformer<F, T, E>
where
  F: FnMut(T) -> Result<T, E> + Send + 'static,
  T: std::fmt::Debug + Clone + Send + Sync + 'static,
  E: std::error::Error + Send + Sync + 'static,
{
  async fn transform(&mut self, item: T) -> Result<T, BoxError> {
    (self.f)(item).map_err(|e| Box::new(e) as BoxError)
  }

  fn get_config_impl(&self) -> &StageConfig<T> {
    &self.config
  }

  fn get_config_mut_impl(&mut self) -> &mut StageConfig<T> {
    &mut self.config
  }
}
