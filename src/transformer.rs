//! # Transformer Trait
//!
//! A [`Transformer`] is the per-item body of a pipeline stage: it turns one
//! value into one value, or fails. The stage worker around it owns the
//! queues, the loop and the error strategy, so transformers stay small and
//! never deal with channels or shutdown.
//!
//! ## Example
//!
//! ```rust
//! use async_trait::async_trait;
//! use relay::error::BoxError;
//! use relay::{StageConfig, Transformer};
//!
//! struct Increment {
//!   config: StageConfig<i64>,
//! }
//!
//! #[async_trait]
//! impl Transformer<i64> for Increment {
//!   async fn transform(&mut self, item: i64) -> Result<i64, BoxError> {
//!     Ok(item + 1)
//!   }
//!
//!   fn get_config_impl(&self) -> &StageConfig<i64> {
//!     &self.config
//!   }
//!
//!   fn get_config_mut_impl(&mut self) -> &mut StageConfig<i64> {
//!     &mut self.config
//!   }
//! }
//! ```

use crate::error::{BoxError, ComponentInfo, ErrorAction, ErrorContext, ErrorStrategy, StreamError};
use async_trait::async_trait;

/// Configuration shared by every stage: a name for logs and error reports,
/// and the strategy applied to transformation failures.
#[derive(Debug, Clone, PartialEq)]
pub struct StageConfig<T> {
  /// The error handling strategy to use when a transformation fails.
  pub error_strategy: ErrorStrategy<T>,
  /// Optional name for identifying this stage in logs and errors.
  pub name: Option<String>,
}

impl<T> Default for StageConfig<T> {
  fn default() -> Self {
    Self {
      error_strategy: ErrorStrategy::default(),
      name: None,
    }
  }
}

impl<T> StageConfig<T> {
  /// Sets the error handling strategy.
  pub fn with_error_strategy(mut self, strategy: ErrorStrategy<T>) -> Self {
    self.error_strategy = strategy;
    self
  }

  /// Sets the stage name.
  pub fn with_name(mut self, name: impl Into<String>) -> Self {
    self.name = Some(name.into());
    self
  }

  /// Returns the current error handling strategy.
  pub fn error_strategy(&self) -> ErrorStrategy<T> {
    self.error_strategy.clone()
  }

  /// Returns the current name, if set.
  pub fn name(&self) -> Option<String> {
    self.name.clone()
  }
}

/// Per-item transformation run by a stage worker.
///
/// Implementors provide [`transform`](Transformer::transform) and access to
/// their [`StageConfig`]; error handling and component information come with
/// default implementations driven by that config.
#[async_trait]
pub trait Transformer<T>: Send + 'static
where
  T: std::fmt::Debug + Clone + Send + Sync + 'static,
{
  /// Transforms one item.
  ///
  /// # Errors
  ///
  /// Any error is wrapped in a [`StreamError`] and handled according to the
  /// stage's [`ErrorStrategy`].
  async fn transform(&mut self, item: T) -> Result<T, BoxError>;

  /// Returns a reference to the transformer's configuration.
  fn config(&self) -> &StageConfig<T> {
    self.get_config_impl()
  }

  /// Returns a mutable reference to the transformer's configuration.
  fn config_mut(&mut self) -> &mut StageConfig<T> {
    self.get_config_mut_impl()
  }

  /// Sets the name for this transformer.
  #[must_use]
  fn with_name(mut self, name: impl Into<String>) -> Self
  where
    Self: Sized,
  {
    self.config_mut().name = Some(name.into());
    self
  }

  /// Sets the error handling strategy for this transformer.
  #[must_use]
  fn with_error_strategy(mut self, strategy: ErrorStrategy<T>) -> Self
  where
    Self: Sized,
  {
    self.config_mut().error_strategy = strategy;
    self
  }

  /// Determines the [`ErrorAction`] for a failure under the configured strategy.
  fn handle_error(&self, error: &StreamError<T>) -> ErrorAction {
    self.config().error_strategy.action_for(error)
  }

  /// Builds the context recorded alongside a failure.
  fn create_error_context(&self, item: Option<T>) -> ErrorContext<T> {
    let info = self.component_info();
    ErrorContext {
      timestamp: chrono::Utc::now(),
      item,
      component_name: info.name,
      component_type: info.type_name,
    }
  }

  /// Returns the stage name and transformer type for logs and errors.
  fn component_info(&self) -> ComponentInfo {
    ComponentInfo {
      name: self
        .config()
        .name()
        .unwrap_or_else(|| "transformer".to_string()),
      type_name: std::any::type_name::<Self>().to_string(),
    }
  }

  /// Returns the stored configuration.
  fn get_config_impl(&self) -> &StageConfig<T>;

  /// Returns the stored configuration mutably.
  fn get_config_mut_impl(&mut self) -> &mut StageConfig<T>;
}
