//! # Error Handling
//!
//! Two layers of errors exist in a relay pipeline:
//!
//! - **[`PipelineError`]**: structural misuse of the pipeline surface, reported
//!   synchronously to the caller that misbehaved (sending into a closed intake,
//!   adding a stage after start, asking for a handle twice, a worker panic).
//! - **[`StreamError`]**: a per-item failure raised by a stage's transformation.
//!   It never escapes the worker that produced it; instead it travels downstream
//!   through the same handoff queues as successful values, so the pipeline keeps
//!   draining and closing in order.
//!
//! Each stage decides what to do with its own failures through an
//! [`ErrorStrategy`], which maps every [`StreamError`] to an [`ErrorAction`].
//!
//! ## Example
//!
//! ```rust
//! use relay::error::{ErrorAction, ErrorStrategy};
//!
//! // Retry twice, then hand the error downstream
//! let strategy = ErrorStrategy::<i64>::Retry(2);
//!
//! // Decide per error
//! let custom = ErrorStrategy::<i64>::new_custom(|error| {
//!   if error.retries < 1 {
//!     ErrorAction::Retry
//!   } else {
//!     ErrorAction::Skip
//!   }
//! });
//! ```

use crate::pipeline::PipelineState;
use std::error::Error;
use std::fmt;
use std::sync::Arc;

/// Boxed error returned by a stage transformation.
pub type BoxError = Box<dyn Error + Send + Sync>;

/// Errors surfaced to callers of the pipeline API.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PipelineError {
  /// The intake was closed, or nothing downstream will ever read from it again.
  #[error("intake queue is closed")]
  ClosedQueue,
  /// An operation was attempted in a lifecycle state that does not allow it.
  #[error("cannot {operation} while pipeline is {state}")]
  LifecycleViolation {
    /// The rejected operation.
    operation: &'static str,
    /// The state the pipeline was in.
    state: PipelineState,
  },
  /// The intake or result handle has already been handed out.
  #[error("{0} handle already taken")]
  HandleTaken(&'static str),
  /// A worker task panicked before finishing.
  #[error("worker '{worker}' panicked: {reason}")]
  WorkerPanicked {
    /// Name the worker was registered under.
    worker: String,
    /// Panic message, when one could be recovered.
    reason: String,
  },
}

/// Action to take when a stage transformation fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorAction {
  /// Forward the error downstream, then stop the stage and close its output.
  ///
  /// Upstream workers observe the closed queue and wind down as well.
  Stop,
  /// Drop the failing item and continue with the next one.
  Skip,
  /// Run the transformation again on the same item.
  Retry,
  /// Forward the error downstream as an item and keep processing.
  Propagate,
}

// Type alias for the custom error handler function
type CustomErrorHandler<T> = Arc<dyn Fn(&StreamError<T>) -> ErrorAction + Send + Sync>;

/// Strategy a stage applies to its own transformation failures.
///
/// The default is [`ErrorStrategy::Propagate`]: failures become error items
/// that the result handle reports in input order.
pub enum ErrorStrategy<T> {
  /// Forward the error, then stop the stage.
  Stop,
  /// Drop failing items.
  Skip,
  /// Retry up to the given number of times, then propagate.
  Retry(usize),
  /// Forward every failure downstream.
  Propagate,
  /// User-defined decision per error.
  Custom(CustomErrorHandler<T>),
}

impl<T> Default for ErrorStrategy<T> {
  fn default() -> Self {
    ErrorStrategy::Propagate
  }
}

impl<T> Clone for ErrorStrategy<T> {
  fn clone(&self) -> Self {
    match self {
      ErrorStrategy::Stop => ErrorStrategy::Stop,
      ErrorStrategy::Skip => ErrorStrategy::Skip,
      ErrorStrategy::Retry(n) => ErrorStrategy::Retry(*n),
      ErrorStrategy::Propagate => ErrorStrategy::Propagate,
      ErrorStrategy::Custom(handler) => ErrorStrategy::Custom(handler.clone()),
    }
  }
}

impl<T> fmt::Debug for ErrorStrategy<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ErrorStrategy::Stop => write!(f, "ErrorStrategy::Stop"),
      ErrorStrategy::Skip => write!(f, "ErrorStrategy::Skip"),
      ErrorStrategy::Retry(n) => write!(f, "ErrorStrategy::Retry({})", n),
      ErrorStrategy::Propagate => write!(f, "ErrorStrategy::Propagate"),
      ErrorStrategy::Custom(_) => write!(f, "ErrorStrategy::Custom"),
    }
  }
}

impl<T> PartialEq for ErrorStrategy<T> {
  fn eq(&self, other: &Self) -> bool {
    match (self, other) {
      (ErrorStrategy::Stop, ErrorStrategy::Stop) => true,
      (ErrorStrategy::Skip, ErrorStrategy::Skip) => true,
      (ErrorStrategy::Retry(n1), ErrorStrategy::Retry(n2)) => n1 == n2,
      (ErrorStrategy::Propagate, ErrorStrategy::Propagate) => true,
      (ErrorStrategy::Custom(_), ErrorStrategy::Custom(_)) => true,
      _ => false,
    }
  }
}

impl<T> ErrorStrategy<T> {
  /// Creates a custom strategy from a handler function.
  pub fn new_custom<F>(f: F) -> Self
  where
    F: Fn(&StreamError<T>) -> ErrorAction + Send + Sync + 'static,
  {
    Self::Custom(Arc::new(f))
  }

  /// Resolves the action for `error` under this strategy.
  ///
  /// An exhausted `Retry` budget falls back to `Propagate`.
  pub fn action_for(&self, error: &StreamError<T>) -> ErrorAction {
    match self {
      ErrorStrategy::Stop => ErrorAction::Stop,
      ErrorStrategy::Skip => ErrorAction::Skip,
      ErrorStrategy::Retry(n) if error.retries < *n => ErrorAction::Retry,
      ErrorStrategy::Retry(_) => ErrorAction::Propagate,
      ErrorStrategy::Propagate => ErrorAction::Propagate,
      ErrorStrategy::Custom(handler) => handler(error),
    }
  }
}

/// A failure raised while a stage transformed one item.
///
/// # Fields
///
/// * `source` - The error returned by the transformation
/// * `context` - When it happened and which item was being processed
/// * `component` - The stage that raised it
/// * `retries` - How many retries had already been attempted
#[derive(Debug)]
pub struct StreamError<T> {
  /// The underlying transformation error.
  pub source: BoxError,
  /// Context about when and where the error occurred.
  pub context: ErrorContext<T>,
  /// Information about the stage that encountered the error.
  pub component: ComponentInfo,
  /// Number of times the transformation had been retried.
  pub retries: usize,
}

impl<T: Clone> Clone for StreamError<T> {
  fn clone(&self) -> Self {
    Self {
      source: Box::new(StringError(self.source.to_string())),
      context: self.context.clone(),
      component: self.component.clone(),
      retries: self.retries,
    }
  }
}

/// An error carrying only a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringError(pub String);

impl fmt::Display for StringError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

impl Error for StringError {}

impl<T> StreamError<T> {
  /// Creates a new `StreamError` with `retries` set to 0.
  pub fn new(source: BoxError, context: ErrorContext<T>, component: ComponentInfo) -> Self {
    Self {
      source,
      context,
      component,
      retries: 0,
    }
  }

  /// The item that failed, if it was captured.
  pub fn item(&self) -> Option<&T> {
    self.context.item.as_ref()
  }
}

impl<T> fmt::Display for StreamError<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "Error in {} ({}): {}",
      self.component.name, self.component.type_name, self.source
    )
  }
}

impl<T: fmt::Debug> Error for StreamError<T> {
  fn source(&self) -> Option<&(dyn Error + 'static)> {
    Some(self.source.as_ref())
  }
}

/// When and where a stage failure occurred.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorContext<T> {
  /// The timestamp when the error occurred.
  pub timestamp: chrono::DateTime<chrono::Utc>,
  /// The item being processed when the error occurred, if available.
  pub item: Option<T>,
  /// The name of the stage that encountered the error.
  pub component_name: String,
  /// The type of the transformer behind that stage.
  pub component_type: String,
}

/// Identifying information about a stage, for logs and error reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentInfo {
  /// The name of the component.
  pub name: String,
  /// The type name of the component.
  pub type_name: String,
}

impl ComponentInfo {
  /// Creates a new `ComponentInfo` with the given name and type name.
  pub fn new(name: String, type_name: String) -> Self {
    Self { name, type_name }
  }
}
