//! # Pipeline Stages
//!
//! A [`Stage`] turns one sequence into another: given the read end of its
//! input queue it allocates a fresh output queue, spawns one worker that
//! moves items from input to output through its [`Transformer`], and returns
//! the output read end immediately.
//!
//! ## Worker loop
//!
//! 1. Receive the next item (suspends until one is offered or the input closes).
//! 2. `Ok(value)`: transform it, applying the stage's error strategy on failure.
//!    `Err(error)` from upstream: forward it untouched.
//! 3. Hand the result downstream (suspends until the next reader takes it).
//! 4. Input closed and drained: close the output and exit.
//!
//! If the downstream reader disappears, the worker closes its own input so
//! the shutdown travels upstream as well, then exits.

use crate::error::{ErrorAction, StreamError};
use crate::handoff::{self, HandoffReceiver, HandoffSender};
use crate::tracker::CompletionTracker;
use crate::transformers::{MapTransformer, TryMapTransformer};
use crate::{Item, Transformer};
use tracing::{debug, error, trace, warn};

/// A named stage wrapping a boxed [`Transformer`].
pub struct Stage<T>
where
  T: std::fmt::Debug + Clone + Send + Sync + 'static,
{
  transformer: Box<dyn Transformer<T>>,
}

impl<T> Stage<T>
where
  T: std::fmt::Debug + Clone + Send + Sync + 'static,
{
  /// Wraps an existing transformer.
  pub fn new(transformer: impl Transformer<T>) -> Self {
    Self {
      transformer: Box::new(transformer),
    }
  }

  /// A stage applying a total function to every item.
  pub fn map<F>(name: impl Into<String>, f: F) -> Self
  where
    F: FnMut(T) -> T + Send + 'static,
  {
    Self::new(MapTransformer::new(f).with_name(name))
  }

  /// A stage applying a fallible function to every item.
  pub fn try_map<F, E>(name: impl Into<String>, f: F) -> Self
  where
    F: FnMut(T) -> Result<T, E> + Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::new(TryMapTransformer::new(f).with_name(name))
  }

  /// The stage name, as used in logs and error reports.
  pub fn name(&self) -> String {
    self.transformer.component_info().name
  }

  /// Starts the stage worker reading from `input`, registered on `tracker`.
  ///
  /// Returns the read end of the new output queue without waiting for the
  /// worker to produce anything.
  pub fn spawn(
    self,
    input: HandoffReceiver<Item<T>>,
    tracker: &CompletionTracker,
  ) -> HandoffReceiver<Item<T>> {
    let (output_tx, output_rx) = handoff::channel();
    let name = self.name();
    tracker.spawn(format!("stage:{}", name), run(self.transformer, input, output_tx));
    output_rx
  }
}

impl<T> std::fmt::Debug for Stage<T>
where
  T: std::fmt::Debug + Clone + Send + Sync + 'static,
{
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Stage")
      .field("component", &self.transformer.component_info())
      .finish()
  }
}

/// What the worker does with one processed item.
enum Outcome<T> {
  Forward(Item<T>),
  Skip,
  Halt(Item<T>),
}

async fn run<T>(
  mut transformer: Box<dyn Transformer<T>>,
  mut input: HandoffReceiver<Item<T>>,
  mut output: HandoffSender<Item<T>>,
) where
  T: std::fmt::Debug + Clone + Send + Sync + 'static,
{
  let stage = transformer.component_info().name;
  debug!(stage = %stage, "stage worker started");
  let mut forwarded = 0usize;

  loop {
    // `None` means the downstream reader is gone.
    let next = tokio::select! {
      biased;
      _ = output.closed() => None,
      item = input.recv() => Some(item),
    };

    let item = match next {
      None => {
        debug!(stage = %stage, "downstream closed, stopping stage");
        input.close();
        break;
      }
      Some(None) => {
        trace!(stage = %stage, "input drained");
        break;
      }
      Some(Some(item)) => item,
    };

    let outcome = match item {
      Ok(value) => apply(transformer.as_mut(), value).await,
      Err(upstream) => Outcome::Forward(Err(upstream)),
    };

    match outcome {
      Outcome::Forward(item) => {
        if output.send(item).await.is_err() {
          debug!(stage = %stage, "downstream closed, stopping stage");
          input.close();
          break;
        }
        forwarded += 1;
      }
      Outcome::Skip => {}
      Outcome::Halt(item) => {
        if output.send(item).await.is_ok() {
          forwarded += 1;
        }
        input.close();
        break;
      }
    }
  }

  output.close();
  debug!(stage = %stage, forwarded, "stage worker finished");
}

async fn apply<T>(transformer: &mut dyn Transformer<T>, value: T) -> Outcome<T>
where
  T: std::fmt::Debug + Clone + Send + Sync + 'static,
{
  let mut retries = 0;
  loop {
    let source = match transformer.transform(value.clone()).await {
      Ok(transformed) => return Outcome::Forward(Ok(transformed)),
      Err(source) => source,
    };

    let mut failure = StreamError::new(
      source,
      transformer.create_error_context(Some(value.clone())),
      transformer.component_info(),
    );
    failure.retries = retries;

    match transformer.handle_error(&failure) {
      ErrorAction::Retry => {
        warn!(stage = %failure.component.name, retries, error = %failure.source, "retrying item");
        retries += 1;
      }
      ErrorAction::Skip => {
        warn!(stage = %failure.component.name, error = %failure.source, "skipping item");
        return Outcome::Skip;
      }
      ErrorAction::Propagate => {
        debug!(stage = %failure.component.name, error = %failure.source, "forwarding error");
        return Outcome::Forward(Err(failure));
      }
      ErrorAction::Stop => {
        error!(stage = %failure.component.name, error = %failure.source, "stopping stage");
        return Outcome::Halt(Err(failure));
      }
    }
  }
}
