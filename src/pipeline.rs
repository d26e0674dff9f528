//! # Pipeline Coordinator
//!
//! [`Pipeline`] owns an ordered list of [`Stage`]s and runs them as a linear
//! chain of concurrent workers:
//!
//! ```text
//! Intake -> stage 1 -> stage 2 -> ... -> stage n -> Results
//! ```
//!
//! Every arrow is a zero-capacity handoff queue with exactly one writer and
//! one reader, so values come out in the order they went in.
//!
//! ## Lifecycle
//!
//! ```text
//! Assembling --start()--> Running --intake closed--> Draining --results closed--> Closed
//! ```
//!
//! - `Assembling`: stages may be added.
//! - `Running`: one worker per stage plus the coordinator's drain loop; the
//!   intake accepts values.
//! - `Draining`: the intake was closed; each stage finishes its in-flight work
//!   and closes its output in turn. An intake closed before `start()` moves
//!   the pipeline straight from `Assembling` to `Running` and on to `Draining`.
//! - `Closed`: the result queue closed. Terminal; a pipeline is never reused.
//!
//! Closing the intake is the only shutdown trigger. Dropping the result handle
//! also unwinds the chain: every stage sees its reader disappear, closes its
//! input, and the intake starts failing with [`PipelineError::ClosedQueue`].
//!
//! ## Example
//!
//! ```rust
//! use relay::{Pipeline, Stage};
//!
//! # async fn example() -> Result<(), relay::PipelineError> {
//! let mut pipeline = Pipeline::<i64>::new();
//! pipeline.add_stage(Stage::map("increment", |x: i64| x + 1))?;
//! pipeline.add_stage(Stage::map("double", |x: i64| x * 2))?;
//!
//! let mut intake = pipeline.intake()?;
//! let results = pipeline.results()?;
//! pipeline.start()?;
//!
//! let sink = tokio::spawn(results.collect_values());
//! for value in [1, 2, 3] {
//!   intake.send(value).await?;
//! }
//! intake.close();
//!
//! let (values, errors) = sink.await.expect("sink task");
//! assert_eq!(values, vec![4, 6, 8]);
//! assert!(errors.is_empty());
//! pipeline.wait_for_completion().await?;
//! # Ok(())
//! # }
//! ```

use crate::error::{PipelineError, StreamError};
use crate::handoff::{self, HandoffReceiver, HandoffSender};
use crate::stage::Stage;
use crate::tracker::CompletionTracker;
use crate::Item;
use futures::{Stream, StreamExt};
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};
use tokio::sync::watch;
use tracing::{Instrument, debug, info, info_span, trace, warn};

/// Lifecycle state of a [`Pipeline`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineState {
  /// Stages may be added; nothing is running.
  Assembling,
  /// Workers are running and the intake is open.
  Running,
  /// The intake was closed; workers are finishing.
  Draining,
  /// The result queue closed. Terminal.
  Closed,
}

impl fmt::Display for PipelineState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      PipelineState::Assembling => "assembling",
      PipelineState::Running => "running",
      PipelineState::Draining => "draining",
      PipelineState::Closed => "closed",
    };
    f.write_str(name)
  }
}

/// Configuration for a pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
  /// Name used in tracing spans and worker names.
  pub name: String,
}

impl Default for PipelineConfig {
  fn default() -> Self {
    Self {
      name: "pipeline".to_string(),
    }
  }
}

impl PipelineConfig {
  /// Sets the pipeline name.
  pub fn with_name(mut self, name: impl Into<String>) -> Self {
    self.name = name.into();
    self
  }
}

type StateCell = Arc<watch::Sender<PipelineState>>;

/// Moves the pipeline from `from` to `to`, returning whether it did.
fn transition(state: &StateCell, from: PipelineState, to: PipelineState) -> bool {
  state.send_if_modified(|current| {
    if *current == from {
      *current = to;
      true
    } else {
      false
    }
  })
}

/// Coordinator for a linear chain of stages.
pub struct Pipeline<T>
where
  T: fmt::Debug + Clone + Send + Sync + 'static,
{
  config: PipelineConfig,
  stages: Vec<Stage<T>>,
  intake_rx: Option<HandoffReceiver<Item<T>>>,
  result_tx: Option<HandoffSender<Item<T>>>,
  intake: Option<Intake<T>>,
  results: Option<Results<T>>,
  state: StateCell,
  intake_closed: Arc<AtomicBool>,
  tracker: CompletionTracker,
}

impl<T> Default for Pipeline<T>
where
  T: fmt::Debug + Clone + Send + Sync + 'static,
{
  fn default() -> Self {
    Self::new()
  }
}

impl<T> Pipeline<T>
where
  T: fmt::Debug + Clone + Send + Sync + 'static,
{
  /// Creates an empty pipeline with the default configuration.
  pub fn new() -> Self {
    Self::with_config(PipelineConfig::default())
  }

  /// Creates an empty pipeline with the given configuration.
  pub fn with_config(config: PipelineConfig) -> Self {
    let (state, _) = watch::channel(PipelineState::Assembling);
    let state = Arc::new(state);
    let (intake_tx, intake_rx) = handoff::channel();
    let (result_tx, result_rx) = handoff::channel();
    let intake_closed = Arc::new(AtomicBool::new(false));

    Self {
      config,
      stages: Vec::new(),
      intake_rx: Some(intake_rx),
      result_tx: Some(result_tx),
      intake: Some(Intake {
        tx: Some(intake_tx),
        state: Arc::clone(&state),
        closed: Arc::clone(&intake_closed),
      }),
      results: Some(Results { rx: result_rx }),
      state,
      intake_closed,
      tracker: CompletionTracker::new(),
    }
  }

  /// Returns the pipeline configuration.
  pub fn config(&self) -> &PipelineConfig {
    &self.config
  }

  /// Returns the current lifecycle state.
  pub fn state(&self) -> PipelineState {
    *self.state.borrow()
  }

  /// Subscribes to lifecycle state changes.
  pub fn watch_state(&self) -> watch::Receiver<PipelineState> {
    self.state.subscribe()
  }

  /// Names of the stages in the order they will run.
  pub fn stage_names(&self) -> Vec<String> {
    self.stages.iter().map(Stage::name).collect()
  }

  /// Appends a stage to the end of the chain.
  ///
  /// # Errors
  ///
  /// [`PipelineError::LifecycleViolation`] once the pipeline has started.
  pub fn add_stage(&mut self, stage: Stage<T>) -> Result<(), PipelineError> {
    self.expect_assembling("add a stage")?;
    debug!(pipeline = %self.config.name, stage = %stage.name(), position = self.stages.len(), "stage added");
    self.stages.push(stage);
    Ok(())
  }

  /// Hands out the write-only intake handle.
  ///
  /// # Errors
  ///
  /// [`PipelineError::HandleTaken`] if it was already handed out.
  pub fn intake(&mut self) -> Result<Intake<T>, PipelineError> {
    self.intake.take().ok_or(PipelineError::HandleTaken("intake"))
  }

  /// Hands out the read-only result handle.
  ///
  /// # Errors
  ///
  /// [`PipelineError::HandleTaken`] if it was already handed out.
  pub fn results(&mut self) -> Result<Results<T>, PipelineError> {
    self.results.take().ok_or(PipelineError::HandleTaken("results"))
  }

  /// Starts every worker in the background and returns immediately.
  ///
  /// The coordinator worker wires the stages left to right, starting from
  /// the intake queue, then drains the last stage into the result queue.
  ///
  /// # Errors
  ///
  /// [`PipelineError::LifecycleViolation`] if the pipeline was already started.
  ///
  /// # Panics
  ///
  /// Panics if called outside of a tokio runtime, like [`tokio::spawn`].
  pub fn start(&mut self) -> Result<(), PipelineError> {
    self.expect_assembling("start")?;
    let (Some(intake_rx), Some(result_tx)) = (self.intake_rx.take(), self.result_tx.take()) else {
      return Err(PipelineError::LifecycleViolation {
        operation: "start",
        state: self.state(),
      });
    };

    transition(&self.state, PipelineState::Assembling, PipelineState::Running);
    // The intake may have been closed while the pipeline was still assembling.
    if self.intake_closed.load(Ordering::SeqCst) {
      transition(&self.state, PipelineState::Running, PipelineState::Draining);
    }
    let stages = std::mem::take(&mut self.stages);
    info!(pipeline = %self.config.name, stages = stages.len(), "starting pipeline");

    let span = info_span!("pipeline", name = %self.config.name);
    self.tracker.spawn(
      format!("{}:coordinator", self.config.name),
      coordinate(
        stages,
        intake_rx,
        result_tx,
        self.tracker.clone(),
        Arc::clone(&self.state),
      )
      .instrument(span),
    );
    self.tracker.seal();
    Ok(())
  }

  /// Waits until the coordinator and every stage worker have exited.
  ///
  /// # Errors
  ///
  /// - [`PipelineError::LifecycleViolation`] if the pipeline was never started.
  /// - [`PipelineError::WorkerPanicked`] for the first worker that panicked.
  pub async fn wait_for_completion(&self) -> Result<(), PipelineError> {
    if self.state() == PipelineState::Assembling {
      return Err(PipelineError::LifecycleViolation {
        operation: "wait for completion",
        state: PipelineState::Assembling,
      });
    }

    let failures = self.tracker.wait().await;
    // A panicked coordinator never reaches its own transition.
    self.state.send_replace(PipelineState::Closed);
    match failures.into_iter().next() {
      Some(report) => Err(PipelineError::WorkerPanicked {
        worker: report.worker,
        reason: report.error,
      }),
      None => {
        debug!(pipeline = %self.config.name, "all workers finished");
        Ok(())
      }
    }
  }

  fn expect_assembling(&self, operation: &'static str) -> Result<(), PipelineError> {
    match self.state() {
      PipelineState::Assembling => Ok(()),
      state => Err(PipelineError::LifecycleViolation { operation, state }),
    }
  }
}

impl<T> fmt::Debug for Pipeline<T>
where
  T: fmt::Debug + Clone + Send + Sync + 'static,
{
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Pipeline")
      .field("config", &self.config)
      .field("state", &self.state())
      .field("stages", &self.stage_names())
      .finish()
  }
}

async fn coordinate<T>(
  stages: Vec<Stage<T>>,
  intake_rx: HandoffReceiver<Item<T>>,
  mut result_tx: HandoffSender<Item<T>>,
  tracker: CompletionTracker,
  state: StateCell,
) where
  T: fmt::Debug + Clone + Send + Sync + 'static,
{
  let mut tail = stages
    .into_iter()
    .fold(intake_rx, |input, stage| stage.spawn(input, &tracker));
  trace!(workers = tracker.outstanding(), "stages wired");

  let mut delivered = 0usize;
  loop {
    // `None` means the result reader is gone.
    let next = tokio::select! {
      biased;
      _ = result_tx.closed() => None,
      item = tail.recv() => Some(item),
    };

    let item = match next {
      None => {
        warn!(delivered, "result handle dropped, shutting pipeline down");
        tail.close();
        break;
      }
      Some(None) => break,
      Some(Some(item)) => item,
    };

    if result_tx.send(item).await.is_err() {
      warn!(delivered, "result handle dropped, shutting pipeline down");
      tail.close();
      break;
    }
    delivered += 1;
  }

  result_tx.close();
  state.send_replace(PipelineState::Closed);
  info!(delivered, "pipeline closed");
}

/// Write-only entry point of a pipeline.
///
/// Dropping the intake closes it.
pub struct Intake<T> {
  tx: Option<HandoffSender<Item<T>>>,
  state: StateCell,
  closed: Arc<AtomicBool>,
}

impl<T> Intake<T> {
  /// Injects `value` at the head of the pipeline.
  ///
  /// Suspends until the first stage (or the result reader, for an empty
  /// pipeline) has taken the value. Values sent before
  /// [`Pipeline::start`] wait for the pipeline to start.
  ///
  /// # Errors
  ///
  /// [`PipelineError::ClosedQueue`] if the intake was closed, or if the
  /// pipeline has shut down and nothing will read the value.
  pub async fn send(&mut self, value: T) -> Result<(), PipelineError> {
    let tx = self.tx.as_mut().ok_or(PipelineError::ClosedQueue)?;
    tx.send(Ok(value)).await.map_err(|_| PipelineError::ClosedQueue)
  }

  /// Signals that no more values will arrive and starts draining.
  ///
  /// Closing twice is a no-op.
  pub fn close(&mut self) {
    if let Some(tx) = self.tx.take() {
      tx.close();
      self.closed.store(true, Ordering::SeqCst);
      if transition(&self.state, PipelineState::Running, PipelineState::Draining) {
        debug!("intake closed, draining");
      }
    }
  }

  /// Returns `true` once [`close`](Self::close) was called.
  pub fn is_closed(&self) -> bool {
    self.tx.is_none()
  }
}

impl<T> Drop for Intake<T> {
  fn drop(&mut self) {
    self.close();
  }
}

impl<T> fmt::Debug for Intake<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Intake")
      .field("closed", &self.is_closed())
      .finish()
  }
}

/// Read-only exit of a pipeline.
///
/// Yields every item in input order, then ends once the last stage has
/// closed. Items are `Err` when a stage propagated a failure.
pub struct Results<T> {
  rx: HandoffReceiver<Item<T>>,
}

impl<T> Results<T> {
  /// Receives the next result, or `None` once the pipeline has finished.
  pub async fn recv(&mut self) -> Option<Item<T>> {
    self.rx.recv().await
  }

  /// Returns `true` once the end of the results was observed.
  pub fn is_closed(&self) -> bool {
    self.rx.is_closed()
  }

  /// Drains every result, splitting values from stage failures.
  pub async fn collect_values(self) -> (Vec<T>, Vec<StreamError<T>>) {
    let mut values = Vec::new();
    let mut errors = Vec::new();
    let mut stream = self;
    while let Some(item) = stream.next().await {
      match item {
        Ok(value) => values.push(value),
        Err(error) => errors.push(error),
      }
    }
    (values, errors)
  }
}

impl<T> Stream for Results<T> {
  type Item = Item<T>;

  fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
    Pin::new(&mut self.get_mut().rx).poll_next(cx)
  }
}

impl<T> fmt::Debug for Results<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Results")
      .field("closed", &self.is_closed())
      .finish()
  }
}
