//! Completion tracking for pipeline workers.
//!
//! [`CompletionTracker`] is a counting barrier: every worker is registered when
//! it is spawned and arrives when it exits, whether it returned or panicked.
//! [`CompletionTracker::wait`] releases once the tracker is sealed and the
//! count reaches zero.
//!
//! Sealing only marks the end of registrations made by the orchestrator.
//! Workers that are still running may keep registering children (the pipeline
//! coordinator spawns every stage worker this way), and since a registering
//! worker is itself outstanding the count cannot reach zero early.

use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use tokio_util::task::TaskTracker;
use tracing::{Instrument, error, trace, trace_span};

/// Report of a worker that panicked instead of finishing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FailureReport {
  /// Worker that failed.
  pub worker: String,
  /// Panic message, if the payload carried one.
  pub error: String,
}

/// Counting barrier over spawned worker tasks.
#[derive(Clone, Debug, Default)]
pub struct CompletionTracker {
  tasks: TaskTracker,
  failures: Arc<Mutex<Vec<FailureReport>>>,
}

impl CompletionTracker {
  /// Creates an empty, unsealed tracker.
  pub fn new() -> Self {
    Self::default()
  }

  /// Registers a worker and spawns it on the current tokio runtime.
  ///
  /// The worker arrives at the barrier when `future` completes or panics.
  pub fn spawn<F>(&self, name: impl Into<String>, future: F)
  where
    F: Future<Output = ()> + Send + 'static,
  {
    let name = name.into();
    let failures = Arc::clone(&self.failures);
    let span = trace_span!("worker", name = %name);
    trace!(worker = %name, outstanding = self.tasks.len() + 1, "registering worker");

    self.tasks.spawn(
      async move {
        if let Err(payload) = AssertUnwindSafe(future).catch_unwind().await {
          let message = panic_message(payload.as_ref());
          error!(worker = %name, error = %message, "worker panicked");
          let report = FailureReport {
            worker: name,
            error: message,
          };
          match failures.lock() {
            Ok(mut reports) => reports.push(report),
            Err(poisoned) => poisoned.into_inner().push(report),
          }
        }
      }
      .instrument(span),
    );
  }

  /// Marks that the orchestrator will register no further workers.
  pub fn seal(&self) {
    self.tasks.close();
  }

  /// Returns `true` once [`seal`](Self::seal) has been called.
  pub fn is_sealed(&self) -> bool {
    self.tasks.is_closed()
  }

  /// Number of registered workers that have not exited yet.
  pub fn outstanding(&self) -> usize {
    self.tasks.len()
  }

  /// Waits until the tracker is sealed and every worker has exited.
  ///
  /// Returns the reports of workers that panicked, in the order they failed.
  pub async fn wait(&self) -> Vec<FailureReport> {
    self.tasks.wait().await;
    match self.failures.lock() {
      Ok(reports) => reports.clone(),
      Err(poisoned) => poisoned.into_inner().clone(),
    }
  }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
  if let Some(message) = payload.downcast_ref::<&str>() {
    (*message).to_string()
  } else if let Some(message) = payload.downcast_ref::<String>() {
    message.clone()
  } else {
    "unknown panic payload".to_string()
  }
}
