//! # Relay
//!
//! Linear concurrent pipelines in pure Rust.
//!
//! A relay pipeline moves values from an intake through an ordered chain of
//! stages to a result queue. Every stage runs as its own tokio task, and every
//! hop between two workers is a zero-capacity handoff queue: a writer is
//! suspended until the next worker takes its value, so values keep their
//! input order end to end and nothing is buffered between stages.
//!
//! ## Key Features
//!
//! - **Rendezvous Queues**: [`handoff`] queues with one writer and one reader per hop
//! - **Stage Composition**: [`Pipeline::add_stage`] chains [`Stage`]s left to right
//! - **Explicit Lifecycle**: `Assembling → Running → Draining → Closed`, misuse is a typed error
//! - **Fallible Stages**: failures travel downstream as [`StreamError`](error::StreamError)
//!   items, handled per stage by an [`ErrorStrategy`](error::ErrorStrategy)
//! - **Completion Barrier**: [`Pipeline::wait_for_completion`] returns once every worker exited
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use relay::{Pipeline, Stage};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut pipeline = Pipeline::<i64>::new();
//! pipeline.add_stage(Stage::map("increment", |x: i64| x + 1))?;
//! pipeline.add_stage(Stage::map("double", |x: i64| x * 2))?;
//!
//! let mut intake = pipeline.intake()?;
//! let mut results = pipeline.results()?;
//! pipeline.start()?;
//!
//! tokio::spawn(async move {
//!   while let Some(Ok(value)) = results.recv().await {
//!     println!("{value}");
//!   }
//! });
//!
//! for value in [1, 2, 3] {
//!   intake.send(value).await?;
//! }
//! intake.close();
//! pipeline.wait_for_completion().await?;
//! # Ok(())
//! # }
//! ```

// Documentation enforcement - treat missing docs as errors
#![deny(missing_docs)]

/// Pipeline and stage error types and per-stage error strategies.
pub mod error;
/// Zero-capacity single-producer/single-consumer handoff queues.
pub mod handoff;
/// Pipeline coordinator, lifecycle states and intake/result handles.
pub mod pipeline;
/// Stage workers wrapping a transformer.
pub mod stage;
/// Completion barrier over spawned workers.
pub mod tracker;
/// Per-item transformation trait and stage configuration.
pub mod transformer;
/// Built-in transformers.
pub mod transformers;

pub use error::{ErrorAction, ErrorStrategy, PipelineError, StreamError};
pub use pipeline::{Intake, Pipeline, PipelineConfig, PipelineState, Results};
pub use stage::Stage;
pub use tracker::CompletionTracker;
pub use transformer::{StageConfig, Transformer};

/// An item as it travels between stages: a value, or a failure raised upstream.
pub type Item<T> = Result<T, StreamError<T>>;

#[cfg(test)]
mod handoff_test;
