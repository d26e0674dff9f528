//! # Handoff Queues
//!
//! A handoff queue is a zero-capacity, single-producer/single-consumer channel
//! with rendezvous semantics: [`HandoffSender::send`] does not complete until
//! the reader has taken that exact value. Every hop in a pipeline is one of
//! these queues.
//!
//! Ownership is enforced by the types rather than by convention:
//!
//! - [`HandoffSender`] is the only write end and is not `Clone`. Dropping it
//!   (or calling [`HandoffSender::close`]) closes the queue for good.
//! - [`HandoffReceiver`] is the only read end and is not `Clone`. It yields
//!   values in FIFO order, then `None` once the writer is gone and nothing is
//!   pending. It also implements [`futures::Stream`].
//!
//! ## Architecture
//!
//! The queue is a one-slot `tokio::sync::mpsc` channel carrying the value
//! together with a `oneshot` acknowledgement. The writer parks on the
//! acknowledgement, which the reader fires when it dequeues the value. With a
//! single writer that always waits for its acknowledgement, the slot holds at
//! most one in-flight value.
//!
//! ## Example
//!
//! ```rust
//! use relay::handoff;
//!
//! # async fn example() {
//! let (mut tx, mut rx) = handoff::channel::<i64>();
//!
//! let writer = tokio::spawn(async move {
//!   tx.send(7).await.ok();
//!   tx.close();
//! });
//!
//! assert_eq!(rx.recv().await, Some(7));
//! assert_eq!(rx.recv().await, None);
//! writer.await.ok();
//! # }
//! ```

use futures::Stream;
use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::{mpsc, oneshot};
use tracing::trace;

type Envelope<T> = (T, oneshot::Sender<()>);

/// Opens a new handoff queue and returns its two ends.
pub fn channel<T>() -> (HandoffSender<T>, HandoffReceiver<T>) {
  let (tx, rx) = mpsc::channel(1);
  (
    HandoffSender { tx },
    HandoffReceiver {
      rx,
      finished: false,
    },
  )
}

/// Error returned by [`HandoffSender::send`] when the read end is gone.
///
/// The value is returned when it was never handed over. It is `None` when the
/// reader went away after the value entered the queue but before taking it.
pub struct SendError<T> {
  pub(crate) value: Option<T>,
}

impl<T> SendError<T> {
  /// Recovers the value that could not be delivered, if it is still owned.
  pub fn into_inner(self) -> Option<T> {
    self.value
  }
}

impl<T> fmt::Debug for SendError<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("SendError")
      .field("value_returned", &self.value.is_some())
      .finish()
  }
}

impl<T> fmt::Display for SendError<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "handoff queue closed by reader")
  }
}

impl<T> std::error::Error for SendError<T> {}

/// The write end of a handoff queue.
pub struct HandoffSender<T> {
  tx: mpsc::Sender<Envelope<T>>,
}

impl<T> HandoffSender<T> {
  /// Hands `value` to the reader, suspending until the reader has taken it.
  ///
  /// # Errors
  ///
  /// Returns [`SendError`] if the reader is closed or dropped before taking
  /// the value.
  ///
  /// # Cancel safety
  ///
  /// If this future is dropped after the value entered the queue, the reader
  /// still receives it.
  pub async fn send(&mut self, value: T) -> Result<(), SendError<T>> {
    let (ack_tx, ack_rx) = oneshot::channel();
    if let Err(mpsc::error::SendError((value, _))) = self.tx.send((value, ack_tx)).await {
      return Err(SendError { value: Some(value) });
    }
    ack_rx.await.map_err(|_| SendError { value: None })
  }

  /// Closes the queue. The reader drains what is pending, then sees the end.
  pub fn close(self) {
    trace!("HandoffSender::close()");
  }

  /// Returns `true` once the read end has been closed or dropped.
  pub fn is_closed(&self) -> bool {
    self.tx.is_closed()
  }

  /// Completes once the read end has been closed or dropped.
  pub async fn closed(&self) {
    self.tx.closed().await
  }
}

impl<T> fmt::Debug for HandoffSender<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("HandoffSender")
      .field("closed", &self.is_closed())
      .finish()
  }
}

/// The read end of a handoff queue.
pub struct HandoffReceiver<T> {
  rx: mpsc::Receiver<Envelope<T>>,
  finished: bool,
}

impl<T> HandoffReceiver<T> {
  /// Receives the next value, suspending until one is offered.
  ///
  /// Returns `None` once the writer has closed the queue and everything
  /// offered before has been received.
  pub async fn recv(&mut self) -> Option<T> {
    let envelope = self.rx.recv().await;
    self.accept(envelope)
  }

  /// Refuses any further values.
  ///
  /// A writer suspended in [`HandoffSender::send`] is released with a
  /// [`SendError`]; the value it was offering is dropped.
  pub fn close(&mut self) {
    trace!("HandoffReceiver::close()");
    self.rx.close();
    // Dropping a pending envelope drops its acknowledgement, which releases the writer.
    while self.rx.try_recv().is_ok() {}
    self.finished = true;
  }

  /// Returns `true` once end-of-sequence was observed or [`close`](Self::close) was called.
  pub fn is_closed(&self) -> bool {
    self.finished
  }

  fn accept(&mut self, envelope: Option<Envelope<T>>) -> Option<T> {
    match envelope {
      Some((value, ack)) => {
        // The writer may have given up waiting; the value is still ours.
        let _ = ack.send(());
        Some(value)
      }
      None => {
        self.finished = true;
        None
      }
    }
  }
}

impl<T> Unpin for HandoffReceiver<T> {}

impl<T> Stream for HandoffReceiver<T> {
  type Item = T;

  fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
    let this = self.get_mut();
    match this.rx.poll_recv(cx) {
      Poll::Ready(envelope) => Poll::Ready(this.accept(envelope)),
      Poll::Pending => Poll::Pending,
    }
  }
}

impl<T> fmt::Debug for HandoffReceiver<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("HandoffReceiver")
      .field("finished", &self.finished)
      .finish()
  }
}
