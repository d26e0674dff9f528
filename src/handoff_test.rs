//! # Handoff Queue Test Suite
//!
//! Covers FIFO delivery, rendezvous blocking, closing from either end and the
//! `Stream` implementation of the read end.

use crate::handoff::{self, SendError};
use futures::StreamExt;
use std::time::Duration;
use tokio::time::{sleep, timeout};

#[tokio::test]
async fn test_values_arrive_in_fifo_order() {
  let (mut tx, mut rx) = handoff::channel::<i32>();

  let writer = tokio::spawn(async move {
    for value in 0..10 {
      tx.send(value).await.unwrap();
    }
  });

  let mut received = Vec::new();
  while let Some(value) = rx.recv().await {
    received.push(value);
  }

  writer.await.unwrap();
  assert_eq!(received, (0..10).collect::<Vec<_>>());
  assert!(rx.is_closed());
}

#[tokio::test]
async fn test_send_waits_for_reader() {
  let (mut tx, mut rx) = handoff::channel::<&'static str>();

  let writer = tokio::spawn(async move { tx.send("hello").await.is_ok() });

  sleep(Duration::from_millis(50)).await;
  assert!(!writer.is_finished(), "send completed without a reader");

  assert_eq!(rx.recv().await, Some("hello"));
  assert!(writer.await.unwrap());
}

#[tokio::test]
async fn test_closing_sender_ends_sequence() {
  let (tx, mut rx) = handoff::channel::<u8>();
  assert!(!rx.is_closed());

  tx.close();

  assert_eq!(rx.recv().await, None);
  assert!(rx.is_closed());
  // End of sequence is sticky.
  assert_eq!(rx.recv().await, None);
}

#[tokio::test]
async fn test_send_to_dropped_receiver_returns_value() {
  let (mut tx, rx) = handoff::channel::<String>();
  drop(rx);

  assert!(tx.is_closed());
  let err: SendError<String> = tx.send("lost".to_string()).await.unwrap_err();
  assert_eq!(err.into_inner(), Some("lost".to_string()));
}

#[tokio::test]
async fn test_receiver_close_releases_waiting_writer() {
  let (mut tx, mut rx) = handoff::channel::<i32>();

  let writer = tokio::spawn(async move { tx.send(1).await });
  sleep(Duration::from_millis(20)).await;

  rx.close();
  assert!(rx.is_closed());

  let result = timeout(Duration::from_secs(1), writer)
    .await
    .expect("writer stayed blocked after close")
    .unwrap();
  assert!(result.is_err());
}

#[tokio::test]
async fn test_sender_observes_reader_going_away() {
  let (tx, rx) = handoff::channel::<i32>();

  let watcher = tokio::spawn(async move {
    tx.closed().await;
    tx.is_closed()
  });

  drop(rx);
  let closed = timeout(Duration::from_secs(1), watcher)
    .await
    .expect("closed() never completed")
    .unwrap();
  assert!(closed);
}

#[tokio::test]
async fn test_receiver_is_a_stream() {
  let (mut tx, rx) = handoff::channel::<i32>();

  tokio::spawn(async move {
    for value in [3, 1, 2] {
      if tx.send(value).await.is_err() {
        break;
      }
    }
  });

  let collected: Vec<i32> = rx.collect().await;
  assert_eq!(collected, vec![3, 1, 2]);
}

#[test]
fn test_send_error_display() {
  let err = SendError { value: Some(5) };
  assert_eq!(err.to_string(), "handoff queue closed by reader");
  assert!(format!("{:?}", err).contains("value_returned: true"));
}
