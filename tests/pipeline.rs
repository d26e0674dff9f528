use relay::error::{ErrorStrategy, StringError};
use relay::transformers::TryMapTransformer;
use relay::{Pipeline, PipelineError, PipelineState, Stage, Transformer};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::timeout;

async fn within<F: Future>(future: F) -> F::Output {
  timeout(Duration::from_secs(5), future)
    .await
    .expect("pipeline stalled")
}

/// Sends `inputs` through `stages`, returning the successful results in order.
async fn run(stages: Vec<Stage<i64>>, inputs: Vec<i64>) -> Vec<i64> {
  let mut pipeline = Pipeline::new();
  for stage in stages {
    pipeline.add_stage(stage).unwrap();
  }
  let mut intake = pipeline.intake().unwrap();
  let results = pipeline.results().unwrap();
  pipeline.start().unwrap();

  let sink = tokio::spawn(results.collect_values());
  for value in inputs {
    within(intake.send(value)).await.unwrap();
  }
  intake.close();

  let (values, errors) = within(sink).await.unwrap();
  assert!(errors.is_empty());
  within(pipeline.wait_for_completion()).await.unwrap();
  assert_eq!(pipeline.state(), PipelineState::Closed);
  values
}

fn increment() -> Stage<i64> {
  Stage::map("increment", |x: i64| x + 1)
}

fn double() -> Stage<i64> {
  Stage::map("double", |x: i64| x * 2)
}

#[tokio::test]
async fn test_increment_then_double() {
  let values = run(vec![increment(), double()], vec![1, 2, 3]).await;
  assert_eq!(values, vec![4, 6, 8]);
}

#[tokio::test]
async fn test_stage_order_matters() {
  let values = run(vec![double(), increment()], vec![1, 2, 3]).await;
  assert_eq!(values, vec![3, 5, 7]);
}

#[tokio::test]
async fn test_empty_pipeline_copies_input() {
  let inputs = vec![5, -3, 0, 5, 12];
  let values = run(Vec::new(), inputs.clone()).await;
  assert_eq!(values, inputs);
}

#[tokio::test]
async fn test_empty_input_completes_promptly() {
  for stage_count in 0..5 {
    let stages = (0..stage_count).map(|_| increment()).collect();
    let values = run(stages, Vec::new()).await;
    assert!(values.is_empty());
  }
}

#[tokio::test]
async fn test_pipeline_is_function_composition() {
  let inputs: Vec<i64> = (-50..50).collect();
  let stages = vec![
    increment(),
    double(),
    Stage::map("square", |x: i64| x * x),
    Stage::map("minus_seven", |x: i64| x - 7),
  ];

  let values = run(stages, inputs.clone()).await;

  let expected: Vec<i64> = inputs
    .iter()
    .map(|x| {
      let y = (x + 1) * 2;
      y * y - 7
    })
    .collect();
  assert_eq!(values, expected);
}

#[tokio::test]
async fn test_termination_for_any_stage_count() {
  for stage_count in 0..6 {
    let stages = (0..stage_count).map(|_| increment()).collect();
    let values = run(stages, (0..100).collect()).await;

    assert_eq!(values.len(), 100);
    assert_eq!(values, (0..100).map(|x| x + stage_count).collect::<Vec<i64>>());
  }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_order_preserved_on_multi_thread_runtime() {
  let stages = (0..8).map(|_| increment()).collect();
  let values = run(stages, (0..1_000).collect()).await;
  assert_eq!(values, (8..1_008).collect::<Vec<i64>>());
}

#[tokio::test]
async fn test_wait_returns_after_every_stage_finished() {
  let processed = Arc::new(AtomicUsize::new(0));
  let counter = Arc::clone(&processed);

  let mut pipeline = Pipeline::new();
  pipeline.add_stage(increment()).unwrap();
  pipeline
    .add_stage(Stage::map("count", move |x: i64| {
      counter.fetch_add(1, Ordering::SeqCst);
      x
    }))
    .unwrap();
  let mut intake = pipeline.intake().unwrap();
  let mut results = pipeline.results().unwrap();
  pipeline.start().unwrap();

  let received = Arc::new(AtomicUsize::new(0));
  let sink_received = Arc::clone(&received);
  let sink = tokio::spawn(async move {
    while let Some(item) = results.recv().await {
      assert!(item.is_ok());
      tokio::time::sleep(Duration::from_millis(5)).await;
      sink_received.fetch_add(1, Ordering::SeqCst);
    }
  });

  for value in 0..10 {
    within(intake.send(value)).await.unwrap();
  }
  intake.close();

  within(pipeline.wait_for_completion()).await.unwrap();
  assert_eq!(processed.load(Ordering::SeqCst), 10);
  assert_eq!(pipeline.state(), PipelineState::Closed);

  within(sink).await.unwrap();
  assert_eq!(received.load(Ordering::SeqCst), 10);
}

#[tokio::test]
async fn test_failures_travel_in_order() {
  let mut pipeline = Pipeline::new();
  pipeline
    .add_stage(Stage::try_map("reject_odd", |x: i64| {
      if x % 2 == 0 {
        Ok(x)
      } else {
        Err(StringError(format!("odd value {}", x)))
      }
    }))
    .unwrap();
  pipeline.add_stage(double()).unwrap();
  let mut intake = pipeline.intake().unwrap();
  let mut results = pipeline.results().unwrap();
  pipeline.start().unwrap();

  let sink = tokio::spawn(async move {
    let mut seen = Vec::new();
    while let Some(item) = results.recv().await {
      seen.push(item.map_err(|error| error.to_string()));
    }
    seen
  });

  for value in 1..=4 {
    within(intake.send(value)).await.unwrap();
  }
  intake.close();

  let seen = within(sink).await.unwrap();
  assert_eq!(seen.len(), 4);
  assert!(seen[0].as_ref().unwrap_err().ends_with("odd value 1"));
  assert_eq!(seen[1], Ok(4));
  assert!(seen[2].as_ref().unwrap_err().ends_with("odd value 3"));
  assert_eq!(seen[3], Ok(8));
  within(pipeline.wait_for_completion()).await.unwrap();
}

#[tokio::test]
async fn test_stop_strategy_shuts_pipeline_down() {
  let strict = TryMapTransformer::new(|x: i64| {
    if x == 3 {
      Err(StringError("three is not allowed".to_string()))
    } else {
      Ok(x)
    }
  })
  .with_name("strict")
  .with_error_strategy(ErrorStrategy::Stop);

  let mut pipeline = Pipeline::new();
  pipeline.add_stage(Stage::new(strict)).unwrap();
  pipeline.add_stage(increment()).unwrap();
  let mut intake = pipeline.intake().unwrap();
  let results = pipeline.results().unwrap();
  pipeline.start().unwrap();

  let sink = tokio::spawn(results.collect_values());

  let mut accepted = 0;
  for value in 1..=10 {
    match within(intake.send(value)).await {
      Ok(()) => accepted += 1,
      Err(error) => {
        assert_eq!(error, PipelineError::ClosedQueue);
        break;
      }
    }
  }
  assert_eq!(accepted, 3);

  let (values, errors) = within(sink).await.unwrap();
  assert_eq!(values, vec![2, 3]);
  assert_eq!(errors.len(), 1);
  assert_eq!(errors[0].component.name, "strict");
  within(pipeline.wait_for_completion()).await.unwrap();
}

#[tokio::test]
async fn test_dropped_results_unwind_the_pipeline() {
  let mut pipeline = Pipeline::new();
  pipeline.add_stage(increment()).unwrap();
  pipeline.add_stage(double()).unwrap();
  let mut intake = pipeline.intake().unwrap();
  let results = pipeline.results().unwrap();
  pipeline.start().unwrap();
  drop(results);

  // Every worker exits on its own even though the intake is still open.
  within(pipeline.wait_for_completion()).await.unwrap();
  assert_eq!(pipeline.state(), PipelineState::Closed);

  // No value is accepted once nothing can deliver it.
  assert_eq!(within(intake.send(1)).await, Err(PipelineError::ClosedQueue));
  assert!(!intake.is_closed());
}

#[tokio::test]
async fn test_idle_intake_rejects_first_send_after_results_dropped() {
  let mut pipeline = Pipeline::new();
  pipeline.add_stage(increment()).unwrap();
  let mut intake = pipeline.intake().unwrap();
  let results = pipeline.results().unwrap();
  pipeline.start().unwrap();

  drop(results);
  tokio::time::sleep(Duration::from_millis(200)).await;

  assert_eq!(within(intake.send(1)).await, Err(PipelineError::ClosedQueue));
  within(pipeline.wait_for_completion()).await.unwrap();
}
