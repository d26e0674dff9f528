//! Demo driver: sends 1, 2 and 3 through `increment` then `double` and prints
//! the results (4, 6, 8).

use relay::{Pipeline, PipelineConfig, Stage};
use std::error::Error;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
  tracing_subscriber::fmt::init();

  let mut pipeline = Pipeline::with_config(PipelineConfig::default().with_name("demo"));
  pipeline.add_stage(Stage::map("increment", |event: i64| event + 1))?;
  pipeline.add_stage(Stage::map("double", |event: i64| event * 2))?;

  let mut intake = pipeline.intake()?;
  let mut results = pipeline.results()?;
  pipeline.start()?;

  let sink = tokio::spawn(async move {
    while let Some(item) = results.recv().await {
      match item {
        Ok(value) => println!("{}", value),
        Err(error) => eprintln!("{}", error),
      }
    }
  });

  for event in [1, 2, 3] {
    intake.send(event).await?;
  }
  intake.close();

  pipeline.wait_for_completion().await?;
  sink.await?;
  Ok(())
}
