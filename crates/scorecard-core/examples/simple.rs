use std::sync::Arc;

use scorecard_core::{
    from_async_fn, scorer_from_fn, DatasetItem, ExactMatchScorer, Experiment, JsonlDataSource, LevenshteinScorer,
    Scorer,
};
use serde_json::json;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Example 1: inline items, two trials each
    let items = vec![
        DatasetItem::with_expected("0", json!("Hello"), json!("Hello World!")),
        DatasetItem::with_expected("1", json!("Hi"), json!("Hi World!")),
    ];

    // Task: append " World!" to any string input
    let task = from_async_fn(|input| {
        let input = input.clone();
        async move {
            let s = input.as_str().unwrap_or_default();
            Ok(json!(format!("{s} World!")))
        }
    });

    let scorers: Vec<Arc<dyn Scorer>> = vec![
        Arc::new(ExactMatchScorer),
        Arc::new(LevenshteinScorer::new(0.9)),
        scorer_from_fn("length", |args| Ok((args.output.to_string().len() as f64).into())),
    ];

    let result = Experiment::builder("hello-world")
        .dataset_items(items)
        .task(task.clone())
        .trial_count(2)
        .scorers(scorers)
        .max_concurrency(8)
        .on_progress(|done, total| eprintln!("{done}/{total}"))
        .build()?
        .run()
        .await?;
    println!("{}", result.summary_table());

    // Example 2: load from a JSONL file if provided
    if let Some(path) = std::env::args().nth(1) {
        let result = Experiment::builder("hello-world-file")
            .dataset(Arc::new(JsonlDataSource::new(path)))
            .task(task)
            .add_scorer(Arc::new(ExactMatchScorer))
            .build()?
            .run()
            .await?;
        println!("{}", result.summary_table());
    }

    Ok(())
}
