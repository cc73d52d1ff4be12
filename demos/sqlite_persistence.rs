use std::sync::Arc;

use scorecard_core::types::TokenUsage;
use scorecard_core::*;
use scorecard_store::Store;
use serde_json::json;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    println!("=== Example: replay recorded spans into SQLite ===\n");

    let db_path = "experiments.db";
    println!("Opening SQLite store at '{}'...", db_path);
    let store = Arc::new(Store::open(db_path)?);

    let spans = vec![
        record("call-1", "What is the capital of France?", "Paris", "Paris"),
        record("call-2", "What is the capital of Japan?", "Kyoto", "Tokyo"),
    ];

    let result = Experiment::builder("capital-cities-replay")
        .description("replay of yesterday's production calls")
        .span_records(spans)
        .extract_input(Arc::new(PointerExtractor::new("/input/prompt")))
        .extract_output(Arc::new(PointerExtractor::new("/output/response")))
        .extract_expected(Arc::new(PointerExtractor::new("/metadata/expected")))
        .add_scorer(Arc::new(ExactMatchScorer))
        .add_scorer(Arc::new(LevenshteinScorer::new(0.8)))
        .store(store.clone())
        .build()?
        .run()
        .await?;
    println!("{}", result.summary_table());

    if let Some(id) = &result.experiment_id {
        let stored = store.load_items(id)?;
        println!("Persisted {} items under experiment {}", stored.len(), id);
        println!("  You can inspect it with: sqlite3 {} 'select * from item_scores;'", db_path);
    }

    Ok(())
}

fn record(id: &str, prompt: &str, response: &str, expected: &str) -> SpanRecord {
    SpanRecord::start_now(id)
        .model("gpt-4o-mini")
        .metadata(json!({ "expected": expected }))
        .finish(
            json!({ "prompt": prompt }),
            json!({ "response": response }),
            Some(TokenUsage {
                input_tokens: 15,
                output_tokens: 5,
                total_tokens: 20,
            }),
        )
}
