mod telemetry;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use scorecard_core::config::{SourceConfig, TaskConfig};
use scorecard_core::{
	from_async_fn, from_fn, ExactMatchScorer, Experiment, ExperimentConfig, JsonlDataSource, JsonlSpanSource, Scorer,
	Task,
};
use serde_json::json;
use tracing::Level;

#[derive(Debug, Parser)]
#[command(name = "scorecard", about = "Run experiments against an AI system and score the results")]
struct Cli {
	/// Debug logging (overridden by RUST_LOG)
	#[arg(long, short, global = true, action = ArgAction::SetTrue)]
	verbose: bool,

	/// Emit logs as JSON lines
	#[arg(long, global = true, action = ArgAction::SetTrue)]
	log_json: bool,

	#[command(subcommand)]
	command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
	/// Run the experiment described by a YAML or JSON config file
	Run(RunArgs),
}

#[derive(Debug, Clone, Parser)]
struct RunArgs {
	/// Experiment config file (.yaml, .yml or .json)
	#[arg(long)]
	config: PathBuf,

	/// Override the config's max_concurrency (items in flight)
	#[arg(long)]
	max_concurrency: Option<usize>,

	/// Also print one row per evaluated item
	#[arg(long, action = ArgAction::SetTrue)]
	items: bool,

	/// Output JSON result to a file
	#[arg(long)]
	json_out: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
	let cli = Cli::parse();
	telemetry::init_tracing(cli.log_json, if cli.verbose { Level::DEBUG } else { Level::INFO });
	match cli.command {
		Commands::Run(args) => run(args).await?,
	}
	Ok(())
}

async fn run(args: RunArgs) -> Result<()> {
	let config = ExperimentConfig::from_path(&args.config).await?;
	tracing::debug!(config = %args.config.display(), "loaded experiment config");

	let mut scorers = config.build_scorers().await?;
	// Default to exact if no scorers specified
	if scorers.is_empty() {
		scorers.push(Arc::new(ExactMatchScorer) as Arc<dyn Scorer>);
	}

	let mut builder = Experiment::builder(&config.name)
		.scorers(scorers)
		.max_concurrency(args.max_concurrency.unwrap_or(config.max_concurrency))
		.store(config.store.build()?)
		.on_progress(|done, total| {
			if done == total || done % 10 == 0 {
				tracing::info!(done, total, "progress");
			}
		});
	if let Some(description) = &config.description {
		builder = builder.description(description);
	}
	if let Some(metadata) = &config.metadata {
		builder = builder.metadata(metadata.clone());
	}
	if let Some(dataset_id) = &config.dataset_id {
		builder = builder.dataset_id(dataset_id);
	}
	builder = match &config.source {
		SourceConfig::Dataset { path, task, trial_count } => builder
			.dataset(Arc::new(JsonlDataSource::new(path)))
			.task(build_task(task))
			.trial_count(*trial_count),
		SourceConfig::Spans { path, extract } => {
			let extractors = extract.build();
			let builder = builder
				.spans(Arc::new(JsonlSpanSource::new(path)))
				.extract_input(extractors.input)
				.extract_output(extractors.output);
			match extractors.expected {
				Some(expected) => builder.extract_expected(expected),
				None => builder,
			}
		}
	};

	let result = builder.build()?.run().await?;
	println!("{}", result.summary_table());
	if args.items {
		println!("{}", result.items_table());
	}
	if let Some(id) = &result.experiment_id {
		println!("experiment: {id}");
	}

	if let Some(path) = args.json_out {
		let json = serde_json::to_string_pretty(&result)?;
		tokio::fs::write(path, json).await?;
	}

	Ok(())
}

fn build_task(config: &TaskConfig) -> Arc<dyn Task> {
	match config {
		TaskConfig::Http { url, method } => http_task(url.clone(), method.to_uppercase()),
		TaskConfig::Echo => from_fn(|input| Ok(input.clone())),
	}
}

/// POSTs `{ "input": <value> }` (or GETs `?input=<json>`) and returns the JSON response.
fn http_task(url: String, method: String) -> Arc<dyn Task> {
	let client = reqwest::Client::new();
	from_async_fn(move |input| {
		let client = client.clone();
		let url = url.clone();
		let method = method.clone();
		let input = input.clone();
		async move {
			let resp = match method.as_str() {
				"GET" => {
					let q = [("input", input.to_string())];
					client.get(&url).query(&q).send().await?
				}
				_ => client.post(&url).json(&json!({ "input": input })).send().await?,
			};
			let status = resp.status();
			let v = resp.json::<serde_json::Value>().await?;
			if !status.is_success() {
				anyhow::bail!("HTTP {}: {}", status.as_u16(), v);
			}
			Ok(v)
		}
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use wiremock::matchers::{body_json, method, path, query_param};
	use wiremock::{Mock, MockServer, ResponseTemplate};

	#[tokio::test]
	async fn test_http_task_post() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.and(path("/answer"))
			.and(body_json(json!({ "input": "2+2" })))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!("4")))
			.mount(&server)
			.await;

		let task = build_task(&TaskConfig::Http { url: format!("{}/answer", server.uri()), method: "post".into() });
		assert_eq!(task.run(&json!("2+2")).await.unwrap(), json!("4"));
	}

	#[tokio::test]
	async fn test_http_task_get_and_error_status() {
		let server = MockServer::start().await;
		Mock::given(method("GET"))
			.and(path("/answer"))
			.and(query_param("input", "\"q\""))
			.respond_with(ResponseTemplate::new(500).set_body_json(json!({ "error": "down" })))
			.mount(&server)
			.await;

		let task = http_task(format!("{}/answer", server.uri()), "GET".into());
		let err = task.run(&json!("q")).await.unwrap_err();
		assert!(err.to_string().starts_with("HTTP 500"));
	}

	#[tokio::test]
	async fn test_echo_task() {
		let task = build_task(&TaskConfig::Echo);
		assert_eq!(task.run(&json!({ "a": 1 })).await.unwrap(), json!({ "a": 1 }));
	}

	#[test]
	fn test_cli_parses_run() {
		let cli = Cli::parse_from(["scorecard", "run", "--config", "exp.yaml", "--max-concurrency", "3", "-v"]);
		assert!(cli.verbose);
		let Commands::Run(args) = cli.command;
		assert_eq!(args.config, PathBuf::from("exp.yaml"));
		assert_eq!(args.max_concurrency, Some(3));
	}
}
