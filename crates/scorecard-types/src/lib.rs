use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tabled::Tabled;

/// A single dataset entry an experiment task is run against.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DatasetItem {
	pub id: String,
	pub input: Value,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub expected: Option<Value>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub metadata: Option<Value>,
}

impl DatasetItem {
	pub fn new(id: impl Into<String>, input: Value) -> Self {
		Self { id: id.into(), input, expected: None, metadata: None }
	}

	pub fn with_expected(id: impl Into<String>, input: Value, expected: Value) -> Self {
		Self { id: id.into(), input, expected: Some(expected), metadata: None }
	}

	pub fn metadata(mut self, metadata: Value) -> Self {
		self.metadata = Some(metadata);
		self
	}
}

/// A previously recorded execution span (one LLM call, tool call or agent step).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpanRecord {
	/// Stable identifier of the span; becomes the evaluation item id.
	pub id: String,

	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub trace_id: Option<String>,

	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,

	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub start_time: Option<DateTime<Utc>>,

	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub end_time: Option<DateTime<Utc>>,

	/// Model name (e.g., "gpt-4o-mini")
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub model: Option<String>,

	#[serde(default)]
	pub input: Value,

	#[serde(default)]
	pub output: Value,

	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub usage: Option<TokenUsage>,

	/// Free-form attributes recorded with the span.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub metadata: Option<Value>,

	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenUsage {
	pub input_tokens: u32,
	pub output_tokens: u32,
	pub total_tokens: u32,
}

impl SpanRecord {
	/// Start recording a span now; call [`SpanRecordBuilder::finish`] when the call returns.
	pub fn start_now(id: impl Into<String>) -> SpanRecordBuilder {
		SpanRecordBuilder {
			id: id.into(),
			start: Utc::now(),
			trace_id: None,
			name: None,
			model: None,
			metadata: None,
		}
	}

	pub fn duration_ms(&self) -> Option<i64> {
		match (self.start_time, self.end_time) {
			(Some(start), Some(end)) => Some((end - start).num_milliseconds()),
			_ => None,
		}
	}
}

pub struct SpanRecordBuilder {
	id: String,
	start: DateTime<Utc>,
	trace_id: Option<String>,
	name: Option<String>,
	model: Option<String>,
	metadata: Option<Value>,
}

impl SpanRecordBuilder {
	pub fn trace_id(mut self, trace_id: impl Into<String>) -> Self {
		self.trace_id = Some(trace_id.into());
		self
	}

	pub fn name(mut self, name: impl Into<String>) -> Self {
		self.name = Some(name.into());
		self
	}

	pub fn model(mut self, model: impl Into<String>) -> Self {
		self.model = Some(model.into());
		self
	}

	pub fn metadata(mut self, metadata: Value) -> Self {
		self.metadata = Some(metadata);
		self
	}

	pub fn finish(self, input: Value, output: Value, usage: Option<TokenUsage>) -> SpanRecord {
		SpanRecord {
			id: self.id,
			trace_id: self.trace_id,
			name: self.name,
			start_time: Some(self.start),
			end_time: Some(Utc::now()),
			model: self.model,
			input,
			output,
			usage,
			metadata: self.metadata,
			error: None,
		}
	}

	pub fn finish_with_error(self, input: Value, error: impl Into<String>) -> SpanRecord {
		SpanRecord {
			id: self.id,
			trace_id: self.trace_id,
			name: self.name,
			start_time: Some(self.start),
			end_time: Some(Utc::now()),
			model: self.model,
			input,
			output: Value::Null,
			usage: None,
			metadata: self.metadata,
			error: Some(error.into()),
		}
	}
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScoreDataType {
	#[default]
	Numeric,
	Boolean,
	Categorical,
}

impl ScoreDataType {
	pub fn as_str(&self) -> &'static str {
		match self {
			ScoreDataType::Numeric => "NUMERIC",
			ScoreDataType::Boolean => "BOOLEAN",
			ScoreDataType::Categorical => "CATEGORICAL",
		}
	}
}

/// One named judgment produced by a scorer.
///
/// A record with `scoring_failed` set is a sentinel: its `value` is always 0
/// and `reason` carries the failure message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScoreResult {
	pub name: String,
	pub value: f64,
	#[serde(rename = "type", default)]
	pub data_type: ScoreDataType,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub string_value: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub reason: Option<String>,
	#[serde(default, skip_serializing_if = "std::ops::Not::not")]
	pub scoring_failed: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub metadata: Option<Value>,
}

impl ScoreResult {
	pub fn numeric(name: impl Into<String>, value: f64) -> Self {
		Self {
			name: name.into(),
			value,
			data_type: ScoreDataType::Numeric,
			string_value: None,
			reason: None,
			scoring_failed: false,
			metadata: None,
		}
	}

	pub fn boolean(name: impl Into<String>, passed: bool) -> Self {
		Self {
			data_type: ScoreDataType::Boolean,
			..Self::numeric(name, if passed { 1.0 } else { 0.0 })
		}
	}

	pub fn categorical(name: impl Into<String>, value: f64, label: impl Into<String>) -> Self {
		Self {
			data_type: ScoreDataType::Categorical,
			string_value: Some(label.into()),
			..Self::numeric(name, value)
		}
	}

	/// Sentinel record for a scorer that errored, panicked or returned an unusable value.
	pub fn failed(name: impl Into<String>, reason: impl Into<String>) -> Self {
		Self {
			reason: Some(reason.into()),
			scoring_failed: true,
			..Self::numeric(name, 0.0)
		}
	}

	pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
		self.reason = Some(reason.into());
		self
	}

	pub fn with_metadata(mut self, metadata: Value) -> Self {
		self.metadata = Some(metadata);
		self
	}
}

/// Outcome of executing and scoring one work item.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationItem {
	pub item_id: String,
	pub input: Value,
	pub output: Value,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub expected: Option<Value>,
	pub scores: Vec<ScoreResult>,
	pub trial_number: u32,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
}

impl EvaluationItem {
	/// An item whose task or extraction step failed; scoring never ran.
	pub fn errored(
		item_id: impl Into<String>,
		input: Value,
		expected: Option<Value>,
		trial_number: u32,
		error: impl Into<String>,
	) -> Self {
		Self {
			item_id: item_id.into(),
			input,
			output: Value::Null,
			expected,
			scores: Vec::new(),
			trial_number,
			error: Some(error.into()),
		}
	}

	pub fn is_error(&self) -> bool {
		self.error.is_some()
	}
}

/// Aggregate statistics for every score record sharing a scorer name.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct SummaryStats {
	pub mean: f64,
	pub std_dev: f64,
	pub min: f64,
	pub max: f64,
	pub count: usize,
	pub pass_rate: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Source {
	Dataset,
	Spans,
}

impl Source {
	pub fn as_str(&self) -> &'static str {
		match self {
			Source::Dataset => "dataset",
			Source::Spans => "spans",
		}
	}
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExperimentStatus {
	Running,
	Completed,
}

impl ExperimentStatus {
	pub fn as_str(&self) -> &'static str {
		match self {
			ExperimentStatus::Running => "running",
			ExperimentStatus::Completed => "completed",
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperimentResult {
	/// Absent when the run had no work and no remote record was created.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub experiment_id: Option<String>,
	pub experiment_name: String,
	pub source: Source,
	pub summary: BTreeMap<String, SummaryStats>,
	pub items: Vec<EvaluationItem>,
}

#[derive(Debug, Clone, Tabled)]
struct ScorerRow {
	scorer: String,
	count: usize,
	mean: String,
	std_dev: String,
	min: String,
	max: String,
	pass_rate: String,
}

#[derive(Debug, Clone, Tabled)]
struct ItemRow {
	item: String,
	trial: u32,
	output: String,
	scores: String,
	error: String,
}

impl ExperimentResult {
	pub fn error_count(&self) -> usize {
		self.items.iter().filter(|i| i.is_error()).count()
	}

	pub fn summary_table(&self) -> String {
		use tabled::Table;
		let rows: Vec<ScorerRow> = self
			.summary
			.iter()
			.map(|(name, s)| ScorerRow {
				scorer: name.clone(),
				count: s.count,
				mean: format!("{:.3}", s.mean),
				std_dev: format!("{:.3}", s.std_dev),
				min: format!("{:.3}", s.min),
				max: format!("{:.3}", s.max),
				pass_rate: format!("{:.1}%", s.pass_rate * 100.0),
			})
			.collect();

		let table_str = Table::new(rows).to_string();
		let summary_text = format!(
			"Experiment: {}  Source: {}  Items: {}  Errors: {}",
			self.experiment_name,
			self.source.as_str(),
			self.items.len(),
			self.error_count()
		);

		format!("{}\n\n{}\n", table_str, summary_text)
	}

	pub fn items_table(&self) -> String {
		use tabled::Table;
		let rows: Vec<ItemRow> = self
			.items
			.iter()
			.map(|item| ItemRow {
				item: item.item_id.clone(),
				trial: item.trial_number,
				output: truncate(value_preview(&item.output), 48),
				scores: item
					.scores
					.iter()
					.map(|s| {
						if s.scoring_failed {
							format!("{}=failed", s.name)
						} else {
							format!("{}={:.3}", s.name, s.value)
						}
					})
					.collect::<Vec<_>>()
					.join(", "),
				error: truncate(item.error.clone().unwrap_or_default(), 48),
			})
			.collect();
		Table::new(rows).to_string()
	}
}

fn value_preview(v: &Value) -> String {
	match v {
		Value::String(s) => s.clone(),
		_ => v.to_string(),
	}
}

fn truncate(s: String, max_len: usize) -> String {
	if s.chars().count() <= max_len {
		return s;
	}
	let mut truncated = s.chars().take(max_len.saturating_sub(1)).collect::<String>();
	truncated.push('…');
	truncated
}
