use serde_json::Value;
use thiserror::Error;

use crate::types::{ScoreDataType, ScoreResult};

/// Raw value a scorer hands back before it is turned into score records.
#[derive(Debug, Clone, PartialEq)]
pub enum ScorerOutput {
    /// The scorer opts out for this item.
    None,
    Number(f64),
    Bool(bool),
    Score(ScoreResult),
    Scores(Vec<ScoreResult>),
    /// Untyped result, e.g. from an HTTP judge. Validated during normalization.
    Json(Value),
}

impl From<f64> for ScorerOutput {
    fn from(v: f64) -> Self {
        ScorerOutput::Number(v)
    }
}

impl From<bool> for ScorerOutput {
    fn from(v: bool) -> Self {
        ScorerOutput::Bool(v)
    }
}

impl From<ScoreResult> for ScorerOutput {
    fn from(v: ScoreResult) -> Self {
        ScorerOutput::Score(v)
    }
}

impl From<Vec<ScoreResult>> for ScorerOutput {
    fn from(v: Vec<ScoreResult>) -> Self {
        ScorerOutput::Scores(v)
    }
}

impl From<Value> for ScorerOutput {
    fn from(v: Value) -> Self {
        ScorerOutput::Json(v)
    }
}

impl<T: Into<ScorerOutput>> From<Option<T>> for ScorerOutput {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(ScorerOutput::None)
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum NormalizeError {
    #[error("score value must be finite, got {0}")]
    NonFinite(f64),
    #[error("unsupported scorer result: {0}")]
    UnsupportedShape(String),
    #[error("invalid score record: {0}")]
    InvalidRecord(String),
}

/// Convert a scorer's raw output into score records named after `scorer_name`
/// where the output carries no name of its own.
pub fn normalize(scorer_name: &str, output: ScorerOutput) -> Result<Vec<ScoreResult>, NormalizeError> {
    match output {
        ScorerOutput::None => Ok(Vec::new()),
        ScorerOutput::Number(v) => {
            if !v.is_finite() {
                return Err(NormalizeError::NonFinite(v));
            }
            Ok(vec![ScoreResult::numeric(scorer_name, v)])
        }
        ScorerOutput::Bool(b) => Ok(vec![ScoreResult::boolean(scorer_name, b)]),
        ScorerOutput::Score(s) => Ok(vec![check_record(s)?]),
        ScorerOutput::Scores(scores) => scores.into_iter().map(check_record).collect(),
        ScorerOutput::Json(value) => normalize_json(scorer_name, value),
    }
}

fn normalize_json(scorer_name: &str, value: Value) -> Result<Vec<ScoreResult>, NormalizeError> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Bool(b) => normalize(scorer_name, ScorerOutput::Bool(b)),
        Value::Number(n) => match n.as_f64() {
            Some(v) => normalize(scorer_name, ScorerOutput::Number(v)),
            None => Err(NormalizeError::UnsupportedShape(n.to_string())),
        },
        Value::Object(_) => Ok(vec![record_from_json(value)?]),
        Value::Array(values) => values.into_iter().map(record_from_json).collect(),
        Value::String(s) => Err(NormalizeError::UnsupportedShape(format!("string {s:?}"))),
    }
}

fn record_from_json(value: Value) -> Result<ScoreResult, NormalizeError> {
    let Value::Object(mut obj) = value else {
        return Err(NormalizeError::InvalidRecord("expected an object with 'name' and 'value'".into()));
    };
    if !obj.get("name").is_some_and(Value::is_string) {
        return Err(NormalizeError::InvalidRecord("missing string field 'name'".into()));
    }
    // A boolean value is accepted as a BOOLEAN record.
    if let Some(Value::Bool(b)) = obj.get("value").cloned() {
        obj.insert("value".into(), Value::from(if b { 1.0 } else { 0.0 }));
        obj.entry("type")
            .or_insert_with(|| Value::from(ScoreDataType::Boolean.as_str()));
    }
    if !obj.get("value").is_some_and(Value::is_number) {
        return Err(NormalizeError::InvalidRecord("missing numeric field 'value'".into()));
    }
    let record = serde_json::from_value(Value::Object(obj)).map_err(|e| NormalizeError::InvalidRecord(e.to_string()))?;
    check_record(record)
}

/// Records built by the scorer itself must carry a finite value, and a failed
/// record always has value 0.
fn check_record(mut record: ScoreResult) -> Result<ScoreResult, NormalizeError> {
    if record.scoring_failed {
        record.value = 0.0;
    } else if !record.value.is_finite() {
        return Err(NormalizeError::NonFinite(record.value));
    }
    Ok(record)
}
