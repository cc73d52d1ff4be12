use anyhow::Result;
use async_trait::async_trait;
use jsonschema::JSONSchema;
use serde_json::{json, Value};

use crate::normalize::ScorerOutput;
use crate::scorer::{Scorer, ScorerArgs};
use crate::types::ScoreResult;

enum Mode {
    /// String outputs must parse as JSON; structured outputs always pass.
    Valid,
    /// Same keys and value types as the expected value, values ignored.
    Structure,
    Schema(JSONSchema),
}

/// Validates JSON outputs, optionally against an expected shape or a JSON schema.
pub struct JsonScorer {
    mode: Mode,
}

impl JsonScorer {
    pub fn new() -> Self {
        Self { mode: Mode::Valid }
    }

    /// Returns error if schema is invalid.
    pub fn with_schema(schema: Value) -> Result<Self> {
        let compiled = JSONSchema::compile(&schema)
            .map_err(|e| anyhow::anyhow!("Invalid JSON schema: {}", e))?;
        Ok(Self { mode: Mode::Schema(compiled) })
    }

    pub fn strict() -> Self {
        Self { mode: Mode::Structure }
    }
}

impl Default for JsonScorer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Scorer for JsonScorer {
    fn name(&self) -> &str {
        "json"
    }

    async fn score(&self, args: &ScorerArgs) -> Result<ScorerOutput> {
        let parsed = match &args.output {
            Value::String(s) => match serde_json::from_str::<Value>(s) {
                Ok(v) => v,
                Err(e) => {
                    return Ok(ScoreResult::boolean(self.name(), false)
                        .with_reason(format!("output is not valid JSON: {e}"))
                        .into())
                }
            },
            other => other.clone(),
        };

        let score = match &self.mode {
            Mode::Valid => ScoreResult::boolean(self.name(), true),
            Mode::Structure => {
                let expected = args.require_expected(self.name())?;
                let expected = match expected {
                    Value::String(s) => serde_json::from_str(s).unwrap_or_else(|_| expected.clone()),
                    other => other.clone(),
                };
                ScoreResult::boolean(self.name(), compare_structure(&expected, &parsed))
            }
            Mode::Schema(schema) => match schema.validate(&parsed) {
                Ok(()) => ScoreResult::boolean(self.name(), true),
                Err(errors) => {
                    let messages: Vec<String> = errors.map(|e| format!("{}: {}", e.instance_path, e)).collect();
                    ScoreResult::boolean(self.name(), false).with_metadata(json!({ "errors": messages }))
                }
            },
        };
        Ok(score.into())
    }
}

/// Recursively compare JSON structure (keys and types, not values)
fn compare_structure(expected: &Value, actual: &Value) -> bool {
    match (expected, actual) {
        (Value::Object(e), Value::Object(a)) => {
            e.len() == a.len()
                && e.iter().all(|(key, e_val)| a.get(key).is_some_and(|a_val| compare_structure(e_val, a_val)))
        }
        (Value::Array(e), Value::Array(a)) => {
            e.len() == a.len() && e.iter().zip(a.iter()).all(|(e_item, a_item)| compare_structure(e_item, a_item))
        }
        (Value::String(_), Value::String(_)) => true,
        (Value::Number(_), Value::Number(_)) => true,
        (Value::Bool(_), Value::Bool(_)) => true,
        (Value::Null, Value::Null) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scorer::run_scorer;

    fn args(output: Value, expected: Option<Value>) -> ScorerArgs {
        ScorerArgs { output, expected, input: Value::Null }
    }

    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "name": {"type": "string"},
                "age": {"type": "number"}
            },
            "required": ["name", "age"]
        })
    }

    #[tokio::test]
    async fn test_json_valid_string_output() {
        let scores = run_scorer(&JsonScorer::new(), &args(json!(r#"{"name": "John"}"#), None)).await;
        assert_eq!(scores[0].value, 1.0);

        let scores = run_scorer(&JsonScorer::new(), &args(json!("{not json"), None)).await;
        assert_eq!(scores[0].value, 0.0);
        assert!(!scores[0].scoring_failed);
        assert!(scores[0].reason.as_deref().unwrap().starts_with("output is not valid JSON"));
    }

    #[tokio::test]
    async fn test_json_strict_match() {
        let expected = json!({"name": "John", "age": 30});
        let scores = run_scorer(&JsonScorer::strict(), &args(json!({"name": "Jane", "age": 25}), Some(expected.clone()))).await;
        assert_eq!(scores[0].value, 1.0);

        let scores = run_scorer(&JsonScorer::strict(), &args(json!({"name": "Jane"}), Some(expected))).await;
        assert_eq!(scores[0].value, 0.0);
    }

    #[tokio::test]
    async fn test_json_with_schema() {
        let scorer = JsonScorer::with_schema(schema()).unwrap();
        let scores = run_scorer(&scorer, &args(json!({"name": "John", "age": 30}), None)).await;
        assert_eq!(scores[0].value, 1.0);

        let scores = run_scorer(&scorer, &args(json!({"name": "John"}), None)).await;
        assert_eq!(scores[0].value, 0.0);
        assert_eq!(scores[0].metadata.as_ref().unwrap()["errors"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_invalid_schema() {
        assert!(JsonScorer::with_schema(json!({"type": 12})).is_err());
    }
}
