use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::normalize::ScorerOutput;
use crate::scorer::{Scorer, ScorerArgs};
use crate::types::ScoreResult;

/// Checks if output contains a substring.
pub struct ContainsScorer {
    substring: String,
    case_sensitive: bool,
}

impl ContainsScorer {
    /// Creates a case-sensitive contains scorer.
    pub fn new(substring: impl Into<String>) -> Self {
        Self {
            substring: substring.into(),
            case_sensitive: true,
        }
    }

    pub fn case_insensitive(substring: impl Into<String>) -> Self {
        Self {
            substring: substring.into(),
            case_sensitive: false,
        }
    }
}

#[async_trait]
impl Scorer for ContainsScorer {
    fn name(&self) -> &str {
        "contains"
    }

    async fn score(&self, args: &ScorerArgs) -> Result<ScorerOutput> {
        let output_str = match &args.output {
            Value::String(s) => s.clone(),
            other => serde_json::to_string(other)?,
        };

        let found = if self.case_sensitive {
            output_str.contains(&self.substring)
        } else {
            output_str
                .to_lowercase()
                .contains(&self.substring.to_lowercase())
        };

        Ok(ScoreResult::boolean(self.name(), found)
            .with_metadata(serde_json::json!({
                "substring": self.substring,
                "caseSensitive": self.case_sensitive,
            }))
            .into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scorer::run_scorer;
    use serde_json::json;

    fn args(output: Value) -> ScorerArgs {
        ScorerArgs { output, expected: None, input: Value::Null }
    }

    #[tokio::test]
    async fn test_contains_found() {
        let scorer = ContainsScorer::new("Paris");
        let scores = run_scorer(&scorer, &args(json!("The capital of France is Paris"))).await;
        assert_eq!(scores[0].value, 1.0);
    }

    #[tokio::test]
    async fn test_contains_not_found() {
        let scorer = ContainsScorer::new("London");
        let scores = run_scorer(&scorer, &args(json!("The capital of France is Paris"))).await;
        assert_eq!(scores[0].value, 0.0);
        assert!(!scores[0].scoring_failed);
    }

    #[tokio::test]
    async fn test_contains_case_insensitive() {
        let scorer = ContainsScorer::case_insensitive("PARIS");
        let scores = run_scorer(&scorer, &args(json!("The capital of France is paris"))).await;
        assert_eq!(scores[0].value, 1.0);
    }

    #[tokio::test]
    async fn test_contains_searches_serialized_json() {
        let scorer = ContainsScorer::new("\"city\":\"Paris\"");
        let scores = run_scorer(&scorer, &args(json!({"city": "Paris"}))).await;
        assert_eq!(scores[0].value, 1.0);
    }
}
