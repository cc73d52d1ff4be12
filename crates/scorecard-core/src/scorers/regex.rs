use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;

use crate::normalize::ScorerOutput;
use crate::scorer::{Scorer, ScorerArgs};
use crate::types::ScoreResult;

/// Checks if output matches a regex pattern.
pub struct RegexScorer {
    pattern: Regex,
}

impl RegexScorer {
    pub fn new(pattern: &str) -> Result<Self> {
        Ok(Self { pattern: Regex::new(pattern)? })
    }
}

#[async_trait]
impl Scorer for RegexScorer {
    fn name(&self) -> &str {
        "regex"
    }

    async fn score(&self, args: &ScorerArgs) -> Result<ScorerOutput> {
        let output_str = match &args.output {
            Value::String(s) => s.clone(),
            other => serde_json::to_string(other)?,
        };

        let captures: Option<Vec<Value>> = self.pattern.captures(&output_str).map(|caps| {
            caps.iter()
                .map(|m| m.map_or(Value::Null, |m| Value::from(m.as_str())))
                .collect()
        });

        Ok(ScoreResult::boolean(self.name(), captures.is_some())
            .with_metadata(serde_json::json!({
                "pattern": self.pattern.as_str(),
                "captures": captures,
            }))
            .into())
    }
}
