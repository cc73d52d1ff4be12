use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use strsim::levenshtein;

use crate::normalize::ScorerOutput;
use crate::scorer::{Scorer, ScorerArgs};
use crate::types::ScoreResult;

/// Normalized edit similarity between output and expected, in `[0, 1]`.
pub struct LevenshteinScorer {
    pub min_similarity: f64,
}

impl LevenshteinScorer {
    pub fn new(min_similarity: f64) -> Self {
        Self { min_similarity }
    }
}

#[async_trait]
impl Scorer for LevenshteinScorer {
    fn name(&self) -> &str {
        "levenshtein"
    }

    async fn score(&self, args: &ScorerArgs) -> Result<ScorerOutput> {
        let e = stringify(args.require_expected(self.name())?);
        let o = stringify(&args.output);
        let max_len = e.chars().count().max(o.chars().count()).max(1) as f64;
        let similarity = 1.0 - (levenshtein(&e, &o) as f64 / max_len);
        let passed = similarity >= self.min_similarity;
        Ok(ScoreResult::numeric(self.name(), similarity)
            .with_metadata(json!({ "threshold": self.min_similarity, "passed": passed }))
            .into())
    }
}

fn stringify(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        _ => v.to_string(),
    }
}
