use anyhow::Result;
use async_trait::async_trait;

use crate::normalize::ScorerOutput;
use crate::scorer::{Scorer, ScorerArgs};
use crate::types::ScoreResult;

/// Passes when the output equals the expected value exactly.
pub struct ExactMatchScorer;

#[async_trait]
impl Scorer for ExactMatchScorer {
    fn name(&self) -> &str {
        "exact_match"
    }

    async fn score(&self, args: &ScorerArgs) -> Result<ScorerOutput> {
        let expected = args.require_expected(self.name())?;
        Ok(ScoreResult::boolean(self.name(), &args.output == expected).into())
    }
}
