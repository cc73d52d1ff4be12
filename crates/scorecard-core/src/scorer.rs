use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use futures::FutureExt;
use serde_json::Value;

use crate::error::panic_message;
use crate::normalize::{normalize, ScorerOutput};
use crate::types::ScoreResult;

/// What a scorer gets to look at for one evaluation item.
#[derive(Debug, Clone, PartialEq)]
pub struct ScorerArgs {
    pub output: Value,
    pub expected: Option<Value>,
    pub input: Value,
}

impl ScorerArgs {
    /// The expected value, or an error naming the scorer that needed it.
    pub fn require_expected(&self, scorer: &str) -> Result<&Value> {
        self.expected
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("{scorer} requires an expected value"))
    }
}

#[async_trait]
pub trait Scorer: Send + Sync {
    fn name(&self) -> &str;
    async fn score(&self, args: &ScorerArgs) -> Result<ScorerOutput>;
}

/// Run one scorer, never letting it fail the item.
///
/// Errors, panics and unusable return values all collapse into a single
/// `scoring_failed` record carrying the scorer's name and the failure message.
pub async fn run_scorer(scorer: &dyn Scorer, args: &ScorerArgs) -> Vec<ScoreResult> {
    let name = scorer.name().to_string();
    let reason = match AssertUnwindSafe(scorer.score(args)).catch_unwind().await {
        Ok(Ok(raw)) => match normalize(&name, raw) {
            Ok(scores) => return scores,
            Err(err) => err.to_string(),
        },
        Ok(Err(err)) => format!("{err:#}"),
        Err(payload) => panic_message(payload.as_ref()),
    };
    tracing::warn!(scorer = %name, %reason, "scorer failed");
    vec![ScoreResult::failed(name, reason)]
}

struct FnScorer<F> {
    name: String,
    f: F,
}

#[async_trait]
impl<F> Scorer for FnScorer<F>
where
    F: Fn(&ScorerArgs) -> Result<ScorerOutput> + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn score(&self, args: &ScorerArgs) -> Result<ScorerOutput> {
        (self.f)(args)
    }
}

/// Wrap a synchronous closure as a named `Scorer`.
pub fn scorer_from_fn<F>(name: impl Into<String>, f: F) -> Arc<dyn Scorer>
where
    F: Fn(&ScorerArgs) -> Result<ScorerOutput> + Send + Sync + 'static,
{
    Arc::new(FnScorer { name: name.into(), f })
}

struct AsyncFnScorer<F> {
    name: String,
    f: F,
}

#[async_trait]
impl<F, Fut> Scorer for AsyncFnScorer<F>
where
    F: Fn(&ScorerArgs) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ScorerOutput>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn score(&self, args: &ScorerArgs) -> Result<ScorerOutput> {
        (self.f)(args).await
    }
}

/// Wrap an async closure as a named `Scorer`. Clone what you need out of the
/// arguments before the `async move` block.
pub fn scorer_from_async_fn<F, Fut>(name: impl Into<String>, f: F) -> Arc<dyn Scorer>
where
    F: Fn(&ScorerArgs) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ScorerOutput>> + Send + 'static,
{
    Arc::new(AsyncFnScorer { name: name.into(), f })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ScoreDataType;
    use serde_json::json;

    fn args() -> ScorerArgs {
        ScorerArgs {
            output: json!("Paris"),
            expected: Some(json!("Paris")),
            input: json!("capital of France?"),
        }
    }

    #[tokio::test]
    async fn test_successful_scorer_is_normalized() {
        let scorer = scorer_from_fn("exact", |a| Ok((Some(&a.output) == a.expected.as_ref()).into()));
        let scores = run_scorer(scorer.as_ref(), &args()).await;
        assert_eq!(scores.len(), 1);
        assert_eq!(scores[0].name, "exact");
        assert_eq!(scores[0].data_type, ScoreDataType::Boolean);
        assert!(!scores[0].scoring_failed);
    }

    #[tokio::test]
    async fn test_error_becomes_failed_sentinel() {
        let scorer = scorer_from_fn("judge", |_| anyhow::bail!("rate limited"));
        let scores = run_scorer(scorer.as_ref(), &args()).await;
        assert_eq!(scores, vec![ScoreResult::failed("judge", "rate limited")]);
    }

    async fn explode() -> Result<ScorerOutput> {
        panic!("index out of range")
    }

    #[tokio::test]
    async fn test_panic_becomes_failed_sentinel() {
        let scorer = scorer_from_async_fn("flaky", |_| explode());
        let scores = run_scorer(scorer.as_ref(), &args()).await;
        assert_eq!(scores.len(), 1);
        assert!(scores[0].scoring_failed);
        assert_eq!(scores[0].value, 0.0);
        assert!(scores[0].reason.as_deref().unwrap().contains("index out of range"));
    }

    #[tokio::test]
    async fn test_normalization_error_becomes_failed_sentinel() {
        let scorer = scorer_from_fn("label", |_| Ok(json!("good").into()));
        let scores = run_scorer(scorer.as_ref(), &args()).await;
        assert!(scores[0].scoring_failed);
        assert_eq!(scores[0].name, "label");
    }

    #[tokio::test]
    async fn test_nan_record_is_kept_out_of_the_summary() {
        let scorer = scorer_from_fn("judge", |a| {
            let value = if a.input == json!("a") { f64::NAN } else { 0.5 };
            Ok(ScoreResult::numeric("judge", value).into())
        });
        let mut items = Vec::new();
        for input in ["a", "b"] {
            let args = ScorerArgs { input: json!(input), ..args() };
            let scores = run_scorer(scorer.as_ref(), &args).await;
            items.push(crate::types::EvaluationItem {
                item_id: input.into(),
                input: args.input,
                output: args.output,
                expected: args.expected,
                scores,
                trial_number: 1,
                error: None,
            });
        }
        assert!(items[0].scores[0].scoring_failed);
        assert_eq!(items[0].scores[0].value, 0.0);

        let judge = crate::stats::compute_summary(&items)["judge"];
        assert_eq!(judge.mean, 0.5);
        assert_eq!(judge.std_dev, 0.0);
        assert_eq!(judge.count, 2);
        assert_eq!(judge.pass_rate, 0.5);
    }

    #[tokio::test]
    async fn test_null_contributes_no_records() {
        let scorer = scorer_from_fn("skip", |_| Ok(ScorerOutput::None));
        assert!(run_scorer(scorer.as_ref(), &args()).await.is_empty());
    }

    #[test]
    fn test_require_expected() {
        let mut a = args();
        assert_eq!(a.require_expected("exact").unwrap(), &json!("Paris"));
        a.expected = None;
        assert_eq!(
            a.require_expected("exact").unwrap_err().to_string(),
            "exact requires an expected value"
        );
    }
}
