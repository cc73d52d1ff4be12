use crate::types::ExperimentResult;
use anyhow::Result;

/// Assert that a scorer's pass rate meets a threshold.
///
/// Use this in your `#[tokio::test]` functions.
///
/// # Example
/// ```ignore
/// #[tokio::test]
/// async fn test_my_agent() -> Result<()> {
///     let result = Experiment::builder("my-agent")
///         .dataset_items(items)
///         .task(task)
///         .add_scorer(Arc::new(ExactMatchScorer))
///         .build()?
///         .run()
///         .await?;
///
///     assert_pass_rate(&result, "exact_match", 0.8)?;
///     Ok(())
/// }
/// ```
pub fn assert_pass_rate(result: &ExperimentResult, scorer: &str, min_pass_rate: f64) -> Result<()> {
    let stats = stats_for(result, scorer)?;
    if stats.pass_rate < min_pass_rate {
        anyhow::bail!(
            "Experiment failed: {} pass rate {:.1}% is below threshold {:.1}%\n{}",
            scorer,
            stats.pass_rate * 100.0,
            min_pass_rate * 100.0,
            result.summary_table()
        );
    }
    Ok(())
}

pub fn assert_mean_score(result: &ExperimentResult, scorer: &str, min_mean: f64) -> Result<()> {
    let stats = stats_for(result, scorer)?;
    if stats.mean < min_mean {
        anyhow::bail!(
            "Experiment failed: {} mean {:.3} is below threshold {:.3}\n{}",
            scorer,
            stats.mean,
            min_mean,
            result.summary_table()
        );
    }
    Ok(())
}

/// Assert that no item failed in its task or extraction step.
pub fn assert_no_errors(result: &ExperimentResult) -> Result<()> {
    let errors = result.error_count();
    if errors > 0 {
        anyhow::bail!(
            "Experiment failed: {}/{} items errored\n{}",
            errors,
            result.items.len(),
            result.items_table()
        );
    }
    Ok(())
}

fn stats_for(result: &ExperimentResult, scorer: &str) -> Result<crate::types::SummaryStats> {
    match result.summary.get(scorer) {
        Some(stats) => Ok(*stats),
        None => anyhow::bail!("no scores recorded for {scorer}\n{}", result.summary_table()),
    }
}
