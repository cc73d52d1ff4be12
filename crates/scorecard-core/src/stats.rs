use std::collections::BTreeMap;

use crate::types::{EvaluationItem, SummaryStats};

/// Per-scorer statistics over every score record in `items`.
///
/// Failed records count toward `count` but are excluded from the value
/// statistics. A scorer whose records all failed still gets an entry, zeroed.
pub fn compute_summary(items: &[EvaluationItem]) -> BTreeMap<String, SummaryStats> {
    let mut groups: BTreeMap<&str, (usize, Vec<f64>)> = BTreeMap::new();
    for score in items.iter().flat_map(|item| &item.scores) {
        let (count, successful) = groups.entry(score.name.as_str()).or_default();
        *count += 1;
        if !score.scoring_failed {
            successful.push(score.value);
        }
    }

    groups
        .into_iter()
        .map(|(name, (count, values))| (name.to_string(), summarize(count, &values)))
        .collect()
}

fn summarize(count: usize, values: &[f64]) -> SummaryStats {
    if values.is_empty() {
        return SummaryStats {
            count,
            ..SummaryStats::default()
        };
    }

    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let std_dev = if values.len() > 1 {
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
        variance.sqrt()
    } else {
        0.0
    };
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    SummaryStats {
        mean,
        std_dev,
        min,
        max,
        count,
        pass_rate: values.len() as f64 / count as f64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ScoreResult;
    use serde_json::json;

    fn item(scores: Vec<ScoreResult>) -> EvaluationItem {
        EvaluationItem {
            item_id: "i".into(),
            input: json!(null),
            output: json!(null),
            expected: None,
            scores,
            trial_number: 1,
            error: None,
        }
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_mean_and_sample_std_dev() {
        let items = vec![
            item(vec![ScoreResult::numeric("acc", 2.0)]),
            item(vec![ScoreResult::numeric("acc", 4.0)]),
            item(vec![ScoreResult::numeric("acc", 4.0)]),
            item(vec![ScoreResult::numeric("acc", 4.0)]),
            item(vec![ScoreResult::numeric("acc", 5.0)]),
            item(vec![ScoreResult::numeric("acc", 5.0)]),
            item(vec![ScoreResult::numeric("acc", 7.0)]),
            item(vec![ScoreResult::numeric("acc", 9.0)]),
        ];
        let s = compute_summary(&items)["acc"];
        assert!(approx(s.mean, 5.0));
        // Sample variance = 32 / 7.
        assert!(approx(s.std_dev, (32.0f64 / 7.0).sqrt()));
        assert_eq!(s.min, 2.0);
        assert_eq!(s.max, 9.0);
        assert_eq!(s.count, 8);
        assert_eq!(s.pass_rate, 1.0);
    }

    #[test]
    fn test_failed_records_count_but_do_not_aggregate() {
        let items = vec![
            item(vec![ScoreResult::numeric("judge", 0.8), ScoreResult::boolean("exact", true)]),
            item(vec![ScoreResult::failed("judge", "timeout"), ScoreResult::boolean("exact", false)]),
            item(vec![ScoreResult::numeric("judge", 0.4)]),
        ];
        let summary = compute_summary(&items);
        let judge = summary["judge"];
        assert_eq!(judge.count, 3);
        assert!(approx(judge.mean, 0.6));
        assert_eq!(judge.min, 0.4);
        assert_eq!(judge.max, 0.8);
        assert!(approx(judge.pass_rate, 2.0 / 3.0));

        let exact = summary["exact"];
        assert_eq!(exact.count, 2);
        assert!(approx(exact.mean, 0.5));
        assert_eq!(exact.pass_rate, 1.0);
    }

    #[test]
    fn test_single_success_has_zero_std_dev() {
        let items = vec![
            item(vec![ScoreResult::numeric("acc", 0.3)]),
            item(vec![ScoreResult::failed("acc", "boom")]),
        ];
        let s = compute_summary(&items)["acc"];
        assert_eq!(s.std_dev, 0.0);
        assert_eq!(s.mean, 0.3);
        assert_eq!(s.pass_rate, 0.5);
    }

    #[test]
    fn test_all_failed_is_zero_filled() {
        let items = vec![
            item(vec![ScoreResult::failed("judge", "a")]),
            item(vec![ScoreResult::failed("judge", "b")]),
        ];
        let summary = compute_summary(&items);
        assert_eq!(
            summary["judge"],
            SummaryStats { mean: 0.0, std_dev: 0.0, min: 0.0, max: 0.0, count: 2, pass_rate: 0.0 }
        );
    }

    #[test]
    fn test_errored_items_contribute_nothing() {
        let items = vec![EvaluationItem::errored("x", json!(1), None, 1, "task failed")];
        assert!(compute_summary(&items).is_empty());
    }
}
