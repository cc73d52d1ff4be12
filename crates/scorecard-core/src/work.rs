use std::sync::Arc;

use crate::types::{DatasetItem, SpanRecord};

/// What a work item points at.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemRef {
    Dataset(Arc<DatasetItem>),
    Span(Arc<SpanRecord>),
}

impl ItemRef {
    pub fn id(&self) -> &str {
        match self {
            ItemRef::Dataset(item) => &item.id,
            ItemRef::Span(span) => &span.id,
        }
    }
}

/// One scheduled unit of evaluation work. Trial numbers start at 1.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkItem {
    pub item: ItemRef,
    pub trial_number: u32,
}

/// Cross product of items and trials, item order first then trial order.
pub fn expand_dataset(items: Vec<DatasetItem>, trial_count: u32) -> Vec<WorkItem> {
    let mut work = Vec::with_capacity(items.len() * trial_count as usize);
    for item in items {
        let item = Arc::new(item);
        for trial_number in 1..=trial_count {
            work.push(WorkItem {
                item: ItemRef::Dataset(item.clone()),
                trial_number,
            });
        }
    }
    work
}

/// One work item per recorded span; recorded data is never re-run.
pub fn expand_spans(spans: Vec<SpanRecord>) -> Vec<WorkItem> {
    spans
        .into_iter()
        .map(|span| WorkItem {
            item: ItemRef::Span(Arc::new(span)),
            trial_number: 1,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_dataset_cross_product_order() {
        let items = vec![
            DatasetItem::new("a", json!(1)),
            DatasetItem::new("b", json!(2)),
            DatasetItem::new("c", json!(3)),
        ];
        let work = expand_dataset(items, 2);
        let order: Vec<(String, u32)> = work
            .iter()
            .map(|w| (w.item.id().to_string(), w.trial_number))
            .collect();
        assert_eq!(
            order,
            vec![
                ("a".into(), 1),
                ("a".into(), 2),
                ("b".into(), 1),
                ("b".into(), 2),
                ("c".into(), 1),
                ("c".into(), 2),
            ]
        );
    }

    #[test]
    fn test_trials_share_the_item() {
        let work = expand_dataset(vec![DatasetItem::new("a", json!(1))], 3);
        let (ItemRef::Dataset(first), ItemRef::Dataset(last)) = (&work[0].item, &work[2].item) else {
            panic!("expected dataset refs");
        };
        assert!(Arc::ptr_eq(first, last));
    }

    #[test]
    fn test_spans_get_single_trial() {
        let spans = vec![
            SpanRecord::start_now("s1").finish(json!("q"), json!("a"), None),
            SpanRecord::start_now("s2").finish(json!("q"), json!("b"), None),
        ];
        let work = expand_spans(spans);
        assert_eq!(work.len(), 2);
        assert!(work.iter().all(|w| w.trial_number == 1));
        assert_eq!(work[1].item.id(), "s2");
    }

    #[test]
    fn test_empty_inputs() {
        assert!(expand_dataset(Vec::new(), 5).is_empty());
        assert!(expand_spans(Vec::new()).is_empty());
    }
}
