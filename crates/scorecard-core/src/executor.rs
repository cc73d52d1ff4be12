use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use futures::FutureExt;
use serde_json::Value;
use tracing::Instrument;

use crate::error::panic_message;
use crate::extract::{Extractor, SpanExtractors};
use crate::scorer::{run_scorer, Scorer, ScorerArgs};
use crate::task::Task;
use crate::types::{DatasetItem, EvaluationItem, SpanRecord};
use crate::work::{ItemRef, WorkItem};

/// Called after every finished work item with `(completed, total)`.
pub type ProgressFn = Arc<dyn Fn(usize, usize) + Send + Sync>;

/// How an item's output is obtained.
#[derive(Clone)]
pub enum Step {
    Task(Arc<dyn Task>),
    Extract(SpanExtractors),
}

pub struct Progress {
    completed: AtomicUsize,
    total: usize,
    callback: Option<ProgressFn>,
}

impl Progress {
    pub fn new(total: usize, callback: Option<ProgressFn>) -> Self {
        Self {
            completed: AtomicUsize::new(0),
            total,
            callback,
        }
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    fn tick(&self) {
        let done = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!(completed = done, total = self.total, "item finished");
        if let Some(callback) = &self.callback {
            if std::panic::catch_unwind(AssertUnwindSafe(|| callback(done, self.total))).is_err() {
                tracing::warn!("progress callback panicked");
            }
        }
    }
}

/// Runs the task or extraction step for one work item, then every scorer in order.
pub struct ItemExecutor {
    step: Step,
    scorers: Vec<Arc<dyn Scorer>>,
    progress: Progress,
}

impl ItemExecutor {
    pub fn new(step: Step, scorers: Vec<Arc<dyn Scorer>>, progress: Progress) -> Self {
        Self { step, scorers, progress }
    }

    pub fn progress(&self) -> &Progress {
        &self.progress
    }

    pub async fn execute(&self, work: WorkItem) -> EvaluationItem {
        let span = tracing::debug_span!("evaluate_item", item_id = %work.item.id(), trial = work.trial_number);
        let item = self.execute_inner(work).instrument(span).await;
        self.progress.tick();
        item
    }

    async fn execute_inner(&self, work: WorkItem) -> EvaluationItem {
        let trial = work.trial_number;
        match (&self.step, work.item) {
            (Step::Task(task), ItemRef::Dataset(item)) => self.run_task(task.as_ref(), &item, trial).await,
            (Step::Extract(extractors), ItemRef::Span(span)) => self.run_extract(extractors, &span).await,
            (_, item) => EvaluationItem::errored(
                item.id(),
                Value::Null,
                None,
                trial,
                "work item does not match the run mode",
            ),
        }
    }

    async fn run_task(&self, task: &dyn Task, item: &DatasetItem, trial: u32) -> EvaluationItem {
        let outcome = match AssertUnwindSafe(task.run(&item.input)).catch_unwind().await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(err)) => Err(format!("{err:#}")),
            Err(payload) => Err(panic_message(payload.as_ref())),
        };
        match outcome {
            Ok(output) => {
                self.score(item.id.clone(), item.input.clone(), output, item.expected.clone(), trial)
                    .await
            }
            Err(error) => {
                tracing::warn!(item_id = %item.id, trial, %error, "task failed");
                EvaluationItem::errored(item.id.clone(), item.input.clone(), item.expected.clone(), trial, error)
            }
        }
    }

    async fn run_extract(&self, extractors: &SpanExtractors, span: &SpanRecord) -> EvaluationItem {
        let extracted = async {
            let input = extract_field("input", extractors.input.as_ref(), span).await?;
            let output = extract_field("output", extractors.output.as_ref(), span).await?;
            let expected = match &extractors.expected {
                Some(ex) => Some(extract_field("expected", ex.as_ref(), span).await?),
                None => None,
            };
            Ok::<_, anyhow::Error>((input, output, expected))
        }
        .await;

        match extracted {
            Ok((input, output, expected)) => self.score(span.id.clone(), input, output, expected, 1).await,
            Err(err) => {
                let error = format!("{err:#}");
                tracing::warn!(span_id = %span.id, %error, "extraction failed");
                EvaluationItem::errored(span.id.clone(), span.input.clone(), None, 1, error)
            }
        }
    }

    async fn score(
        &self,
        item_id: String,
        input: Value,
        output: Value,
        expected: Option<Value>,
        trial_number: u32,
    ) -> EvaluationItem {
        let args = ScorerArgs { output, expected, input };
        let mut scores = Vec::with_capacity(self.scorers.len());
        for scorer in &self.scorers {
            scores.extend(run_scorer(scorer.as_ref(), &args).await);
        }
        let ScorerArgs { output, expected, input } = args;
        EvaluationItem {
            item_id,
            input,
            output,
            expected,
            scores,
            trial_number,
            error: None,
        }
    }
}

async fn extract_field(field: &str, extractor: &dyn Extractor, span: &SpanRecord) -> Result<Value> {
    match AssertUnwindSafe(extractor.extract(span)).catch_unwind().await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(err.context(format!("failed to extract {field} from span {}", span.id))),
        Err(payload) => Err(anyhow::anyhow!(
            "failed to extract {field} from span {}: {}",
            span.id,
            panic_message(payload.as_ref())
        )),
    }
}
