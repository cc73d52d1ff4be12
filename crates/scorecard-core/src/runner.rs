use std::sync::Arc;

use serde_json::{json, Value};

use crate::datasource::{DataSource, SpanSource, VecDataSource, VecSpanSource};
use crate::error::{ExperimentError, Result};
use crate::executor::{ItemExecutor, Progress, ProgressFn, Step};
use crate::extract::{Extractor, SpanExtractors};
use crate::scheduler::{run_bounded, DEFAULT_MAX_CONCURRENCY};
use crate::scorer::Scorer;
use crate::stats::compute_summary;
use crate::store::{ExperimentStore, InMemoryExperimentStore};
use crate::task::Task;
use crate::types::{DatasetItem, ExperimentResult, ExperimentStatus, Source, SpanRecord};
use crate::work::{expand_dataset, expand_spans, WorkItem};

/// What a run evaluates. Exactly one mode per experiment.
#[derive(Clone)]
pub enum RunMode {
    Dataset {
        source: Arc<dyn DataSource>,
        task: Arc<dyn Task>,
        trial_count: u32,
    },
    Spans {
        source: Arc<dyn SpanSource>,
        extractors: SpanExtractors,
    },
}

impl RunMode {
    pub fn source(&self) -> Source {
        match self {
            RunMode::Dataset { .. } => Source::Dataset,
            RunMode::Spans { .. } => Source::Spans,
        }
    }
}

pub struct ExperimentBuilder {
    name: String,
    description: Option<String>,
    metadata: Option<Value>,
    dataset_id: Option<String>,
    dataset: Option<Arc<dyn DataSource>>,
    task: Option<Arc<dyn Task>>,
    trial_count: u32,
    spans: Option<Arc<dyn SpanSource>>,
    extract_input: Option<Arc<dyn Extractor>>,
    extract_output: Option<Arc<dyn Extractor>>,
    extract_expected: Option<Arc<dyn Extractor>>,
    scorers: Vec<Arc<dyn Scorer>>,
    max_concurrency: usize,
    store: Option<Arc<dyn ExperimentStore>>,
    on_progress: Option<ProgressFn>,
}

impl ExperimentBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            metadata: None,
            dataset_id: None,
            dataset: None,
            task: None,
            trial_count: 1,
            spans: None,
            extract_input: None,
            extract_output: None,
            extract_expected: None,
            scorers: Vec::new(),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            store: None,
            on_progress: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Free-form metadata attached to the remote experiment record.
    pub fn metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn dataset_id(mut self, dataset_id: impl Into<String>) -> Self {
        self.dataset_id = Some(dataset_id.into());
        self
    }

    pub fn dataset(mut self, source: Arc<dyn DataSource>) -> Self {
        self.dataset = Some(source);
        self
    }

    pub fn dataset_items(self, items: Vec<DatasetItem>) -> Self {
        self.dataset(Arc::new(VecDataSource::new(items)))
    }

    pub fn task(mut self, task: Arc<dyn Task>) -> Self {
        self.task = Some(task);
        self
    }

    /// Number of times every dataset item is run. Ignored in span mode.
    pub fn trial_count(mut self, n: u32) -> Self {
        self.trial_count = n;
        self
    }

    pub fn spans(mut self, source: Arc<dyn SpanSource>) -> Self {
        self.spans = Some(source);
        self
    }

    pub fn span_records(self, spans: Vec<SpanRecord>) -> Self {
        self.spans(Arc::new(VecSpanSource::new(spans)))
    }

    pub fn extract_input(mut self, extractor: Arc<dyn Extractor>) -> Self {
        self.extract_input = Some(extractor);
        self
    }

    pub fn extract_output(mut self, extractor: Arc<dyn Extractor>) -> Self {
        self.extract_output = Some(extractor);
        self
    }

    pub fn extract_expected(mut self, extractor: Arc<dyn Extractor>) -> Self {
        self.extract_expected = Some(extractor);
        self
    }

    pub fn scorers<I>(mut self, scorers: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn Scorer>>,
    {
        self.scorers = scorers.into_iter().collect();
        self
    }

    pub fn add_scorer(mut self, scorer: Arc<dyn Scorer>) -> Self {
        self.scorers.push(scorer);
        self
    }

    pub fn max_concurrency(mut self, n: usize) -> Self {
        self.max_concurrency = n.max(1);
        self
    }

    /// Defaults to an [`InMemoryExperimentStore`].
    pub fn store(mut self, store: Arc<dyn ExperimentStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn on_progress<F>(mut self, f: F) -> Self
    where
        F: Fn(usize, usize) + Send + Sync + 'static,
    {
        self.on_progress = Some(Arc::new(f));
        self
    }

    /// Validate the configuration. Nothing is loaded or sent anywhere yet.
    pub fn build(self) -> Result<Experiment> {
        if self.name.trim().is_empty() {
            return Err(ExperimentError::MissingName);
        }

        let span_mode_configured = self.spans.is_some()
            || self.extract_input.is_some()
            || self.extract_output.is_some()
            || self.extract_expected.is_some();

        let mode = match (self.dataset, span_mode_configured) {
            (Some(_), true) => {
                return Err(ExperimentError::InvalidRunMode(
                    "dataset and spans are mutually exclusive",
                ))
            }
            (None, false) => {
                return Err(ExperimentError::InvalidRunMode("one of dataset or spans is required"))
            }
            (Some(source), false) => {
                let task = self.task.ok_or(ExperimentError::MissingTask)?;
                if self.trial_count == 0 {
                    return Err(ExperimentError::InvalidTrialCount);
                }
                RunMode::Dataset { source, task, trial_count: self.trial_count }
            }
            (None, true) => {
                let source = self
                    .spans
                    .ok_or(ExperimentError::InvalidRunMode("extractors were given without spans"))?;
                if self.task.is_some() {
                    return Err(ExperimentError::InvalidRunMode("a task cannot be used in span mode"));
                }
                let input = self.extract_input.ok_or(ExperimentError::MissingExtractor("input"))?;
                let output = self.extract_output.ok_or(ExperimentError::MissingExtractor("output"))?;
                if self.trial_count != 1 {
                    tracing::warn!(trial_count = self.trial_count, "trial count is fixed at 1 in span mode");
                }
                RunMode::Spans {
                    source,
                    extractors: SpanExtractors { input, output, expected: self.extract_expected },
                }
            }
        };

        Ok(Experiment {
            name: self.name,
            description: self.description,
            metadata: self.metadata,
            dataset_id: self.dataset_id,
            mode,
            scorers: self.scorers,
            max_concurrency: self.max_concurrency,
            store: self.store.unwrap_or_else(|| Arc::new(InMemoryExperimentStore::new())),
            on_progress: self.on_progress,
        })
    }
}

/// A validated experiment, ready to run.
pub struct Experiment {
    name: String,
    description: Option<String>,
    metadata: Option<Value>,
    dataset_id: Option<String>,
    mode: RunMode,
    scorers: Vec<Arc<dyn Scorer>>,
    max_concurrency: usize,
    store: Arc<dyn ExperimentStore>,
    on_progress: Option<ProgressFn>,
}

impl Experiment {
    pub fn builder(name: impl Into<String>) -> ExperimentBuilder {
        ExperimentBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mode(&self) -> &RunMode {
        &self.mode
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Load inputs, evaluate every work item, aggregate, then persist the
    /// whole batch and mark the experiment completed.
    ///
    /// Item-level failures are recorded on the items. Only loading and
    /// persistence failures make the run itself fail, and a failed submission
    /// discards the computed results along with the error.
    pub async fn run(&self) -> Result<ExperimentResult> {
        let source = self.mode.source();
        let (work, step) = self.prepare().await?;
        let total = work.len();

        if total == 0 {
            tracing::info!(experiment = %self.name, "no items to evaluate");
            return Ok(ExperimentResult {
                experiment_id: None,
                experiment_name: self.name.clone(),
                source,
                summary: Default::default(),
                items: Vec::new(),
            });
        }

        let experiment_id = self
            .store
            .create_experiment(&self.name, self.dataset_id.as_deref(), &self.record_metadata(total))
            .await
            .map_err(|e| ExperimentError::persistence("create_experiment", e))?;
        tracing::info!(
            experiment = %self.name,
            %experiment_id,
            source = source.as_str(),
            total,
            max_concurrency = self.max_concurrency,
            "experiment running"
        );

        let executor = Arc::new(ItemExecutor::new(
            step,
            self.scorers.clone(),
            Progress::new(total, self.on_progress.clone()),
        ));
        let items = run_bounded(work, self.max_concurrency, move |w| {
            let executor = executor.clone();
            async move { executor.execute(w).await }
        })
        .await?;

        tracing::debug!(%experiment_id, "aggregating scores");
        let summary = compute_summary(&items);

        tracing::debug!(%experiment_id, count = items.len(), "submitting items");
        self.store
            .submit_items(&experiment_id, &items)
            .await
            .map_err(|e| ExperimentError::persistence("submit_items", e))?;
        self.store
            .set_status(&experiment_id, ExperimentStatus::Completed)
            .await
            .map_err(|e| ExperimentError::persistence("set_status", e))?;

        let errors = items.iter().filter(|i| i.is_error()).count();
        tracing::info!(%experiment_id, items = items.len(), errors, "experiment completed");

        Ok(ExperimentResult {
            experiment_id: Some(experiment_id),
            experiment_name: self.name.clone(),
            source,
            summary,
            items,
        })
    }

    async fn prepare(&self) -> Result<(Vec<WorkItem>, Step)> {
        match &self.mode {
            RunMode::Dataset { source, task, trial_count } => {
                let items = source
                    .load()
                    .await
                    .map_err(|error| ExperimentError::Load { kind: "dataset", error })?;
                Ok((expand_dataset(items, *trial_count), Step::Task(task.clone())))
            }
            RunMode::Spans { source, extractors } => {
                let spans = source
                    .load()
                    .await
                    .map_err(|error| ExperimentError::Load { kind: "spans", error })?;
                Ok((expand_spans(spans), Step::Extract(extractors.clone())))
            }
        }
    }

    fn record_metadata(&self, total: usize) -> Value {
        let trial_count = match &self.mode {
            RunMode::Dataset { trial_count, .. } => *trial_count,
            RunMode::Spans { .. } => 1,
        };
        let scorers: Vec<&str> = self.scorers.iter().map(|s| s.name()).collect();
        json!({
            "description": self.description,
            "source": self.mode.source(),
            "trialCount": trial_count,
            "itemCount": total,
            "maxConcurrency": self.max_concurrency,
            "scorers": scorers,
            "startedAt": chrono::Utc::now().to_rfc3339(),
            "user": self.metadata,
        })
    }
}
