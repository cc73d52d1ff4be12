//! scorecard-core: run experiments against an AI system and record the scores.
//!
//! An experiment either runs a task over dataset items (optionally several
//! trials each) or replays recorded spans through extractors. Every output is
//! scored by the configured scorers with bounded concurrency, the scores are
//! summarized per scorer, and the batch is persisted through an
//! [`ExperimentStore`]. See `examples/simple.rs` for a quickstart.

pub mod config;
pub mod datasource;
pub mod error;
pub mod executor;
pub mod extract;
pub mod normalize;
#[cfg(feature = "persistence")]
pub mod persistence;
pub mod runner;
pub mod scheduler;
pub mod scorer;
pub mod stats;
pub mod store;
pub mod task;
pub mod testing;
pub mod types;
pub mod work;

pub mod scorers {
    pub mod contains;
    pub mod exact;
    pub mod json;
    pub mod levenshtein;
    pub mod regex;
}

pub use config::ExperimentConfig;
pub use datasource::{DataSource, JsonlDataSource, JsonlSpanSource, SpanSource, VecDataSource, VecSpanSource};
pub use error::ExperimentError;
pub use extract::{extractor_fn, Extractor, PointerExtractor, SpanExtractors};
pub use normalize::ScorerOutput;
pub use runner::{Experiment, ExperimentBuilder, RunMode};
pub use scorer::{scorer_from_async_fn, scorer_from_fn, Scorer, ScorerArgs};
pub use scorers::{
    contains::ContainsScorer, exact::ExactMatchScorer, json::JsonScorer, levenshtein::LevenshteinScorer,
    regex::RegexScorer,
};
pub use store::{ExperimentStore, HttpExperimentStore, InMemoryExperimentStore};
pub use task::{from_async_fn, from_fn, Task};
pub use types::{
    DatasetItem, EvaluationItem, ExperimentResult, ExperimentStatus, ScoreDataType, ScoreResult, Source, SpanRecord,
    SummaryStats,
};
