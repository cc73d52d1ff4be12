//! Errors surfaced by [`Experiment::run`](crate::Experiment::run) and the builder.
//!
//! Task, extraction and scorer failures never show up here: they are recorded
//! on the affected evaluation item instead.

use std::any::Any;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExperimentError {
    /// Both or neither of dataset and span inputs were configured.
    #[error("invalid run mode: {0}")]
    InvalidRunMode(&'static str),

    #[error("dataset mode requires a task")]
    MissingTask,

    #[error("span mode requires an {0} extractor")]
    MissingExtractor(&'static str),

    #[error("trial count must be at least 1")]
    InvalidTrialCount,

    #[error("experiment name must not be empty")]
    MissingName,

    #[error("failed to load {kind}: {error:#}")]
    Load { kind: &'static str, error: anyhow::Error },

    /// Creating, submitting or finalizing the remote experiment failed.
    #[error("experiment persistence failed during {stage}: {error:#}")]
    Persistence { stage: &'static str, error: anyhow::Error },

    #[error("scheduler lost {} of {expected} work items", .expected - .received)]
    WorkerLost { expected: usize, received: usize },

    #[error("scheduler closed before all work was admitted")]
    SchedulerClosed,

    #[error("result collector failed: {0}")]
    Collector(#[from] tokio::task::JoinError),
}

impl ExperimentError {
    /// True for errors raised before any work was dispatched.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ExperimentError::InvalidRunMode(_)
                | ExperimentError::MissingTask
                | ExperimentError::MissingExtractor(_)
                | ExperimentError::InvalidTrialCount
                | ExperimentError::MissingName
        )
    }

    pub(crate) fn persistence(stage: &'static str, error: anyhow::Error) -> Self {
        ExperimentError::Persistence { stage, error }
    }
}

pub type Result<T, E = ExperimentError> = std::result::Result<T, E>;

/// Best-effort text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}
