//! Experiment definitions loaded from YAML or JSON files.
//!
//! ```yaml
//! name: capitals
//! source:
//!   mode: dataset
//!   path: data/capitals.jsonl
//!   task: { type: http, url: "http://localhost:8080/answer" }
//!   trial_count: 3
//! scorers:
//!   - type: exact
//!   - type: levenshtein
//!     threshold: 0.8
//! store:
//!   type: sqlite
//!   path: experiments.db
//! ```
//!
//! Relative paths are resolved against the directory of the config file.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::extract::{Extractor, PointerExtractor, SpanExtractors};
use crate::scheduler::DEFAULT_MAX_CONCURRENCY;
use crate::scorer::Scorer;
use crate::scorers::{
    contains::ContainsScorer, exact::ExactMatchScorer, json::JsonScorer, levenshtein::LevenshteinScorer,
    regex::RegexScorer,
};
use crate::store::{ExperimentStore, HttpExperimentStore, InMemoryExperimentStore};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentConfig {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub metadata: Option<Value>,
    #[serde(default)]
    pub dataset_id: Option<String>,
    pub source: SourceConfig,
    #[serde(default)]
    pub scorers: Vec<ScorerConfig>,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default)]
    pub store: StoreConfig,
}

fn default_max_concurrency() -> usize {
    DEFAULT_MAX_CONCURRENCY
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode")]
#[serde(rename_all = "snake_case")]
pub enum SourceConfig {
    Dataset {
        path: PathBuf,
        task: TaskConfig,
        #[serde(default = "default_trial_count")]
        trial_count: u32,
    },
    Spans {
        path: PathBuf,
        extract: ExtractConfig,
    },
}

fn default_trial_count() -> u32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
pub enum TaskConfig {
    Http {
        url: String,
        #[serde(default = "default_http_method")]
        method: String,
    },
    /// Returns the input unchanged.
    Echo,
}

fn default_http_method() -> String {
    "POST".to_string()
}

/// JSON pointers into the serialized span record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractConfig {
    #[serde(default = "default_input_pointer")]
    pub input: String,
    #[serde(default = "default_output_pointer")]
    pub output: String,
    #[serde(default)]
    pub expected: Option<String>,
}

fn default_input_pointer() -> String {
    "/input".to_string()
}

fn default_output_pointer() -> String {
    "/output".to_string()
}

impl ExtractConfig {
    pub fn build(&self) -> SpanExtractors {
        SpanExtractors {
            input: Arc::new(PointerExtractor::new(&self.input)),
            output: Arc::new(PointerExtractor::new(&self.output)),
            expected: self
                .expected
                .as_ref()
                .map(|p| Arc::new(PointerExtractor::new(p)) as Arc<dyn Extractor>),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
pub enum ScorerConfig {
    Exact,
    Levenshtein {
        threshold: f64,
    },
    Contains {
        substring: String,
        #[serde(default)]
        case_sensitive: bool,
    },
    Regex {
        pattern: String,
    },
    Json,
    JsonStrict,
    JsonSchema {
        path: PathBuf,
    },
}

impl ScorerConfig {
    pub async fn build(&self) -> Result<Arc<dyn Scorer>> {
        let scorer: Arc<dyn Scorer> = match self {
            ScorerConfig::Exact => Arc::new(ExactMatchScorer),
            ScorerConfig::Levenshtein { threshold } => Arc::new(LevenshteinScorer::new(*threshold)),
            ScorerConfig::Contains { substring, case_sensitive: true } => {
                Arc::new(ContainsScorer::new(substring.clone()))
            }
            ScorerConfig::Contains { substring, case_sensitive: false } => {
                Arc::new(ContainsScorer::case_insensitive(substring.clone()))
            }
            ScorerConfig::Regex { pattern } => Arc::new(RegexScorer::new(pattern)?),
            ScorerConfig::Json => Arc::new(JsonScorer::new()),
            ScorerConfig::JsonStrict => Arc::new(JsonScorer::strict()),
            ScorerConfig::JsonSchema { path } => {
                let content = tokio::fs::read_to_string(path)
                    .await
                    .with_context(|| format!("failed to read schema {}", path.display()))?;
                let schema: Value = serde_json::from_str(&content)?;
                Arc::new(JsonScorer::with_schema(schema)?)
            }
        };
        Ok(scorer)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
pub enum StoreConfig {
    #[default]
    Memory,
    Http {
        base_url: String,
        /// Name of the environment variable holding the bearer token.
        #[serde(default)]
        api_key_env: Option<String>,
    },
    Sqlite {
        path: PathBuf,
    },
}

impl StoreConfig {
    pub fn build(&self) -> Result<Arc<dyn ExperimentStore>> {
        match self {
            StoreConfig::Memory => Ok(Arc::new(InMemoryExperimentStore::new())),
            StoreConfig::Http { base_url, api_key_env } => {
                let mut store = HttpExperimentStore::new(base_url.clone());
                if let Some(var) = api_key_env {
                    let key = std::env::var(var).with_context(|| format!("environment variable {var} is not set"))?;
                    store = store.api_key(key);
                }
                Ok(Arc::new(store))
            }
            #[cfg(feature = "persistence")]
            StoreConfig::Sqlite { path } => Ok(Arc::new(scorecard_store::Store::open(path)?)),
            #[cfg(not(feature = "persistence"))]
            StoreConfig::Sqlite { .. } => {
                anyhow::bail!("the sqlite store requires the `persistence` feature")
            }
        }
    }
}

impl ExperimentConfig {
    /// Load a config file, YAML unless the extension is `.json`.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let mut config = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str::<Self>(&content)
                .with_context(|| format!("invalid config {}", path.display()))?,
            _ => Self::from_yaml_str(&content).with_context(|| format!("invalid config {}", path.display()))?,
        };
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        Ok(config)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Make every relative path in the config relative to `base`.
    pub fn resolve_paths(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        match &mut self.source {
            SourceConfig::Dataset { path, .. } | SourceConfig::Spans { path, .. } => resolve(path),
        }
        for scorer in &mut self.scorers {
            if let ScorerConfig::JsonSchema { path } = scorer {
                resolve(path);
            }
        }
        if let StoreConfig::Sqlite { path } = &mut self.store {
            resolve(path);
        }
    }

    pub async fn build_scorers(&self) -> Result<Vec<Arc<dyn Scorer>>> {
        let mut scorers = Vec::with_capacity(self.scorers.len());
        for config in &self.scorers {
            scorers.push(config.build().await?);
        }
        Ok(scorers)
    }
}
