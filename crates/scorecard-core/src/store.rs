//! Where experiment records and their evaluated items end up.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::types::{EvaluationItem, ExperimentStatus};

#[async_trait]
pub trait ExperimentStore: Send + Sync {
    /// Create an experiment record and return its id.
    async fn create_experiment(&self, name: &str, dataset_id: Option<&str>, metadata: &Value) -> Result<String>;

    /// Persist the full item batch of a run.
    async fn submit_items(&self, experiment_id: &str, items: &[EvaluationItem]) -> Result<()>;

    async fn set_status(&self, experiment_id: &str, status: ExperimentStatus) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct StoredExperiment {
    pub name: String,
    pub dataset_id: Option<String>,
    pub metadata: Value,
    pub status: ExperimentStatus,
    pub items: Vec<EvaluationItem>,
    pub created_at: DateTime<Utc>,
}

/// Keeps experiments in process memory. The default store when none is configured.
#[derive(Debug, Default)]
pub struct InMemoryExperimentStore {
    experiments: Mutex<HashMap<String, StoredExperiment>>,
}

impl InMemoryExperimentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn experiment(&self, id: &str) -> Option<StoredExperiment> {
        self.experiments.lock().ok()?.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.experiments.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn with_experiment<R>(&self, id: &str, f: impl FnOnce(&mut StoredExperiment) -> R) -> Result<R> {
        let mut experiments = self
            .experiments
            .lock()
            .map_err(|_| anyhow!("experiment store lock poisoned"))?;
        let experiment = experiments
            .get_mut(id)
            .ok_or_else(|| anyhow!("experiment not found: {id}"))?;
        Ok(f(experiment))
    }
}

#[async_trait]
impl ExperimentStore for InMemoryExperimentStore {
    async fn create_experiment(&self, name: &str, dataset_id: Option<&str>, metadata: &Value) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let experiment = StoredExperiment {
            name: name.to_string(),
            dataset_id: dataset_id.map(str::to_string),
            metadata: metadata.clone(),
            status: ExperimentStatus::Running,
            items: Vec::new(),
            created_at: Utc::now(),
        };
        self.experiments
            .lock()
            .map_err(|_| anyhow!("experiment store lock poisoned"))?
            .insert(id.clone(), experiment);
        Ok(id)
    }

    async fn submit_items(&self, experiment_id: &str, items: &[EvaluationItem]) -> Result<()> {
        self.with_experiment(experiment_id, |e| e.items.extend_from_slice(items))
    }

    async fn set_status(&self, experiment_id: &str, status: ExperimentStatus) -> Result<()> {
        self.with_experiment(experiment_id, |e| e.status = status)
    }
}

/// Talks to an experiment backend over HTTP:
///
/// - `POST {base}/experiments` with `{name, datasetId, metadata}`, answered by `{id}`
/// - `POST {base}/experiments/{id}/items` with `{items}`
/// - `PATCH {base}/experiments/{id}` with `{status}`
pub struct HttpExperimentStore {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Deserialize)]
struct CreatedExperiment {
    id: String,
}

impl HttpExperimentStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
        }
    }

    /// Send `Authorization: Bearer <key>` with every request.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let request = match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        };
        let resp = request.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("HTTP {}: {}", status.as_u16(), body);
        }
        Ok(resp)
    }
}

#[async_trait]
impl ExperimentStore for HttpExperimentStore {
    async fn create_experiment(&self, name: &str, dataset_id: Option<&str>, metadata: &Value) -> Result<String> {
        let url = format!("{}/experiments", self.base_url);
        let body = json!({ "name": name, "datasetId": dataset_id, "metadata": metadata });
        let resp = self.send(self.client.post(&url).json(&body)).await?;
        let created: CreatedExperiment = resp
            .json()
            .await
            .context("experiment backend returned an unexpected body")?;
        Ok(created.id)
    }

    async fn submit_items(&self, experiment_id: &str, items: &[EvaluationItem]) -> Result<()> {
        let url = format!("{}/experiments/{}/items", self.base_url, experiment_id);
        self.send(self.client.post(&url).json(&json!({ "items": items })))
            .await?;
        Ok(())
    }

    async fn set_status(&self, experiment_id: &str, status: ExperimentStatus) -> Result<()> {
        let url = format!("{}/experiments/{}", self.base_url, experiment_id);
        self.send(self.client.patch(&url).json(&json!({ "status": status })))
            .await?;
        Ok(())
    }
}
