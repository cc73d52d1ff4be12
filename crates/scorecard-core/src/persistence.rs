//! [`ExperimentStore`] backed by the SQLite store crate.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use scorecard_store::Store;
use serde_json::Value;

use crate::store::ExperimentStore;
use crate::types::{EvaluationItem, ExperimentStatus};

/// rusqlite is blocking; run each call on the blocking pool.
async fn blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| anyhow!(e))?
}

#[async_trait]
impl ExperimentStore for Store {
    async fn create_experiment(&self, name: &str, dataset_id: Option<&str>, metadata: &Value) -> Result<String> {
        let store = self.clone();
        let name = name.to_string();
        let dataset_id = dataset_id.map(str::to_string);
        let metadata = metadata.clone();
        blocking(move || store.create_experiment(&name, dataset_id.as_deref(), Some(&metadata))).await
    }

    async fn submit_items(&self, experiment_id: &str, items: &[EvaluationItem]) -> Result<()> {
        let store = self.clone();
        let experiment_id = experiment_id.to_string();
        let items = items.to_vec();
        blocking(move || store.save_items(&experiment_id, &items).map(|_| ())).await
    }

    async fn set_status(&self, experiment_id: &str, status: ExperimentStatus) -> Result<()> {
        let store = self.clone();
        let experiment_id = experiment_id.to_string();
        blocking(move || store.set_status(&experiment_id, status)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_sqlite_store_through_trait() {
        let store = Store::open_in_memory().unwrap();
        let dyn_store: &dyn ExperimentStore = &store;
        let id = dyn_store
            .create_experiment("sqlite", None, &json!({ "k": "v" }))
            .await
            .unwrap();
        let items = vec![EvaluationItem::errored("a", json!(1), None, 1, "boom")];
        dyn_store.submit_items(&id, &items).await.unwrap();
        dyn_store.set_status(&id, ExperimentStatus::Completed).await.unwrap();

        assert_eq!(store.get_experiment(&id).unwrap().unwrap().status, "completed");
        assert_eq!(store.load_items(&id).unwrap(), items);
    }
}
