use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use scorecard_types::{EvaluationItem, ExperimentStatus, ScoreDataType, ScoreResult};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("experiment not found: {0}")]
    ExperimentNotFound(String),
    #[error("store connection lock poisoned")]
    Poisoned,
}

/// SQLite-backed experiment store. Cloning shares the same connection.
#[derive(Debug, Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentRecord {
    pub id: String,
    pub name: String,
    pub dataset_id: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Store {
    /// Open a new store at the given path (e.g., "experiments.db")
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_URI,
        )?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| anyhow!(StoreError::Poisoned))
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.lock()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS experiments (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                dataset_id TEXT,
                metadata TEXT,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS experiment_items (
                id INTEGER PRIMARY KEY,
                experiment_id TEXT NOT NULL,
                item_id TEXT NOT NULL,
                trial_number INTEGER NOT NULL,
                input TEXT NOT NULL,
                output TEXT NOT NULL,
                expected TEXT,
                error TEXT,
                FOREIGN KEY(experiment_id) REFERENCES experiments(id)
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS item_scores (
                id INTEGER PRIMARY KEY,
                item_row_id INTEGER NOT NULL,
                name TEXT NOT NULL,
                value REAL NOT NULL,
                data_type TEXT NOT NULL,
                string_value TEXT,
                reason TEXT,
                scoring_failed BOOLEAN NOT NULL,
                metadata TEXT,
                FOREIGN KEY(item_row_id) REFERENCES experiment_items(id)
            )",
            [],
        )?;

        Ok(())
    }

    /// Create a new experiment in `running` state and return its id.
    pub fn create_experiment(
        &self,
        name: &str,
        dataset_id: Option<&str>,
        metadata: Option<&serde_json::Value>,
    ) -> Result<String> {
        let conn = self.lock()?;
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();

        conn.execute(
            "INSERT INTO experiments (id, name, dataset_id, metadata, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            params![
                id,
                name,
                dataset_id,
                metadata.map(|v| v.to_string()),
                ExperimentStatus::Running.as_str(),
                now
            ],
        )?;

        tracing::debug!(experiment_id = %id, name, "created experiment");
        Ok(id)
    }

    /// Save a batch of evaluation items in a single transaction.
    pub fn save_items(&self, experiment_id: &str, items: &[EvaluationItem]) -> Result<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let exists: Option<String> = tx
            .query_row(
                "SELECT id FROM experiments WHERE id = ?1",
                params![experiment_id],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_none() {
            return Err(StoreError::ExperimentNotFound(experiment_id.to_string()).into());
        }

        for item in items {
            tx.execute(
                "INSERT INTO experiment_items (experiment_id, item_id, trial_number, input, output, expected, error)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    experiment_id,
                    item.item_id,
                    item.trial_number,
                    item.input.to_string(),
                    item.output.to_string(),
                    item.expected.as_ref().map(|v| v.to_string()),
                    item.error
                ],
            )?;
            let item_row_id = tx.last_insert_rowid();

            for score in &item.scores {
                tx.execute(
                    "INSERT INTO item_scores (item_row_id, name, value, data_type, string_value, reason, scoring_failed, metadata)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        item_row_id,
                        score.name,
                        score.value,
                        score.data_type.as_str(),
                        score.string_value,
                        score.reason,
                        score.scoring_failed,
                        score.metadata.as_ref().map(|d| d.to_string())
                    ],
                )?;
            }
        }

        tx.commit()?;
        Ok(items.len())
    }

    pub fn set_status(&self, experiment_id: &str, status: ExperimentStatus) -> Result<()> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE experiments SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status.as_str(), Utc::now().to_rfc3339(), experiment_id],
        )?;
        if changed == 0 {
            return Err(StoreError::ExperimentNotFound(experiment_id.to_string()).into());
        }
        Ok(())
    }

    pub fn get_experiment(&self, experiment_id: &str) -> Result<Option<ExperimentRecord>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT id, name, dataset_id, metadata, status, created_at, updated_at
                 FROM experiments WHERE id = ?1",
                params![experiment_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, String>(6)?,
                    ))
                },
            )
            .optional()?;

        let Some((id, name, dataset_id, metadata, status, created_at, updated_at)) = row else {
            return Ok(None);
        };

        Ok(Some(ExperimentRecord {
            id,
            name,
            dataset_id,
            metadata: metadata.map(|m| serde_json::from_str(&m)).transpose()?,
            status,
            created_at: DateTime::parse_from_rfc3339(&created_at)?.with_timezone(&Utc),
            updated_at: DateTime::parse_from_rfc3339(&updated_at)?.with_timezone(&Utc),
        }))
    }

    /// Load every stored item for an experiment, in insertion order.
    pub fn load_items(&self, experiment_id: &str) -> Result<Vec<EvaluationItem>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, item_id, trial_number, input, output, expected, error
             FROM experiment_items WHERE experiment_id = ?1 ORDER BY id",
        )?;
        let rows = stmt
            .query_map(params![experiment_id], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, u32>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, Option<String>>(5)?,
                    row.get::<_, Option<String>>(6)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut score_stmt = conn.prepare(
            "SELECT name, value, data_type, string_value, reason, scoring_failed, metadata
             FROM item_scores WHERE item_row_id = ?1 ORDER BY id",
        )?;

        let mut items = Vec::with_capacity(rows.len());
        for (row_id, item_id, trial_number, input, output, expected, error) in rows {
            let scores = score_stmt
                .query_map(params![row_id], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, f64>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, Option<String>>(4)?,
                        row.get::<_, bool>(5)?,
                        row.get::<_, Option<String>>(6)?,
                    ))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?
                .into_iter()
                .map(
                    |(name, value, data_type, string_value, reason, scoring_failed, metadata)| -> Result<ScoreResult> {
                        Ok(ScoreResult {
                            name,
                            value,
                            data_type: parse_data_type(&data_type),
                            string_value,
                            reason,
                            scoring_failed,
                            metadata: metadata.map(|m| serde_json::from_str(&m)).transpose()?,
                        })
                    },
                )
                .collect::<Result<Vec<_>>>()?;

            items.push(EvaluationItem {
                item_id,
                input: serde_json::from_str(&input)?,
                output: serde_json::from_str(&output)?,
                expected: expected.map(|e| serde_json::from_str(&e)).transpose()?,
                scores,
                trial_number,
                error,
            });
        }
        Ok(items)
    }
}

fn parse_data_type(s: &str) -> ScoreDataType {
    match s {
        "BOOLEAN" => ScoreDataType::Boolean,
        "CATEGORICAL" => ScoreDataType::Categorical,
        _ => ScoreDataType::Numeric,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_items() -> Vec<EvaluationItem> {
        vec![
            EvaluationItem {
                item_id: "a".into(),
                input: json!("Hello"),
                output: json!("Hello World!"),
                expected: Some(json!("Hello World!")),
                scores: vec![
                    ScoreResult::boolean("exact_match", true),
                    ScoreResult::failed("judge", "timeout"),
                ],
                trial_number: 1,
                error: None,
            },
            EvaluationItem::errored("b", json!("Hi"), None, 2, "task failed"),
        ]
    }

    #[test]
    fn test_experiment_lifecycle() {
        let store = Store::open_in_memory().unwrap();
        let id = store
            .create_experiment("smoke", Some("ds-1"), Some(&json!({ "model": "gpt-4o" })))
            .unwrap();

        let record = store.get_experiment(&id).unwrap().unwrap();
        assert_eq!(record.status, "running");
        assert_eq!(record.dataset_id.as_deref(), Some("ds-1"));
        assert_eq!(record.metadata, Some(json!({ "model": "gpt-4o" })));

        assert_eq!(store.save_items(&id, &sample_items()).unwrap(), 2);
        store.set_status(&id, ExperimentStatus::Completed).unwrap();
        assert_eq!(store.get_experiment(&id).unwrap().unwrap().status, "completed");

        let loaded = store.load_items(&id).unwrap();
        assert_eq!(loaded, sample_items());
    }

    #[test]
    fn test_unknown_experiment_is_rejected() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.save_items("missing", &sample_items()).is_err());
        assert!(store.set_status("missing", ExperimentStatus::Completed).is_err());
        assert!(store.get_experiment("missing").unwrap().is_none());
    }

    #[test]
    fn test_open_on_disk_persists_across_handles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("experiments.db");
        let id = {
            let store = Store::open(&path).unwrap();
            store.create_experiment("disk", None, None).unwrap()
        };
        let reopened = Store::open(&path).unwrap();
        assert_eq!(reopened.get_experiment(&id).unwrap().unwrap().name, "disk");
    }
}
