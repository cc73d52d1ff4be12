use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde_json::Value;

use crate::types::{DatasetItem, SpanRecord};

#[async_trait]
pub trait DataSource: Send + Sync {
    async fn load(&self) -> Result<Vec<DatasetItem>>;
}

/// Source of previously recorded spans to evaluate.
#[async_trait]
pub trait SpanSource: Send + Sync {
    async fn load(&self) -> Result<Vec<SpanRecord>>;
}

pub struct VecDataSource {
    items: Vec<DatasetItem>,
}

impl VecDataSource {
    pub fn new(items: Vec<DatasetItem>) -> Self {
        Self { items }
    }
}

#[async_trait]
impl DataSource for VecDataSource {
    async fn load(&self) -> Result<Vec<DatasetItem>> {
        Ok(self.items.clone())
    }
}

pub struct VecSpanSource {
    spans: Vec<SpanRecord>,
}

impl VecSpanSource {
    pub fn new(spans: Vec<SpanRecord>) -> Self {
        Self { spans }
    }
}

#[async_trait]
impl SpanSource for VecSpanSource {
    async fn load(&self) -> Result<Vec<SpanRecord>> {
        Ok(self.spans.clone())
    }
}

/// Read JSONL where each line is either:
/// - {"id": "...", "input": ..., "expected": ..., "metadata": ...}
/// - {"input": ...}
///
/// Lines without an id get `line-<n>` (1-based).
pub struct JsonlDataSource {
    path: PathBuf,
}

impl JsonlDataSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl DataSource for JsonlDataSource {
    async fn load(&self) -> Result<Vec<DatasetItem>> {
        let content = tokio_fs_read_to_string(&self.path).await?;
        let mut items = Vec::new();
        for (idx, line) in jsonl_lines(&content) {
            let value: Value = serde_json::from_str(line)
                .with_context(|| format!("Invalid JSON on line {}", idx + 1))?;
            let obj = value
                .as_object()
                .ok_or_else(|| anyhow!("Line {}: expected object", idx + 1))?;
            let input = obj
                .get("input")
                .cloned()
                .ok_or_else(|| anyhow!("Line {}: missing 'input'", idx + 1))?;
            let id = match obj.get("id") {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Number(n)) => n.to_string(),
                Some(_) => return Err(anyhow!("Line {}: 'id' must be a string or number", idx + 1)),
                None => format!("line-{}", idx + 1),
            };
            items.push(DatasetItem {
                id,
                input,
                expected: obj.get("expected").cloned(),
                metadata: obj.get("metadata").cloned(),
            });
        }
        tracing::debug!(path = ?self.path, count = items.len(), "loaded dataset items");
        Ok(items)
    }
}

/// Read JSONL where each line is one serialized [`SpanRecord`].
pub struct JsonlSpanSource {
    path: PathBuf,
}

impl JsonlSpanSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl SpanSource for JsonlSpanSource {
    async fn load(&self) -> Result<Vec<SpanRecord>> {
        let content = tokio_fs_read_to_string(&self.path).await?;
        let spans = jsonl_lines(&content)
            .map(|(idx, line)| {
                serde_json::from_str::<SpanRecord>(line)
                    .with_context(|| format!("Invalid span on line {}", idx + 1))
            })
            .collect::<Result<Vec<_>>>()?;
        tracing::debug!(path = ?self.path, count = spans.len(), "loaded span records");
        Ok(spans)
    }
}

fn jsonl_lines(content: &str) -> impl Iterator<Item = (usize, &str)> {
    content
        .lines()
        .enumerate()
        .map(|(idx, line)| (idx, line.trim()))
        .filter(|(_, line)| !line.is_empty())
}

#[cfg(not(feature = "sync-fs"))]
async fn tokio_fs_read_to_string(path: &PathBuf) -> Result<String> {
    use tokio::fs;
    fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {:?}", path))
}

#[cfg(feature = "sync-fs")]
async fn tokio_fs_read_to_string(path: &PathBuf) -> Result<String> {
    use std::fs;
    use tokio::task;
    let path_clone = path.clone();
    let content = task::spawn_blocking(move || {
        fs::read_to_string(&path_clone).with_context(|| format!("Failed to read {:?}", path_clone))
    })
    .await
    .map_err(|e| anyhow!(e))??;
    Ok(content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    fn write_temp(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[tokio::test]
    async fn test_jsonl_dataset_assigns_missing_ids() {
        let file = write_temp(
            r#"{"id": "q1", "input": "Hello", "expected": "Hello World!"}

{"input": "Hi"}
{"id": 7, "input": 1, "metadata": {"split": "dev"}}
"#,
        );
        let items = JsonlDataSource::new(file.path()).load().await.unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].id, "q1");
        assert_eq!(items[0].expected, Some(json!("Hello World!")));
        assert_eq!(items[1].id, "line-3");
        assert_eq!(items[1].expected, None);
        assert_eq!(items[2].id, "7");
        assert_eq!(items[2].metadata, Some(json!({"split": "dev"})));
    }

    #[tokio::test]
    async fn test_jsonl_dataset_reports_bad_line() {
        let file = write_temp("{\"input\": 1}\n{\"expected\": 2}\n");
        let err = JsonlDataSource::new(file.path()).load().await.unwrap_err();
        assert_eq!(err.to_string(), "Line 2: missing 'input'");
    }

    #[tokio::test]
    async fn test_jsonl_spans() {
        let file = write_temp(
            r#"{"id": "s1", "trace_id": "t1", "input": "a", "output": "b"}
{"id": "s2", "output": {"text": "c"}, "metadata": {"expected": "c"}}
"#,
        );
        let spans = JsonlSpanSource::new(file.path()).load().await.unwrap();
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].trace_id.as_deref(), Some("t1"));
        assert_eq!(spans[1].output, json!({"text": "c"}));
    }

    #[tokio::test]
    async fn test_jsonl_spans_require_id() {
        let file = write_temp("{\"output\": 1}\n");
        let err = JsonlSpanSource::new(file.path()).load().await.unwrap_err();
        assert!(err.to_string().contains("line 1"));
    }

    #[tokio::test]
    async fn test_missing_file() {
        let err = JsonlDataSource::new("/definitely/not/here.jsonl").load().await.unwrap_err();
        assert!(err.to_string().starts_with("Failed to read"));
    }
}
