//! Extractors pull the input, output and expected values out of a recorded
//! span so it can be scored like a freshly executed task.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::Value;

use crate::types::SpanRecord;

#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, span: &SpanRecord) -> Result<Value>;
}

/// The extractors a span-mode run needs. Input and output are mandatory.
#[derive(Clone)]
pub struct SpanExtractors {
    pub input: Arc<dyn Extractor>,
    pub output: Arc<dyn Extractor>,
    pub expected: Option<Arc<dyn Extractor>>,
}

struct FnExtractor<F> {
    f: F,
}

#[async_trait]
impl<F> Extractor for FnExtractor<F>
where
    F: Fn(&SpanRecord) -> Result<Value> + Send + Sync + 'static,
{
    async fn extract(&self, span: &SpanRecord) -> Result<Value> {
        (self.f)(span)
    }
}

/// Wrap a closure as an `Extractor`.
pub fn extractor_fn<F>(f: F) -> Arc<dyn Extractor>
where
    F: Fn(&SpanRecord) -> Result<Value> + Send + Sync + 'static,
{
    Arc::new(FnExtractor { f })
}

/// Reads a value out of the span's JSON form by RFC 6901 pointer,
/// e.g. `/output`, `/metadata/expected` or `/input/messages/0/content`.
#[derive(Debug, Clone)]
pub struct PointerExtractor {
    pointer: String,
    allow_missing: bool,
}

impl PointerExtractor {
    /// A missing value is an extraction error.
    pub fn new(pointer: impl Into<String>) -> Self {
        Self {
            pointer: pointer.into(),
            allow_missing: false,
        }
    }

    /// A missing value extracts as `null`.
    pub fn optional(pointer: impl Into<String>) -> Self {
        Self {
            pointer: pointer.into(),
            allow_missing: true,
        }
    }

    pub fn pointer(&self) -> &str {
        &self.pointer
    }
}

#[async_trait]
impl Extractor for PointerExtractor {
    async fn extract(&self, span: &SpanRecord) -> Result<Value> {
        let doc = serde_json::to_value(span)?;
        match doc.pointer(&self.pointer) {
            Some(v) => Ok(v.clone()),
            None if self.allow_missing => Ok(Value::Null),
            None => Err(anyhow!("no value at {} in span {}", self.pointer, span.id)),
        }
    }
}
