use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

/// The system under evaluation: maps one dataset input to an output.
#[async_trait]
pub trait Task: Send + Sync {
    async fn run(&self, input: &Value) -> Result<Value>;
}

struct AsyncFnTask<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> Task for AsyncFnTask<F>
where
    F: Fn(&Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    async fn run(&self, input: &Value) -> Result<Value> {
        (self.f)(input).await
    }
}

/// Wrap an async closure as a `Task`.
pub fn from_async_fn<F, Fut>(f: F) -> Arc<dyn Task>
where
    F: Fn(&Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    Arc::new(AsyncFnTask { f })
}

struct FnTask<F> {
    f: F,
}

#[async_trait]
impl<F> Task for FnTask<F>
where
    F: Fn(&Value) -> Result<Value> + Send + Sync + 'static,
{
    async fn run(&self, input: &Value) -> Result<Value> {
        (self.f)(input)
    }
}

/// Wrap a synchronous closure as a `Task`.
pub fn from_fn<F>(f: F) -> Arc<dyn Task>
where
    F: Fn(&Value) -> Result<Value> + Send + Sync + 'static,
{
    Arc::new(FnTask { f })
}
