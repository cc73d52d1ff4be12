//! Bounded concurrency scheduler.
//!
//! Every input is executed exactly once on its own tokio task. A permit from a
//! semaphore of `max_concurrency` slots is acquired before a task is spawned and
//! held until its result has been handed to the collector, so admission is
//! driven by completions rather than fixed-size batches. Results flow through a
//! channel to a single collector task, which is the only owner of the output
//! vector. Output order is completion order.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{mpsc, Semaphore};

use crate::error::{ExperimentError, Result};

pub const DEFAULT_MAX_CONCURRENCY: usize = 10;

pub async fn run_bounded<I, T, F, Fut>(inputs: Vec<I>, max_concurrency: usize, f: F) -> Result<Vec<T>>
where
    I: Send + 'static,
    T: Send + 'static,
    F: Fn(I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = T> + Send + 'static,
{
    let expected = inputs.len();
    let limit = max_concurrency.max(1);
    let semaphore = Arc::new(Semaphore::new(limit));
    let f = Arc::new(f);

    let (tx, mut rx) = mpsc::channel::<T>(limit);
    let collector = tokio::spawn(async move {
        let mut results = Vec::with_capacity(expected);
        while let Some(result) = rx.recv().await {
            results.push(result);
        }
        results
    });

    for input in inputs {
        let permit = semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ExperimentError::SchedulerClosed)?;
        let f = f.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            let result = f(input).await;
            // The collector only stops once every sender is gone.
            let _ = tx.send(result).await;
            drop(permit);
        });
    }
    drop(tx);

    let results = collector.await?;
    if results.len() != expected {
        return Err(ExperimentError::WorkerLost {
            expected,
            received: results.len(),
        });
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_every_input_runs_exactly_once() {
        let mut out = run_bounded((0..50).collect(), 4, |n: u32| async move { n * 10 })
            .await
            .unwrap();
        out.sort();
        assert_eq!(out, (0..50).map(|n| n * 10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_in_flight_never_exceeds_limit() {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (a, p) = (active.clone(), peak.clone());
        let out = run_bounded((0..20).collect::<Vec<u64>>(), 3, move |n| {
            let active = a.clone();
            let peak = p.clone();
            async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5 + n % 4)).await;
                active.fetch_sub(1, Ordering::SeqCst);
                n
            }
        })
        .await
        .unwrap();
        assert_eq!(out.len(), 20);
        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(peak.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_zero_concurrency_is_clamped_to_one() {
        let out = run_bounded(vec![1, 2, 3], 0, |n: i32| async move { n }).await.unwrap();
        assert_eq!(out.len(), 3);
    }

    #[tokio::test]
    async fn test_empty_input() {
        let out: Vec<i32> = run_bounded(Vec::<i32>::new(), 4, |n| async move { n }).await.unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_panicking_worker_is_reported_as_lost() {
        let err = run_bounded(vec![1, 2, 3], 2, |n: i32| async move {
            if n == 2 {
                panic!("worker blew up");
            }
            n
        })
        .await
        .unwrap_err();
        assert!(matches!(err, ExperimentError::WorkerLost { expected: 3, received: 2 }));
    }
}
