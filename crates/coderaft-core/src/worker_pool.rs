//! Parallel Execution Fabric: bounded-concurrency worker pool
//!
//! Runs a batch of independent tasks with a concurrency cap and a per-task
//! timeout, preserving declared task order in the result vector regardless
//! of completion order. `execute_batches` runs named batches sequentially,
//! but the tasks within each batch concurrently.

use futures::future::BoxFuture;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// A task's own failure, distinct from engine/crate errors — the pool
/// reports it without aborting sibling tasks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskError(pub String);

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for TaskError {}

/// Outcome of a single task.
pub type TaskOutcome<T> = std::result::Result<T, TaskError>;

/// A boxed, owned async task.
pub type Task<T> = BoxFuture<'static, TaskOutcome<T>>;

/// A named collection of tasks executed concurrently as a unit.
pub struct Batch<T> {
    /// Batch name, used only for logging by callers.
    pub name: String,
    /// The tasks, in declared order.
    pub tasks: Vec<Task<T>>,
}

impl<T> Batch<T> {
    /// Construct a named batch.
    pub fn new(name: impl Into<String>, tasks: Vec<Task<T>>) -> Self {
        Self {
            name: name.into(),
            tasks,
        }
    }
}

/// Bounded-concurrency pool with a fixed per-task timeout.
pub struct WorkerPool {
    concurrency: usize,
    task_timeout: Duration,
}

impl WorkerPool {
    /// Create a pool allowing up to `concurrency` tasks in flight at once,
    /// each bounded by `task_timeout`.
    pub fn new(concurrency: usize, task_timeout: Duration) -> Self {
        Self {
            concurrency: concurrency.max(1),
            task_timeout,
        }
    }

    /// Run `tasks` concurrently (bounded by this pool's cap), returning
    /// outcomes in the same order the tasks were declared.
    pub async fn execute_batch<T>(&self, tasks: Vec<Task<T>>) -> Vec<TaskOutcome<T>>
    where
        T: Send + 'static,
    {
        let len = tasks.len();
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut set = JoinSet::new();

        for (index, task) in tasks.into_iter().enumerate() {
            let sem = semaphore.clone();
            let timeout = self.task_timeout;
            set.spawn(async move {
                let _permit = sem
                    .acquire_owned()
                    .await
                    .expect("worker pool semaphore never closes");
                let outcome = match tokio::time::timeout(timeout, task).await {
                    Ok(result) => result,
                    Err(_) => Err(TaskError("task timed out".to_string())),
                };
                (index, outcome)
            });
        }

        let mut results: Vec<Option<TaskOutcome<T>>> = (0..len).map(|_| None).collect();
        while let Some(joined) = set.join_next().await {
            let (index, outcome) = joined.expect("worker pool task panicked");
            results[index] = Some(outcome);
        }

        results
            .into_iter()
            .map(|o| o.expect("every index was populated"))
            .collect()
    }

    /// Run `batches` sequentially in declared order; within each batch,
    /// tasks run concurrently per `execute_batch`.
    pub async fn execute_batches<T>(&self, batches: Vec<Batch<T>>) -> Vec<Vec<TaskOutcome<T>>>
    where
        T: Send + 'static,
    {
        let mut results = Vec::with_capacity(batches.len());
        for batch in batches {
            results.push(self.execute_batch(batch.tasks).await);
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn boxed<T: Send + 'static>(
        fut: impl std::future::Future<Output = TaskOutcome<T>> + Send + 'static,
    ) -> Task<T> {
        Box::pin(fut)
    }

    #[tokio::test]
    async fn test_preserves_declared_order_regardless_of_completion_order() {
        let pool = WorkerPool::new(4, Duration::from_secs(1));
        let tasks: Vec<Task<u32>> = vec![
            boxed(async {
                tokio::time::sleep(Duration::from_millis(30)).await;
                Ok(1)
            }),
            boxed(async {
                tokio::time::sleep(Duration::from_millis(5)).await;
                Ok(2)
            }),
            boxed(async {
                tokio::time::sleep(Duration::from_millis(15)).await;
                Ok(3)
            }),
        ];

        let results = pool.execute_batch(tasks).await;
        assert_eq!(results, vec![Ok(1), Ok(2), Ok(3)]);
    }

    #[tokio::test]
    async fn test_timeout_reports_failure_without_aborting_siblings() {
        let pool = WorkerPool::new(2, Duration::from_millis(20));
        let tasks: Vec<Task<u32>> = vec![
            boxed(async {
                tokio::time::sleep(Duration::from_millis(100)).await;
                Ok(1)
            }),
            boxed(async { Ok(2) }),
        ];

        let results = pool.execute_batch(tasks).await;
        assert!(results[0].is_err());
        assert_eq!(results[1], Ok(2));
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let pool = WorkerPool::new(2, Duration::from_secs(1));
        let active = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<Task<()>> = (0..6)
            .map(|_| {
                let active = active.clone();
                let max_seen = max_seen.clone();
                boxed(async move {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    max_seen.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                })
            })
            .collect();

        pool.execute_batch(tasks).await;
        assert!(max_seen.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_execute_batches_runs_sequentially() {
        let pool = WorkerPool::new(4, Duration::from_secs(1));
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));

        let make_batch = |name: &str, order: Arc<std::sync::Mutex<Vec<String>>>| {
            let tag = name.to_string();
            Batch::new(
                name,
                vec![boxed(async move {
                    order.lock().unwrap().push(tag);
                    Ok(())
                })],
            )
        };

        let batches = vec![
            make_batch("first", order.clone()),
            make_batch("second", order.clone()),
        ];

        let results = pool.execute_batches(batches).await;
        assert_eq!(results.len(), 2);
        assert_eq!(*order.lock().unwrap(), vec!["first", "second"]);
    }
}
