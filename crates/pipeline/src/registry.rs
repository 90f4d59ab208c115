//! Registry of in-flight request tasks.
//!
//! Each request runs as one spawned task with its own child
//! [`CancellationToken`]. Finished tasks remove themselves; shutdown
//! cancels the parent token and waits for every task to exit.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bookhound_core::types::RequestId;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

/// How long shutdown waits for each task.
const SHUTDOWN_TASK_TIMEOUT: Duration = Duration::from_secs(5);

struct ManagedTask {
    task_handle: tokio::task::JoinHandle<()>,
    /// Child of the registry's master token.
    cancel: CancellationToken,
    /// Distinguishes a re-spawned task for the same request from the old one.
    generation: u64,
}

type TaskMap = Arc<RwLock<HashMap<RequestId, ManagedTask>>>;

/// Tracks spawned tasks by request id.
pub struct TaskRegistry {
    tasks: TaskMap,
    /// Master token, cancelled during shutdown.
    cancel: CancellationToken,
    next_generation: AtomicU64,
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self {
            tasks: Arc::new(RwLock::new(HashMap::new())),
            cancel: CancellationToken::new(),
            next_generation: AtomicU64::new(0),
        }
    }

    /// A token cancelled when the registry shuts down.
    pub fn child_token(&self) -> CancellationToken {
        self.cancel.child_token()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Spawn the task built by `make` for `request_id`.
    ///
    /// A task already registered for the same request is cancelled and
    /// replaced. Returns `false` once shutdown has begun.
    pub async fn spawn<F, Fut>(&self, request_id: RequestId, make: F) -> bool
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.is_shutting_down() {
            tracing::warn!(request_id = %request_id, "Refusing to spawn task during shutdown");
            return false;
        }

        // Held across spawn + insert so the task's self-removal cannot run
        // before its entry exists.
        let mut tasks = self.tasks.write().await;
        if let Some(previous) = tasks.remove(&request_id) {
            tracing::warn!(request_id = %request_id, "Replacing running task");
            previous.cancel.cancel();
        }

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let cancel = self.cancel.child_token();
        let work = make(cancel.clone());
        let registry = Arc::clone(&self.tasks);

        let task_handle = tokio::spawn(async move {
            work.await;
            let mut tasks = registry.write().await;
            if tasks
                .get(&request_id)
                .is_some_and(|t| t.generation == generation)
            {
                tasks.remove(&request_id);
            }
        });

        tasks.insert(
            request_id,
            ManagedTask {
                task_handle,
                cancel,
                generation,
            },
        );
        true
    }

    /// Signal the task for `request_id`. Returns whether one was running.
    pub async fn cancel(&self, request_id: RequestId) -> bool {
        match self.tasks.read().await.get(&request_id) {
            Some(task) => {
                task.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub async fn is_running(&self, request_id: RequestId) -> bool {
        self.tasks.read().await.contains_key(&request_id)
    }

    pub async fn running_count(&self) -> usize {
        self.tasks.read().await.len()
    }

    /// Cancel every task and wait up to 5 seconds for each to exit.
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down download tasks");
        self.cancel.cancel();

        // Drain first: finishing tasks take the write lock to remove themselves.
        let drained: Vec<(RequestId, ManagedTask)> = self.tasks.write().await.drain().collect();
        for (request_id, task) in drained {
            tracing::info!(request_id = %request_id, "Stopping download task");
            task.cancel.cancel();
            if tokio::time::timeout(SHUTDOWN_TASK_TIMEOUT, task.task_handle)
                .await
                .is_err()
            {
                tracing::warn!(request_id = %request_id, "Download task did not stop in time");
            }
        }

        tracing::info!("Download tasks shut down");
    }
}
