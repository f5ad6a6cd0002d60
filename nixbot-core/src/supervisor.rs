// ABOUTME: Lightweight supervisor retaining handles to spawned handler tasks
// ABOUTME: Default behaviour stays fire-and-forget; shutdown can optionally await in-flight work

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use tokio::task::JoinSet;

use crate::metrics;

/// Tracks handler tasks spawned by the dispatcher
#[derive(Default)]
pub struct TaskSupervisor {
    tasks: Mutex<JoinSet<()>>,
}

impl TaskSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `task` onto the runtime and retain its handle.
    ///
    /// Finished tasks are reaped here so the set only holds live work.
    pub fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut tasks = self.lock();
        while let Some(result) = tasks.try_join_next() {
            log_join_result(result);
        }
        tasks.spawn(task);
        metrics::set_handlers_in_flight(tasks.len());
    }

    /// Number of tasks that have not been reaped yet
    pub fn in_flight(&self) -> usize {
        let mut tasks = self.lock();
        while let Some(result) = tasks.try_join_next() {
            log_join_result(result);
        }
        tasks.len()
    }

    /// Stop supervising.
    ///
    /// With `grace == None` in-flight tasks are left to finish on their own.
    /// With a grace period, waits up to that long for them; anything still
    /// running afterwards is detached, not aborted. Returns how many tasks
    /// were still running when supervision ended.
    pub async fn shutdown(&self, grace: Option<Duration>) -> usize {
        let mut tasks = std::mem::take(&mut *self.lock());

        let Some(grace) = grace else {
            let remaining = tasks.len();
            tasks.detach_all();
            return remaining;
        };

        tracing::info!(
            in_flight = tasks.len(),
            grace_secs = grace.as_secs(),
            "Waiting for in-flight handlers"
        );

        let drain = async {
            while let Some(result) = tasks.join_next().await {
                log_join_result(result);
            }
        };
        if tokio::time::timeout(grace, drain).await.is_err() {
            tracing::warn!(
                remaining = tasks.len(),
                "Grace period elapsed, detaching remaining handlers"
            );
        }

        let remaining = tasks.len();
        tasks.detach_all();
        remaining
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, JoinSet<()>> {
        // A poisoned set is still structurally valid
        self.tasks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for TaskSupervisor {
    fn drop(&mut self) {
        // Dropping a JoinSet aborts its tasks; handlers must outlive us
        let tasks = self
            .tasks
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        tasks.detach_all();
    }
}

fn log_join_result(result: Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        if e.is_panic() {
            tracing::error!(error = %e, "Handler task panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_shutdown_with_grace_waits_for_tasks() {
        let supervisor = TaskSupervisor::new();
        let done = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let done = Arc::clone(&done);
            supervisor.spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                done.fetch_add(1, Ordering::SeqCst);
            });
        }

        let remaining = supervisor.shutdown(Some(Duration::from_secs(5))).await;
        assert_eq!(remaining, 0);
        assert_eq!(done.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_shutdown_grace_expires_for_stuck_task() {
        let supervisor = TaskSupervisor::new();
        supervisor.spawn(std::future::pending());

        let remaining = supervisor.shutdown(Some(Duration::from_millis(20))).await;
        assert_eq!(remaining, 1);
    }

    #[tokio::test]
    async fn test_shutdown_without_grace_returns_immediately() {
        let supervisor = TaskSupervisor::new();
        supervisor.spawn(std::future::pending());

        assert_eq!(supervisor.shutdown(None).await, 1);
        assert_eq!(supervisor.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_dropping_supervisor_leaves_tasks_running() {
        let supervisor = TaskSupervisor::new();
        let (tx, rx) = tokio::sync::oneshot::channel();
        supervisor.spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let _ = tx.send(());
        });

        drop(supervisor);

        let finished = tokio::time::timeout(Duration::from_secs(5), rx).await;
        assert!(matches!(finished, Ok(Ok(()))));
    }

    #[tokio::test]
    async fn test_finished_tasks_are_reaped() {
        let supervisor = TaskSupervisor::new();
        supervisor.spawn(async {});
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(supervisor.in_flight(), 0);
    }
}
