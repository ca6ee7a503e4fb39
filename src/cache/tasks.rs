//! Background task registry for write-back writes and warming refreshes.

use parking_lot::Mutex;
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Outcome of draining background work on shutdown
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ShutdownReport {
    /// Tasks that finished within the grace period
    pub completed: usize,
    /// Tasks still running at the deadline and aborted
    pub aborted: usize,
    pub panicked: usize,
}

/// Tracks spawned background work so it can be drained on shutdown
#[derive(Debug)]
pub struct BackgroundTasks {
    tasks: Mutex<JoinSet<()>>,
    /// Flipped only while `tasks` is locked
    accepting: AtomicBool,
    pending: Arc<PendingCount>,
}

/// Count of spawned tasks that have not finished or been aborted
#[derive(Debug, Default)]
struct PendingCount {
    count: AtomicUsize,
    idle: Notify,
}

/// Decrements the pending count when the task future is dropped, whether
/// it completed, panicked or was aborted
struct PendingGuard(Arc<PendingCount>);

impl Drop for PendingGuard {
    fn drop(&mut self) {
        if self.0.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

impl Default for BackgroundTasks {
    fn default() -> Self {
        Self::new()
    }
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self {
            tasks: Mutex::new(JoinSet::new()),
            accepting: AtomicBool::new(true),
            pending: Arc::new(PendingCount::default()),
        }
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::Acquire)
    }

    /// Spawn `task` on the current runtime; returns `false` after shutdown
    pub fn spawn<F>(&self, task: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut tasks = self.tasks.lock();
        if !self.is_accepting() {
            return false;
        }
        // Reap finished tasks so the set does not grow unbounded
        while let Some(result) = tasks.try_join_next() {
            log_join_result(result);
        }

        self.pending.count.fetch_add(1, Ordering::AcqRel);
        let guard = PendingGuard(self.pending.clone());
        tasks.spawn(async move {
            let _guard = guard;
            task.await;
        });
        true
    }

    /// Tasks spawned and not yet finished
    pub fn in_flight(&self) -> usize {
        self.pending.count.load(Ordering::Acquire)
    }

    /// Wait for every task spawned so far, including tasks they spawn
    pub async fn flush(&self) {
        loop {
            let idle = self.pending.idle.notified();
            tokio::pin!(idle);
            idle.as_mut().enable();
            if self.in_flight() == 0 {
                break;
            }
            idle.await;
        }

        let mut tasks = self.tasks.lock();
        while let Some(result) = tasks.try_join_next() {
            log_join_result(result);
        }
    }

    /// Stop accepting work, wait up to `grace` for running tasks and abort
    /// whatever is left
    pub async fn shutdown(&self, grace: Duration) -> ShutdownReport {
        let mut pending = {
            let mut tasks = self.tasks.lock();
            self.accepting.store(false, Ordering::Release);
            std::mem::take(&mut *tasks)
        };
        let mut report = ShutdownReport::default();
        let deadline = tokio::time::Instant::now() + grace;

        while !pending.is_empty() {
            match tokio::time::timeout_at(deadline, pending.join_next()).await {
                Ok(Some(Ok(()))) => report.completed += 1,
                Ok(Some(Err(e))) => {
                    if e.is_panic() {
                        report.panicked += 1;
                    }
                    warn!(error = %e, "Background cache task failed");
                }
                Ok(None) => break,
                Err(_) => {
                    report.aborted = pending.len();
                    warn!(
                        aborted = report.aborted,
                        grace_ms = grace.as_millis() as u64,
                        "Background cache tasks still running at shutdown deadline, aborting"
                    );
                    pending.shutdown().await;
                    break;
                }
            }
        }

        info!(
            completed = report.completed,
            aborted = report.aborted,
            panicked = report.panicked,
            "Background cache tasks drained"
        );
        report
    }
}

fn log_join_result(result: Result<(), tokio::task::JoinError>) {
    match result {
        Ok(()) => {}
        Err(e) if e.is_cancelled() => debug!("Background cache task cancelled"),
        Err(e) => warn!(error = %e, "Background cache task failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_flush_waits_for_tasks() {
        let tasks = BackgroundTasks::new();
        let done = Arc::new(AtomicUsize::new(0));
        for _ in 0..5 {
            let done = done.clone();
            assert!(tasks.spawn(async move {
                tokio::task::yield_now().await;
                done.fetch_add(1, Ordering::SeqCst);
            }));
        }

        tasks.flush().await;
        assert_eq!(done.load(Ordering::SeqCst), 5);
        assert_eq!(tasks.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_aborts_slow_tasks() {
        let tasks = BackgroundTasks::new();
        tasks.spawn(async {});
        tasks.spawn(async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        });

        let report = tasks.shutdown(Duration::from_millis(100)).await;
        assert_eq!(report.completed, 1);
        assert_eq!(report.aborted, 1);
        assert!(!tasks.is_accepting());
        assert!(!tasks.spawn(async {}));
    }

    #[tokio::test]
    async fn test_flush_waits_for_nested_spawns() {
        let tasks = Arc::new(BackgroundTasks::new());
        let done = Arc::new(AtomicUsize::new(0));
        let inner_tasks = tasks.clone();
        let inner_done = done.clone();
        tasks.spawn(async move {
            inner_tasks.spawn(async move {
                tokio::task::yield_now().await;
                inner_done.fetch_add(1, Ordering::SeqCst);
            });
        });

        tasks.flush().await;
        assert_eq!(done.load(Ordering::SeqCst), 1);
        assert_eq!(tasks.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_sees_tasks_while_flush_is_waiting() {
        let tasks = Arc::new(BackgroundTasks::new());
        tasks.spawn(async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        });
        let flusher = {
            let tasks = tasks.clone();
            tokio::spawn(async move { tasks.flush().await })
        };
        tokio::task::yield_now().await;

        let report = tasks.shutdown(Duration::from_millis(100)).await;
        assert_eq!(report.aborted, 1);
        flusher.await.unwrap();
        assert_eq!(tasks.in_flight(), 0);
        assert!(!tasks.spawn(async {}));
        assert_eq!(tasks.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_counts_panics() {
        let tasks = BackgroundTasks::new();
        tasks.spawn(async { panic!("boom") });

        let report = tasks.shutdown(Duration::from_secs(1)).await;
        assert_eq!(report.panicked, 1);
        assert_eq!(report.aborted, 0);
    }
}
