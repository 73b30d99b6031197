//! Background task orchestration.
//!
//! The engine runs one worker task and one renewal task per owned partition,
//! plus one rebalance task, all sharing a single shutdown signal. The
//! [`TaskRegistry`] centralizes their lifecycle:
//! - Named task registration
//! - A broadcast shutdown signal tasks observe at their own suspension
//!   points (tasks are never cancelled mid-operation by the registry)
//! - Timed drain on shutdown, aborting stragglers
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use feedlock::engine::background_tasks::TaskRegistry;
//!
//! #[tokio::main]
//! async fn main() {
//!     let registry = TaskRegistry::new();
//!
//!     let mut shutdown = registry.subscribe();
//!     registry
//!         .spawn("heartbeat", async move {
//!             loop {
//!                 tokio::select! {
//!                     _ = shutdown.recv() => break,
//!                     _ = tokio::time::sleep(Duration::from_secs(5)) => {
//!                         // heartbeat logic
//!                     }
//!                 }
//!             }
//!         })
//!         .await;
//!
//!     registry.shutdown_all(Duration::from_secs(5)).await;
//! }
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;

/// Central registry for the engine's background tasks.
pub struct TaskRegistry {
    /// Registered tasks by name.
    tasks: Mutex<HashMap<String, JoinHandle<()>>>,
    /// Shutdown signal sender.
    shutdown_tx: broadcast::Sender<()>,
    /// Whether shutdown has been initiated.
    shutting_down: AtomicBool,
}

impl TaskRegistry {
    /// Create a new task registry.
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            tasks: Mutex::new(HashMap::new()),
            shutdown_tx,
            shutting_down: AtomicBool::new(false),
        }
    }

    /// Subscribe to the shutdown signal.
    ///
    /// Tasks select on the returned receiver at their suspension points.
    /// Check [`is_shutting_down`](TaskRegistry::is_shutting_down) after
    /// subscribing: a signal sent before the subscription is not replayed.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Spawn a named background task.
    ///
    /// If a task with this name already exists it is aborted first, so a
    /// restarted partition reuses its task name.
    pub async fn spawn<F>(&self, name: impl Into<String>, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        if self.is_shutting_down() {
            tracing::warn!(task = %name, "Ignoring spawn during shutdown");
            return;
        }

        let handle = tokio::spawn(task);
        tracing::debug!(task = %name, "Spawned background task");

        let mut tasks = self.tasks.lock().await;
        if let Some(old) = tasks.insert(name.clone(), handle) {
            if !old.is_finished() {
                tracing::debug!(task = %name, "Aborted previous task instance");
                old.abort();
            }
        }
    }

    /// Fire the shutdown signal without waiting for tasks to drain.
    ///
    /// Used by workers that must stop the whole engine (run-window boundary)
    /// without awaiting their own termination.
    pub fn trigger_shutdown(&self) {
        if self.shutting_down.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!("Shutdown signal fired");
        let _ = self.shutdown_tx.send(());
    }

    /// Shutdown all tasks: signal, then wait up to `timeout` for each task,
    /// aborting any that do not drain in time.
    pub async fn shutdown_all(&self, timeout: Duration) {
        self.trigger_shutdown();

        let drained: Vec<(String, JoinHandle<()>)> =
            self.tasks.lock().await.drain().collect();

        tracing::info!(task_count = drained.len(), "Draining background tasks");

        let deadline = tokio::time::Instant::now() + timeout;
        for (name, handle) in drained {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                tracing::warn!(task = %name, "Aborting task (shutdown timeout exceeded)");
                handle.abort();
                continue;
            }
            match tokio::time::timeout(remaining, handle).await {
                Ok(Ok(())) => {
                    tracing::debug!(task = %name, "Task shutdown complete");
                }
                Ok(Err(e)) => {
                    tracing::warn!(task = %name, error = %e, "Task panicked during shutdown");
                }
                Err(_) => {
                    tracing::warn!(task = %name, "Task did not respond to shutdown, aborting");
                }
            }
        }

        tracing::info!("All background tasks drained");
    }

    /// Number of tasks still running.
    pub async fn running_count(&self) -> usize {
        self.tasks
            .lock()
            .await
            .values()
            .filter(|handle| !handle.is_finished())
            .count()
    }

    /// Check if shutdown has been initiated.
    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}
