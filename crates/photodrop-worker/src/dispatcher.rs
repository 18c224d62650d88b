//! Task dispatcher: bounded worker pool with outcome reporting.
//!
//! Submitted futures are spawned immediately but only run while holding one of
//! `max_workers` semaphore permits. Each finished task, including one that
//! panicked, sends a [`TaskOutcome`] to a sink task which logs it; failures
//! never reach the submitter.
//!
//! Shutdown: [`TaskDispatcher::shutdown`] stops accepting work and waits for
//! every outstanding task before stopping the sink.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::FutureExt;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;

/// Handle list size at which finished handles are pruned.
pub const HANDLE_PRUNE_THRESHOLD: usize = 50;

pub type TaskId = u64;

/// Optional sender that receives every outcome after it has been logged.
pub type OutcomeSender = mpsc::UnboundedSender<TaskOutcome>;

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub max_workers: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self { max_workers: 4 }
    }
}

/// Result of one dispatched task. The error is the rendered error chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskOutcome {
    pub id: TaskId,
    pub label: String,
    pub result: Result<(), String>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("Dispatcher is shutting down")]
    ShuttingDown,
}

struct Tracked {
    accepting: bool,
    handles: Vec<JoinHandle<()>>,
}

pub struct TaskDispatcher {
    semaphore: Arc<Semaphore>,
    tracked: Mutex<Tracked>,
    outcome_tx: Mutex<Option<mpsc::UnboundedSender<TaskOutcome>>>,
    sink: Mutex<Option<JoinHandle<()>>>,
    next_id: AtomicU64,
}

impl TaskDispatcher {
    /// Create a dispatcher and spawn its outcome sink. Requires a tokio runtime.
    pub fn new(config: DispatcherConfig) -> Self {
        Self::build(config, None)
    }

    /// Like [`TaskDispatcher::new`], additionally forwarding every outcome to
    /// `forward` once it has been logged.
    pub fn new_with_outcomes(config: DispatcherConfig, forward: OutcomeSender) -> Self {
        Self::build(config, Some(forward))
    }

    fn build(config: DispatcherConfig, forward: Option<OutcomeSender>) -> Self {
        let max_workers = config.max_workers.max(1);
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
        let sink = tokio::spawn(Self::outcome_sink(outcome_rx, forward));

        tracing::info!(max_workers, "Task dispatcher started");

        Self {
            semaphore: Arc::new(Semaphore::new(max_workers)),
            tracked: Mutex::new(Tracked {
                accepting: true,
                handles: Vec::new(),
            }),
            outcome_tx: Mutex::new(Some(outcome_tx)),
            sink: Mutex::new(Some(sink)),
            next_id: AtomicU64::new(0),
        }
    }

    /// Queue `task` for execution. Returns as soon as the task is spawned.
    pub fn submit<F, T>(&self, label: impl Into<String>, task: F) -> Result<TaskId, DispatchError>
    where
        F: Future<Output = anyhow::Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let label = label.into();
        let mut tracked = lock(&self.tracked);
        if !tracked.accepting {
            tracing::debug!(label = %label, "Rejecting task, dispatcher is shutting down");
            return Err(DispatchError::ShuttingDown);
        }
        let outcome_tx = lock(&self.outcome_tx)
            .clone()
            .ok_or(DispatchError::ShuttingDown)?;

        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let semaphore = self.semaphore.clone();
        tracing::debug!(task_id = id, label = %label, "Task submitted");

        let handle = tokio::spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return,
            };
            tracing::debug!(task_id = id, label = %label, "Task started");
            let result = match AssertUnwindSafe(task).catch_unwind().await {
                Ok(Ok(_)) => Ok(()),
                Ok(Err(e)) => Err(format!("{:#}", e)),
                Err(panic) => Err(format!("task panicked: {}", panic_message(&*panic))),
            };
            let _ = outcome_tx.send(TaskOutcome { id, label, result });
        });

        if tracked.handles.len() >= HANDLE_PRUNE_THRESHOLD {
            tracked.handles.retain(|h| !h.is_finished());
        }
        tracked.handles.push(handle);
        Ok(id)
    }

    /// Number of tracked tasks that have not finished yet.
    pub fn in_flight(&self) -> usize {
        lock(&self.tracked)
            .handles
            .iter()
            .filter(|h| !h.is_finished())
            .count()
    }

    /// Number of handles currently held, finished or not.
    pub fn tracked_handles(&self) -> usize {
        lock(&self.tracked).handles.len()
    }

    /// Stop accepting work, wait for all outstanding tasks, then stop the sink.
    ///
    /// Calling it more than once is harmless.
    pub async fn shutdown(&self) {
        let handles = {
            let mut tracked = lock(&self.tracked);
            tracked.accepting = false;
            std::mem::take(&mut tracked.handles)
        };
        tracing::info!(outstanding = handles.len(), "Draining task dispatcher");

        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Dispatched task panicked");
            }
        }

        lock(&self.outcome_tx).take();
        let sink = lock(&self.sink).take();
        if let Some(sink) = sink {
            if let Err(e) = sink.await {
                tracing::error!(error = %e, "Outcome sink panicked");
            }
        }
        tracing::info!("Task dispatcher stopped");
    }

    async fn outcome_sink(
        mut outcomes: mpsc::UnboundedReceiver<TaskOutcome>,
        forward: Option<OutcomeSender>,
    ) {
        while let Some(outcome) = outcomes.recv().await {
            match &outcome.result {
                Ok(()) => {
                    tracing::info!(task_id = outcome.id, label = %outcome.label, "Task completed")
                }
                Err(e) => {
                    tracing::error!(task_id = outcome.id, label = %outcome.label, error = %e, "Task failed")
                }
            }
            if let Some(forward) = &forward {
                let _ = forward.send(outcome);
            }
        }
        tracing::debug!("Outcome sink stopped");
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
