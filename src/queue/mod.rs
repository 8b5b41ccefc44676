//! Per-tenant task queue with bounded concurrency
//!
//! Each tenant gets a FIFO admission queue backed by a tokio channel and a
//! resizable permit pool. The consumer loop starts lazily on the first
//! enqueue and exits when it pops the stop sentinel, so a queue cycles
//! `idle -> draining -> idle` until the manager's reaper destroys it.
//!
//! Every admitted unit of work first reserves its token cost with the
//! shared [`TokenOrchestrator`], runs under a bounded timeout, and in all
//! outcomes releases both the reservation and its permit. One bad item
//! never blocks or kills the batch.

use crate::orchestrator::TokenOrchestrator;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

pub mod manager;
pub mod permit;

pub use manager::TaskQueueManager;
pub use permit::{PermitError, PermitPool};

/// Errors from task queue operations
#[derive(Debug, Error)]
pub enum QueueError {
    /// The backlog channel is closed; the queue was torn down
    #[error("Task queue is closed")]
    Closed,
}

enum QueueMessage {
    Task {
        work: BoxFuture<'static, ()>,
        content: String,
    },
    /// Sentinel: the consumer loop exits after draining what is already
    /// admitted. In-flight work is not cancelled.
    Stop,
}

/// Per-tenant FIFO admission queue with bounded concurrency.
pub struct TaskQueue {
    tx: mpsc::UnboundedSender<QueueMessage>,
    rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<QueueMessage>>>,
    pool: Arc<PermitPool>,
    orchestrator: Arc<TokenOrchestrator>,
    running: Arc<AtomicBool>,
    depth: Arc<AtomicUsize>,
    task_timeout: Duration,
    dispatch_delay: Duration,
}

impl TaskQueue {
    /// Create a queue sized to `max_concurrency` simultaneous tasks, wired
    /// to the shared token orchestrator.
    pub fn new(
        max_concurrency: usize,
        orchestrator: Arc<TokenOrchestrator>,
        task_timeout: Duration,
        dispatch_delay: Duration,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Arc::new(tokio::sync::Mutex::new(rx)),
            pool: Arc::new(PermitPool::new(max_concurrency)),
            orchestrator,
            running: Arc::new(AtomicBool::new(false)),
            depth: Arc::new(AtomicUsize::new(0)),
            task_timeout,
            dispatch_delay,
        }
    }

    /// Append a unit of work to the backlog and start the consumer loop if
    /// it is not already draining.
    ///
    /// `content` is the raw text driving the token cost estimate for this
    /// unit of work.
    pub fn enqueue<F>(&self, work: F, content: impl Into<String>) -> Result<(), QueueError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tx
            .send(QueueMessage::Task {
                work: work.boxed(),
                content: content.into(),
            })
            .map_err(|_| QueueError::Closed)?;
        self.depth.fetch_add(1, Ordering::SeqCst);
        metrics::gauge!("pacer_queue_backlog").set(self.depth.load(Ordering::SeqCst) as f64);

        if !self.running.swap(true, Ordering::SeqCst) {
            self.spawn_drain_loop();
        }
        Ok(())
    }

    /// Push the stop sentinel. The loop terminates after admitting what is
    /// already ahead of the sentinel; in-flight work runs to completion.
    pub fn stop(&self) {
        let _ = self.tx.send(QueueMessage::Stop);
    }

    /// Adjust the permit pool size. Growing takes effect immediately;
    /// shrinking lets in-flight holders finish before the smaller limit
    /// governs admission.
    pub fn update_concurrency(&self, new_limit: usize) {
        tracing::debug!(
            old_limit = self.pool.limit(),
            new_limit,
            "Resizing queue concurrency"
        );
        self.pool.resize(new_limit);
    }

    /// Configured concurrency limit
    pub fn concurrency(&self) -> usize {
        self.pool.limit()
    }

    /// Number of backlog entries not yet admitted
    pub fn backlog(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }

    /// Whether the consumer loop is currently draining
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn spawn_drain_loop(&self) {
        let rx = Arc::clone(&self.rx);
        let pool = Arc::clone(&self.pool);
        let orchestrator = Arc::clone(&self.orchestrator);
        let running = Arc::clone(&self.running);
        let depth = Arc::clone(&self.depth);
        let task_timeout = self.task_timeout;
        let dispatch_delay = self.dispatch_delay;

        tokio::spawn(async move {
            tracing::debug!("Queue drain loop started");
            let mut rx = rx.lock().await;
            while let Some(message) = rx.recv().await {
                let (work, content) = match message {
                    QueueMessage::Stop => break,
                    QueueMessage::Task { work, content } => (work, content),
                };
                depth.fetch_sub(1, Ordering::SeqCst);
                metrics::gauge!("pacer_queue_backlog").set(depth.load(Ordering::SeqCst) as f64);

                // Suspends the loop (not the enqueuer) until a slot frees
                if pool.acquire().await.is_err() {
                    tracing::error!("Permit pool closed, stopping drain loop");
                    break;
                }

                let pool = Arc::clone(&pool);
                let orchestrator = Arc::clone(&orchestrator);
                tokio::spawn(run_task(work, content, pool, orchestrator, task_timeout));

                if !dispatch_delay.is_zero() {
                    tokio::time::sleep(dispatch_delay).await;
                }
            }
            running.store(false, Ordering::SeqCst);
            tracing::debug!("Queue drain loop stopped");
        });
    }
}

/// Unit-of-work wrapper: token reservation, bounded execution, guaranteed
/// release of both the reservation and the permit.
async fn run_task(
    work: BoxFuture<'static, ()>,
    content: String,
    pool: Arc<PermitPool>,
    orchestrator: Arc<TokenOrchestrator>,
    task_timeout: Duration,
) {
    let reservation = orchestrator.register(&content).await;

    // The work runs as its own task so a panic is contained in the join
    // error instead of unwinding through the wrapper.
    let mut handle = tokio::spawn(work);
    match tokio::time::timeout(task_timeout, &mut handle).await {
        Ok(Ok(())) => {}
        Ok(Err(join_err)) if join_err.is_panic() => {
            metrics::counter!("pacer_task_failures_total", "kind" => "panic").increment(1);
            tracing::error!(error = %join_err, "Task panicked");
        }
        Ok(Err(join_err)) => {
            tracing::error!(error = %join_err, "Task was cancelled");
        }
        Err(_) => {
            // Best-effort cancellation: the task is aborted at its next
            // await point; a non-cooperative inner call may keep running.
            handle.abort();
            metrics::counter!("pacer_task_failures_total", "kind" => "timeout").increment(1);
            tracing::error!(
                timeout_s = task_timeout.as_secs(),
                content_len = content.len(),
                "Task timed out, abandoning result"
            );
        }
    }

    orchestrator.complete(&reservation);
    pool.release();
}
