//! Tenant queue registry with idle reaping
//!
//! Lazily creates one [`TaskQueue`] per tenant, sized by the concurrency
//! limiter over the first batch seen for that tenant, and reaps queues that
//! have seen no activity for the idle window. Sizing is a one-time decision:
//! it is only re-derived if the queue is recreated after reaping.

use crate::limiter::ConcurrencyLimiter;
use crate::orchestrator::TokenOrchestrator;
use crate::queue::TaskQueue;
use dashmap::DashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

struct QueueEntry {
    queue: Arc<TaskQueue>,
    last_used: Mutex<Instant>,
}

/// Registry of per-tenant task queues.
pub struct TaskQueueManager {
    queues: DashMap<String, QueueEntry>,
    orchestrator: Arc<TokenOrchestrator>,
    limiter: ConcurrencyLimiter,
    idle_timeout: Duration,
    reap_interval: Duration,
    task_timeout: Duration,
    dispatch_delay: Duration,
}

impl TaskQueueManager {
    pub fn new(
        orchestrator: Arc<TokenOrchestrator>,
        limiter: ConcurrencyLimiter,
        idle_timeout: Duration,
        reap_interval: Duration,
        task_timeout: Duration,
        dispatch_delay: Duration,
    ) -> Self {
        Self {
            queues: DashMap::new(),
            orchestrator,
            limiter,
            idle_timeout,
            reap_interval,
            task_timeout,
            dispatch_delay,
        }
    }

    /// Return the tenant's live queue, refreshing its last-used timestamp,
    /// or create one sized by the limiter over this first batch.
    pub fn get_or_create<T: AsRef<str>>(&self, tenant_id: &str, texts: &[T]) -> Arc<TaskQueue> {
        match self.queues.entry(tenant_id.to_string()) {
            dashmap::Entry::Occupied(entry) => {
                let e = entry.get();
                *e.last_used.lock().unwrap_or_else(|p| p.into_inner()) = Instant::now();
                Arc::clone(&e.queue)
            }
            dashmap::Entry::Vacant(entry) => {
                let max_concurrency = self.limiter.max_concurrency(texts);
                tracing::debug!(
                    tenant_id = %tenant_id,
                    max_concurrency,
                    batch_size = texts.len(),
                    "Created tenant queue"
                );
                let queue = Arc::new(TaskQueue::new(
                    max_concurrency,
                    Arc::clone(&self.orchestrator),
                    self.task_timeout,
                    self.dispatch_delay,
                ));
                entry.insert(QueueEntry {
                    queue: Arc::clone(&queue),
                    last_used: Mutex::new(Instant::now()),
                });
                metrics::gauge!("pacer_tenant_queues").set(self.queues.len() as f64);
                queue
            }
        }
    }

    /// Remove and stop every queue idle past the timeout. Returns how many
    /// queues were reaped.
    pub fn reap_idle(&self) -> usize {
        let now = Instant::now();
        let expired: Vec<String> = self
            .queues
            .iter()
            .filter(|entry| {
                let last_used = *entry
                    .value()
                    .last_used
                    .lock()
                    .unwrap_or_else(|p| p.into_inner());
                now.duration_since(last_used) > self.idle_timeout
            })
            .map(|entry| entry.key().clone())
            .collect();

        let mut reaped = 0;
        for tenant_id in expired {
            if let Some((_, entry)) = self.queues.remove(&tenant_id) {
                entry.queue.stop();
                reaped += 1;
                tracing::debug!(tenant_id = %tenant_id, "Reaped idle tenant queue");
            }
        }
        if reaped > 0 {
            metrics::gauge!("pacer_tenant_queues").set(self.queues.len() as f64);
        }
        reaped
    }

    /// Background reaper loop on a fixed tick, cancelled via the token.
    pub fn spawn_reaper(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            tracing::debug!(
                tick_s = manager.reap_interval.as_secs(),
                idle_timeout_s = manager.idle_timeout.as_secs(),
                "Queue reaper started"
            );
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::debug!("Queue reaper shutting down");
                        break;
                    }
                    _ = tokio::time::sleep(manager.reap_interval) => {
                        manager.reap_idle();
                    }
                }
            }
        })
    }

    /// Number of live tenant queues
    pub fn len(&self) -> usize {
        self.queues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }

    /// Whether a tenant currently has a live queue
    pub fn contains(&self, tenant_id: &str) -> bool {
        self.queues.contains_key(tenant_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimator::{Estimator, EstimatorError, TokenEstimator};

    struct FixedEstimator(u32);

    impl TokenEstimator for FixedEstimator {
        fn estimate(&self, _text: &str) -> Result<u32, EstimatorError> {
            Ok(self.0)
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    fn manager(idle_timeout: Duration, reap_interval: Duration) -> Arc<TaskQueueManager> {
        let estimator = Estimator::from_parts(Arc::new(FixedEstimator(100)), "test");
        let orchestrator = Arc::new(TokenOrchestrator::new(
            10_000,
            Duration::from_secs(60),
            Duration::from_millis(10),
            estimator.clone(),
        ));
        Arc::new(TaskQueueManager::new(
            orchestrator,
            ConcurrencyLimiter::new(1000, estimator),
            idle_timeout,
            reap_interval,
            Duration::from_secs(5),
            Duration::ZERO,
        ))
    }

    fn texts(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("text {}", i)).collect()
    }

    #[tokio::test]
    async fn creates_queue_sized_from_first_batch() {
        let m = manager(Duration::from_secs(600), Duration::from_secs(60));
        // 20 texts at 100 tokens against a 1000 budget -> concurrency 10
        let queue = m.get_or_create("tenant-a", &texts(20));
        assert_eq!(queue.concurrency(), 10);
        assert_eq!(m.len(), 1);
    }

    #[tokio::test]
    async fn reuses_live_queue_without_resizing() {
        let m = manager(Duration::from_secs(600), Duration::from_secs(60));
        let first = m.get_or_create("tenant-a", &texts(20));
        // Second batch would size differently, but sizing is one-time
        let second = m.get_or_create("tenant-a", &texts(1));
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.concurrency(), 10);
    }

    #[tokio::test]
    async fn reap_removes_only_idle_queues() {
        let m = manager(Duration::from_millis(50), Duration::from_secs(60));
        m.get_or_create("idle-tenant", &texts(2));
        m.get_or_create("busy-tenant", &texts(2));

        tokio::time::sleep(Duration::from_millis(80)).await;
        // Refresh one tenant inside the idle window
        m.get_or_create("busy-tenant", &texts(2));

        let reaped = m.reap_idle();
        assert_eq!(reaped, 1);
        assert!(!m.contains("idle-tenant"));
        assert!(m.contains("busy-tenant"));
    }

    #[tokio::test]
    async fn reaper_loop_removes_idle_queue() {
        let m = manager(Duration::from_millis(30), Duration::from_millis(20));
        m.get_or_create("tenant-a", &texts(2));

        let cancel = CancellationToken::new();
        let handle = m.spawn_reaper(cancel.clone());

        tokio::time::timeout(Duration::from_secs(5), async {
            while m.contains("tenant-a") {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("reaper should remove the idle queue");

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn queue_recreated_after_reap_is_resized() {
        let m = manager(Duration::from_millis(10), Duration::from_secs(60));
        let first = m.get_or_create("tenant-a", &texts(20));
        assert_eq!(first.concurrency(), 10);

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(m.reap_idle(), 1);

        let second = m.get_or_create("tenant-a", &texts(1));
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(second.concurrency(), 1);
    }
}
