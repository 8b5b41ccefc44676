//! Composition root and batch submission boundary
//!
//! [`Scheduler`] wires the whole pipeline together: one token orchestrator
//! per process budget, a tenant queue registry sized by the concurrency
//! limiter, a retry-wrapped model client, and the shared response cache.
//! Callers hand it batches of domain items; it hands back per-item results
//! where failed items are `None` — partial success is the default outcome,
//! not an exception.

use crate::cache::{request_hash, ResponseCache};
use crate::config::{ConfigError, PacerConfig};
use crate::estimator::{Estimator, EstimatorError};
use crate::limiter::ConcurrencyLimiter;
use crate::model::{AiRequest, ModelClient, ModelError};
use crate::orchestrator::TokenOrchestrator;
use crate::queue::TaskQueueManager;
use crate::retry::{Retrier, RetryError};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Errors from scheduler construction
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Estimator(#[from] EstimatorError),
}

/// Rate-governed task scheduler for one process.
pub struct Scheduler {
    manager: Arc<TaskQueueManager>,
    orchestrator: Arc<TokenOrchestrator>,
    cache: Arc<ResponseCache>,
    cache_enabled: bool,
    client: Arc<dyn ModelClient>,
    retrier: Retrier,
    estimator: Estimator,
    reaper_cancel: CancellationToken,
}

impl Scheduler {
    /// Build the scheduler from configuration and an injected model client,
    /// and start the background queue reaper.
    pub fn new(config: &PacerConfig, client: Arc<dyn ModelClient>) -> Result<Self, SchedulerError> {
        config.validate()?;

        let estimator = Estimator::for_model(&config.budget.model)?;
        let orchestrator = Arc::new(TokenOrchestrator::new(
            config.budget.tokens_per_minute,
            Duration::from_secs(config.budget.watchdog_timeout_seconds),
            Duration::from_millis(config.budget.admission_poll_ms),
            estimator.clone(),
        ));
        let limiter = ConcurrencyLimiter::new(config.budget.tokens_per_minute, estimator.clone());
        let manager = Arc::new(TaskQueueManager::new(
            Arc::clone(&orchestrator),
            limiter,
            Duration::from_secs(config.queue.idle_timeout_seconds),
            Duration::from_secs(config.queue.reap_interval_seconds),
            Duration::from_secs(config.queue.task_timeout_seconds),
            Duration::from_millis(config.queue.dispatch_delay_ms),
        ));

        let reaper_cancel = CancellationToken::new();
        manager.spawn_reaper(reaper_cancel.clone());

        tracing::info!(
            tokens_per_minute = config.budget.tokens_per_minute,
            model = %config.budget.model,
            "Scheduler started"
        );

        Ok(Self {
            manager,
            orchestrator,
            cache: Arc::new(ResponseCache::new(config.cache.max_entries)),
            cache_enabled: config.cache.enabled,
            client,
            retrier: Retrier::new((&config.retry).into()),
            estimator,
            reaper_cancel,
        })
    }

    /// Enqueue one unit of work per item on the tenant's queue and collect
    /// the results once all complete.
    ///
    /// `work` produces the awaitable unit of work per item;
    /// `content_extractor` yields the text driving that item's token cost
    /// estimate. An item whose work panics or times out contributes `None`;
    /// its siblings are unaffected.
    pub async fn submit_batch<I, T, W, Fut, C>(
        &self,
        tenant_id: &str,
        items: Vec<I>,
        work: W,
        content_extractor: C,
    ) -> Vec<Option<T>>
    where
        W: Fn(I) -> Fut,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
        C: Fn(&I) -> String,
    {
        let texts: Vec<String> = items.iter().map(&content_extractor).collect();
        let queue = self.manager.get_or_create(tenant_id, &texts);

        let mut receivers = Vec::with_capacity(items.len());
        for (item, content) in items.into_iter().zip(texts) {
            let (tx, rx) = tokio::sync::oneshot::channel();
            let fut = work(item);
            let enqueued = queue.enqueue(
                async move {
                    let _ = tx.send(fut.await);
                },
                content,
            );
            if let Err(e) = enqueued {
                tracing::error!(tenant_id = %tenant_id, error = %e, "Failed to enqueue item");
            }
            receivers.push(rx);
        }

        let mut results = Vec::with_capacity(receivers.len());
        for rx in receivers {
            // A dropped sender (panic, timeout, enqueue failure) marks the
            // item as failed without aborting the batch
            results.push(rx.await.ok());
        }
        results
    }

    /// Issue a model call through the response cache and the retry policy.
    ///
    /// A cache hit returns without a network call. Otherwise the injected
    /// client runs under the retry policy and the raw result is memoized.
    pub async fn complete(&self, request: &AiRequest) -> Result<String, RetryError<ModelError>> {
        let hash = request_hash(&request.messages);

        if self.cache_enabled {
            if let Some(cached) = self.cache.get(&hash).await {
                tracing::trace!(model = %request.model, "Response cache hit");
                return Ok(cached);
            }
        }

        let result = self
            .retrier
            .run(|| self.client.complete(request), ModelError::is_retryable)
            .await?;

        if self.cache_enabled {
            self.cache.insert(hash, result.clone()).await;
        }
        Ok(result)
    }

    /// Estimated total token cost of a request: prompt tokens plus the
    /// expected response size.
    pub fn estimate_request_tokens(&self, request: &AiRequest) -> u32 {
        self.estimator.estimate(&request.prompt_text()) + request.estimated_response_tokens
    }

    /// The shared admission controller
    pub fn orchestrator(&self) -> &Arc<TokenOrchestrator> {
        &self.orchestrator
    }

    /// The tenant queue registry
    pub fn manager(&self) -> &Arc<TaskQueueManager> {
        &self.manager
    }

    /// Stop the background reaper. Queued and in-flight work is unaffected.
    pub fn shutdown(&self) {
        self.reaper_cancel.cancel();
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.reaper_cancel.cancel();
    }
}
