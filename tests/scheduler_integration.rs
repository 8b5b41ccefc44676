//! End-to-end tests for the scheduler pipeline: batch submission, response
//! caching, retry behavior, and queue reaping wired through the composition
//! root.

use async_trait::async_trait;
use pacer::config::PacerConfig;
use pacer::model::{AiRequest, Message, ModelClient, ModelError};
use pacer::retry::RetryError;
use pacer::Scheduler;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Scripted model client: fails the first `fail_times` calls, then answers.
struct MockClient {
    calls: AtomicU32,
    fail_times: u32,
    error: fn(String) -> ModelError,
}

impl MockClient {
    fn healthy() -> Self {
        Self {
            calls: AtomicU32::new(0),
            fail_times: 0,
            error: ModelError::Transport,
        }
    }

    fn failing(fail_times: u32, error: fn(String) -> ModelError) -> Self {
        Self {
            calls: AtomicU32::new(0),
            fail_times,
            error,
        }
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelClient for MockClient {
    async fn complete(&self, request: &AiRequest) -> Result<String, ModelError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.fail_times {
            return Err((self.error)(format!("scripted failure {}", call)));
        }
        Ok(format!("answer to: {}", request.messages[0].content))
    }
}

fn fast_config() -> PacerConfig {
    let mut config = PacerConfig::default();
    config.budget.admission_poll_ms = 10;
    config.retry.base_delay_ms = 1;
    config.queue.task_timeout_seconds = 1;
    config.budget.watchdog_timeout_seconds = 2;
    config
}

fn request(text: &str) -> AiRequest {
    AiRequest::new(vec![Message::user(text)], "gpt-4.1-nano")
}

#[tokio::test]
async fn batch_returns_results_for_every_item() {
    let scheduler = Scheduler::new(&fast_config(), Arc::new(MockClient::healthy())).unwrap();

    let items: Vec<String> = (0..12).map(|i| format!("email body {}", i)).collect();
    let results = scheduler
        .submit_batch(
            "tenant-a",
            items,
            |item| async move { item.len() },
            |item| item.clone(),
        )
        .await;

    assert_eq!(results.len(), 12);
    assert!(results.iter().all(|r| r.is_some()));
    assert_eq!(scheduler.orchestrator().current_usage(), 0);
}

#[tokio::test]
async fn one_failing_item_does_not_fail_the_batch() {
    let scheduler = Scheduler::new(&fast_config(), Arc::new(MockClient::healthy())).unwrap();

    let items: Vec<u32> = (0..5).collect();
    let results = scheduler
        .submit_batch(
            "tenant-a",
            items,
            |item| async move {
                if item == 2 {
                    panic!("poisoned item");
                }
                item * 10
            },
            |item| format!("item {}", item),
        )
        .await;

    assert_eq!(results.len(), 5);
    assert_eq!(results[0], Some(0));
    assert_eq!(results[1], Some(10));
    assert_eq!(results[2], None);
    assert_eq!(results[3], Some(30));
    assert_eq!(results[4], Some(40));
}

#[tokio::test]
async fn timed_out_item_yields_none_and_siblings_complete() {
    let scheduler = Scheduler::new(&fast_config(), Arc::new(MockClient::healthy())).unwrap();

    let items: Vec<u32> = (0..3).collect();
    let results = scheduler
        .submit_batch(
            "tenant-a",
            items,
            |item| async move {
                if item == 1 {
                    // Far past the 1s task timeout
                    tokio::time::sleep(Duration::from_secs(30)).await;
                }
                item
            },
            |item| format!("item {}", item),
        )
        .await;

    assert_eq!(results, vec![Some(0), None, Some(2)]);
}

#[tokio::test]
async fn second_identical_request_is_served_from_cache() {
    let client = Arc::new(MockClient::healthy());
    let scheduler = Scheduler::new(&fast_config(), Arc::clone(&client) as Arc<dyn ModelClient>)
        .unwrap();

    // Same payload, different wire-form field ordering
    let first: Message = serde_json::from_str(r#"{"role":"user","content":"hello"}"#).unwrap();
    let second: Message = serde_json::from_str(r#"{"content":"hello","role":"user"}"#).unwrap();

    let a = scheduler
        .complete(&AiRequest::new(vec![first], "gpt-4.1-nano"))
        .await
        .unwrap();
    let b = scheduler
        .complete(&AiRequest::new(vec![second], "gpt-4.1-nano"))
        .await
        .unwrap();

    assert_eq!(a, b);
    assert_eq!(client.calls(), 1, "second call must not reach the provider");
}

#[tokio::test]
async fn transient_failures_are_retried_to_success() {
    let client = Arc::new(MockClient::failing(2, ModelError::RateLimited));
    let scheduler = Scheduler::new(&fast_config(), Arc::clone(&client) as Arc<dyn ModelClient>)
        .unwrap();

    let result = scheduler.complete(&request("retry me")).await.unwrap();
    assert!(result.starts_with("answer to:"));
    assert_eq!(client.calls(), 3);
}

#[tokio::test]
async fn retry_exhaustion_reports_attempt_count() {
    let mut config = fast_config();
    config.retry.max_attempts = 3;
    let client = Arc::new(MockClient::failing(u32::MAX, ModelError::Transport));
    let scheduler = Scheduler::new(&config, Arc::clone(&client) as Arc<dyn ModelClient>).unwrap();

    let result = scheduler.complete(&request("doomed")).await;
    match result {
        Err(RetryError::Exhausted { attempts, .. }) => assert_eq!(attempts, 3),
        other => panic!("expected exhaustion, got {:?}", other.map(|_| ())),
    }
    assert_eq!(client.calls(), 3);
}

#[tokio::test]
async fn non_retryable_errors_skip_the_retry_budget() {
    let client = Arc::new(MockClient::failing(u32::MAX, ModelError::InvalidRequest));
    let scheduler = Scheduler::new(&fast_config(), Arc::clone(&client) as Arc<dyn ModelClient>)
        .unwrap();

    let result = scheduler.complete(&request("malformed")).await;
    assert!(matches!(result, Err(RetryError::Fatal(_))));
    assert_eq!(client.calls(), 1);
}

#[tokio::test]
async fn failed_calls_are_not_cached() {
    let client = Arc::new(MockClient::failing(1, ModelError::Timeout));
    let mut config = fast_config();
    config.retry.max_attempts = 1;
    let scheduler = Scheduler::new(&config, Arc::clone(&client) as Arc<dyn ModelClient>).unwrap();

    let req = request("flaky");
    assert!(scheduler.complete(&req).await.is_err());

    // The failure was not memoized; the next call reaches the provider
    let result = scheduler.complete(&req).await.unwrap();
    assert!(result.starts_with("answer to:"));
    assert_eq!(client.calls(), 2);
}

#[tokio::test]
async fn idle_tenant_queue_is_reaped() {
    let mut config = fast_config();
    config.queue.idle_timeout_seconds = 0;
    config.queue.reap_interval_seconds = 1;
    let scheduler = Scheduler::new(&config, Arc::new(MockClient::healthy())).unwrap();

    let results = scheduler
        .submit_batch(
            "sleepy-tenant",
            vec!["one".to_string()],
            |item| async move { item },
            |item| item.clone(),
        )
        .await;
    assert_eq!(results.len(), 1);
    assert!(scheduler.manager().contains("sleepy-tenant"));

    tokio::time::timeout(Duration::from_secs(5), async {
        while scheduler.manager().contains("sleepy-tenant") {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .expect("reaper should remove the idle tenant queue");

    scheduler.shutdown();
}
