//! Process-wide token budget admission control
//!
//! Before a unit of work may call the model provider it reserves its
//! estimated token cost from a shared budget. The reservation is released
//! when the work completes, or by a watchdog if the holder throws, hangs,
//! or is killed before reaching its `complete` call.
//!
//! There is exactly one orchestrator per process budget. It is constructed
//! explicitly by the composition root and passed by reference to every task
//! queue — no hidden global state.

use crate::estimator::Estimator;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use uuid::Uuid;

/// A pending claim against the global token budget.
///
/// Released at most once: the explicit [`TokenOrchestrator::complete`] path
/// and the watchdog path race on a shared atomic flag, and only the winner
/// decrements usage. Double release is a safe no-op.
pub struct TokenReservation {
    id: Uuid,
    tokens: u32,
    deadline: Instant,
    claimed: Arc<AtomicBool>,
    watchdog: JoinHandle<()>,
}

impl TokenReservation {
    /// Opaque reservation identifier
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Tokens claimed against the budget
    pub fn tokens(&self) -> u32 {
        self.tokens
    }

    /// When the watchdog will force-release this reservation
    pub fn deadline(&self) -> Instant {
        self.deadline
    }
}

struct TokenState {
    current_usage: u64,
}

/// State shared with watchdog tasks
struct Shared {
    state: Mutex<TokenState>,
    released: Notify,
}

impl Shared {
    fn release(&self, tokens: u32) {
        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            state.current_usage = state.current_usage.saturating_sub(u64::from(tokens));
            metrics::gauge!("pacer_token_usage").set(state.current_usage as f64);
        }
        self.released.notify_waiters();
    }
}

/// Global token-budget admission controller.
///
/// Invariant: `0 <= current_usage <= budget` at every observable instant,
/// and every admitted reservation decrements usage exactly once.
pub struct TokenOrchestrator {
    shared: Arc<Shared>,
    budget: u64,
    watchdog_timeout: Duration,
    poll_interval: Duration,
    estimator: Estimator,
}

impl TokenOrchestrator {
    pub fn new(
        budget: u32,
        watchdog_timeout: Duration,
        poll_interval: Duration,
        estimator: Estimator,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(TokenState { current_usage: 0 }),
                released: Notify::new(),
            }),
            budget: u64::from(budget),
            watchdog_timeout,
            poll_interval,
            estimator,
        }
    }

    /// Budget ceiling in tokens per minute
    pub fn budget(&self) -> u64 {
        self.budget
    }

    /// Currently committed token usage
    pub fn current_usage(&self) -> u64 {
        self.shared
            .state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .current_usage
    }

    /// Reserve the estimated cost of `content` against the budget.
    ///
    /// Waits until the reservation fits. Waiters are woken on every release
    /// (explicit or watchdog), with the configured poll interval as a
    /// timeout safety net. A cost larger than the whole budget is clamped
    /// so an oversized item waits for an empty budget instead of forever.
    pub async fn register(&self, content: &str) -> TokenReservation {
        let estimated = u64::from(self.estimator.estimate(content));
        let cost = if estimated > self.budget {
            tracing::warn!(
                estimated,
                budget = self.budget,
                "Estimated cost exceeds the whole budget, clamping"
            );
            self.budget
        } else {
            estimated
        };

        let started = Instant::now();
        let mut waited = false;
        loop {
            {
                let mut state = self.shared.state.lock().unwrap_or_else(|e| e.into_inner());
                if state.current_usage + cost <= self.budget {
                    state.current_usage += cost;
                    metrics::gauge!("pacer_token_usage").set(state.current_usage as f64);
                    break;
                }
            }
            waited = true;
            // Wake on release or after the poll interval, whichever is first
            let _ = tokio::time::timeout(self.poll_interval, self.shared.released.notified()).await;
        }

        if waited {
            tracing::debug!(
                tokens = cost,
                waited_ms = started.elapsed().as_millis() as u64,
                "Admitted after waiting for budget"
            );
        }

        let claimed = Arc::new(AtomicBool::new(false));
        let deadline = Instant::now() + self.watchdog_timeout;
        let id = Uuid::new_v4();
        let watchdog = self.spawn_watchdog(id, cost as u32, Arc::clone(&claimed));

        TokenReservation {
            id,
            tokens: cost as u32,
            deadline,
            claimed,
            watchdog,
        }
    }

    /// Release a reservation.
    ///
    /// Safe to call on an already-completed or already-expired reservation;
    /// the release happens at most once.
    pub fn complete(&self, reservation: &TokenReservation) {
        if reservation.claimed.swap(true, Ordering::SeqCst) {
            return;
        }
        reservation.watchdog.abort();
        self.shared.release(reservation.tokens);
        tracing::trace!(
            reservation_id = %reservation.id,
            tokens = reservation.tokens,
            "Reservation completed"
        );
    }

    fn spawn_watchdog(&self, id: Uuid, tokens: u32, claimed: Arc<AtomicBool>) -> JoinHandle<()> {
        let shared = Arc::clone(&self.shared);
        let timeout = self.watchdog_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if claimed.swap(true, Ordering::SeqCst) {
                return;
            }
            shared.release(tokens);
            metrics::counter!("pacer_watchdog_releases_total").increment(1);
            tracing::warn!(
                reservation_id = %id,
                tokens,
                timeout_s = timeout.as_secs(),
                "Watchdog released an abandoned token reservation"
            );
        })
    }
}
