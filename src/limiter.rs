//! Batch concurrency sizing from the per-minute token budget

use crate::estimator::Estimator;

/// Derives how many units of a batch may safely run at once.
///
/// The result seeds a task queue's permit pool at creation time; it is a
/// one-time sizing decision, not re-evaluated per item.
pub struct ConcurrencyLimiter {
    budget_per_minute: u32,
    estimator: Estimator,
}

impl ConcurrencyLimiter {
    pub fn new(budget_per_minute: u32, estimator: Estimator) -> Self {
        Self {
            budget_per_minute,
            estimator,
        }
    }

    /// Compute the maximum simultaneous in-flight requests for a batch.
    ///
    /// Divides the per-minute budget by the mean estimated cost per item,
    /// clamped to `[1, texts.len()]`. A single oversized item must not
    /// starve the batch of all concurrency, and concurrency never exceeds
    /// the number of items actually queued. An empty batch yields 1.
    pub fn max_concurrency<T: AsRef<str>>(&self, texts: &[T]) -> usize {
        let total: u64 = texts
            .iter()
            .map(|t| u64::from(self.estimator.estimate(t.as_ref())))
            .sum();
        let len = texts.len().max(1) as u64;

        // budget / (total / len), flooring only once at the end; flooring
        // the mean first would admit more than the budget supports
        let max_tasks = (u64::from(self.budget_per_minute) * len / total.max(1)) as usize;
        max_tasks.min(texts.len()).max(1)
    }
}
