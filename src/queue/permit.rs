//! Resizable counting permit pool
//!
//! Bounds how many units of work a queue runs simultaneously. Unlike a bare
//! semaphore, the pool supports safe shrinking while permits are lent out:
//! idle permits are forgotten immediately, and any remainder is recorded as
//! debt that in-flight holders repay as they release. Outstanding permits
//! are never stranded and the limit never drops below 1.

use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::Semaphore;

/// Errors from permit pool operations
#[derive(Debug, Error)]
pub enum PermitError {
    /// The pool's semaphore was closed (the pool was dropped mid-acquire)
    #[error("Permit pool is closed")]
    Closed,
}

struct PoolState {
    limit: usize,
    /// Permits owed after a shrink that could not reclaim enough idle
    /// permits. Repaid on release instead of returning to the semaphore.
    debt: usize,
}

/// Counting concurrency gate with safe dynamic resize.
pub struct PermitPool {
    semaphore: Arc<Semaphore>,
    state: Mutex<PoolState>,
}

impl PermitPool {
    /// Create a pool with `limit` permits (clamped to at least 1).
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(limit)),
            state: Mutex::new(PoolState { limit, debt: 0 }),
        }
    }

    /// Acquire one permit, waiting until a slot frees.
    ///
    /// The permit is detached from RAII so that [`PermitPool::release`] can
    /// route it through the debt ledger on the way back.
    pub async fn acquire(&self) -> Result<(), PermitError> {
        match self.semaphore.acquire().await {
            Ok(permit) => {
                permit.forget();
                Ok(())
            }
            Err(_) => Err(PermitError::Closed),
        }
    }

    /// Return one permit to the pool.
    ///
    /// If a shrink left the pool in debt, the permit retires the debt
    /// instead of re-entering circulation.
    pub fn release(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.debt > 0 {
            state.debt -= 1;
        } else {
            self.semaphore.add_permits(1);
        }
    }

    /// Adjust the pool size. Growth adds permits immediately; shrinking
    /// forgets idle permits first and defers the rest to the debt ledger so
    /// in-flight holders finish unaffected.
    pub fn resize(&self, new_limit: usize) {
        let new_limit = new_limit.max(1);
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if new_limit > state.limit {
            // Growth first cancels against outstanding shrink debt; only
            // the remainder mints new permits, so in-flight holders plus
            // available permits never exceed the new limit.
            let grow = new_limit - state.limit;
            let retired = grow.min(state.debt);
            state.debt -= retired;
            self.semaphore.add_permits(grow - retired);
        } else if new_limit < state.limit {
            let shrink_by = state.limit - new_limit;
            let forgotten = self.semaphore.forget_permits(shrink_by);
            state.debt += shrink_by - forgotten;
        }
        state.limit = new_limit;
    }

    /// Configured limit
    pub fn limit(&self) -> usize {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).limit
    }

    /// Permits currently available for acquisition
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}
