//! Bounded concurrency for delegate queries.
//!
//! A fair `tokio::sync::Semaphore`: at most `max` holders at once, with
//! later callers waiting in FIFO order. Each freed slot releases exactly
//! one waiter. Waiters have no individual timeout.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use threadwise_core::error::DelegateError;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

pub struct ConcurrencyGate {
    semaphore: Arc<Semaphore>,
    max: usize,
    active: Arc<AtomicUsize>,
    queued: Arc<AtomicUsize>,
}

/// A held slot. Dropping it frees the slot for the next waiter.
#[derive(Debug)]
pub struct GatePermit {
    _permit: OwnedSemaphorePermit,
    active: Arc<AtomicUsize>,
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Decrements the queue count even if the waiting future is dropped.
struct QueuedGuard(Arc<AtomicUsize>);

impl Drop for QueuedGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ConcurrencyGate {
    pub fn new(max: usize) -> Self {
        let max = max.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(max)),
            max,
            active: Arc::new(AtomicUsize::new(0)),
            queued: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn max(&self) -> usize {
        self.max
    }

    /// Calls currently holding a slot.
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Calls waiting for a slot.
    pub fn queued(&self) -> usize {
        self.queued.load(Ordering::SeqCst)
    }

    /// Wait for a slot.
    pub async fn acquire(&self) -> Result<GatePermit, DelegateError> {
        let permit = match Arc::clone(&self.semaphore).try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                self.queued.fetch_add(1, Ordering::SeqCst);
                let _queued = QueuedGuard(Arc::clone(&self.queued));
                debug!(active = self.active(), queued = self.queued(), "Delegate query queued");
                Arc::clone(&self.semaphore)
                    .acquire_owned()
                    .await
                    .map_err(|_| DelegateError::Unavailable("delegate queue closed".into()))?
            }
        };

        self.active.fetch_add(1, Ordering::SeqCst);
        Ok(GatePermit {
            _permit: permit,
            active: Arc::clone(&self.active),
        })
    }
}
