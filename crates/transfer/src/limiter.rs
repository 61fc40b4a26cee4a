use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::TransferError;

/// Fixed-capacity pool of transfer slots.
///
/// An explicit object rather than process-wide state so independent engines
/// (and tests) never share capacity by accident; engines that should share
/// a budget are handed the same `Arc<SlotPool>`.
pub struct SlotPool {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

/// Permit for one active transfer attempt loop.
///
/// Released when dropped, on every exit path.
pub struct Slot {
    _permit: OwnedSemaphorePermit,
}

impl SlotPool {
    /// Creates a pool with `capacity` slots (floored at one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Waits until a slot frees or `cancel` fires, whichever is first.
    ///
    /// A cancelled acquire consumes no permit. Waiters are served in FIFO
    /// order.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<Slot, TransferError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(TransferError::Cancelled),
            permit = Arc::clone(&self.semaphore).acquire_owned() => {
                // The pool never closes its semaphore; a closed semaphore
                // can only mean the engine is tearing down.
                permit
                    .map(|p| Slot { _permit: p })
                    .map_err(|_| TransferError::Cancelled)
            }
        }
    }

    /// Slots not currently held.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Total slot count.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
