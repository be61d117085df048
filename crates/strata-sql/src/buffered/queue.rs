//! Bounded FIFO of pending writes.

use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::Semaphore;

use crate::error::StrataError;
use crate::parameter::PreparedOperation;

/// Bounded queue of prepared creates.
///
/// Capacity is accounted with a semaphore. A producer takes one slot when it
/// enqueues and the slot is returned only once the item's batch has been accepted by
/// the worker pool, so items returned to the queue after a rejected submission never
/// push it past capacity.
pub(crate) struct EventQueue {
    items: Mutex<VecDeque<PreparedOperation>>,
    slots: Semaphore,
    capacity: usize,
}

impl EventQueue {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            slots: Semaphore::new(capacity),
            capacity,
        }
    }

    /// Enqueue `item`, waiting while the queue is full. Fails once the queue is
    /// closed, including for producers already waiting.
    pub(crate) async fn push(&self, item: PreparedOperation) -> Result<(), StrataError> {
        let permit = self
            .slots
            .acquire()
            .await
            .map_err(|_| StrataError::ExecutorClosed)?;
        permit.forget();
        self.lock().push_back(item);
        Ok(())
    }

    /// Remove the oldest item and up to `max - 1` later items sharing its statement
    /// template. Items with other templates keep their relative order.
    pub(crate) fn drain_batch(&self, max: usize) -> Vec<PreparedOperation> {
        let mut items = self.lock();
        let Some(head) = items.pop_front() else {
            return Vec::new();
        };

        let mut batch = Vec::with_capacity(max.min(items.len() + 1));
        batch.push(head);

        let mut i = 0;
        while batch.len() < max && i < items.len() {
            if items[i].shares_template(&batch[0]) {
                if let Some(item) = items.remove(i) {
                    batch.push(item);
                }
            } else {
                i += 1;
            }
        }
        batch
    }

    /// Put a batch back at the head of the queue, in its original order. Its slots
    /// are still held, so this never waits.
    pub(crate) fn requeue(&self, batch: Vec<PreparedOperation>) {
        let mut items = self.lock();
        for item in batch.into_iter().rev() {
            items.push_front(item);
        }
    }

    /// Return `count` slots once their items have left the queue for good.
    pub(crate) fn release(&self, count: usize) {
        self.slots.add_permits(count);
    }

    /// Refuse new items and wake waiting producers.
    pub(crate) fn close(&self) {
        self.slots.close();
    }

    /// Drop everything still queued, returning how many items were discarded.
    pub(crate) fn discard(&self) -> usize {
        let mut items = self.lock();
        let count = items.len();
        items.clear();
        count
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    /// Free slots. Slots of drained items not yet accepted by the pool count as used.
    pub(crate) fn available(&self) -> usize {
        self.slots.available_permits()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<PreparedOperation>> {
        // Poisoning is ignored: no critical section leaves the deque half-updated.
        self.items.lock().unwrap_or_else(|e| e.into_inner())
    }
}
