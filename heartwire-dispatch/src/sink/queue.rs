use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use heartwire_core::{Emitter, Tick};
use serde::Serialize;
use tokio::sync::Notify;
use tracing::warn;

/// Bounded tick buffer between the assembler and the sink drain.
///
/// Pushing never blocks. When full, the oldest tick is discarded to make
/// room and the drop is counted.
#[derive(Debug)]
pub struct TickQueue {
    ticks: Mutex<VecDeque<Tick>>,
    capacity: usize,
    notify: Notify,
    pushed: AtomicU64,
    dropped: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueCounts {
    pub len: usize,
    pub capacity: usize,
    pub pushed: u64,
    pub dropped: u64,
}

impl TickQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            ticks: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            notify: Notify::new(),
            pushed: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Appends a tick, returning the one evicted to make room, if any.
    pub fn push(&self, tick: Tick) -> Option<Tick> {
        let evicted = {
            let mut ticks = self.ticks.lock().unwrap_or_else(PoisonError::into_inner);
            let evicted = if ticks.len() >= self.capacity {
                ticks.pop_front()
            } else {
                None
            };
            ticks.push_back(tick);
            evicted
        };
        self.pushed.fetch_add(1, Ordering::Relaxed);

        if evicted.is_some() {
            let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            if dropped == 1 || dropped % 1000 == 0 {
                warn!(dropped, capacity = self.capacity, "Tick queue full, dropping oldest");
            }
        }

        self.notify.notify_one();
        evicted
    }

    pub fn try_pop(&self) -> Option<Tick> {
        self.ticks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }

    /// Waits for the next tick.
    pub async fn pop(&self) -> Tick {
        loop {
            if let Some(tick) = self.try_pop() {
                return tick;
            }
            self.notify.notified().await;
        }
    }

    pub fn len(&self) -> usize {
        self.ticks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn counts(&self) -> QueueCounts {
        QueueCounts {
            len: self.len(),
            capacity: self.capacity,
            pushed: self.pushed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

impl Emitter for TickQueue {
    fn emit(&self, tick: Tick) {
        self.push(tick);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use heartwire_core::TickSource;
    use std::sync::Arc;
    use std::time::Duration;

    fn tick(ecg: f32) -> Tick {
        Tick {
            timestamp: jiff::Timestamp::UNIX_EPOCH,
            source: TickSource::Ecg,
            values: [Some(ecg), None, None, None, None, None],
        }
    }

    #[test]
    fn overflow_drops_oldest() {
        let queue = TickQueue::new(3);

        for i in 0..5 {
            queue.push(tick(i as f32));
        }

        let remaining: Vec<_> = std::iter::from_fn(|| queue.try_pop())
            .map(|t| t.values[0])
            .collect();
        assert_eq!(remaining, vec![Some(2.0), Some(3.0), Some(4.0)]);

        let counts = queue.counts();
        assert_eq!(counts.pushed, 5);
        assert_eq!(counts.dropped, 2);
        assert_eq!(counts.len, 0);
    }

    #[test]
    fn push_returns_evicted_tick() {
        let queue = TickQueue::new(1);

        assert!(queue.push(tick(1.0)).is_none());
        let evicted = queue.push(tick(2.0)).unwrap();
        assert_eq!(evicted.values[0], Some(1.0));
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let queue = TickQueue::new(0);
        assert_eq!(queue.capacity(), 1);
    }

    #[tokio::test]
    async fn pop_wakes_on_push() {
        let queue = Arc::new(TickQueue::new(8));

        let waiter = tokio::spawn({
            let queue = Arc::clone(&queue);
            async move { queue.pop().await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.emit(tick(7.0));

        let popped = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(popped.values[0], Some(7.0));
    }
}
