//! Bounded line queue between the ingest and tracker tasks
//!
//! Single producer, single consumer. The producer never blocks: when the
//! queue is full, the oldest queued line is evicted so the newest is always
//! admitted. Real-time tracking prefers fresh measurements over complete
//! history, so backpressure discards from the head.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;

/// Counter snapshot for the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueStats {
    /// Lines admitted since start
    pub pushed: u64,
    /// Lines evicted on overflow
    pub dropped: u64,
}

struct QueueInner {
    lines: VecDeque<String>,
    stats: QueueStats,
}

/// Bounded FIFO of raw measurement lines, shared via `Arc` between exactly
/// one producer task and one consumer task.
pub struct IngestQueue {
    inner: Mutex<QueueInner>,
    notify: Notify,
    capacity: usize,
}

impl IngestQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                lines: VecDeque::with_capacity(capacity.max(1)),
                stats: QueueStats::default(),
            }),
            notify: Notify::new(),
            capacity: capacity.max(1),
        }
    }

    /// Admits a line, evicting the oldest queued line when full.
    ///
    /// Returns `true` if an eviction happened.
    pub fn push(&self, line: String) -> bool {
        let dropped = {
            let mut inner = self.lock();
            let dropped = if inner.lines.len() == self.capacity {
                inner.lines.pop_front();
                inner.stats.dropped += 1;
                true
            } else {
                false
            };
            inner.lines.push_back(line);
            inner.stats.pushed += 1;
            dropped
        };
        self.notify.notify_one();
        dropped
    }

    /// Pops the oldest queued line without waiting.
    pub fn pop(&self) -> Option<String> {
        self.lock().lines.pop_front()
    }

    /// Pops the oldest queued line, waiting up to `timeout` for one to
    /// arrive. Returns `None` on timeout.
    pub async fn pop_timeout(&self, timeout: Duration) -> Option<String> {
        if let Some(line) = self.pop() {
            return Some(line);
        }
        // Notify stores a permit when nobody is waiting, so a push between
        // the pop above and this await still wakes us.
        let _ = tokio::time::timeout(timeout, self.notify.notified()).await;
        self.pop()
    }

    pub fn len(&self) -> usize {
        self.lock().lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().lines.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> QueueStats {
        self.lock().stats
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
