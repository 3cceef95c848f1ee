//! # Message Queue
//!
//! Bounded FIFO buffer between the network and one duty runner.
//!
//! - `add_message` refuses new messages once the queue is full instead of
//!   growing without bound.
//! - `pop_message` takes the first message the caller's filter admits.
//!   Messages the filter marks [`Admission::Drop`] are removed on the way,
//!   so stale messages are discarded lazily rather than by a sweeper.
//! - Deferred messages (future heights or rounds) stay in place.

use crate::domain::{QbftError, QbftResult};
use crate::metrics;
use parking_lot::Mutex;
use std::collections::VecDeque;
use tokio::sync::Notify;
use tracing::debug;

pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Filter verdict for one queued message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Process now.
    Eligible,
    /// Keep for later.
    Defer,
    /// Discard.
    Drop,
}

#[derive(Debug)]
pub struct MessageQueue<T> {
    inner: Mutex<VecDeque<T>>,
    capacity: usize,
    notify: Notify,
}

impl<T: Clone> MessageQueue<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity.min(DEFAULT_QUEUE_CAPACITY))),
            capacity,
            notify: Notify::new(),
        }
    }

    pub fn add_message(&self, msg: T) -> QbftResult<()> {
        {
            let mut queue = self.inner.lock();
            if queue.len() >= self.capacity {
                metrics::record_queue_refused();
                return Err(QbftError::QueueFull {
                    capacity: self.capacity,
                });
            }
            queue.push_back(msg);
        }
        self.notify.notify_one();
        Ok(())
    }

    /// Remove and return the first message `filter` marks eligible, dropping
    /// the ones it marks stale along the way.
    pub fn pop_message<F>(&self, mut filter: F) -> Option<T>
    where
        F: FnMut(&T) -> Admission,
    {
        let mut queue = self.inner.lock();
        let mut dropped = 0usize;
        let mut idx = 0;
        let mut found = None;

        while idx < queue.len() {
            match filter(&queue[idx]) {
                Admission::Eligible => {
                    found = queue.remove(idx);
                    break;
                }
                Admission::Drop => {
                    queue.remove(idx);
                    dropped += 1;
                }
                Admission::Defer => idx += 1,
            }
        }

        if dropped > 0 {
            debug!(dropped, remaining = queue.len(), "Dropped stale messages");
            metrics::record_stale_dropped(dropped);
        }
        found
    }

    /// Copies of every queued message `filter` accepts. Nothing is removed.
    pub fn scan<F>(&self, mut filter: F) -> Vec<T>
    where
        F: FnMut(&T) -> bool,
    {
        self.inner
            .lock()
            .iter()
            .filter(|msg| filter(msg))
            .cloned()
            .collect()
    }

    /// Remove every message matching `predicate`. Returns how many went.
    pub fn purge<F>(&self, mut predicate: F) -> usize
    where
        F: FnMut(&T) -> bool,
    {
        let mut queue = self.inner.lock();
        let before = queue.len();
        queue.retain(|msg| !predicate(msg));
        before - queue.len()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Resolves after the next `add_message`, or immediately if one happened
    /// since the last wait.
    pub async fn wait_for_message(&self) {
        self.notify.notified().await;
    }
}

impl<T: Clone> Default for MessageQueue<T> {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_full_queue_refuses() {
        let queue = MessageQueue::new(2);
        queue.add_message(1u64).unwrap();
        queue.add_message(2u64).unwrap();
        let err = queue.add_message(3u64).unwrap_err();
        assert!(matches!(err, QbftError::QueueFull { capacity: 2 }));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_pop_skips_deferred_and_drops_stale() {
        let queue = MessageQueue::new(8);
        for value in [1u64, 5, 2, 7] {
            queue.add_message(value).unwrap();
        }

        // < 2 stale, > 5 deferred
        let filter = |v: &u64| match *v {
            v if v < 2 => Admission::Drop,
            v if v > 5 => Admission::Defer,
            _ => Admission::Eligible,
        };

        assert_eq!(queue.pop_message(filter), Some(5));
        assert_eq!(queue.pop_message(filter), Some(2));
        assert_eq!(queue.pop_message(filter), None);
        assert_eq!(queue.scan(|_| true), vec![7]);
    }

    #[test]
    fn test_scan_does_not_consume() {
        let queue = MessageQueue::new(8);
        queue.add_message(3u64).unwrap();
        queue.add_message(4u64).unwrap();
        assert_eq!(queue.scan(|v| *v > 3), vec![4]);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_purge() {
        let queue = MessageQueue::new(8);
        for value in 0u64..6 {
            queue.add_message(value).unwrap();
        }
        assert_eq!(queue.purge(|v| v % 2 == 0), 3);
        assert_eq!(queue.scan(|_| true), vec![1, 3, 5]);
    }

    #[tokio::test]
    async fn test_wait_wakes_on_add() {
        let queue = Arc::new(MessageQueue::new(4));
        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.wait_for_message().await })
        };
        queue.add_message(1u64).unwrap();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter not woken")
            .unwrap();
    }
}
