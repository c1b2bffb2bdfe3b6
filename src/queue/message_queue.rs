use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use thiserror::Error;
use tokio::sync::Notify;

/// What a full queue does with a new arrival
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Producer waits until a consumer makes room
    #[default]
    Block,
    /// Oldest entry is evicted so the producer never waits
    Rotate,
}

/// Returned when pushing into a closed queue; hands the item back
#[derive(Error)]
#[error("Queue is closed")]
pub struct QueueClosed<T>(pub T);

impl<T> fmt::Debug for QueueClosed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("QueueClosed(..)")
    }
}

struct QueueState<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// Bounded FIFO of pending messages for one connector.
///
/// The capacity is a read-ahead limit for producers. Requeues from the
/// consumer side may exceed it so a retried message is never lost.
pub struct MessageQueue<T> {
    state: Mutex<QueueState<T>>,
    capacity: usize,
    policy: OverflowPolicy,
    not_empty: Notify,
    not_full: Notify,
}

impl<T> fmt::Debug for MessageQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageQueue")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .field("policy", &self.policy)
            .finish()
    }
}

impl<T> MessageQueue<T> {
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(capacity.min(1024)),
                closed: false,
            }),
            capacity: capacity.max(1),
            policy,
            not_empty: Notify::new(),
            not_full: Notify::new(),
        }
    }

    /// Enqueue at the back, waiting for room when the queue blocks on overflow.
    ///
    /// Returns the evicted entry when a rotating queue was full.
    pub async fn push(&self, item: T) -> Result<Option<T>, QueueClosed<T>> {
        let mut item = item;
        loop {
            let notified = self.not_full.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.try_push(item) {
                Err(TryPushError::Full(returned)) => item = returned,
                Err(TryPushError::Closed(returned)) => return Err(QueueClosed(returned)),
                Ok(evicted) => return Ok(evicted),
            }

            notified.await;
        }
    }

    /// Enqueue without waiting
    pub fn try_push(&self, item: T) -> Result<Option<T>, TryPushError<T>> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(TryPushError::Closed(item));
        }

        let evicted = if state.items.len() < self.capacity {
            None
        } else {
            match self.policy {
                OverflowPolicy::Block => return Err(TryPushError::Full(item)),
                OverflowPolicy::Rotate => state.items.pop_front(),
            }
        };

        state.items.push_back(item);
        drop(state);
        self.not_empty.notify_one();
        Ok(evicted)
    }

    /// Dequeue from the front, waiting while empty. `None` once closed and drained.
    pub async fn pop(&self) -> Option<T> {
        loop {
            let notified = self.not_empty.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state.lock();
                if let Some(item) = state.items.pop_front() {
                    drop(state);
                    self.not_full.notify_one();
                    return Some(item);
                }
                if state.closed {
                    return None;
                }
            }

            notified.await;
        }
    }

    pub fn try_pop(&self) -> Option<T> {
        let item = self.state.lock().items.pop_front();
        if item.is_some() {
            self.not_full.notify_one();
        }
        item
    }

    /// Put a message back at the head so it is retried next
    pub fn requeue_front(&self, item: T) {
        self.state.lock().items.push_front(item);
        self.not_empty.notify_one();
    }

    /// Put a message at the tail so other messages go first
    pub fn requeue_back(&self, item: T) {
        self.state.lock().items.push_back(item);
        self.not_empty.notify_one();
    }

    /// Refuse further pushes and wake every waiter
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.not_empty.notify_waiters();
        self.not_full.notify_waiters();
    }

    pub fn drain(&self) -> Vec<T> {
        let drained: Vec<T> = self.state.lock().items.drain(..).collect();
        self.not_full.notify_waiters();
        drained
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }
}

#[derive(Error)]
pub enum TryPushError<T> {
    #[error("Queue is full")]
    Full(T),
    #[error("Queue is closed")]
    Closed(T),
}

impl<T> fmt::Debug for TryPushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full(_) => f.write_str("Full(..)"),
            Self::Closed(_) => f.write_str("Closed(..)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_fifo_order() {
        let queue = MessageQueue::new(4, OverflowPolicy::Block);
        for i in 0..3 {
            queue.push(i).await.unwrap();
        }
        assert_eq!(queue.pop().await, Some(0));
        assert_eq!(queue.pop().await, Some(1));
        assert_eq!(queue.pop().await, Some(2));
    }

    #[tokio::test]
    async fn test_full_blocking_queue_waits_for_consumer() {
        let queue = Arc::new(MessageQueue::new(1, OverflowPolicy::Block));
        queue.push(1).await.unwrap();

        let producer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.push(2).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!producer.is_finished());
        assert_eq!(queue.len(), 1);

        assert_eq!(queue.pop().await, Some(1));
        let evicted = tokio::time::timeout(Duration::from_secs(1), producer)
            .await
            .expect("producer should resume")
            .unwrap()
            .unwrap();
        assert!(evicted.is_none());
        assert_eq!(queue.pop().await, Some(2));
    }

    #[tokio::test]
    async fn test_rotating_queue_evicts_oldest() {
        let queue = MessageQueue::new(2, OverflowPolicy::Rotate);
        assert_eq!(queue.push(1).await.unwrap(), None);
        assert_eq!(queue.push(2).await.unwrap(), None);
        assert_eq!(queue.push(3).await.unwrap(), Some(1));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.try_pop(), Some(2));
        assert_eq!(queue.try_pop(), Some(3));
    }

    #[tokio::test]
    async fn test_close_releases_waiting_consumer() {
        let queue: Arc<MessageQueue<u32>> = Arc::new(MessageQueue::new(2, OverflowPolicy::Block));
        let consumer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.pop().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.close();
        assert_eq!(consumer.await.unwrap(), None);
        assert!(queue.push(5).await.is_err());
    }

    #[test]
    fn test_requeue_may_exceed_capacity() {
        let queue = MessageQueue::new(1, OverflowPolicy::Block);
        queue.try_push("a").unwrap();
        queue.requeue_front("retry");
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.try_pop(), Some("retry"));
        assert!(matches!(queue.try_push("b"), Err(TryPushError::Full("b"))));
        assert_eq!(queue.try_pop(), Some("a"));
        assert!(matches!(queue.try_push("b"), Ok(None)));
    }

    #[test]
    fn test_debug_reports_length_for_any_item_type() {
        let queue: MessageQueue<std::rc::Rc<u32>> = MessageQueue::new(3, OverflowPolicy::Rotate);
        queue.try_push(std::rc::Rc::new(7)).unwrap();
        let debug = format!("{queue:?}");
        assert!(debug.contains("len: 1"), "{debug}");
        assert!(debug.contains("Rotate"));
    }
}
