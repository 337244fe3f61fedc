//! Bounded single-consumer async FIFO with a drain signal.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;

/// An async FIFO with a soft capacity.
///
/// `push` never blocks and never drops items; it returns `false` once the
/// queue has reached capacity so the producer can suspend until
/// [`BoundedQueue::drained`] resolves. The single consumer iterates with
/// [`BoundedQueue::next`], which terminates only after the queue has been
/// completed *and* emptied.
pub struct BoundedQueue<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for BoundedQueue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<T> {
    capacity: usize,
    state: Mutex<State<T>>,
    items: Notify,
    drain: Notify,
}

struct State<T> {
    buf: VecDeque<T>,
    completed: bool,
}

impl<T> BoundedQueue<T> {
    /// Create a queue with the given capacity (minimum 1).
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                capacity: capacity.max(1),
                state: Mutex::new(State {
                    buf: VecDeque::new(),
                    completed: false,
                }),
                items: Notify::new(),
                drain: Notify::new(),
            }),
        }
    }

    /// Enqueue an item.
    ///
    /// Returns `true` while the queue remains below capacity, `false` once
    /// it is full. Pushing beyond capacity is allowed but the producer
    /// should wait on [`BoundedQueue::drained`] first.
    pub fn push(&self, item: T) -> bool {
        let len = {
            let mut state = self.inner.state.lock().expect("queue lock poisoned");
            state.buf.push_back(item);
            state.buf.len()
        };
        self.inner.items.notify_one();
        len < self.inner.capacity
    }

    /// Signal that no more items will be pushed.
    pub fn complete(&self) {
        {
            let mut state = self.inner.state.lock().expect("queue lock poisoned");
            state.completed = true;
        }
        self.inner.items.notify_one();
    }

    /// Dequeue the next item.
    ///
    /// Waits while the queue is empty and not yet completed. Items buffered
    /// at completion time are drained before `None` is returned.
    pub async fn next(&self) -> Option<T> {
        loop {
            // Register interest before checking state to avoid a lost wakeup.
            let notified = self.inner.items.notified();
            {
                let mut state = self.inner.state.lock().expect("queue lock poisoned");
                if let Some(item) = state.buf.pop_front() {
                    // Signal a suspended producer on the full -> not-full
                    // edge. notify_one stores a permit, so the producer
                    // cannot miss the edge between its check and its await.
                    if state.buf.len() + 1 == self.inner.capacity {
                        self.inner.drain.notify_one();
                    }
                    return Some(item);
                }
                if state.completed {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Wait until the queue size is below capacity.
    pub async fn drained(&self) {
        loop {
            let notified = self.inner.drain.notified();
            {
                let state = self.inner.state.lock().expect("queue lock poisoned");
                if state.buf.len() < self.inner.capacity {
                    return;
                }
            }
            notified.await;
        }
    }

    /// Current number of buffered items.
    pub fn len(&self) -> usize {
        self.inner.state.lock().expect("queue lock poisoned").buf.len()
    }

    /// True when no items are buffered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fifo_order() {
        let queue = BoundedQueue::new(4);
        queue.push(1);
        queue.push(2);
        queue.push(3);
        queue.complete();
        assert_eq!(queue.next().await, Some(1));
        assert_eq!(queue.next().await, Some(2));
        assert_eq!(queue.next().await, Some(3));
        assert_eq!(queue.next().await, None);
    }

    #[tokio::test]
    async fn push_reports_full_at_capacity() {
        let queue = BoundedQueue::new(2);
        assert!(queue.push(1));
        assert!(!queue.push(2));
        // Pushing beyond capacity is allowed but still reports full.
        assert!(!queue.push(3));
        assert_eq!(queue.len(), 3);
    }

    #[tokio::test]
    async fn completed_queue_drains_buffered_items() {
        let queue = BoundedQueue::new(1);
        queue.push("a");
        queue.push("b");
        queue.complete();
        assert_eq!(queue.next().await, Some("a"));
        assert_eq!(queue.next().await, Some("b"));
        assert_eq!(queue.next().await, None);
        // Terminated queues stay terminated.
        assert_eq!(queue.next().await, None);
    }

    #[tokio::test]
    async fn consumer_waits_for_producer() {
        let queue = BoundedQueue::new(2);
        let producer = queue.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            producer.push(42);
            producer.complete();
        });
        assert_eq!(queue.next().await, Some(42));
        assert_eq!(queue.next().await, None);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn drain_wakes_suspended_producer() {
        let queue = BoundedQueue::new(2);
        assert!(queue.push(1));
        assert!(!queue.push(2));

        let producer = queue.clone();
        let handle = tokio::spawn(async move {
            producer.drained().await;
            producer.push(3);
            producer.complete();
        });

        assert_eq!(queue.next().await, Some(1));
        assert_eq!(queue.next().await, Some(2));
        assert_eq!(queue.next().await, Some(3));
        assert_eq!(queue.next().await, None);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn drained_returns_immediately_below_capacity() {
        let queue: BoundedQueue<u8> = BoundedQueue::new(2);
        queue.push(1);
        queue.drained().await;
    }

    #[tokio::test]
    async fn capacity_clamped_to_one() {
        let queue = BoundedQueue::new(0);
        assert!(!queue.push(1));
        queue.complete();
        assert_eq!(queue.next().await, Some(1));
    }
}
