//! Bounded multi-producer/multi-consumer queue with explicit producer
//! refcounting. A queue closes itself — waking every blocked consumer with
//! `None` — the instant its producer count drops to zero *and* it is empty.
//! This is the shutdown-propagation primitive used to drain the router,
//! admission, store and box-connection pipelines without a dedicated
//! shutdown channel per stage.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex, Notify};

/// A simple atomic counter used for connector/queue load accounting.
#[derive(Debug, Default)]
pub struct Counter(AtomicI64);

impl Counter {
    pub fn new(initial: i64) -> Self {
        Self(AtomicI64::new(initial))
    }

    pub fn increase(&self) -> i64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn decrease(&self) -> i64 {
        self.0.fetch_sub(1, Ordering::SeqCst) - 1
    }

    pub fn get(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }

    pub fn set(&self, value: i64) {
        self.0.store(value, Ordering::SeqCst);
    }
}

struct Inner<T> {
    items: Mutex<VecDeque<T>>,
    notify: Notify,
    producers: AtomicUsize,
}

/// A cloneable handle onto a shared bounded-in-spirit FIFO queue. There is no
/// hard capacity limit (messages are small and backpressure is handled at
/// the socket level), but every producer must register via [`Queue::producer`]
/// so the queue knows when it is truly done.
pub struct Queue<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Queue<T> {
    fn clone(&self) -> Self {
        Queue {
            inner: self.inner.clone(),
        }
    }
}

/// RAII handle representing one producer's claim on a queue. Dropping it
/// decrements the producer count and wakes consumers so an empty, producer-
/// less queue can be observed as closed.
pub struct Producer<T> {
    queue: Queue<T>,
}

impl<T> Drop for Producer<T> {
    fn drop(&mut self) {
        let remaining = self.queue.inner.producers.fetch_sub(1, Ordering::SeqCst) - 1;
        if remaining == 0 {
            self.queue.inner.notify.notify_waiters();
        }
    }
}

impl<T> Queue<T> {
    pub fn new() -> Self {
        Queue {
            inner: Arc::new(Inner {
                items: Mutex::new(VecDeque::new()),
                notify: Notify::new(),
                producers: AtomicUsize::new(0),
            }),
        }
    }

    /// Register a new producer. The queue stays open at least until every
    /// issued `Producer` handle has been dropped.
    pub fn producer(&self) -> Producer<T> {
        self.inner.producers.fetch_add(1, Ordering::SeqCst);
        Producer {
            queue: self.clone(),
        }
    }

    pub fn producer_count(&self) -> usize {
        self.inner.producers.load(Ordering::SeqCst)
    }

    /// Push an item and wake one waiting consumer. Never blocks.
    pub async fn produce(&self, item: T) {
        let mut items = self.inner.items.lock().await;
        items.push_back(item);
        drop(items);
        self.inner.notify.notify_one();
    }

    pub async fn len(&self) -> usize {
        self.inner.items.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Pop the next item, waiting if the queue is empty. Returns `None`
    /// exactly when the queue is empty and has no remaining producers —
    /// the canonical "channel closed" signal for this primitive.
    pub async fn consume(&self) -> Option<T> {
        loop {
            {
                let mut items = self.inner.items.lock().await;
                if let Some(item) = items.pop_front() {
                    return Some(item);
                }
                if self.inner.producers.load(Ordering::SeqCst) == 0 {
                    return None;
                }
            }
            self.inner.notify.notified().await;
        }
    }
}

impl<T> Default for Queue<T> {
    fn default() -> Self {
        Self::new()
    }
}
