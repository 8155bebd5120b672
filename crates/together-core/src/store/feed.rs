//! In-process change feed keyed by topic.
//!
//! Each subscriber owns an unbounded channel. Publishing fans an event out
//! to every live subscriber of the topic, in publish order, so per-topic
//! delivery is FIFO. Subscriptions detach when unsubscribed or dropped.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::rc::{Rc, Weak};

use tokio::sync::mpsc;

type Subscribers<K, E> = HashMap<K, Vec<(u64, mpsc::UnboundedSender<E>)>>;

struct FeedInner<K, E> {
    next_id: u64,
    subscribers: Subscribers<K, E>,
}

/// Topic-keyed fan-out of change events.
pub struct ChangeFeed<K, E> {
    inner: Rc<RefCell<FeedInner<K, E>>>,
}

impl<K, E> Default for ChangeFeed<K, E> {
    fn default() -> Self {
        Self {
            inner: Rc::new(RefCell::new(FeedInner {
                next_id: 0,
                subscribers: HashMap::new(),
            })),
        }
    }
}

impl<K, E> fmt::Debug for ChangeFeed<K, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("ChangeFeed")
            .field("topics", &inner.subscribers.len())
            .finish()
    }
}

impl<K, E> ChangeFeed<K, E>
where
    K: Eq + Hash + Clone + 'static,
    E: Clone + 'static,
{
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber for `topic`.
    #[must_use]
    pub fn subscribe(&self, topic: K) -> Subscription<E> {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = {
            let mut inner = self.inner.borrow_mut();
            let id = inner.next_id;
            inner.next_id += 1;
            inner
                .subscribers
                .entry(topic.clone())
                .or_default()
                .push((id, tx));
            id
        };

        let weak: Weak<RefCell<FeedInner<K, E>>> = Rc::downgrade(&self.inner);
        Subscription {
            rx,
            detach: Some(Box::new(move || {
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                let mut inner = inner.borrow_mut();
                if let Some(list) = inner.subscribers.get_mut(&topic) {
                    list.retain(|(sub_id, _)| *sub_id != id);
                    if list.is_empty() {
                        inner.subscribers.remove(&topic);
                    }
                }
            })),
        }
    }

    /// Deliver `event` to every subscriber of `topic`. Returns the number of
    /// subscribers reached.
    pub fn publish(&self, topic: &K, event: &E) -> usize {
        let mut inner = self.inner.borrow_mut();
        let Some(list) = inner.subscribers.get_mut(topic) else {
            return 0;
        };
        list.retain(|(_, tx)| tx.send(event.clone()).is_ok());
        list.len()
    }

    #[must_use]
    pub fn subscriber_count(&self, topic: &K) -> usize {
        self.inner
            .borrow()
            .subscribers
            .get(topic)
            .map_or(0, Vec::len)
    }
}

/// Live handle on a feed topic. Detaches on [`Subscription::unsubscribe`] or
/// drop; events already queued stay readable.
pub struct Subscription<E> {
    rx: mpsc::UnboundedReceiver<E>,
    detach: Option<Box<dyn FnOnce()>>,
}

impl<E> Subscription<E> {
    /// Next event. Returns `None` once unsubscribed and drained, or when the
    /// publisher is gone.
    pub async fn recv(&mut self) -> Option<E> {
        self.rx.recv().await
    }

    /// Next queued event without waiting.
    pub fn try_recv(&mut self) -> Option<E> {
        self.rx.try_recv().ok()
    }

    /// Stop receiving new events.
    pub fn unsubscribe(&mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
            self.rx.close();
        }
    }

    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.detach.is_some()
    }
}

impl<E> fmt::Debug for Subscription<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish_non_exhaustive()
    }
}

impl<E> Drop for Subscription<E> {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
