//! Typed publish/subscribe streams for order, position, and tick events.
//!
//! Every stream carries messages of shape `{action, previous?, next}`.
//! Delivery is single-threaded per stream: publishers fan a message out to
//! all live subscribers before the next publish, so each subscriber observes
//! messages in publish order. Subscriptions are scoped resources; dropping a
//! [`StreamHandle`] unregisters it and guarantees no further delivery.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// What happened to the value carried by a stream message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamAction {
    /// A new value entered the set
    Create,
    /// An existing value changed
    Update,
    /// A value left the set
    Delete,
}

/// A single message on an event stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamEvent<T> {
    /// What happened
    pub action: StreamAction,
    /// Prior value, when the action replaces one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous: Option<T>,
    /// Current value
    pub next: T,
}

impl<T> StreamEvent<T> {
    /// A create message.
    pub fn create(next: T) -> Self {
        Self {
            action: StreamAction::Create,
            previous: None,
            next,
        }
    }

    /// An update message carrying the prior value.
    pub fn update(previous: T, next: T) -> Self {
        Self {
            action: StreamAction::Update,
            previous: Some(previous),
            next,
        }
    }

    /// A delete message.
    pub fn delete(next: T) -> Self {
        Self {
            action: StreamAction::Delete,
            previous: None,
            next,
        }
    }
}

type Registry<T> = DashMap<u64, mpsc::UnboundedSender<StreamEvent<T>>>;

/// A multi-subscriber event stream.
///
/// Cloning the stream clones a handle to the same subscriber set, so any
/// clone may publish.
#[derive(Debug)]
pub struct EventStream<T> {
    subscribers: Arc<Registry<T>>,
    next_id: Arc<AtomicU64>,
}

impl<T> Clone for EventStream<T> {
    fn clone(&self) -> Self {
        Self {
            subscribers: Arc::clone(&self.subscribers),
            next_id: Arc::clone(&self.next_id),
        }
    }
}

impl<T> Default for EventStream<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> EventStream<T> {
    /// Create an empty stream.
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(DashMap::new()),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Open a scoped subscription.
    pub fn subscribe(&self) -> StreamHandle<T> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.insert(id, tx);
        StreamHandle {
            id,
            subscribers: Arc::downgrade(&self.subscribers),
            rx,
        }
    }
}

impl<T: Clone> EventStream<T> {
    /// Deliver a message to every live subscriber, dropping closed ones.
    pub fn publish(&self, event: StreamEvent<T>) {
        self.subscribers
            .retain(|_, tx| tx.send(event.clone()).is_ok());
    }
}

/// A scoped subscription to an [`EventStream`].
///
/// Dropping the handle unregisters the subscription; no message published
/// after the drop is delivered.
#[derive(Debug)]
pub struct StreamHandle<T> {
    id: u64,
    subscribers: Weak<Registry<T>>,
    rx: mpsc::UnboundedReceiver<StreamEvent<T>>,
}

impl<T> StreamHandle<T> {
    /// Await the next message. Returns `None` once the stream is gone and
    /// the queue is drained.
    pub async fn recv(&mut self) -> Option<StreamEvent<T>> {
        self.rx.recv().await
    }

    /// Take the next queued message without waiting.
    pub fn try_recv(&mut self) -> Option<StreamEvent<T>> {
        self.rx.try_recv().ok()
    }
}

impl<T> Drop for StreamHandle<T> {
    fn drop(&mut self) {
        if let Some(subscribers) = self.subscribers.upgrade() {
            subscribers.remove(&self.id);
        }
    }
}

/// Several subscriptions merged into one ordered flow.
///
/// Per-stream order is preserved; interleaving across streams is whatever
/// the forwarding tasks produce. Dropping the merged stream stops the
/// forwarders and releases the source subscriptions.
#[derive(Debug)]
pub struct MergedStream<T> {
    rx: mpsc::UnboundedReceiver<StreamEvent<T>>,
    forwarders: Vec<JoinHandle<()>>,
}

impl<T> MergedStream<T> {
    /// Await the next message from any source stream.
    pub async fn recv(&mut self) -> Option<StreamEvent<T>> {
        self.rx.recv().await
    }

    /// Take the next queued message without waiting.
    pub fn try_recv(&mut self) -> Option<StreamEvent<T>> {
        self.rx.try_recv().ok()
    }
}

impl<T> Drop for MergedStream<T> {
    fn drop(&mut self) {
        for task in &self.forwarders {
            task.abort();
        }
    }
}

/// Merge several subscriptions into a single flow.
///
/// Must be called within a tokio runtime; each source handle is consumed by
/// a forwarding task that ends when its stream closes.
pub fn merge<T: Send + 'static>(handles: Vec<StreamHandle<T>>) -> MergedStream<T> {
    let (tx, rx) = mpsc::unbounded_channel();
    let forwarders = handles
        .into_iter()
        .map(|mut handle| {
            let tx = tx.clone();
            tokio::spawn(async move {
                while let Some(event) = handle.recv().await {
                    if tx.send(event).is_err() {
                        break;
                    }
                }
            })
        })
        .collect();
    MergedStream { rx, forwarders }
}
