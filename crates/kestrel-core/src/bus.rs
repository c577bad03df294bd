//! In-process publish/subscribe channel for [`Message`]s.
//!
//! Delivery is a sequential fan-out: every handler subscribed at publish time
//! is awaited in subscription order. A handler that fails (or panics) is
//! logged and skipped; the publisher never sees the error. There is no
//! backlog, so a handler only receives messages published after it subscribed.

use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::RwLock;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, error, warn};

use crate::{Message, Result};

/// Handle returned by [`MessageBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

/// Something that reacts to published messages.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Label used in delivery logs.
    fn name(&self) -> &str {
        "anonymous"
    }

    async fn handle(&self, message: Arc<Message>) -> Result<()>;
}

struct FnHandler<F> {
    name: String,
    f: F,
}

#[async_trait]
impl<F, Fut> MessageHandler for FnHandler<F>
where
    F: Fn(Arc<Message>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, message: Arc<Message>) -> Result<()> {
        (self.f)(message).await
    }
}

/// Wrap an async closure as a [`MessageHandler`].
pub fn handler_fn<F, Fut>(name: impl Into<String>, f: F) -> Arc<dyn MessageHandler>
where
    F: Fn(Arc<Message>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(FnHandler {
        name: name.into(),
        f,
    })
}

type Subscribers = Vec<(SubscriptionId, Arc<dyn MessageHandler>)>;

#[derive(Default)]
struct BusInner {
    subscribers: RwLock<Subscribers>,
    next_id: AtomicU64,
    published: AtomicU64,
}

/// Cheaply cloneable bus handle; all clones share the same subscriber list.
#[derive(Clone, Default)]
pub struct MessageBus {
    inner: Arc<BusInner>,
}

impl MessageBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. It receives every message published from now on.
    pub fn subscribe(&self, handler: Arc<dyn MessageHandler>) -> SubscriptionId {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        debug!(subscription = id.0, handler = handler.name(), "bus subscriber added");
        self.inner.subscribers.write().push((id, handler));
        id
    }

    /// Remove a handler. Returns `false` if the id was unknown.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subs = self.inner.subscribers.write();
        let before = subs.len();
        subs.retain(|(sid, _)| *sid != id);
        subs.len() != before
    }

    /// Deliver `message` to every current subscriber, in subscription order.
    ///
    /// Returns the number of handlers that were invoked (including ones that
    /// failed).
    pub async fn publish(&self, message: impl Into<Arc<Message>>) -> usize {
        let message = message.into();
        // Snapshot so handlers can publish or (un)subscribe re-entrantly.
        let snapshot: Subscribers = self.inner.subscribers.read().clone();
        self.inner.published.fetch_add(1, Ordering::Relaxed);

        debug!(
            message_id = %message.id,
            source = %message.source,
            subscribers = snapshot.len(),
            "publishing message"
        );

        for (id, handler) in &snapshot {
            let delivery = AssertUnwindSafe(handler.handle(Arc::clone(&message)))
                .catch_unwind()
                .await;
            match delivery {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(
                        subscription = id.0,
                        handler = handler.name(),
                        message_id = %message.id,
                        error = %e,
                        "message handler failed"
                    );
                }
                Err(_) => {
                    error!(
                        subscription = id.0,
                        handler = handler.name(),
                        message_id = %message.id,
                        "message handler panicked"
                    );
                }
            }
        }

        snapshot.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.read().len()
    }

    /// Total number of `publish` calls since the bus was created.
    pub fn published_count(&self) -> u64 {
        self.inner.published.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for MessageBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageBus")
            .field("subscribers", &self.subscriber_count())
            .field("published", &self.published_count())
            .finish()
    }
}
