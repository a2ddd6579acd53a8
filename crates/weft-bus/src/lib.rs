//! # weft-bus
//!
//! Typed pub/sub for engine events with a bounded history buffer.
//!
//! Handlers are invoked in registration order, sequentially, each awaited
//! before the next. A handler error is logged and swallowed: `emit` never
//! fails, and observer faults never affect execution. A slow handler does
//! serialize later ones; use [`EventBus::filter`] to isolate heavy
//! observers on a child bus.

use futures::future::BoxFuture;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;

use weft_core::{EngineEvent, EventKind, Result, WeftError};

/// Default capacity of the history ring buffer
pub const DEFAULT_MAX_HISTORY: usize = 1000;

/// Opaque handle for unsubscribing
pub type HandlerId = u64;

type HandlerFn = Arc<dyn Fn(EngineEvent) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

struct Registration {
    id: HandlerId,
    /// None subscribes to every event kind
    kind: Option<EventKind>,
    once: bool,
    handler: HandlerFn,
}

struct Inner {
    handlers: Vec<Registration>,
    history: VecDeque<EngineEvent>,
    next_id: HandlerId,
}

/// Event bus with typed subscriptions and a ring-buffer history
pub struct EventBus {
    inner: Mutex<Inner>,
    max_history: usize,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_history_size(DEFAULT_MAX_HISTORY)
    }

    pub fn with_history_size(max_history: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                handlers: Vec::new(),
                history: VecDeque::new(),
                next_id: 0,
            }),
            max_history,
        }
    }

    /// Subscribe to one event kind
    pub fn on<F, Fut>(&self, kind: EventKind, handler: F) -> HandlerId
    where
        F: Fn(EngineEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.register(Some(kind), false, wrap(handler))
    }

    /// Subscribe to every event kind
    pub fn on_any<F, Fut>(&self, handler: F) -> HandlerId
    where
        F: Fn(EngineEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.register(None, false, wrap(handler))
    }

    /// Subscribe to one event kind for a single delivery
    pub fn once<F, Fut>(&self, kind: EventKind, handler: F) -> HandlerId
    where
        F: Fn(EngineEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.register(Some(kind), true, wrap(handler))
    }

    /// Remove a subscription. Returns false if the id was not registered.
    pub fn off(&self, id: HandlerId) -> bool {
        let mut inner = self.inner.lock().expect("bus lock poisoned");
        let before = inner.handlers.len();
        inner.handlers.retain(|r| r.id != id);
        inner.handlers.len() != before
    }

    /// Remove an any-subscription; same registry as [`EventBus::off`]
    pub fn off_any(&self, id: HandlerId) -> bool {
        self.off(id)
    }

    /// Drop every subscription
    pub fn remove_all_listeners(&self) {
        let mut inner = self.inner.lock().expect("bus lock poisoned");
        inner.handlers.clear();
    }

    /// Emit an event; resolves once every handler has been dispatched
    pub async fn emit(&self, kind: EventKind, data: serde_json::Map<String, serde_json::Value>) {
        let mut event = EngineEvent::new(kind);
        event.data = data;
        self.publish(event).await;
    }

    /// Publish a pre-built event (used by child buses to preserve timestamps)
    pub async fn publish(&self, event: EngineEvent) {
        // Snapshot matching handlers under the lock; once-handlers are
        // claimed here so they fire exactly once even under concurrent
        // publishes. The lock is never held across a handler await.
        let matched: Vec<HandlerFn> = {
            let mut inner = self.inner.lock().expect("bus lock poisoned");
            inner.history.push_back(event.clone());
            while inner.history.len() > self.max_history {
                inner.history.pop_front();
            }

            let snapshot: Vec<HandlerFn> = inner
                .handlers
                .iter()
                .filter(|r| r.kind.is_none() || r.kind == Some(event.kind))
                .map(|r| Arc::clone(&r.handler))
                .collect();
            inner
                .handlers
                .retain(|r| !(r.once && (r.kind.is_none() || r.kind == Some(event.kind))));
            snapshot
        };

        for handler in matched {
            if let Err(e) = handler(event.clone()).await {
                tracing::warn!("Event handler failed for {}: {}", event.kind, e);
            }
        }
    }

    /// Events retained in the history buffer, oldest first
    pub fn history(&self, kind: Option<EventKind>) -> Vec<EngineEvent> {
        let inner = self.inner.lock().expect("bus lock poisoned");
        inner
            .history
            .iter()
            .filter(|e| kind.is_none() || kind == Some(e.kind))
            .cloned()
            .collect()
    }

    pub fn clear_history(&self) {
        let mut inner = self.inner.lock().expect("bus lock poisoned");
        inner.history.clear();
    }

    /// Resolve with the next event of the given kind
    ///
    /// With a finite timeout, errors with [`WeftError::EventWait`] and
    /// detaches the listener.
    pub async fn wait_for(
        &self,
        kind: EventKind,
        timeout: Option<Duration>,
    ) -> Result<EngineEvent> {
        let (tx, rx) = oneshot::channel::<EngineEvent>();
        let tx = Mutex::new(Some(tx));

        let id = self.once(kind, move |event| {
            let sender = tx.lock().expect("waiter lock poisoned").take();
            async move {
                if let Some(sender) = sender {
                    let _ = sender.send(event);
                }
                Ok(())
            }
        });

        match timeout {
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(Ok(event)) => Ok(event),
                Ok(Err(_)) => Err(WeftError::EventWait(format!(
                    "{}: bus dropped before delivery",
                    kind
                ))),
                Err(_) => {
                    self.off(id);
                    Err(WeftError::EventWait(kind.to_string()))
                }
            },
            None => rx
                .await
                .map_err(|_| WeftError::EventWait(format!("{}: bus dropped before delivery", kind))),
        }
    }

    /// Create a child bus receiving only events matching the predicate
    ///
    /// Heavy observers should subscribe to the child so they cannot slow
    /// the parent's dispatch chain beyond the single forwarding hop.
    pub fn filter<P>(&self, predicate: P) -> Arc<EventBus>
    where
        P: Fn(&EngineEvent) -> bool + Send + Sync + 'static,
    {
        let child = Arc::new(EventBus::with_history_size(self.max_history));
        let weak = Arc::downgrade(&child);

        self.on_any(move |event| {
            let target = if predicate(&event) { weak.upgrade() } else { None };
            async move {
                if let Some(child) = target {
                    child.publish(event).await;
                }
                Ok(())
            }
        });

        child
    }

    fn register(&self, kind: Option<EventKind>, once: bool, handler: HandlerFn) -> HandlerId {
        let mut inner = self.inner.lock().expect("bus lock poisoned");
        let id = inner.next_id;
        inner.next_id += 1;
        inner.handlers.push(Registration {
            id,
            kind,
            once,
            handler,
        });
        id
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

fn wrap<F, Fut>(handler: F) -> HandlerFn
where
    F: Fn(EngineEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move |event| -> BoxFuture<'static, anyhow::Result<()>> { Box::pin(handler(event)) })
}
