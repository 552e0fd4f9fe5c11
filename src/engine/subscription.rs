//! Trace-event subscriptions.
//!
//! Listeners run synchronously inside [`ActionEngine::step`](super::ActionEngine::step),
//! in registration order. Unsubscribing goes through a control channel that the
//! registry drains before every listener call, so a listener may unsubscribe itself or
//! another listener while an event is being delivered.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam_channel::{unbounded, Receiver, Sender};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::action::TraceEvent;

/// Unique identifier for a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    /// Create a new random subscription id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Callback receiving every produced event.
pub type Listener = Box<dyn FnMut(&TraceEvent) + Send>;

/// Handle for a registered listener.
///
/// Dropping the handle unsubscribes; call [`Subscription::detach`] to keep the listener
/// for the engine's lifetime.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    control_tx: Sender<SubscriptionId>,
    unregistered: AtomicBool,
}

impl Subscription {
    /// The id backing this subscription.
    #[must_use]
    pub const fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Removes the listener. Idempotent and non-blocking.
    pub fn unsubscribe(&self) {
        if self.unregistered.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = self.control_tx.try_send(self.id);
    }

    /// Keeps the listener registered after this handle is dropped.
    pub fn detach(self) -> SubscriptionId {
        self.unregistered.store(true, Ordering::Release);
        self.id
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if !self.unregistered.swap(true, Ordering::AcqRel) {
            let _ = self.control_tx.try_send(self.id);
        }
    }
}

/// Ordered listener list owned by the engine.
pub(crate) struct ListenerRegistry {
    listeners: Vec<(SubscriptionId, Listener)>,
    control_tx: Sender<SubscriptionId>,
    control_rx: Receiver<SubscriptionId>,
}

impl fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("listeners", &self.listeners.len())
            .finish_non_exhaustive()
    }
}

impl Default for ListenerRegistry {
    fn default() -> Self {
        let (control_tx, control_rx) = unbounded();
        Self {
            listeners: Vec::new(),
            control_tx,
            control_rx,
        }
    }
}

impl ListenerRegistry {
    pub(crate) fn register(&mut self, listener: Listener) -> Subscription {
        let id = SubscriptionId::new();
        self.listeners.push((id, listener));
        Subscription {
            id,
            control_tx: self.control_tx.clone(),
            unregistered: AtomicBool::new(false),
        }
    }

    pub(crate) fn len(&mut self) -> usize {
        self.drain_unregistered(None);
        self.listeners.len()
    }

    /// Delivers `event` to every active listener in registration order.
    pub(crate) fn notify(&mut self, event: &TraceEvent) {
        let mut idx = 0;
        loop {
            idx = self.drain_unregistered(Some(idx));
            let Some((_, listener)) = self.listeners.get_mut(idx) else {
                break;
            };
            listener(event);
            idx += 1;
        }
    }

    /// Removes pending unsubscriptions; returns `cursor` adjusted for removed entries.
    fn drain_unregistered(&mut self, cursor: Option<usize>) -> usize {
        let mut cursor = cursor.unwrap_or(0);
        while let Ok(id) = self.control_rx.try_recv() {
            if let Some(pos) = self.listeners.iter().position(|(sid, _)| *sid == id) {
                drop(self.listeners.remove(pos));
                if pos < cursor {
                    cursor -= 1;
                }
            }
        }
        cursor
    }
}
