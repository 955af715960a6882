//! Named-event publish/subscribe bus
//!
//! Handlers run synchronously on `emit`, in registration order. There is no
//! queue: an event emitted while nobody listens for its kind is dropped.
//! A panicking handler is isolated so the remaining handlers still run.

use alloc::rc::Rc;
use core::cell::{Cell, RefCell};
use core::fmt;
use core::hash::Hash;
use std::panic::{self, AssertUnwindSafe};

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

// ----------------------------------------------------------------------------
// Event Classification
// ----------------------------------------------------------------------------

/// An event that can travel over an [`EventBus`]
pub trait BusEvent {
    /// Name under which handlers subscribe
    type Kind: Copy + Eq + Hash + fmt::Debug;

    fn kind(&self) -> Self::Kind;
}

/// Handle returned by [`EventBus::on`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub#{}", self.0)
    }
}

/// Shared event handler
pub type Handler<E> = Rc<dyn Fn(&E)>;

// ----------------------------------------------------------------------------
// Event Bus
// ----------------------------------------------------------------------------

/// Synchronous, single-threaded event bus
pub struct EventBus<E: BusEvent> {
    handlers: RefCell<HashMap<E::Kind, Vec<(SubscriptionId, Handler<E>)>>>,
    next_id: Cell<u64>,
}

impl<E: BusEvent> EventBus<E> {
    pub fn new() -> Self {
        Self {
            handlers: RefCell::new(HashMap::default()),
            next_id: Cell::new(1),
        }
    }

    /// Register `handler` for `kind`
    pub fn on<F>(&self, kind: E::Kind, handler: F) -> SubscriptionId
    where
        F: Fn(&E) + 'static,
    {
        let id = SubscriptionId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.handlers
            .borrow_mut()
            .entry(kind)
            .or_default()
            .push((id, Rc::new(handler)));
        trace!("Subscribed {} to {:?}", id, kind);
        id
    }

    /// Remove one handler, or every handler of `kind` when `subscription` is `None`
    ///
    /// Returns the number of handlers removed.
    pub fn off(&self, kind: E::Kind, subscription: Option<SubscriptionId>) -> usize {
        let mut handlers = self.handlers.borrow_mut();
        match subscription {
            None => handlers.remove(&kind).map(|list| list.len()).unwrap_or(0),
            Some(id) => {
                let Some(list) = handlers.get_mut(&kind) else {
                    return 0;
                };
                let before = list.len();
                list.retain(|(existing, _)| *existing != id);
                let removed = before - list.len();
                if list.is_empty() {
                    handlers.remove(&kind);
                }
                removed
            }
        }
    }

    /// Deliver `event` to every handler currently registered for its kind
    ///
    /// Handlers see the same reference. A handler removed by an earlier
    /// handler during this emit is skipped; one added during this emit is
    /// not called until the next emit. Returns how many handlers completed.
    pub fn emit(&self, event: &E) -> usize {
        let kind = event.kind();
        let snapshot: Vec<(SubscriptionId, Handler<E>)> = self
            .handlers
            .borrow()
            .get(&kind)
            .map(|list| {
                list.iter()
                    .map(|(id, handler)| (*id, Rc::clone(handler)))
                    .collect()
            })
            .unwrap_or_default();

        if snapshot.is_empty() {
            trace!("Dropped {:?} event: no listeners", kind);
            return 0;
        }

        let mut delivered = 0;
        for (id, handler) in snapshot {
            if !self.is_registered(kind, id) {
                continue;
            }
            match panic::catch_unwind(AssertUnwindSafe(|| handler(event))) {
                Ok(()) => delivered += 1,
                Err(_) => warn!("Handler {} panicked while handling {:?}", id, kind),
            }
        }
        delivered
    }

    pub fn listener_count(&self, kind: E::Kind) -> usize {
        self.handlers
            .borrow()
            .get(&kind)
            .map(|list| list.len())
            .unwrap_or(0)
    }

    /// Total handlers across all kinds
    pub fn total_listeners(&self) -> usize {
        self.handlers.borrow().values().map(|list| list.len()).sum()
    }

    fn is_registered(&self, kind: E::Kind, id: SubscriptionId) -> bool {
        self.handlers
            .borrow()
            .get(&kind)
            .is_some_and(|list| list.iter().any(|(existing, _)| *existing == id))
    }
}

impl<E: BusEvent> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: BusEvent> fmt::Debug for EventBus<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.total_listeners())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
