//! Connection sessions
//!
//! A [`ConnectionSession`] binds one authenticated identity to the shared bus,
//! store and transport of its [`ChatClient`](crate::ChatClient). Its lifecycle
//! is driven by the linear state machine in [`crate::connection_state`]: every
//! public operation feeds an event to the machine and then carries out the
//! effects it returns, in order.
//!
//! Every task the session schedules is tracked by handle and cancelled on
//! disconnect, and every bus listener it registers is released again, so a
//! closed session leaves nothing behind.

use alloc::boxed::Box;
use alloc::collections::VecDeque;
use alloc::rc::{Rc, Weak};
use core::cell::{Cell, RefCell};
use core::fmt;

use tracing::{debug, info, warn};

use crate::client::ClientShared;
use crate::connection_state::{
    AuditEntry, ConnectionEvent, ConnectionState, Effect, SessionStateKind, StateTransitionError,
};
use crate::errors::{ChatError, Result};
use crate::event_bus::SubscriptionId;
use crate::events::{EventKind, SessionEvent};
use crate::message::{Message, MessageId};
use crate::scheduler::TaskHandle;
use crate::types::{Identity, UserId};

// ----------------------------------------------------------------------------
// Session Internals
// ----------------------------------------------------------------------------

/// Audit entries kept per session; older ones are discarded
pub const MAX_AUDIT_ENTRIES: usize = 1000;

pub(crate) struct SessionInner {
    shared: Rc<ClientShared>,
    identity: Identity,
    state: RefCell<ConnectionState>,
    audit: RefCell<VecDeque<AuditEntry>>,
    pending: RefCell<Vec<TaskHandle>>,
    subscriptions: RefCell<Vec<(EventKind, SubscriptionId)>>,
    revision: Cell<u64>,
}

impl SessionInner {
    pub(crate) fn state_kind(&self) -> SessionStateKind {
        self.state.borrow().kind()
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.state.borrow().can_send_messages()
    }

    fn user_id(&self) -> &UserId {
        &self.identity.id
    }

    fn bump_revision(&self) {
        self.revision.set(self.revision.get() + 1);
    }

    /// Feed `event` to the state machine and record the audit entry
    fn apply(&self, event: ConnectionEvent) -> core::result::Result<Vec<Effect>, StateTransitionError> {
        let now = self.shared.scheduler.now();
        let current = self.state.borrow().clone();
        let transition = current.transition(event, now)?;
        if transition.audit_entry.from_state != transition.audit_entry.to_state {
            debug!(
                "{}: {} -> {} on {}",
                self.identity.id,
                transition.audit_entry.from_state,
                transition.audit_entry.to_state,
                transition.audit_entry.event
            );
        }
        *self.state.borrow_mut() = transition.new_state;
        let mut audit = self.audit.borrow_mut();
        if audit.len() >= MAX_AUDIT_ENTRIES {
            audit.pop_front();
        }
        audit.push_back(transition.audit_entry);
        Ok(transition.effects)
    }

    fn track(&self, handle: TaskHandle) {
        let mut pending = self.pending.borrow_mut();
        pending.retain(TaskHandle::is_pending);
        pending.push(handle);
    }

    fn pending_count(&self) -> usize {
        self.pending
            .borrow()
            .iter()
            .filter(|handle| handle.is_pending())
            .count()
    }

    fn run_effects(self: &Rc<Self>, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::RegisterListeners => self.register_listeners(),
                Effect::OpenTransport => self.open_transport(),
                Effect::CancelPending => self.cancel_pending(),
                Effect::EmitDisconnected => {
                    self.shared.transport.close(self.user_id());
                    self.shared.bus.emit(&SessionEvent::Disconnected {
                        user_id: self.user_id().clone(),
                    });
                }
                Effect::ReleaseListeners => self.release_listeners(),
            }
        }
    }

    fn register_listeners(self: &Rc<Self>) {
        let bus = &self.shared.bus;
        let mut subscriptions = self.subscriptions.borrow_mut();

        let weak = Rc::downgrade(self);
        let id = bus.on(EventKind::Connected, move |event| {
            if let Some(session) = concerned(&weak, event) {
                session.handshake_completed();
            }
        });
        subscriptions.push((EventKind::Connected, id));

        let weak = Rc::downgrade(self);
        let id = bus.on(EventKind::Message, move |event| {
            let (Some(session), SessionEvent::Message(message)) = (concerned(&weak, event), event)
            else {
                return;
            };
            session.record(message);
        });
        subscriptions.push((EventKind::Message, id));

        // A transport may announce a disconnect the session did not ask for
        let weak = Rc::downgrade(self);
        let id = bus.on(EventKind::Disconnected, move |event| {
            if let Some(session) = concerned(&weak, event) {
                session.bump_revision();
                if session.state_kind() != SessionStateKind::Disconnected {
                    ConnectionSession::from_inner(session).disconnect();
                }
            }
        });
        subscriptions.push((EventKind::Disconnected, id));
    }

    fn release_listeners(&self) {
        let subscriptions: Vec<_> = self.subscriptions.borrow_mut().drain(..).collect();
        for (kind, id) in subscriptions {
            self.shared.bus.off(kind, Some(id));
        }
    }

    fn cancel_pending(&self) {
        let pending: Vec<_> = self.pending.borrow_mut().drain(..).collect();
        let cancelled = pending.iter().filter(|handle| handle.cancel()).count();
        if cancelled > 0 {
            debug!("{}: cancelled {} pending task(s)", self.user_id(), cancelled);
        }
    }

    fn open_transport(self: &Rc<Self>) {
        let weak = Rc::downgrade(self);
        let handle = self.shared.transport.open(
            &self.identity,
            Box::new(move || {
                let Some(session) = weak.upgrade() else {
                    return;
                };
                if session.state_kind() == SessionStateKind::Connecting {
                    session.shared.bus.emit(&SessionEvent::Connected {
                        user_id: session.user_id().clone(),
                    });
                }
            }),
        );
        self.track(handle);
    }

    fn handshake_completed(&self) {
        self.bump_revision();
        if self.state_kind() != SessionStateKind::Connecting {
            return;
        }
        match self.apply(ConnectionEvent::HandshakeCompleted) {
            Ok(_) => info!("{} connected", self.user_id()),
            Err(e) => warn!("{}: {}", self.user_id(), e),
        }
    }

    fn record(&self, message: &Message) {
        self.bump_revision();
        if let Err(e) = self.shared.store.borrow_mut().append(message.clone()) {
            warn!("Dropping malformed message {}: {}", message.id, e);
        }
    }

    /// Emit a message the transport has carried, then arrange a reply if nobody is listening
    ///
    /// The message is stamped and sequenced here so the log stays in emission order.
    fn delivered(self: &Rc<Self>, mut message: Message) {
        if !self.is_connected() {
            return;
        }
        message.timestamp = self.shared.stamp();
        message.sequence = self.shared.next_sequence();
        debug!("Delivered {} {} -> {}", message.id, message.sender_id, message.receiver_id);
        self.shared.bus.emit(&SessionEvent::Message(message.clone()));
        self.schedule_reply(message);
    }

    fn schedule_reply(self: &Rc<Self>, trigger: Message) {
        let Some(responder) = &self.shared.responder else {
            return;
        };
        if !self.shared.transport.capabilities().simulated
            || &trigger.sender_id != self.user_id()
            || self.shared.is_attached(&trigger.receiver_id)
        {
            return;
        }

        let delay = responder.borrow_mut().reply_delay();
        debug!(
            "Synthetic reply from {} in {}ms",
            trigger.receiver_id,
            delay.as_millis()
        );
        let weak = Rc::downgrade(self);
        let handle = self.shared.scheduler.schedule(
            delay,
            Box::new(move || {
                if let Some(session) = weak.upgrade() {
                    session.emit_reply(&trigger);
                }
            }),
        );
        self.track(handle);
    }

    fn emit_reply(&self, trigger: &Message) {
        let Some(responder) = &self.shared.responder else {
            return;
        };
        if !self.is_connected() {
            return;
        }
        let reply = responder.borrow_mut().reply_to(
            trigger,
            MessageId::generate(),
            self.shared.stamp(),
            self.shared.next_sequence(),
        );
        self.shared.bus.emit(&SessionEvent::Message(reply));
    }
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        let live = self.state.get_mut().is_live();
        self.cancel_pending();
        self.release_listeners();
        if live {
            self.shared.transport.close(&self.identity.id);
            debug!("Session for {} dropped while live", self.identity.id);
        }
    }
}

/// Upgrade `weak` if `event` concerns the session it points to
fn concerned(weak: &Weak<SessionInner>, event: &SessionEvent) -> Option<Rc<SessionInner>> {
    weak.upgrade()
        .filter(|session| event.concerns(session.user_id()))
}

// ----------------------------------------------------------------------------
// Connection Session
// ----------------------------------------------------------------------------

/// Live binding of one identity to the chat client
///
/// Cloning yields another handle to the same session.
#[derive(Clone)]
pub struct ConnectionSession {
    inner: Rc<SessionInner>,
}

impl ConnectionSession {
    pub(crate) fn new(shared: Rc<ClientShared>, identity: Identity) -> Self {
        let state = ConnectionState::new_disconnected(identity.id.clone());
        Self {
            inner: Rc::new(SessionInner {
                shared,
                identity,
                state: RefCell::new(state),
                audit: RefCell::new(VecDeque::new()),
                pending: RefCell::new(Vec::new()),
                subscriptions: RefCell::new(Vec::new()),
                revision: Cell::new(0),
            }),
        }
    }

    pub(crate) fn from_inner(inner: Rc<SessionInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn downgrade(&self) -> Weak<SessionInner> {
        Rc::downgrade(&self.inner)
    }

    /// Start the handshake; a no-op while Connecting or Connected
    pub fn connect(&self) -> Result<()> {
        let latency = self.inner.shared.config.latency.connect();
        let effects = self
            .inner
            .apply(ConnectionEvent::Connect { latency })
            .map_err(|_| ChatError::not_connected(self.user_id().clone(), self.state_kind()))?;
        if !effects.is_empty() {
            info!("{} connecting", self.user_id());
        }
        self.inner.run_effects(effects);
        Ok(())
    }

    /// Tear the session down
    ///
    /// Cancels every scheduled task, announces `disconnected` and releases the
    /// session's listeners. Returns `false` when already disconnected.
    pub fn disconnect(&self) -> bool {
        let effects = match self.inner.apply(ConnectionEvent::Disconnect) {
            Ok(effects) => effects,
            Err(e) => {
                warn!("{}: {}", self.user_id(), e);
                return false;
            }
        };
        if effects.is_empty() {
            return false;
        }
        info!("{} disconnected", self.user_id());
        self.inner.run_effects(effects);
        true
    }

    /// Send `body` to `receiver_id`
    ///
    /// The message is validated immediately and reaches the bus once the
    /// transport has carried it. Only the returned id is final: the copy on
    /// the bus is timestamped and sequenced at delivery, and the returned
    /// message keeps its queue time and a sequence of 0.
    pub fn send_message(
        &self,
        receiver_id: impl Into<UserId>,
        body: impl Into<String>,
    ) -> Result<Message> {
        let inner = &self.inner;
        if !inner.is_connected() {
            return Err(ChatError::not_connected(
                self.user_id().clone(),
                inner.state_kind(),
            ));
        }

        let body = body.into();
        let limit = inner.shared.config.max_body_chars;
        if body.chars().count() > limit {
            return Err(ChatError::invalid_message(format!(
                "body exceeds {} characters",
                limit
            )));
        }

        let message = Message::new(
            MessageId::generate(),
            self.user_id().clone(),
            receiver_id.into(),
            body,
            inner.shared.stamp(),
            0,
        )?;

        inner
            .apply(ConnectionEvent::MessageSent)
            .map_err(|_| ChatError::not_connected(self.user_id().clone(), inner.state_kind()))?;

        let weak = Rc::downgrade(inner);
        let handle = inner.shared.transport.send_to(
            message.clone(),
            Box::new(move |delivered| {
                if let Some(session) = weak.upgrade() {
                    session.delivered(delivered);
                }
            }),
        );
        inner.track(handle);
        debug!("Queued {} for {}", message.id, message.receiver_id);
        Ok(message)
    }

    pub fn identity(&self) -> &Identity {
        &self.inner.identity
    }

    pub fn user_id(&self) -> &UserId {
        self.inner.user_id()
    }

    /// Snapshot of the lifecycle state
    pub fn state(&self) -> ConnectionState {
        self.inner.state.borrow().clone()
    }

    pub fn state_kind(&self) -> SessionStateKind {
        self.inner.state_kind()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    /// Audit trail of the most recent transitions, oldest first
    ///
    /// At most [`MAX_AUDIT_ENTRIES`] are kept.
    pub fn transitions(&self) -> Vec<AuditEntry> {
        self.inner.audit.borrow().iter().cloned().collect()
    }

    /// Scheduled tasks that have neither run nor been cancelled
    pub fn pending_tasks(&self) -> usize {
        self.inner.pending_count()
    }

    /// Bus listeners currently held by this session
    pub fn listener_count(&self) -> usize {
        self.inner.subscriptions.borrow().len()
    }

    /// Counter bumped by every event that concerns this session
    pub fn revision(&self) -> u64 {
        self.inner.revision.get()
    }

    pub(crate) fn shared(&self) -> &ClientShared {
        &self.inner.shared
    }

    /// Register a UI watcher; it is released with the session's own listeners
    pub(crate) fn watch(&self, kind: EventKind, handler: impl Fn(&SessionEvent) + 'static) -> Result<SubscriptionId> {
        if !self.inner.state.borrow().is_live() {
            return Err(ChatError::not_connected(
                self.user_id().clone(),
                self.state_kind(),
            ));
        }
        let user = self.user_id().clone();
        let id = self.inner.shared.bus.on(kind, move |event| {
            if event.concerns(&user) {
                handler(event);
            }
        });
        self.inner.subscriptions.borrow_mut().push((kind, id));
        Ok(id)
    }

    /// Drop a watcher registered with [`watch`](Self::watch)
    pub(crate) fn unwatch(&self, kind: EventKind, id: SubscriptionId) -> bool {
        let mut subscriptions = self.inner.subscriptions.borrow_mut();
        let before = subscriptions.len();
        subscriptions.retain(|&(k, s)| !(k == kind && s == id));
        if subscriptions.len() == before {
            return false;
        }
        drop(subscriptions);
        self.inner.shared.bus.off(kind, Some(id)) > 0
    }
}

impl fmt::Debug for ConnectionSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionSession")
            .field("user_id", self.user_id())
            .field("state", &self.state_kind())
            .field("pending", &self.pending_tasks())
            .finish()
    }
}
