//! Read model for UI consumers
//!
//! A [`ChatView`] answers the questions a chat screen asks: am I connected,
//! who can I talk to, what has been said. Everything it returns is an owned
//! copy, so a consumer never holds a borrow of the store across an event.

use alloc::rc::Rc;
use alloc::string::String;
use alloc::vec::Vec;

use hashbrown::HashSet;

use crate::errors::Result;
use crate::event_bus::SubscriptionId;
use crate::events::{EventKind, SessionEvent};
use crate::message::Message;
use crate::session::ConnectionSession;
use crate::triage::{TriageLevel, TriagePolicy};
use crate::types::{Identity, Role, UserId};

/// Watcher registration returned by [`ChatView::subscribe`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Watch {
    subscriptions: Vec<(EventKind, SubscriptionId)>,
}

/// Reactive read model over one session
#[derive(Debug, Clone)]
pub struct ChatView {
    session: ConnectionSession,
}

impl ChatView {
    pub fn new(session: ConnectionSession) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &ConnectionSession {
        &self.session
    }

    pub fn identity(&self) -> &Identity {
        self.session.identity()
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_connected()
    }

    /// Messages exchanged with `partner`, oldest first
    pub fn conversation(&self, partner: &UserId) -> Vec<Message> {
        self.session
            .shared()
            .store
            .borrow()
            .conversation_with(self.session.user_id(), partner)
            .cloned()
            .collect()
    }

    /// Identities this session may talk to
    ///
    /// Patients see the available doctors. Doctors see the directory's
    /// patients, then anyone else who has written to them.
    pub fn counterparts(&self) -> Vec<Identity> {
        let shared = self.session.shared();
        let me = self.session.identity();
        let mut listed = shared.directory.list_counterparts(me.role);
        if me.role == Role::Patient {
            return listed;
        }

        let mut seen: HashSet<UserId> = listed.iter().map(|identity| identity.id.clone()).collect();
        let senders = shared.store.borrow().unique_counterparts(&me.id);
        for sender in senders {
            if !seen.insert(sender.clone()) {
                continue;
            }
            let identity = shared
                .directory
                .lookup(&sender)
                .unwrap_or_else(|| synthesized_patient(sender));
            listed.push(identity);
        }
        listed
    }

    /// Messages from `partner` this session has not read yet
    pub fn unread_from(&self, partner: &UserId) -> usize {
        self.session
            .shared()
            .store
            .borrow()
            .unread_count(self.session.user_id(), partner)
    }

    /// Mark everything `partner` sent to this session as read
    pub fn mark_read(&self, partner: &UserId) -> usize {
        self.session
            .shared()
            .store
            .borrow_mut()
            .mark_conversation_read(self.session.user_id(), partner)
    }

    /// Counterparts paired with the bucket `policy` puts them in
    pub fn triage(&self, policy: &dyn TriagePolicy) -> Vec<(Identity, TriageLevel)> {
        self.counterparts()
            .into_iter()
            .map(|counterpart| {
                let history = self.conversation(&counterpart.id);
                let level = policy.classify(&counterpart, &history);
                (counterpart, level)
            })
            .collect()
    }

    /// Counter that moves whenever an event concerning this session arrives
    pub fn revision(&self) -> u64 {
        self.session.revision()
    }

    /// Call `handler` for every event concerning this session
    ///
    /// The watcher belongs to the session and is released on disconnect.
    pub fn subscribe(&self, handler: impl Fn(&SessionEvent) + 'static) -> Result<Watch> {
        let handler = Rc::new(handler);
        let mut subscriptions = Vec::with_capacity(EventKind::ALL.len());
        for kind in EventKind::ALL {
            let handler = Rc::clone(&handler);
            let id = self.session.watch(kind, move |event| handler(event))?;
            subscriptions.push((kind, id));
        }
        Ok(Watch { subscriptions })
    }

    /// Release a watcher early; `false` if it was already released
    pub fn unsubscribe(&self, watch: Watch) -> bool {
        watch
            .subscriptions
            .into_iter()
            .fold(false, |removed, (kind, id)| self.session.unwatch(kind, id) || removed)
    }
}

fn synthesized_patient(id: UserId) -> Identity {
    let name = String::from("Patient ") + id.short();
    Identity::patient(id, name)
}
