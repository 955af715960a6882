//! Session events carried on the event bus
//!
//! The event names and payload shapes are the contract a real socket
//! transport has to honour to replace the simulated one.

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::event_bus::{BusEvent, EventBus};
use crate::message::Message;
use crate::types::UserId;

/// Name of a session event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Connected,
    Message,
    Disconnected,
}

impl EventKind {
    pub const ALL: [EventKind; 3] = [EventKind::Connected, EventKind::Message, EventKind::Disconnected];

    /// Wire name
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Connected => "connected",
            EventKind::Message => "message",
            EventKind::Disconnected => "disconnected",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event emitted by a session or its transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "lowercase")]
pub enum SessionEvent {
    Connected { user_id: UserId },
    Message(Message),
    Disconnected { user_id: UserId },
}

impl SessionEvent {
    /// Whether this event concerns `user`
    pub fn concerns(&self, user: &UserId) -> bool {
        match self {
            SessionEvent::Connected { user_id } | SessionEvent::Disconnected { user_id } => {
                user_id == user
            }
            SessionEvent::Message(message) => message.involves(user),
        }
    }
}

impl BusEvent for SessionEvent {
    type Kind = EventKind;

    fn kind(&self) -> EventKind {
        match self {
            SessionEvent::Connected { .. } => EventKind::Connected,
            SessionEvent::Message(_) => EventKind::Message,
            SessionEvent::Disconnected { .. } => EventKind::Disconnected,
        }
    }
}

/// Bus shared by every session of a client
pub type SessionBus = EventBus<SessionEvent>;
