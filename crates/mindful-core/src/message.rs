//! Chat messages and conversation keys
//!
//! A [`Message`] is created once by a session and then owned by the
//! [`MessageStore`](crate::store::MessageStore). Only its `read` flag may
//! change afterwards.

use core::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{ChatError, Result};
use crate::types::UserId;

// ----------------------------------------------------------------------------
// Message Identifier
// ----------------------------------------------------------------------------

/// Globally unique message identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(Uuid);

impl MessageId {
    /// Fresh random identifier
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "msg_{}", self.0.simple())
    }
}

// ----------------------------------------------------------------------------
// Message
// ----------------------------------------------------------------------------

/// A single chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub body: String,
    /// RFC 3339 on the wire
    pub timestamp: DateTime<Utc>,
    pub read: bool,
    /// Emission counter of the issuing client
    pub sequence: u64,
}

impl Message {
    /// Build a validated, unread message
    pub fn new(
        id: MessageId,
        sender_id: UserId,
        receiver_id: UserId,
        body: impl Into<String>,
        timestamp: DateTime<Utc>,
        sequence: u64,
    ) -> Result<Self> {
        let body = body.into();
        validate_parts(&sender_id, &receiver_id, &body)?;
        Ok(Self {
            id,
            sender_id,
            receiver_id,
            body,
            timestamp,
            read: false,
            sequence,
        })
    }

    pub fn conversation_key(&self) -> ConversationKey {
        ConversationKey::new(self.sender_id.clone(), self.receiver_id.clone())
    }

    /// True when this message travels between `a` and `b` in either direction
    pub fn is_between(&self, a: &UserId, b: &UserId) -> bool {
        (&self.sender_id == a && &self.receiver_id == b)
            || (&self.sender_id == b && &self.receiver_id == a)
    }

    pub fn involves(&self, user: &UserId) -> bool {
        &self.sender_id == user || &self.receiver_id == user
    }
}

/// Shared precondition check for anything that becomes a [`Message`]
pub(crate) fn validate_parts(sender: &UserId, receiver: &UserId, body: &str) -> Result<()> {
    if receiver.is_blank() {
        return Err(ChatError::invalid_message("receiver id is missing"));
    }
    if sender.is_blank() {
        return Err(ChatError::invalid_message("sender id is missing"));
    }
    if sender == receiver {
        return Err(ChatError::invalid_message(
            "sender and receiver must be different",
        ));
    }
    if body.trim().is_empty() {
        return Err(ChatError::invalid_message("message body is empty"));
    }
    Ok(())
}

// ----------------------------------------------------------------------------
// Conversation Key
// ----------------------------------------------------------------------------

/// Unordered pair of participants identifying a conversation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationKey {
    a: UserId,
    b: UserId,
}

impl ConversationKey {
    pub fn new(one: UserId, other: UserId) -> Self {
        // Normalised so both directions hash identically
        if one <= other {
            Self { a: one, b: other }
        } else {
            Self { a: other, b: one }
        }
    }

    pub fn participants(&self) -> (&UserId, &UserId) {
        (&self.a, &self.b)
    }

    pub fn involves(&self, user: &UserId) -> bool {
        &self.a == user || &self.b == user
    }

    /// The participant that is not `user`, if `user` takes part at all
    pub fn partner_of(&self, user: &UserId) -> Option<&UserId> {
        if &self.a == user {
            Some(&self.b)
        } else if &self.b == user {
            Some(&self.a)
        } else {
            None
        }
    }
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}↔{}", self.a, self.b)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
