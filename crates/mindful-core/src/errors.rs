//! Error types for the messaging core
//!
//! Every error here is a synchronous rejection returned by the call that
//! violated a precondition. Deferred work (handshake, delivery, synthetic
//! replies) never reports errors after the fact.

use crate::connection_state::SessionStateKind;
use crate::types::UserId;

// ----------------------------------------------------------------------------
// Core Error Type
// ----------------------------------------------------------------------------

/// Core error types for the chat session layer
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChatError {
    /// `connect` was called without an authenticated identity
    #[error("No authenticated identity to connect with")]
    Unauthenticated,

    /// A send was attempted outside the Connected state
    #[error("Session for {user_id} is not connected (state: {state})")]
    NotConnected {
        user_id: UserId,
        state: SessionStateKind,
    },

    /// Empty body, missing receiver or a message addressed to oneself
    #[error("Invalid message: {reason}")]
    InvalidMessage { reason: String },

    /// A live session already exists and the client runs the strict policy
    #[error("A live session already exists for {user_id}")]
    DuplicateConnection { user_id: UserId },

    /// Configuration error
    #[error("Configuration error: {reason}")]
    Configuration { reason: String },
}

// ----------------------------------------------------------------------------
// Convenience Error Constructors
// ----------------------------------------------------------------------------

impl ChatError {
    /// Create an invalid message error with a reason
    pub fn invalid_message<T: Into<String>>(reason: T) -> Self {
        ChatError::InvalidMessage {
            reason: reason.into(),
        }
    }

    /// Create a configuration error with a reason
    pub fn config_error<T: Into<String>>(reason: T) -> Self {
        ChatError::Configuration {
            reason: reason.into(),
        }
    }

    /// Create a not-connected error for a session in `state`
    pub fn not_connected(user_id: UserId, state: SessionStateKind) -> Self {
        ChatError::NotConnected { user_id, state }
    }
}

// ----------------------------------------------------------------------------
// Type Aliases
// ----------------------------------------------------------------------------

pub type Result<T> = core::result::Result<T, ChatError>;
