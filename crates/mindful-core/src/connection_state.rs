//! Linear Connection State Machine
//!
//! Session lifecycle as a value that is consumed by every transition.
//! Each transition yields the new state, the effects the session must carry
//! out, and an audit entry.
//!
//! ```text
//! Disconnected --Connect--> Connecting --HandshakeCompleted--> Connected
//!      ^                        |                                  |
//!      +-------Disconnect-------+------------Disconnect------------+
//! ```

use core::fmt;
use core::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::{Timestamp, UserId};

// ----------------------------------------------------------------------------
// Connection State Types
// ----------------------------------------------------------------------------

/// Lifecycle state of one session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// No link; the initial and terminal state
    Disconnected(DisconnectedState),
    /// Handshake in flight
    Connecting(ConnectingState),
    /// Link up, messages may be sent
    Connected(ConnectedState),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisconnectedState {
    pub user_id: UserId,
    pub last_connected: Option<Timestamp>,
    pub completed_sessions: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectingState {
    pub user_id: UserId,
    pub started: Timestamp,
    pub expected_ready: Timestamp,
    pub completed_sessions: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectedState {
    pub user_id: UserId,
    pub connected_since: Timestamp,
    pub last_activity: Timestamp,
    pub messages_sent: u64,
    pub completed_sessions: u32,
}

/// Field-less view of [`ConnectionState`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionStateKind {
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for SessionStateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionStateKind::Disconnected => "Disconnected",
            SessionStateKind::Connecting => "Connecting",
            SessionStateKind::Connected => "Connected",
        };
        f.write_str(name)
    }
}

// ----------------------------------------------------------------------------
// State Transition Events
// ----------------------------------------------------------------------------

/// Events that drive the state machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionEvent {
    /// Open the link; the handshake is expected to take `latency`
    Connect { latency: Duration },
    /// The transport reported the link as up
    HandshakeCompleted,
    /// A message left this session
    MessageSent,
    /// Tear the session down
    Disconnect,
}

impl ConnectionEvent {
    fn name(&self) -> &'static str {
        match self {
            ConnectionEvent::Connect { .. } => "Connect",
            ConnectionEvent::HandshakeCompleted => "HandshakeCompleted",
            ConnectionEvent::MessageSent => "MessageSent",
            ConnectionEvent::Disconnect => "Disconnect",
        }
    }
}

/// Work the owning session performs after a transition, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effect {
    /// Subscribe the session's bus listeners
    RegisterListeners,
    /// Start the transport handshake
    OpenTransport,
    /// Cancel every scheduled task owned by the session
    CancelPending,
    /// Announce the disconnect on the bus
    EmitDisconnected,
    /// Drop the session's bus listeners
    ReleaseListeners,
}

// ----------------------------------------------------------------------------
// State Transition Results
// ----------------------------------------------------------------------------

/// Result of a state transition
#[derive(Debug, Clone)]
pub struct StateTransition {
    pub new_state: ConnectionState,
    pub effects: Vec<Effect>,
    pub audit_entry: AuditEntry,
}

/// Audit trail entry for state transitions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: Timestamp,
    pub user_id: UserId,
    pub from_state: SessionStateKind,
    pub to_state: SessionStateKind,
    pub event: String,
    pub effects_count: usize,
}

// ----------------------------------------------------------------------------
// State Machine Implementation
// ----------------------------------------------------------------------------

impl ConnectionState {
    pub fn new_disconnected(user_id: UserId) -> Self {
        ConnectionState::Disconnected(DisconnectedState {
            user_id,
            last_connected: None,
            completed_sessions: 0,
        })
    }

    pub fn user_id(&self) -> &UserId {
        match self {
            ConnectionState::Disconnected(s) => &s.user_id,
            ConnectionState::Connecting(s) => &s.user_id,
            ConnectionState::Connected(s) => &s.user_id,
        }
    }

    pub fn kind(&self) -> SessionStateKind {
        match self {
            ConnectionState::Disconnected(_) => SessionStateKind::Disconnected,
            ConnectionState::Connecting(_) => SessionStateKind::Connecting,
            ConnectionState::Connected(_) => SessionStateKind::Connected,
        }
    }

    /// Process an event at time `now` (consumes self)
    pub fn transition(
        self,
        event: ConnectionEvent,
        now: Timestamp,
    ) -> Result<StateTransition, StateTransitionError> {
        let from_state = self.kind();
        let event_name = event.name();

        let (new_state, effects) = match (self, event) {
            // From Disconnected
            (ConnectionState::Disconnected(state), ConnectionEvent::Connect { latency }) => {
                let new_state = ConnectionState::Connecting(ConnectingState {
                    user_id: state.user_id,
                    started: now,
                    expected_ready: now + latency,
                    completed_sessions: state.completed_sessions,
                });
                (
                    new_state,
                    vec![Effect::RegisterListeners, Effect::OpenTransport],
                )
            }

            (state @ ConnectionState::Disconnected(_), ConnectionEvent::Disconnect) => {
                (state, Vec::new())
            }

            // From Connecting
            (state @ ConnectionState::Connecting(_), ConnectionEvent::Connect { .. }) => {
                (state, Vec::new())
            }

            (ConnectionState::Connecting(state), ConnectionEvent::HandshakeCompleted) => {
                let new_state = ConnectionState::Connected(ConnectedState {
                    user_id: state.user_id,
                    connected_since: now,
                    last_activity: now,
                    messages_sent: 0,
                    completed_sessions: state.completed_sessions,
                });
                (new_state, Vec::new())
            }

            (ConnectionState::Connecting(state), ConnectionEvent::Disconnect) => {
                let new_state = ConnectionState::Disconnected(DisconnectedState {
                    user_id: state.user_id,
                    last_connected: None,
                    completed_sessions: state.completed_sessions,
                });
                (new_state, teardown_effects())
            }

            // From Connected
            (state @ ConnectionState::Connected(_), ConnectionEvent::Connect { .. }) => {
                (state, Vec::new())
            }

            (ConnectionState::Connected(mut state), ConnectionEvent::MessageSent) => {
                state.last_activity = now;
                state.messages_sent += 1;
                (ConnectionState::Connected(state), Vec::new())
            }

            (ConnectionState::Connected(state), ConnectionEvent::Disconnect) => {
                let new_state = ConnectionState::Disconnected(DisconnectedState {
                    user_id: state.user_id,
                    last_connected: Some(now),
                    completed_sessions: state.completed_sessions + 1,
                });
                (new_state, teardown_effects())
            }

            // Invalid transitions
            (_, event) => {
                return Err(StateTransitionError::InvalidTransition {
                    from_state,
                    event: event_name.to_string(),
                    reason: format!("Event {:?} not valid for state {}", event, from_state),
                });
            }
        };

        let audit_entry = AuditEntry {
            timestamp: now,
            user_id: new_state.user_id().clone(),
            from_state,
            to_state: new_state.kind(),
            event: event_name.to_string(),
            effects_count: effects.len(),
        };

        Ok(StateTransition {
            new_state,
            effects,
            audit_entry,
        })
    }

    pub fn can_send_messages(&self) -> bool {
        matches!(self, ConnectionState::Connected(_))
    }

    /// Connecting or Connected
    pub fn is_live(&self) -> bool {
        !matches!(self, ConnectionState::Disconnected(_))
    }
}

fn teardown_effects() -> Vec<Effect> {
    vec![
        Effect::CancelPending,
        Effect::EmitDisconnected,
        Effect::ReleaseListeners,
    ]
}

// ----------------------------------------------------------------------------
// Error Types
// ----------------------------------------------------------------------------

/// Errors that can occur during state transitions
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateTransitionError {
    #[error("Invalid transition from {from_state} on event {event}: {reason}")]
    InvalidTransition {
        from_state: SessionStateKind,
        event: String,
        reason: String,
    },
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
