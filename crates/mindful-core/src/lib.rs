//! MindfulChat Messaging Core
//!
//! Session-scoped messaging for a two-role (patient/doctor) chat. The crate
//! provides the connection lifecycle, a named-event bus, an append-only
//! message log and a reply simulator that stands in for a counterpart who is
//! not online. All deferred work runs on an injected [`Scheduler`], so the
//! whole core is deterministic under [`ManualScheduler`].
//!
//! ```no_run
//! use std::rc::Rc;
//! use std::time::Duration;
//! use mindful_core::{ChatClient, ChatConfig, ChatView, Identity, ManualScheduler};
//!
//! let scheduler = ManualScheduler::new();
//! let client = ChatClient::builder()
//!     .with_config(ChatConfig::testing())
//!     .with_scheduler(Rc::new(scheduler.clone()))
//!     .build()?;
//!
//! let session = client.connect(Some(Identity::patient("p1", "Pat")))?;
//! scheduler.advance(Duration::from_millis(500));
//! session.send_message("doctor_1", "Hello")?;
//! scheduler.run_until_idle();
//!
//! let view = ChatView::new(session);
//! assert_eq!(view.conversation(&"doctor_1".into()).len(), 2);
//! # Ok::<(), mindful_core::ChatError>(())
//! ```

extern crate alloc;

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod client;
pub mod config;
pub mod connection_state;
pub mod directory;
pub mod errors;
pub mod event_bus;
pub mod events;
pub mod message;
pub mod responder;
pub mod scheduler;
pub mod session;
pub mod store;
pub mod transport;
pub mod triage;
pub mod types;
pub mod view;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use client::{ChatClient, ChatClientBuilder};
pub use config::{ChatConfig, ConnectionPolicy, LatencyConfig, ResponderConfig};
pub use connection_state::{AuditEntry, ConnectionState, SessionStateKind};
pub use directory::{DirectoryProvider, StaticDirectory};
pub use errors::{ChatError, Result};
pub use event_bus::{BusEvent, EventBus, SubscriptionId};
pub use events::{EventKind, SessionBus, SessionEvent};
pub use message::{ConversationKey, Message, MessageId};
pub use responder::{RandomSource, ResponseSimulator};
pub use scheduler::{ManualScheduler, Scheduler, Task, TaskHandle, TimeSource};
pub use session::{ConnectionSession, MAX_AUDIT_ENTRIES};
pub use store::{Conversation, MessageStore, MessageStoreStats};
pub use transport::{SimulatedTransport, Transport, TransportCapabilities};
pub use triage::{NoTriage, TriageLevel, TriagePolicy};
pub use types::{Identity, Role, Timestamp, UserId};
pub use view::{ChatView, Watch};

#[cfg(feature = "tokio-scheduler")]
pub use scheduler::TokioScheduler;
