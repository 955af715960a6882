//! Chat client: the process-wide owner of shared session state
//!
//! A [`ChatClient`] holds the event bus, the message store, the scheduler,
//! the transport and the directory. It hands out [`ConnectionSession`]s and
//! guarantees that an identity never has two live sessions at once.

use alloc::rc::{Rc, Weak};
use core::cell::{Cell, Ref, RefCell};

use chrono::{DateTime, Utc};
use hashbrown::HashMap;
use tracing::{debug, info};

use crate::config::{ChatConfig, ConnectionPolicy};
use crate::connection_state::SessionStateKind;
use crate::directory::{DirectoryProvider, StaticDirectory};
use crate::errors::{ChatError, Result};
use crate::events::SessionBus;
use crate::responder::{RandomSource, ResponseSimulator};
use crate::scheduler::Scheduler;
use crate::session::{ConnectionSession, SessionInner};
use crate::store::MessageStore;
use crate::transport::{SimulatedTransport, Transport};
use crate::types::{Identity, Role, UserId};

// ----------------------------------------------------------------------------
// Shared Client State
// ----------------------------------------------------------------------------

/// State shared by the client and all of its sessions
pub(crate) struct ClientShared {
    pub(crate) config: ChatConfig,
    pub(crate) epoch: DateTime<Utc>,
    pub(crate) bus: Rc<SessionBus>,
    pub(crate) store: RefCell<MessageStore>,
    pub(crate) scheduler: Rc<dyn Scheduler>,
    pub(crate) transport: Rc<dyn Transport>,
    pub(crate) directory: Rc<dyn DirectoryProvider>,
    pub(crate) responder: Option<RefCell<ResponseSimulator>>,
    sequence: Cell<u64>,
    sessions: RefCell<HashMap<UserId, Weak<SessionInner>>>,
}

impl ClientShared {
    pub(crate) fn next_sequence(&self) -> u64 {
        let next = self.sequence.get() + 1;
        self.sequence.set(next);
        next
    }

    /// Wall-clock time of the scheduler's current reading
    pub(crate) fn stamp(&self) -> DateTime<Utc> {
        self.scheduler.now().to_datetime(self.epoch)
    }

    /// A counterpart is attached when it holds a Connected session here
    pub(crate) fn is_attached(&self, user: &UserId) -> bool {
        self.live_session(user)
            .is_some_and(|session| session.is_connected())
    }

    fn live_session(&self, user: &UserId) -> Option<Rc<SessionInner>> {
        self.sessions.borrow().get(user).and_then(Weak::upgrade)
    }
}

// ----------------------------------------------------------------------------
// Chat Client
// ----------------------------------------------------------------------------

/// Entry point for UI layers
#[derive(Clone)]
pub struct ChatClient {
    shared: Rc<ClientShared>,
}

impl ChatClient {
    pub fn builder() -> ChatClientBuilder {
        ChatClientBuilder::new()
    }

    /// Open (or reuse) the session of the authenticated identity
    ///
    /// `None` means the auth collaborator has no logged-in user.
    pub fn connect(&self, identity: Option<Identity>) -> Result<ConnectionSession> {
        let identity = identity.ok_or(ChatError::Unauthenticated)?;
        if identity.id.is_blank() {
            return Err(ChatError::Unauthenticated);
        }

        if let Some(existing) = self.shared.live_session(&identity.id) {
            let session = ConnectionSession::from_inner(existing);
            if session.state().is_live() {
                return match self.shared.config.connection_policy {
                    ConnectionPolicy::Reuse => {
                        debug!("Reusing live session for {}", identity.id);
                        Ok(session)
                    }
                    ConnectionPolicy::Reject => Err(ChatError::DuplicateConnection {
                        user_id: identity.id,
                    }),
                };
            }
            session.connect()?;
            return Ok(session);
        }

        let session = ConnectionSession::new(Rc::clone(&self.shared), identity);
        {
            let mut sessions = self.shared.sessions.borrow_mut();
            sessions.retain(|_, weak| weak.strong_count() > 0);
            sessions.insert(session.user_id().clone(), session.downgrade());
        }
        session.connect()?;
        info!(
            "Session opened for {} ({})",
            session.user_id(),
            session.identity().role
        );
        Ok(session)
    }

    /// The session of `user_id`, if one is still alive
    pub fn session(&self, user_id: &UserId) -> Option<ConnectionSession> {
        self.shared
            .live_session(user_id)
            .map(ConnectionSession::from_inner)
    }

    /// Ids with a Connecting or Connected session
    pub fn live_sessions(&self) -> Vec<UserId> {
        let mut sessions = self.shared.sessions.borrow_mut();
        sessions.retain(|_, weak| weak.strong_count() > 0);
        let mut live: Vec<UserId> = sessions
            .iter()
            .filter_map(|(id, weak)| weak.upgrade().map(|inner| (id, inner)))
            .filter(|(_, inner)| inner.state_kind() != SessionStateKind::Disconnected)
            .map(|(id, _)| id.clone())
            .collect();
        live.sort();
        live
    }

    /// Read-only access to the message log
    pub fn store(&self) -> Ref<'_, MessageStore> {
        self.shared.store.borrow()
    }

    /// Bus shared by all sessions; a real transport emits into it
    pub fn bus(&self) -> &SessionBus {
        &self.shared.bus
    }

    pub fn list_counterparts(&self, for_role: Role) -> Vec<Identity> {
        self.shared.directory.list_counterparts(for_role)
    }

    pub fn config(&self) -> &ChatConfig {
        &self.shared.config
    }

    pub fn epoch(&self) -> DateTime<Utc> {
        self.shared.epoch
    }
}

// ----------------------------------------------------------------------------
// Client Builder
// ----------------------------------------------------------------------------

/// Builder for [`ChatClient`]
///
/// A scheduler is mandatory. Transport, directory and responder default to
/// the simulated transport, the configured seed directory and a responder
/// built from the configuration.
#[derive(Default)]
pub struct ChatClientBuilder {
    config: ChatConfig,
    scheduler: Option<Rc<dyn Scheduler>>,
    transport: Option<Rc<dyn Transport>>,
    directory: Option<Rc<dyn DirectoryProvider>>,
    responder: Option<ResponseSimulator>,
    random: Option<Box<dyn RandomSource>>,
}

impl ChatClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: ChatConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_scheduler(mut self, scheduler: Rc<dyn Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn with_transport(mut self, transport: Rc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn with_directory(mut self, directory: Rc<dyn DirectoryProvider>) -> Self {
        self.directory = Some(directory);
        self
    }

    /// Use a prepared responder instead of one built from configuration
    pub fn with_responder(mut self, responder: ResponseSimulator) -> Self {
        self.responder = Some(responder);
        self
    }

    /// Drive the configured responder with `random` instead of a seeded generator
    pub fn with_random_source(mut self, random: Box<dyn RandomSource>) -> Self {
        self.random = Some(random);
        self
    }

    pub fn build(self) -> Result<ChatClient> {
        self.config.validate()?;
        let scheduler = self
            .scheduler
            .ok_or_else(|| ChatError::config_error("no scheduler configured"))?;

        let responder = match (self.config.responder.enabled, self.responder, self.random) {
            (false, _, _) => None,
            (true, Some(responder), _) => Some(responder),
            (true, None, Some(random)) => Some(ResponseSimulator::new(
                self.config.responder.catalog.clone(),
                self.config.responder.delay_window(),
                random,
            )?),
            (true, None, None) => Some(ResponseSimulator::from_config(&self.config.responder)?),
        };

        let transport = self.transport.unwrap_or_else(|| {
            Rc::new(SimulatedTransport::new(
                Rc::clone(&scheduler),
                self.config.latency.clone(),
            ))
        });
        let directory = self
            .directory
            .unwrap_or_else(|| Rc::new(StaticDirectory::new(self.config.directory.clone())));
        let epoch = self.config.epoch.unwrap_or_else(Utc::now);

        Ok(ChatClient {
            shared: Rc::new(ClientShared {
                config: self.config,
                epoch,
                bus: Rc::new(SessionBus::new()),
                store: RefCell::new(MessageStore::new()),
                scheduler,
                transport,
                directory,
                responder: responder.map(RefCell::new),
                sequence: Cell::new(0),
                sessions: RefCell::new(HashMap::default()),
            }),
        })
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
