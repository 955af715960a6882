//! Test utilities for deterministic session tests
//!
//! Everything runs on a [`ManualScheduler`], so time only moves when a test
//! advances it.

#![allow(dead_code)]

use std::rc::Rc;
use std::time::Duration;

use mindful_core::{
    ChatClient, ChatConfig, ConnectionSession, Identity, ManualScheduler, Message,
    RandomSource, SimulatedTransport, Task, TaskHandle, Transport, TransportCapabilities,
    UserId,
};

// ----------------------------------------------------------------------------
// Fixed Random Source
// ----------------------------------------------------------------------------

/// Random source that always picks the same index and the low end of any range
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedRandom {
    pub index: usize,
    pub offset: u64,
}

impl FixedRandom {
    pub fn first() -> Self {
        Self::default()
    }
}

impl RandomSource for FixedRandom {
    fn index(&mut self, len: usize) -> usize {
        self.index.min(len - 1)
    }

    fn between(&mut self, low: u64, high: u64) -> u64 {
        (low + self.offset).min(high)
    }
}

// ----------------------------------------------------------------------------
// Non-simulated Transport
// ----------------------------------------------------------------------------

/// Simulated latencies, but reports itself as a real link
pub struct RealLinkTransport {
    inner: SimulatedTransport,
}

impl RealLinkTransport {
    pub fn new(scheduler: &ManualScheduler, config: &ChatConfig) -> Self {
        Self {
            inner: SimulatedTransport::new(Rc::new(scheduler.clone()), config.latency.clone()),
        }
    }
}

impl Transport for RealLinkTransport {
    fn open(&self, identity: &Identity, on_ready: Task) -> TaskHandle {
        self.inner.open(identity, on_ready)
    }

    fn send_to(&self, message: Message, on_delivered: Box<dyn FnOnce(Message)>) -> TaskHandle {
        self.inner.send_to(message, on_delivered)
    }

    fn close(&self, user_id: &UserId) {
        self.inner.close(user_id)
    }

    fn is_open(&self, user_id: &UserId) -> bool {
        self.inner.is_open(user_id)
    }

    fn capabilities(&self) -> TransportCapabilities {
        TransportCapabilities { simulated: false }
    }
}

// ----------------------------------------------------------------------------
// Test Environment
// ----------------------------------------------------------------------------

pub struct TestEnv {
    pub scheduler: ManualScheduler,
    pub client: ChatClient,
}

impl TestEnv {
    /// Default latencies, deterministic replies drawn from `catalog`
    pub fn with_catalog(catalog: &[&str]) -> Self {
        let mut config = ChatConfig::testing();
        config.responder.catalog = catalog.iter().map(|s| s.to_string()).collect();
        Self::with_config(config)
    }

    pub fn with_config(config: ChatConfig) -> Self {
        let scheduler = ManualScheduler::new();
        let client = ChatClient::builder()
            .with_config(config)
            .with_scheduler(Rc::new(scheduler.clone()))
            .with_random_source(Box::new(FixedRandom::first()))
            .build()
            .expect("valid test configuration");
        Self { scheduler, client }
    }

    /// Connect `identity` and let the handshake complete
    pub fn connected(&self, identity: Identity) -> ConnectionSession {
        let session = self
            .client
            .connect(Some(identity))
            .expect("connect should succeed");
        self.scheduler.advance(self.client.config().latency.connect());
        assert!(session.is_connected(), "handshake should have completed");
        session
    }

    pub fn advance_ms(&self, millis: u64) -> usize {
        self.scheduler.advance(Duration::from_millis(millis))
    }

    pub fn drain(&self) -> usize {
        self.scheduler.run_until_idle()
    }

    pub fn conversation(&self, a: &str, b: &str) -> Vec<Message> {
        self.client
            .store()
            .conversation_with(&UserId::new(a), &UserId::new(b))
            .cloned()
            .collect()
    }
}

pub fn patient(id: &str) -> Identity {
    Identity::patient(id, format!("Patient {}", id))
}

pub fn doctor(id: &str) -> Identity {
    Identity::doctor(id, format!("Dr. {}", id))
}

pub fn bodies(messages: &[Message]) -> Vec<&str> {
    messages.iter().map(|m| m.body.as_str()).collect()
}
