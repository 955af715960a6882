//! Transport abstraction for the messaging core
//!
//! Sessions never touch the wire directly: they ask a [`Transport`] to open a
//! link and to carry messages, and get called back when that has happened.
//! [`SimulatedTransport`] fakes both with fixed latencies on a scheduler; a
//! socket-backed transport implements the same trait.

use alloc::boxed::Box;
use alloc::rc::Rc;
use core::cell::RefCell;

use hashbrown::HashSet;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::LatencyConfig;
use crate::message::Message;
use crate::scheduler::{Scheduler, Task, TaskHandle};
use crate::types::{Identity, UserId};

/// Callback receiving a message once the transport has carried it
pub type Delivery = Box<dyn FnOnce(Message)>;

// ----------------------------------------------------------------------------
// Transport Trait
// ----------------------------------------------------------------------------

/// What a transport can do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportCapabilities {
    /// No real peer sits behind this transport; synthetic replies are allowed
    pub simulated: bool,
}

/// Unified transport interface for chat sessions
pub trait Transport {
    /// Start the handshake for `identity`; `on_ready` runs once the link is up
    fn open(&self, identity: &Identity, on_ready: Task) -> TaskHandle;

    /// Carry `message`; `on_delivered` runs with it once delivered
    fn send_to(&self, message: Message, on_delivered: Delivery) -> TaskHandle;

    /// Release the link for `user_id`
    fn close(&self, user_id: &UserId);

    fn is_open(&self, user_id: &UserId) -> bool;

    fn capabilities(&self) -> TransportCapabilities;
}

// ----------------------------------------------------------------------------
// Simulated Transport
// ----------------------------------------------------------------------------

/// In-process transport with fixed handshake and send latencies
pub struct SimulatedTransport {
    scheduler: Rc<dyn Scheduler>,
    latency: LatencyConfig,
    open_links: Rc<RefCell<HashSet<UserId>>>,
}

impl SimulatedTransport {
    pub fn new(scheduler: Rc<dyn Scheduler>, latency: LatencyConfig) -> Self {
        Self {
            scheduler,
            latency,
            open_links: Rc::new(RefCell::new(HashSet::new())),
        }
    }

    pub fn latency(&self) -> &LatencyConfig {
        &self.latency
    }
}

impl Transport for SimulatedTransport {
    fn open(&self, identity: &Identity, on_ready: Task) -> TaskHandle {
        let user_id = identity.id.clone();
        let links = Rc::clone(&self.open_links);
        debug!(
            "Simulated handshake for {} ({}ms)",
            user_id, self.latency.connect_ms
        );
        self.scheduler.schedule(
            self.latency.connect(),
            Box::new(move || {
                links.borrow_mut().insert(user_id);
                on_ready();
            }),
        )
    }

    fn send_to(&self, message: Message, on_delivered: Delivery) -> TaskHandle {
        debug!(
            "Simulated send {} -> {} ({}ms)",
            message.sender_id, message.receiver_id, self.latency.send_ms
        );
        self.scheduler.schedule(
            self.latency.send(),
            Box::new(move || on_delivered(message)),
        )
    }

    fn close(&self, user_id: &UserId) {
        self.open_links.borrow_mut().remove(user_id);
    }

    fn is_open(&self, user_id: &UserId) -> bool {
        self.open_links.borrow().contains(user_id)
    }

    fn capabilities(&self) -> TransportCapabilities {
        TransportCapabilities { simulated: true }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageId;
    use crate::scheduler::{ManualScheduler, TimeSource};
    use crate::types::{unix_epoch, Timestamp};
    use core::cell::Cell;
    use core::time::Duration;

    fn transport() -> (ManualScheduler, SimulatedTransport) {
        let scheduler = ManualScheduler::new();
        let transport = SimulatedTransport::new(Rc::new(scheduler.clone()), LatencyConfig::default());
        (scheduler, transport)
    }

    #[test]
    fn test_open_marks_link_after_latency() {
        let (scheduler, transport) = transport();
        let identity = Identity::patient("p1", "Pat");
        let ready = Rc::new(Cell::new(false));
        let flag = Rc::clone(&ready);

        transport.open(&identity, Box::new(move || flag.set(true)));
        scheduler.advance(Duration::from_millis(499));
        assert!(!ready.get());
        assert!(!transport.is_open(&identity.id));

        scheduler.advance(Duration::from_millis(1));
        assert!(ready.get());
        assert!(transport.is_open(&identity.id));

        transport.close(&identity.id);
        assert!(!transport.is_open(&identity.id));
    }

    #[test]
    fn test_send_delivers_after_latency() {
        let (scheduler, transport) = transport();
        let message = Message::new(
            MessageId::generate(),
            UserId::new("p1"),
            UserId::new("d1"),
            "hello",
            unix_epoch(),
            1,
        )
        .unwrap();
        let delivered = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&delivered);

        let handle = transport.send_to(
            message.clone(),
            Box::new(move |m| *sink.borrow_mut() = Some(m)),
        );
        assert!(handle.is_pending());
        scheduler.run_until_idle();

        assert_eq!(delivered.borrow().as_ref(), Some(&message));
        assert_eq!(scheduler.now(), Timestamp::new(500));
        assert!(transport.capabilities().simulated);
    }
}
