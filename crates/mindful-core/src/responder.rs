//! Synthetic peer replies
//!
//! Stands in for a counterpart that is not actually online: every delivered
//! message can be answered with a canned reply after a randomized delay.
//! Randomness comes from an injected [`RandomSource`] so tests can pin both
//! the chosen reply and the delay.

use core::fmt;
use core::time::Duration;

use chrono::{DateTime, Utc};

use crate::config::ResponderConfig;
use crate::errors::{ChatError, Result};
use crate::message::{Message, MessageId};

// ----------------------------------------------------------------------------
// Random Source
// ----------------------------------------------------------------------------

/// Injectable randomness
pub trait RandomSource {
    /// Uniform index in `0..len`; `len` is never zero
    fn index(&mut self, len: usize) -> usize;

    /// Uniform value in `low..=high`
    fn between(&mut self, low: u64, high: u64) -> u64;
}

impl RandomSource for fastrand::Rng {
    fn index(&mut self, len: usize) -> usize {
        self.usize(..len)
    }

    fn between(&mut self, low: u64, high: u64) -> u64 {
        self.u64(low..=high)
    }
}

// ----------------------------------------------------------------------------
// Response Simulator
// ----------------------------------------------------------------------------

/// Produces canned replies from a fixed, non-empty catalog
pub struct ResponseSimulator {
    catalog: Vec<String>,
    min_delay: Duration,
    max_delay: Duration,
    rng: Box<dyn RandomSource>,
}

impl ResponseSimulator {
    /// Fails when the catalog is empty or the delay window is inverted
    pub fn new(
        catalog: Vec<String>,
        window: (Duration, Duration),
        rng: Box<dyn RandomSource>,
    ) -> Result<Self> {
        let (min_delay, max_delay) = window;
        if catalog.is_empty() {
            return Err(ChatError::config_error("response catalog must not be empty"));
        }
        if min_delay > max_delay {
            return Err(ChatError::config_error("reply delay window is inverted"));
        }
        Ok(Self {
            catalog,
            min_delay,
            max_delay,
            rng,
        })
    }

    /// Build from configuration, seeding a `fastrand` generator
    pub fn from_config(config: &ResponderConfig) -> Result<Self> {
        config.validate()?;
        let rng = match config.seed {
            Some(seed) => fastrand::Rng::with_seed(seed),
            None => fastrand::Rng::new(),
        };
        Self::new(config.catalog.clone(), config.delay_window(), Box::new(rng))
    }

    /// Pick a reply body
    pub fn choose_body(&mut self) -> &str {
        let index = self.rng.index(self.catalog.len());
        // Clamp so a misbehaving source cannot index out of range
        &self.catalog[index.min(self.catalog.len() - 1)]
    }

    /// Draw a delay from the configured window
    pub fn reply_delay(&mut self) -> Duration {
        let low = millis(self.min_delay);
        let high = millis(self.max_delay);
        let drawn = self.rng.between(low, high).clamp(low, high);
        Duration::from_millis(drawn)
    }

    /// Reply to `trigger` with sender and receiver swapped
    pub fn reply_to(
        &mut self,
        trigger: &Message,
        id: MessageId,
        timestamp: DateTime<Utc>,
        sequence: u64,
    ) -> Message {
        let body = self.choose_body().to_string();
        Message {
            id,
            sender_id: trigger.receiver_id.clone(),
            receiver_id: trigger.sender_id.clone(),
            body,
            timestamp,
            read: false,
            sequence,
        }
    }

    pub fn catalog(&self) -> &[String] {
        &self.catalog
    }
}

impl fmt::Debug for ResponseSimulator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseSimulator")
            .field("catalog", &self.catalog.len())
            .field("min_delay", &self.min_delay)
            .field("max_delay", &self.max_delay)
            .finish()
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
