//! Centralized Configuration Management
//!
//! All tunables of the messaging core in one serde-friendly structure so a
//! host application can load them from a file. Every section has a
//! `Default` matching the behaviour of the hosted web client.

use core::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::directory::seed_doctors;
use crate::errors::{ChatError, Result};
use crate::types::Identity;

// ----------------------------------------------------------------------------
// Latency Configuration
// ----------------------------------------------------------------------------

/// Simulated network latencies, in logical milliseconds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LatencyConfig {
    /// Delay between `connect` and the `connected` event
    pub connect_ms: u64,
    /// Delay between `send_message` and the `message` event
    pub send_ms: u64,
}

impl Default for LatencyConfig {
    fn default() -> Self {
        Self {
            connect_ms: 500,
            send_ms: 500,
        }
    }
}

impl LatencyConfig {
    pub fn connect(&self) -> Duration {
        Duration::from_millis(self.connect_ms)
    }

    pub fn send(&self) -> Duration {
        Duration::from_millis(self.send_ms)
    }

    /// Zero latency, every deferred step runs on the next scheduler turn
    pub fn instant() -> Self {
        Self {
            connect_ms: 0,
            send_ms: 0,
        }
    }
}

// ----------------------------------------------------------------------------
// Responder Configuration
// ----------------------------------------------------------------------------

/// Synthetic reply generation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponderConfig {
    pub enabled: bool,
    /// Lower bound of the reply delay window (inclusive)
    pub min_delay_ms: u64,
    /// Upper bound of the reply delay window (inclusive)
    pub max_delay_ms: u64,
    /// Reply bodies, chosen uniformly at random
    pub catalog: Vec<String>,
    /// Seed for the random source; `None` seeds from the OS
    pub seed: Option<u64>,
}

impl Default for ResponderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_delay_ms: 5_000,
            max_delay_ms: 10_000,
            catalog: default_catalog(),
            seed: None,
        }
    }
}

impl ResponderConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn delay_window(&self) -> (Duration, Duration) {
        (
            Duration::from_millis(self.min_delay_ms),
            Duration::from_millis(self.max_delay_ms),
        )
    }

    pub fn validate(&self) -> Result<()> {
        if self.catalog.is_empty() {
            return Err(ChatError::config_error("response catalog must not be empty"));
        }
        if self.catalog.iter().any(|body| body.trim().is_empty()) {
            return Err(ChatError::config_error(
                "response catalog contains an empty entry",
            ));
        }
        if self.min_delay_ms > self.max_delay_ms {
            return Err(ChatError::config_error(format!(
                "reply delay window is inverted ({}ms > {}ms)",
                self.min_delay_ms, self.max_delay_ms
            )));
        }
        Ok(())
    }
}

/// Replies used by the hosted client
pub fn default_catalog() -> Vec<String> {
    [
        "Thank you for sharing that with me. How long have you been feeling this way?",
        "I understand this must be difficult. Can you tell me more about what's been going on?",
        "I appreciate you reaching out. Have you tried any coping strategies that have helped in the past?",
        "That sounds challenging. Let's work together to find some strategies that might help.",
        "I'm here to support you. What would be most helpful for you right now?",
        "It's important to address these feelings. Have you discussed this with anyone else in your support network?",
        "Thank you for trusting me with this information. Let's discuss some potential next steps.",
    ]
    .iter()
    .map(|body| body.to_string())
    .collect()
}

// ----------------------------------------------------------------------------
// Connection Policy
// ----------------------------------------------------------------------------

/// What a second `connect` for an identity with a live session does
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionPolicy {
    /// Hand back the live session
    #[default]
    Reuse,
    /// Fail with `DuplicateConnection`
    Reject,
}

// ----------------------------------------------------------------------------
// Chat Configuration
// ----------------------------------------------------------------------------

/// Complete configuration of a [`ChatClient`](crate::client::ChatClient)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub latency: LatencyConfig,
    pub responder: ResponderConfig,
    pub connection_policy: ConnectionPolicy,
    /// Longest accepted message body, in characters
    pub max_body_chars: usize,
    /// Wall-clock instant of scheduler time zero; `None` uses client creation time
    pub epoch: Option<DateTime<Utc>>,
    /// Seed entries for the static directory
    pub directory: Vec<Identity>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            latency: LatencyConfig::default(),
            responder: ResponderConfig::default(),
            connection_policy: ConnectionPolicy::default(),
            max_body_chars: 4_096,
            epoch: None,
            directory: seed_doctors(),
        }
    }
}

impl ChatConfig {
    /// Deterministic configuration for tests: fixed epoch and seed
    pub fn testing() -> Self {
        Self {
            responder: ResponderConfig {
                seed: Some(42),
                ..ResponderConfig::default()
            },
            epoch: Some(DateTime::<Utc>::default()),
            ..Self::default()
        }
    }

    /// No simulated latency and no synthetic replies
    pub fn instant() -> Self {
        Self {
            latency: LatencyConfig::instant(),
            responder: ResponderConfig::disabled(),
            ..Self::testing()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_body_chars == 0 {
            return Err(ChatError::config_error("max_body_chars must be positive"));
        }
        if self.responder.enabled {
            self.responder.validate()?;
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
