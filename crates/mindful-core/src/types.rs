//! Core types for the messaging core
//!
//! Identities, roles and the logical timestamp used by schedulers. Newtypes
//! keep user ids from being confused with message bodies or display names.

use core::fmt;
use core::ops::{Add, Sub};
use core::str::FromStr;
use core::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::ChatError;

// ----------------------------------------------------------------------------
// User Identifier
// ----------------------------------------------------------------------------

/// Unique identifier of an authenticated participant
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// An id with no visible characters cannot address anybody
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// Leading characters used to synthesise placeholder names
    pub fn short(&self) -> &str {
        match self.0.char_indices().nth(5) {
            Some((idx, _)) => &self.0[..idx],
            None => &self.0,
        }
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for UserId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

// ----------------------------------------------------------------------------
// Role
// ----------------------------------------------------------------------------

/// The two sides of the product
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Patient,
    Doctor,
}

impl Role {
    /// The role this one talks to
    pub fn counterpart(self) -> Role {
        match self {
            Role::Patient => Role::Doctor,
            Role::Doctor => Role::Patient,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Patient => "patient",
            Role::Doctor => "doctor",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ChatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "patient" => Ok(Role::Patient),
            "doctor" => Ok(Role::Doctor),
            other => Err(ChatError::config_error(format!("unknown role '{}'", other))),
        }
    }
}

// ----------------------------------------------------------------------------
// Identity
// ----------------------------------------------------------------------------

/// An authenticated participant, as handed over by the auth collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: UserId,
    pub role: Role,
    pub display_name: String,
    /// Only meaningful for doctors
    #[serde(default = "default_available")]
    pub available: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specialization: Option<String>,
}

fn default_available() -> bool {
    true
}

impl Identity {
    pub fn new(id: impl Into<UserId>, role: Role, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role,
            display_name: display_name.into(),
            available: true,
            specialization: None,
        }
    }

    pub fn patient(id: impl Into<UserId>, display_name: impl Into<String>) -> Self {
        Self::new(id, Role::Patient, display_name)
    }

    pub fn doctor(id: impl Into<UserId>, display_name: impl Into<String>) -> Self {
        Self::new(id, Role::Doctor, display_name)
    }

    pub fn with_availability(mut self, available: bool) -> Self {
        self.available = available;
        self
    }

    pub fn with_specialization(mut self, specialization: impl Into<String>) -> Self {
        self.specialization = Some(specialization.into());
        self
    }
}

// ----------------------------------------------------------------------------
// Timestamp
// ----------------------------------------------------------------------------

/// Millisecond reading of a scheduler clock
///
/// Schedulers count from their own origin; [`Timestamp::to_datetime`] anchors
/// a reading to wall-clock time through a configured epoch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    pub const ZERO: Self = Self(0);

    pub fn new(millis: u64) -> Self {
        Self(millis)
    }

    pub fn as_millis(&self) -> u64 {
        self.0
    }

    /// Wall-clock instant of this reading relative to `epoch`
    pub fn to_datetime(&self, epoch: DateTime<Utc>) -> DateTime<Utc> {
        epoch + chrono::Duration::milliseconds(self.0.min(i64::MAX as u64) as i64)
    }

    pub fn duration_since(&self, other: Self) -> Duration {
        Duration::from_millis(self.0.saturating_sub(other.0))
    }
}

impl Add<Duration> for Timestamp {
    type Output = Timestamp;

    fn add(self, delay: Duration) -> Timestamp {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        Timestamp(self.0.saturating_add(millis))
    }
}

impl Sub for Timestamp {
    type Output = u64;

    fn sub(self, other: Timestamp) -> u64 {
        self.0.saturating_sub(other.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t+{}ms", self.0)
    }
}

/// Default epoch for logical clocks: the Unix epoch
pub fn unix_epoch() -> DateTime<Utc> {
    DateTime::<Utc>::default()
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
