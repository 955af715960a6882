//! Counterpart classification hook
//!
//! UI layers group counterparts into buckets such as "urgent" or "new". How a
//! counterpart is classified is a product decision, so the core only defines
//! the seam and ships a neutral policy.

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::message::Message;
use crate::types::Identity;

/// Bucket a counterpart is sorted into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriageLevel {
    Routine,
    New,
    Urgent,
}

impl fmt::Display for TriageLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TriageLevel::Routine => "routine",
            TriageLevel::New => "new",
            TriageLevel::Urgent => "urgent",
        };
        f.write_str(name)
    }
}

/// Classifies a counterpart from the conversation held with them
pub trait TriagePolicy {
    fn classify(&self, counterpart: &Identity, history: &[Message]) -> TriageLevel;
}

/// Puts everybody in [`TriageLevel::Routine`]
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTriage;

impl TriagePolicy for NoTriage {
    fn classify(&self, _counterpart: &Identity, _history: &[Message]) -> TriageLevel {
        TriageLevel::Routine
    }
}

impl<F> TriagePolicy for F
where
    F: Fn(&Identity, &[Message]) -> TriageLevel,
{
    fn classify(&self, counterpart: &Identity, history: &[Message]) -> TriageLevel {
        self(counterpart, history)
    }
}
