//! MindfulChat CLI Configuration
//!
//! The CLI reads a single TOML file. The `[chat]` table maps straight onto
//! [`ChatConfig`]; the `[patient]` table names the identity the CLI logs in
//! as. Missing keys fall back to defaults.
//!
//! ```toml
//! [chat]
//! connection_policy = "reject"
//!
//! [chat.latency]
//! connect_ms = 250
//!
//! [patient]
//! id = "patient_7"
//! display_name = "Jamie"
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use mindful_core::{ChatConfig, Identity};

use crate::error::Result;

// ----------------------------------------------------------------------------
// CLI Application Configuration
// ----------------------------------------------------------------------------

/// Complete configuration for the MindfulChat CLI
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Messaging core configuration
    pub chat: ChatConfig,

    /// Identity the CLI acts as
    pub patient: PatientConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatientConfig {
    pub id: String,
    pub display_name: String,
}

impl Default for PatientConfig {
    fn default() -> Self {
        Self {
            id: "patient_demo".to_string(),
            display_name: "Demo Patient".to_string(),
        }
    }
}

impl PatientConfig {
    pub fn identity(&self) -> Identity {
        Identity::patient(self.id.as_str(), self.display_name.as_str())
    }
}

impl AppConfig {
    /// Load and validate a configuration file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(content)?;
        config.chat.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
