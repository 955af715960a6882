//! MindfulChat CLI library
//!
//! Command-line driver for the messaging core: lists doctors, runs simulated
//! conversations and prints transcripts.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;

pub use cli::{Cli, Commands, OutputFormat};
pub use commands::{run_conversation, Clock, CommandDispatcher};
pub use config::AppConfig;
pub use error::{CliError, Result};
