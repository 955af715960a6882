//! Command-line interface definitions and parsing

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<String>,

    /// Wait out the simulated latencies in real time
    #[arg(short, long)]
    pub realtime: bool,

    /// Output format for listings and transcripts
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List the doctors a patient can reach
    Doctors,
    /// Send a single message as a patient and print the exchange
    Send {
        /// Recipient doctor id
        #[arg(short, long, default_value = "doctor_1")]
        to: String,
        /// Message content
        message: String,
    },
    /// Run a scripted conversation between a patient and a doctor
    Demo {
        /// Doctor to talk to
        #[arg(short, long, default_value = "doctor_1")]
        doctor: String,
        /// Have the doctor connected too, so no synthetic replies are generated
        #[arg(long)]
        doctor_online: bool,
        /// Patient messages, in order
        #[arg(default_values_t = default_script())]
        messages: Vec<String>,
    },
    /// Print the effective configuration as TOML
    Config,
}

fn default_script() -> Vec<String> {
    vec![
        "Hi, I have been feeling anxious lately.".to_string(),
        "It is mostly at night.".to_string(),
    ]
}
