//! Command handlers for the MindfulChat CLI

use std::rc::Rc;
use std::time::Duration;

use tracing::{debug, info};

use mindful_core::{
    ChatClient, ChatView, Identity, ManualScheduler, Message, Role, Scheduler, SessionEvent,
    TokioScheduler, UserId,
};

use crate::cli::{Cli, Commands, OutputFormat};
use crate::config::AppConfig;
use crate::error::{CliError, Result};

// Extra wall-clock margin when waiting on real timers
const REALTIME_SLACK: Duration = Duration::from_millis(50);

// ----------------------------------------------------------------------------
// Clock
// ----------------------------------------------------------------------------

/// How simulated time advances for a command
pub enum Clock {
    /// Virtual clock; pending work is drained instantly
    Manual(ManualScheduler),
    /// Real timers on the current `LocalSet`
    Realtime(TokioScheduler),
}

impl Clock {
    pub fn new(realtime: bool) -> Self {
        if realtime {
            Clock::Realtime(TokioScheduler::new())
        } else {
            Clock::Manual(ManualScheduler::new())
        }
    }

    pub fn scheduler(&self) -> Rc<dyn Scheduler> {
        match self {
            Clock::Manual(scheduler) => Rc::new(scheduler.clone()),
            Clock::Realtime(scheduler) => Rc::new(scheduler.clone()),
        }
    }

    /// Let everything due within `window` happen
    pub async fn settle(&self, window: Duration) {
        match self {
            Clock::Manual(scheduler) => {
                let ran = scheduler.run_until_idle();
                debug!("Drained {} scheduled task(s)", ran);
            }
            Clock::Realtime(_) => tokio::time::sleep(window + REALTIME_SLACK).await,
        }
    }
}

// ----------------------------------------------------------------------------
// Command Dispatch
// ----------------------------------------------------------------------------

/// Command dispatcher for handling CLI commands
pub struct CommandDispatcher;

impl CommandDispatcher {
    /// Execute a CLI command, writing its output to stdout
    pub async fn execute(cli: Cli, config: AppConfig) -> Result<()> {
        let output = match cli.command {
            Commands::Doctors => Self::handle_doctors_command(&config, cli.format)?,
            Commands::Send { to, message } => {
                let clock = Clock::new(cli.realtime);
                let transcript = run_conversation(
                    &config,
                    &clock,
                    &UserId::new(to),
                    false,
                    &[message],
                )
                .await?;
                render_transcript(&transcript, cli.format)?
            }
            Commands::Demo {
                doctor,
                doctor_online,
                messages,
            } => {
                let clock = Clock::new(cli.realtime);
                let transcript = run_conversation(
                    &config,
                    &clock,
                    &UserId::new(doctor),
                    doctor_online,
                    &messages,
                )
                .await?;
                render_transcript(&transcript, cli.format)?
            }
            Commands::Config => config.to_toml()?,
        };
        println!("{}", output);
        Ok(())
    }

    fn handle_doctors_command(config: &AppConfig, format: OutputFormat) -> Result<String> {
        let client = ChatClient::builder()
            .with_config(config.chat.clone())
            .with_scheduler(Rc::new(ManualScheduler::new()))
            .build()?;
        let doctors = client.list_counterparts(Role::Patient);
        info!("{} doctor(s) available", doctors.len());
        render_directory(&doctors, format)
    }
}

// ----------------------------------------------------------------------------
// Conversation Runner
// ----------------------------------------------------------------------------

/// Log in as the configured patient, talk to `doctor` and return the transcript
///
/// With `doctor_online` the doctor holds a live session of its own, so the
/// patient's messages are delivered without synthetic replies.
pub async fn run_conversation(
    config: &AppConfig,
    clock: &Clock,
    doctor: &UserId,
    doctor_online: bool,
    messages: &[String],
) -> Result<Vec<Message>> {
    let client = ChatClient::builder()
        .with_config(config.chat.clone())
        .with_scheduler(clock.scheduler())
        .build()?;

    let doctor_identity = client
        .list_counterparts(Role::Patient)
        .into_iter()
        .find(|identity| &identity.id == doctor)
        .ok_or_else(|| CliError::Config(format!("doctor {} is not available", doctor)))?;

    let chat = &config.chat;
    let connect_window = chat.latency.connect();
    let send_window = if chat.responder.enabled && !doctor_online {
        chat.latency.send() + Duration::from_millis(chat.responder.max_delay_ms)
    } else {
        chat.latency.send()
    };

    let patient = client.connect(Some(config.patient.identity()))?;
    let doctor_session = if doctor_online {
        Some(client.connect(Some(doctor_identity.clone()))?)
    } else {
        None
    };
    clock.settle(connect_window).await;

    let view = ChatView::new(patient.clone());
    let names = NameBook::new(&[patient.identity().clone(), doctor_identity]);
    view.subscribe(move |event| {
        if let SessionEvent::Message(message) = event {
            info!("{} -> {}", names.name_of(&message.sender_id), message.body);
        }
    })?;

    for body in messages {
        patient.send_message(doctor.clone(), body.as_str())?;
        clock.settle(send_window).await;
    }

    let transcript = view.conversation(doctor);
    patient.disconnect();
    if let Some(session) = doctor_session {
        session.disconnect();
    }
    Ok(transcript)
}

// ----------------------------------------------------------------------------
// Rendering
// ----------------------------------------------------------------------------

pub fn render_transcript(messages: &[Message], format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(messages)?),
        OutputFormat::Text => Ok(messages
            .iter()
            .map(|message| {
                format!(
                    "[{}] {} -> {}: {}",
                    message.timestamp.format("%H:%M:%S%.3f"),
                    message.sender_id,
                    message.receiver_id,
                    message.body
                )
            })
            .collect::<Vec<_>>()
            .join("\n")),
    }
}

pub fn render_directory(identities: &[Identity], format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(identities)?),
        OutputFormat::Text => Ok(identities
            .iter()
            .map(|identity| {
                format!(
                    "{:<10} {:<22} {}",
                    identity.id.as_str(),
                    identity.display_name,
                    identity.specialization.as_deref().unwrap_or("-")
                )
            })
            .collect::<Vec<_>>()
            .join("\n")),
    }
}

/// Display names for log lines
struct NameBook {
    entries: Vec<(UserId, String)>,
}

impl NameBook {
    fn new(identities: &[Identity]) -> Self {
        Self {
            entries: identities
                .iter()
                .map(|identity| (identity.id.clone(), identity.display_name.clone()))
                .collect(),
        }
    }

    fn name_of<'a>(&'a self, id: &'a UserId) -> &'a str {
        self.entries
            .iter()
            .find(|(known, _)| known == id)
            .map(|(_, name)| name.as_str())
            .unwrap_or_else(|| id.as_str())
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
