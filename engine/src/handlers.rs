//! Command handlers for CLI operations
//!
//! - chat: interactive conversation loop
//! - send: run one turn
//! - memories: list both memory partitions
//! - session show / set / set-key: view and edit session settings
//! - proxy: run the memory proxy

use anyhow::{Context, Result};
use sdk::errors::UserFacing;
use sdk::types::Role;
use serde_json::json;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::agent::{Message, TurnOrchestrator};
use crate::config::Config;
use crate::llm::openrouter::OpenRouterGateway;
use crate::llm::CompletionGateway;
use crate::memory::{Mem0Gateway, MemoryGateway, MemoryPanel, PartitionedMemories};
use crate::message_bus::{Event, EventBus};
use crate::session::{SessionConfig, SessionField, SessionStore};

/// Output format for command results
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

/// Everything a command needs to run turns
pub struct Services {
    pub store: SessionStore,
    pub memory: Arc<dyn MemoryGateway>,
    pub completion: Arc<dyn CompletionGateway>,
    pub bus: Arc<EventBus>,
}

impl Services {
    /// Wire the HTTP gateways and the session store from `config`
    pub fn from_config(config: &Config) -> Self {
        let store = if config.core.use_keyring {
            SessionStore::with_keychain(config.session_path())
        } else {
            SessionStore::file_only(config.session_path())
        };
        Self {
            store,
            memory: Arc::new(Mem0Gateway::from_config(&config.memory)),
            completion: Arc::new(OpenRouterGateway::new(
                config.completion.base_url.clone(),
                Duration::from_secs(config.completion.timeout_secs),
            )),
            bus: Arc::new(EventBus::new()),
        }
    }

    pub fn orchestrator(&self, session: SessionConfig) -> TurnOrchestrator {
        TurnOrchestrator::new(
            session,
            Arc::clone(&self.memory),
            Arc::clone(&self.completion),
            Arc::clone(&self.bus),
        )
    }

    pub fn panel(&self) -> MemoryPanel {
        MemoryPanel::new(Arc::clone(&self.memory))
    }

    /// Persist session settings, carrying a persona rename into the greeting
    pub async fn save_session(
        &self,
        previous: &SessionConfig,
        next: SessionConfig,
    ) -> Result<SessionConfig> {
        let next = next.renamed_from(previous);
        self.store.save(&next)?;
        self.bus.publish(Event::ConfigSaved).await;
        Ok(next)
    }
}

/// Interactive conversation over stdin
pub async fn handle_chat(config: &Config, format: OutputFormat) -> Result<()> {
    let services = Services::from_config(config);
    let mut session = services.store.load()?;

    if !session.is_usable() {
        println!("API keys are required before chatting.");
        for field in session.missing_credentials() {
            let value = read_secret(field)?;
            if value.trim().is_empty() {
                anyhow::bail!("{} is required; set it with `mnemo session set-key`", field);
            }
            let mut next = session.clone();
            next.set(field, value.trim());
            session = services.save_session(&session, next).await?;
        }
    }

    let orchestrator = services.orchestrator(session.clone());
    let panel = services.panel();
    let name = session.ai_name.clone();

    if let Some(greeting) = orchestrator.transcript().messages().first() {
        print_message(&name, greeting, format)?;
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        if matches!(format, OutputFormat::Text) {
            print!("> ");
            std::io::stdout().flush()?;
        }

        let Some(line) = lines.next_line().await? else {
            break;
        };

        match line.trim() {
            "" => continue,
            "/quit" => break,
            "/reset" => {
                orchestrator.reset()?;
                if let Some(greeting) = orchestrator.transcript().messages().first() {
                    print_message(&name, greeting, format)?;
                }
            }
            "/memories" => {
                let memories = panel.refresh(&orchestrator.config()).await;
                print_memories(&memories, format)?;
            }
            input => {
                if matches!(format, OutputFormat::Text) {
                    print!("{}: …", name);
                    std::io::stdout().flush()?;
                }

                let result = orchestrator.send(input).await;
                if matches!(format, OutputFormat::Text) {
                    // Clear the placeholder line
                    print!("\r");
                }

                match result {
                    Ok(_) => {
                        if let Some(reply) = orchestrator.transcript().messages().last() {
                            print_message(&name, reply, format)?;
                        }
                    }
                    Err(e) => print_turn_error(&e, format)?,
                }
            }
        }
    }

    orchestrator.flush_writes().await;
    Ok(())
}

/// Run one turn and print the reply, or the error.
///
/// Returns whether the turn resolved. A failed turn is already reported.
pub async fn handle_send(text: String, config: &Config, format: OutputFormat) -> Result<bool> {
    let services = Services::from_config(config);
    let session = services.store.load()?;
    let orchestrator = services.orchestrator(session);

    let result = orchestrator.send(&text).await;
    // A one-shot process would otherwise exit before the memories are stored
    orchestrator.flush_writes().await;

    match result {
        Ok(reply) => {
            match format {
                OutputFormat::Text => println!("{}", reply.content),
                OutputFormat::Json => {
                    let output = json!({
                        "status": "resolved",
                        "reply": reply,
                    });
                    println!("{}", serde_json::to_string_pretty(&output)?);
                }
            }
            Ok(true)
        }
        Err(e) => {
            // Reported here, so the caller only sets the exit status
            print_turn_error(&e, format)?;
            Ok(false)
        }
    }
}

/// List both memory partitions
pub async fn handle_memories(config: &Config, format: OutputFormat) -> Result<()> {
    let services = Services::from_config(config);
    let session = services.store.load()?;

    if session.memory_api_key.is_empty() {
        anyhow::bail!(
            "{} is not set; run `mnemo session set-key mem0`",
            SessionField::MemoryApiKey
        );
    }

    let memories = services.panel().refresh(&session).await;
    print_memories(&memories, format)
}

/// Show session settings with API keys redacted
pub async fn handle_session_show(config: &Config, format: OutputFormat) -> Result<()> {
    let services = Services::from_config(config);
    let session = services.store.load()?;

    match format {
        OutputFormat::Text => {
            println!("Session settings ({}):", config.session_path().display());
            let key_store = if config.core.use_keyring {
                "OS keychain"
            } else {
                "session file"
            };
            println!("API keys kept in: {}", key_store);
            for field in SessionField::ALL {
                println!("  {:<18} {}", field.key(), display_value(&session, field));
            }
            let missing = session.missing_credentials();
            if !missing.is_empty() {
                println!();
                for field in missing {
                    println!("  ! {} is not set", field);
                }
            }
        }
        OutputFormat::Json => {
            let entries: serde_json::Map<String, serde_json::Value> = SessionField::ALL
                .iter()
                .map(|f| (f.key().to_string(), json!(display_value(&session, *f))))
                .collect();
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
    }

    Ok(())
}

/// Set one session field
pub async fn handle_session_set(
    field: SessionField,
    value: String,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    if field.is_secret() {
        anyhow::bail!("Use `mnemo session set-key` for API keys");
    }

    let services = Services::from_config(config);
    let previous = services.store.load()?;
    let mut next = previous.clone();
    next.set(field, value);
    let saved = services.save_session(&previous, next).await?;

    match format {
        OutputFormat::Text => println!("{} = {}", field, saved.get(field)),
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(&json!({ field.key(): saved.get(field) }))?
        ),
    }
    Ok(())
}

/// Prompt for an API key without echo and store it
pub async fn handle_session_set_key(
    field: SessionField,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let value = read_secret(field)?;

    let services = Services::from_config(config);
    let previous = services.store.load()?;
    let mut next = previous.clone();
    next.set(field, value.trim());
    services.save_session(&previous, next).await?;

    let status = if value.trim().is_empty() { "cleared" } else { "stored" };
    match format {
        OutputFormat::Text => println!("{} {}.", field, status),
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(&json!({ "field": field.key(), "status": status }))?
        ),
    }
    Ok(())
}

/// Run the memory proxy until Ctrl-C
pub async fn handle_proxy(config: &Config, bind: Option<String>) -> Result<()> {
    let bind = bind.unwrap_or_else(|| config.proxy.bind.clone());

    memory_proxy::serve(&bind, &config.proxy.upstream, async {
        tokio::signal::ctrl_c().await.ok();
    })
    .await
    .context("Memory proxy failed")
}

fn read_secret(field: SessionField) -> Result<String> {
    let prompt = format!("{}: ", field);
    rpassword::read_password_from_tty(Some(prompt.as_str()))
        .with_context(|| format!("Failed to read {}", field))
}

fn display_value(session: &SessionConfig, field: SessionField) -> String {
    let value = session.get(field);
    if field.is_secret() {
        if value.is_empty() {
            "(not set)".to_string()
        } else {
            "[REDACTED]".to_string()
        }
    } else {
        value.to_string()
    }
}

fn print_message(name: &str, message: &Message, format: OutputFormat) -> Result<()> {
    let text = message.as_text().unwrap_or("…");
    match format {
        OutputFormat::Text => {
            let speaker = match message.role {
                Role::Assistant => name,
                Role::User => "you",
                Role::System => "system",
            };
            println!("{}: {}", speaker, text);
        }
        OutputFormat::Json => {
            println!(
                "{}",
                json!({ "role": message.role, "content": text })
            );
        }
    }
    Ok(())
}

fn print_turn_error(error: &crate::agent::TurnError, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            println!("✗ {}", error.user_hint());
            tracing::debug!("Turn error detail: {}", error);
        }
        OutputFormat::Json => {
            let output = json!({
                "status": "failed",
                "error": error.to_string(),
                "recoverable": error.is_recoverable(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

fn print_memories(memories: &PartitionedMemories, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            for (label, items) in [
                ("User memories", &memories.user),
                ("Companion memories", &memories.agent),
            ] {
                println!("{} ({}):", label, items.len());
                if items.is_empty() {
                    println!("  (none)");
                }
                for item in items {
                    println!("  - {}", item);
                }
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "user": memories.user,
                "agent": memories.agent,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}
