// Mnemo companion chat
// Main entry point for the mnemo binary

use clap::Parser;
use mnemo_engine::cli::{Cli, Command, SessionAction};
use mnemo_engine::config::Config;
use mnemo_engine::handlers::{
    handle_chat, handle_memories, handle_proxy, handle_send, handle_session_set,
    handle_session_set_key, handle_session_show, OutputFormat,
};
use mnemo_engine::telemetry::init_telemetry_with_level;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration (or use custom path if provided)
    let config = if let Some(config_path) = &cli.config {
        Config::load_from_path(config_path)?
    } else {
        Config::load_or_create()?
    };

    // --log wins over the configured level; RUST_LOG wins over both
    let log_level = cli.log.as_deref().unwrap_or(&config.core.log_level);
    init_telemetry_with_level(log_level);

    let version = env!("CARGO_PKG_VERSION");
    let commit = env!("GIT_COMMIT_HASH");
    let timestamp = env!("BUILD_TIMESTAMP");

    tracing::debug!("Mnemo v{} ({} - {})", version, commit, timestamp);

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    match cli.command {
        Command::Chat => {
            tracing::info!("Starting chat session");
            handle_chat(&config, format).await
        }

        Command::Send { text } => {
            if !handle_send(text, &config, format).await? {
                std::process::exit(1);
            }
            Ok(())
        }

        Command::Memories => handle_memories(&config, format).await,

        Command::Session { action } => match action {
            SessionAction::Show => handle_session_show(&config, format).await,
            SessionAction::Set { field, value } => {
                handle_session_set(field, value, &config, format).await
            }
            SessionAction::SetKey { service } => {
                handle_session_set_key(service.field(), &config, format).await
            }
        },

        Command::Proxy { bind } => {
            tracing::info!("Starting memory proxy");
            handle_proxy(&config, bind).await
        }
    }
}
