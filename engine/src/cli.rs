//! CLI interface for Mnemo
//!
//! Commands and global flags, defined with clap's derive API.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::session::SessionField;

/// Mnemo companion chat
///
/// Chat with a persona that remembers: every turn is stored in and enriched
/// from a remote memory service, for both you and the persona.
#[derive(Parser, Debug)]
#[command(name = "mnemo")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log: Option<String>,

    /// Specify alternate configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start an interactive conversation
    Chat,

    /// Send a single message and print the reply
    Send {
        /// The message to send
        text: String,
    },

    /// List stored memories for the user and the persona
    Memories,

    /// View and edit session settings
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },

    /// Run the memory proxy server
    Proxy {
        /// Bind address, overrides [proxy].bind
        #[arg(long, value_name = "ADDR")]
        bind: Option<String>,
    },
}

/// Session settings actions
#[derive(Subcommand, Debug)]
pub enum SessionAction {
    /// Show all settings (API keys redacted)
    Show,

    /// Set a setting, e.g. `session set aiName "Ei"`
    Set {
        /// Field key (aiName, systemPrompt, initialMessage, model, userId, agentId)
        field: SessionField,

        /// New value; an empty string clears identifiers
        value: String,
    },

    /// Prompt for an API key without echoing it
    SetKey {
        /// Which service the key is for
        service: KeyService,
    },
}

/// Services that take an API key
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyService {
    /// Memory service key
    Mem0,
    /// Completion service key
    Openrouter,
}

impl KeyService {
    pub fn field(&self) -> SessionField {
        match self {
            KeyService::Mem0 => SessionField::MemoryApiKey,
            KeyService::Openrouter => SessionField::CompletionApiKey,
        }
    }
}
