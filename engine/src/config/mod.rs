//! Configuration management
//!
//! This module handles loading, validation, and management of the Mnemo
//! application configuration. Configuration is stored in TOML format at
//! ~/.mnemo/config.toml.
//!
//! # Configuration Sections
//!
//! - **core**: Log level, data directory
//! - **memory**: Memory service endpoint and request shape
//! - **completion**: Completion service endpoint
//! - **proxy**: Bind address and upstream of the memory proxy
//!
//! The per-user session settings (persona, prompts, identifiers, API keys)
//! are not part of this file. They live in the session store under
//! `data_dir`, see [`crate::session`].
//!
//! # Examples
//!
//! ```no_run
//! use mnemo_engine::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load_or_create()?;
//! println!("Memory service: {}", config.memory.base_url);
//! # Ok(())
//! # }
//! ```

use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Core settings
    #[serde(default)]
    pub core: CoreConfig,

    /// Memory service settings
    #[serde(default)]
    pub memory: MemoryServiceConfig,

    /// Completion service settings
    #[serde(default)]
    pub completion: CompletionServiceConfig,

    /// Memory proxy settings
    #[serde(default)]
    pub proxy: ProxyConfig,
}

/// Core configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Data directory path (supports ~ expansion)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Keep API keys in the OS keychain. Turn off on headless machines, the
    /// keys then go to the session file (mode 0600).
    #[serde(default = "default_use_keyring")]
    pub use_keyring: bool,
}

/// Memory service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryServiceConfig {
    /// Base URL of the memory service (without the /v1 suffix)
    #[serde(default = "default_memory_base_url")]
    pub base_url: String,

    /// Authorization scheme placed before the API key
    #[serde(default = "default_auth_scheme")]
    pub auth_scheme: String,

    /// Response format requested from the memory service
    #[serde(default = "default_output_format")]
    pub output_format: String,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Completion service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionServiceConfig {
    /// Base URL of the OpenAI-compatible API
    #[serde(default = "default_completion_base_url")]
    pub base_url: String,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    // Note: API key lives in the session store, not in config
}

/// Memory proxy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Socket address the proxy binds to
    #[serde(default = "default_proxy_bind")]
    pub bind: String,

    /// Upstream memory service the proxy forwards to
    #[serde(default = "default_memory_base_url")]
    pub upstream: String,
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("~/.mnemo")
}

fn default_use_keyring() -> bool {
    true
}

fn default_memory_base_url() -> String {
    "https://api.mem0.ai".to_string()
}

fn default_auth_scheme() -> String {
    "Token".to_string()
}

fn default_output_format() -> String {
    "v1.1".to_string()
}

fn default_completion_base_url() -> String {
    "https://openrouter.ai/api/v1".to_string()
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_proxy_bind() -> String {
    "127.0.0.1:3000".to_string()
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            data_dir: default_data_dir(),
            use_keyring: default_use_keyring(),
        }
    }
}

impl Default for MemoryServiceConfig {
    fn default() -> Self {
        Self {
            base_url: default_memory_base_url(),
            auth_scheme: default_auth_scheme(),
            output_format: default_output_format(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for CompletionServiceConfig {
    fn default() -> Self {
        Self {
            base_url: default_completion_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            bind: default_proxy_bind(),
            upstream: default_memory_base_url(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            core: CoreConfig::default(),
            memory: MemoryServiceConfig::default(),
            completion: CompletionServiceConfig::default(),
            proxy: ProxyConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the default location (~/.mnemo/config.toml)
    ///
    /// If the configuration file doesn't exist, creates a default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or written, TOML parsing
    /// fails, or validation fails.
    pub fn load_or_create() -> Result<Self, EngineError> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load_from_path(&config_path)
        } else {
            Self::create_default(&config_path)
        }
    }

    /// Load configuration from a specific path
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    pub fn load_from_path(path: &Path) -> Result<Self, EngineError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("Failed to read config file: {}", e)))?;

        let mut config: Config = toml::from_str(&contents)
            .map_err(|e| EngineError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate_and_process()?;

        Ok(config)
    }

    /// Create default configuration and save to path
    fn create_default(path: &Path) -> Result<Self, EngineError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                EngineError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let toml_string = toml::to_string_pretty(&Self::default())
            .map_err(|e| EngineError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| EngineError::Config(format!("Failed to write config file: {}", e)))?;

        let mut config = Self::default();
        config.validate_and_process()?;

        Ok(config)
    }

    /// Get the default configuration file path (~/.mnemo/config.toml)
    fn default_config_path() -> Result<PathBuf, EngineError> {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(".mnemo").join("config.toml"))
    }

    /// Path of the persisted session settings
    pub fn session_path(&self) -> PathBuf {
        self.core.data_dir.join("session.toml")
    }

    /// Validate and process configuration
    ///
    /// This method:
    /// - Validates the log level and service URLs
    /// - Expands ~ in the data directory
    /// - Creates the data directory if it doesn't exist
    fn validate_and_process(&mut self) -> Result<(), EngineError> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.core.log_level.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.core.log_level,
                valid_log_levels.join(", ")
            )));
        }

        for (name, url) in [
            ("memory.base_url", &self.memory.base_url),
            ("completion.base_url", &self.completion.base_url),
            ("proxy.upstream", &self.proxy.upstream),
        ] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(EngineError::Config(format!(
                    "{} must be an http(s) URL, got '{}'",
                    name, url
                )));
            }
        }

        if self.memory.auth_scheme.trim().is_empty() {
            return Err(EngineError::Config(
                "memory.auth_scheme must not be empty".to_string(),
            ));
        }

        self.core.data_dir = expand_path(&self.core.data_dir)?;

        if !self.core.data_dir.exists() {
            fs::create_dir_all(&self.core.data_dir).map_err(|e| {
                EngineError::Config(format!("Failed to create data directory: {}", e))
            })?;
        }

        Ok(())
    }
}

/// Expand ~ in path to user's home directory
fn expand_path(path: &Path) -> Result<PathBuf, EngineError> {
    let path_str = path
        .to_str()
        .ok_or_else(|| EngineError::Config("Invalid UTF-8 in path".to_string()))?;

    if let Some(rest) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(rest))
    } else if path_str == "~" {
        dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))
    } else {
        Ok(path.to_path_buf())
    }
}
