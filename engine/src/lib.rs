//! Mnemo Engine Library
//!
//! Memory-augmented companion chat: the memory and completion gateways, the
//! session store and the turn orchestrator that ties them together. Used by
//! the `mnemo` binary and by integration tests.

/// Configuration management module
pub mod config;

/// Secret handling module
pub mod secrets;

/// Event bus for session observers
pub mod message_bus;

/// Completion Gateway
pub mod llm;

/// Memory Gateway and memory panel
pub mod memory;

/// Session Store
pub mod session;

/// Transcript and Turn Orchestrator
pub mod agent;

/// Telemetry and Observability
pub mod telemetry;

/// CLI interface module
pub mod cli;

/// Command handlers module
pub mod handlers;
