//! Conversation turns
//!
//! The transcript, the completion request layout and the orchestrator that
//! runs one memory-augmented turn at a time.

pub mod orchestrator;
pub mod prompt;
pub mod transcript;

pub use orchestrator::{TurnError, TurnOrchestrator};
pub use transcript::{Content, Message, Transcript};
