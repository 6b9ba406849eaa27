//! Mnemo SDK
//!
//! Shared library providing the wire types and error types used by both the
//! engine and the memory proxy.

/// Error types and handling
pub mod errors;

/// Owner partitions and chat wire messages
pub mod types;

// Re-export commonly used types
pub use errors::{EngineError, UserFacing};
pub use types::{ChatMessage, OwnerKind, Role};
