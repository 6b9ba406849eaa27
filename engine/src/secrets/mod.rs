//! Credential handling
//!
//! API keys travel through the engine as [`SecretString`]. Anything that
//! echoes remote payloads or headers into a log line goes through [`scrub`]
//! first.

pub mod string;

pub use string::SecretString;

use regex::Regex;
use std::sync::OnceLock;

/// Regex patterns for detecting common secret formats.
/// These are compiled once and reused for performance.
static SECRET_PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();

/// Initializes and returns the secret detection patterns.
///
/// Patterns match:
/// - OpenAI / OpenRouter API keys: sk-... (including sk-or-v1-...)
/// - mem0 API keys: m0-...
/// - Authorization header values: Bearer ... and Token ...
fn get_secret_patterns() -> &'static Vec<Regex> {
    SECRET_PATTERNS.get_or_init(|| {
        let sources = [
            r"sk-[a-zA-Z0-9\-_]{20,}",
            r"m0-[a-zA-Z0-9\-_]{20,}",
            r"Bearer\s+[^\s]{8,}",
            r"Token\s+[^\s]{8,}",
        ];
        sources.iter().filter_map(|p| Regex::new(p).ok()).collect()
    })
}

/// Scrubs secrets from text by replacing them with [REDACTED].
///
/// # Examples
/// ```
/// use mnemo_engine::secrets::scrub;
///
/// let scrubbed = scrub("key: sk-or-v1-1234567890abcdefghij");
/// assert_eq!(scrubbed, "key: [REDACTED]");
/// ```
pub fn scrub(text: &str) -> String {
    let mut result = text.to_string();

    for pattern in get_secret_patterns() {
        result = pattern.replace_all(&result, "[REDACTED]").to_string();
    }

    result
}
