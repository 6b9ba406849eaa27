//! Key-value substrates for the session store
//!
//! A backend persists a flat map of string keys to string values and must
//! replace the whole map in one step on write.
//!
//! - [`TomlFileBackend`]: flat TOML table on disk
//! - [`KeyringBackend`]: a fixed set of keys in the OS keychain
//! - [`SplitBackend`]: routes secret keys to one backend and the rest to another
//! - [`MemoryBackend`]: in-process map

use keyring::Entry;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Errors raised by a key-value backend
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse session file: {0}")]
    Parse(String),

    #[error("Failed to serialize session: {0}")]
    Serialize(String),

    #[error("Keychain error: {0}")]
    Keyring(String),

    #[error("Session storage lock poisoned")]
    Poisoned,
}

/// Persistent string-to-string storage
pub trait KeyValueBackend: Send + Sync {
    /// Read every stored entry. A missing store is an empty map.
    fn read_all(&self) -> Result<BTreeMap<String, String>, StoreError>;

    /// Replace the stored entries with `entries`, all or nothing.
    fn write_all(&self, entries: &BTreeMap<String, String>) -> Result<(), StoreError>;
}

/// Flat TOML table on disk, written via temp file + fsync + rename
pub struct TomlFileBackend {
    path: PathBuf,
}

impl TomlFileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "session.toml".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl KeyValueBackend for TomlFileBackend {
    fn read_all(&self) -> Result<BTreeMap<String, String>, StoreError> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }

        let content = fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }

        toml::from_str(&content).map_err(|e| StoreError::Parse(e.to_string()))
    }

    fn write_all(&self, entries: &BTreeMap<String, String>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content =
            toml::to_string_pretty(entries).map_err(|e| StoreError::Serialize(e.to_string()))?;

        let temp_path = self.temp_path();
        let result =
            write_private(&temp_path, content.as_bytes()).and_then(|_| fs::rename(&temp_path, &self.path));

        if let Err(e) = result {
            // Never leave a partial copy behind
            if temp_path.exists() {
                let _ = fs::remove_file(&temp_path);
            }
            return Err(e.into());
        }
        Ok(())
    }
}

/// Create `path` readable by the owner only and fill it with `content`
fn write_private(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path)?;

    // A stale temp file keeps its old mode, so tighten it again
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(fs::Permissions::from_mode(0o600))?;
    }

    file.write_all(content)?;
    file.sync_all()
}

/// A fixed set of keys stored as OS keychain entries under one service name
///
/// An empty value deletes the entry. Reads skip keys with no entry.
pub struct KeyringBackend {
    service: String,
    keys: Vec<String>,
}

impl KeyringBackend {
    pub fn new<K: Into<String>>(service: impl Into<String>, keys: impl IntoIterator<Item = K>) -> Self {
        Self {
            service: service.into(),
            keys: keys.into_iter().map(Into::into).collect(),
        }
    }

    fn entry(&self, key: &str) -> Result<Entry, StoreError> {
        Entry::new(&self.service, key)
            .map_err(|e| StoreError::Keyring(format!("Failed to create keyring entry: {}", e)))
    }

    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match self.entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(StoreError::Keyring(format!(
                "Failed to retrieve '{}': {}",
                key, e
            ))),
        }
    }

    fn put(&self, key: &str, value: Option<&str>) -> Result<(), StoreError> {
        let entry = self.entry(key)?;
        match value.filter(|v| !v.is_empty()) {
            Some(value) => entry
                .set_password(value)
                .map_err(|e| StoreError::Keyring(format!("Failed to store '{}': {}", key, e))),
            None => match entry.delete_password() {
                Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
                Err(e) => Err(StoreError::Keyring(format!(
                    "Failed to delete '{}': {}",
                    key, e
                ))),
            },
        }
    }
}

impl KeyValueBackend for KeyringBackend {
    fn read_all(&self) -> Result<BTreeMap<String, String>, StoreError> {
        let mut entries = BTreeMap::new();
        for key in &self.keys {
            if let Some(value) = self.get(key)? {
                entries.insert(key.clone(), value);
            }
        }
        Ok(entries)
    }

    fn write_all(&self, entries: &BTreeMap<String, String>) -> Result<(), StoreError> {
        let previous = self.read_all()?;

        for (written, key) in self.keys.iter().enumerate() {
            if let Err(e) = self.put(key, entries.get(key).map(String::as_str)) {
                // Put back whatever was already overwritten
                for key in &self.keys[..written] {
                    if let Err(restore) = self.put(key, previous.get(key).map(String::as_str)) {
                        warn!("Could not restore keychain entry '{}': {}", key, restore);
                    }
                }
                return Err(e);
            }
        }

        debug!("Stored {} keychain entries", self.keys.len());
        Ok(())
    }
}

/// Secret keys go to `secrets`, everything else to `plain`
///
/// A write lands in `secrets` first. If the `plain` write then fails, the
/// previous secrets are put back so the two halves never disagree. On read,
/// a secret key found in `plain` (files written before the split) is used
/// only when `secrets` has no value for it, and the next write drops it
/// from `plain`.
pub struct SplitBackend {
    plain: Arc<dyn KeyValueBackend>,
    secrets: Arc<dyn KeyValueBackend>,
    secret_keys: BTreeSet<String>,
}

impl SplitBackend {
    pub fn new<K: Into<String>>(
        plain: Arc<dyn KeyValueBackend>,
        secrets: Arc<dyn KeyValueBackend>,
        secret_keys: impl IntoIterator<Item = K>,
    ) -> Self {
        Self {
            plain,
            secrets,
            secret_keys: secret_keys.into_iter().map(Into::into).collect(),
        }
    }
}

impl KeyValueBackend for SplitBackend {
    fn read_all(&self) -> Result<BTreeMap<String, String>, StoreError> {
        let mut entries = self.plain.read_all()?;
        for (key, value) in self.secrets.read_all()? {
            if self.secret_keys.contains(&key) {
                entries.insert(key, value);
            }
        }
        Ok(entries)
    }

    fn write_all(&self, entries: &BTreeMap<String, String>) -> Result<(), StoreError> {
        let (secret, plain): (BTreeMap<_, _>, BTreeMap<_, _>) = entries
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .partition(|(k, _)| self.secret_keys.contains(k));

        let previous = self.secrets.read_all()?;
        self.secrets.write_all(&secret)?;

        if let Err(e) = self.plain.write_all(&plain) {
            if let Err(restore) = self.secrets.write_all(&previous) {
                warn!("Could not restore secrets after a failed save: {}", restore);
            }
            return Err(e);
        }
        Ok(())
    }
}

/// In-process backend for tests and throwaway sessions
#[derive(Default)]
pub struct MemoryBackend {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from pre-existing entries
    pub fn with_entries<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            entries: Mutex::new(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
        }
    }
}

impl KeyValueBackend for MemoryBackend {
    fn read_all(&self) -> Result<BTreeMap<String, String>, StoreError> {
        Ok(self.entries.lock().map_err(|_| StoreError::Poisoned)?.clone())
    }

    fn write_all(&self, entries: &BTreeMap<String, String>) -> Result<(), StoreError> {
        *self.entries.lock().map_err(|_| StoreError::Poisoned)? = entries.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_reads_empty() {
        let dir = TempDir::new().unwrap();
        let backend = TomlFileBackend::new(dir.path().join("session.toml"));
        assert!(backend.read_all().unwrap().is_empty());
    }

    #[test]
    fn test_file_write_replaces_everything() {
        let dir = TempDir::new().unwrap();
        let backend = TomlFileBackend::new(dir.path().join("nested").join("session.toml"));

        let mut first = BTreeMap::new();
        first.insert("userId".to_string(), "alice".to_string());
        first.insert("model".to_string(), "m1".to_string());
        backend.write_all(&first).unwrap();

        let mut second = BTreeMap::new();
        second.insert("userId".to_string(), "bob".to_string());
        backend.write_all(&second).unwrap();

        assert_eq!(backend.read_all().unwrap(), second);
        assert!(!backend.temp_path().exists());
    }

    #[test]
    fn test_non_string_values_are_parse_errors() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.toml");
        fs::write(&path, "userId = 42\n").unwrap();

        let backend = TomlFileBackend::new(&path);
        assert!(matches!(backend.read_all(), Err(StoreError::Parse(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let backend = TomlFileBackend::new(dir.path().join("session.toml"));
        backend.write_all(&BTreeMap::new()).unwrap();

        let mode = fs::metadata(backend.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_failed_write_removes_temp_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.toml");
        // A non-empty directory in the way makes the final rename fail
        fs::create_dir_all(path.join("occupied")).unwrap();

        let backend = TomlFileBackend::new(&path);
        let mut entries = BTreeMap::new();
        entries.insert("mem0ApiKey".to_string(), "m0-secret".to_string());

        assert!(matches!(backend.write_all(&entries), Err(StoreError::Io(_))));
        assert!(!backend.temp_path().exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_stale_temp_file_is_tightened() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let backend = TomlFileBackend::new(dir.path().join("session.toml"));
        fs::write(backend.temp_path(), "stale").unwrap();
        fs::set_permissions(backend.temp_path(), fs::Permissions::from_mode(0o644)).unwrap();

        backend.write_all(&BTreeMap::new()).unwrap();

        let mode = fs::metadata(backend.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    /// Reads fine, refuses every write
    struct ReadOnlyBackend(BTreeMap<String, String>);

    impl KeyValueBackend for ReadOnlyBackend {
        fn read_all(&self) -> Result<BTreeMap<String, String>, StoreError> {
            Ok(self.0.clone())
        }

        fn write_all(&self, _: &BTreeMap<String, String>) -> Result<(), StoreError> {
            Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "read-only",
            )))
        }
    }

    fn entries(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_split_routes_secret_keys() {
        let plain = Arc::new(MemoryBackend::new());
        let secrets = Arc::new(MemoryBackend::new());
        let backend = SplitBackend::new(
            Arc::clone(&plain) as Arc<dyn KeyValueBackend>,
            Arc::clone(&secrets) as Arc<dyn KeyValueBackend>,
            ["mem0ApiKey"],
        );

        let all = entries(&[("userId", "alice"), ("mem0ApiKey", "m0-secret")]);
        backend.write_all(&all).unwrap();

        assert_eq!(plain.read_all().unwrap(), entries(&[("userId", "alice")]));
        assert_eq!(secrets.read_all().unwrap(), entries(&[("mem0ApiKey", "m0-secret")]));
        assert_eq!(backend.read_all().unwrap(), all);
    }

    #[test]
    fn test_split_migrates_plaintext_secrets() {
        let plain = Arc::new(MemoryBackend::with_entries([
            ("userId", "alice"),
            ("mem0ApiKey", "m0-old-plaintext"),
        ]));
        let backend = SplitBackend::new(
            Arc::clone(&plain) as Arc<dyn KeyValueBackend>,
            Arc::new(MemoryBackend::new()),
            ["mem0ApiKey"],
        );

        let loaded = backend.read_all().unwrap();
        assert_eq!(loaded.get("mem0ApiKey").map(String::as_str), Some("m0-old-plaintext"));

        backend.write_all(&loaded).unwrap();
        assert!(!plain.read_all().unwrap().contains_key("mem0ApiKey"));
        assert_eq!(backend.read_all().unwrap(), loaded);
    }

    #[test]
    fn test_split_restores_secrets_when_plain_write_fails() {
        let secrets = Arc::new(MemoryBackend::with_entries([("mem0ApiKey", "m0-before")]));
        let backend = SplitBackend::new(
            Arc::new(ReadOnlyBackend(entries(&[("userId", "alice")]))),
            Arc::clone(&secrets) as Arc<dyn KeyValueBackend>,
            ["mem0ApiKey"],
        );

        let result = backend.write_all(&entries(&[("userId", "bob"), ("mem0ApiKey", "m0-after")]));

        assert!(result.is_err());
        assert_eq!(secrets.read_all().unwrap(), entries(&[("mem0ApiKey", "m0-before")]));
    }

    #[test]
    fn test_keyring_round_trip() {
        if std::env::var("CI").is_ok() {
            return; // Skip: no keyring in CI
        }
        let backend = KeyringBackend::new("mnemo-test", ["test_session_key_4821"]);

        // Keychain may be unavailable on headless machines
        if backend.write_all(&entries(&[("test_session_key_4821", "m0-value")])).is_err() {
            return;
        }
        assert_eq!(
            backend.read_all().unwrap(),
            entries(&[("test_session_key_4821", "m0-value")])
        );

        // An empty value removes the entry
        backend.write_all(&entries(&[("test_session_key_4821", "")])).unwrap();
        assert!(backend.read_all().unwrap().is_empty());
    }

    #[test]
    fn test_memory_backend_round_trip() {
        let backend = MemoryBackend::with_entries([("agentId", "haruka")]);
        assert_eq!(
            backend.read_all().unwrap().get("agentId").map(String::as_str),
            Some("haruka")
        );

        backend.write_all(&BTreeMap::new()).unwrap();
        assert!(backend.read_all().unwrap().is_empty());
    }
}
