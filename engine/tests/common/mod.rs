//! In-process gateway fakes shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use mnemo_engine::llm::{CompletionError, CompletionGateway};
use mnemo_engine::memory::{MemoryError, MemoryGateway, MemoryHit};
use mnemo_engine::secrets::SecretString;
use mnemo_engine::session::{SessionConfig, SessionField};
use sdk::types::{ChatMessage, OwnerKind};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::Notify;

/// Session configuration with both keys set
pub fn usable_session() -> SessionConfig {
    let mut config = SessionConfig::default();
    config.set(SessionField::MemoryApiKey, "m0-test-key");
    config.set(SessionField::CompletionApiKey, "sk-test-key");
    config
}

/// One recorded memory write
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedWrite {
    pub owner: OwnerKind,
    pub id: String,
    pub messages: Vec<ChatMessage>,
}

/// Memory store partitioned by (owner, id).
///
/// `search` returns every memory of the partition whose text contains the
/// query, or all of them when `match_all` is set.
#[derive(Default)]
pub struct FakeMemory {
    store: Mutex<HashMap<(OwnerKind, String), Vec<String>>>,
    writes: Mutex<Vec<RecordedWrite>>,
    pub searches: AtomicUsize,
    pub fail_search_for: Mutex<Option<OwnerKind>>,
    pub fail_writes: std::sync::atomic::AtomicBool,
    pub match_all: std::sync::atomic::AtomicBool,
}

impl FakeMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, owner: OwnerKind, id: &str, text: &str) {
        self.store
            .lock()
            .unwrap()
            .entry((owner, id.to_string()))
            .or_default()
            .push(text.to_string());
    }

    pub fn writes(&self) -> Vec<RecordedWrite> {
        self.writes.lock().unwrap().clone()
    }
}

#[async_trait]
impl MemoryGateway for FakeMemory {
    async fn retrieve(
        &self,
        owner: OwnerKind,
        id: &str,
        _credential: &SecretString,
    ) -> Result<Vec<String>, MemoryError> {
        Ok(self
            .store
            .lock()
            .unwrap()
            .get(&(owner, id.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn search(
        &self,
        query: &str,
        owner: OwnerKind,
        id: &str,
        _credential: &SecretString,
    ) -> Result<Vec<MemoryHit>, MemoryError> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        if *self.fail_search_for.lock().unwrap() == Some(owner) {
            return Err(MemoryError::Upstream {
                status: 500,
                body: "search unavailable".to_string(),
            });
        }

        let match_all = self.match_all.load(Ordering::SeqCst);
        Ok(self
            .store
            .lock()
            .unwrap()
            .get(&(owner, id.to_string()))
            .map(|items| {
                items
                    .iter()
                    .filter(|text| match_all || text.contains(query))
                    .map(|text| MemoryHit {
                        text: text.clone(),
                        raw: serde_json::json!({ "memory": text }),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn write(
        &self,
        messages: &[ChatMessage],
        owner: OwnerKind,
        id: &str,
        _credential: &SecretString,
    ) -> Result<(), MemoryError> {
        self.writes.lock().unwrap().push(RecordedWrite {
            owner,
            id: id.to_string(),
            messages: messages.to_vec(),
        });
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(MemoryError::NetworkError("connection reset".to_string()));
        }

        let mut store = self.store.lock().unwrap();
        let partition = store.entry((owner, id.to_string())).or_default();
        partition.extend(messages.iter().map(|m| m.content.clone()));
        Ok(())
    }
}

/// Scripted outcome of the completion stub
#[derive(Debug, Clone)]
pub enum Script {
    Reply(ChatMessage),
    Fail(fn() -> CompletionError),
}

/// Completion stub with a call counter, a record of requests and an
/// optional gate that holds every call until `release` is called.
pub struct StubCompletion {
    script: Mutex<Script>,
    pub calls: AtomicUsize,
    requests: Mutex<Vec<Vec<ChatMessage>>>,
    gate: Option<Notify>,
    pub entered: Notify,
}

impl StubCompletion {
    pub fn replying(content: &str) -> Self {
        Self::new(Script::Reply(ChatMessage::assistant(content)))
    }

    pub fn failing(error: fn() -> CompletionError) -> Self {
        Self::new(Script::Fail(error))
    }

    pub fn new(script: Script) -> Self {
        Self {
            script: Mutex::new(script),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
            gate: None,
            entered: Notify::new(),
        }
    }

    /// Hold every call until `release`
    pub fn gated(mut self) -> Self {
        self.gate = Some(Notify::new());
        self
    }

    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.notify_one();
        }
    }

    pub fn set_script(&self, script: Script) {
        *self.script.lock().unwrap() = script;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<Vec<ChatMessage>> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl CompletionGateway for StubCompletion {
    fn name(&self) -> &str {
        "stub"
    }

    async fn complete(
        &self,
        _model: &str,
        messages: &[ChatMessage],
        _credential: &SecretString,
    ) -> Result<ChatMessage, CompletionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(messages.to_vec());
        self.entered.notify_one();

        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        let script = self.script.lock().unwrap().clone();
        match script {
            Script::Reply(message) => Ok(message),
            Script::Fail(error) => Err(error()),
        }
    }
}
