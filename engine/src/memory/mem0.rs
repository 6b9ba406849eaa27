//! mem0 Memory Gateway
//!
//! HTTP implementation of [`MemoryGateway`] against the mem0 REST API:
//!
//! - `GET  /v1/memories/?user_id|agent_id=…&output_format=…`
//! - `POST /v1/memories/search/` with `{query, user_id|agent_id}`
//! - `POST /v1/memories/` with `{messages, user_id|agent_id, output_format}`
//!
//! The API answers either with a bare array or with `{results: [...]}`
//! depending on the output format; both shapes are accepted.

use async_trait::async_trait;
use reqwest::{Client, Response};
use sdk::types::{ChatMessage, OwnerKind};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use super::{MemoryError, MemoryGateway, MemoryHit, Result};
use crate::config::MemoryServiceConfig;
use crate::secrets::{scrub, SecretString};

pub struct Mem0Gateway {
    base_url: String,
    auth_scheme: String,
    output_format: String,
    client: Client,
}

impl Mem0Gateway {
    /// Create a gateway with the default `Token` scheme and `v1.1` format
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::from_config(&MemoryServiceConfig {
            base_url: base_url.into(),
            ..MemoryServiceConfig::default()
        })
    }

    /// Create a gateway from the `[memory]` configuration section
    pub fn from_config(config: &MemoryServiceConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            auth_scheme: config.auth_scheme.clone(),
            output_format: config.output_format.clone(),
            client: Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    fn authorization(&self, credential: &SecretString) -> String {
        format!("{} {}", self.auth_scheme, credential.unsecure())
    }

    /// Fail fast before touching the network
    fn ensure_usable(owner: OwnerKind, id: &str, credential: &SecretString) -> Result<()> {
        if credential.is_empty() {
            return Err(MemoryError::AuthenticationFailed(
                "memory service credential is missing".to_string(),
            ));
        }
        if id.trim().is_empty() {
            return Err(MemoryError::MissingIdentity(owner));
        }
        Ok(())
    }

    /// Map non-2xx statuses onto the error taxonomy
    async fn check_status(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = scrub(&response.text().await.unwrap_or_default());
        match status.as_u16() {
            401 | 403 => Err(MemoryError::AuthenticationFailed(text)),
            code => Err(MemoryError::Upstream {
                status: code,
                body: text,
            }),
        }
    }

    async fn read_json(response: Response) -> Result<Value> {
        response
            .json()
            .await
            .map_err(|e| MemoryError::Malformed(e.to_string()))
    }
}

/// The result items of a memory payload, whichever shape it came in
fn result_items(data: &Value) -> &[Value] {
    match data {
        Value::Array(items) => items,
        Value::Object(map) => map
            .get("results")
            .and_then(|r| r.as_array())
            .map(Vec::as_slice)
            .unwrap_or_default(),
        _ => &[],
    }
}

/// Memory text of a result item, if it has one
fn memory_text(item: &Value) -> Option<&str> {
    item.get("memory").and_then(|m| m.as_str())
}

#[async_trait]
impl MemoryGateway for Mem0Gateway {
    async fn retrieve(
        &self,
        owner: OwnerKind,
        id: &str,
        credential: &SecretString,
    ) -> Result<Vec<String>> {
        Self::ensure_usable(owner, id, credential)?;

        let url = format!("{}/v1/memories/", self.base_url);
        debug!("Retrieving {} memories for '{}'", owner, id);

        let response = self
            .client
            .get(&url)
            .header("Authorization", self.authorization(credential))
            .query(&[
                (owner.id_field(), id),
                ("output_format", self.output_format.as_str()),
            ])
            .send()
            .await
            .map_err(|e| MemoryError::NetworkError(e.to_string()))?;

        let data = Self::read_json(Self::check_status(response).await?).await?;

        Ok(result_items(&data)
            .iter()
            .filter_map(memory_text)
            .map(str::to_string)
            .collect())
    }

    async fn search(
        &self,
        query: &str,
        owner: OwnerKind,
        id: &str,
        credential: &SecretString,
    ) -> Result<Vec<MemoryHit>> {
        Self::ensure_usable(owner, id, credential)?;

        let url = format!("{}/v1/memories/search/", self.base_url);
        let mut body = json!({ "query": query });
        body[owner.id_field()] = json!(id);

        let response = self
            .client
            .post(&url)
            .header("Authorization", self.authorization(credential))
            .json(&body)
            .send()
            .await
            .map_err(|e| MemoryError::NetworkError(e.to_string()))?;

        let data = Self::read_json(Self::check_status(response).await?).await?;

        let hits: Vec<MemoryHit> = result_items(&data)
            .iter()
            .filter_map(|item| {
                memory_text(item).map(|text| MemoryHit {
                    text: text.to_string(),
                    raw: item.clone(),
                })
            })
            .collect();

        debug!("Search found {} {} memories", hits.len(), owner);
        Ok(hits)
    }

    async fn write(
        &self,
        messages: &[ChatMessage],
        owner: OwnerKind,
        id: &str,
        credential: &SecretString,
    ) -> Result<()> {
        Self::ensure_usable(owner, id, credential)?;

        let url = format!("{}/v1/memories/", self.base_url);
        let mut body = json!({
            "messages": messages,
            "output_format": self.output_format,
        });
        body[owner.id_field()] = json!(id);

        let response = self
            .client
            .post(&url)
            .header("Authorization", self.authorization(credential))
            .json(&body)
            .send()
            .await
            .map_err(|e| MemoryError::NetworkError(e.to_string()))?;

        Self::check_status(response).await?;
        Ok(())
    }
}
