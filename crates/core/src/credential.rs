//! Ephemeral credentials for realtime sessions.
//!
//! The long-lived API key never leaves the server. Each voice session gets a
//! short-lived key minted just before the transport opens.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::fmt;
use tracing::{info, instrument};

#[derive(Clone, PartialEq, Eq)]
pub struct EphemeralKey(String);

impl EphemeralKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for EphemeralKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EphemeralKey(***)")
    }
}

/// Reads the key from a session response: `value` at the top level, or
/// `client_secret.value`. Empty strings do not count.
pub fn parse_ephemeral_key(body: &Value) -> Option<EphemeralKey> {
    let non_empty = |v: Option<&Value>| {
        v.and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(EphemeralKey::new)
    };
    non_empty(body.get("value"))
        .or_else(|| non_empty(body.get("client_secret").and_then(|c| c.get("value"))))
}

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("session request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("session endpoint returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("session response did not contain an ephemeral key")]
    MissingKey,
}

#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Creates a realtime session and returns the provider's raw response.
    async fn create_session(&self) -> Result<Value, CredentialError>;

    async fn fetch_key(&self) -> Result<EphemeralKey, CredentialError> {
        let body = self.create_session().await?;
        parse_ephemeral_key(&body).ok_or(CredentialError::MissingKey)
    }
}

/// Mints sessions against the OpenAI realtime sessions endpoint.
pub struct OpenAiSessionMinter {
    http: reqwest::Client,
    api_key: String,
    api_base: String,
    model: String,
    voice: String,
}

impl OpenAiSessionMinter {
    pub fn new(
        api_key: impl Into<String>,
        api_base: impl Into<String>,
        model: impl Into<String>,
        voice: impl Into<String>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.into(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            model: model.into(),
            voice: voice.into(),
        }
    }
}

#[async_trait]
impl CredentialProvider for OpenAiSessionMinter {
    #[instrument(skip(self), fields(model = %self.model))]
    async fn create_session(&self) -> Result<Value, CredentialError> {
        let response = self
            .http
            .post(format!("{}/realtime/sessions", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&json!({ "model": self.model, "voice": self.voice }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CredentialError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let body: Value = response.json().await?;
        info!("Minted realtime session");
        Ok(body)
    }
}
