//! Cross-frame signaling between the host-page embed and the hosted widget.
//!
//! The two frames can only exchange structured messages. The contract is
//! fire-and-forget: there is no acknowledgment, and anything that is not a
//! recognized message is dropped without error.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const DEFAULT_AGENT_CONFIG: &str = "chatSupervisor";
pub const DEFAULT_TITLE: &str = "Voice Assistant";

/// Messages the embed script posts into the hosted widget frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum FrameMessage {
    /// Begin a voice session.
    #[serde(rename = "voicepulse.connect")]
    Connect,
    /// End the current voice session.
    #[serde(rename = "voicepulse.disconnect")]
    Disconnect,
}

impl FrameMessage {
    /// Parses an inbound message, returning `None` for anything that is not
    /// on the whitelist (host pages post unrelated traffic all the time).
    pub fn parse(raw: &str) -> Option<Self> {
        let value: serde_json::Value = serde_json::from_str(raw).ok()?;
        Self::from_value(&value)
    }

    pub fn from_value(value: &serde_json::Value) -> Option<Self> {
        match value.get("type")?.as_str()? {
            "voicepulse.connect" => Some(Self::Connect),
            "voicepulse.disconnect" => Some(Self::Disconnect),
            _ => None,
        }
    }

    pub fn to_json(self) -> String {
        match self {
            Self::Connect => r#"{"type":"voicepulse.connect"}"#.to_string(),
            Self::Disconnect => r#"{"type":"voicepulse.disconnect"}"#.to_string(),
        }
    }
}

/// Configuration carried in the hosted widget URL query string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WidgetQuery {
    pub agent_config: String,
    pub title: String,
    pub agent_name: Option<String>,
}

impl WidgetQuery {
    pub fn from_params(params: &HashMap<String, String>) -> Self {
        let non_empty = |key: &str| {
            params
                .get(key)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        Self {
            agent_config: non_empty("agentConfig")
                .unwrap_or_else(|| DEFAULT_AGENT_CONFIG.to_string()),
            title: non_empty("title").unwrap_or_else(|| DEFAULT_TITLE.to_string()),
            agent_name: non_empty("agentName"),
        }
    }
}
