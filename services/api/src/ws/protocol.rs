//! Defines the WebSocket message protocol between the hosted widget page and the API server.

use serde::{Deserialize, Serialize};
use voicepulse_core::{
    conversation::Role,
    protocol::FrameMessage,
    widget::{SessionStatus, WidgetUpdate},
};

/// Text messages sent from the hosted page to the server.
///
/// Frame signals are relayed verbatim from the host page. Binary frames carry
/// microphone audio and are handled separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientMessage {
    Frame(FrameMessage),
    ToggleMute,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum PageControl {
    #[serde(rename = "widget.toggle_mute")]
    ToggleMute,
}

impl ClientMessage {
    /// Parses a text frame. Anything unrecognized yields `None`.
    pub fn parse(text: &str) -> Option<Self> {
        if let Some(frame) = FrameMessage::parse(text) {
            return Some(Self::Frame(frame));
        }
        match serde_json::from_str::<PageControl>(text) {
            Ok(PageControl::ToggleMute) => Some(Self::ToggleMute),
            Err(_) => None,
        }
    }
}

/// Messages sent from the server to the hosted page.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Sent once when the socket opens.
    Ready { agent_config: String, agent: String },
    Status { status: SessionStatus },
    Error { message: String },
    Responding { active: bool },
    AudioOutput { muted: bool, volume: f32 },
    Transcript { role: Role, text: String },
    AgentChanged { agent: String },
}

impl ServerMessage {
    /// The JSON counterpart of a widget update. Audio deltas travel as binary
    /// frames and have none.
    pub fn from_update(update: WidgetUpdate) -> Option<Self> {
        Some(match update {
            WidgetUpdate::Status(status) => Self::Status { status },
            WidgetUpdate::Error(message) => Self::Error { message },
            WidgetUpdate::Responding(active) => Self::Responding { active },
            WidgetUpdate::AudioOutput(output) => Self::AudioOutput {
                muted: output.muted,
                volume: output.volume,
            },
            WidgetUpdate::Transcript { role, text } => Self::Transcript { role, text },
            WidgetUpdate::AgentChanged(agent) => Self::AgentChanged { agent },
            WidgetUpdate::AudioDelta(_) => return None,
        })
    }
}
