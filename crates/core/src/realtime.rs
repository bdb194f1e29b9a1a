//! Realtime voice transport.
//!
//! A connection carries microphone audio up and assistant audio, transcripts
//! and tool calls down. Inbound provider events are reduced to the handful of
//! [`TransportEvent`]s the widget acts on; everything else is dropped.

use crate::{conversation::PendingToolCall, credential::EphemeralKey, tools::ToolDescriptor};
use async_openai::types::realtime::{
    AudioFormat, AudioTranscription, ClientEvent, ConversationItemCreateEvent,
    InputAudioBufferAppendEvent, Item, ItemContent, ItemContentType, ItemRole, ItemType,
    RealtimeVoice, ResponseCreateEvent, ServerEvent, SessionResource, SessionUpdateEvent,
    ToolChoice, ToolDefinition, TurnDetection,
};
use async_trait::async_trait;
use base64::Engine;
use futures_util::{SinkExt, StreamExt, stream::SplitSink};
use serde::Deserialize;
use serde_json::Value;
use tokio::{net::TcpStream, sync::mpsc, task::JoinHandle};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{client::IntoClientRequest, http::HeaderValue, protocol::Message as WsMessage},
};
use tracing::{debug, info, warn};

pub const DEFAULT_REALTIME_URL: &str = "wss://api.openai.com/v1/realtime";

#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// The model started generating a response.
    ResponseStarted,
    /// Assistant audio playback started.
    AudioStarted,
    /// A chunk of assistant audio (base64 PCM16).
    AudioDelta(String),
    ResponseDone,
    AudioStopped,
    UserTranscript(String),
    AssistantTranscript(String),
    FunctionCall(PendingToolCall),
    Error(String),
    /// The provider closed the connection.
    Closed,
}

/// Playback events the realtime API emits outside the typed event model.
#[derive(Deserialize)]
#[serde(tag = "type")]
enum PlaybackEvent {
    #[serde(rename = "output_audio_buffer.started")]
    Started,
    #[serde(rename = "output_audio_buffer.stopped")]
    Stopped,
}

impl TransportEvent {
    /// Reduces a provider event to a transport event. Unknown or malformed
    /// events yield `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        match serde_json::from_str::<ServerEvent>(raw) {
            Ok(event) => Self::from_server_event(event),
            Err(_) => match serde_json::from_str::<PlaybackEvent>(raw).ok()? {
                PlaybackEvent::Started => Some(Self::AudioStarted),
                PlaybackEvent::Stopped => Some(Self::AudioStopped),
            },
        }
    }

    fn from_server_event(event: ServerEvent) -> Option<Self> {
        Some(match event {
            ServerEvent::ResponseCreated(_) => Self::ResponseStarted,
            ServerEvent::ResponseAudioDelta(e) => Self::AudioDelta(e.delta),
            ServerEvent::ResponseDone(_) => Self::ResponseDone,
            ServerEvent::ConversationItemInputAudioTranscriptionCompleted(e) => {
                Self::UserTranscript(e.transcript)
            }
            ServerEvent::ResponseAudioTranscriptDone(e) => Self::AssistantTranscript(e.transcript),
            ServerEvent::ResponseOutputItemDone(e)
                if matches!(e.item.r#type, Some(ItemType::FunctionCall)) =>
            {
                Self::FunctionCall(PendingToolCall {
                    name: e.item.name?,
                    arguments: e.item.arguments.unwrap_or_default(),
                    call_id: e.item.call_id?,
                })
            }
            ServerEvent::Error(e) => Self::Error(e.error.message),
            _ => return None,
        })
    }
}

/// What the active agent tells the realtime model.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSetup {
    pub instructions: String,
    pub tools: Vec<ToolDescriptor>,
    pub voice: Option<String>,
}

// --- Client events ---

/// Maps a configured voice name onto the typed voice list. Voices the list
/// does not know are left to the minted session.
fn realtime_voice(name: &str) -> Option<RealtimeVoice> {
    let voice: Option<RealtimeVoice> =
        serde_json::from_value(Value::String(name.trim().to_ascii_lowercase())).ok();
    if voice.is_none() {
        debug!(voice = name, "Voice not in the typed list, keeping the session default");
    }
    voice
}

pub fn session_resource(setup: &SessionSetup) -> SessionResource {
    let tools = setup
        .tools
        .iter()
        .map(|t| ToolDefinition::Function {
            name: t.name.clone(),
            description: t.description.clone(),
            parameters: t.parameters.clone(),
        })
        .collect();
    SessionResource {
        modalities: Some(vec!["text".to_string(), "audio".to_string()]),
        instructions: Some(setup.instructions.clone()),
        voice: setup.voice.as_deref().and_then(realtime_voice),
        input_audio_format: Some(AudioFormat::PCM16),
        output_audio_format: Some(AudioFormat::PCM16),
        input_audio_transcription: Some(AudioTranscription {
            model: Some("whisper-1".to_string()),
            ..Default::default()
        }),
        turn_detection: Some(TurnDetection::ServerVAD {
            threshold: 0.5,
            prefix_padding_ms: 300,
            silence_duration_ms: 500,
            create_response: Some(true),
            interrupt_response: Some(true),
        }),
        tools: Some(tools),
        tool_choice: Some(ToolChoice::Auto),
        ..Default::default()
    }
}

pub fn session_update_event(setup: &SessionSetup) -> ClientEvent {
    ClientEvent::SessionUpdate(SessionUpdateEvent {
        event_id: None,
        session: session_resource(setup),
    })
}

fn conversation_item(kind: ItemType) -> Item {
    Item {
        id: None,
        r#type: Some(kind),
        status: None,
        role: None,
        content: None,
        call_id: None,
        name: None,
        arguments: None,
        output: None,
    }
}

fn create_item(item: Item) -> ClientEvent {
    ClientEvent::ConversationItemCreate(ConversationItemCreateEvent {
        event_id: None,
        previous_item_id: None,
        item,
    })
}

pub fn user_text_event(text: &str) -> ClientEvent {
    create_item(Item {
        role: Some(ItemRole::User),
        content: Some(vec![ItemContent {
            r#type: ItemContentType::InputText,
            text: Some(text.to_string()),
            audio: None,
            transcript: None,
        }]),
        ..conversation_item(ItemType::Message)
    })
}

pub fn response_create_event() -> ClientEvent {
    ClientEvent::ResponseCreate(ResponseCreateEvent::default())
}

pub fn tool_output_event(call_id: &str, output: &Value) -> ClientEvent {
    create_item(Item {
        call_id: Some(call_id.to_string()),
        output: Some(output.to_string()),
        ..conversation_item(ItemType::FunctionCallOutput)
    })
}

pub fn audio_append_event(pcm16: &[u8]) -> ClientEvent {
    ClientEvent::InputAudioBufferAppend(InputAudioBufferAppendEvent {
        event_id: None,
        audio: base64::engine::general_purpose::STANDARD.encode(pcm16),
    })
}

// --- Connection traits ---

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("realtime handshake failed: {0}")]
    Handshake(String),
    #[error("failed to send realtime event: {0}")]
    Send(String),
}

/// An open realtime session.
#[async_trait]
pub trait RealtimeConnection: Send {
    async fn send_user_text(&mut self, text: &str) -> Result<(), TransportError>;
    async fn request_response(&mut self) -> Result<(), TransportError>;
    async fn send_tool_output(&mut self, call_id: &str, output: &Value)
    -> Result<(), TransportError>;
    async fn update_session(&mut self, setup: &SessionSetup) -> Result<(), TransportError>;
    /// Sends microphone audio. Dropped while muted.
    async fn send_audio(&mut self, pcm16: &[u8]) -> Result<(), TransportError>;
    fn set_muted(&mut self, muted: bool);
    fn is_muted(&self) -> bool;
    /// Tears the session down. Events stop flowing once this returns.
    async fn close(&mut self);
}

#[async_trait]
pub trait RealtimeConnector: Send + Sync {
    /// Opens a session and starts forwarding its events into `events`.
    async fn connect(
        &self,
        key: &EphemeralKey,
        setup: &SessionSetup,
        events: mpsc::Sender<TransportEvent>,
    ) -> Result<Box<dyn RealtimeConnection>, TransportError>;
}

// --- OpenAI WebSocket transport ---

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, WsMessage>;

pub struct OpenAiRealtimeConnector {
    url: String,
}

impl OpenAiRealtimeConnector {
    pub fn new(base_url: &str, model: &str) -> Self {
        Self {
            url: format!("{}?model={}", base_url.trim_end_matches('/'), model),
        }
    }
}

#[async_trait]
impl RealtimeConnector for OpenAiRealtimeConnector {
    async fn connect(
        &self,
        key: &EphemeralKey,
        setup: &SessionSetup,
        events: mpsc::Sender<TransportEvent>,
    ) -> Result<Box<dyn RealtimeConnection>, TransportError> {
        let handshake = |e: &dyn std::fmt::Display| TransportError::Handshake(e.to_string());

        let mut request = self.url.as_str().into_client_request().map_err(|e| handshake(&e))?;
        let auth = format!("Bearer {}", key.expose())
            .parse::<HeaderValue>()
            .map_err(|e| handshake(&e))?;
        request.headers_mut().insert("Authorization", auth);
        request
            .headers_mut()
            .insert("OpenAI-Beta", HeaderValue::from_static("realtime=v1"));

        let (ws_stream, _) = connect_async(request).await.map_err(|e| handshake(&e))?;
        let (sink, mut stream) = ws_stream.split();
        info!(url = %self.url, "Connected to realtime API.");

        let reader = tokio::spawn(async move {
            while let Some(msg) = stream.next().await {
                match msg {
                    Ok(WsMessage::Text(text)) => {
                        if let Some(event) = TransportEvent::parse(&text) {
                            if events.send(event).await.is_err() {
                                return;
                            }
                        }
                    }
                    Ok(WsMessage::Close(frame)) => {
                        debug!(?frame, "Realtime API closed the connection");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "Realtime socket error");
                        break;
                    }
                }
            }
            let _ = events.send(TransportEvent::Closed).await;
        });

        let mut connection = OpenAiRealtimeConnection {
            sink,
            reader,
            muted: false,
        };
        if let Err(e) = connection.send(session_update_event(setup)).await {
            connection.close().await;
            return Err(TransportError::Handshake(e.to_string()));
        }
        Ok(Box::new(connection))
    }
}

pub struct OpenAiRealtimeConnection {
    sink: WsSink,
    reader: JoinHandle<()>,
    muted: bool,
}

impl OpenAiRealtimeConnection {
    async fn send(&mut self, event: ClientEvent) -> Result<(), TransportError> {
        let payload =
            serde_json::to_string(&event).map_err(|e| TransportError::Send(e.to_string()))?;
        self.sink
            .send(WsMessage::Text(payload.into()))
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }
}

#[async_trait]
impl RealtimeConnection for OpenAiRealtimeConnection {
    async fn send_user_text(&mut self, text: &str) -> Result<(), TransportError> {
        self.send(user_text_event(text)).await
    }

    async fn request_response(&mut self) -> Result<(), TransportError> {
        self.send(response_create_event()).await
    }

    async fn send_tool_output(
        &mut self,
        call_id: &str,
        output: &Value,
    ) -> Result<(), TransportError> {
        self.send(tool_output_event(call_id, output)).await
    }

    async fn update_session(&mut self, setup: &SessionSetup) -> Result<(), TransportError> {
        self.send(session_update_event(setup)).await
    }

    async fn send_audio(&mut self, pcm16: &[u8]) -> Result<(), TransportError> {
        if self.muted || pcm16.is_empty() {
            return Ok(());
        }
        self.send(audio_append_event(pcm16)).await
    }

    fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    fn is_muted(&self) -> bool {
        self.muted
    }

    async fn close(&mut self) {
        self.reader.abort();
        let _ = self.sink.send(WsMessage::Close(None)).await;
        let _ = self.sink.close().await;
    }
}
