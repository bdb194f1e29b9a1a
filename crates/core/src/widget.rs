//! Hosted Widget Session
//!
//! One `WidgetSession` per hosted widget. It owns the session status, the
//! single realtime connection, the responding and mute flags, and the
//! conversation of the current session. All input arrives as [`WidgetEvent`]s
//! on one queue and is handled to completion, one event at a time.
//!
//! Network work (credential fetch, handshake, tool execution) runs in spawned
//! tasks that report back through the same queue, tagged with the generation
//! they were started under. Every connect and disconnect bumps the generation,
//! so a result that arrives after its session was torn down is recognized as
//! stale and dropped.

use crate::{
    agents::AgentSet,
    conversation::{ConversationContext, PendingToolCall, Role, ToolResult, Turn},
    credential::CredentialProvider,
    protocol::FrameMessage,
    realtime::{RealtimeConnection, RealtimeConnector, SessionSetup, TransportEvent},
    supervisor::Supervisor,
    tools::{ToolExecutor, ToolRequest},
};
use bytes::Bytes;
use serde::Serialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WidgetOptions {
    /// Send a greeting on the user's behalf as soon as the session connects.
    pub auto_greet: bool,
    pub greeting: String,
    /// Voice for agents that do not pick their own.
    pub voice: Option<String>,
}

impl Default for WidgetOptions {
    fn default() -> Self {
        Self {
            auto_greet: true,
            greeting: "hi".to_string(),
            voice: None,
        }
    }
}

/// State of the local audio element that plays assistant audio.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AudioOutput {
    pub muted: bool,
    pub volume: f32,
}

impl Default for AudioOutput {
    fn default() -> Self {
        Self {
            muted: false,
            volume: 1.0,
        }
    }
}

/// Changes the UI needs to reflect.
#[derive(Debug, Clone, PartialEq)]
pub enum WidgetUpdate {
    Status(SessionStatus),
    Error(String),
    Responding(bool),
    AudioOutput(AudioOutput),
    AudioDelta(String),
    Transcript { role: Role, text: String },
    AgentChanged(String),
}

pub enum WidgetEvent {
    Frame(FrameMessage),
    ToggleMute,
    MicAudio(Bytes),
    Connected {
        generation: u64,
        result: Result<Box<dyn RealtimeConnection>, String>,
    },
    Transport {
        generation: u64,
        event: TransportEvent,
    },
    ToolFinished {
        generation: u64,
        call_id: String,
        output: Value,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum WidgetError {
    #[error("agent set '{0}' has no agents")]
    EmptyAgentSet(String),
}

/// Shared services a widget session calls out to.
#[derive(Clone)]
pub struct WidgetServices {
    pub credentials: Arc<dyn CredentialProvider>,
    pub connector: Arc<dyn RealtimeConnector>,
    pub supervisor: Arc<Supervisor>,
    pub tools: Arc<ToolExecutor>,
}

pub struct WidgetSession {
    services: WidgetServices,
    agents: Arc<AgentSet>,
    active_agent: String,
    options: WidgetOptions,
    status: SessionStatus,
    generation: u64,
    connection: Option<Box<dyn RealtimeConnection>>,
    responding: bool,
    muted: bool,
    audio_output: AudioOutput,
    last_error: Option<String>,
    context: ConversationContext,
    events_tx: mpsc::Sender<WidgetEvent>,
    updates: mpsc::UnboundedSender<WidgetUpdate>,
}

impl WidgetSession {
    /// Creates a disconnected session.
    ///
    /// `events_tx` must feed the queue this session's `handle` is driven from;
    /// spawned work reports back through it.
    pub fn new(
        services: WidgetServices,
        agents: Arc<AgentSet>,
        agent_name: Option<&str>,
        options: WidgetOptions,
        events_tx: mpsc::Sender<WidgetEvent>,
        updates: mpsc::UnboundedSender<WidgetUpdate>,
    ) -> Result<Self, WidgetError> {
        let active_agent = agents
            .starting_agent(agent_name)
            .map(|a| a.name.clone())
            .ok_or_else(|| WidgetError::EmptyAgentSet(agents.key.clone()))?;
        Ok(Self {
            services,
            agents,
            active_agent,
            options,
            status: SessionStatus::Disconnected,
            generation: 0,
            connection: None,
            responding: false,
            muted: false,
            audio_output: AudioOutput::default(),
            last_error: None,
            context: ConversationContext::new(),
            events_tx,
            updates,
        })
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn is_responding(&self) -> bool {
        self.responding
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn audio_output(&self) -> AudioOutput {
        self.audio_output
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn active_agent(&self) -> &str {
        &self.active_agent
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn has_connection(&self) -> bool {
        self.connection.is_some()
    }

    pub fn context(&self) -> &ConversationContext {
        &self.context
    }

    pub async fn handle(&mut self, event: WidgetEvent) {
        match event {
            WidgetEvent::Frame(FrameMessage::Connect) => {
                self.connect();
            }
            WidgetEvent::Frame(FrameMessage::Disconnect) => self.disconnect().await,
            WidgetEvent::ToggleMute => self.toggle_mute(),
            WidgetEvent::MicAudio(pcm16) => {
                if let Some(conn) = self.connection.as_mut() {
                    if let Err(e) = conn.send_audio(&pcm16).await {
                        debug!(error = %e, "Dropping microphone audio");
                    }
                }
            }
            WidgetEvent::Connected { generation, result } => {
                self.on_connected(generation, result).await
            }
            WidgetEvent::Transport { generation, event } => {
                self.on_transport(generation, event).await
            }
            WidgetEvent::ToolFinished {
                generation,
                call_id,
                output,
            } => self.on_tool_finished(generation, &call_id, output).await,
        }
    }

    /// Starts connecting. Ignored unless currently disconnected.
    ///
    /// Returns whether a connection attempt was started.
    pub fn connect(&mut self) -> bool {
        if self.status != SessionStatus::Disconnected {
            debug!(status = ?self.status, "Ignoring connect request");
            return false;
        }
        self.generation += 1;
        self.last_error = None;
        self.set_status(SessionStatus::Connecting);

        let generation = self.generation;
        let services = self.services.clone();
        let setup = self.session_setup();
        let events_tx = self.events_tx.clone();
        tokio::spawn(async move {
            let result = open_connection(&services, &setup, generation, events_tx.clone()).await;
            if let Err(ref message) = result {
                warn!(generation, error = %message, "Connection attempt failed");
            }
            let _ = events_tx
                .send(WidgetEvent::Connected { generation, result }).await;
        });
        true
    }

    /// Tears the session down. Always ends disconnected with no live
    /// connection and the responding flag cleared.
    pub async fn disconnect(&mut self) {
        if self.status == SessionStatus::Disconnected && self.connection.is_none() {
            self.set_responding(false);
            return;
        }
        self.generation += 1;
        if let Some(mut conn) = self.connection.take() {
            conn.close().await;
        }
        self.set_status(SessionStatus::Disconnected);
        self.muted = false;
        self.set_audio_output(AudioOutput::default());
        self.context.clear();
        info!(generation = self.generation, "Session disconnected");
    }

    /// Flips mute on the transport and mirrors it onto the audio output.
    /// Does nothing unless connected.
    pub fn toggle_mute(&mut self) {
        if self.status != SessionStatus::Connected {
            debug!(status = ?self.status, "Ignoring mute toggle");
            return;
        }
        let Some(conn) = self.connection.as_mut() else {
            return;
        };
        conn.set_muted(!self.muted);
        self.muted = conn.is_muted();
        self.set_audio_output(AudioOutput {
            muted: self.muted,
            volume: if self.muted { 0.0 } else { 1.0 },
        });
    }

    async fn on_connected(
        &mut self,
        generation: u64,
        result: Result<Box<dyn RealtimeConnection>, String>,
    ) {
        if generation != self.generation || self.status != SessionStatus::Connecting {
            if let Ok(mut stale) = result {
                info!(generation, "Closing connection that finished after teardown");
                stale.close().await;
            }
            return;
        }

        match result {
            Ok(conn) => {
                self.connection = Some(conn);
                self.set_status(SessionStatus::Connected);
                info!(generation, agent = %self.active_agent, "Session connected");
                if self.options.auto_greet {
                    self.greet().await;
                }
            }
            Err(message) => {
                self.last_error = Some(message.clone());
                self.emit(WidgetUpdate::Error(message));
                self.set_status(SessionStatus::Disconnected);
            }
        }
    }

    async fn greet(&mut self) {
        let greeting = self.options.greeting.clone();
        let Some(conn) = self.connection.as_mut() else {
            return;
        };
        let sent = match conn.send_user_text(&greeting).await {
            Ok(()) => conn.request_response().await,
            Err(e) => Err(e),
        };
        match sent {
            Ok(()) => self.context.push(Turn::user(greeting)),
            Err(e) => warn!(error = %e, "Failed to send greeting"),
        }
    }

    #[instrument(skip(self, event), fields(current = self.generation))]
    async fn on_transport(&mut self, generation: u64, event: TransportEvent) {
        // Events can beat the Connected notice through the queue; those are
        // provider handshake chatter and are safe to drop.
        if generation != self.generation || self.status != SessionStatus::Connected {
            debug!(?event, "Dropping transport event for inactive session");
            return;
        }

        match event {
            TransportEvent::ResponseStarted | TransportEvent::AudioStarted => {
                self.set_responding(true)
            }
            TransportEvent::ResponseDone | TransportEvent::AudioStopped => {
                self.set_responding(false)
            }
            TransportEvent::AudioDelta(delta) => self.emit(WidgetUpdate::AudioDelta(delta)),
            TransportEvent::UserTranscript(text) => {
                self.context.push(Turn::user(text.clone()));
                self.emit(WidgetUpdate::Transcript {
                    role: Role::User,
                    text,
                });
            }
            TransportEvent::AssistantTranscript(text) => {
                self.context.push(Turn::assistant(text.clone()));
                self.emit(WidgetUpdate::Transcript {
                    role: Role::Assistant,
                    text,
                });
            }
            TransportEvent::FunctionCall(call) => self.dispatch_tool_call(call).await,
            TransportEvent::Error(message) => {
                warn!(%message, "Realtime API reported an error");
                self.emit(WidgetUpdate::Error(message));
            }
            TransportEvent::Closed => {
                warn!("Realtime connection closed by provider");
                let message = "Connection closed.".to_string();
                self.last_error = Some(message.clone());
                self.emit(WidgetUpdate::Error(message));
                self.disconnect().await;
            }
        }
    }

    async fn dispatch_tool_call(&mut self, call: PendingToolCall) {
        info!(tool = %call.name, call_id = %call.call_id, "Tool call requested");
        self.context.push(Turn::ToolCall(call.clone()));

        let request = match ToolRequest::parse(&call.name, &call.arguments) {
            Ok(request) => request,
            Err(e) => {
                warn!(tool = %call.name, error = %e, "Rejected tool call");
                let generation = self.generation;
                self.on_tool_finished(generation, &call.call_id, e.to_output()).await;
                return;
            }
        };

        if let ToolRequest::Handoff { target } = &request {
            self.hand_off(&call.call_id, target).await;
            return;
        }

        let generation = self.generation;
        let call_id = call.call_id;
        let services = self.services.clone();
        let history = self.context.clone();
        let events_tx = self.events_tx.clone();
        tokio::spawn(async move {
            let output = match &request {
                ToolRequest::Supervisor(args) => {
                    services
                        .supervisor
                        .next_response_output(&history, &args.relevant_context)
                        .await
                }
                other => services.tools.execute(other).await,
            };
            let _ = events_tx
                .send(WidgetEvent::ToolFinished {
                    generation,
                    call_id,
                    output,
                })
                .await;
        });
    }

    async fn hand_off(&mut self, call_id: &str, target: &str) {
        let generation = self.generation;
        if !self.agents.can_hand_off(&self.active_agent, target) {
            warn!(from = %self.active_agent, to = %target, "Refusing handoff");
            let output = json!({
                "status": "error",
                "message": format!("Cannot transfer to '{target}'."),
            });
            self.on_tool_finished(generation, call_id, output).await;
            return;
        }

        info!(from = %self.active_agent, to = %target, "Handing off conversation");
        self.active_agent = target.to_string();
        self.emit(WidgetUpdate::AgentChanged(self.active_agent.clone()));
        let setup = self.session_setup();
        if let Some(conn) = self.connection.as_mut() {
            if let Err(e) = conn.update_session(&setup).await {
                warn!(error = %e, "Failed to update session for new agent");
            }
        }
        self.on_tool_finished(generation, call_id, json!({ "handoff": target })).await;
    }

    async fn on_tool_finished(&mut self, generation: u64, call_id: &str, output: Value) {
        if generation != self.generation || self.status != SessionStatus::Connected {
            info!(call_id, generation, "Discarding tool result for a torn-down session");
            return;
        }
        self.context.push(Turn::ToolResult(ToolResult {
            call_id: call_id.to_string(),
            output: output.clone(),
        }));
        let Some(conn) = self.connection.as_mut() else {
            return;
        };
        let sent = match conn.send_tool_output(call_id, &output).await {
            Ok(()) => conn.request_response().await,
            Err(e) => Err(e),
        };
        if let Err(e) = sent {
            warn!(call_id, error = %e, "Failed to return tool output");
        }
    }

    fn session_setup(&self) -> SessionSetup {
        match self.agents.agent(&self.active_agent) {
            Some(agent) => SessionSetup {
                instructions: agent.instructions.clone(),
                tools: self.agents.tool_descriptors(agent),
                voice: agent.voice.clone().or_else(|| self.options.voice.clone()),
            },
            None => SessionSetup {
                instructions: String::new(),
                tools: Vec::new(),
                voice: self.options.voice.clone(),
            },
        }
    }

    fn set_status(&mut self, status: SessionStatus) {
        if status != SessionStatus::Connected {
            self.set_responding(false);
        }
        if self.status != status {
            self.status = status;
            self.emit(WidgetUpdate::Status(status));
        }
    }

    fn set_responding(&mut self, responding: bool) {
        if self.responding != responding {
            self.responding = responding;
            self.emit(WidgetUpdate::Responding(responding));
        }
    }

    fn set_audio_output(&mut self, output: AudioOutput) {
        if self.audio_output != output {
            self.audio_output = output;
            self.emit(WidgetUpdate::AudioOutput(output));
        }
    }

    fn emit(&self, update: WidgetUpdate) {
        if self.updates.send(update).is_err() {
            debug!("Widget update receiver dropped");
        }
    }
}

async fn open_connection(
    services: &WidgetServices,
    setup: &SessionSetup,
    generation: u64,
    events_tx: mpsc::Sender<WidgetEvent>,
) -> Result<Box<dyn RealtimeConnection>, String> {
    let key = services
        .credentials
        .fetch_key()
        .await
        .map_err(|e| format!("Could not start a voice session: {e}"))?;

    let (transport_tx, mut transport_rx) = mpsc::channel(64);
    let connection = services
        .connector
        .connect(&key, setup, transport_tx)
        .await
        .map_err(|e| e.to_string())?;

    tokio::spawn(async move {
        while let Some(event) = transport_rx.recv().await {
            if events_tx
                .send(WidgetEvent::Transport { generation, event })
                .await
                .is_err()
            {
                break;
            }
        }
    });
    Ok(connection)
}
