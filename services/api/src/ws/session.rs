//! Manages the WebSocket connection between a hosted widget page and its
//! server-side widget session.

use super::protocol::{ClientMessage, ServerMessage};
use crate::{
    audio_utils::{decode_pcm16_base64, is_pcm16_frame, pcm16_duration_ms},
    handlers::ApiError,
    state::AppState,
};
use anyhow::Result;
use axum::{
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use std::{collections::HashMap, sync::Arc};
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, trace, warn};
use uuid::Uuid;
use voicepulse_core::{
    agents::AgentSet,
    protocol::WidgetQuery,
    widget::{WidgetEvent, WidgetSession, WidgetUpdate},
};

/// Axum handler to upgrade an HTTP connection to a WebSocket.
///
/// The agent set is resolved before upgrading so an unknown `agentConfig` is a
/// plain 404.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, ApiError> {
    let query = WidgetQuery::from_params(&params);
    let agents = state.agents.get(&query.agent_config).ok_or_else(|| {
        ApiError::NotFound(format!("Unknown agent config '{}'", query.agent_config))
    })?;
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, agents, query.agent_name)))
}

/// Main handler for an individual widget connection.
///
/// Creates a disconnected widget session and drives it until the page goes
/// away. Whatever state the session is in at that point, it is torn down.
#[instrument(name = "ws_session", skip_all, fields(session_id, agent_config = %agents.key))]
async fn handle_socket(
    socket: WebSocket,
    state: Arc<AppState>,
    agents: Arc<AgentSet>,
    agent_name: Option<String>,
) {
    let session_id = Uuid::new_v4();
    tracing::Span::current().record("session_id", session_id.to_string());
    info!("New widget connection.");

    let (mut socket_tx, mut socket_rx) = socket.split();
    let (events_tx, mut events_rx) = mpsc::channel(64);
    let (updates_tx, mut updates_rx) = mpsc::unbounded_channel();

    let mut session = match WidgetSession::new(
        state.widget_services(),
        agents.clone(),
        agent_name.as_deref(),
        state.widget_options(),
        events_tx,
        updates_tx,
    ) {
        Ok(session) => session,
        Err(e) => {
            error!("Widget session could not be created: {}", e);
            let _ = send_msg(
                &mut socket_tx,
                ServerMessage::Error {
                    message: e.to_string(),
                },
            )
            .await;
            return;
        }
    };

    let ready = ServerMessage::Ready {
        agent_config: agents.key.clone(),
        agent: session.active_agent().to_string(),
    };
    if send_msg(&mut socket_tx, ready).await.is_err() {
        error!("Failed to send Ready message to client.");
        return;
    }

    if let Err(e) = run_widget_session(
        &mut session,
        &mut socket_tx,
        &mut socket_rx,
        &mut events_rx,
        &mut updates_rx,
    )
    .await
    {
        warn!(error = ?e, "Widget connection terminated with error.");
    }

    session.disconnect().await;
    info!("Widget connection closed.");
}

/// The main event loop for a widget connection.
///
/// Page messages, session events and session updates are interleaved here so
/// the session only ever sees one event at a time.
async fn run_widget_session(
    session: &mut WidgetSession,
    socket_tx: &mut SplitSink<WebSocket, Message>,
    socket_rx: &mut SplitStream<WebSocket>,
    events_rx: &mut mpsc::Receiver<WidgetEvent>,
    updates_rx: &mut mpsc::UnboundedReceiver<WidgetUpdate>,
) -> Result<()> {
    loop {
        tokio::select! {
            msg = socket_rx.next() => match msg {
                Some(Ok(Message::Text(text))) => match ClientMessage::parse(text.as_str()) {
                    Some(ClientMessage::Frame(frame)) => {
                        session.handle(WidgetEvent::Frame(frame)).await
                    }
                    Some(ClientMessage::ToggleMute) => session.handle(WidgetEvent::ToggleMute).await,
                    None => debug!("Ignoring unrecognized text message."),
                },
                Some(Ok(Message::Binary(data))) => {
                    if is_pcm16_frame(&data) {
                        session.handle(WidgetEvent::MicAudio(data)).await;
                    } else {
                        debug!(len = data.len(), "Ignoring malformed audio frame.");
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    info!("Client closed the connection.");
                    break;
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                Some(Err(e)) => {
                    error!("Error receiving from client WebSocket: {:?}", e);
                    break;
                }
            },
            Some(event) = events_rx.recv() => session.handle(event).await,
            Some(update) = updates_rx.recv() => forward_update(socket_tx, update).await?,
        }
    }
    Ok(())
}

/// Sends a session update to the page. Assistant audio goes out as binary
/// PCM16; everything else as JSON.
async fn forward_update(
    socket_tx: &mut SplitSink<WebSocket, Message>,
    update: WidgetUpdate,
) -> Result<()> {
    if let WidgetUpdate::AudioDelta(delta) = &update {
        if let Some(pcm16) = decode_pcm16_base64(delta) {
            trace!(duration_ms = pcm16_duration_ms(&pcm16), "Forwarding assistant audio");
            socket_tx.send(Message::Binary(pcm16.into())).await?;
        }
        return Ok(());
    }
    if let Some(msg) = ServerMessage::from_update(update) {
        send_msg(socket_tx, msg).await?;
    }
    Ok(())
}

/// A helper function to serialize and send a `ServerMessage` to the client.
pub(crate) async fn send_msg(
    socket_tx: &mut SplitSink<WebSocket, Message>,
    msg: ServerMessage,
) -> Result<()> {
    let serialized = serde_json::to_string(&msg)?;
    socket_tx.send(Message::Text(serialized.into())).await?;
    Ok(())
}
