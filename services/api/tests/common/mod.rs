//! Fakes and state builders shared by the API integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{Value, json};
use std::{
    net::SocketAddr,
    sync::{Arc, Mutex},
};
use tokio::{net::TcpListener, sync::mpsc};
use tracing::Level;
use voicepulse_api::{config::Config, router::create_router, state::AppState};
use voicepulse_core::{
    agents::AgentRegistry,
    conversation::Turn,
    credential::{CredentialError, CredentialProvider, EphemeralKey},
    llm_client::{OutputSegment, ReasoningClient, ReasoningResponse},
    mcp_client::SurveyBackend,
    realtime::{
        RealtimeConnection, RealtimeConnector, SessionSetup, TransportError, TransportEvent,
    },
    supervisor::Supervisor,
    tools::{SurveyTool, ToolDescriptor, ToolExecutor},
};

pub fn test_config() -> Config {
    Config {
        bind_address: "127.0.0.1:0".parse().unwrap(),
        openai_api_key: "test-key".into(),
        openai_api_base: "http://localhost:1/v1".into(),
        realtime_url: "ws://localhost:1/v1/realtime".into(),
        realtime_model: "gpt-realtime".into(),
        realtime_voice: "sage".into(),
        supervisor_model: "gpt-4.1".into(),
        supervisor_max_iterations: 6,
        mcp_server_url: "http://localhost:1".into(),
        prompts_path: None,
        auto_greet: true,
        greeting: "hi".into(),
        log_level: Level::INFO,
    }
}

pub struct FakeCredentials {
    pub fail: bool,
}

#[async_trait]
impl CredentialProvider for FakeCredentials {
    async fn create_session(&self) -> Result<Value, CredentialError> {
        if self.fail {
            return Err(CredentialError::Status {
                status: 401,
                body: "invalid api key".into(),
            });
        }
        Ok(json!({
            "id": "sess_test",
            "object": "realtime.session",
            "client_secret": { "value": "ek_test", "expires_at": 1_700_000_000 }
        }))
    }
}

/// Connection that accepts everything and records what it was sent.
pub struct FakeConnection {
    pub sent: Arc<Mutex<Vec<String>>>,
    muted: bool,
}

#[async_trait]
impl RealtimeConnection for FakeConnection {
    async fn send_user_text(&mut self, text: &str) -> Result<(), TransportError> {
        self.sent.lock().unwrap().push(format!("text:{text}"));
        Ok(())
    }

    async fn request_response(&mut self) -> Result<(), TransportError> {
        self.sent.lock().unwrap().push("response".into());
        Ok(())
    }

    async fn send_tool_output(&mut self, call_id: &str, _output: &Value) -> Result<(), TransportError> {
        self.sent.lock().unwrap().push(format!("tool_output:{call_id}"));
        Ok(())
    }

    async fn update_session(&mut self, _setup: &SessionSetup) -> Result<(), TransportError> {
        self.sent.lock().unwrap().push("session_update".into());
        Ok(())
    }

    async fn send_audio(&mut self, _pcm16: &[u8]) -> Result<(), TransportError> {
        if !self.muted {
            self.sent.lock().unwrap().push("audio".into());
        }
        Ok(())
    }

    fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    fn is_muted(&self) -> bool {
        self.muted
    }

    async fn close(&mut self) {
        self.sent.lock().unwrap().push("close".into());
    }
}

#[derive(Default)]
pub struct FakeConnector {
    pub sent: Arc<Mutex<Vec<String>>>,
    pub events: Mutex<Option<mpsc::Sender<TransportEvent>>>,
}

#[async_trait]
impl RealtimeConnector for FakeConnector {
    async fn connect(
        &self,
        _key: &EphemeralKey,
        _setup: &SessionSetup,
        events: mpsc::Sender<TransportEvent>,
    ) -> Result<Box<dyn RealtimeConnection>, TransportError> {
        *self.events.lock().unwrap() = Some(events);
        Ok(Box::new(FakeConnection {
            sent: self.sent.clone(),
            muted: false,
        }))
    }
}

/// Survey backend that echoes the call back as a successful result.
#[derive(Default)]
pub struct EchoSurvey {
    pub calls: Mutex<Vec<String>>,
}

#[async_trait]
impl SurveyBackend for EchoSurvey {
    async fn call(&self, tool: &SurveyTool) -> Value {
        self.calls.lock().unwrap().push(tool.name().to_string());
        json!({ "status": "ok", "tool": tool.name(), "parameters": tool.parameters() })
    }
}

pub struct CannedReasoning;

#[async_trait]
impl ReasoningClient for CannedReasoning {
    async fn respond(
        &self,
        _turns: Vec<Turn>,
        _tools: Vec<ToolDescriptor>,
    ) -> anyhow::Result<ReasoningResponse> {
        Ok(ReasoningResponse {
            segments: vec![OutputSegment::Text("Happy to help.".into())],
        })
    }
}

pub struct TestApp {
    pub state: Arc<AppState>,
    pub connector: Arc<FakeConnector>,
    pub survey: Arc<EchoSurvey>,
}

pub fn test_app(credentials_fail: bool) -> TestApp {
    let survey = Arc::new(EchoSurvey::default());
    let connector = Arc::new(FakeConnector::default());
    let tools = Arc::new(ToolExecutor::new(survey.clone()));
    let agents = AgentRegistry::builtin();
    let supervisor = Arc::new(Supervisor::new(
        Arc::new(CannedReasoning),
        tools.clone(),
        agents.supervisor_instructions(),
        Vec::new(),
    ));
    let state = Arc::new(AppState {
        config: Arc::new(test_config()),
        agents: Arc::new(agents),
        credentials: Arc::new(FakeCredentials {
            fail: credentials_fail,
        }),
        connector: connector.clone(),
        survey: survey.clone(),
        tools,
        supervisor,
    });
    TestApp {
        state,
        connector,
        survey,
    }
}

/// Serves the router on an ephemeral port.
pub async fn spawn_server(state: Arc<AppState>) -> SocketAddr {
    let app = create_router(state);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    addr
}
