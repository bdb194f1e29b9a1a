//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds the agent registry
//! and the shared service clients every widget session calls out to.

use crate::config::Config;
use std::sync::Arc;
use voicepulse_core::{
    agents::AgentRegistry,
    credential::CredentialProvider,
    mcp_client::SurveyBackend,
    realtime::RealtimeConnector,
    supervisor::Supervisor,
    tools::ToolExecutor,
    widget::{WidgetOptions, WidgetServices},
};

/// The shared application state, created once at startup and passed to all handlers.
/// All fields are public to be accessible from other modules.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub agents: Arc<AgentRegistry>,
    pub credentials: Arc<dyn CredentialProvider>,
    pub connector: Arc<dyn RealtimeConnector>,
    pub survey: Arc<dyn SurveyBackend>,
    pub tools: Arc<ToolExecutor>,
    pub supervisor: Arc<Supervisor>,
}

impl AppState {
    pub fn widget_services(&self) -> WidgetServices {
        WidgetServices {
            credentials: self.credentials.clone(),
            connector: self.connector.clone(),
            supervisor: self.supervisor.clone(),
            tools: self.tools.clone(),
        }
    }

    pub fn widget_options(&self) -> WidgetOptions {
        WidgetOptions {
            auto_greet: self.config.auto_greet,
            greeting: self.config.greeting.clone(),
            voice: Some(self.config.realtime_voice.clone()),
        }
    }
}
