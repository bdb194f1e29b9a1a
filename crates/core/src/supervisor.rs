//! Supervisor Orchestration Loop
//!
//! The realtime agent delegates non-trivial turns to a supervisor model. The
//! supervisor sees the message history plus a note about the latest user turn,
//! may call tools, and eventually answers with plain text for the realtime
//! agent to speak.
//!
//! The loop is bounded: a model that keeps asking for tools is cut off after
//! `max_iterations` requests and the turn fails.

use crate::{
    conversation::{ConversationContext, ToolResult, Turn},
    llm_client::ReasoningClient,
    tools::{ToolDescriptor, ToolExecutor},
};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

pub const DEFAULT_MAX_ITERATIONS: usize = 6;

/// What the conversation receives when a supervisor turn fails.
pub fn generic_error_output() -> Value {
    json!({ "error": "Something went wrong." })
}

#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("reasoning request failed: {0}")]
    Transport(#[source] anyhow::Error),
    #[error("supervisor still requesting tools after {0} reasoning requests")]
    IterationLimit(usize),
}

pub struct Supervisor {
    client: Arc<dyn ReasoningClient>,
    executor: Arc<ToolExecutor>,
    instructions: String,
    tools: Vec<ToolDescriptor>,
    max_iterations: usize,
}

impl Supervisor {
    pub fn new(
        client: Arc<dyn ReasoningClient>,
        executor: Arc<ToolExecutor>,
        instructions: impl Into<String>,
        tools: Vec<ToolDescriptor>,
    ) -> Self {
        Self {
            client,
            executor,
            instructions: instructions.into(),
            tools,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    /// Runs the request/execute/continue loop until the model answers in text.
    ///
    /// Tool calls from one response all complete and land in the history
    /// before the next request is made. A failed request ends the loop
    /// immediately with no partial text.
    #[instrument(skip_all, fields(history_len = history.len()))]
    pub async fn next_response(
        &self,
        history: &ConversationContext,
        relevant_context: &str,
    ) -> Result<String, SupervisorError> {
        let mut turns = vec![
            Turn::system(self.instructions.clone()),
            Turn::user(format!(
                "==== Conversation History ====\n{}\n\n==== Relevant Context From Last User Message ====\n{}",
                history.messages_json(),
                relevant_context
            )),
        ];

        for iteration in 1..=self.max_iterations {
            let response = self
                .client
                .respond(turns.clone(), self.tools.clone())
                .await
                .map_err(SupervisorError::Transport)?;

            let calls = response.tool_calls();
            if calls.is_empty() {
                info!(iteration, "Supervisor produced final answer");
                return Ok(response.text());
            }

            debug!(iteration, calls = calls.len(), "Supervisor requested tools");
            for call in calls {
                let output = self.executor.execute_call(&call.name, &call.arguments).await;
                turns.push(Turn::ToolCall(call.clone()));
                turns.push(Turn::ToolResult(ToolResult {
                    call_id: call.call_id.clone(),
                    output,
                }));
            }
        }

        warn!(max = self.max_iterations, "Supervisor hit the iteration cap");
        Err(SupervisorError::IterationLimit(self.max_iterations))
    }

    /// Like [`Self::next_response`], shaped as the tool output handed back to
    /// the realtime agent. Failures collapse into [`generic_error_output`].
    pub async fn next_response_output(
        &self,
        history: &ConversationContext,
        relevant_context: &str,
    ) -> Value {
        match self.next_response(history, relevant_context).await {
            Ok(text) => json!({ "nextResponse": text }),
            Err(e) => {
                warn!(error = %e, "Supervisor turn failed");
                generic_error_output()
            }
        }
    }
}
