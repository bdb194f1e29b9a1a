use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A tool invocation requested by a model, waiting to be executed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingToolCall {
    pub name: String,
    /// Raw JSON arguments as the model produced them.
    pub arguments: String,
    pub call_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub call_id: String,
    pub output: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Turn {
    Message { role: Role, text: String },
    ToolCall(PendingToolCall),
    ToolResult(ToolResult),
}

impl Turn {
    pub fn system(text: impl Into<String>) -> Self {
        Self::Message {
            role: Role::System,
            text: text.into(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::Message {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::Message {
            role: Role::Assistant,
            text: text.into(),
        }
    }

    pub fn is_message(&self) -> bool {
        matches!(self, Self::Message { .. })
    }
}

/// Ordered turns of one voice session. Append-only; dropped when the session ends.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversationContext {
    turns: Vec<Turn>,
}

impl ConversationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn messages(&self) -> impl Iterator<Item = &Turn> {
        self.turns.iter().filter(|t| t.is_message())
    }

    /// Message turns only, as pretty JSON.
    pub fn messages_json(&self) -> String {
        let messages: Vec<&Turn> = self.messages().collect();
        serde_json::to_string_pretty(&messages).unwrap_or_else(|_| "[]".to_string())
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }
}
