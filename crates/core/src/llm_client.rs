use crate::conversation::{PendingToolCall, Role, Turn};
use crate::tools::ToolDescriptor;
use anyhow::Result;
use async_openai::{
    Client,
    config::OpenAIConfig,
    types::{
        ChatCompletionMessageToolCall, ChatCompletionRequestAssistantMessageArgs,
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestToolMessageArgs, ChatCompletionRequestUserMessageArgs,
        ChatCompletionTool, ChatCompletionToolArgs, ChatCompletionToolType,
        CreateChatCompletionRequestArgs, CreateChatCompletionResponse, FunctionCall,
        FunctionObjectArgs,
    },
};
use async_trait::async_trait;

/// One item of a reasoning response, in the order the model produced it.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputSegment {
    Text(String),
    ToolCall(PendingToolCall),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReasoningResponse {
    pub segments: Vec<OutputSegment>,
}

impl ReasoningResponse {
    pub fn tool_calls(&self) -> Vec<&PendingToolCall> {
        self.segments
            .iter()
            .filter_map(|s| match s {
                OutputSegment::ToolCall(call) => Some(call),
                OutputSegment::Text(_) => None,
            })
            .collect()
    }

    /// All text segments joined in order.
    pub fn text(&self) -> String {
        self.segments
            .iter()
            .filter_map(|s| match s {
                OutputSegment::Text(text) => Some(text.as_str()),
                OutputSegment::ToolCall(_) => None,
            })
            .collect()
    }
}

/// A model that, given the turns so far and the tools it may use, either
/// answers or asks for tool calls.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReasoningClient: Send + Sync {
    /// Makes a single, non-streaming reasoning request. Any transport or
    /// non-success status is an `Err`.
    async fn respond(
        &self,
        turns: Vec<Turn>,
        tools: Vec<ToolDescriptor>,
    ) -> Result<ReasoningResponse>;
}

/// An implementation of `ReasoningClient` for any OpenAI-compatible chat API.
pub struct OpenAIReasoningClient {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAIReasoningClient {
    /// Creates a new client for an OpenAI-compatible service.
    ///
    /// # Arguments
    ///
    /// * `config` - The configuration for the OpenAI client, including API key and base URL.
    /// * `model` - The model used for supervisor reasoning (e.g., "gpt-4.1").
    pub fn new(config: OpenAIConfig, model: String) -> Self {
        Self {
            client: Client::with_config(config),
            model,
        }
    }
}

#[async_trait]
impl ReasoningClient for OpenAIReasoningClient {
    async fn respond(
        &self,
        turns: Vec<Turn>,
        tools: Vec<ToolDescriptor>,
    ) -> Result<ReasoningResponse> {
        let messages = to_request_messages(&turns)?;
        let tools = to_chat_tools(tools)?;

        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(&self.model).messages(messages);
        if !tools.is_empty() {
            args.tools(tools).tool_choice("auto");
        }
        let request = args.build()?;

        let response: CreateChatCompletionResponse = self.client.chat().create(request).await?;
        Ok(from_chat_response(response))
    }
}

fn to_request_messages(turns: &[Turn]) -> Result<Vec<ChatCompletionRequestMessage>> {
    turns
        .iter()
        .map(|turn| {
            let message: ChatCompletionRequestMessage = match turn {
                Turn::Message {
                    role: Role::System,
                    text,
                } => ChatCompletionRequestSystemMessageArgs::default()
                    .content(text.clone())
                    .build()?
                    .into(),
                Turn::Message {
                    role: Role::User,
                    text,
                } => ChatCompletionRequestUserMessageArgs::default()
                    .content(text.clone())
                    .build()?
                    .into(),
                Turn::Message {
                    role: Role::Assistant,
                    text,
                } => ChatCompletionRequestAssistantMessageArgs::default()
                    .content(text.clone())
                    .build()?
                    .into(),
                Turn::ToolCall(call) => ChatCompletionRequestAssistantMessageArgs::default()
                    .tool_calls(vec![ChatCompletionMessageToolCall {
                        id: call.call_id.clone(),
                        r#type: ChatCompletionToolType::Function,
                        function: FunctionCall {
                            name: call.name.clone(),
                            arguments: call.arguments.clone(),
                        },
                    }])
                    .build()?
                    .into(),
                Turn::ToolResult(result) => ChatCompletionRequestToolMessageArgs::default()
                    .tool_call_id(result.call_id.clone())
                    .content(result.output.to_string())
                    .build()?
                    .into(),
            };
            Ok(message)
        })
        .collect()
}

fn to_chat_tools(tools: Vec<ToolDescriptor>) -> Result<Vec<ChatCompletionTool>> {
    tools
        .into_iter()
        .map(|t| {
            Ok(ChatCompletionToolArgs::default()
                .function(
                    FunctionObjectArgs::default()
                        .name(t.name)
                        .description(t.description)
                        .parameters(t.parameters)
                        .build()?,
                )
                .build()?)
        })
        .collect()
}

fn from_chat_response(response: CreateChatCompletionResponse) -> ReasoningResponse {
    let mut segments = Vec::new();
    for choice in response.choices {
        if let Some(content) = choice.message.content.filter(|c| !c.is_empty()) {
            segments.push(OutputSegment::Text(content));
        }
        for call in choice.message.tool_calls.unwrap_or_default() {
            segments.push(OutputSegment::ToolCall(PendingToolCall {
                name: call.function.name,
                arguments: call.function.arguments,
                call_id: call.id,
            }));
        }
    }
    ReasoningResponse { segments }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::ToolResult;
    use serde_json::json;

    #[test]
    fn test_text_concatenates_in_order() {
        let response = ReasoningResponse {
            segments: vec![
                OutputSegment::Text("Your balance ".into()),
                OutputSegment::Text("is $42.".into()),
            ],
        };
        assert_eq!(response.text(), "Your balance is $42.");
        assert!(response.tool_calls().is_empty());
    }

    #[test]
    fn test_request_messages_cover_every_turn_kind() {
        let turns = vec![
            Turn::system("be brief"),
            Turn::user("hi"),
            Turn::ToolCall(PendingToolCall {
                name: "findNearestStore".into(),
                arguments: r#"{"zip_code":"94105"}"#.into(),
                call_id: "call_1".into(),
            }),
            Turn::ToolResult(ToolResult {
                call_id: "call_1".into(),
                output: json!({"name": "Downtown Flagship"}),
            }),
            Turn::assistant("The nearest store is downtown."),
        ];
        let messages = to_request_messages(&turns).unwrap();
        assert_eq!(messages.len(), 5);
        assert!(matches!(messages[0], ChatCompletionRequestMessage::System(_)));
        assert!(matches!(messages[2], ChatCompletionRequestMessage::Assistant(_)));
        assert!(matches!(messages[3], ChatCompletionRequestMessage::Tool(_)));
    }
}
