//! API Models
//!
//! Request and response bodies for the HTTP API, annotated for OpenAPI
//! generation with `utoipa`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use voicepulse_core::embed::WidgetConfig;

/// Body of `POST /api/mcp`.
#[derive(Deserialize, Serialize, ToSchema, Debug, Clone)]
pub struct McpRequest {
    #[schema(example = "fetch_questions")]
    pub tool: String,
    #[serde(default)]
    #[schema(value_type = Object, example = json!({"sheet_name": "Sheet1"}))]
    pub parameters: Value,
}

/// What the embed script would render for a given set of script attributes.
#[derive(Serialize, ToSchema, Debug, Clone, PartialEq)]
pub struct EmbedPreview {
    #[schema(example = "https://widget.example.com/widget?agentConfig=chatSupervisor&title=Voice+Assistant")]
    pub frame_url: String,
    pub position: String,
    pub inline: bool,
    pub button_label: String,
    pub container_style: String,
    pub launcher_style: String,
    pub panel_style: String,
}

impl From<&WidgetConfig> for EmbedPreview {
    fn from(config: &WidgetConfig) -> Self {
        let layout = config.layout();
        Self {
            frame_url: config.frame_url(),
            position: config.position.as_str().to_string(),
            inline: config.inline,
            button_label: config.button_label.clone(),
            container_style: layout.container,
            launcher_style: layout.launcher,
            panel_style: layout.panel,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use voicepulse_core::embed::ScriptAttributes;

    #[test]
    fn test_mcp_request_parameters_default_to_null() {
        let request: McpRequest = serde_json::from_str(r#"{"tool": "get_all_responses"}"#).unwrap();
        assert_eq!(request.tool, "get_all_responses");
        assert!(request.parameters.is_null());
    }

    #[test]
    fn test_mcp_request_missing_tool() {
        let result: Result<McpRequest, _> = serde_json::from_value(json!({"parameters": {}}));
        assert!(result.is_err());
    }

    #[test]
    fn test_embed_preview_from_config() {
        let attrs = ScriptAttributes::from_pairs(
            Some("https://widget.example.com/embed.js"),
            [("data-position", "bottom-left"), ("data-button-label", "Help")],
        );
        let preview = EmbedPreview::from(&WidgetConfig::from_attributes(&attrs));

        assert!(preview.frame_url.starts_with("https://widget.example.com/widget?"));
        assert_eq!(preview.position, "bottom-left");
        assert_eq!(preview.button_label, "Help");
        assert!(!preview.inline);
        assert!(preview.panel_style.contains("left"));
    }

    #[test]
    fn test_error_response_serialization() {
        let error = ErrorResponse {
            message: "Unknown tool".to_string(),
        };
        let json = serde_json::to_string(&error).unwrap();
        assert_eq!(json, r#"{"message":"Unknown tool"}"#);
    }
}
