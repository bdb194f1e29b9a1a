//! Client for the survey tool server.
//!
//! The tool server exposes each tool as `POST /tools/{name}` taking the tool
//! parameters as a JSON body and answering with `{"status": "success" | "error", ..}`.
//! Results are normalized to the `/api/mcp` contract (`"ok"` | `"error"`), and
//! every failure is folded into an error result rather than returned as `Err`.

use crate::tools::{SurveyTool, ToolError};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{error, instrument};

/// Anything that can run a survey tool call.
#[async_trait]
pub trait SurveyBackend: Send + Sync {
    /// Runs the tool. Errors are reported inside the returned object.
    async fn call(&self, tool: &SurveyTool) -> Value;
}

pub struct McpHttpClient {
    http: reqwest::Client,
    base_url: String,
}

impl McpHttpClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_default();
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn endpoint(&self, tool: &SurveyTool) -> String {
        format!("{}/tools/{}", self.base_url, tool.name())
    }

    #[instrument(skip_all, fields(tool = tool.name()))]
    pub async fn try_call(&self, tool: &SurveyTool) -> Result<Value, ToolError> {
        let response = self
            .http
            .post(self.endpoint(tool))
            .json(&tool.parameters())
            .send()
            .await
            .map_err(|e| ToolError::Backend(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ToolError::Backend(format!("tool server returned {status}")));
        }
        let body: Value = response
            .json()
            .await
            .map_err(|e| ToolError::Backend(e.to_string()))?;
        Ok(normalize_response(body))
    }
}

#[async_trait]
impl SurveyBackend for McpHttpClient {
    async fn call(&self, tool: &SurveyTool) -> Value {
        match self.try_call(tool).await {
            Ok(value) => value,
            Err(e) => {
                error!(tool = tool.name(), error = %e, "Survey tool call failed");
                e.to_output()
            }
        }
    }
}

/// Maps an upstream tool-server body onto `{"status": "ok" | "error", ..fields}`.
pub fn normalize_response(body: Value) -> Value {
    let Value::Object(mut fields) = body else {
        return json!({ "status": "error", "message": "Tool server returned a non-object body." });
    };
    let status = match fields.get("status").and_then(Value::as_str) {
        Some("error") => "error",
        _ => "ok",
    };
    fields.insert("status".to_string(), json!(status));
    Value::Object(fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::SheetArgs;

    #[test]
    fn test_normalize_success_becomes_ok() {
        let out = normalize_response(json!({"status": "success", "total_questions": 3}));
        assert_eq!(out, json!({"status": "ok", "total_questions": 3}));
    }

    #[test]
    fn test_normalize_keeps_error() {
        let out = normalize_response(json!({"status": "error", "message": "No questions"}));
        assert_eq!(out["status"], json!("error"));
        assert_eq!(out["message"], json!("No questions"));
    }

    #[test]
    fn test_normalize_non_object() {
        assert_eq!(normalize_response(json!([1, 2]))["status"], json!("error"));
    }

    #[test]
    fn test_endpoint_trims_base() {
        let client = McpHttpClient::new("http://localhost:8085/");
        let tool = SurveyTool::GetAllResponses(SheetArgs {
            sheet_name: "Sheet1".into(),
        });
        assert_eq!(
            client.endpoint(&tool),
            "http://localhost:8085/tools/get_all_responses"
        );
    }

    #[tokio::test]
    async fn test_unreachable_server_is_an_error_result() {
        let client = McpHttpClient::new("http://127.0.0.1:9");
        let tool = SurveyTool::FetchQuestions(SheetArgs {
            sheet_name: "Sheet1".into(),
        });
        let out = client.call(&tool).await;
        assert_eq!(out["status"], json!("error"));
    }
}
