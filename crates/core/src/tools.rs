//! Tool catalog and typed dispatch.
//!
//! Models request tools by name with JSON arguments. Every name is resolved
//! once into a [`ToolRequest`] variant carrying typed arguments; names nobody
//! registered resolve to [`ToolRequest::UnknownTool`] instead of being guessed at.

use crate::mcp_client::SurveyBackend;
use fuzzy_matcher::{FuzzyMatcher, skim::SkimMatcherV2};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{info, warn};

pub const SUPERVISOR_TOOL: &str = "getNextResponseFromSupervisor";
pub const LOOKUP_POLICY_TOOL: &str = "lookupPolicyDocument";
pub const ACCOUNT_INFO_TOOL: &str = "getUserAccountInfo";
pub const NEAREST_STORE_TOOL: &str = "findNearestStore";
pub const HANDOFF_PREFIX: &str = "transfer_to_";

/// Placeholder returned for tools nobody implements, so the turn can continue.
pub fn unknown_tool_output() -> Value {
    json!({ "result": true })
}

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("invalid arguments for '{tool}': {reason}")]
    InvalidArguments { tool: String, reason: String },
    #[error("unknown survey tool '{0}'")]
    UnknownSurveyTool(String),
    #[error("tool backend failed: {0}")]
    Backend(String),
}

impl ToolError {
    /// The structured result handed back to the model instead of failing the turn.
    pub fn to_output(&self) -> Value {
        json!({ "status": "error", "message": self.to_string() })
    }
}

// --- Argument types ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SupervisorArgs {
    /// Key information from the user's most recent message.
    #[serde(rename = "relevantContextFromLastUserMessage", default)]
    pub relevant_context: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LookupPolicyArgs {
    /// The topic or keyword to search for in company policies.
    pub topic: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AccountInfoArgs {
    /// The user's phone number, formatted as '(xxx) xxx-xxxx'.
    pub phone_number: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct NearestStoreArgs {
    /// The customer's 5-digit zip code.
    pub zip_code: String,
}

fn default_sheet() -> String {
    "Sheet1".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SheetArgs {
    /// Name of the sheet tab.
    #[serde(default = "default_sheet")]
    pub sheet_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SaveResponseArgs {
    /// The question id, e.g. "Q1".
    pub question_id: String,
    /// The user's answer.
    pub response: String,
    #[serde(default = "default_sheet")]
    pub sheet_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ClearResponsesArgs {
    #[serde(default = "default_sheet")]
    pub sheet_name: String,
    /// Must be true to actually clear anything.
    #[serde(default)]
    pub confirm: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct UpdateSheetArgs {
    pub new_sheet_id: String,
}

/// Tools served by the survey tool server behind `/api/mcp`.
///
/// Serializes to the proxy body `{"tool": .., "parameters": {..}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "tool", content = "parameters", rename_all = "snake_case")]
pub enum SurveyTool {
    FetchQuestions(SheetArgs),
    SaveResponse(SaveResponseArgs),
    GetAllResponses(SheetArgs),
    ClearAllResponses(ClearResponsesArgs),
    UpdateSheetId(UpdateSheetArgs),
}

impl SurveyTool {
    pub const NAMES: [&'static str; 5] = [
        "fetch_questions",
        "save_response",
        "get_all_responses",
        "clear_all_responses",
        "update_sheet_id",
    ];

    /// Builds a typed survey call from a tool name and its parameters.
    pub fn from_parts(tool: &str, parameters: Value) -> Result<Self, ToolError> {
        if !Self::NAMES.contains(&tool) {
            return Err(ToolError::UnknownSurveyTool(tool.to_string()));
        }
        let parameters = if parameters.is_null() {
            json!({})
        } else {
            parameters
        };
        serde_json::from_value(json!({ "tool": tool, "parameters": parameters })).map_err(|e| {
            ToolError::InvalidArguments {
                tool: tool.to_string(),
                reason: e.to_string(),
            }
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::FetchQuestions(_) => "fetch_questions",
            Self::SaveResponse(_) => "save_response",
            Self::GetAllResponses(_) => "get_all_responses",
            Self::ClearAllResponses(_) => "clear_all_responses",
            Self::UpdateSheetId(_) => "update_sheet_id",
        }
    }

    pub fn parameters(&self) -> Value {
        let value = match self {
            Self::FetchQuestions(args) | Self::GetAllResponses(args) => serde_json::to_value(args),
            Self::SaveResponse(args) => serde_json::to_value(args),
            Self::ClearAllResponses(args) => serde_json::to_value(args),
            Self::UpdateSheetId(args) => serde_json::to_value(args),
        };
        value.unwrap_or_else(|_| json!({}))
    }
}

/// A resolved tool call.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolRequest {
    Supervisor(SupervisorArgs),
    LookupPolicyDocument(LookupPolicyArgs),
    GetUserAccountInfo(AccountInfoArgs),
    FindNearestStore(NearestStoreArgs),
    Survey(SurveyTool),
    Handoff { target: String },
    UnknownTool { name: String, arguments: Value },
}

impl ToolRequest {
    pub fn parse(name: &str, arguments: &str) -> Result<Self, ToolError> {
        let invalid = |e: serde_json::Error| ToolError::InvalidArguments {
            tool: name.to_string(),
            reason: e.to_string(),
        };
        let args: Value = if arguments.trim().is_empty() {
            json!({})
        } else {
            serde_json::from_str(arguments).map_err(invalid)?
        };

        Ok(match name {
            SUPERVISOR_TOOL => Self::Supervisor(serde_json::from_value(args).map_err(invalid)?),
            LOOKUP_POLICY_TOOL => {
                Self::LookupPolicyDocument(serde_json::from_value(args).map_err(invalid)?)
            }
            ACCOUNT_INFO_TOOL => {
                Self::GetUserAccountInfo(serde_json::from_value(args).map_err(invalid)?)
            }
            NEAREST_STORE_TOOL => {
                Self::FindNearestStore(serde_json::from_value(args).map_err(invalid)?)
            }
            n if SurveyTool::NAMES.contains(&n) => Self::Survey(SurveyTool::from_parts(n, args)?),
            n if n.starts_with(HANDOFF_PREFIX) && n.len() > HANDOFF_PREFIX.len() => {
                Self::Handoff {
                    target: n[HANDOFF_PREFIX.len()..].to_string(),
                }
            }
            _ => Self::UnknownTool {
                name: name.to_string(),
                arguments: args,
            },
        })
    }
}

// --- Descriptors ---

/// What a model is told about a tool.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

fn schema_of<T: JsonSchema>() -> Value {
    let mut schema = serde_json::to_value(schemars::schema_for!(T)).unwrap_or_else(|_| json!({}));
    if let Some(obj) = schema.as_object_mut() {
        obj.remove("$schema");
        obj.remove("title");
        obj.entry("type").or_insert_with(|| json!("object"));
    }
    schema
}

fn describe<T: JsonSchema>(name: &str, description: &str) -> ToolDescriptor {
    ToolDescriptor {
        name: name.to_string(),
        description: description.to_string(),
        parameters: schema_of::<T>(),
    }
}

/// Looks up the descriptor of a catalog tool by name.
pub fn descriptor_for(name: &str) -> Option<ToolDescriptor> {
    let descriptor = match name {
        SUPERVISOR_TOOL => describe::<SupervisorArgs>(
            name,
            "Determines the next response whenever the agent faces a non-trivial decision. \
             Returns a message describing what to say next.",
        ),
        LOOKUP_POLICY_TOOL => describe::<LookupPolicyArgs>(
            name,
            "Look up internal documents and policies by topic or keyword.",
        ),
        ACCOUNT_INFO_TOOL => describe::<AccountInfoArgs>(
            name,
            "Get user account and billing information (read-only).",
        ),
        NEAREST_STORE_TOOL => describe::<NearestStoreArgs>(
            name,
            "Find the nearest store location given a customer's zip code.",
        ),
        "fetch_questions" => describe::<SheetArgs>(name, "Fetch the master survey questions."),
        "save_response" => describe::<SaveResponseArgs>(
            name,
            "Save the user's answer to a survey question. Always appends a new row.",
        ),
        "get_all_responses" => describe::<SheetArgs>(name, "Retrieve all collected responses."),
        "clear_all_responses" => describe::<ClearResponsesArgs>(
            name,
            "Clear all response rows, keeping the master questions.",
        ),
        "update_sheet_id" => describe::<UpdateSheetArgs>(name, "Switch to a different sheet."),
        _ => return None,
    };
    Some(descriptor)
}

pub fn handoff_descriptor(target: &str, description: &str) -> ToolDescriptor {
    ToolDescriptor {
        name: format!("{HANDOFF_PREFIX}{target}"),
        description: format!("Transfer the conversation to {target}. {description}"),
        parameters: json!({ "type": "object", "properties": {}, "required": [] }),
    }
}

// --- Execution ---

struct PolicyDocument {
    id: &'static str,
    name: &'static str,
    topic: &'static str,
    content: &'static str,
}

const POLICY_DOCUMENTS: &[PolicyDocument] = &[
    PolicyDocument {
        id: "ID-010",
        name: "Family Plan Policy",
        topic: "family plan options",
        content: "The family plan allows up to 5 lines per account. All lines share a \
                  single data pool. Each additional line after the first receives a 10% discount.",
    },
    PolicyDocument {
        id: "ID-020",
        name: "Promotions and Discounts Policy",
        topic: "promotions and discounts",
        content: "Promotions run for a limited time and cannot be combined. \
                  Discounts apply to the next billing cycle.",
    },
    PolicyDocument {
        id: "ID-030",
        name: "International Plans Policy",
        topic: "international plans roaming",
        content: "International add-ons cover calls, texts and data in over 100 countries. \
                  Roaming without an add-on is billed per day.",
    },
    PolicyDocument {
        id: "ID-040",
        name: "Handset Offers Policy",
        topic: "new phones handsets upgrade",
        content: "Customers are eligible for an upgrade after 24 months. \
                  Trade-in credit is applied over the remaining installments.",
    },
    PolicyDocument {
        id: "ID-050",
        name: "Returns and Refunds Policy",
        topic: "returns refunds cancellation",
        content: "Devices can be returned within 14 days in original condition. \
                  Refunds are issued to the original payment method.",
    },
];

struct Store {
    name: &'static str,
    zip: u32,
    address: &'static str,
    hours: &'static str,
}

const STORES: &[Store] = &[
    Store {
        name: "Downtown Flagship",
        zip: 94105,
        address: "1 Market St, San Francisco, CA",
        hours: "Mon-Sat 9am-8pm, Sun 10am-6pm",
    },
    Store {
        name: "Midtown Store",
        zip: 10018,
        address: "500 7th Ave, New York, NY",
        hours: "Mon-Sun 9am-9pm",
    },
    Store {
        name: "Lakeshore Store",
        zip: 60611,
        address: "400 N Michigan Ave, Chicago, IL",
        hours: "Mon-Sat 10am-7pm",
    },
];

/// Executes resolved tool calls. Never fails: errors come back as structured
/// results so the model can react to them.
pub struct ToolExecutor {
    survey: Arc<dyn SurveyBackend>,
}

impl ToolExecutor {
    pub fn new(survey: Arc<dyn SurveyBackend>) -> Self {
        Self { survey }
    }

    pub async fn execute(&self, request: &ToolRequest) -> Value {
        match request {
            ToolRequest::LookupPolicyDocument(args) => lookup_policy(&args.topic),
            ToolRequest::GetUserAccountInfo(args) => account_info(&args.phone_number),
            ToolRequest::FindNearestStore(args) => nearest_store(&args.zip_code),
            ToolRequest::Survey(tool) => {
                info!(tool = tool.name(), "Calling survey backend");
                self.survey.call(tool).await
            }
            ToolRequest::Supervisor(_) | ToolRequest::Handoff { .. } => json!({
                "status": "error",
                "message": "This tool is not available in this context.",
            }),
            ToolRequest::UnknownTool { name, .. } => {
                warn!(tool = %name, "Model requested an unknown tool");
                unknown_tool_output()
            }
        }
    }

    /// Resolves and executes in one step; argument errors become error results.
    pub async fn execute_call(&self, name: &str, arguments: &str) -> Value {
        match ToolRequest::parse(name, arguments) {
            Ok(request) => self.execute(&request).await,
            Err(e) => {
                warn!(tool = %name, error = %e, "Rejected tool call arguments");
                e.to_output()
            }
        }
    }
}

fn lookup_policy(topic: &str) -> Value {
    let matcher = SkimMatcherV2::default();
    let mut scored: Vec<(i64, &PolicyDocument)> = POLICY_DOCUMENTS
        .iter()
        .filter_map(|doc| {
            let haystack = format!("{} {}", doc.name, doc.topic);
            topic
                .split_whitespace()
                .filter_map(|word| matcher.fuzzy_match(&haystack, word))
                .max()
                .map(|score| (score, doc))
        })
        .collect();
    scored.sort_by(|a, b| b.0.cmp(&a.0));

    let documents: Vec<Value> = scored
        .into_iter()
        .take(3)
        .map(|(_, doc)| {
            json!({ "id": doc.id, "name": doc.name, "topic": doc.topic, "content": doc.content })
        })
        .collect();
    json!({ "topic": topic, "documents": documents })
}

fn account_info(phone_number: &str) -> Value {
    let digits: String = phone_number.chars().filter(char::is_ascii_digit).collect();
    if digits.len() < 10 {
        return json!({ "status": "error", "message": "Phone number must have 10 digits." });
    }
    json!({
        "account_id": "NT-123456",
        "name": "Alex Johnson",
        "phone_number": phone_number,
        "plan": "Unlimited Plus",
        "balance_due": "$42.17",
        "last_payment_date": "2024-05-15",
        "payment_status": "Paid",
    })
}

fn nearest_store(zip_code: &str) -> Value {
    let Ok(zip) = zip_code.trim().parse::<u32>() else {
        return json!({ "status": "error", "message": "Zip code must be numeric." });
    };
    // Closest by numeric distance is close enough for sample data.
    match STORES.iter().min_by_key(|s| s.zip.abs_diff(zip)) {
        Some(store) => json!({
            "name": store.name,
            "address": store.address,
            "zip_code": format!("{:05}", store.zip),
            "hours": store.hours,
        }),
        None => json!({ "status": "error", "message": "No stores available." }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSurvey {
        calls: Mutex<Vec<SurveyTool>>,
    }

    #[async_trait]
    impl SurveyBackend for RecordingSurvey {
        async fn call(&self, tool: &SurveyTool) -> Value {
            self.calls.lock().unwrap().push(tool.clone());
            json!({ "status": "ok", "tool": tool.name() })
        }
    }

    #[test]
    fn test_parse_known_tools() {
        let req = ToolRequest::parse(LOOKUP_POLICY_TOOL, r#"{"topic":"family plan"}"#).unwrap();
        assert_eq!(
            req,
            ToolRequest::LookupPolicyDocument(LookupPolicyArgs {
                topic: "family plan".into()
            })
        );

        let req = ToolRequest::parse(
            SUPERVISOR_TOOL,
            r#"{"relevantContextFromLastUserMessage":"wants to cancel"}"#,
        )
        .unwrap();
        assert_eq!(
            req,
            ToolRequest::Supervisor(SupervisorArgs {
                relevant_context: "wants to cancel".into()
            })
        );
    }

    #[test]
    fn test_parse_survey_tool_applies_defaults() {
        let req = ToolRequest::parse("save_response", r#"{"question_id":"Q1","response":"Great"}"#)
            .unwrap();
        let ToolRequest::Survey(tool) = req else {
            panic!("expected survey tool");
        };
        assert_eq!(
            tool.parameters(),
            json!({"question_id": "Q1", "response": "Great", "sheet_name": "Sheet1"})
        );
        assert_eq!(
            serde_json::to_value(&tool).unwrap()["tool"],
            json!("save_response")
        );
    }

    #[test]
    fn test_parse_handoff_and_unknown() {
        assert_eq!(
            ToolRequest::parse("transfer_to_haikuWriter", "").unwrap(),
            ToolRequest::Handoff {
                target: "haikuWriter".into()
            }
        );
        assert!(matches!(
            ToolRequest::parse("transfer_to_", "{}").unwrap(),
            ToolRequest::UnknownTool { .. }
        ));
        assert!(matches!(
            ToolRequest::parse("launch_rockets", r#"{"count":3}"#).unwrap(),
            ToolRequest::UnknownTool { .. }
        ));
    }

    #[test]
    fn test_parse_rejects_bad_arguments() {
        let err = ToolRequest::parse(NEAREST_STORE_TOOL, "{not json").unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments { .. }));
        let err = ToolRequest::parse(NEAREST_STORE_TOOL, r#"{"zip":"1"}"#).unwrap_err();
        assert_eq!(err.to_output()["status"], json!("error"));
    }

    #[test]
    fn test_descriptors_have_object_schemas() {
        for name in [SUPERVISOR_TOOL, LOOKUP_POLICY_TOOL, "save_response"] {
            let descriptor = descriptor_for(name).unwrap();
            assert_eq!(descriptor.parameters["type"], json!("object"));
            assert!(descriptor.parameters.get("$schema").is_none());
        }
        assert!(descriptor_for("nope").is_none());
        assert_eq!(
            handoff_descriptor("returns", "Handles returns.").name,
            "transfer_to_returns"
        );
    }

    #[tokio::test]
    async fn test_execute_local_tools() {
        let executor = ToolExecutor::new(Arc::new(RecordingSurvey::default()));

        let out = executor
            .execute_call(LOOKUP_POLICY_TOOL, r#"{"topic":"refunds"}"#)
            .await;
        assert_eq!(out["documents"][0]["id"], json!("ID-050"));

        let out = executor
            .execute_call(NEAREST_STORE_TOOL, r#"{"zip_code":"10001"}"#)
            .await;
        assert_eq!(out["name"], json!("Midtown Store"));

        let out = executor
            .execute_call(ACCOUNT_INFO_TOOL, r#"{"phone_number":"123"}"#)
            .await;
        assert_eq!(out["status"], json!("error"));
    }

    #[tokio::test]
    async fn test_execute_unknown_tool_returns_placeholder() {
        let executor = ToolExecutor::new(Arc::new(RecordingSurvey::default()));
        let out = executor.execute_call("doesNotExist", "{}").await;
        assert_eq!(out, unknown_tool_output());
    }

    #[tokio::test]
    async fn test_execute_survey_goes_to_backend() {
        let survey = Arc::new(RecordingSurvey::default());
        let executor = ToolExecutor::new(survey.clone());
        let out = executor.execute_call("fetch_questions", "{}").await;

        assert_eq!(out["status"], json!("ok"));
        assert_eq!(
            survey.calls.lock().unwrap().as_slice(),
            &[SurveyTool::FetchQuestions(SheetArgs {
                sheet_name: "Sheet1".into()
            })]
        );
    }
}
