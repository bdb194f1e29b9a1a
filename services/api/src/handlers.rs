//! Axum Handlers for the HTTP API
//!
//! Serves the embed script and hosted widget page, mints ephemeral session
//! credentials, and proxies survey tool calls. It uses `utoipa` doc comments to
//! generate OpenAPI documentation.

use axum::{
    extract::{Query, State},
    http::{StatusCode, header},
    response::{Html, IntoResponse, Json, Response},
};
use serde_json::Value;
use std::{collections::HashMap, sync::Arc};
use tracing::{error, info, warn};
use voicepulse_core::{
    embed::{ScriptAttributes, WidgetConfig},
    protocol::WidgetQuery,
    tools::SurveyTool,
};

use crate::{
    assets,
    models::{EmbedPreview, ErrorResponse, McpRequest},
    state::AppState,
};

pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    InternalServerError(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(ErrorResponse { message })).into_response()
            }
            ApiError::NotFound(message) => {
                (StatusCode::NOT_FOUND, Json(ErrorResponse { message })).into_response()
            }
            ApiError::InternalServerError(err) => {
                error!("Internal Server Error: {:?}", err);
                let message = "An internal server error occurred.".to_string();
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse { message }),
                )
                    .into_response()
            }
        }
    }
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::InternalServerError(err.into())
    }
}

/// Mint an ephemeral realtime session.
///
/// Returns the provider's session object unchanged; the short-lived key is at
/// `client_secret.value`.
#[utoipa::path(
    get,
    path = "/api/session",
    responses(
        (status = 200, description = "Realtime session created", body = Object),
        (status = 500, description = "Session could not be created", body = ErrorResponse)
    )
)]
pub async fn create_session(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let session = state.credentials.create_session().await?;
    info!("Issued realtime session");
    Ok(Json(session))
}

/// Run a survey tool on the tool server.
///
/// Upstream tool failures come back as `200` with `status: "error"`; only an
/// unknown tool name or malformed parameters are rejected.
#[utoipa::path(
    post,
    path = "/api/mcp",
    request_body = McpRequest,
    responses(
        (status = 200, description = "Tool result with status 'ok' or 'error'", body = Object),
        (status = 400, description = "Unknown tool or invalid parameters", body = ErrorResponse)
    )
)]
pub async fn call_tool(
    State(state): State<Arc<AppState>>,
    Json(request): Json<McpRequest>,
) -> Result<Json<Value>, ApiError> {
    let tool = SurveyTool::from_parts(&request.tool, request.parameters).map_err(|e| {
        warn!(tool = %request.tool, error = %e, "Rejected tool proxy request");
        ApiError::BadRequest(e.to_string())
    })?;
    info!(tool = tool.name(), "Proxying survey tool call");
    Ok(Json(state.survey.call(&tool).await))
}

/// The hosted widget page loaded inside the embed's iframe.
#[utoipa::path(
    get,
    path = "/widget",
    params(
        ("agentConfig" = Option<String>, Query, description = "Agent set key"),
        ("title" = Option<String>, Query, description = "Widget title"),
        ("agentName" = Option<String>, Query, description = "Starting agent within the set")
    ),
    responses(
        (status = 200, description = "Widget page", body = String, content_type = "text/html"),
        (status = 404, description = "Unknown agent set", body = ErrorResponse)
    )
)]
pub async fn widget_page(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Html<String>, ApiError> {
    let query = WidgetQuery::from_params(&params);
    if state.agents.get(&query.agent_config).is_none() {
        return Err(ApiError::NotFound(format!(
            "Unknown agent config '{}'",
            query.agent_config
        )));
    }
    Ok(Html(assets::widget_page(&query)))
}

/// The script a host page includes to install the widget.
#[utoipa::path(
    get,
    path = "/embed.js",
    responses(
        (status = 200, description = "Embed script", body = String, content_type = "application/javascript")
    )
)]
pub async fn embed_script() -> impl IntoResponse {
    (
        [
            (header::CONTENT_TYPE, "application/javascript; charset=utf-8"),
            (header::CACHE_CONTROL, "public, max-age=300"),
        ],
        assets::embed_script(),
    )
}

/// Preview what the embed script would render for the given attributes.
///
/// Query parameters are read as script attributes (`data-` prefix optional);
/// `src` stands in for the script's own URL.
#[utoipa::path(
    get,
    path = "/embed/preview",
    params(
        ("src" = Option<String>, Query, description = "URL the embed script was loaded from"),
        ("host" = Option<String>, Query, description = "Explicit widget host"),
        ("agent-config" = Option<String>, Query, description = "Agent set key"),
        ("position" = Option<String>, Query, description = "bottom-right or bottom-left")
    ),
    responses(
        (status = 200, description = "Computed widget configuration", body = EmbedPreview)
    )
)]
pub async fn embed_preview(Query(params): Query<HashMap<String, String>>) -> Json<EmbedPreview> {
    let attrs = ScriptAttributes::from_pairs(
        params.get("src").map(String::as_str),
        params
            .iter()
            .filter(|(name, _)| name.as_str() != "src")
            .map(|(name, value)| (name.as_str(), value.as_str())),
    );
    let config = WidgetConfig::from_attributes(&attrs);
    Json(EmbedPreview::from(&config))
}
