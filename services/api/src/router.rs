//! Axum Router Configuration
//!
//! This module defines the complete HTTP routing for the application,
//! including the embed assets, the REST API, the widget WebSocket endpoint, and
//! OpenAPI documentation.

use crate::{
    handlers,
    models::{EmbedPreview, ErrorResponse, McpRequest},
    state::AppState,
    ws::ws_handler,
};

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::create_session,
        handlers::call_tool,
        handlers::widget_page,
        handlers::embed_script,
        handlers::embed_preview,
    ),
    components(
        schemas(McpRequest, EmbedPreview, ErrorResponse)
    ),
    tags(
        (name = "VoicePulse API", description = "Embeddable voice widget host, credentials and tool proxy")
    )
)]
pub struct ApiDoc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    // Group all routes that require AppState into their own router.
    let api_router = Router::new()
        .route("/api/session", get(handlers::create_session))
        .route("/api/mcp", post(handlers::call_tool))
        .route("/widget", get(handlers::widget_page))
        .route("/widget/ws", get(ws_handler))
        // Apply the state ONLY to this group of routes.
        .with_state(app_state);

    let embed_router = Router::new()
        .route("/embed.js", get(handlers::embed_script))
        .route("/embed/preview", get(handlers::embed_preview));

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(embed_router)
        .merge(api_router)
        .layer(TraceLayer::new_for_http())
}
