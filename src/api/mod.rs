//! HTTP configuration interface
//!
//! Serves the configuration page (`/index.html`, `POST /set`) and a JSON API
//! for the same read/update operations. All handlers talk to the controller
//! through its [`ControllerHandle`]. Paths no route handles are served from
//! the static directory, if one is set.

pub mod template;

use crate::button::{ButtonId, ButtonUpdate, ButtonView};
use crate::controller::{ControllerHandle, UpdateReport};
use anyhow::{Context, Result};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde::Serialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::services::ServeDir;
use tracing::{info, warn};

/// Shared state for API handlers
pub struct ApiState {
    pub controller: ControllerHandle,
    /// Page template with `{{BUTTON_n_...}}` placeholders
    pub template: String,
    /// Assets referenced by the page
    pub static_dir: Option<PathBuf>,
}

impl ApiState {
    pub fn new(controller: ControllerHandle, page: Option<String>) -> Self {
        Self {
            controller,
            template: page.unwrap_or_else(|| template::DEFAULT_TEMPLATE.to_string()),
            static_dir: None,
        }
    }

    pub fn with_static_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.static_dir = Some(dir.into());
        self
    }
}

/// API error response
#[derive(Debug, Serialize)]
struct ApiError {
    #[serde(skip)]
    status: StatusCode,
    error: String,
}

impl ApiError {
    fn unavailable() -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            error: "controller is not running".to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

fn parse_button(id: u8) -> Result<ButtonId, ApiError> {
    ButtonId::new(id).map_err(|e| ApiError {
        status: StatusCode::NOT_FOUND,
        error: e.to_string(),
    })
}

/// Build the API router
pub fn build_router(state: Arc<ApiState>) -> Router {
    let static_dir = state.static_dir.clone();

    let router = Router::new()
        .route("/", get(|| async { Redirect::to("/index.html") }))
        .route("/index.html", get(index_page))
        .route("/set", post(submit_form))
        .route("/api/buttons", get(list_buttons))
        .route("/api/buttons/:id", get(get_button).put(update_button))
        .route("/api/health", get(health_check))
        .with_state(state);

    match static_dir {
        Some(dir) => {
            info!("Serving page assets from {}", dir.display());
            router.fallback_service(ServeDir::new(dir))
        }
        None => router,
    }
}

/// GET /index.html - Configuration page filled with the current values
async fn index_page(State(state): State<Arc<ApiState>>) -> Html<String> {
    let views = state.controller.views().await;
    Html(template::render(&state.template, &views))
}

/// POST /set - Apply the whole form, then show the page again
async fn submit_form(
    State(state): State<Arc<ApiState>>,
    Form(form): Form<HashMap<String, String>>,
) -> Result<Redirect, ApiError> {
    let updates = template::updates_from_form(&form);
    let reports = state
        .controller
        .update_many(updates)
        .await
        .ok_or_else(ApiError::unavailable)?;

    for report in &reports {
        for d in &report.diagnostics {
            warn!("Button {} {}: {}", report.view.button, d.list, d.message);
        }
    }
    info!("Configuration form applied");

    Ok(Redirect::to("/index.html"))
}

/// GET /api/buttons - Read view of every button
async fn list_buttons(State(state): State<Arc<ApiState>>) -> Json<Vec<ButtonView>> {
    Json(state.controller.views().await)
}

/// GET /api/buttons/:id - Read view of one button
async fn get_button(
    Path(id): Path<u8>,
    State(state): State<Arc<ApiState>>,
) -> Result<Json<ButtonView>, ApiError> {
    let button = parse_button(id)?;
    state
        .controller
        .view(button)
        .await
        .map(Json)
        .ok_or_else(ApiError::unavailable)
}

/// PUT /api/buttons/:id - Replace one button's configuration
async fn update_button(
    Path(id): Path<u8>,
    State(state): State<Arc<ApiState>>,
    Json(update): Json<ButtonUpdate>,
) -> Result<Json<UpdateReport>, ApiError> {
    let button = parse_button(id)?;
    state
        .controller
        .update(button, update)
        .await
        .map(Json)
        .ok_or_else(ApiError::unavailable)
}

/// GET /api/health - Health check endpoint
async fn health_check() -> &'static str {
    "ok"
}

/// Start the configuration server
pub async fn start_server(state: Arc<ApiState>, bind: &str, port: u16) -> Result<()> {
    let router = build_router(state);

    let addr: SocketAddr = format!("{}:{}", bind, port)
        .parse()
        .with_context(|| format!("Invalid bind address: {}:{}", bind, port))?;
    info!("Starting configuration server on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind configuration server on {}", addr))?;

    axum::serve(listener, router)
        .await
        .context("Configuration server error")?;

    Ok(())
}
