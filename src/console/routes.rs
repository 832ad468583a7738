//! REST endpoints for the console page: organization switcher, gate status
//! and the onboarding dialog's actions.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tracing::warn;

use crate::error::{Error, StoreError};

use super::session::{ConsoleSession, ConsoleStatus};

/// Shared state for console routes.
#[derive(Clone)]
pub struct ConsoleRouteState {
    pub session: Arc<ConsoleSession>,
}

/// Error response wrapper mapping the error taxonomy onto status codes.
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind) = match &self.0 {
            Error::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "validation"),
            Error::Service(_) => (StatusCode::BAD_GATEWAY, "service"),
            Error::Store(StoreError::NotFound { .. }) => (StatusCode::NOT_FOUND, "not_found"),
            Error::Store(_) => (StatusCode::SERVICE_UNAVAILABLE, "store"),
            Error::Wizard(_) => (StatusCode::CONFLICT, "wizard"),
            Error::InconsistentState(_) => (StatusCode::INTERNAL_SERVER_ERROR, "inconsistent_state"),
            Error::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config"),
        };
        if status.is_server_error() {
            warn!(error = %self.0, "Console request failed");
        }
        (
            status,
            Json(serde_json::json!({"error": self.0.to_string(), "kind": kind})),
        )
            .into_response()
    }
}

/// An action's own result plus the page state after it.
#[derive(Serialize)]
struct ActionResponse<T: Serialize> {
    result: T,
    status: ConsoleStatus,
}

async fn respond<T: Serialize>(
    session: &ConsoleSession,
    result: T,
) -> Json<ActionResponse<T>> {
    Json(ActionResponse {
        result,
        status: session.status().await,
    })
}

#[derive(Deserialize)]
struct SelectRequest {
    organization_id: String,
}

#[derive(Deserialize, Default)]
struct OpenRequest {
    #[serde(default)]
    step: Option<usize>,
}

#[derive(Deserialize)]
struct NameRequest {
    name: String,
}

#[derive(Deserialize, Default)]
struct PurchaseRequest {
    #[serde(default)]
    plan_id: Option<String>,
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "fleet-console"
    }))
}

/// GET /api/console/status
async fn get_status(State(state): State<ConsoleRouteState>) -> impl IntoResponse {
    Json(state.session.status().await)
}

/// GET /api/console/organizations
async fn list_organizations(State(state): State<ConsoleRouteState>) -> impl IntoResponse {
    Json(state.session.organizations().await)
}

/// POST /api/console/organizations/select
async fn select_organization(
    State(state): State<ConsoleRouteState>,
    Json(req): Json<SelectRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let gate = state.session.select_organization(&req.organization_id).await?;
    Ok(respond(&state.session, gate).await)
}

/// POST /api/console/wizard/open
async fn open_wizard(
    State(state): State<ConsoleRouteState>,
    Json(req): Json<OpenRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let gate = state.session.open_wizard(req.step).await?;
    Ok(respond(&state.session, gate).await)
}

/// POST /api/console/wizard/close
async fn close_wizard(State(state): State<ConsoleRouteState>) -> Result<impl IntoResponse, ApiError> {
    let outcome = state.session.close_wizard().await?;
    Ok(respond(&state.session, outcome).await)
}

/// PUT /api/console/wizard/name
///
/// Returns whether the name step is now valid.
async fn set_name(
    State(state): State<ConsoleRouteState>,
    Json(req): Json<NameRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let valid = state.session.set_organization_name(&req.name).await?;
    Ok(respond(&state.session, valid).await)
}

/// POST /api/console/wizard/next
async fn next_step(State(state): State<ConsoleRouteState>) -> Result<impl IntoResponse, ApiError> {
    let step = state.session.next_step().await?;
    Ok(respond(&state.session, step).await)
}

/// POST /api/console/wizard/previous
async fn previous_step(
    State(state): State<ConsoleRouteState>,
) -> Result<impl IntoResponse, ApiError> {
    let step = state.session.previous_step().await?;
    Ok(respond(&state.session, step).await)
}

/// POST /api/console/wizard/purchase
async fn purchase_plan(
    State(state): State<ConsoleRouteState>,
    Json(req): Json<PurchaseRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let step = state.session.purchase_plan(req.plan_id.as_deref()).await?;
    Ok(respond(&state.session, step).await)
}

/// POST /api/console/wizard/complete
async fn complete_wizard(
    State(state): State<ConsoleRouteState>,
) -> Result<impl IntoResponse, ApiError> {
    let info = state.session.complete_wizard().await?;
    Ok(respond(&state.session, info).await)
}

/// Build the console REST routes.
pub fn console_routes(session: Arc<ConsoleSession>) -> Router {
    let state = ConsoleRouteState { session };

    Router::new()
        .route("/health", get(health))
        .route("/api/console/status", get(get_status))
        .route("/api/console/organizations", get(list_organizations))
        .route("/api/console/organizations/select", post(select_organization))
        .route("/api/console/wizard/open", post(open_wizard))
        .route("/api/console/wizard/close", post(close_wizard))
        .route("/api/console/wizard/name", put(set_name))
        .route("/api/console/wizard/next", post(next_step))
        .route("/api/console/wizard/previous", post(previous_step))
        .route("/api/console/wizard/purchase", post(purchase_plan))
        .route("/api/console/wizard/complete", post(complete_wizard))
        .layer(ServiceBuilder::new().layer(CorsLayer::permissive()))
        .with_state(state)
}
