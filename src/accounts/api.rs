//! HTTP API for the account backend.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tracing::{info, instrument, warn};

use super::backend::{
    Account, AccountBackend, AccountError, Credentials, LeaderboardEntry, MatchReport, MatchSaved,
};

/// Shared handler state.
pub type SharedBackend = Arc<dyn AccountBackend>;

impl IntoResponse for AccountError {
    fn into_response(self) -> Response {
        let status = match &self {
            AccountError::UsernameTaken => StatusCode::CONFLICT,
            AccountError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            AccountError::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
            AccountError::Unavailable { .. } | AccountError::Storage(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let message = match &self {
            AccountError::InvalidRequest { reason } => reason.clone(),
            AccountError::Storage(_) => "Internal storage error".to_string(),
            other => other.to_string(),
        };
        warn!(%status, error = %self, "Account request failed");
        (status, Json(json!({ "message": message }))).into_response()
    }
}

/// Builds the router serving `/api/auth/*`, `/api/matches` and `/api/leaderboard`.
#[instrument(skip(backend))]
pub fn router(backend: SharedBackend) -> Router {
    Router::new()
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .route("/api/matches", post(save_match))
        .route("/api/leaderboard", get(leaderboard))
        .with_state(backend)
}

async fn register(
    State(backend): State<SharedBackend>,
    Json(credentials): Json<Credentials>,
) -> Result<Json<Account>, AccountError> {
    let account = backend.register(credentials).await?;
    info!(player_id = account.player_id(), "Registered via API");
    Ok(Json(account))
}

async fn login(
    State(backend): State<SharedBackend>,
    Json(credentials): Json<Credentials>,
) -> Result<Json<Account>, AccountError> {
    Ok(Json(backend.login(credentials).await?))
}

async fn save_match(
    State(backend): State<SharedBackend>,
    Json(report): Json<MatchReport>,
) -> Result<Json<MatchSaved>, AccountError> {
    Ok(Json(backend.save_match(report).await?))
}

async fn leaderboard(
    State(backend): State<SharedBackend>,
) -> Result<Json<Vec<LeaderboardEntry>>, AccountError> {
    Ok(Json(backend.leaderboard().await?))
}
