use crate::error::PollError;
use crate::startup::AppState;
use axum::{
    extract::{ConnectInfo, Extension, Json},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CastVoteRequest {
    pub option_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct VoteResponse {
    pub success: bool,
    pub message: String,
}

/// Get the current poll with its vote counts
pub async fn get_current_poll(
    Extension(app_state): Extension<AppState>,
) -> Result<impl IntoResponse, PollError> {
    let poll = app_state
        .store
        .current_poll()
        .await
        .inspect_err(|e| warn!("Failed to load poll: {}", e))?
        .ok_or(PollError::PollNotFound)?;

    Ok((StatusCode::OK, Json(poll)))
}

/// Cast a vote, then push the new tally to every live viewer
pub async fn cast_vote(
    Extension(app_state): Extension<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(payload): Json<CastVoteRequest>,
) -> Result<impl IntoResponse, PollError> {
    let option_id = payload
        .option_id
        .filter(|id| !id.is_empty())
        .ok_or(PollError::InvalidRequest)?;
    let option_id = Uuid::parse_str(&option_id).map_err(|_| PollError::OptionNotFound)?;

    let voter = voter_key(&headers, connect_info.map(|ConnectInfo(addr)| addr));

    app_state.store.record_vote(option_id, &voter).await?;
    info!(option = %option_id, "vote recorded");

    // The vote is durable at this point; fan-out problems are only logged
    app_state.broadcaster.broadcast().await;

    let response = VoteResponse {
        success: true,
        message: "Vote recorded".to_string(),
    };
    Ok((StatusCode::OK, Json(response)))
}

pub async fn health(Extension(app_state): Extension<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "connections": app_state.registry.size(),
    }))
}

/// Identity used for the one-vote-per-voter rule: the client address as reported by a
/// proxy, falling back to the socket peer.
pub fn voter_key(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };

    header("x-forwarded-for")
        .or_else(|| header("x-real-ip"))
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "127.0.0.1".to_string())
}
