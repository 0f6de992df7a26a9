use super::ErrorResponse;
use crate::state;
use crate::store::OpenResult;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;

#[derive(Deserialize)]
pub(crate) struct TrackOpenRequest {
    #[serde(rename = "initData")]
    pub(crate) init_data: String,
}

#[derive(Serialize)]
pub(crate) struct TrackOpenResponse {
    pub(crate) success: bool,
    pub(crate) session: OpenResult,
}

pub(crate) async fn track_open(
    State(state): State<state::AppState>,
    Json(request): Json<TrackOpenRequest>,
) -> Result<Json<TrackOpenResponse>, (StatusCode, Json<ErrorResponse>)> {
    let payload = state.verifier.verify(&request.init_data).map_err(|err| {
        tracing::warn!(error = %err, "rejected init data");
        (
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse {
                error: "invalid init data",
            }),
        )
    })?;

    let session = state.store.record_open(&payload, OffsetDateTime::now_utc());
    Ok(Json(TrackOpenResponse {
        success: true,
        session,
    }))
}

#[derive(Debug, Deserialize)]
pub(crate) struct TrackActionRequest {
    #[serde(rename = "userId")]
    pub(crate) user_id: i64,
    pub(crate) action: String,
    #[serde(default)]
    pub(crate) data: serde_json::Value,
}

#[derive(Serialize)]
pub(crate) struct SuccessResponse {
    pub(crate) success: bool,
}

pub(crate) async fn track_action(
    State(state): State<state::AppState>,
    Json(request): Json<TrackActionRequest>,
) -> Json<SuccessResponse> {
    let action = request.action.trim();
    if action.is_empty() {
        tracing::debug!(user_id = request.user_id, "action without a name");
    }

    state
        .store
        .record_action(request.user_id, action, &request.data);
    Json(SuccessResponse { success: true })
}
