use super::ErrorResponse;
use crate::state;
use crate::store::{GroupSummary, UserSession};

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::Serialize;

pub(crate) async fn group_stats(
    State(state): State<state::AppState>,
    Path(chat_instance): Path<String>,
) -> Result<Json<GroupSummary>, (StatusCode, Json<ErrorResponse>)> {
    state.store.group_stats(&chat_instance).map(Json).ok_or((
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: "group not found",
        }),
    ))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AllGroupsResponse {
    pub(crate) total_groups: usize,
    pub(crate) groups: Vec<GroupSummary>,
}

pub(crate) async fn all_groups(State(state): State<state::AppState>) -> Json<AllGroupsResponse> {
    let groups = state.store.list_groups();
    Json(AllGroupsResponse {
        total_groups: groups.len(),
        groups,
    })
}

pub(crate) async fn user_session(
    State(state): State<state::AppState>,
    Path(user_id): Path<i64>,
) -> Result<Json<UserSession>, (StatusCode, Json<ErrorResponse>)> {
    state.store.user_session(user_id).map(Json).ok_or((
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: "user session not found",
        }),
    ))
}
