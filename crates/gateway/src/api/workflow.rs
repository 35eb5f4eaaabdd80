use axum::extract::{Path, State};
use axum::http::StatusCode;

use crate::state::AppState;

/// `DELETE /v1/workflow/{id}`: explicit cleanup hook for a finished or
/// abandoned workflow, clearing reorder state, consistency counters, and
/// any ring demotion — independent of the FINAL-segment cleanup path.
pub async fn clear(State(state): State<AppState>, Path(workflow_id): Path<String>) -> StatusCode {
    state.reorder.reset(&workflow_id).await;
    state.audit.clear_workflow(&workflow_id);
    StatusCode::NO_CONTENT
}
