use axum::extract::State;
use axum::Json;

use vsm_protocol::HealthResponse;

use crate::state::AppState;

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        policy_version: state.policy_version.to_string(),
        audit_registry_backend: state.audit.backend_name().to_string(),
        audit_registry_memory_size: state.audit.memory_size(),
    })
}
