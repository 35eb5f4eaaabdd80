//! HTTP surface (spec.md §3): six endpoints under `/v1`.

mod health;
mod policy;
mod segment;
mod workflow;

use axum::routing::{delete, get, post};
use axum::Router;

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/segment/propose", post(segment::propose))
        .route("/v1/segment/observe", post(segment::observe))
        .route("/v1/segment/fail", post(segment::fail))
        .route("/v1/policy/sync", get(policy::sync))
        .route("/v1/workflow/:workflow_id", delete(workflow::clear))
        .route("/v1/health", get(health::health))
        .with_state(state)
}
