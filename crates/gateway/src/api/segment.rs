use axum::extract::State;
use axum::Json;

use vsm_domain::trace::GovernanceEvent;
use vsm_protocol::{FailRequest, FailResponse, ObserveRequest, ObserveResponse, SegmentCommit, SegmentProposal};

use crate::pipeline::GovernancePipeline;
use crate::state::AppState;

pub async fn propose(State(state): State<AppState>, Json(proposal): Json<SegmentProposal>) -> Json<SegmentCommit> {
    let pipeline = GovernancePipeline::from_state(&state);
    Json(pipeline.evaluate(&proposal).await)
}

/// Correlates an agent-reported outcome with the Proposed Record stored at
/// Stage 5. A reported action that differs from what was proposed is a
/// CONSISTENCY_MISMATCH (SPEC_FULL.md §C.2); enough of them demotes the
/// workflow's effective ring on subsequent proposals.
pub async fn observe(State(state): State<AppState>, Json(req): Json<ObserveRequest>) -> Json<ObserveResponse> {
    let record = state.audit.pop(&req.checkpoint_id).await;
    let consistency_ok = record.as_ref().map(|record| {
        let matches = req.action.as_deref().map(|a| a == record.action).unwrap_or(true);
        if !matches {
            let (count, demoted) = state.audit.record_mismatch(&record.workflow_id);
            GovernanceEvent::ConsistencyMismatch {
                checkpoint_id: req.checkpoint_id.clone(),
                workflow_id: record.workflow_id.clone(),
                proposed_action: record.action.clone(),
                reported_action: req.action.clone().unwrap_or_default(),
                mismatch_count: count,
                ring_demoted: demoted,
            }
            .emit();
        }
        matches
    });
    Json(ObserveResponse { ack: true, checkpoint_id: req.checkpoint_id, consistency_ok })
}

pub async fn fail(State(state): State<AppState>, Json(req): Json<FailRequest>) -> Json<FailResponse> {
    state.audit.pop(&req.checkpoint_id).await;
    tracing::warn!(checkpoint_id = %req.checkpoint_id, error = %req.error, "segment execution failed");
    Json(FailResponse { ack: true })
}
