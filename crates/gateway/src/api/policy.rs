use std::collections::BTreeMap;

use axum::extract::State;
use axum::Json;

use vsm_domain::policy::{self, Ring};
use vsm_domain::trace::GovernanceEvent;
use vsm_protocol::PolicySnapshot;

use crate::state::AppState;

/// `GET /v1/policy/sync`. Ring 0 (KERNEL) is never published — it always
/// allows everything, so handing its wildcard out over the wire would leak
/// no useful capability information and would invite SDK misuse
/// (SPEC_FULL.md §C.6).
pub async fn sync(State(state): State<AppState>) -> Json<PolicySnapshot> {
    let mut capability_map = BTreeMap::new();
    for ring in [Ring::Driver, Ring::Service, Ring::User] {
        capability_map.insert(
            (ring.as_u8() as u32).to_string(),
            policy::capabilities_for(ring).iter().map(|s| s.to_string()).collect(),
        );
    }

    let snapshot = PolicySnapshot {
        version: state.policy_version.to_string(),
        injection_patterns: policy::injection_pattern_strings(),
        capability_map,
        destructive_actions: policy::destructive_action_strings(),
        destructive_patterns: policy::destructive_pattern_strings(),
        audit_registry_backend: state.audit.backend_name().to_string(),
    };

    GovernanceEvent::PolicySynced {
        version: snapshot.version.clone(),
        pattern_count: snapshot.injection_patterns.len(),
    }
    .emit();

    Json(snapshot)
}
