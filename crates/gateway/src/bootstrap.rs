//! Wires a validated `GatewayConfig` into an `AppState` (spec.md §7): picks
//! the Audit Registry backend, constructs the Reordering Buffer, and
//! installs the (currently null) Constitutional Engine.

use std::sync::Arc;

use vsm_domain::config::GatewayConfig;

use crate::audit::{AuditRegistry, RedisBackend};
use crate::constitutional::NullConstitutionalEngine;
use crate::reorder::ReorderBuffer;
use crate::state::AppState;

pub async fn build_state(config: GatewayConfig) -> AppState {
    let config = Arc::new(config);

    let durable = match config.audit.redis_url.as_deref() {
        Some(url) => match RedisBackend::connect(url, config.audit.ttl_seconds).await {
            Ok(backend) => Some(Box::new(backend) as Box<dyn crate::audit::AuditBackend>),
            Err(err) => {
                tracing::warn!(error = %err, "failed to connect durable audit backend, falling back to memory");
                None
            }
        },
        None => None,
    };

    let audit = Arc::new(AuditRegistry::new(durable, config.consistency.mismatch_threshold));
    let reorder = Arc::new(ReorderBuffer::new(config.reorder.max_wait_ms, config.reorder.poll_interval_ms));
    let constitutional = Arc::new(NullConstitutionalEngine);

    AppState::new(config, reorder, audit, constitutional)
}
