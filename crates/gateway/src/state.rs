//! Shared application state handed to every axum handler (spec.md §4).
//!
//! One `Clone`-able struct of `Arc`-wrapped subsystems built once at
//! startup and cloned cheaply into each request's handler.

use std::sync::Arc;

use vsm_domain::config::GatewayConfig;
use vsm_domain::policy;

use crate::audit::AuditRegistry;
use crate::constitutional::ConstitutionalEngine;
use crate::reorder::ReorderBuffer;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub reorder: Arc<ReorderBuffer>,
    pub audit: Arc<AuditRegistry>,
    pub constitutional: Arc<dyn ConstitutionalEngine>,
    pub policy_version: Arc<str>,
}

impl AppState {
    pub fn new(
        config: Arc<GatewayConfig>,
        reorder: Arc<ReorderBuffer>,
        audit: Arc<AuditRegistry>,
        constitutional: Arc<dyn ConstitutionalEngine>,
    ) -> Self {
        let policy_version = Arc::from(policy::policy_version());
        Self { config, reorder, audit, constitutional, policy_version }
    }
}
