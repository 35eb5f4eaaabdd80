//! `BridgeConfig`: the explicit, passed-in configuration value spec.md §9
//! asks for in place of the original's module-level env-var globals. Reads
//! the recognized environment variables (spec.md §6) only at the point
//! where the caller explicitly asks for defaults (`BridgeConfig::from_env`)
//! — there is no hidden global beyond the linked policy registry.

use vsm_domain::env;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterceptorMode {
    Strict,
    Optimistic,
}

/// What a Strict-mode PROPOSE does when the kernel endpoint is unreachable
/// (spec.md §4.8, §7). Production deployments SHOULD choose `FailClosed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkFailureMode {
    FailOpen,
    FailClosed,
}

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub workflow_id: String,
    pub ring_level: i64,
    pub kernel_endpoint: String,
    pub mode: InterceptorMode,
    pub auto_policy_sync: bool,
    pub network_failure_mode: NetworkFailureMode,
    pub propose_timeout_ms: u64,
    pub policy_sync_timeout_ms: u64,
}

impl BridgeConfig {
    /// Builds a config anchored only on explicit values — no environment
    /// reads. Use `from_env` to apply the spec.md §6 recognized variables
    /// as defaults on top of this.
    pub fn new(workflow_id: impl Into<String>, ring_level: i64, mode: InterceptorMode) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            ring_level,
            kernel_endpoint: env::DEFAULT_KERNEL_ENDPOINT.to_string(),
            mode,
            auto_policy_sync: false,
            network_failure_mode: NetworkFailureMode::FailOpen,
            propose_timeout_ms: 10_000,
            policy_sync_timeout_ms: 5_000,
        }
    }

    /// Overlays `BRIDGE_KERNEL_ENDPOINT` and `AUTO_POLICY_SYNC` from the
    /// process environment, matching the original's module-level read of
    /// `ANALEMMA_KERNEL_ENDPOINT` / `ANALEMMA_SYNC_POLICY` at import time —
    /// except here it happens once, explicitly, at the caller's request.
    pub fn with_env_overrides(mut self) -> Self {
        self.kernel_endpoint = env::kernel_endpoint();
        self.auto_policy_sync = env::auto_policy_sync();
        self
    }

    pub fn strict(workflow_id: impl Into<String>, ring_level: i64) -> Self {
        Self::new(workflow_id, ring_level, InterceptorMode::Strict)
    }

    pub fn optimistic(workflow_id: impl Into<String>, ring_level: i64) -> Self {
        Self::new(workflow_id, ring_level, InterceptorMode::Optimistic)
    }

    pub fn fail_closed(mut self) -> Self {
        self.network_failure_mode = NetworkFailureMode::FailClosed;
        self
    }
}
