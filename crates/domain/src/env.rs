//! Recognized environment variable names and defaults (spec.md §6).
//!
//! Kept here, rather than duplicated in both the gateway and the SDK, so
//! the two never drift on a variable name or a default value.

pub const BRIDGE_KERNEL_ENDPOINT_ENV: &str = "BRIDGE_KERNEL_ENDPOINT";
pub const DEFAULT_KERNEL_ENDPOINT: &str = "http://localhost:8765";

pub const AUDIT_TTL_SECONDS_ENV: &str = "AUDIT_TTL_SECONDS";
pub const DEFAULT_AUDIT_TTL_SECONDS: u64 = 3600;

pub const REDIS_URL_ENV: &str = "REDIS_URL";

pub const AUTO_POLICY_SYNC_ENV: &str = "AUTO_POLICY_SYNC";

pub const BUDGET_MAX_TOKENS_ENV: &str = "BUDGET_MAX_TOKENS";
pub const DEFAULT_BUDGET_MAX_TOKENS: u64 = 500_000;

pub const REORDER_MAX_WAIT_MS_ENV: &str = "REORDER_MAX_WAIT_MS";
pub const DEFAULT_REORDER_MAX_WAIT_MS: u64 = 200;

/// Default consecutive `CONSISTENCY_MISMATCH` count before a workflow's
/// effective ring is demoted (see SPEC_FULL.md §C.2). Not part of the base
/// spec's recognized environment variables; kept as a named constant
/// rather than a magic number in the audit registry.
pub const DEFAULT_CONSISTENCY_MISMATCH_THRESHOLD: u32 = 3;

fn env_bool(name: &str) -> bool {
    std::env::var(name).map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false)
}

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

pub fn kernel_endpoint() -> String {
    std::env::var(BRIDGE_KERNEL_ENDPOINT_ENV).unwrap_or_else(|_| DEFAULT_KERNEL_ENDPOINT.to_string())
}

pub fn audit_ttl_seconds() -> u64 {
    env_u64(AUDIT_TTL_SECONDS_ENV, DEFAULT_AUDIT_TTL_SECONDS)
}

pub fn redis_url() -> Option<String> {
    std::env::var(REDIS_URL_ENV).ok().filter(|s| !s.is_empty())
}

pub fn auto_policy_sync() -> bool {
    env_bool(AUTO_POLICY_SYNC_ENV)
}

pub fn budget_max_tokens() -> u64 {
    env_u64(BUDGET_MAX_TOKENS_ENV, DEFAULT_BUDGET_MAX_TOKENS)
}

pub fn reorder_max_wait_ms() -> u64 {
    env_u64(REORDER_MAX_WAIT_MS_ENV, DEFAULT_REORDER_MAX_WAIT_MS)
}
