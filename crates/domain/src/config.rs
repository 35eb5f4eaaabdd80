//! Gateway configuration: a `GatewayConfig` value assembled once at process
//! start (spec.md §9 — "no hidden global beyond the shared policy registry").
//!
//! Nested `#[serde(default)]` sub-structs, `d_xxx()` default-value
//! functions, and a `validate() -> Vec<ConfigError>` with
//! `ConfigSeverity::{Error, Warning}`. The recognized environment variables
//! (spec.md §6) are authoritative overrides on top of whatever a TOML file
//! supplies — the original Python bridge has no config file at all, only
//! env vars, so this keeps that contract intact while still allowing an
//! optional file for the larger structured fields (server host/port).

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::env;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GatewayConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub budget: BudgetConfig,
    #[serde(default)]
    pub reorder: ReorderConfig,
    #[serde(default)]
    pub consistency: ConsistencyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "d_host")]
    pub host: String,
    #[serde(default = "d_port")]
    pub port: u16,
    #[serde(default)]
    pub rate_limit: Option<RateLimitConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: d_host(), port: d_port(), rate_limit: None }
    }
}

fn d_host() -> String {
    "0.0.0.0".into()
}

fn d_port() -> u16 {
    8765
}

/// Per-IP token bucket in front of the PROPOSE/OBSERVE/FAIL endpoints.
/// Absent by default — a governed gateway sitting behind an agent runtime
/// it already trusts has no inherent need for it, but a gateway exposed to
/// multiple untrusted agent fleets does.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub requests_per_second: u64,
    pub burst_size: u32,
}

/// Audit Registry backend selection + retention. `redis_url` present ⇒
/// durable backend; absent ⇒ in-memory (spec.md §4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    #[serde(default)]
    pub redis_url: Option<String>,
    #[serde(default = "d_audit_ttl")]
    pub ttl_seconds: u64,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self { redis_url: None, ttl_seconds: d_audit_ttl() }
    }
}

fn d_audit_ttl() -> u64 {
    env::DEFAULT_AUDIT_TTL_SECONDS
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConfig {
    #[serde(default = "d_budget_max")]
    pub max_tokens: u64,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self { max_tokens: d_budget_max() }
    }
}

fn d_budget_max() -> u64 {
    env::DEFAULT_BUDGET_MAX_TOKENS
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReorderConfig {
    #[serde(default = "d_reorder_wait")]
    pub max_wait_ms: u64,
    #[serde(default = "d_reorder_poll")]
    pub poll_interval_ms: u64,
}

impl Default for ReorderConfig {
    fn default() -> Self {
        Self { max_wait_ms: d_reorder_wait(), poll_interval_ms: d_reorder_poll() }
    }
}

fn d_reorder_wait() -> u64 {
    env::DEFAULT_REORDER_MAX_WAIT_MS
}

fn d_reorder_poll() -> u64 {
    10
}

/// Governs CONSISTENCY_MISMATCH → effective-ring demotion (SPEC_FULL.md §C.2,
/// resolving spec.md §9 Open Question #2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsistencyConfig {
    #[serde(default = "d_mismatch_threshold")]
    pub mismatch_threshold: u32,
}

impl Default for ConsistencyConfig {
    fn default() -> Self {
        Self { mismatch_threshold: d_mismatch_threshold() }
    }
}

fn d_mismatch_threshold() -> u32 {
    env::DEFAULT_CONSISTENCY_MISMATCH_THRESHOLD
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl GatewayConfig {
    /// Load from an optional TOML file, then overlay the spec.md §6
    /// recognized environment variables (env always wins — it is the
    /// primary configuration surface the original bridge exposes).
    pub fn load(path: Option<&Path>) -> crate::Result<Self> {
        let mut config = match path {
            Some(p) => {
                let text = std::fs::read_to_string(p)?;
                toml::from_str(&text)
                    .map_err(|e| crate::Error::Config(format!("parsing {}: {e}", p.display())))?
            }
            None => GatewayConfig::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Some(url) = env::redis_url() {
            self.audit.redis_url = Some(url);
        }
        self.audit.ttl_seconds = env::audit_ttl_seconds();
        self.budget.max_tokens = env::budget_max_tokens();
        self.reorder.max_wait_ms = env::reorder_max_wait_ms();
    }

    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.server.port == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "server.port".into(),
                message: "port must be non-zero".into(),
            });
        }

        if self.budget.max_tokens == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "budget.max_tokens".into(),
                message: "max_tokens is 0 — every segment will exceed budget".into(),
            });
        }

        if self.reorder.max_wait_ms == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "reorder.max_wait_ms".into(),
                message: "max_wait_ms is 0 — reordering buffer never waits, \
                          effectively disabling ordering guarantees"
                    .into(),
            });
        }

        if self.reorder.poll_interval_ms > self.reorder.max_wait_ms.max(1) {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "reorder.poll_interval_ms".into(),
                message: "poll_interval_ms exceeds max_wait_ms — the buffer will \
                          poll at most once before timing out"
                    .into(),
            });
        }

        if let Some(rl) = &self.server.rate_limit {
            if rl.requests_per_second == 0 || rl.burst_size == 0 {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: "server.rate_limit".into(),
                    message: "requests_per_second and burst_size must both be > 0".into(),
                });
            }
        }

        if self.consistency.mismatch_threshold == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "consistency.mismatch_threshold".into(),
                message: "mismatch_threshold is 0 — a workflow's ring demotes on the \
                          very first CONSISTENCY_MISMATCH"
                    .into(),
            });
        }

        errors
    }
}
