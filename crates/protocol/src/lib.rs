//! Wire types for the VSM HTTP endpoints (spec.md §3, §4.7).
//!
//! Field names here are exactly as spelled in the spec: `protocol_version`,
//! `idempotency_key`, `segment_context`, `payload`, `state_snapshot`,
//! `checkpoint_id`, `commands`, `governance_feedback`. Both the gateway and
//! the bridge SDK depend on this crate so a proposal built by one is
//! byte-for-byte the proposal decoded by the other.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

pub const PROTOCOL_VERSION: &str = "1.0";

/// Reserved checkpoint-id sentinels (spec.md §6).
pub const CHECKPOINT_LOCAL_ONLY: &str = "local_only";
pub const CHECKPOINT_OPTIMISTIC_LOCAL: &str = "optimistic_local";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Enums
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SegmentType {
    #[serde(rename = "TOOL_CALL")]
    ToolCall,
    #[serde(rename = "LLM_CALL")]
    LlmCall,
    #[serde(rename = "MEMORY_UPDATE")]
    MemoryUpdate,
    #[serde(rename = "FINAL")]
    Final,
}

impl Default for SegmentType {
    fn default() -> Self {
        SegmentType::ToolCall
    }
}

/// Segment status (spec.md §6). Case-sensitive on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SegmentStatus {
    APPROVED,
    MODIFIED,
    REJECTED,
    SOFT_ROLLBACK,
    SIGKILL,
}

impl SegmentStatus {
    pub fn allowed(self) -> bool {
        matches!(self, SegmentStatus::APPROVED | SegmentStatus::MODIFIED)
    }

    pub fn should_kill(self) -> bool {
        matches!(self, SegmentStatus::SIGKILL)
    }

    pub fn should_rollback(self) -> bool {
        matches!(self, SegmentStatus::SOFT_ROLLBACK)
    }

    /// Advisory anomaly score (spec.md §6).
    pub fn anomaly_score(self) -> f64 {
        match self {
            SegmentStatus::SIGKILL => 1.0,
            SegmentStatus::REJECTED | SegmentStatus::SOFT_ROLLBACK => 0.5,
            SegmentStatus::APPROVED | SegmentStatus::MODIFIED => 0.0,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Segment Proposal
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentContext {
    pub workflow_id: String,
    #[serde(default)]
    pub parent_segment_id: Option<String>,
    #[serde(default)]
    pub loop_index: u64,
    #[serde(default)]
    pub segment_type: SegmentType,
    #[serde(default)]
    pub sequence_number: u64,
    #[serde(default = "default_ring_level")]
    pub ring_level: i64,
    #[serde(default)]
    pub is_optimistic_report: bool,
}

fn default_ring_level() -> i64 {
    3
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SegmentPayload {
    #[serde(default)]
    pub thought: String,
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub action_params: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentProposal {
    #[serde(default = "default_protocol_version")]
    pub protocol_version: String,
    pub idempotency_key: String,
    pub segment_context: SegmentContext,
    pub payload: SegmentPayload,
    #[serde(default)]
    pub state_snapshot: Value,
}

fn default_protocol_version() -> String {
    PROTOCOL_VERSION.to_string()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Segment Commit
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Commands {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_override: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inject_recovery_instruction: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GovernanceFeedback {
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub anomaly_score: f64,
    #[serde(default)]
    pub article_violations: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentCommit {
    #[serde(default = "default_protocol_version")]
    pub protocol_version: String,
    pub status: SegmentStatus,
    pub checkpoint_id: String,
    #[serde(default)]
    pub commands: Commands,
    #[serde(default)]
    pub governance_feedback: GovernanceFeedback,
}

impl SegmentCommit {
    pub fn allowed(&self) -> bool {
        self.status.allowed()
    }

    pub fn should_kill(&self) -> bool {
        self.status.should_kill()
    }

    pub fn should_rollback(&self) -> bool {
        self.status.should_rollback()
    }

    /// Build a commit, filling `governance_feedback.anomaly_score` from
    /// `status` automatically (spec.md §6).
    pub fn new(
        status: SegmentStatus,
        checkpoint_id: impl Into<String>,
        warnings: Vec<String>,
        recovery_instruction: Option<String>,
    ) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION.to_string(),
            status,
            checkpoint_id: checkpoint_id.into(),
            commands: Commands {
                action_override: None,
                inject_recovery_instruction: recovery_instruction,
            },
            governance_feedback: GovernanceFeedback {
                anomaly_score: status.anomaly_score(),
                warnings,
                article_violations: Vec::new(),
            },
        }
    }

    /// Synthetic local verdict for fail-open/optimistic paths — never
    /// produced by the governance pipeline itself.
    pub fn synthetic_approved(checkpoint_id: &'static str) -> Self {
        Self::new(SegmentStatus::APPROVED, checkpoint_id, Vec::new(), None)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Observe / Fail
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObserveRequest {
    pub checkpoint_id: String,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub observation: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObserveResponse {
    pub ack: bool,
    pub checkpoint_id: String,
    /// `None` means no Proposed Record was found (stale/optimistic).
    pub consistency_ok: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailRequest {
    pub checkpoint_id: String,
    #[serde(default)]
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailResponse {
    pub ack: bool,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Policy Snapshot
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicySnapshot {
    pub version: String,
    pub injection_patterns: Vec<String>,
    /// Keyed by ring integer as a string ("1", "2", "3"). Ring 0 (KERNEL) is
    /// never present — spec.md §4.7 / SPEC_FULL.md §C.6.
    pub capability_map: std::collections::BTreeMap<String, Vec<String>>,
    pub destructive_actions: Vec<String>,
    pub destructive_patterns: Vec<String>,
    pub audit_registry_backend: String,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Health
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub policy_version: String,
    pub audit_registry_backend: String,
    pub audit_registry_memory_size: usize,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Idempotency key / checkpoint id (spec.md §3, §4.7, §4.8; SPEC_FULL.md §C.5)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Canonical JSON: object keys sorted recursively, used as the hash input
/// for both the idempotency key and (by the caller) the params scan text.
/// `serde_json::Value` backed by a `BTreeMap`-equivalent ensures stable
/// ordering once re-serialized.
pub fn canonical_json(value: &Value) -> String {
    serde_json::to_string(&canonicalize(value)).unwrap_or_default()
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: std::collections::BTreeMap<String, Value> =
                map.iter().map(|(k, v)| (k.clone(), canonicalize(v))).collect();
            serde_json::to_value(sorted).unwrap_or(Value::Null)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

fn sha256_hex_prefix(input: &str, prefix_len: usize) -> String {
    let digest = Sha256::digest(input.as_bytes());
    let full = hex::encode(digest);
    full[..prefix_len.min(full.len())].to_string()
}

/// `hex(sha256(f"{workflow_id}:loop_{loop_index}:{action}:{canonical_json(params)}"))[:16]`
pub fn idempotency_key(workflow_id: &str, loop_index: u64, action: &str, params: &Value) -> String {
    let content = format!(
        "{workflow_id}:loop_{loop_index}:{action}:{}",
        canonical_json(params)
    );
    sha256_hex_prefix(&content, 16)
}

/// `"cp_" + hex(sha256(f"{workflow_id}:{seq}:{idempotency_key}"))[:16]`
pub fn checkpoint_id(workflow_id: &str, sequence_number: u64, idempotency_key: &str) -> String {
    let content = format!("{workflow_id}:{sequence_number}:{idempotency_key}");
    format!("cp_{}", sha256_hex_prefix(&content, 16))
}
