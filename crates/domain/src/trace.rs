use serde::Serialize;

/// Structured audit/trace events emitted by the governance pipeline and the
/// bridge SDK. Each variant is emitted as a single line of JSON via
/// `tracing::info!`, so downstream log aggregation never has to parse
/// free-form messages to reconstruct what the pipeline decided.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum GovernanceEvent {
    SegmentProposed {
        workflow_id: String,
        action: String,
        ring_level: u8,
        sequence_number: u64,
    },
    SegmentApproved {
        workflow_id: String,
        checkpoint_id: String,
    },
    InjectionDetected {
        workflow_id: String,
        action: String,
        ring_level: u8,
        pattern: String,
    },
    CapabilityDenied {
        workflow_id: String,
        action: String,
        ring_level: u8,
    },
    BudgetExceeded {
        workflow_id: String,
        token_usage: u64,
        max_tokens: u64,
    },
    ConstitutionalViolation {
        workflow_id: String,
        action: String,
        severity: String,
        description: String,
    },
    ConsistencyMismatch {
        checkpoint_id: String,
        workflow_id: String,
        proposed_action: String,
        reported_action: String,
        mismatch_count: u32,
        ring_demoted: bool,
    },
    ReorderTimeout {
        workflow_id: String,
        sequence_number: u64,
        expected: u64,
    },
    FinalCleanup {
        workflow_id: String,
    },
    PolicySynced {
        version: String,
        pattern_count: usize,
    },
}

impl GovernanceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(governance_event = %json, "vsm_event");
    }
}
