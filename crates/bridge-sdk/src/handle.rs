//! The segment handle handed to agent code after `Bridge::segment` returns
//! (spec.md §9 "Duck-typed handles"): a tagged union of the Strict and
//! Optimistic variants behind one common interface, in place of the
//! original's two duck-typed Python classes (`_SegmentHandle`,
//! `_OptimisticHandle`).
//!
//! Rust has no async `Drop`, so unlike the original's context-manager
//! (`with bridge.segment(...) as seg:`), completion here is an explicit
//! consuming call — `finish_success` / `finish_failure` — rather than
//! scope exit. Callers that forget to call one simply never send the
//! OBSERVE/FAIL or background PROPOSE; there is no implicit fallback.

use serde_json::Value;

use vsm_protocol::SegmentCommit;

use crate::client::KernelClient;

pub struct StrictHandle {
    pub(crate) commit: SegmentCommit,
    pub(crate) action_params: Value,
    pub(crate) client: KernelClient,
    pub(crate) timeout_ms: u64,
}

impl StrictHandle {
    pub fn allowed(&self) -> bool {
        self.commit.allowed()
    }

    pub fn should_kill(&self) -> bool {
        self.commit.should_kill()
    }

    pub fn should_rollback(&self) -> bool {
        self.commit.should_rollback()
    }

    pub fn checkpoint_id(&self) -> &str {
        &self.commit.checkpoint_id
    }

    pub fn action_params(&self) -> &Value {
        &self.action_params
    }

    pub fn recovery_instruction(&self) -> Option<&str> {
        self.commit.commands.inject_recovery_instruction.as_deref()
    }

    /// POSTs `/v1/segment/observe` with the agent's reported outcome
    /// (spec.md §4.8 Strict branch "after the agent executes and reports").
    /// Non-fatal: a failed observe is logged and swallowed, matching the
    /// original's `_send_observation`.
    pub async fn finish_success(self, observation: Option<Value>) {
        let req = vsm_protocol::ObserveRequest {
            checkpoint_id: self.commit.checkpoint_id.clone(),
            action: None,
            status: Some("SUCCESS".to_string()),
            observation,
        };
        if let Err(err) = self.client.observe(&req, self.timeout_ms.min(5_000)).await {
            tracing::debug!(error = %err, "observe report failed (non-critical)");
        }
    }

    /// POSTs `/v1/segment/fail` on an agent-side exception after APPROVED
    /// (spec.md §7 "Agent-side exception after APPROVED"). Non-fatal.
    pub async fn finish_failure(self, error: impl Into<String>) {
        let req = vsm_protocol::FailRequest { checkpoint_id: self.commit.checkpoint_id.clone(), error: error.into() };
        if let Err(err) = self.client.fail(&req, self.timeout_ms.min(5_000)).await {
            tracing::debug!(error = %err, "fail report failed (non-critical)");
        }
    }
}

pub struct OptimisticHandle {
    pub(crate) action_params: Value,
    pub(crate) client: KernelClient,
    pub(crate) proposal: vsm_protocol::SegmentProposal,
    pub(crate) propose_timeout_ms: u64,
}

impl OptimisticHandle {
    pub const CHECKPOINT_ID: &'static str = vsm_protocol::CHECKPOINT_OPTIMISTIC_LOCAL;

    pub fn allowed(&self) -> bool {
        true
    }

    pub fn should_kill(&self) -> bool {
        false
    }

    pub fn should_rollback(&self) -> bool {
        false
    }

    pub fn checkpoint_id(&self) -> &str {
        Self::CHECKPOINT_ID
    }

    pub fn action_params(&self) -> &Value {
        &self.action_params
    }

    pub fn recovery_instruction(&self) -> Option<&str> {
        None
    }

    /// Fires the post-hoc background PROPOSE (spec.md §4.8 Optimistic
    /// branch: "after the agent's scope exits, fire-and-forget"). Spawns a
    /// detached task and returns immediately — no exception from the
    /// background send ever propagates to the caller (spec.md S6).
    pub fn finish(self, observation: Option<Value>) {
        let _ = observation; // captured for API symmetry; the original never transmits it either.
        let client = self.client;
        let proposal = self.proposal;
        let timeout_ms = self.propose_timeout_ms;
        tokio::spawn(async move {
            if let Err(err) = client.propose(&proposal, timeout_ms).await {
                tracing::debug!(error = %err, "background propose failed (non-critical)");
            }
        });
    }
}

/// Common entry point an agent matches on, or calls straight through via
/// the accessor methods (both variants expose the same shape).
pub enum Segment {
    Strict(StrictHandle),
    Optimistic(OptimisticHandle),
}

impl Segment {
    pub fn allowed(&self) -> bool {
        match self {
            Segment::Strict(h) => h.allowed(),
            Segment::Optimistic(h) => h.allowed(),
        }
    }

    pub fn should_kill(&self) -> bool {
        match self {
            Segment::Strict(h) => h.should_kill(),
            Segment::Optimistic(h) => h.should_kill(),
        }
    }

    pub fn should_rollback(&self) -> bool {
        match self {
            Segment::Strict(h) => h.should_rollback(),
            Segment::Optimistic(h) => h.should_rollback(),
        }
    }

    pub fn checkpoint_id(&self) -> &str {
        match self {
            Segment::Strict(h) => h.checkpoint_id(),
            Segment::Optimistic(h) => h.checkpoint_id(),
        }
    }

    pub fn action_params(&self) -> &Value {
        match self {
            Segment::Strict(h) => h.action_params(),
            Segment::Optimistic(h) => h.action_params(),
        }
    }

    pub fn recovery_instruction(&self) -> Option<&str> {
        match self {
            Segment::Strict(h) => h.recovery_instruction(),
            Segment::Optimistic(h) => h.recovery_instruction(),
        }
    }

    /// Consumes the segment, reporting success back to the kernel: a
    /// synchronous `/observe` for Strict, a fire-and-forget `/propose` for
    /// Optimistic.
    pub async fn finish_success(self, observation: Option<Value>) {
        match self {
            Segment::Strict(h) => h.finish_success(observation).await,
            Segment::Optimistic(h) => h.finish(observation),
        }
    }

    /// Consumes the segment, reporting an agent-side failure. Optimistic
    /// segments have no distinct failure path in the original (the
    /// post-hoc report carries no status) so this also just fires the
    /// background propose.
    pub async fn finish_failure(self, error: impl Into<String>) {
        match self {
            Segment::Strict(h) => h.finish_failure(error).await,
            Segment::Optimistic(h) => h.finish(None),
        }
    }
}
