//! `Bridge`: the Hybrid Interceptor (spec.md §4.8) — the client-side
//! segment manager an agent drives directly. Named `Bridge` rather than
//! the original's `AnalemmaBridge` class; the module doc carries the same
//! role.
//!
//! Per spec.md §9 ("no hidden global beyond the shared policy registry"),
//! construction takes an explicit `BridgeConfig` rather than reading
//! environment variables at import time the way the original module does.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use vsm_protocol::{checkpoint_id, idempotency_key, SegmentCommit, SegmentContext, SegmentPayload, SegmentProposal, SegmentType, CHECKPOINT_LOCAL_ONLY};

use crate::client::KernelClient;
use crate::config::{BridgeConfig, InterceptorMode, NetworkFailureMode};
use crate::destructive::is_destructive;
use crate::error::{BridgeError, Result};
use crate::handle::{OptimisticHandle, Segment, StrictHandle};
use crate::l1::LocalL1Checker;
use crate::policy_sync;

pub struct Bridge {
    config: BridgeConfig,
    client: KernelClient,
    l1: Arc<LocalL1Checker>,
    loop_index: Mutex<u64>,
    parent_segment_id: Mutex<Option<String>>,
}

impl Bridge {
    /// Constructs a bridge and, if `config.auto_policy_sync` is set,
    /// performs one blocking `/v1/policy/sync` round-trip before returning
    /// — mirroring the original's constructor-time `sync_from_kernel` call,
    /// made explicit/async here rather than a hidden side effect.
    pub async fn new(config: BridgeConfig) -> Self {
        let client = KernelClient::new(config.kernel_endpoint.clone());
        let l1 = Arc::new(LocalL1Checker::new());

        if config.auto_policy_sync {
            let synced = policy_sync::sync_from_kernel(&l1, &client, config.policy_sync_timeout_ms).await;
            if synced {
                tracing::info!(version = %l1.policy_version(), "bridge: policy synced at startup");
            } else {
                tracing::warn!("bridge: policy sync failed at startup, using local defaults");
            }
        }

        Self { config, client, l1, loop_index: Mutex::new(0), parent_segment_id: Mutex::new(None) }
    }

    /// Builds a bridge without attempting any network I/O, regardless of
    /// `auto_policy_sync` — useful for tests and offline operation.
    pub fn new_offline(config: BridgeConfig) -> Self {
        let client = KernelClient::new(config.kernel_endpoint.clone());
        let l1 = Arc::new(LocalL1Checker::new());
        Self { config, client, l1, loop_index: Mutex::new(0), parent_segment_id: Mutex::new(None) }
    }

    pub fn l1_checker(&self) -> &LocalL1Checker {
        &self.l1
    }

    /// Submits one Thought-Action-Observation segment through the
    /// governance gateway (spec.md §4.8). Returns a [`Segment`] handle the
    /// caller inspects (`allowed`, `should_kill`, `should_rollback`) before
    /// acting, then consumes with `finish_success`/`finish_failure`.
    pub async fn segment(
        &self,
        thought: &str,
        action: &str,
        params: Value,
        segment_type: SegmentType,
        state_snapshot: Option<Value>,
    ) -> Result<Segment> {
        let loop_index = {
            let mut guard = self.loop_index.lock();
            *guard += 1;
            *guard
        };

        // Hybrid Interceptor: destructive intent forces Strict even when
        // the bridge is configured Optimistic (spec.md §4.8).
        let mut effective_mode = self.config.mode;
        if effective_mode == InterceptorMode::Optimistic && is_destructive(action, thought, &params) {
            tracing::warn!(action, workflow_id = %self.config.workflow_id, loop_index, "hybrid interceptor: destructive action detected, forcing strict mode");
            effective_mode = InterceptorMode::Strict;
        }

        match effective_mode {
            InterceptorMode::Optimistic => self.optimistic_segment(thought, action, params, loop_index),
            InterceptorMode::Strict => self.strict_segment(thought, action, params, segment_type, loop_index, state_snapshot).await,
        }
    }

    fn optimistic_segment(&self, thought: &str, action: &str, params: Value, loop_index: u64) -> Result<Segment> {
        let l1_result = self.l1.check(thought, action, self.config.ring_level, Some(&params));
        if !l1_result.allowed {
            let reason = l1_result.reason.unwrap_or_else(|| "denied".to_string());
            return Err(BridgeError::SecurityViolation(reason));
        }

        let proposal = self.build_proposal(thought, action, params.clone(), SegmentType::ToolCall, loop_index, None, true);

        Ok(Segment::Optimistic(OptimisticHandle {
            action_params: params,
            client: self.client.clone(),
            proposal,
            propose_timeout_ms: self.config.propose_timeout_ms,
        }))
    }

    async fn strict_segment(
        &self,
        thought: &str,
        action: &str,
        params: Value,
        segment_type: SegmentType,
        loop_index: u64,
        state_snapshot: Option<Value>,
    ) -> Result<Segment> {
        let proposal = self.build_proposal(thought, action, params.clone(), segment_type, loop_index, state_snapshot, false);

        let commit = match self.client.propose(&proposal, self.config.propose_timeout_ms).await {
            Ok(commit) => commit,
            Err(err) => match self.config.network_failure_mode {
                NetworkFailureMode::FailOpen => {
                    tracing::warn!(error = %err, "bridge: kernel unreachable, fail-open");
                    SegmentCommit::synthetic_approved(CHECKPOINT_LOCAL_ONLY)
                }
                NetworkFailureMode::FailClosed => return Err(BridgeError::KernelUnreachable(err.to_string())),
            },
        };

        *self.parent_segment_id.lock() = Some(commit.checkpoint_id.clone());

        let action_params = commit.commands.action_override.clone().unwrap_or(params);

        Ok(Segment::Strict(StrictHandle {
            commit,
            action_params,
            client: self.client.clone(),
            timeout_ms: self.config.propose_timeout_ms,
        }))
    }

    #[allow(clippy::too_many_arguments)]
    fn build_proposal(
        &self,
        thought: &str,
        action: &str,
        params: Value,
        segment_type: SegmentType,
        loop_index: u64,
        state_snapshot: Option<Value>,
        is_optimistic_report: bool,
    ) -> SegmentProposal {
        let idem_key = idempotency_key(&self.config.workflow_id, loop_index, action, &params);
        SegmentProposal {
            protocol_version: vsm_protocol::PROTOCOL_VERSION.to_string(),
            idempotency_key: idem_key,
            segment_context: SegmentContext {
                workflow_id: self.config.workflow_id.clone(),
                parent_segment_id: self.parent_segment_id.lock().clone(),
                loop_index,
                segment_type,
                sequence_number: loop_index,
                ring_level: self.config.ring_level,
                is_optimistic_report,
            },
            payload: SegmentPayload { thought: thought.to_string(), action: action.to_string(), action_params: params },
            state_snapshot: state_snapshot.unwrap_or(Value::Null),
        }
    }

    /// Derives the checkpoint id a proposal with these fields would receive
    /// from the gateway, without a round trip — useful for tests asserting
    /// idempotency (spec.md testable property 6).
    pub fn predict_checkpoint_id(&self, loop_index: u64, action: &str, params: &Value) -> String {
        let idem = idempotency_key(&self.config.workflow_id, loop_index, action, params);
        checkpoint_id(&self.config.workflow_id, loop_index, &idem)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BridgeConfig;
    use serde_json::json;

    fn offline_bridge(mode: InterceptorMode) -> Bridge {
        let config = BridgeConfig::new("wf_test", 2, mode);
        Bridge::new_offline(config)
    }

    #[tokio::test]
    async fn optimistic_allowed_action_yields_optimistic_handle() {
        let bridge = offline_bridge(InterceptorMode::Optimistic);
        let seg = bridge
            .segment("read the billing report", "s3_get_object", json!({"bucket": "billing"}), SegmentType::ToolCall, None)
            .await
            .unwrap();
        assert!(seg.allowed());
        assert_eq!(seg.checkpoint_id(), vsm_protocol::CHECKPOINT_OPTIMISTIC_LOCAL);
        seg.finish_success(Some(json!("ok"))).await;
    }

    #[tokio::test]
    async fn optimistic_denied_action_raises_security_violation() {
        let bridge = offline_bridge(InterceptorMode::Optimistic);
        let err = bridge.segment("", "database_drop", json!({}), SegmentType::ToolCall, None).await.unwrap_err();
        assert!(matches!(err, BridgeError::SecurityViolation(_)));
    }

    #[tokio::test]
    async fn strict_mode_with_unreachable_kernel_fails_open_by_default() {
        let config = BridgeConfig::new("wf_test", 3, InterceptorMode::Strict);
        let bridge = Bridge::new_offline(config);
        let seg = bridge.segment("read report", "s3_get_object", json!({}), SegmentType::ToolCall, None).await.unwrap();
        assert!(seg.allowed());
        assert_eq!(seg.checkpoint_id(), vsm_protocol::CHECKPOINT_LOCAL_ONLY);
    }

    #[tokio::test]
    async fn strict_mode_fail_closed_raises_on_unreachable_kernel() {
        let config = BridgeConfig::new("wf_test", 3, InterceptorMode::Strict).fail_closed();
        let bridge = Bridge::new_offline(config);
        let err = bridge.segment("read report", "s3_get_object", json!({}), SegmentType::ToolCall, None).await.unwrap_err();
        assert!(matches!(err, BridgeError::KernelUnreachable(_)));
    }

    #[tokio::test]
    async fn destructive_action_in_optimistic_mode_is_promoted_to_strict() {
        // With an unreachable kernel and fail-closed, promotion to Strict
        // surfaces as a KernelUnreachable error rather than an L1-allowed
        // Optimistic handle — proof the segment never executed locally.
        let config = BridgeConfig::new("wf_test", 2, InterceptorMode::Optimistic).fail_closed();
        let bridge = Bridge::new_offline(config);
        let err = bridge
            .segment("clean up temp files", "filesystem_delete", json!({"path": "/tmp/work.tmp"}), SegmentType::ToolCall, None)
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::KernelUnreachable(_)));
    }

    #[tokio::test]
    async fn loop_index_advances_once_per_segment_call() {
        let bridge = offline_bridge(InterceptorMode::Optimistic);
        let first = bridge.segment("t1", "s3_get_object", json!({}), SegmentType::ToolCall, None).await.unwrap();
        first.finish_success(None).await;
        let second = bridge.segment("t2", "s3_get_object", json!({}), SegmentType::ToolCall, None).await.unwrap();
        second.finish_success(None).await;
        assert_eq!(*bridge.loop_index.lock(), 2);
    }

    #[test]
    fn predict_checkpoint_id_matches_protocol_helpers() {
        let bridge = offline_bridge(InterceptorMode::Strict);
        let params = json!({"bucket": "billing"});
        let predicted = bridge.predict_checkpoint_id(1, "s3_get_object", &params);
        let idem = idempotency_key("wf_test", 1, "s3_get_object", &params);
        let expected = checkpoint_id("wf_test", 1, &idem);
        assert_eq!(predicted, expected);
    }
}
