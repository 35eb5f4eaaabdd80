//! Reordering Buffer: per-workflow FIFO gate by sequence number, with
//! bounded wait and fail-open on timeout (spec.md §4.4).
//!
//! Ported from `ReorderingBuffer` in `virtual_segment_manager.py`: a single
//! `expected_next` counter per `workflow_id`, a coarse poll loop, and a
//! forced advance past the deadline rather than a hard failure — agents
//! that spawn parallel sub-tasks emit numerically non-monotonic proposals,
//! and a hard failure there would cascade.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use vsm_domain::trace::GovernanceEvent;

pub struct ReorderBuffer {
    expected: Mutex<HashMap<String, u64>>,
    max_wait_ms: u64,
    poll_interval_ms: u64,
}

impl ReorderBuffer {
    pub fn new(max_wait_ms: u64, poll_interval_ms: u64) -> Self {
        Self { expected: Mutex::new(HashMap::new()), max_wait_ms, poll_interval_ms }
    }

    /// Returns `true` if `sequence_number` arrived in order (or the map was
    /// empty), `false` if the deadline elapsed and the buffer fail-opened.
    /// The pipeline ignores this flag for verdict purposes — it is purely
    /// advisory/logging (spec.md §4.6 Stage 0).
    pub async fn wait_for_turn(&self, workflow_id: &str, sequence_number: u64) -> bool {
        {
            let mut map = self.expected.lock().await;
            map.entry(workflow_id.to_string()).or_insert(sequence_number);
        }

        let deadline = Instant::now() + Duration::from_millis(self.max_wait_ms);

        loop {
            {
                let mut map = self.expected.lock().await;
                let expected = *map.get(workflow_id).unwrap_or(&0);
                if sequence_number <= expected {
                    map.insert(workflow_id.to_string(), expected.max(sequence_number + 1));
                    return true;
                }
            }

            if Instant::now() >= deadline {
                let expected = {
                    let mut map = self.expected.lock().await;
                    let current = *map.get(workflow_id).unwrap_or(&0);
                    let advanced = current.max(sequence_number + 1);
                    map.insert(workflow_id.to_string(), advanced);
                    advanced
                };
                tracing::warn!(
                    workflow_id, sequence_number, expected,
                    "reorder buffer timed out, fail-open"
                );
                GovernanceEvent::ReorderTimeout {
                    workflow_id: workflow_id.to_string(),
                    sequence_number,
                    expected,
                }
                .emit();
                return false;
            }

            tokio::time::sleep(Duration::from_millis(self.poll_interval_ms)).await;
        }
    }

    pub async fn mark_done(&self, workflow_id: &str, sequence_number: u64) {
        let mut map = self.expected.lock().await;
        let current = *map.get(workflow_id).unwrap_or(&0);
        map.insert(workflow_id.to_string(), current.max(sequence_number + 1));
    }

    pub async fn reset(&self, workflow_id: &str) {
        let mut map = self.expected.lock().await;
        map.remove(workflow_id);
        tracing::debug!(workflow_id, "reorder buffer cleaned up");
    }

    #[cfg(test)]
    pub async fn expected_next(&self, workflow_id: &str) -> Option<u64> {
        self.expected.lock().await.get(workflow_id).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn in_order_sequence_advances_without_waiting() {
        let buf = ReorderBuffer::new(200, 10);
        assert!(buf.wait_for_turn("wf", 0).await);
        assert!(buf.wait_for_turn("wf", 1).await);
        assert!(buf.wait_for_turn("wf", 2).await);
    }

    #[tokio::test]
    async fn out_of_order_waits_then_fail_opens_on_timeout() {
        let buf = Arc::new(ReorderBuffer::new(50, 5));
        // Anchor the workflow at sequence 0 first, then skip ahead: seq 10
        // arrives before seq 1..9 ever will.
        assert!(buf.wait_for_turn("wf", 0).await);
        let start = Instant::now();
        let in_order = buf.wait_for_turn("wf", 10).await;
        let elapsed = start.elapsed();
        assert!(!in_order);
        assert!(elapsed >= Duration::from_millis(45), "elapsed={elapsed:?}");
        assert!(elapsed < Duration::from_millis(200), "elapsed={elapsed:?}");
    }

    #[tokio::test]
    async fn reset_removes_workflow_state() {
        let buf = ReorderBuffer::new(200, 10);
        buf.wait_for_turn("wf", 0).await;
        assert!(buf.expected_next("wf").await.is_some());
        buf.reset("wf").await;
        assert!(buf.expected_next("wf").await.is_none());
    }

    #[tokio::test]
    async fn mark_done_advances_past_sequence() {
        let buf = ReorderBuffer::new(200, 10);
        buf.wait_for_turn("wf", 0).await;
        buf.mark_done("wf", 5).await;
        assert_eq!(buf.expected_next("wf").await, Some(6));
    }

    #[tokio::test]
    async fn independent_workflows_do_not_interfere() {
        let buf = ReorderBuffer::new(200, 10);
        assert!(buf.wait_for_turn("wf-a", 0).await);
        assert!(buf.wait_for_turn("wf-b", 0).await);
        buf.mark_done("wf-a", 3).await;
        assert!(buf.wait_for_turn("wf-b", 1).await);
    }
}
