//! Policy Sync Client (spec.md §4.9 component table, §4.3
//! `sync_from_kernel`): pulls the authoritative `PolicySnapshot` from
//! `/v1/policy/sync` and hot-swaps the Local L1 Checker's patterns.
//! Network failure is logged at WARN and leaves the local snapshot intact
//! — fail-open for offline operation, exactly as the original's
//! `LocalL1Checker.sync_from_kernel` returns `False` rather than raising.

use std::collections::{HashMap, HashSet};

use vsm_domain::policy::Ring;

use crate::client::KernelClient;
use crate::l1::LocalL1Checker;

/// Fetches `/v1/policy/sync` and, if the version differs from what `checker`
/// already holds, injects the new patterns/capability map. Returns whether
/// a sync round-trip succeeded (mirrors the original's `bool` return — a
/// same-version response still counts as success).
pub async fn sync_from_kernel(checker: &LocalL1Checker, client: &KernelClient, timeout_ms: u64) -> bool {
    let snapshot = match client.policy_sync(timeout_ms).await {
        Ok(s) => s,
        Err(err) => {
            tracing::warn!(error = %err, "policy sync failed, using local defaults");
            return false;
        }
    };

    if snapshot.version == checker.policy_version() {
        tracing::debug!(version = %snapshot.version, "policy already up to date");
        return true;
    }

    let capability_map: HashMap<Ring, HashSet<String>> = snapshot
        .capability_map
        .iter()
        .filter_map(|(ring_str, actions)| {
            ring_str.parse::<i64>().ok().map(|n| (Ring::from_int(n), actions.iter().cloned().collect()))
        })
        .collect();

    checker.inject_patterns(snapshot.injection_patterns.clone(), Some(capability_map), Some(snapshot.version.clone()));
    tracing::info!(version = %snapshot.version, patterns = snapshot.injection_patterns.len(), "policy synced from kernel");
    true
}
