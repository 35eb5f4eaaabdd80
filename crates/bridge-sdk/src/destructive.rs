//! Destructive-intent classifier used by the Hybrid Interceptor (spec.md
//! §4.8) to decide whether an Optimistic-mode segment must be promoted to
//! Strict before it runs.

use vsm_domain::policy;

/// `action.to_lower() ∈ DestructiveActionSet`, or `thought + params` matches
/// a destructive phrase pattern (spec.md §4.8 "Destructive-intent check").
pub fn is_destructive(action: &str, thought: &str, params: &serde_json::Value) -> bool {
    if policy::is_destructive_action(action) {
        return true;
    }

    let params_text = serde_json::to_string(params).unwrap_or_default();
    let scan_text = format!("{thought} {params_text}");
    policy::destructive_patterns().iter().any(|p| p.is_match(&scan_text))
}
