//! Recovery instruction templates (spec.md §4.9). Each pipeline stage that
//! rejects or kills a proposal builds its commit's recovery instruction
//! through one of these constructors so the wording stays centralized.

use vsm_domain::policy::Ring;

pub fn capability_denied(action: &str, ring: Ring, alternatives: &[&str]) -> String {
    let list = alternatives.iter().take(5).cloned().collect::<Vec<_>>().join(", ");
    format!(
        "Action '{action}' is not authorized at {ring}. Available alternatives: {list}. \
         Please revise your plan to use an authorized tool.",
        ring = ring.name()
    )
}

pub fn injection_detected(action: &str) -> String {
    format!(
        "Your thought or action ('{action}') was flagged as a potential prompt injection \
         attempt. Rephrase using task-focused language."
    )
}

pub fn constitutional_critical(action: &str, details: &str) -> String {
    format!(
        "Action '{action}' violates a critical constitutional policy. Violation: {details}. \
         Terminate or redirect this task immediately. Do not retry."
    )
}

pub fn constitutional_medium(action: &str, details: &str) -> String {
    format!(
        "Action '{action}' raised a policy warning: {details}. Adjust your approach and retry \
         with a modified plan."
    )
}

pub fn budget_exhausted() -> String {
    "Token budget exhausted. Use a FINAL segment to summarize and terminate the workflow \
     gracefully."
        .to_string()
}
