//! SDK-local error type (spec.md §7 client rows): a security violation
//! raised by a local L1 deny, and a network error surfaced only when the
//! bridge is configured fail-closed.

#[derive(thiserror::Error, Debug)]
pub enum BridgeError {
    /// The Local L1 Checker denied the action before it ever reached the
    /// network (Optimistic branch) — the agent-visible analogue of the
    /// original's `SecurityViolation`.
    #[error("security violation: {0}")]
    SecurityViolation(String),

    /// Strict-mode PROPOSE failed and the bridge is configured fail-closed
    /// (spec.md §4.8, §7 "Client network failure (Strict)").
    #[error("kernel unreachable: {0}")]
    KernelUnreachable(String),
}

pub type Result<T> = std::result::Result<T, BridgeError>;
