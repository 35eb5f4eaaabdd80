//! Constitutional Engine seam (spec.md §4.8, §1 Non-goals): the gateway
//! calls out to an external judgement collaborator for values-level review
//! of a proposed action. That collaborator is explicitly out of scope for
//! this crate, so this module defines the trait boundary plus a
//! default implementation that always passes — a stand-in identical in
//! spirit to how the original bridge treats `CONSTITUTIONAL_ENDPOINT` as
//! optional and skips the check entirely when unset.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Violation {
    pub principle: String,
    pub severity: Severity,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConstitutionalVerdict {
    pub violations: Vec<Violation>,
}

impl ConstitutionalVerdict {
    pub fn clean() -> Self {
        Self { violations: Vec::new() }
    }

    pub fn highest_severity(&self) -> Option<Severity> {
        self.violations.iter().map(|v| v.severity).max()
    }
}

#[async_trait]
pub trait ConstitutionalEngine: Send + Sync {
    async fn review(&self, thought: &str, action: &str, params: &serde_json::Value) -> ConstitutionalVerdict;
}

/// Default engine used when no external reviewer is configured. Always
/// returns a clean verdict; Stage 4 of the pipeline becomes a no-op.
pub struct NullConstitutionalEngine;

#[async_trait]
impl ConstitutionalEngine for NullConstitutionalEngine {
    async fn review(&self, _thought: &str, _action: &str, _params: &serde_json::Value) -> ConstitutionalVerdict {
        ConstitutionalVerdict::clean()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn null_engine_always_passes() {
        let engine = NullConstitutionalEngine;
        let verdict = engine.review("thought", "action", &json!({})).await;
        assert!(verdict.violations.is_empty());
        assert!(verdict.highest_severity().is_none());
    }

    #[test]
    fn highest_severity_picks_max() {
        let verdict = ConstitutionalVerdict {
            violations: vec![
                Violation { principle: "p1".into(), severity: Severity::Low, detail: "d".into() },
                Violation { principle: "p2".into(), severity: Severity::Critical, detail: "d".into() },
                Violation { principle: "p3".into(), severity: Severity::Medium, detail: "d".into() },
            ],
        };
        assert_eq!(verdict.highest_severity(), Some(Severity::Critical));
    }
}
