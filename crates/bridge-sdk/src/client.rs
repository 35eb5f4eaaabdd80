//! Thin HTTP client over the VSM endpoints (spec.md §4.7) used by both
//! branches of the Hybrid Interceptor and by `policy_sync`.

use std::time::Duration;

use vsm_protocol::{FailRequest, FailResponse, ObserveRequest, ObserveResponse, PolicySnapshot, SegmentCommit, SegmentProposal};

#[derive(Clone)]
pub struct KernelClient {
    http: reqwest::Client,
    base_url: String,
}

impl KernelClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { http: reqwest::Client::new(), base_url: base_url.into() }
    }

    pub async fn propose(&self, proposal: &SegmentProposal, timeout_ms: u64) -> reqwest::Result<SegmentCommit> {
        self.http
            .post(format!("{}/v1/segment/propose", self.base_url))
            .timeout(Duration::from_millis(timeout_ms))
            .json(proposal)
            .send()
            .await?
            .error_for_status()?
            .json::<SegmentCommit>()
            .await
    }

    pub async fn observe(&self, req: &ObserveRequest, timeout_ms: u64) -> reqwest::Result<ObserveResponse> {
        self.http
            .post(format!("{}/v1/segment/observe", self.base_url))
            .timeout(Duration::from_millis(timeout_ms))
            .json(req)
            .send()
            .await?
            .error_for_status()?
            .json::<ObserveResponse>()
            .await
    }

    pub async fn fail(&self, req: &FailRequest, timeout_ms: u64) -> reqwest::Result<FailResponse> {
        self.http
            .post(format!("{}/v1/segment/fail", self.base_url))
            .timeout(Duration::from_millis(timeout_ms))
            .json(req)
            .send()
            .await?
            .error_for_status()?
            .json::<FailResponse>()
            .await
    }

    pub async fn policy_sync(&self, timeout_ms: u64) -> reqwest::Result<PolicySnapshot> {
        self.http
            .get(format!("{}/v1/policy/sync", self.base_url))
            .timeout(Duration::from_millis(timeout_ms))
            .send()
            .await?
            .error_for_status()?
            .json::<PolicySnapshot>()
            .await
    }
}
