//! Analemma Bridge VSM gateway: the server half of the loop-virtualization
//! governance protocol (spec.md §1, §3).

pub mod api;
pub mod audit;
pub mod bootstrap;
pub mod constitutional;
pub mod pipeline;
pub mod recovery;
pub mod reorder;
pub mod state;

pub use bootstrap::build_state;
pub use state::AppState;

use axum::Router;
use tower_http::trace::TraceLayer;

/// Per-IP token bucket in front of the whole router, when
/// `[server.rate_limit]` is configured (spec.md §9 ambient concerns).
pub fn app(state: AppState) -> Router {
    let rate_limit = state.config.server.rate_limit.clone();
    let router = api::router(state).layer(TraceLayer::new_for_http());

    match rate_limit {
        Some(rl) => {
            use tower_governor::governor::GovernorConfigBuilder;

            let gov_config = GovernorConfigBuilder::default()
                .per_second(rl.requests_per_second)
                .burst_size(rl.burst_size)
                .finish()
                .expect("rate_limit: requests_per_second and burst_size must be > 0");

            tracing::info!(
                requests_per_second = rl.requests_per_second,
                burst_size = rl.burst_size,
                "per-IP rate limiting enabled"
            );

            router.layer(tower_governor::GovernorLayer { config: std::sync::Arc::new(gov_config) })
        }
        None => router,
    }
}
