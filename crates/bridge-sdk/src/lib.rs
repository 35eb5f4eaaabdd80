//! Analemma Bridge SDK: the client-side half of the loop-virtualization
//! governance protocol (spec.md §1, §4.3, §4.8, §4.9).
//!
//! An agent runtime embeds [`Bridge`] and wraps each Thought-Action-
//! Observation step in [`Bridge::segment`]. The returned [`handle::Segment`]
//! tells the caller whether to proceed, and is consumed afterward to report
//! the outcome back to the gateway (synchronously in Strict mode,
//! fire-and-forget in Optimistic mode).

pub mod bridge;
pub mod client;
pub mod config;
pub mod destructive;
pub mod error;
pub mod handle;
pub mod l1;
pub mod policy_sync;

pub use bridge::Bridge;
pub use config::{BridgeConfig, InterceptorMode, NetworkFailureMode};
pub use error::{BridgeError, Result};
pub use handle::Segment;
pub use l1::{L1Result, LocalL1Checker};
