//! Shared domain layer for the Analemma Bridge Governance Core.
//!
//! This crate is the single source of truth linked by both the VSM gateway
//! and the embedded bridge SDK: the Ring/Capability/Injection/Destructive
//! policy registry (`policy`), the Unicode normalization pipeline
//! (`normalization`), configuration (`config`), the shared error type
//! (`error`), structured audit events (`trace`), and recognized environment
//! variable names/defaults (`env`).

pub mod config;
pub mod env;
pub mod error;
pub mod normalization;
pub mod policy;
pub mod trace;

pub use error::{Error, Result};
pub use policy::Ring;
