//! Result aggregation for multi-endpoint requests
//!
//! This module provides:
//! - The quorum policy deciding how many approvals a request needs
//! - Deny-wins reduction of per-endpoint outcomes into one decision

pub mod engine;

pub use engine::{Decision, QuorumPolicy};
