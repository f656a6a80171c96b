//! Delegation chain management.
//!
//! The [`DelegationChainManager`] owns the delegation graph: it creates
//! delegation records, re-walks cascades to their human root, and handles
//! status transitions. Every cascade is depth-limited, cycle-free, and
//! anchored at a delegation whose principal is an identity-verified human.

pub mod cascade;
pub mod manager;

pub use cascade::check_cascade;
pub use manager::{DelegationChainManager, DelegationRequest};
