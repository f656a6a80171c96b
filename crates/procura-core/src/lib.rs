//! Core types for the Procura delegated-authority system.
//!
//! This crate carries the vocabulary shared by every other Procura crate:
//! strongly typed identifiers, capability scope sets, delegation
//! restrictions, validity windows, the unified error type, canonical
//! hashing, the injectable clock, and configuration.
//!
//! Nothing here performs I/O; collaborator seams live in `procura-store`.

pub mod approval;
pub mod audit;
pub mod config;
pub mod delegation;
pub mod errors;
pub mod hash;
pub mod ids;
pub mod restrictions;
pub mod scope;
pub mod time;
pub mod token;

pub use approval::{Approval, ApprovalRecord, ApprovalStatus, ApproverRole};
pub use audit::{AuditEntry, AuditEntryBuilder, AuditResult};
pub use config::{
    ApprovalConfig, DelegationConfig, JurisdictionRule, ProcuraConfig, TokenConfig,
};
pub use delegation::{
    Attestation, CascadeReport, DelegationStatus, PowerDelegation, SignableCore,
};
pub use errors::{ProcuraError, Result};
pub use hash::{canonical_hash, Hash32};
pub use ids::{ApprovalId, ChainKey, CorrelationId, DelegationId, EntryId, SubjectId, TokenId};
pub use restrictions::{all_permit, ExerciseContext, Restriction};
pub use scope::ScopeSet;
pub use time::{Clock, ManualClock, SystemClock, Timestamp, ValidityWindow};
pub use token::{EnhancedToken, TokenStatus};
