//! Entry point for authorization requests and the wired-up authority
//! service.
//!
//! [`AuthorizationValidator`] is the front door: it checks a request's
//! shape, jurisdiction, and validity window before any delegation is
//! created, and records exactly one audit entry per decision.
//! [`AuthorityService`] wires the validator together with the delegation
//! chain manager, token lifecycle manager, dual-control gate, and audit
//! ledger into one facade.

pub mod request;
pub mod service;
pub mod validator;

pub use request::{AuthorizationRequest, JurisdictionContext, ValidationOutcome};
pub use service::{AuthorityService, ExerciseDecision};
pub use validator::AuthorizationValidator;
