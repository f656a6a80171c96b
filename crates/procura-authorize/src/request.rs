//! Authorization request and validation outcome types.

use serde::{Deserialize, Serialize};

use procura_core::{
    CorrelationId, DelegationId, Restriction, ScopeSet, SubjectId, Timestamp, ValidityWindow,
};

/// An incoming request for delegated authority.
///
/// Validation only inspects the request; the delegation record itself is
/// created by the chain manager after the request passes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationRequest {
    /// Entity granting the power.
    pub principal: SubjectId,

    /// Entity that would receive the power.
    pub delegate: SubjectId,

    /// Capabilities requested.
    pub scope: ScopeSet,

    /// Jurisdiction the power would be exercised under (ISO 3166-1 alpha-2).
    pub jurisdiction: String,

    /// Legal basis the delegation rests on: a statute, contract, or mandate
    /// reference. Free-form but never empty.
    pub legal_basis: String,

    /// Requested validity interval.
    pub validity: ValidityWindow,

    /// Parent delegation the request chains under, or `None` for a
    /// human-rooted request.
    pub parent: Option<DelegationId>,

    /// Restrictions on exercise, AND-combined.
    pub restrictions: Vec<Restriction>,
}

/// Jurisdiction context attached to a validated request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JurisdictionContext {
    /// The recognized jurisdiction code.
    pub code: String,

    /// Actions that need a second approver under this jurisdiction, on top
    /// of the global sensitivity policy.
    pub dual_control_actions: Vec<String>,
}

/// A successfully validated request.
///
/// The correlation id is fresh per validation and carried through
/// downstream decisions so the audit trail for one request can be
/// reassembled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    /// Correlation id for downstream decisions.
    pub correlation: CorrelationId,

    /// Jurisdiction rules in force for this request.
    pub jurisdiction: JurisdictionContext,

    /// When validation completed.
    pub validated_at: Timestamp,
}
