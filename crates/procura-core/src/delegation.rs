//! Power delegation records.
//!
//! A [`PowerDelegation`] is the stored fact that a principal granted a
//! delegate a set of capabilities under restrictions. Parent references are
//! ids, never pointers; the cascade from a delegation up to its human root
//! is derived by the chain manager, not stored.

use serde::{Deserialize, Serialize};

use crate::hash::Hash32;
use crate::ids::{DelegationId, SubjectId};
use crate::restrictions::Restriction;
use crate::scope::ScopeSet;
use crate::time::{Timestamp, ValidityWindow};

/// Lifecycle status of a delegation.
///
/// Status changes are the only mutation a stored delegation ever sees.
/// `Revoked` is terminal; `Suspended` may be reinstated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DelegationStatus {
    /// In force; cascades through this delegation verify.
    Active,
    /// Temporarily out of force; may be reinstated.
    Suspended,
    /// Permanently withdrawn. Terminal.
    Revoked,
}

impl DelegationStatus {
    /// Whether the delegation is currently in force.
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Active)
    }

    /// Whether the status admits no further transitions.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Revoked)
    }
}

impl std::fmt::Display for DelegationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => f.write_str("active"),
            Self::Suspended => f.write_str("suspended"),
            Self::Revoked => f.write_str("revoked"),
        }
    }
}

/// Signed assertion supporting a delegation's authenticity.
///
/// Produced by the configured `Signer` over the delegation's signable core;
/// checked during cascade verification when a signer is available.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attestation {
    /// Hash of the signable core the signature covers.
    pub payload_hash: Hash32,
    /// Detached signature bytes; algorithm is the signer's concern.
    pub signature: Vec<u8>,
}

/// A stored delegation of power from a principal to a delegate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerDelegation {
    /// Unique identifier.
    pub id: DelegationId,

    /// Entity granting the power.
    pub principal: SubjectId,

    /// Entity receiving the power.
    pub delegate: SubjectId,

    /// Capabilities granted. Always a subset of the parent's grant.
    pub scope: ScopeSet,

    /// Restrictions on exercise, AND-combined. May be empty.
    pub restrictions: Vec<Restriction>,

    /// Interval during which the delegation is in force.
    pub validity: ValidityWindow,

    /// Current lifecycle status.
    pub status: DelegationStatus,

    /// Parent delegation, or `None` for a human-rooted delegation.
    pub parent: Option<DelegationId>,

    /// When the record was created.
    pub created_at: Timestamp,

    /// Optional signer attestation over the signable core.
    pub attestation: Option<Attestation>,
}

impl PowerDelegation {
    /// Whether this is a root delegation created directly by a verified human.
    pub const fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// The fields an attestation signature covers.
    ///
    /// Status and attestation itself are excluded: status mutates over the
    /// record's life and the signature cannot cover itself.
    pub fn signable_core(&self) -> SignableCore<'_> {
        SignableCore {
            id: self.id,
            principal: &self.principal,
            delegate: &self.delegate,
            scope: &self.scope,
            validity: self.validity,
            parent: self.parent,
            created_at: self.created_at,
        }
    }
}

/// Borrowed view of the attestation-covered fields of a delegation.
#[derive(Debug, Serialize)]
pub struct SignableCore<'a> {
    /// Delegation id.
    pub id: DelegationId,
    /// Granting principal.
    pub principal: &'a SubjectId,
    /// Receiving delegate.
    pub delegate: &'a SubjectId,
    /// Granted capabilities.
    pub scope: &'a ScopeSet,
    /// Validity interval.
    pub validity: ValidityWindow,
    /// Parent reference.
    pub parent: Option<DelegationId>,
    /// Creation time.
    pub created_at: Timestamp,
}

/// Result of walking a delegation's ancestor chain to its root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CascadeReport {
    /// Delegation the walk started from.
    pub delegation: DelegationId,
    /// Path from the starting delegation up to and including the root.
    pub path: Vec<DelegationId>,
    /// Principal of the root delegation, a verified human.
    pub root_principal: SubjectId,
    /// Number of hops from the starting delegation to the root.
    pub depth: u8,
}
