//! Bearer tokens representing a granted power.

use serde::{Deserialize, Serialize};

use crate::ids::{DelegationId, SubjectId, TokenId};
use crate::scope::ScopeSet;
use crate::time::Timestamp;

/// Lifecycle status of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenStatus {
    /// Usable, subject to expiry and cascade re-checks.
    Valid,
    /// Explicitly revoked. Terminal.
    Revoked,
    /// Marked expired by the lifecycle manager. Terminal.
    Expired,
}

impl std::fmt::Display for TokenStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Valid => f.write_str("valid"),
            Self::Revoked => f.write_str("revoked"),
            Self::Expired => f.write_str("expired"),
        }
    }
}

/// A bearer credential bound to a delegation.
///
/// The token's scope is checked against the delegation's grant at issuance
/// only; retroactive effect comes from revoking the delegation, which makes
/// every cascade re-check fail from then on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnhancedToken {
    /// Unique identifier.
    pub id: TokenId,

    /// Delegation this token draws its authority from.
    ///
    /// `None` for non-delegated tokens, which skip cascade re-checks.
    pub delegation: Option<DelegationId>,

    /// Subject the token was issued to.
    pub subject: SubjectId,

    /// Capabilities the token carries; subset of the delegation's grant.
    pub scope: ScopeSet,

    /// When the token was issued.
    pub issued_at: Timestamp,

    /// First instant at which the token no longer validates.
    pub expires_at: Timestamp,

    /// Current lifecycle status.
    pub status: TokenStatus,
}

impl EnhancedToken {
    /// Whether `at` falls within the token's `[issued_at, expires_at)` window.
    pub fn in_window(&self, at: Timestamp) -> bool {
        self.issued_at <= at && at < self.expires_at
    }
}
