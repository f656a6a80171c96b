//! Unified error type for Procura operations.
//!
//! One enum covers the whole subsystem so callers can match on kind without
//! chasing per-crate error hierarchies. Expected-frequent outcomes (an
//! expired token, a still-pending approval) are normal return values in the
//! owning crates, never variants here.

use serde::{Deserialize, Serialize};

/// Unified error type for all Procura operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum ProcuraError {
    /// Request is malformed: empty scope, missing fields, unknown jurisdiction.
    #[error("invalid request: {message}")]
    InvalidRequest {
        /// What was malformed about the request.
        message: String,
    },

    /// The requested validity window has already elapsed.
    #[error("expired context: {message}")]
    ExpiredContext {
        /// Which window elapsed and when.
        message: String,
    },

    /// A referenced parent delegation is suspended or revoked.
    #[error("parent delegation not active: {message}")]
    ParentNotActive {
        /// The parent delegation and its current status.
        message: String,
    },

    /// A root delegation was requested by a principal that is not a verified human.
    #[error("root delegation must be created by a verified human: {message}")]
    RootMustBeHuman {
        /// The offending principal.
        message: String,
    },

    /// Creating the delegation would exceed the configured cascade depth.
    #[error("delegation depth exceeded: {message}")]
    DepthExceeded {
        /// Observed and permitted depth.
        message: String,
    },

    /// A delegation appeared in its own ancestor chain.
    #[error("cyclic delegation detected: {message}")]
    CyclicDelegation {
        /// The delegation that closed the cycle.
        message: String,
    },

    /// A child delegation requested scope beyond its parent's grant.
    #[error("scope escalation: {message}")]
    ScopeEscalation {
        /// The capabilities that exceeded the parent scope.
        message: String,
    },

    /// The ancestor chain no longer validates end to end.
    #[error("delegation cascade broken: {message}")]
    CascadeBroken {
        /// Where the cascade failed.
        message: String,
    },

    /// A token requested scope the bound delegation does not grant.
    #[error("scope not granted: {message}")]
    ScopeNotGranted {
        /// The capabilities missing from the delegation grant.
        message: String,
    },

    /// The same identity attempted to satisfy both approver roles.
    #[error("self-approval rejected: {message}")]
    SelfApprovalRejected {
        /// The approver that double-approved.
        message: String,
    },

    /// A referenced record does not exist.
    #[error("not found: {message}")]
    NotFound {
        /// What was looked up.
        message: String,
    },

    /// Hash-chain verification failed: tampering or store corruption.
    ///
    /// Never retried; surfaced to the caller as an alarm-worthy condition.
    #[error("integrity violation: {message}")]
    Integrity {
        /// Which chain broke and where.
        message: String,
    },

    /// A collaborator (store, signer, verifier) failed after bounded retries.
    #[error("collaborator unavailable: {message}")]
    Unavailable {
        /// Which collaborator failed and how.
        message: String,
    },

    /// Canonical serialization failed.
    #[error("serialization error: {message}")]
    Serialization {
        /// The underlying serializer failure.
        message: String,
    },

    /// Programmer error: invalid configuration or broken internal invariant.
    #[error("internal error: {message}")]
    Internal {
        /// What invariant broke.
        message: String,
    },
}

impl ProcuraError {
    /// Create an invalid-request error.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Create an expired-context error.
    pub fn expired_context(message: impl Into<String>) -> Self {
        Self::ExpiredContext {
            message: message.into(),
        }
    }

    /// Create a parent-not-active error.
    pub fn parent_not_active(message: impl Into<String>) -> Self {
        Self::ParentNotActive {
            message: message.into(),
        }
    }

    /// Create a root-must-be-human error.
    pub fn root_must_be_human(message: impl Into<String>) -> Self {
        Self::RootMustBeHuman {
            message: message.into(),
        }
    }

    /// Create a depth-exceeded error.
    pub fn depth_exceeded(message: impl Into<String>) -> Self {
        Self::DepthExceeded {
            message: message.into(),
        }
    }

    /// Create a cyclic-delegation error.
    pub fn cyclic_delegation(message: impl Into<String>) -> Self {
        Self::CyclicDelegation {
            message: message.into(),
        }
    }

    /// Create a scope-escalation error.
    pub fn scope_escalation(message: impl Into<String>) -> Self {
        Self::ScopeEscalation {
            message: message.into(),
        }
    }

    /// Create a cascade-broken error.
    pub fn cascade_broken(message: impl Into<String>) -> Self {
        Self::CascadeBroken {
            message: message.into(),
        }
    }

    /// Create a scope-not-granted error.
    pub fn scope_not_granted(message: impl Into<String>) -> Self {
        Self::ScopeNotGranted {
            message: message.into(),
        }
    }

    /// Create a self-approval-rejected error.
    pub fn self_approval_rejected(message: impl Into<String>) -> Self {
        Self::SelfApprovalRejected {
            message: message.into(),
        }
    }

    /// Create a not-found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Create an integrity-violation error.
    pub fn integrity(message: impl Into<String>) -> Self {
        Self::Integrity {
            message: message.into(),
        }
    }

    /// Create an unavailable error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Create a serialization error.
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether this error is an authorization denial.
    ///
    /// Denials are audited with `result = denied`; validation failures and
    /// collaborator failures are audited as plain failures.
    pub const fn is_denial(&self) -> bool {
        matches!(
            self,
            Self::ParentNotActive { .. }
                | Self::RootMustBeHuman { .. }
                | Self::DepthExceeded { .. }
                | Self::CyclicDelegation { .. }
                | Self::ScopeEscalation { .. }
                | Self::CascadeBroken { .. }
                | Self::ScopeNotGranted { .. }
                | Self::SelfApprovalRejected { .. }
        )
    }
}

impl From<serde_json::Error> for ProcuraError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err.to_string())
    }
}

/// Standard Result type for Procura operations.
pub type Result<T> = std::result::Result<T, ProcuraError>;
