//! Dual-control approval records.

use serde::{Deserialize, Serialize};

use crate::ids::{ApprovalId, DelegationId, SubjectId};
use crate::time::Timestamp;

/// The two approver roles in a dual-control decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApproverRole {
    /// First sign-off.
    Primary,
    /// Second, independent sign-off.
    Secondary,
}

/// A recorded sign-off by one approver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Approval {
    /// Who approved.
    pub approver: SubjectId,
    /// Role this sign-off fills.
    pub role: ApproverRole,
    /// When the sign-off was recorded.
    pub approved_at: Timestamp,
}

/// Status of an approval request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    /// Waiting for one or both sign-offs.
    Pending,
    /// Both roles signed off before the deadline. Terminal.
    Approved,
    /// An approver rejected the action. Terminal.
    Rejected,
    /// The deadline passed before both sign-offs arrived. Terminal.
    Expired,
}

impl ApprovalStatus {
    /// Whether the record admits no further transitions.
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl std::fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => f.write_str("pending"),
            Self::Approved => f.write_str("approved"),
            Self::Rejected => f.write_str("rejected"),
            Self::Expired => f.write_str("expired"),
        }
    }
}

/// A dual-control approval request and its collected sign-offs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRecord {
    /// Unique identifier.
    pub id: ApprovalId,

    /// Action awaiting approval.
    pub action: String,

    /// Delegation under which the action would be exercised.
    pub delegation: DelegationId,

    /// Who asked for the action.
    pub requester: SubjectId,

    /// Collected sign-offs, at most one per role.
    pub approvals: Vec<Approval>,

    /// Current status.
    pub status: ApprovalStatus,

    /// Instant after which a pending record expires.
    pub deadline: Timestamp,

    /// When the request was opened.
    pub requested_at: Timestamp,
}

impl ApprovalRecord {
    /// The sign-off filling `role`, if recorded.
    pub fn approval_for(&self, role: ApproverRole) -> Option<&Approval> {
        self.approvals.iter().find(|a| a.role == role)
    }

    /// Whether `approver` has already signed off in any role.
    pub fn has_approved(&self, approver: &SubjectId) -> bool {
        self.approvals.iter().any(|a| &a.approver == approver)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses() {
        assert!(!ApprovalStatus::Pending.is_terminal());
        assert!(ApprovalStatus::Approved.is_terminal());
        assert!(ApprovalStatus::Rejected.is_terminal());
        assert!(ApprovalStatus::Expired.is_terminal());
    }

    #[test]
    fn lookup_by_role_and_approver() {
        let record = ApprovalRecord {
            id: ApprovalId::random(),
            action: "wire_funds".into(),
            delegation: DelegationId::random(),
            requester: SubjectId::new("agent-1"),
            approvals: vec![Approval {
                approver: SubjectId::new("alice"),
                role: ApproverRole::Primary,
                approved_at: Timestamp::from_unix_secs(10),
            }],
            status: ApprovalStatus::Pending,
            deadline: Timestamp::from_unix_secs(1_000),
            requested_at: Timestamp::from_unix_secs(0),
        };

        assert!(record.approval_for(ApproverRole::Primary).is_some());
        assert!(record.approval_for(ApproverRole::Secondary).is_none());
        assert!(record.has_approved(&SubjectId::new("alice")));
        assert!(!record.has_approved(&SubjectId::new("bob")));
    }
}
