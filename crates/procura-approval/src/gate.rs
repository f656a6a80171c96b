//! The dual-control gate.

use std::sync::Arc;

use procura_core::{
    Approval, ApprovalConfig, ApprovalId, ApprovalRecord, ApprovalStatus, ApproverRole,
    AuditEntry, AuditResult, ChainKey, Clock, DelegationId, ProcuraError, Result, SubjectId,
};
use procura_ledger::AuditLedger;
use procura_store::ApprovalStore;

/// Decides which actions need a second approver and collects the sign-offs.
///
/// A request moves `Pending -> Approved` once both roles are filled by
/// distinct identities, `Pending -> Rejected` on any rejection, and
/// `Pending -> Expired` when the deadline passes first. All three end
/// states are terminal.
pub struct DualControlGate {
    approvals: Arc<dyn ApprovalStore>,
    ledger: Arc<AuditLedger>,
    clock: Arc<dyn Clock>,
    config: ApprovalConfig,
}

impl DualControlGate {
    /// Create a gate over the given collaborators.
    pub fn new(
        approvals: Arc<dyn ApprovalStore>,
        ledger: Arc<AuditLedger>,
        clock: Arc<dyn Clock>,
        config: ApprovalConfig,
    ) -> Self {
        Self {
            approvals,
            ledger,
            clock,
            config,
        }
    }

    /// Whether `action` at `amount` falls under the dual-control policy.
    ///
    /// An action is sensitive if it matches any configured pattern
    /// (trailing `*` matches any suffix) or if its amount exceeds the
    /// configured threshold.
    pub fn requires_approval(&self, action: &str, amount: Option<f64>) -> bool {
        let pattern_hit = self
            .config
            .sensitive_actions
            .iter()
            .any(|pattern| matches_action(pattern, action));
        let amount_hit = match (self.config.amount_threshold, amount) {
            (Some(threshold), Some(amount)) => amount > threshold,
            _ => false,
        };
        pattern_hit || amount_hit
    }

    /// Like [`Self::requires_approval`], with jurisdiction-local patterns
    /// considered on top of the global policy.
    pub fn requires_approval_with(
        &self,
        action: &str,
        amount: Option<f64>,
        local_patterns: &[String],
    ) -> bool {
        self.requires_approval(action, amount)
            || local_patterns
                .iter()
                .any(|pattern| matches_action(pattern, action))
    }

    /// Open a pending approval request for `action` under `delegation`.
    ///
    /// The deadline is `now + approval_ttl_secs`; if both sign-offs have
    /// not arrived by then the request expires.
    pub async fn request_approval(
        &self,
        action: impl Into<String>,
        delegation: DelegationId,
        requester: SubjectId,
    ) -> Result<ApprovalRecord> {
        let action = action.into();
        if action.is_empty() {
            return Err(ProcuraError::invalid_request("approval action is empty"));
        }

        let now = self.clock.now();
        let record = ApprovalRecord {
            id: ApprovalId::random(),
            action,
            delegation,
            requester: requester.clone(),
            approvals: Vec::new(),
            status: ApprovalStatus::Pending,
            deadline: now.plus_secs(self.config.approval_ttl_secs),
            requested_at: now,
        };
        self.approvals.put(record.clone()).await?;
        tracing::info!(approval = %record.id, action = %record.action, "approval requested");

        self.ledger
            .append(
                ChainKey::from(&delegation),
                AuditEntry::builder(requester, "approval.request")
                    .target(record.id.to_string())
                    .result(AuditResult::Success)
                    .metadata("action", record.action.clone())
                    .metadata("deadline", record.deadline.to_string()),
            )
            .await?;
        Ok(record)
    }

    /// Record a sign-off for `role` on a pending request.
    ///
    /// The approver must be distinct from the requester and from every
    /// approver already on the record (`SelfApprovalRejected`). Filling the
    /// second role flips the record to `Approved`. A request whose deadline
    /// has passed expires instead, and the expired record is returned.
    pub async fn approve(
        &self,
        id: ApprovalId,
        approver: SubjectId,
        role: ApproverRole,
    ) -> Result<ApprovalRecord> {
        let mut record = self.fetch_pending(id).await?;
        if record.status == ApprovalStatus::Expired {
            return Ok(record);
        }

        if approver == record.requester {
            self.audit_denied(&record, &approver, "approval.approve", "requester cannot approve")
                .await?;
            return Err(ProcuraError::self_approval_rejected(format!(
                "{approver} requested the action and cannot approve it"
            )));
        }
        if record.has_approved(&approver) {
            self.audit_denied(&record, &approver, "approval.approve", "already signed off")
                .await?;
            return Err(ProcuraError::self_approval_rejected(format!(
                "{approver} has already signed off on approval {id}"
            )));
        }
        if record.approval_for(role).is_some() {
            return Err(ProcuraError::invalid_request(format!(
                "approval {id} already has a {role:?} sign-off"
            )));
        }

        record.approvals.push(Approval {
            approver: approver.clone(),
            role,
            approved_at: self.clock.now(),
        });
        if record.approval_for(ApproverRole::Primary).is_some()
            && record.approval_for(ApproverRole::Secondary).is_some()
        {
            record.status = ApprovalStatus::Approved;
        }
        self.approvals.put(record.clone()).await?;
        tracing::info!(
            approval = %record.id,
            approver = %approver,
            status = %record.status,
            "sign-off recorded"
        );

        self.ledger
            .append(
                ChainKey::from(&record.delegation),
                AuditEntry::builder(approver, "approval.approve")
                    .target(record.id.to_string())
                    .result(AuditResult::Success)
                    .metadata("role", format!("{role:?}"))
                    .metadata("status", record.status.to_string()),
            )
            .await?;
        Ok(record)
    }

    /// Reject a pending request. Terminal.
    pub async fn reject(
        &self,
        id: ApprovalId,
        approver: SubjectId,
        reason: &str,
    ) -> Result<ApprovalRecord> {
        let mut record = self.fetch_pending(id).await?;
        if record.status == ApprovalStatus::Expired {
            return Ok(record);
        }

        record.status = ApprovalStatus::Rejected;
        self.approvals.put(record.clone()).await?;
        tracing::info!(approval = %record.id, approver = %approver, reason, "approval rejected");

        self.ledger
            .append(
                ChainKey::from(&record.delegation),
                AuditEntry::builder(approver, "approval.reject")
                    .target(record.id.to_string())
                    .result(AuditResult::Success)
                    .metadata("reason", reason),
            )
            .await?;
        Ok(record)
    }

    /// Fetch a request's current record, applying lazy expiry.
    pub async fn status(&self, id: ApprovalId) -> Result<ApprovalRecord> {
        let record = self
            .approvals
            .get(id)
            .await?
            .ok_or_else(|| ProcuraError::not_found(format!("approval {id}")))?;
        self.expire_if_due(record).await
    }

    /// Fetch a record for mutation: must exist and not already be terminal.
    ///
    /// Returns the record with lazy expiry applied; callers short-circuit
    /// on `Expired`.
    async fn fetch_pending(&self, id: ApprovalId) -> Result<ApprovalRecord> {
        let record = self
            .approvals
            .get(id)
            .await?
            .ok_or_else(|| ProcuraError::not_found(format!("approval {id}")))?;
        if record.status.is_terminal() {
            return Err(ProcuraError::invalid_request(format!(
                "approval {id} is already {}",
                record.status
            )));
        }
        self.expire_if_due(record).await
    }

    async fn expire_if_due(&self, mut record: ApprovalRecord) -> Result<ApprovalRecord> {
        if record.status == ApprovalStatus::Pending && self.clock.now() >= record.deadline {
            record.status = ApprovalStatus::Expired;
            self.approvals.put(record.clone()).await?;
            tracing::info!(approval = %record.id, "approval expired");
            self.ledger
                .append(
                    ChainKey::from(&record.delegation),
                    AuditEntry::builder("approval-gate", "approval.expire")
                        .target(record.id.to_string())
                        .result(AuditResult::Success)
                        .metadata("deadline", record.deadline.to_string()),
                )
                .await?;
        }
        Ok(record)
    }

    async fn audit_denied(
        &self,
        record: &ApprovalRecord,
        actor: &SubjectId,
        action: &str,
        detail: &str,
    ) -> Result<()> {
        self.ledger
            .append(
                ChainKey::from(&record.delegation),
                AuditEntry::builder(actor.clone(), action)
                    .target(record.id.to_string())
                    .result(AuditResult::Denied)
                    .metadata("detail", detail),
            )
            .await?;
        Ok(())
    }
}

/// Match `action` against a sensitivity pattern.
///
/// A trailing `*` matches any suffix; otherwise the match is exact.
fn matches_action(pattern: &str, action: &str) -> bool {
    pattern
        .strip_suffix('*')
        .map_or(pattern == action, |prefix| action.starts_with(prefix))
}
