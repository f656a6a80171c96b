//! The wired-up authority service.

use std::sync::Arc;

use procura_core::{
    all_permit, ApprovalId, ApprovalRecord, ApproverRole, AuditEntry, AuditResult, CascadeReport,
    ChainKey, Clock, DelegationId, EnhancedToken, ExerciseContext, PowerDelegation, ProcuraConfig,
    ProcuraError, Result, ScopeSet, SubjectId, SystemClock, TokenId,
};
use procura_ledger::{AuditFilter, AuditLedger, ChainVerification};
use procura_store::{
    ApprovalStore, CascadeVerifier, DelegationStore, IdentityVerifier, LedgerStore,
    MemoryApprovalStore, MemoryDelegationStore, MemoryLedgerStore, MemoryTokenStore, Signer,
    TokenStore,
};

use procura_approval::DualControlGate;
use procura_delegation::{DelegationChainManager, DelegationRequest};
use procura_token::{TokenLifecycleManager, TokenValidation};

use crate::request::{AuthorizationRequest, ValidationOutcome};
use crate::validator::AuthorizationValidator;

/// Outcome of an exercise authorization check.
///
/// Denials are values, not errors: a token that fails validation or a
/// restriction that bites is routine, and the caller decides what to do
/// with the decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExerciseDecision {
    /// The exercise may proceed.
    Permitted {
        /// Whether a second approver must sign off before execution.
        requires_dual_control: bool,
    },
    /// The exercise may not proceed.
    Denied {
        /// Why the exercise was refused.
        reason: String,
    },
}

impl ExerciseDecision {
    /// Whether the exercise was permitted.
    pub const fn is_permitted(&self) -> bool {
        matches!(self, Self::Permitted { .. })
    }
}

/// One facade over the five Procura components, sharing one ledger and one
/// clock.
///
/// The facade owns the wiring: the chain manager doubles as the token
/// manager's cascade verifier, and jurisdiction-local dual-control rules
/// from validation feed the gate's decision.
pub struct AuthorityService {
    validator: AuthorizationValidator,
    delegations: Arc<DelegationChainManager>,
    delegation_store: Arc<dyn DelegationStore>,
    tokens: TokenLifecycleManager,
    gate: DualControlGate,
    ledger: Arc<AuditLedger>,
    clock: Arc<dyn Clock>,
    config: ProcuraConfig,
}

impl AuthorityService {
    /// Wire a service over explicit collaborators.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        delegation_store: Arc<dyn DelegationStore>,
        token_store: Arc<dyn TokenStore>,
        ledger_store: Arc<dyn LedgerStore>,
        approval_store: Arc<dyn ApprovalStore>,
        identity: Arc<dyn IdentityVerifier>,
        signer: Option<Arc<dyn Signer>>,
        clock: Arc<dyn Clock>,
        config: ProcuraConfig,
    ) -> Result<Self> {
        config.validate()?;

        let ledger = Arc::new(AuditLedger::new(ledger_store, clock.clone()));
        let mut delegations = DelegationChainManager::new(
            delegation_store.clone(),
            identity,
            ledger.clone(),
            clock.clone(),
            config.delegation.clone(),
        );
        if let Some(signer) = signer {
            delegations = delegations.with_signer(signer);
        }
        let delegations = Arc::new(delegations);

        let cascades: Arc<dyn CascadeVerifier> = delegations.clone();
        let tokens = TokenLifecycleManager::new(
            token_store,
            cascades,
            ledger.clone(),
            clock.clone(),
            config.token.clone(),
        );
        let gate = DualControlGate::new(
            approval_store,
            ledger.clone(),
            clock.clone(),
            config.approval.clone(),
        );
        let validator = AuthorizationValidator::new(
            delegation_store.clone(),
            ledger.clone(),
            clock.clone(),
            config.clone(),
        );

        Ok(Self {
            validator,
            delegations,
            delegation_store,
            tokens,
            gate,
            ledger,
            clock,
            config,
        })
    }

    /// Wire a service over the in-memory reference stores.
    pub fn in_memory(
        identity: Arc<dyn IdentityVerifier>,
        clock: Arc<dyn Clock>,
        config: ProcuraConfig,
    ) -> Result<Self> {
        Self::new(
            Arc::new(MemoryDelegationStore::new()),
            Arc::new(MemoryTokenStore::new()),
            Arc::new(MemoryLedgerStore::new()),
            Arc::new(MemoryApprovalStore::new()),
            identity,
            None,
            clock,
            config,
        )
    }

    /// Wire an in-memory service on the system clock.
    pub fn in_memory_default(
        identity: Arc<dyn IdentityVerifier>,
        config: ProcuraConfig,
    ) -> Result<Self> {
        Self::in_memory(identity, Arc::new(SystemClock), config)
    }

    /// Validate an authorization request. See [`AuthorizationValidator`].
    pub async fn validate_request(
        &self,
        request: &AuthorizationRequest,
    ) -> Result<ValidationOutcome> {
        self.validator.validate(request).await
    }

    /// Validate `request` and, if it passes, create the delegation.
    pub async fn grant_delegation(
        &self,
        request: AuthorizationRequest,
    ) -> Result<(ValidationOutcome, PowerDelegation)> {
        let outcome = self.validator.validate(&request).await?;
        let delegation = self
            .delegations
            .create_delegation(DelegationRequest {
                principal: request.principal,
                delegate: request.delegate,
                scope: request.scope,
                restrictions: request.restrictions,
                validity: request.validity,
                parent: request.parent,
            })
            .await?;
        Ok((outcome, delegation))
    }

    /// Fetch a delegation record.
    pub async fn delegation(&self, id: DelegationId) -> Result<PowerDelegation> {
        self.delegation_store
            .get(id)
            .await?
            .ok_or_else(|| ProcuraError::not_found(format!("delegation {id}")))
    }

    /// Re-walk a delegation's cascade to its human root.
    pub async fn verify_cascade(&self, id: DelegationId) -> Result<CascadeReport> {
        self.delegations.verify_cascade(id).await
    }

    /// Revoke a delegation. Terminal and idempotent.
    pub async fn revoke_delegation(
        &self,
        id: DelegationId,
        actor: &SubjectId,
        reason: &str,
    ) -> Result<()> {
        self.delegations.revoke(id, actor, reason).await
    }

    /// Suspend an active delegation.
    pub async fn suspend_delegation(
        &self,
        id: DelegationId,
        actor: &SubjectId,
        reason: &str,
    ) -> Result<()> {
        self.delegations.suspend(id, actor, reason).await
    }

    /// Reinstate a suspended delegation.
    pub async fn reinstate_delegation(
        &self,
        id: DelegationId,
        actor: &SubjectId,
        reason: &str,
    ) -> Result<()> {
        self.delegations.reinstate(id, actor, reason).await
    }

    /// Issue a token under `delegation` for `subject`.
    pub async fn issue_token(
        &self,
        delegation: DelegationId,
        subject: SubjectId,
        scope: ScopeSet,
        ttl_secs: Option<u64>,
    ) -> Result<EnhancedToken> {
        let record = self.delegation(delegation).await?;
        self.tokens.issue(&record, subject, scope, ttl_secs).await
    }

    /// Issue a token not bound to any delegation.
    pub async fn issue_unbound_token(
        &self,
        subject: SubjectId,
        scope: ScopeSet,
        ttl_secs: Option<u64>,
    ) -> Result<EnhancedToken> {
        self.tokens.issue_unbound(subject, scope, ttl_secs).await
    }

    /// Validate a token: status, window, cascade.
    pub async fn validate_token(&self, id: TokenId) -> Result<TokenValidation> {
        self.tokens.validate(id).await
    }

    /// Revoke a token. Idempotent.
    pub async fn revoke_token(&self, id: TokenId, actor: &SubjectId) -> Result<()> {
        self.tokens.revoke(id, actor).await
    }

    /// Atomically replace a token with a fresh one.
    pub async fn rotate_token(&self, id: TokenId, actor: &SubjectId) -> Result<EnhancedToken> {
        self.tokens.rotate(id, actor).await
    }

    /// Decide whether the holder of `token` may exercise `action` now.
    ///
    /// The token must validate, its scope must grant the action, and every
    /// restriction on the bound delegation must permit the exercise
    /// context. A permitted decision reports whether dual control applies
    /// under `jurisdiction` before the action runs. One audit entry is
    /// appended per decision.
    pub async fn authorize_exercise(
        &self,
        token: TokenId,
        action: &str,
        mut context: ExerciseContext,
        jurisdiction: &str,
    ) -> Result<ExerciseDecision> {
        context.at = self.clock.now();

        let record = match self.tokens.validate(token).await? {
            TokenValidation::Valid { token } => token,
            // The token manager already audited the failed validation.
            TokenValidation::Invalid { reason, detail } => {
                return Ok(ExerciseDecision::Denied {
                    reason: format!("token {reason}: {detail}"),
                });
            }
        };

        let decision = self
            .decide_exercise(&record, action, &context, jurisdiction)
            .await?;

        let chain = record.delegation.as_ref().map_or_else(
            || ChainKey::new(format!("token:{}", record.id)),
            ChainKey::from,
        );
        let mut builder = AuditEntry::builder(record.subject.clone(), "power.exercise")
            .target(action)
            .metadata("token", record.id.to_string());
        builder = match &decision {
            ExerciseDecision::Permitted {
                requires_dual_control,
            } => builder
                .result(AuditResult::Success)
                .metadata("dual_control", requires_dual_control.to_string()),
            ExerciseDecision::Denied { reason } => builder
                .result(AuditResult::Denied)
                .metadata("reason", reason.clone()),
        };
        self.ledger.append(chain, builder).await?;
        Ok(decision)
    }

    async fn decide_exercise(
        &self,
        token: &EnhancedToken,
        action: &str,
        context: &ExerciseContext,
        jurisdiction: &str,
    ) -> Result<ExerciseDecision> {
        if !token.scope.contains(action) {
            return Ok(ExerciseDecision::Denied {
                reason: format!("token scope does not grant {action}"),
            });
        }

        if let Some(delegation) = token.delegation {
            let record = self.delegation(delegation).await?;
            if !all_permit(&record.restrictions, context) {
                return Ok(ExerciseDecision::Denied {
                    reason: format!("a restriction on delegation {delegation} forbids this exercise"),
                });
            }
        }

        Ok(ExerciseDecision::Permitted {
            requires_dual_control: self.requires_approval(action, context.amount, jurisdiction),
        })
    }

    /// Whether `action` at `amount` needs a second approver under
    /// `jurisdiction`.
    ///
    /// Combines the global sensitivity policy with the jurisdiction's local
    /// dual-control list.
    pub fn requires_approval(
        &self,
        action: &str,
        amount: Option<f64>,
        jurisdiction: &str,
    ) -> bool {
        self.gate.requires_approval_with(
            action,
            amount,
            self.config.dual_control_actions_for(jurisdiction),
        )
    }

    /// Open a dual-control approval request.
    pub async fn request_approval(
        &self,
        action: impl Into<String>,
        delegation: DelegationId,
        requester: SubjectId,
    ) -> Result<ApprovalRecord> {
        self.gate.request_approval(action, delegation, requester).await
    }

    /// Record a sign-off on a pending approval request.
    pub async fn approve(
        &self,
        id: ApprovalId,
        approver: SubjectId,
        role: ApproverRole,
    ) -> Result<ApprovalRecord> {
        self.gate.approve(id, approver, role).await
    }

    /// Reject a pending approval request.
    pub async fn reject_approval(
        &self,
        id: ApprovalId,
        approver: SubjectId,
        reason: &str,
    ) -> Result<ApprovalRecord> {
        self.gate.reject(id, approver, reason).await
    }

    /// Current state of an approval request, with lazy expiry applied.
    pub async fn approval_status(&self, id: ApprovalId) -> Result<ApprovalRecord> {
        self.gate.status(id).await
    }

    /// Re-walk one audit chain and report the first broken link, if any.
    pub async fn verify_audit_chain(&self, chain: &ChainKey) -> Result<ChainVerification> {
        self.ledger.verify_chain(chain).await
    }

    /// Search the audit ledger.
    pub async fn search_audit(&self, filter: &AuditFilter) -> Result<Vec<procura_core::AuditEntry>> {
        self.ledger.search(filter).await
    }

    /// The shared audit ledger.
    pub fn ledger(&self) -> &Arc<AuditLedger> {
        &self.ledger
    }
}
