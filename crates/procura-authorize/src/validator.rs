//! Request validation.

use std::sync::Arc;

use procura_core::{
    AuditEntry, AuditResult, ChainKey, Clock, CorrelationId, ProcuraError, ProcuraConfig, Result,
};
use procura_ledger::AuditLedger;
use procura_store::DelegationStore;

use crate::request::{AuthorizationRequest, JurisdictionContext, ValidationOutcome};

/// Validates authorization requests before any record is created.
///
/// Every call appends exactly one audit entry, pass or fail; the entry for
/// a rejected request is the only trace the request leaves.
pub struct AuthorizationValidator {
    delegations: Arc<dyn DelegationStore>,
    ledger: Arc<AuditLedger>,
    clock: Arc<dyn Clock>,
    config: ProcuraConfig,
}

impl AuthorizationValidator {
    /// Create a validator over the given collaborators.
    pub fn new(
        delegations: Arc<dyn DelegationStore>,
        ledger: Arc<AuditLedger>,
        clock: Arc<dyn Clock>,
        config: ProcuraConfig,
    ) -> Self {
        Self {
            delegations,
            ledger,
            clock,
            config,
        }
    }

    /// Validate `request`: shape, jurisdiction, window, parent liveness.
    ///
    /// Checks run in that order and the first failure wins. Returns the
    /// jurisdiction context and a fresh correlation id on success.
    pub async fn validate(&self, request: &AuthorizationRequest) -> Result<ValidationOutcome> {
        let outcome = self.check(request).await;

        let chain = request.parent.as_ref().map_or_else(
            || ChainKey::new(format!("principal:{}", request.principal)),
            ChainKey::from,
        );
        let mut builder = AuditEntry::builder(request.principal.clone(), "request.validate")
            .target(request.delegate.to_string())
            .metadata("jurisdiction", request.jurisdiction.clone())
            .metadata("legal_basis", request.legal_basis.clone())
            .metadata("scope", request.scope.to_string());
        match &outcome {
            Ok(validated) => {
                builder = builder
                    .result(AuditResult::Success)
                    .metadata("correlation", validated.correlation.to_string());
            }
            Err(err) => {
                let result = if err.is_denial() {
                    AuditResult::Denied
                } else {
                    AuditResult::Failure
                };
                builder = builder.result(result).metadata("error", err.to_string());
            }
        }
        self.ledger.append(chain, builder).await?;
        outcome
    }

    async fn check(&self, request: &AuthorizationRequest) -> Result<ValidationOutcome> {
        if request.scope.is_empty() {
            return Err(ProcuraError::invalid_request("requested scope is empty"));
        }
        if request.legal_basis.trim().is_empty() {
            return Err(ProcuraError::invalid_request("legal basis tag is empty"));
        }
        if request.validity.is_degenerate() {
            return Err(ProcuraError::invalid_request(format!(
                "validity window [{}, {}) is empty or inverted",
                request.validity.valid_from, request.validity.valid_until
            )));
        }
        if !self.config.recognizes_jurisdiction(&request.jurisdiction) {
            return Err(ProcuraError::invalid_request(format!(
                "jurisdiction {} is not recognized",
                request.jurisdiction
            )));
        }

        let now = self.clock.now();
        if request.validity.is_elapsed(now) {
            return Err(ProcuraError::expired_context(format!(
                "validity window ended at {} and it is now {now}",
                request.validity.valid_until
            )));
        }

        if let Some(parent) = request.parent {
            let record = self
                .delegations
                .get(parent)
                .await?
                .ok_or_else(|| ProcuraError::not_found(format!("parent delegation {parent}")))?;
            if !record.status.is_active() {
                return Err(ProcuraError::parent_not_active(format!(
                    "parent delegation {parent} is {}",
                    record.status
                )));
            }
        }

        let outcome = ValidationOutcome {
            correlation: CorrelationId::random(),
            jurisdiction: JurisdictionContext {
                code: request.jurisdiction.clone(),
                dual_control_actions: self
                    .config
                    .dual_control_actions_for(&request.jurisdiction)
                    .to_vec(),
            },
            validated_at: now,
        };
        tracing::debug!(
            correlation = %outcome.correlation,
            principal = %request.principal,
            delegate = %request.delegate,
            "request validated"
        );
        Ok(outcome)
    }
}
