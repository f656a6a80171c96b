//! The token lifecycle manager.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use procura_core::{
    AuditEntry, AuditResult, ChainKey, Clock, EnhancedToken, PowerDelegation,
    ProcuraError, Result, ScopeSet, SubjectId, TokenConfig, TokenId, TokenStatus,
};
use procura_ledger::AuditLedger;
use procura_store::{retry_read, CascadeVerifier, TokenStore};

const READ_ATTEMPTS: u32 = 3;
const READ_BACKOFF: Duration = Duration::from_millis(25);

/// Why a token failed validation.
///
/// Validation fails often in normal operation, so outcomes are values, not
/// errors; only collaborator failures surface as `Err`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidityReason {
    /// No token with that id exists.
    UnknownToken,
    /// The token was explicitly revoked.
    Revoked,
    /// The token's window has elapsed.
    Expired,
    /// The token's window has not started yet.
    NotYetValid,
    /// The bound delegation's cascade no longer verifies.
    CascadeBroken,
    /// The bound delegation record is missing from the store.
    DelegationMissing,
}

impl std::fmt::Display for InvalidityReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownToken => f.write_str("unknown_token"),
            Self::Revoked => f.write_str("revoked"),
            Self::Expired => f.write_str("expired"),
            Self::NotYetValid => f.write_str("not_yet_valid"),
            Self::CascadeBroken => f.write_str("cascade_broken"),
            Self::DelegationMissing => f.write_str("delegation_missing"),
        }
    }
}

/// Outcome of validating a token.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenValidation {
    /// The token is usable right now.
    Valid {
        /// The validated token.
        token: Box<EnhancedToken>,
    },
    /// The token is not usable.
    Invalid {
        /// Why validation failed.
        reason: InvalidityReason,
        /// Human-readable detail for audit and logs.
        detail: String,
    },
}

impl TokenValidation {
    /// Whether the token validated.
    pub const fn is_valid(&self) -> bool {
        matches!(self, Self::Valid { .. })
    }

    /// The failure reason, if invalid.
    pub const fn reason(&self) -> Option<InvalidityReason> {
        match self {
            Self::Valid { .. } => None,
            Self::Invalid { reason, .. } => Some(*reason),
        }
    }

    fn invalid(reason: InvalidityReason, detail: impl Into<String>) -> Self {
        Self::Invalid {
            reason,
            detail: detail.into(),
        }
    }
}

/// Issues, validates, rotates, and revokes tokens.
pub struct TokenLifecycleManager {
    tokens: Arc<dyn TokenStore>,
    cascades: Arc<dyn CascadeVerifier>,
    ledger: Arc<AuditLedger>,
    clock: Arc<dyn Clock>,
    config: TokenConfig,
}

impl TokenLifecycleManager {
    /// Create a manager over the given collaborators.
    pub fn new(
        tokens: Arc<dyn TokenStore>,
        cascades: Arc<dyn CascadeVerifier>,
        ledger: Arc<AuditLedger>,
        clock: Arc<dyn Clock>,
        config: TokenConfig,
    ) -> Self {
        Self {
            tokens,
            cascades,
            ledger,
            clock,
            config,
        }
    }

    fn chain_for(token: &EnhancedToken) -> ChainKey {
        token.delegation.map_or_else(
            || ChainKey::new(format!("token:{}", token.id)),
            |delegation| ChainKey::from(&delegation),
        )
    }

    /// Issue a token bound to `delegation`.
    ///
    /// The requested scope must be a subset of the delegation's grant
    /// (`ScopeNotGranted`) and the delegation must be active. The scope
    /// check happens once, here; retroactive effect comes from cascade
    /// re-checks at validation time.
    pub async fn issue(
        &self,
        delegation: &PowerDelegation,
        subject: SubjectId,
        scope: ScopeSet,
        ttl_secs: Option<u64>,
    ) -> Result<EnhancedToken> {
        let outcome = self
            .build_bound(delegation, subject.clone(), scope, ttl_secs)
            .await;
        match outcome {
            Ok(token) => {
                self.ledger
                    .append(
                        Self::chain_for(&token),
                        AuditEntry::builder(subject, "token.issue")
                            .target(token.id.to_string())
                            .result(AuditResult::Success)
                            .metadata("scope", token.scope.to_string()),
                    )
                    .await?;
                Ok(token)
            }
            Err(err) => {
                let result = if err.is_denial() {
                    AuditResult::Denied
                } else {
                    AuditResult::Failure
                };
                self.ledger
                    .append(
                        ChainKey::from(&delegation.id),
                        AuditEntry::builder(subject, "token.issue")
                            .result(result)
                            .metadata("error", err.to_string()),
                    )
                    .await?;
                Err(err)
            }
        }
    }

    async fn build_bound(
        &self,
        delegation: &PowerDelegation,
        subject: SubjectId,
        scope: ScopeSet,
        ttl_secs: Option<u64>,
    ) -> Result<EnhancedToken> {
        if scope.is_empty() {
            return Err(ProcuraError::invalid_request("token scope is empty"));
        }
        if !delegation.status.is_active() {
            return Err(ProcuraError::parent_not_active(format!(
                "delegation {} is {}",
                delegation.id, delegation.status
            )));
        }
        if !scope.is_subset(&delegation.scope) {
            let missing = scope.missing_from(&delegation.scope);
            return Err(ProcuraError::scope_not_granted(format!(
                "capabilities not granted by delegation {}: {}",
                delegation.id,
                missing.join(", ")
            )));
        }

        let now = self.clock.now();
        let ttl = ttl_secs.unwrap_or(self.config.default_ttl_secs);
        let token = EnhancedToken {
            id: TokenId::random(),
            delegation: Some(delegation.id),
            subject,
            scope,
            issued_at: now,
            expires_at: now.plus_secs(ttl),
            status: TokenStatus::Valid,
        };
        self.tokens.put(token.clone()).await?;
        tracing::info!(token = %token.id, delegation = %delegation.id, "token issued");
        Ok(token)
    }

    /// Issue a token not bound to any delegation.
    ///
    /// Unbound tokens skip cascade re-checks at validation; expiry and
    /// revocation still apply.
    pub async fn issue_unbound(
        &self,
        subject: SubjectId,
        scope: ScopeSet,
        ttl_secs: Option<u64>,
    ) -> Result<EnhancedToken> {
        if scope.is_empty() {
            return Err(ProcuraError::invalid_request("token scope is empty"));
        }
        let now = self.clock.now();
        let ttl = ttl_secs.unwrap_or(self.config.default_ttl_secs);
        let token = EnhancedToken {
            id: TokenId::random(),
            delegation: None,
            subject: subject.clone(),
            scope,
            issued_at: now,
            expires_at: now.plus_secs(ttl),
            status: TokenStatus::Valid,
        };
        self.tokens.put(token.clone()).await?;
        self.ledger
            .append(
                Self::chain_for(&token),
                AuditEntry::builder(subject, "token.issue")
                    .target(token.id.to_string())
                    .result(AuditResult::Success)
                    .metadata("bound", "false"),
            )
            .await?;
        Ok(token)
    }

    /// Validate a token: status, time window, then cascade re-check.
    ///
    /// Checks run in that order and the first failure wins. An elapsed
    /// window also flips the stored status to `Expired` so later reads are
    /// cheap. Invalid outcomes are audited as denied; only collaborator
    /// failures return `Err`.
    pub async fn validate(&self, id: TokenId) -> Result<TokenValidation> {
        let outcome = self.check(id).await?;
        match &outcome {
            TokenValidation::Valid { token } => {
                tracing::debug!(token = %token.id, "token validated");
            }
            TokenValidation::Invalid { reason, detail } => {
                self.ledger
                    .append(
                        ChainKey::new(format!("token:{id}")),
                        AuditEntry::builder("token-manager", "token.validate")
                            .target(id.to_string())
                            .result(AuditResult::Denied)
                            .metadata("reason", reason.to_string())
                            .metadata("detail", detail.clone()),
                    )
                    .await?;
            }
        }
        Ok(outcome)
    }

    async fn check(&self, id: TokenId) -> Result<TokenValidation> {
        let fetched = retry_read(READ_ATTEMPTS, READ_BACKOFF, || self.tokens.get(id)).await?;
        let Some(token) = fetched else {
            return Ok(TokenValidation::invalid(
                InvalidityReason::UnknownToken,
                format!("no token {id}"),
            ));
        };

        match token.status {
            TokenStatus::Revoked => {
                return Ok(TokenValidation::invalid(
                    InvalidityReason::Revoked,
                    format!("token {id} is revoked"),
                ));
            }
            TokenStatus::Expired => {
                return Ok(TokenValidation::invalid(
                    InvalidityReason::Expired,
                    format!("token {id} is expired"),
                ));
            }
            TokenStatus::Valid => {}
        }

        let now = self.clock.now();
        if now >= token.expires_at {
            // Lazy expiry: record the terminal status on first observation.
            self.tokens.set_status(id, TokenStatus::Expired).await?;
            return Ok(TokenValidation::invalid(
                InvalidityReason::Expired,
                format!("token {id} expired at {}", token.expires_at),
            ));
        }
        if now < token.issued_at {
            return Ok(TokenValidation::invalid(
                InvalidityReason::NotYetValid,
                format!("token {id} not valid before {}", token.issued_at),
            ));
        }

        if let Some(delegation) = token.delegation {
            match self.cascades.verify_cascade(delegation).await {
                Ok(_) => {}
                Err(ProcuraError::CascadeBroken { message }) => {
                    return Ok(TokenValidation::invalid(
                        InvalidityReason::CascadeBroken,
                        message,
                    ));
                }
                Err(ProcuraError::NotFound { message }) => {
                    return Ok(TokenValidation::invalid(
                        InvalidityReason::DelegationMissing,
                        message,
                    ));
                }
                Err(err) => return Err(err),
            }
        }

        Ok(TokenValidation::Valid {
            token: Box::new(token),
        })
    }

    /// Revoke a token. Idempotent: revoking a revoked token records a
    /// harmless audit entry and succeeds.
    pub async fn revoke(&self, id: TokenId, actor: &SubjectId) -> Result<()> {
        let token = self
            .tokens
            .get(id)
            .await?
            .ok_or_else(|| ProcuraError::not_found(format!("token {id}")))?;

        let already = token.status == TokenStatus::Revoked;
        if !already {
            self.tokens.set_status(id, TokenStatus::Revoked).await?;
            tracing::info!(token = %id, "token revoked");
        }

        let mut builder = AuditEntry::builder(actor.clone(), "token.revoke")
            .target(id.to_string())
            .result(AuditResult::Success);
        if already {
            builder = builder.metadata("idempotent", "true");
        }
        self.ledger.append(Self::chain_for(&token), builder).await?;
        Ok(())
    }

    /// Replace a token with a fresh one atomically.
    ///
    /// The new token has a fresh id and expiry, the same subject, scope,
    /// and delegation. The store applies revoke-old and insert-new as one
    /// two-record write, so a concurrent `validate` observes either the
    /// old token alone or the new token alone, never both and never
    /// neither. If the cascade re-check or the store write fails, the old
    /// token is left untouched.
    pub async fn rotate(&self, id: TokenId, actor: &SubjectId) -> Result<EnhancedToken> {
        let old = self
            .tokens
            .get(id)
            .await?
            .ok_or_else(|| ProcuraError::not_found(format!("token {id}")))?;

        if old.status != TokenStatus::Valid {
            return Err(ProcuraError::invalid_request(format!(
                "cannot rotate token {id}: status is {}",
                old.status
            )));
        }

        // Fail closed before touching the store.
        if let Some(delegation) = old.delegation {
            self.cascades.verify_cascade(delegation).await?;
        }

        let now = self.clock.now();
        let ttl = old
            .expires_at
            .as_unix_secs()
            .saturating_sub(old.issued_at.as_unix_secs());
        let new = EnhancedToken {
            id: TokenId::random(),
            delegation: old.delegation,
            subject: old.subject.clone(),
            scope: old.scope.clone(),
            issued_at: now,
            expires_at: now.plus_secs(ttl),
            status: TokenStatus::Valid,
        };

        self.tokens.rotate(id, new.clone()).await?;
        tracing::info!(old = %id, new = %new.id, "token rotated");
        self.ledger
            .append(
                Self::chain_for(&new),
                AuditEntry::builder(actor.clone(), "token.rotate")
                    .target(new.id.to_string())
                    .result(AuditResult::Success)
                    .metadata("replaces", id.to_string()),
            )
            .await?;
        Ok(new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use tokio::sync::RwLock;

    use procura_core::{
        CascadeReport, DelegationId, DelegationStatus, ManualClock, Restriction, Timestamp,
        ValidityWindow,
    };
    use procura_store::{MemoryLedgerStore, MemoryTokenStore};

    /// Cascade verifier stub: cascades verify unless their delegation id
    /// has been marked broken.
    #[derive(Default)]
    struct StubCascades {
        broken: RwLock<HashSet<DelegationId>>,
    }

    impl StubCascades {
        async fn mark_broken(&self, id: DelegationId) {
            self.broken.write().await.insert(id);
        }
    }

    #[async_trait]
    impl CascadeVerifier for StubCascades {
        async fn verify_cascade(&self, id: DelegationId) -> Result<CascadeReport> {
            if self.broken.read().await.contains(&id) {
                return Err(ProcuraError::cascade_broken(format!(
                    "ancestor of {id} revoked"
                )));
            }
            Ok(CascadeReport {
                delegation: id,
                path: vec![id],
                root_principal: SubjectId::new("h1"),
                depth: 0,
            })
        }
    }

    struct Fixture {
        manager: TokenLifecycleManager,
        cascades: Arc<StubCascades>,
        clock: Arc<ManualClock>,
        delegation: PowerDelegation,
    }

    fn fixture() -> Fixture {
        let cascades = Arc::new(StubCascades::default());
        let clock = Arc::new(ManualClock::new(Timestamp::from_unix_secs(1_000)));
        let ledger = Arc::new(AuditLedger::new(
            Arc::new(MemoryLedgerStore::new()),
            clock.clone(),
        ));
        let manager = TokenLifecycleManager::new(
            Arc::new(MemoryTokenStore::new()),
            cascades.clone(),
            ledger,
            clock.clone(),
            TokenConfig::default(),
        );
        let delegation = PowerDelegation {
            id: DelegationId::random(),
            principal: SubjectId::new("h1"),
            delegate: SubjectId::new("agent-1"),
            scope: ScopeSet::from_iter(["sign_contract", "wire_funds"]),
            restrictions: Vec::<Restriction>::new(),
            validity: ValidityWindow::new(
                Timestamp::from_unix_secs(0),
                Timestamp::from_unix_secs(1_000_000),
            ),
            status: DelegationStatus::Active,
            parent: None,
            created_at: Timestamp::from_unix_secs(1_000),
            attestation: None,
        };
        Fixture {
            manager,
            cascades,
            clock,
            delegation,
        }
    }

    #[tokio::test]
    async fn issue_and_validate() {
        let f = fixture();
        let token = f
            .manager
            .issue(
                &f.delegation,
                SubjectId::new("agent-1"),
                ScopeSet::from_iter(["sign_contract"]),
                Some(3_600),
            )
            .await
            .unwrap();

        let outcome = f.manager.validate(token.id).await.unwrap();
        assert!(outcome.is_valid());
    }

    #[tokio::test]
    async fn issue_rejects_ungrant_scope() {
        let f = fixture();
        let err = f
            .manager
            .issue(
                &f.delegation,
                SubjectId::new("agent-1"),
                ScopeSet::from_iter(["close_account"]),
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ProcuraError::ScopeNotGranted { .. }));
    }

    #[tokio::test]
    async fn issue_rejects_inactive_delegation() {
        let f = fixture();
        let mut suspended = f.delegation.clone();
        suspended.status = DelegationStatus::Suspended;
        let err = f
            .manager
            .issue(
                &suspended,
                SubjectId::new("agent-1"),
                ScopeSet::from_iter(["sign_contract"]),
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ProcuraError::ParentNotActive { .. }));
    }

    #[tokio::test]
    async fn token_expires_after_ttl() {
        let f = fixture();
        let token = f
            .manager
            .issue(
                &f.delegation,
                SubjectId::new("agent-1"),
                ScopeSet::from_iter(["sign_contract"]),
                Some(3_600),
            )
            .await
            .unwrap();

        assert!(f.manager.validate(token.id).await.unwrap().is_valid());

        f.clock.advance_secs(3_600);
        let outcome = f.manager.validate(token.id).await.unwrap();
        assert_eq!(outcome.reason(), Some(InvalidityReason::Expired));

        // Status was recorded lazily; a second validation short-circuits.
        let again = f.manager.validate(token.id).await.unwrap();
        assert_eq!(again.reason(), Some(InvalidityReason::Expired));
    }

    #[tokio::test]
    async fn broken_cascade_invalidates_token_without_touching_status() {
        let f = fixture();
        let token = f
            .manager
            .issue(
                &f.delegation,
                SubjectId::new("agent-1"),
                ScopeSet::from_iter(["sign_contract"]),
                None,
            )
            .await
            .unwrap();

        f.cascades.mark_broken(f.delegation.id).await;
        let outcome = f.manager.validate(token.id).await.unwrap();
        assert_eq!(outcome.reason(), Some(InvalidityReason::CascadeBroken));
    }

    #[tokio::test]
    async fn unbound_token_skips_cascade_check() {
        let f = fixture();
        let token = f
            .manager
            .issue_unbound(
                SubjectId::new("service"),
                ScopeSet::from_iter(["read_reports"]),
                None,
            )
            .await
            .unwrap();
        assert!(f.manager.validate(token.id).await.unwrap().is_valid());
    }

    #[tokio::test]
    async fn unknown_token_is_invalid_not_error() {
        let f = fixture();
        let outcome = f.manager.validate(TokenId::random()).await.unwrap();
        assert_eq!(outcome.reason(), Some(InvalidityReason::UnknownToken));
    }

    #[tokio::test]
    async fn revoke_is_idempotent() {
        let f = fixture();
        let actor = SubjectId::new("h1");
        let token = f
            .manager
            .issue(
                &f.delegation,
                SubjectId::new("agent-1"),
                ScopeSet::from_iter(["sign_contract"]),
                None,
            )
            .await
            .unwrap();

        f.manager.revoke(token.id, &actor).await.unwrap();
        f.manager.revoke(token.id, &actor).await.unwrap();
        assert_eq!(
            f.manager.validate(token.id).await.unwrap().reason(),
            Some(InvalidityReason::Revoked)
        );
    }

    #[tokio::test]
    async fn rotate_replaces_token() {
        let f = fixture();
        let actor = SubjectId::new("agent-1");
        let old = f
            .manager
            .issue(
                &f.delegation,
                SubjectId::new("agent-1"),
                ScopeSet::from_iter(["sign_contract"]),
                Some(3_600),
            )
            .await
            .unwrap();

        f.clock.advance_secs(100);
        let new = f.manager.rotate(old.id, &actor).await.unwrap();
        assert_ne!(new.id, old.id);
        assert_eq!(new.scope, old.scope);
        assert_eq!(new.delegation, old.delegation);
        // Same ttl, fresh window.
        assert_eq!(
            new.expires_at.as_unix_secs() - new.issued_at.as_unix_secs(),
            3_600
        );

        assert!(!f.manager.validate(old.id).await.unwrap().is_valid());
        assert!(f.manager.validate(new.id).await.unwrap().is_valid());
    }

    #[tokio::test]
    async fn rotate_rejects_revoked_token_and_broken_cascade() {
        let f = fixture();
        let actor = SubjectId::new("agent-1");
        let token = f
            .manager
            .issue(
                &f.delegation,
                SubjectId::new("agent-1"),
                ScopeSet::from_iter(["sign_contract"]),
                None,
            )
            .await
            .unwrap();

        f.cascades.mark_broken(f.delegation.id).await;
        let err = f.manager.rotate(token.id, &actor).await.unwrap_err();
        assert!(matches!(err, ProcuraError::CascadeBroken { .. }));
        // Old token untouched by the failed rotation.
        let stored = f.manager.tokens.get(token.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TokenStatus::Valid);

        f.manager.revoke(token.id, &actor).await.unwrap();
        let err = f.manager.rotate(token.id, &actor).await.unwrap_err();
        assert!(matches!(err, ProcuraError::InvalidRequest { .. }));
    }

    /// Token store that parks rotations until released, so a revoke can
    /// land between the manager's status read and the store write.
    struct GatedTokens {
        inner: MemoryTokenStore,
        attempted: std::sync::Mutex<Option<TokenId>>,
        entered: tokio::sync::Notify,
        release: tokio::sync::Notify,
    }

    #[async_trait]
    impl TokenStore for GatedTokens {
        async fn put(&self, token: EnhancedToken) -> Result<()> {
            self.inner.put(token).await
        }

        async fn get(&self, id: TokenId) -> Result<Option<EnhancedToken>> {
            self.inner.get(id).await
        }

        async fn set_status(&self, id: TokenId, status: TokenStatus) -> Result<EnhancedToken> {
            self.inner.set_status(id, status).await
        }

        async fn rotate(&self, old: TokenId, new: EnhancedToken) -> Result<()> {
            *self.attempted.lock().unwrap() = Some(new.id);
            self.entered.notify_one();
            self.release.notified().await;
            self.inner.rotate(old, new).await
        }
    }

    #[tokio::test]
    async fn revoke_landing_mid_rotation_is_not_absorbed() {
        let f = fixture();
        let store = Arc::new(GatedTokens {
            inner: MemoryTokenStore::new(),
            attempted: std::sync::Mutex::new(None),
            entered: tokio::sync::Notify::new(),
            release: tokio::sync::Notify::new(),
        });
        let clock = Arc::new(ManualClock::new(Timestamp::from_unix_secs(1_000)));
        let ledger = Arc::new(AuditLedger::new(
            Arc::new(MemoryLedgerStore::new()),
            clock.clone(),
        ));
        let manager = Arc::new(TokenLifecycleManager::new(
            store.clone(),
            f.cascades.clone(),
            ledger,
            clock,
            TokenConfig::default(),
        ));

        let actor = SubjectId::new("agent-1");
        let old = manager
            .issue(
                &f.delegation,
                SubjectId::new("agent-1"),
                ScopeSet::from_iter(["sign_contract"]),
                Some(3_600),
            )
            .await
            .unwrap();
        let old_id = old.id;

        // The rotation reads `Valid`, passes its own check, and parks just
        // before the store write.
        let rotator = {
            let manager = manager.clone();
            let actor = actor.clone();
            tokio::spawn(async move { manager.rotate(old_id, &actor).await })
        };
        store.entered.notified().await;

        manager.revoke(old_id, &actor).await.unwrap();
        store.release.notify_one();

        let err = rotator.await.unwrap().unwrap_err();
        assert!(matches!(err, ProcuraError::InvalidRequest { .. }));

        // The revocation wins and no replacement token was minted.
        assert_eq!(
            store.inner.get(old_id).await.unwrap().unwrap().status,
            TokenStatus::Revoked
        );
        let attempted = store.attempted.lock().unwrap().unwrap();
        assert!(store.inner.get(attempted).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rotation_is_atomic_under_concurrent_validation() {
        let f = fixture();
        let manager = Arc::new(f.manager);
        let actor = SubjectId::new("agent-1");
        let old = manager
            .issue(
                &f.delegation,
                SubjectId::new("agent-1"),
                ScopeSet::from_iter(["sign_contract"]),
                Some(3_600),
            )
            .await
            .unwrap();

        let rotator = {
            let manager = manager.clone();
            let actor = actor.clone();
            tokio::spawn(async move { manager.rotate(old.id, &actor).await.unwrap() })
        };
        let new = rotator.await.unwrap();

        // Reading the new token first: if it validates, the rotation has
        // happened, so the old token must no longer validate.
        let new_valid = manager.validate(new.id).await.unwrap().is_valid();
        let old_valid = manager.validate(old.id).await.unwrap().is_valid();
        assert!(new_valid);
        assert!(!old_valid);

        // Exactly one of the pair validates; never both, never neither.
        assert!(new_valid ^ old_valid);
    }
}
