//! The delegation chain manager.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;

use procura_core::{
    canonical_hash, Attestation, AuditEntry, AuditResult, CascadeReport, ChainKey, Clock,
    DelegationConfig, DelegationId, DelegationStatus, PowerDelegation, ProcuraError, Restriction,
    Result, ScopeSet, SubjectId, ValidityWindow,
};
use procura_ledger::AuditLedger;
use procura_store::{CascadeVerifier, DelegationStore, IdentityVerifier, Signer};

use crate::cascade::check_cascade;

/// A validated request to create one delegation.
///
/// Produced by the authorization validator; the manager assumes boundary
/// validation already ran and re-checks only what its own invariants need.
#[derive(Debug, Clone)]
pub struct DelegationRequest {
    /// Entity granting the power.
    pub principal: SubjectId,
    /// Entity receiving the power.
    pub delegate: SubjectId,
    /// Capabilities to grant.
    pub scope: ScopeSet,
    /// Restrictions on exercise.
    pub restrictions: Vec<Restriction>,
    /// Interval the delegation is in force.
    pub validity: ValidityWindow,
    /// Parent delegation, or `None` to request a human-rooted delegation.
    pub parent: Option<DelegationId>,
}

/// Owns the delegation graph: creation, cascade verification, revocation.
pub struct DelegationChainManager {
    store: Arc<dyn DelegationStore>,
    identity: Arc<dyn IdentityVerifier>,
    ledger: Arc<AuditLedger>,
    clock: Arc<dyn Clock>,
    signer: Option<Arc<dyn Signer>>,
    config: DelegationConfig,
}

impl DelegationChainManager {
    /// Create a manager over the given collaborators.
    pub fn new(
        store: Arc<dyn DelegationStore>,
        identity: Arc<dyn IdentityVerifier>,
        ledger: Arc<AuditLedger>,
        clock: Arc<dyn Clock>,
        config: DelegationConfig,
    ) -> Self {
        Self {
            store,
            identity,
            ledger,
            clock,
            signer: None,
            config,
        }
    }

    /// Attach a signer; new delegations get attestations and cascade
    /// verification checks them.
    #[must_use]
    pub fn with_signer(mut self, signer: Arc<dyn Signer>) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Create a delegation from a validated request.
    ///
    /// A request without a parent must come from an identity-verified human
    /// (`RootMustBeHuman`). A request with a parent must not exceed the
    /// configured depth (`DepthExceeded`), must not close a cycle
    /// (`CyclicDelegation`), and must not amplify scope (`ScopeEscalation`).
    /// No record is created on any rejection.
    pub async fn create_delegation(&self, request: DelegationRequest) -> Result<PowerDelegation> {
        let principal = request.principal.clone();
        let parent = request.parent;

        match self.build(request).await {
            Ok(delegation) => {
                self.store.put(delegation.clone()).await?;
                tracing::info!(
                    delegation = %delegation.id,
                    principal = %delegation.principal,
                    delegate = %delegation.delegate,
                    "delegation created"
                );
                self.ledger
                    .append(
                        ChainKey::from(&delegation.id),
                        AuditEntry::builder(principal, "delegation.create")
                            .target(delegation.id.to_string())
                            .result(AuditResult::Success)
                            .metadata("delegate", delegation.delegate.to_string())
                            .metadata("scope", delegation.scope.to_string()),
                    )
                    .await?;
                Ok(delegation)
            }
            Err(err) => {
                let chain = parent.map_or_else(
                    || ChainKey::new(format!("principal:{principal}")),
                    |id| ChainKey::from(&id),
                );
                let result = if err.is_denial() {
                    AuditResult::Denied
                } else {
                    AuditResult::Failure
                };
                self.ledger
                    .append(
                        chain,
                        AuditEntry::builder(principal, "delegation.create")
                            .result(result)
                            .metadata("error", err.to_string()),
                    )
                    .await?;
                Err(err)
            }
        }
    }

    async fn build(&self, request: DelegationRequest) -> Result<PowerDelegation> {
        if request.scope.is_empty() {
            return Err(ProcuraError::invalid_request("delegation scope is empty"));
        }
        if request.validity.is_degenerate() {
            return Err(ProcuraError::invalid_request(
                "validity window is empty or inverted",
            ));
        }

        let id = DelegationId::random();

        match request.parent {
            None => {
                let verified = self.identity.is_verified_human(&request.principal).await?;
                if !verified {
                    return Err(ProcuraError::root_must_be_human(format!(
                        "principal {} is not an identity-verified human",
                        request.principal
                    )));
                }
            }
            Some(parent_id) => {
                let parent = self
                    .store
                    .get(parent_id)
                    .await?
                    .ok_or_else(|| ProcuraError::not_found(format!("delegation {parent_id}")))?;
                if !parent.status.is_active() {
                    return Err(ProcuraError::parent_not_active(format!(
                        "delegation {parent_id} is {}",
                        parent.status
                    )));
                }

                let ancestors = self
                    .store
                    .list_ancestors(parent_id, usize::from(self.config.max_depth) + 1)
                    .await?;

                // Fresh ids make a genuine cycle impossible; this is a
                // consistency check against store corruption.
                let mut seen: HashSet<DelegationId> = HashSet::from([id, parent_id]);
                for ancestor in &ancestors {
                    if !seen.insert(ancestor.id) {
                        return Err(ProcuraError::cyclic_delegation(format!(
                            "delegation {} already appears among its ancestors",
                            ancestor.id
                        )));
                    }
                }

                let hops = ancestors.len() + 1;
                if hops > usize::from(self.config.max_depth) {
                    return Err(ProcuraError::depth_exceeded(format!(
                        "{hops} hops to root, max {}",
                        self.config.max_depth
                    )));
                }

                let root = ancestors.last().unwrap_or(&parent);
                if !root.is_root() {
                    return Err(ProcuraError::cascade_broken(format!(
                        "parent chain of {parent_id} does not reach a root delegation"
                    )));
                }
                if let Some(inactive) = std::iter::once(&parent)
                    .chain(ancestors.iter())
                    .find(|d| !d.status.is_active())
                {
                    return Err(ProcuraError::cascade_broken(format!(
                        "ancestor {} is {}",
                        inactive.id, inactive.status
                    )));
                }

                if !request.scope.is_subset(&parent.scope) {
                    let missing = request.scope.missing_from(&parent.scope);
                    return Err(ProcuraError::scope_escalation(format!(
                        "capabilities not granted by parent: {}",
                        missing.join(", ")
                    )));
                }
            }
        }

        let mut delegation = PowerDelegation {
            id,
            principal: request.principal,
            delegate: request.delegate,
            scope: request.scope,
            restrictions: request.restrictions,
            validity: request.validity,
            status: DelegationStatus::Active,
            parent: request.parent,
            created_at: self.clock.now(),
            attestation: None,
        };

        if let Some(signer) = &self.signer {
            let payload_hash = canonical_hash(&delegation.signable_core())?;
            let signature = signer.sign(payload_hash.as_bytes())?;
            delegation.attestation = Some(Attestation {
                payload_hash,
                signature,
            });
        }

        Ok(delegation)
    }

    /// Re-walk the cascade from `id` to its human root, failing closed.
    ///
    /// Nothing is cached: a delegation revoked a millisecond ago already
    /// breaks every cascade through it.
    pub async fn verify_cascade(&self, id: DelegationId) -> Result<CascadeReport> {
        match self.walk_cascade(id).await {
            Ok(report) => {
                tracing::debug!(delegation = %id, depth = report.depth, "cascade verified");
                Ok(report)
            }
            Err(err) => {
                if err.is_denial() {
                    self.ledger
                        .append(
                            ChainKey::from(&id),
                            AuditEntry::builder("chain-manager", "cascade.verify")
                                .target(id.to_string())
                                .result(AuditResult::Denied)
                                .metadata("error", err.to_string()),
                        )
                        .await?;
                }
                Err(err)
            }
        }
    }

    async fn walk_cascade(&self, id: DelegationId) -> Result<CascadeReport> {
        let start = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| ProcuraError::not_found(format!("delegation {id}")))?;

        // Two extra slots so an over-deep or cyclic chain is observed
        // rather than silently truncated to a passing length.
        let ancestors = self
            .store
            .list_ancestors(id, usize::from(self.config.max_depth) + 2)
            .await?;

        let depth = check_cascade(&start, &ancestors, self.config.max_depth)?;

        let root = ancestors.last().unwrap_or(&start);
        let verified = self.identity.is_verified_human(&root.principal).await?;
        if !verified {
            return Err(ProcuraError::cascade_broken(format!(
                "root principal {} is not an identity-verified human",
                root.principal
            )));
        }

        if let Some(signer) = &self.signer {
            for record in std::iter::once(&start).chain(ancestors.iter()) {
                let Some(attestation) = &record.attestation else {
                    continue;
                };
                let payload_hash = canonical_hash(&record.signable_core())?;
                let intact = payload_hash == attestation.payload_hash
                    && signer.verify(payload_hash.as_bytes(), &attestation.signature);
                if !intact {
                    return Err(ProcuraError::cascade_broken(format!(
                        "attestation on delegation {} does not verify",
                        record.id
                    )));
                }
            }
        }

        let mut path = Vec::with_capacity(ancestors.len() + 1);
        path.push(start.id);
        path.extend(ancestors.iter().map(|d| d.id));

        Ok(CascadeReport {
            delegation: id,
            path,
            root_principal: root.principal.clone(),
            depth,
        })
    }

    /// Revoke a delegation. Monotonic and idempotent: revoking an already
    /// revoked delegation records a harmless audit entry and succeeds.
    ///
    /// Descendant records are untouched; any cascade walk through a revoked
    /// ancestor reports `CascadeBroken` from now on.
    pub async fn revoke(&self, id: DelegationId, actor: &SubjectId, reason: &str) -> Result<()> {
        let delegation = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| ProcuraError::not_found(format!("delegation {id}")))?;

        let already = delegation.status == DelegationStatus::Revoked;
        if !already {
            self.store
                .set_status(id, DelegationStatus::Revoked)
                .await?;
            tracing::info!(delegation = %id, reason, "delegation revoked");
        }

        let mut builder = AuditEntry::builder(actor.clone(), "delegation.revoke")
            .target(id.to_string())
            .result(AuditResult::Success)
            .metadata("reason", reason);
        if already {
            builder = builder.metadata("idempotent", "true");
        }
        self.ledger.append(ChainKey::from(&id), builder).await?;
        Ok(())
    }

    /// Suspend an active delegation. Reversible via [`Self::reinstate`].
    pub async fn suspend(&self, id: DelegationId, actor: &SubjectId, reason: &str) -> Result<()> {
        self.transition(
            id,
            actor,
            DelegationStatus::Suspended,
            "delegation.suspend",
            reason,
        )
        .await
    }

    /// Reinstate a suspended delegation.
    pub async fn reinstate(&self, id: DelegationId, actor: &SubjectId, reason: &str) -> Result<()> {
        self.transition(
            id,
            actor,
            DelegationStatus::Active,
            "delegation.reinstate",
            reason,
        )
        .await
    }

    async fn transition(
        &self,
        id: DelegationId,
        actor: &SubjectId,
        to: DelegationStatus,
        action: &str,
        reason: &str,
    ) -> Result<()> {
        let delegation = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| ProcuraError::not_found(format!("delegation {id}")))?;

        if delegation.status.is_terminal() {
            return Err(ProcuraError::invalid_request(format!(
                "delegation {id} is revoked; revocation is terminal"
            )));
        }

        if delegation.status != to {
            self.store.set_status(id, to).await?;
        }
        self.ledger
            .append(
                ChainKey::from(&id),
                AuditEntry::builder(actor.clone(), action)
                    .target(id.to_string())
                    .result(AuditResult::Success)
                    .metadata("reason", reason),
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl CascadeVerifier for DelegationChainManager {
    async fn verify_cascade(&self, id: DelegationId) -> Result<CascadeReport> {
        Self::verify_cascade(self, id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use procura_core::{ManualClock, Timestamp};
    use procura_ledger::AuditFilter;
    use procura_store::{
        Ed25519Signer, MemoryDelegationStore, MemoryIdentityVerifier, MemoryLedgerStore,
    };

    struct Fixture {
        manager: DelegationChainManager,
        ledger: Arc<AuditLedger>,
        store: Arc<MemoryDelegationStore>,
    }

    async fn fixture(signer: Option<Arc<dyn Signer>>) -> Fixture {
        let store = Arc::new(MemoryDelegationStore::new());
        let identity = Arc::new(MemoryIdentityVerifier::new());
        let clock = Arc::new(ManualClock::new(Timestamp::from_unix_secs(1_000)));
        let ledger = Arc::new(AuditLedger::new(
            Arc::new(MemoryLedgerStore::new()),
            clock.clone(),
        ));
        identity.add_verified_human(SubjectId::new("h1")).await;

        let mut manager = DelegationChainManager::new(
            store.clone(),
            identity.clone(),
            ledger.clone(),
            clock,
            DelegationConfig::default(),
        );
        if let Some(signer) = signer {
            manager = manager.with_signer(signer);
        }
        Fixture {
            manager,
            ledger,
            store,
        }
    }

    fn request(
        principal: &str,
        scope: &[&str],
        parent: Option<DelegationId>,
    ) -> DelegationRequest {
        DelegationRequest {
            principal: SubjectId::new(principal),
            delegate: SubjectId::new("agent-1"),
            scope: scope.iter().copied().collect(),
            restrictions: Vec::new(),
            validity: ValidityWindow::new(
                Timestamp::from_unix_secs(0),
                Timestamp::from_unix_secs(10_000),
            ),
            parent,
        }
    }

    #[tokio::test]
    async fn root_requires_verified_human() {
        let f = fixture(None).await;
        let err = f
            .manager
            .create_delegation(request("nobody", &["sign_contract"], None))
            .await
            .unwrap_err();
        assert!(matches!(err, ProcuraError::RootMustBeHuman { .. }));

        let ok = f
            .manager
            .create_delegation(request("h1", &["sign_contract"], None))
            .await
            .unwrap();
        assert!(ok.is_root());
        assert_eq!(ok.status, DelegationStatus::Active);
    }

    #[tokio::test]
    async fn rejection_creates_no_record_but_is_audited() {
        let f = fixture(None).await;
        let err = f
            .manager
            .create_delegation(request("nobody", &["sign_contract"], None))
            .await
            .unwrap_err();
        assert!(err.is_denial());

        let denied = f
            .ledger
            .search(&AuditFilter::any().action("delegation.create"))
            .await
            .unwrap();
        assert_eq!(denied.len(), 1);
        assert_eq!(denied[0].result, AuditResult::Denied);
    }

    #[tokio::test]
    async fn child_scope_must_attenuate() {
        let f = fixture(None).await;
        let root = f
            .manager
            .create_delegation(request("h1", &["sign_contract"], None))
            .await
            .unwrap();

        let err = f
            .manager
            .create_delegation(request(
                "agent-1",
                &["sign_contract", "wire_funds"],
                Some(root.id),
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, ProcuraError::ScopeEscalation { .. }));
        assert!(err.to_string().contains("wire_funds"));
    }

    #[tokio::test]
    async fn depth_limit_is_enforced() {
        let f = fixture(None).await;
        let mut parent = f
            .manager
            .create_delegation(request("h1", &["sign_contract"], None))
            .await
            .unwrap();
        // max_depth 5: five children chain fine, the sixth hop is rejected.
        for _ in 0..5 {
            parent = f
                .manager
                .create_delegation(request("agent-1", &["sign_contract"], Some(parent.id)))
                .await
                .unwrap();
        }
        let err = f
            .manager
            .create_delegation(request("agent-1", &["sign_contract"], Some(parent.id)))
            .await
            .unwrap_err();
        assert!(matches!(err, ProcuraError::DepthExceeded { .. }));
    }

    #[tokio::test]
    async fn child_under_inactive_parent_is_rejected() {
        let f = fixture(None).await;
        let root = f
            .manager
            .create_delegation(request("h1", &["sign_contract"], None))
            .await
            .unwrap();
        f.manager
            .revoke(root.id, &SubjectId::new("h1"), "compromised")
            .await
            .unwrap();

        let err = f
            .manager
            .create_delegation(request("agent-1", &["sign_contract"], Some(root.id)))
            .await
            .unwrap_err();
        assert!(matches!(err, ProcuraError::ParentNotActive { .. }));
    }

    #[tokio::test]
    async fn cascade_breaks_when_ancestor_revoked() {
        let f = fixture(None).await;
        let root = f
            .manager
            .create_delegation(request("h1", &["sign_contract"], None))
            .await
            .unwrap();
        let child = f
            .manager
            .create_delegation(request("agent-1", &["sign_contract"], Some(root.id)))
            .await
            .unwrap();

        let report = f.manager.verify_cascade(child.id).await.unwrap();
        assert_eq!(report.depth, 1);
        assert_eq!(report.root_principal, SubjectId::new("h1"));
        assert_eq!(report.path, vec![child.id, root.id]);

        f.manager
            .revoke(root.id, &SubjectId::new("h1"), "rotation")
            .await
            .unwrap();

        let err = f.manager.verify_cascade(child.id).await.unwrap_err();
        assert!(matches!(err, ProcuraError::CascadeBroken { .. }));
        // Child's own stored status is untouched.
        let stored = f.store.get(child.id).await.unwrap().unwrap();
        assert_eq!(stored.status, DelegationStatus::Active);
    }

    #[tokio::test]
    async fn cascade_fails_when_root_human_no_longer_verified() {
        let f = fixture(None).await;
        let root = f
            .manager
            .create_delegation(request("h1", &["sign_contract"], None))
            .await
            .unwrap();
        // Rewrite the stored root principal to a subject the identity
        // verifier never attested.
        let mut raw = f.store.get(root.id).await.unwrap().unwrap();
        raw.principal = SubjectId::new("imposter");
        f.store.put(raw).await.unwrap();

        let err = f.manager.verify_cascade(root.id).await.unwrap_err();
        assert!(matches!(err, ProcuraError::CascadeBroken { .. }));
    }

    #[tokio::test]
    async fn revoke_is_idempotent() {
        let f = fixture(None).await;
        let root = f
            .manager
            .create_delegation(request("h1", &["sign_contract"], None))
            .await
            .unwrap();
        let actor = SubjectId::new("h1");
        f.manager.revoke(root.id, &actor, "first").await.unwrap();
        f.manager.revoke(root.id, &actor, "second").await.unwrap();

        let entries = f
            .ledger
            .search(&AuditFilter::any().action("delegation.revoke"))
            .await
            .unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries[1]
            .metadata
            .iter()
            .any(|(k, v)| k == "idempotent" && v == "true"));
    }

    #[tokio::test]
    async fn suspend_reinstate_round_trip_and_terminal_revoke() {
        let f = fixture(None).await;
        let actor = SubjectId::new("h1");
        let root = f
            .manager
            .create_delegation(request("h1", &["sign_contract"], None))
            .await
            .unwrap();

        f.manager.suspend(root.id, &actor, "review").await.unwrap();
        let err = f.manager.verify_cascade(root.id).await.unwrap_err();
        assert!(matches!(err, ProcuraError::CascadeBroken { .. }));

        f.manager
            .reinstate(root.id, &actor, "review cleared")
            .await
            .unwrap();
        assert!(f.manager.verify_cascade(root.id).await.is_ok());

        f.manager.revoke(root.id, &actor, "done").await.unwrap();
        let err = f
            .manager
            .suspend(root.id, &actor, "too late")
            .await
            .unwrap_err();
        assert!(matches!(err, ProcuraError::InvalidRequest { .. }));
    }

    /// Store wrapper that parks writes to `Active` until released, so a
    /// revoke can land between a reinstate's status read and its write.
    struct GatedStore {
        inner: MemoryDelegationStore,
        entered: tokio::sync::Notify,
        release: tokio::sync::Notify,
    }

    #[async_trait]
    impl DelegationStore for GatedStore {
        async fn put(&self, delegation: PowerDelegation) -> Result<()> {
            self.inner.put(delegation).await
        }

        async fn get(&self, id: DelegationId) -> Result<Option<PowerDelegation>> {
            self.inner.get(id).await
        }

        async fn set_status(
            &self,
            id: DelegationId,
            status: DelegationStatus,
        ) -> Result<PowerDelegation> {
            if status == DelegationStatus::Active {
                self.entered.notify_one();
                self.release.notified().await;
            }
            self.inner.set_status(id, status).await
        }

        async fn list_ancestors(
            &self,
            id: DelegationId,
            limit: usize,
        ) -> Result<Vec<PowerDelegation>> {
            self.inner.list_ancestors(id, limit).await
        }
    }

    #[tokio::test]
    async fn revoke_landing_mid_reinstate_stays_terminal() {
        let store = Arc::new(GatedStore {
            inner: MemoryDelegationStore::new(),
            entered: tokio::sync::Notify::new(),
            release: tokio::sync::Notify::new(),
        });
        let identity = Arc::new(MemoryIdentityVerifier::new());
        identity.add_verified_human(SubjectId::new("h1")).await;
        let clock = Arc::new(ManualClock::new(Timestamp::from_unix_secs(1_000)));
        let ledger = Arc::new(AuditLedger::new(
            Arc::new(MemoryLedgerStore::new()),
            clock.clone(),
        ));
        let manager = Arc::new(DelegationChainManager::new(
            store.clone(),
            identity,
            ledger,
            clock,
            DelegationConfig::default(),
        ));

        let actor = SubjectId::new("h1");
        let root = manager
            .create_delegation(request("h1", &["sign_contract"], None))
            .await
            .unwrap();
        manager.suspend(root.id, &actor, "review").await.unwrap();

        // The reinstate reads `Suspended`, passes its terminal check, and
        // parks just before its write.
        let reinstater = {
            let manager = manager.clone();
            let actor = actor.clone();
            tokio::spawn(async move { manager.reinstate(root.id, &actor, "review cleared").await })
        };
        store.entered.notified().await;

        manager
            .revoke(root.id, &actor, "compromised")
            .await
            .unwrap();
        assert_eq!(
            store.inner.get(root.id).await.unwrap().unwrap().status,
            DelegationStatus::Revoked
        );

        // Released, the parked write must lose to the revocation.
        store.release.notify_one();
        let err = reinstater.await.unwrap().unwrap_err();
        assert!(matches!(err, ProcuraError::InvalidRequest { .. }));
        assert_eq!(
            store.inner.get(root.id).await.unwrap().unwrap().status,
            DelegationStatus::Revoked
        );
    }

    #[tokio::test]
    async fn attestations_are_created_and_checked() {
        let signer: Arc<dyn Signer> = Arc::new(Ed25519Signer::generate());
        let f = fixture(Some(signer)).await;
        let root = f
            .manager
            .create_delegation(request("h1", &["sign_contract"], None))
            .await
            .unwrap();
        assert!(root.attestation.is_some());
        assert!(f.manager.verify_cascade(root.id).await.is_ok());

        // Tamper with the stored scope: the attestation no longer covers it.
        let mut raw = f.store.get(root.id).await.unwrap().unwrap();
        raw.scope = ScopeSet::from_iter(["sign_contract", "wire_funds"]);
        f.store.put(raw).await.unwrap();

        let err = f.manager.verify_cascade(root.id).await.unwrap_err();
        assert!(matches!(err, ProcuraError::CascadeBroken { .. }));
    }
}
