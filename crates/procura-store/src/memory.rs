//! In-memory reference implementations of the collaborator traits.
//!
//! Each store guards its state with a single `tokio::sync::RwLock`; reads
//! proceed concurrently, writes to the same logical store are mutually
//! exclusive. Locks are held only across the in-memory mutation.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use procura_core::{
    ApprovalId, ApprovalRecord, AuditEntry, ChainKey, DelegationId, DelegationStatus,
    EnhancedToken, PowerDelegation, ProcuraError, Result, SubjectId, TokenId, TokenStatus,
};

use crate::traits::{ApprovalStore, DelegationStore, IdentityVerifier, LedgerStore, TokenStore};

/// In-memory delegation store.
#[derive(Debug, Default)]
pub struct MemoryDelegationStore {
    records: Arc<RwLock<HashMap<DelegationId, PowerDelegation>>>,
}

impl MemoryDelegationStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DelegationStore for MemoryDelegationStore {
    async fn put(&self, delegation: PowerDelegation) -> Result<()> {
        self.records.write().await.insert(delegation.id, delegation);
        Ok(())
    }

    async fn get(&self, id: DelegationId) -> Result<Option<PowerDelegation>> {
        Ok(self.records.read().await.get(&id).cloned())
    }

    async fn set_status(
        &self,
        id: DelegationId,
        status: DelegationStatus,
    ) -> Result<PowerDelegation> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(&id)
            .ok_or_else(|| ProcuraError::not_found(format!("delegation {id}")))?;
        // Terminal check under the same write guard as the mutation.
        if record.status == DelegationStatus::Revoked && status != DelegationStatus::Revoked {
            return Err(ProcuraError::invalid_request(format!(
                "delegation {id} is revoked; revocation is terminal"
            )));
        }
        record.status = status;
        Ok(record.clone())
    }

    async fn list_ancestors(&self, id: DelegationId, limit: usize) -> Result<Vec<PowerDelegation>> {
        let records = self.records.read().await;
        let mut ancestors = Vec::new();
        let mut seen = HashSet::from([id]);
        let mut cursor = records.get(&id).and_then(|d| d.parent);

        while let Some(parent_id) = cursor {
            if ancestors.len() >= limit || !seen.insert(parent_id) {
                break;
            }
            match records.get(&parent_id) {
                Some(parent) => {
                    cursor = parent.parent;
                    ancestors.push(parent.clone());
                }
                None => break,
            }
        }

        Ok(ancestors)
    }
}

/// In-memory token store.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    records: Arc<RwLock<HashMap<TokenId, EnhancedToken>>>,
}

impl MemoryTokenStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn put(&self, token: EnhancedToken) -> Result<()> {
        self.records.write().await.insert(token.id, token);
        Ok(())
    }

    async fn get(&self, id: TokenId) -> Result<Option<EnhancedToken>> {
        Ok(self.records.read().await.get(&id).cloned())
    }

    async fn set_status(&self, id: TokenId, status: TokenStatus) -> Result<EnhancedToken> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(&id)
            .ok_or_else(|| ProcuraError::not_found(format!("token {id}")))?;
        record.status = status;
        Ok(record.clone())
    }

    async fn rotate(&self, old: TokenId, new: EnhancedToken) -> Result<()> {
        // One write guard covers both mutations, so a concurrent reader
        // sees the store either before or after the rotation, never between.
        let mut records = self.records.write().await;
        let old_record = records
            .get_mut(&old)
            .ok_or_else(|| ProcuraError::not_found(format!("token {old}")))?;
        if old_record.status != TokenStatus::Valid {
            return Err(ProcuraError::invalid_request(format!(
                "token {old} is {}; only a valid token rotates",
                old_record.status
            )));
        }
        old_record.status = TokenStatus::Revoked;
        records.insert(new.id, new);
        Ok(())
    }
}

/// In-memory append-only ledger store.
#[derive(Debug, Default)]
pub struct MemoryLedgerStore {
    chains: Arc<RwLock<HashMap<ChainKey, Vec<AuditEntry>>>>,
}

impl MemoryLedgerStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite one stored entry in place. Test-only tamper hook.
    #[doc(hidden)]
    pub async fn tamper(&self, chain: &ChainKey, index: usize, entry: AuditEntry) {
        let mut chains = self.chains.write().await;
        if let Some(entries) = chains.get_mut(chain) {
            if let Some(slot) = entries.get_mut(index) {
                *slot = entry;
            }
        }
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn append(&self, entry: AuditEntry) -> Result<()> {
        self.chains
            .write()
            .await
            .entry(entry.chain_key.clone())
            .or_default()
            .push(entry);
        Ok(())
    }

    async fn last(&self, chain: &ChainKey) -> Result<Option<AuditEntry>> {
        Ok(self
            .chains
            .read()
            .await
            .get(chain)
            .and_then(|entries| entries.last().cloned()))
    }

    async fn read_chain(&self, chain: &ChainKey) -> Result<Vec<AuditEntry>> {
        Ok(self.chains.read().await.get(chain).cloned().unwrap_or_default())
    }

    async fn scan(&self) -> Result<Vec<AuditEntry>> {
        Ok(self
            .chains
            .read()
            .await
            .values()
            .flat_map(|entries| entries.iter().cloned())
            .collect())
    }
}

/// In-memory approval store.
#[derive(Debug, Default)]
pub struct MemoryApprovalStore {
    records: Arc<RwLock<HashMap<ApprovalId, ApprovalRecord>>>,
}

impl MemoryApprovalStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ApprovalStore for MemoryApprovalStore {
    async fn put(&self, record: ApprovalRecord) -> Result<()> {
        self.records.write().await.insert(record.id, record);
        Ok(())
    }

    async fn get(&self, id: ApprovalId) -> Result<Option<ApprovalRecord>> {
        Ok(self.records.read().await.get(&id).cloned())
    }
}

/// In-memory identity verifier backed by an allow-list of verified humans.
#[derive(Debug, Default)]
pub struct MemoryIdentityVerifier {
    verified: Arc<RwLock<HashSet<SubjectId>>>,
}

impl MemoryIdentityVerifier {
    /// Create a verifier with no verified humans.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a principal as an identity-verified human.
    pub async fn add_verified_human(&self, principal: SubjectId) {
        self.verified.write().await.insert(principal);
    }
}

#[async_trait]
impl IdentityVerifier for MemoryIdentityVerifier {
    async fn is_verified_human(&self, principal: &SubjectId) -> Result<bool> {
        Ok(self.verified.read().await.contains(principal))
    }
}
