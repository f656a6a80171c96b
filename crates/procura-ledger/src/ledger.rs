//! The audit ledger: per-chain hash-linked appends, verification, search.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use procura_core::{
    AuditEntry, AuditEntryBuilder, ChainKey, Clock, Hash32, ProcuraError, Result,
};
use procura_store::LedgerStore;

/// Outcome of re-walking a stored chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainVerification {
    /// Every link recomputed to its stored value.
    Intact {
        /// Number of entries verified.
        length: usize,
    },
    /// A recomputed hash differed from the stored one.
    Broken {
        /// Index of the first entry whose link failed.
        index: usize,
    },
}

impl ChainVerification {
    /// Whether the chain verified end to end.
    pub const fn is_intact(&self) -> bool {
        matches!(self, Self::Intact { .. })
    }
}

/// Append-only, hash-chained record of every Procura decision.
pub struct AuditLedger {
    store: Arc<dyn LedgerStore>,
    clock: Arc<dyn Clock>,
    // Appends to the same chain must serialize so prev_hash is never stale.
    // Per-chain-key locks rather than one ledger-wide lock.
    chain_locks: Mutex<HashMap<ChainKey, Arc<Mutex<()>>>>,
}

impl AuditLedger {
    /// Create a ledger over `store`, timestamping with `clock`.
    pub fn new(store: Arc<dyn LedgerStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            chain_locks: Mutex::new(HashMap::new()),
        }
    }

    async fn lock_for(&self, chain: &ChainKey) -> Arc<Mutex<()>> {
        let mut locks = self.chain_locks.lock().await;
        locks.entry(chain.clone()).or_default().clone()
    }

    /// Drop the map entry for `chain` once no other appender holds the lock.
    ///
    /// Strong count 2 means the map's clone plus ours; the map mutex is
    /// held across the check, so no new clone can appear mid-removal. Keeps
    /// the lock map from accumulating one entry per chain key forever.
    async fn release_lock(&self, chain: &ChainKey, lock: Arc<Mutex<()>>) {
        let mut locks = self.chain_locks.lock().await;
        if Arc::strong_count(&lock) == 2 {
            locks.remove(chain);
        }
    }

    /// Append one entry to `chain`, linking it to the chain's current tip.
    ///
    /// The per-chain lock is held across the read-tip/compute/append
    /// sequence so two concurrent appends can never both link to the same
    /// previous entry.
    pub async fn append(
        &self,
        chain: ChainKey,
        builder: AuditEntryBuilder,
    ) -> Result<AuditEntry> {
        let key = chain.clone();
        let lock = self.lock_for(&key).await;
        let outcome = {
            let _guard = lock.lock().await;
            self.append_linked(chain, builder).await
        };
        self.release_lock(&key, lock).await;
        outcome
    }

    async fn append_linked(
        &self,
        chain: ChainKey,
        builder: AuditEntryBuilder,
    ) -> Result<AuditEntry> {
        let prev_hash = self
            .store
            .last(&chain)
            .await?
            .map_or(Hash32::ZERO, |tip| tip.self_hash);

        let mut entry = builder.finish(chain, self.clock.now());
        entry.prev_hash = prev_hash;
        entry.self_hash = entry.compute_self_hash()?;

        tracing::debug!(
            entry = %entry.id,
            chain = %entry.chain_key,
            action = %entry.action,
            result = %entry.result,
            "audit entry appended"
        );
        self.store.append(entry.clone()).await?;
        Ok(entry)
    }

    /// Re-walk `chain` and report the first index whose hashes fail.
    ///
    /// An intact empty chain verifies trivially. A broken link is evidence
    /// of tampering or store corruption; callers should treat it as
    /// alarm-worthy and never retry around it.
    pub async fn verify_chain(&self, chain: &ChainKey) -> Result<ChainVerification> {
        let entries = self.store.read_chain(chain).await?;
        Ok(Self::verify_entries(&entries))
    }

    /// Verify an exported sequence of entries as one chain.
    ///
    /// Lets callers re-check a filtered export independently of the store,
    /// provided the export is a whole chain in order.
    pub fn verify_entries(entries: &[AuditEntry]) -> ChainVerification {
        let mut prev = Hash32::ZERO;
        for (index, entry) in entries.iter().enumerate() {
            let link_ok = entry.prev_hash == prev
                && entry
                    .compute_self_hash()
                    .map(|hash| hash == entry.self_hash)
                    .unwrap_or(false);
            if !link_ok {
                return ChainVerification::Broken { index };
            }
            prev = entry.self_hash;
        }
        ChainVerification::Intact {
            length: entries.len(),
        }
    }

    /// Like [`Self::verify_chain`] but surfacing a break as an error.
    pub async fn ensure_intact(&self, chain: &ChainKey) -> Result<usize> {
        match self.verify_chain(chain).await? {
            ChainVerification::Intact { length } => Ok(length),
            ChainVerification::Broken { index } => Err(ProcuraError::integrity(format!(
                "chain {chain} broken at index {index}"
            ))),
        }
    }

    /// All entries matching `filter`, ordered by timestamp then entry id.
    ///
    /// Filtering does not require chain order; a search restricted to one
    /// chain key returns that chain in verifiable order because append
    /// order and timestamp order agree per chain.
    pub async fn search(&self, filter: &crate::AuditFilter) -> Result<Vec<AuditEntry>> {
        let mut matches: Vec<AuditEntry> = if let Some(chain) = &filter.chain_key {
            // Chain-restricted searches keep store append order.
            self.store
                .read_chain(chain)
                .await?
                .into_iter()
                .filter(|entry| filter.matches(entry))
                .collect()
        } else {
            let mut entries: Vec<AuditEntry> = self
                .store
                .scan()
                .await?
                .into_iter()
                .filter(|entry| filter.matches(entry))
                .collect();
            entries.sort_by(|a, b| {
                a.timestamp
                    .cmp(&b.timestamp)
                    .then_with(|| a.id.as_uuid().cmp(&b.id.as_uuid()))
            });
            entries
        };
        matches.shrink_to_fit();
        Ok(matches)
    }
}
