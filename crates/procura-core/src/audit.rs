//! Audit ledger entries.
//!
//! Every decision in the subsystem appends one entry. Entries are immutable
//! once appended; each entry's `self_hash` covers its core fields plus the
//! previous entry's `self_hash` on the same chain key, so any mutation is
//! detectable by re-walking the chain.

use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::hash::{canonical_hash, Hash32};
use crate::ids::{ChainKey, EntryId, SubjectId};
use crate::time::Timestamp;

/// Outcome recorded by an audit entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditResult {
    /// The operation succeeded.
    Success,
    /// The operation failed for a non-authorization reason.
    Failure,
    /// The operation was denied by an authorization check.
    Denied,
}

impl std::fmt::Display for AuditResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => f.write_str("success"),
            Self::Failure => f.write_str("failure"),
            Self::Denied => f.write_str("denied"),
        }
    }
}

/// One immutable, hash-linked audit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Unique identifier.
    pub id: EntryId,

    /// When the decision was recorded.
    pub timestamp: Timestamp,

    /// Who acted.
    pub actor: SubjectId,

    /// What was done (`delegation.create`, `token.rotate`, ...).
    pub action: String,

    /// What the action targeted, if anything.
    pub target: Option<String>,

    /// Decision outcome.
    pub result: AuditResult,

    /// Free-form key/value pairs; ordered, bound into the hash.
    pub metadata: Vec<(String, String)>,

    /// Chain this entry belongs to.
    pub chain_key: ChainKey,

    /// `self_hash` of the previous entry on the chain, zero for the first.
    pub prev_hash: Hash32,

    /// BLAKE3 over the canonical core fields plus `prev_hash`.
    pub self_hash: Hash32,
}

/// The hashed portion of an entry: everything except `self_hash`.
#[derive(Serialize)]
struct EntryCore<'a> {
    id: EntryId,
    timestamp: Timestamp,
    actor: &'a SubjectId,
    action: &'a str,
    target: Option<&'a str>,
    result: AuditResult,
    metadata: &'a [(String, String)],
    chain_key: &'a ChainKey,
    prev_hash: Hash32,
}

impl AuditEntry {
    /// Start building an entry for `actor` performing `action`.
    pub fn builder(actor: impl Into<SubjectId>, action: impl Into<String>) -> AuditEntryBuilder {
        AuditEntryBuilder {
            actor: actor.into(),
            action: action.into(),
            target: None,
            result: AuditResult::Success,
            metadata: Vec::new(),
        }
    }

    /// Recompute the hash this entry should carry given its fields.
    pub fn compute_self_hash(&self) -> Result<Hash32> {
        canonical_hash(&EntryCore {
            id: self.id,
            timestamp: self.timestamp,
            actor: &self.actor,
            action: &self.action,
            target: self.target.as_deref(),
            result: self.result,
            metadata: &self.metadata,
            chain_key: &self.chain_key,
            prev_hash: self.prev_hash,
        })
    }
}

/// Builder for audit entries.
///
/// The ledger supplies the chain key, timestamp, and hash links at append
/// time; the builder only collects what the caller knows.
#[derive(Debug, Clone)]
pub struct AuditEntryBuilder {
    actor: SubjectId,
    action: String,
    target: Option<String>,
    result: AuditResult,
    metadata: Vec<(String, String)>,
}

impl AuditEntryBuilder {
    /// Set the target of the action.
    #[must_use]
    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Set the outcome.
    #[must_use]
    pub fn result(mut self, result: AuditResult) -> Self {
        self.result = result;
        self
    }

    /// Attach a metadata pair.
    #[must_use]
    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.push((key.into(), value.into()));
        self
    }

    /// Finish into an unlinked entry on `chain_key` at `timestamp`.
    ///
    /// `prev_hash` and `self_hash` start zeroed; the ledger fills them while
    /// holding the chain's append lock.
    pub fn finish(self, chain_key: ChainKey, timestamp: Timestamp) -> AuditEntry {
        AuditEntry {
            id: EntryId::random(),
            timestamp,
            actor: self.actor,
            action: self.action,
            target: self.target,
            result: self.result,
            metadata: self.metadata,
            chain_key,
            prev_hash: Hash32::ZERO,
            self_hash: Hash32::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> AuditEntry {
        AuditEntry::builder("validator", "request.validate")
            .target("req-1")
            .result(AuditResult::Denied)
            .metadata("jurisdiction", "DE")
            .finish(ChainKey::new("chain-1"), Timestamp::from_unix_secs(42))
    }

    #[test]
    fn self_hash_covers_every_core_field() {
        let base = entry();
        let base_hash = base.compute_self_hash().unwrap();

        let mut changed = base.clone();
        changed.action = "token.issue".into();
        assert_ne!(changed.compute_self_hash().unwrap(), base_hash);

        let mut changed = base.clone();
        changed.result = AuditResult::Success;
        assert_ne!(changed.compute_self_hash().unwrap(), base_hash);

        let mut changed = base.clone();
        changed.metadata.push(("k".into(), "v".into()));
        assert_ne!(changed.compute_self_hash().unwrap(), base_hash);

        let mut changed = base;
        changed.prev_hash = Hash32::digest(b"tamper");
        assert_ne!(changed.compute_self_hash().unwrap(), base_hash);
    }

    #[test]
    fn self_hash_excludes_itself() {
        let mut a = entry();
        a.self_hash = Hash32::digest(b"whatever");
        let mut b = a.clone();
        b.self_hash = Hash32::ZERO;
        assert_eq!(
            a.compute_self_hash().unwrap(),
            b.compute_self_hash().unwrap()
        );
    }
}
