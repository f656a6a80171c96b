//! Store and collaborator traits.

use async_trait::async_trait;
use procura_core::{
    ApprovalId, ApprovalRecord, AuditEntry, CascadeReport, ChainKey, DelegationId,
    DelegationStatus, EnhancedToken, PowerDelegation, Result, SubjectId, TokenId, TokenStatus,
};

/// Persistence for delegation records.
#[async_trait]
pub trait DelegationStore: Send + Sync {
    /// Insert or replace a delegation record.
    async fn put(&self, delegation: PowerDelegation) -> Result<()>;

    /// Fetch a delegation by id.
    async fn get(&self, id: DelegationId) -> Result<Option<PowerDelegation>>;

    /// Atomically set the status of a delegation and return the updated record.
    ///
    /// Fails with `NotFound` if the record does not exist. Revocation is
    /// terminal: backends must refuse to move a `Revoked` record to any
    /// other status, with the check and the mutation under one write lock,
    /// and fail with `InvalidRequest`. A caller's own pre-check cannot be
    /// trusted here; a revoke may land between its read and this write.
    async fn set_status(
        &self,
        id: DelegationId,
        status: DelegationStatus,
    ) -> Result<PowerDelegation>;

    /// Ancestors of `id`, nearest parent first, at most `limit` records.
    ///
    /// The walk stops early at a root, at a missing parent, or when it
    /// would revisit a record; callers detect cycles and over-deep chains
    /// from the returned path.
    async fn list_ancestors(&self, id: DelegationId, limit: usize) -> Result<Vec<PowerDelegation>>;
}

/// Persistence for issued tokens.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Insert or replace a token record.
    async fn put(&self, token: EnhancedToken) -> Result<()>;

    /// Fetch a token by id.
    async fn get(&self, id: TokenId) -> Result<Option<EnhancedToken>>;

    /// Atomically set a token's status and return the updated record.
    async fn set_status(&self, id: TokenId, status: TokenStatus) -> Result<EnhancedToken>;

    /// Atomically revoke `old` and insert `new` as one two-record write.
    ///
    /// Backends must guarantee no observer sees the store between the two
    /// mutations: either both applied or neither. The write must fail with
    /// `InvalidRequest`, mutating nothing, if `old` is no longer `Valid`:
    /// a revoke landing after the caller's own status check must win, not
    /// be absorbed into a fresh token.
    async fn rotate(&self, old: TokenId, new: EnhancedToken) -> Result<()>;
}

/// Append-only persistence for audit entries, keyed by chain.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Append an entry. Entries are never updated or deleted.
    async fn append(&self, entry: AuditEntry) -> Result<()>;

    /// The most recent entry on `chain`, if any.
    async fn last(&self, chain: &ChainKey) -> Result<Option<AuditEntry>>;

    /// All entries on `chain`, in append order.
    async fn read_chain(&self, chain: &ChainKey) -> Result<Vec<AuditEntry>>;

    /// All entries across chains, in no particular order.
    async fn scan(&self) -> Result<Vec<AuditEntry>>;
}

/// Persistence for dual-control approval records.
#[async_trait]
pub trait ApprovalStore: Send + Sync {
    /// Insert or replace an approval record.
    async fn put(&self, record: ApprovalRecord) -> Result<()>;

    /// Fetch an approval record by id.
    async fn get(&self, id: ApprovalId) -> Result<Option<ApprovalRecord>>;
}

/// Pluggable signing capability for delegation attestations.
///
/// The protocol logic treats signatures as opaque bytes; algorithm and key
/// management are the implementation's concern.
pub trait Signer: Send + Sync {
    /// Sign a message.
    fn sign(&self, message: &[u8]) -> Result<Vec<u8>>;

    /// Verify a signature over a message.
    fn verify(&self, message: &[u8], signature: &[u8]) -> bool;
}

/// Identity provider consulted at root-delegation creation.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    /// Whether `principal` is an identity-verified human.
    async fn is_verified_human(&self, principal: &SubjectId) -> Result<bool>;
}

/// Cascade re-verification seam.
///
/// Implemented by the delegation chain manager and consumed by the token
/// lifecycle manager, which must re-check cascade validity on every token
/// validation without depending on the delegation crate.
#[async_trait]
pub trait CascadeVerifier: Send + Sync {
    /// Walk the ancestor chain of `id` and fail closed on any break.
    async fn verify_cascade(&self, id: DelegationId) -> Result<CascadeReport>;
}
