//! Collaborator interfaces for the Procura core.
//!
//! The protocol logic never talks to a database, signer, or identity
//! provider directly; it goes through the traits defined here. The in-memory
//! implementations are the reference collaborators used by tests and
//! single-process deployments. External backends implement the same traits
//! and are responsible for the atomicity each trait documents.

pub mod memory;
pub mod retry;
pub mod signer;
pub mod traits;

pub use memory::{
    MemoryApprovalStore, MemoryDelegationStore, MemoryIdentityVerifier, MemoryLedgerStore,
    MemoryTokenStore,
};
pub use retry::retry_read;
pub use signer::Ed25519Signer;
pub use traits::{
    ApprovalStore, CascadeVerifier, DelegationStore, IdentityVerifier, LedgerStore, Signer,
    TokenStore,
};
