//! Token lifecycle management.
//!
//! Issues, validates, rotates, and revokes the bearer credentials that
//! represent a granted power. A token's scope is pinned to its delegation's
//! grant at issuance; afterwards the delegation cascade is re-checked on
//! every validation, so revoking any ancestor delegation immediately makes
//! dependent tokens unusable without touching their stored status.

pub mod manager;

pub use manager::{InvalidityReason, TokenLifecycleManager, TokenValidation};
