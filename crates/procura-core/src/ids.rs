//! Strongly typed identifiers.
//!
//! Every record kind gets its own id newtype so a token id can never be
//! passed where a delegation id is expected. Parent references in delegation
//! records are ids, not pointers; cascade walks resolve them through the
//! delegation store.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier for a principal, delegate, or approver.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubjectId(String);

impl SubjectId {
    /// Create a new subject identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the underlying string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for SubjectId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for SubjectId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl std::fmt::Display for SubjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Key grouping related audit entries into one hash chain.
///
/// Typically the delegation id the entries concern, but any stable string
/// works; entries with the same chain key form one verifiable sequence.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChainKey(String);

impl ChainKey {
    /// Create a new chain key.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Borrow the underlying string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ChainKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ChainKey {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&DelegationId> for ChainKey {
    fn from(value: &DelegationId) -> Self {
        Self::new(value.to_string())
    }
}

impl std::fmt::Display for ChainKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

macro_rules! uuid_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generate a fresh random identifier.
            pub fn random() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wrap an existing UUID.
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Return the underlying UUID.
            pub const fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

uuid_id!(
    /// Identifier for a power delegation record.
    DelegationId
);
uuid_id!(
    /// Identifier for an issued token.
    TokenId
);
uuid_id!(
    /// Identifier for a dual-control approval record.
    ApprovalId
);
uuid_id!(
    /// Identifier for an audit ledger entry.
    EntryId
);
uuid_id!(
    /// Correlation id carried from validation through downstream decisions.
    CorrelationId
);
