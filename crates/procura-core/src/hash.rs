//! Canonical hashing for tamper-evident records.
//!
//! Audit entries and attestations hash a canonical JSON serialization of
//! their core fields with BLAKE3. JSON from serde is canonical enough for
//! this purpose because every hashed struct uses ordered fields and ordered
//! collections (`BTreeSet`-backed scopes, no maps).

use serde::{Deserialize, Serialize};

use crate::errors::Result;

/// A 32-byte BLAKE3 digest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Hash32([u8; 32]);

impl Hash32 {
    /// Digest of all zeroes, used as the previous-hash of a chain's first entry.
    pub const ZERO: Self = Self([0u8; 32]);

    /// Hash raw bytes.
    pub fn digest(bytes: &[u8]) -> Self {
        Self(*blake3::hash(bytes).as_bytes())
    }

    /// Hash two byte strings as one message, in order.
    pub fn digest_pair(first: &[u8], second: &[u8]) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(first);
        hasher.update(second);
        Self(*hasher.finalize().as_bytes())
    }

    /// Borrow the raw digest bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex rendering of the digest.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl std::fmt::Display for Hash32 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Hash the canonical serialization of a value.
pub fn canonical_hash<T: Serialize>(value: &T) -> Result<Hash32> {
    let bytes = serde_json::to_vec(value)?;
    Ok(Hash32::digest(&bytes))
}
