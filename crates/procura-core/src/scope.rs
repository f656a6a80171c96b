//! Capability scope sets.
//!
//! A scope is an ordered set of capability strings (`sign_contract`,
//! `wire_funds`, ...). Delegation only ever attenuates: a child's scope must
//! be a subset of its parent's, and a token's scope must be a subset of its
//! delegation's grant at issuance time.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// An ordered set of capability strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScopeSet(BTreeSet<String>);

impl ScopeSet {
    /// Create an empty scope set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the set contains no capabilities.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of capabilities in the set.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the set grants a specific capability.
    pub fn contains(&self, capability: &str) -> bool {
        self.0.contains(capability)
    }

    /// Whether every capability in `self` is also granted by `other`.
    pub fn is_subset(&self, other: &Self) -> bool {
        self.0.is_subset(&other.0)
    }

    /// Add a capability to the set.
    pub fn insert(&mut self, capability: impl Into<String>) {
        self.0.insert(capability.into());
    }

    /// Capabilities present in `self` but missing from `other`.
    ///
    /// Used to report exactly which capabilities caused a scope escalation
    /// or an over-broad token request.
    pub fn missing_from(&self, other: &Self) -> Vec<String> {
        self.0.difference(&other.0).cloned().collect()
    }

    /// Iterate over the capabilities in order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for ScopeSet {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl std::fmt::Display for ScopeSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for capability in &self.0 {
            if !first {
                f.write_str(" ")?;
            }
            f.write_str(capability)?;
            first = false;
        }
        Ok(())
    }
}
