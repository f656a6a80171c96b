//! Search filters over the audit ledger.

use serde::{Deserialize, Serialize};

use procura_core::{AuditEntry, AuditResult, ChainKey, SubjectId, Timestamp};

/// Conjunctive filter for ledger search; unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditFilter {
    /// Match entries recorded by this actor.
    pub actor: Option<SubjectId>,
    /// Match entries with exactly this action.
    pub action: Option<String>,
    /// Match entries targeting this id.
    pub target: Option<String>,
    /// Match entries with this outcome.
    pub result: Option<AuditResult>,
    /// Match entries on this chain.
    pub chain_key: Option<ChainKey>,
    /// Match entries at or after this time.
    pub from: Option<Timestamp>,
    /// Match entries strictly before this time.
    pub until: Option<Timestamp>,
}

impl AuditFilter {
    /// Filter matching every entry.
    pub fn any() -> Self {
        Self::default()
    }

    /// Restrict to one actor.
    #[must_use]
    pub fn actor(mut self, actor: impl Into<SubjectId>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    /// Restrict to one action.
    #[must_use]
    pub fn action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    /// Restrict to one target.
    #[must_use]
    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Restrict to one outcome.
    #[must_use]
    pub fn result(mut self, result: AuditResult) -> Self {
        self.result = Some(result);
        self
    }

    /// Restrict to one chain.
    #[must_use]
    pub fn chain(mut self, chain: impl Into<ChainKey>) -> Self {
        self.chain_key = Some(chain.into());
        self
    }

    /// Restrict to the half-open time range `[from, until)`.
    #[must_use]
    pub fn between(mut self, from: Timestamp, until: Timestamp) -> Self {
        self.from = Some(from);
        self.until = Some(until);
        self
    }

    /// Whether `entry` satisfies every set field.
    pub fn matches(&self, entry: &AuditEntry) -> bool {
        if let Some(actor) = &self.actor {
            if &entry.actor != actor {
                return false;
            }
        }
        if let Some(action) = &self.action {
            if &entry.action != action {
                return false;
            }
        }
        if let Some(target) = &self.target {
            if entry.target.as_deref() != Some(target.as_str()) {
                return false;
            }
        }
        if let Some(result) = self.result {
            if entry.result != result {
                return false;
            }
        }
        if let Some(chain) = &self.chain_key {
            if &entry.chain_key != chain {
                return false;
            }
        }
        if let Some(from) = self.from {
            if entry.timestamp < from {
                return false;
            }
        }
        if let Some(until) = self.until {
            if entry.timestamp >= until {
                return false;
            }
        }
        true
    }
}
