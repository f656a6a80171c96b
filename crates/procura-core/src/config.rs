//! Configuration for the Procura subsystem.
//!
//! All knobs live in one serde-derived tree with sensible defaults, loadable
//! from TOML. Invalid configuration is a programmer error and surfaces as
//! [`ProcuraError::Internal`] at construction, not at decision time.

use serde::{Deserialize, Serialize};

use crate::errors::{ProcuraError, Result};

/// Delegation graph limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DelegationConfig {
    /// Maximum number of hops from any delegation to its root.
    pub max_depth: u8,
}

impl Default for DelegationConfig {
    fn default() -> Self {
        Self { max_depth: 5 }
    }
}

/// Dual-control policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApprovalConfig {
    /// Action patterns that always require a second approver.
    ///
    /// A trailing `*` matches any suffix: `wire_*` covers `wire_funds`.
    pub sensitive_actions: Vec<String>,

    /// Monetary amount above which any action requires a second approver.
    pub amount_threshold: Option<f64>,

    /// Seconds an approval request stays open before expiring.
    pub approval_ttl_secs: u64,
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            sensitive_actions: Vec::new(),
            amount_threshold: None,
            approval_ttl_secs: 3_600,
        }
    }
}

/// Token issuance defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenConfig {
    /// Default time-to-live for issued tokens, in seconds.
    pub default_ttl_secs: u64,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: 3_600,
        }
    }
}

/// Rules for one recognized jurisdiction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JurisdictionRule {
    /// Jurisdiction code (ISO 3166-1 alpha-2).
    pub code: String,

    /// Actions that need a second approver when exercised under this
    /// jurisdiction, in addition to the global sensitivity policy.
    /// A trailing `*` matches any suffix.
    #[serde(default)]
    pub dual_control_actions: Vec<String>,
}

/// Top-level Procura configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcuraConfig {
    /// Jurisdictions the validator recognizes, with their local rules.
    ///
    /// Empty means every jurisdiction is recognized and carries no local
    /// dual-control rules.
    pub jurisdictions: Vec<JurisdictionRule>,

    /// Delegation graph limits.
    pub delegation: DelegationConfig,

    /// Dual-control policy.
    pub approval: ApprovalConfig,

    /// Token issuance defaults.
    pub token: TokenConfig,
}

impl ProcuraConfig {
    /// Parse configuration from a TOML document.
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let config: Self = toml::from_str(input)
            .map_err(|e| ProcuraError::internal(format!("invalid configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Check internal consistency.
    pub fn validate(&self) -> Result<()> {
        if self.delegation.max_depth == 0 {
            return Err(ProcuraError::internal("max_depth must be at least 1"));
        }
        if self.approval.approval_ttl_secs == 0 {
            return Err(ProcuraError::internal("approval_ttl_secs must be non-zero"));
        }
        if self.token.default_ttl_secs == 0 {
            return Err(ProcuraError::internal("default_ttl_secs must be non-zero"));
        }
        Ok(())
    }

    /// Whether a jurisdiction is recognized by this deployment.
    pub fn recognizes_jurisdiction(&self, jurisdiction: &str) -> bool {
        self.jurisdictions.is_empty() || self.jurisdictions.iter().any(|j| j.code == jurisdiction)
    }

    /// Actions requiring dual control under `jurisdiction`, beyond the
    /// global sensitivity policy.
    pub fn dual_control_actions_for(&self, jurisdiction: &str) -> &[String] {
        self.jurisdictions
            .iter()
            .find(|j| j.code == jurisdiction)
            .map_or(&[], |j| j.dual_control_actions.as_slice())
    }
}
