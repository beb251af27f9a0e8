// Copyright (c) 2026 Bastion Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Orchestrator configuration: the static startup surface.
//!
//! Everything here is loaded once (YAML manifest or `Default`) and immutable
//! afterwards. Covers:
//! - rate-limit tiers and per-operation-type overrides
//! - access-control matrix entries
//! - correlation window, suspension cooldown, audit retention
//! - reserved namespace prefix and sensitive-alias list
//! - per-component-type default security levels

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::domain::component::SecurityLevel;
use crate::domain::policy::{AccessMatrix, PermissionEntry, PolicyError};

/// One sliding-window rate tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateTier {
    /// Maximum operations allowed within the window.
    pub limit: u32,
    /// Window length.
    #[serde(with = "humantime_serde")]
    pub window: Duration,
}

impl RateTier {
    pub const fn new(limit: u32, window: Duration) -> Self {
        Self { limit, window }
    }
}

/// Rate-limit configuration: the three tiers plus per-operation-type
/// overrides (an override replaces the tier for matching operation types).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "RateLimitConfig::default_component_tier")]
    pub component: RateTier,
    #[serde(default = "RateLimitConfig::default_global_tier")]
    pub global: RateTier,
    #[serde(default = "RateLimitConfig::default_state_mutation_tier")]
    pub state_mutation: RateTier,
    #[serde(default)]
    pub operation_overrides: HashMap<String, RateTier>,
}

impl RateLimitConfig {
    fn default_component_tier() -> RateTier {
        RateTier::new(1_000, Duration::from_secs(60))
    }

    fn default_global_tier() -> RateTier {
        RateTier::new(5_000, Duration::from_secs(60))
    }

    fn default_state_mutation_tier() -> RateTier {
        RateTier::new(100, Duration::from_secs(60))
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            component: Self::default_component_tier(),
            global: Self::default_global_tier(),
            state_mutation: Self::default_state_mutation_tier(),
            operation_overrides: HashMap::new(),
        }
    }
}

/// Namespace guardian configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamespaceConfig {
    /// Selectors must start with this prefix.
    #[serde(default = "NamespaceConfig::default_prefix")]
    pub reserved_prefix: String,
    /// Substrings that mark a selector as targeting security machinery.
    #[serde(default = "NamespaceConfig::default_sensitive_aliases")]
    pub sensitive_aliases: Vec<String>,
}

impl NamespaceConfig {
    fn default_prefix() -> String {
        "app-".to_string()
    }

    fn default_sensitive_aliases() -> Vec<String> {
        vec![
            "security".to_string(),
            "auth".to_string(),
            "token".to_string(),
        ]
    }
}

impl Default for NamespaceConfig {
    fn default() -> Self {
        Self {
            reserved_prefix: Self::default_prefix(),
            sensitive_aliases: Self::default_sensitive_aliases(),
        }
    }
}

/// Event correlator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationConfig {
    #[serde(default = "CorrelationConfig::default_window", with = "humantime_serde")]
    pub window: Duration,
    /// Timelines idle longer than this are evicted.
    #[serde(default = "CorrelationConfig::default_idle_eviction", with = "humantime_serde")]
    pub idle_eviction: Duration,
}

impl CorrelationConfig {
    fn default_window() -> Duration {
        Duration::from_secs(300)
    }

    fn default_idle_eviction() -> Duration {
        Duration::from_secs(900)
    }
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            window: Self::default_window(),
            idle_eviction: Self::default_idle_eviction(),
        }
    }
}

/// Top-level orchestrator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default)]
    pub rate_limits: RateLimitConfig,
    #[serde(default)]
    pub namespace: NamespaceConfig,
    #[serde(default)]
    pub correlation: CorrelationConfig,
    /// Extra matrix entries layered over the standard rule.
    #[serde(default)]
    pub access_entries: Vec<PermissionEntry>,
    /// Default security level per component type; unknown types fall back
    /// to `fallback_security_level`.
    #[serde(default)]
    pub component_type_levels: HashMap<String, SecurityLevel>,
    #[serde(default = "OrchestratorConfig::default_fallback_level")]
    pub fallback_security_level: SecurityLevel,
    /// How long an escalation keeps a component out of dispatch.
    #[serde(default = "OrchestratorConfig::default_suspension_cooldown", with = "humantime_serde")]
    pub suspension_cooldown: Duration,
    /// Audit entries older than this are pruned.
    #[serde(default = "OrchestratorConfig::default_audit_retention", with = "humantime_serde")]
    pub audit_retention: Duration,
    /// Time a blocked lock acquisition waits before giving up.
    #[serde(default = "OrchestratorConfig::default_lock_timeout", with = "humantime_serde")]
    pub lock_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            rate_limits: RateLimitConfig::default(),
            namespace: NamespaceConfig::default(),
            correlation: CorrelationConfig::default(),
            access_entries: Vec::new(),
            component_type_levels: HashMap::new(),
            fallback_security_level: Self::default_fallback_level(),
            suspension_cooldown: Self::default_suspension_cooldown(),
            audit_retention: Self::default_audit_retention(),
            lock_timeout: Self::default_lock_timeout(),
        }
    }
}

impl OrchestratorConfig {
    fn default_fallback_level() -> SecurityLevel {
        SecurityLevel::Internal
    }

    fn default_suspension_cooldown() -> Duration {
        Duration::from_secs(300)
    }

    fn default_audit_retention() -> Duration {
        Duration::from_secs(24 * 60 * 60)
    }

    fn default_lock_timeout() -> Duration {
        Duration::from_millis(5_000)
    }

    /// Load from a YAML manifest and validate.
    pub fn from_yaml_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading orchestrator config {}", path.display()))?;
        let config: Self =
            serde_yaml::from_str(&raw).context("parsing orchestrator config manifest")?;
        config.validate()?;
        Ok(config)
    }

    /// Build the access matrix described by this configuration.
    pub fn build_matrix(&self) -> Result<AccessMatrix, PolicyError> {
        AccessMatrix::from_entries(&self.access_entries)
    }

    /// Reject configurations the engines cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        for (name, tier) in [
            ("component", &self.rate_limits.component),
            ("global", &self.rate_limits.global),
            ("state_mutation", &self.rate_limits.state_mutation),
        ] {
            anyhow::ensure!(tier.limit > 0, "rate tier {name} has a zero limit");
            anyhow::ensure!(
                !tier.window.is_zero(),
                "rate tier {name} has a zero window"
            );
        }
        for (op, tier) in &self.rate_limits.operation_overrides {
            anyhow::ensure!(
                tier.limit > 0 && !tier.window.is_zero(),
                "rate override for {op:?} is degenerate"
            );
        }
        anyhow::ensure!(
            !self.namespace.reserved_prefix.is_empty(),
            "reserved namespace prefix must not be empty"
        );
        anyhow::ensure!(
            !self.correlation.window.is_zero(),
            "correlation window must not be zero"
        );
        anyhow::ensure!(
            !self.lock_timeout.is_zero(),
            "lock timeout must not be zero"
        );
        self.build_matrix()
            .map_err(|e| anyhow::anyhow!("access matrix rejected: {e}"))?;
        Ok(())
    }

    /// Default security level for a component type.
    pub fn level_for_type(&self, component_type: &str) -> SecurityLevel {
        self.component_type_levels
            .get(component_type)
            .copied()
            .unwrap_or(self.fallback_security_level)
    }
}
