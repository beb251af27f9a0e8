// Copyright (c) 2026 Bastion Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Namespace and selector validation.
//!
//! Selector validation is a core security rule, not a technical concern:
//! every operation names its target through a selector, and this guardian
//! decides whether that selector is a legitimate single-component address.
//!
//! # Security Guarantees
//! - Rejects selectors outside the reserved naming prefix
//! - Rejects wildcard/enumeration markers that address many components
//! - Rejects aliases naming security machinery ("security", "auth", "token")
//!
//! Enumeration *detection* is separate and heuristic: it scores an access
//! sequence instead of issuing a verdict, and callers fold the score into
//! risk assessment.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::config::NamespaceConfig;
use crate::domain::violation::{SecurityViolation, Severity, ViolationType};

const WILDCARD_MARKERS: [char; 3] = ['*', '?', '['];

/// Maximum selector length accepted before validation even looks inside.
const MAX_SELECTOR_LEN: usize = 256;

/// One observed target access, the unit the enumeration heuristic works on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetAccess {
    pub selector: String,
    pub at: DateTime<Utc>,
}

/// Weighted indicators produced while scoring an access sequence.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EnumerationIndicators {
    /// Share of adjacent pairs whose trailing numeric ids are sequential.
    pub sequential_probing: f64,
    /// Share of selectors carrying wildcard markers.
    pub wildcard_usage: f64,
    /// Accesses per second normalized against a scanning threshold.
    pub scan_velocity: f64,
}

/// Validates operation targets against the shell's naming scheme.
pub struct NamespaceGuardian {
    config: NamespaceConfig,
}

impl NamespaceGuardian {
    pub fn new(config: NamespaceConfig) -> Self {
        Self { config }
    }

    /// Validate that `selector` is an allowed single-component address.
    pub fn validate_target(&self, selector: &str) -> Result<(), SecurityViolation> {
        if selector.is_empty() || selector.len() > MAX_SELECTOR_LEN {
            return Err(self.violation(
                Severity::Medium,
                format!("selector length {} out of bounds", selector.len()),
            ));
        }

        if selector.contains('\0') {
            return Err(self.violation(Severity::High, "selector contains null byte".to_string()));
        }

        if !selector.starts_with(&self.config.reserved_prefix) {
            return Err(self.violation(
                Severity::Medium,
                format!(
                    "selector {:?} is outside the reserved prefix {:?}",
                    selector, self.config.reserved_prefix
                ),
            ));
        }

        if let Some(marker) = selector.chars().find(|c| WILDCARD_MARKERS.contains(c)) {
            tracing::warn!(selector, %marker, "wildcard selector rejected");
            return Err(self.violation(
                Severity::High,
                format!("selector {selector:?} carries wildcard marker {marker:?}"),
            ));
        }

        let lowered = selector.to_ascii_lowercase();
        if let Some(alias) = self
            .config
            .sensitive_aliases
            .iter()
            .find(|alias| lowered.contains(alias.as_str()))
        {
            tracing::warn!(selector, alias, "security-sensitive alias rejected");
            return Err(self.violation(
                Severity::High,
                format!("selector {selector:?} addresses sensitive alias {alias:?}"),
            ));
        }

        Ok(())
    }

    /// Score an access sequence for enumeration behavior, 0.0–1.0.
    ///
    /// A heuristic, not a hard rule: sequential-id probing is weighted
    /// heaviest, wildcard attempts next, raw scan velocity least.
    pub fn enumeration_risk(&self, accesses: &[TargetAccess]) -> f64 {
        let indicators = self.enumeration_indicators(accesses);
        let score = indicators.sequential_probing * 0.5
            + indicators.wildcard_usage * 0.3
            + indicators.scan_velocity * 0.2;
        score.clamp(0.0, 1.0)
    }

    /// The raw indicators behind [`NamespaceGuardian::enumeration_risk`].
    pub fn enumeration_indicators(&self, accesses: &[TargetAccess]) -> EnumerationIndicators {
        if accesses.len() < 2 {
            return EnumerationIndicators::default();
        }

        let mut sequential_pairs = 0usize;
        for pair in accesses.windows(2) {
            if let (Some(a), Some(b)) = (
                trailing_number(&pair[0].selector),
                trailing_number(&pair[1].selector),
            ) {
                if b == a + 1 || b == a.saturating_sub(1) {
                    sequential_pairs += 1;
                }
            }
        }
        let sequential_probing = sequential_pairs as f64 / (accesses.len() - 1) as f64;

        let wildcard_hits = accesses
            .iter()
            .filter(|a| a.selector.chars().any(|c| WILDCARD_MARKERS.contains(&c)))
            .count();
        let wildcard_usage = wildcard_hits as f64 / accesses.len() as f64;

        let span = (accesses[accesses.len() - 1].at - accesses[0].at)
            .to_std()
            .unwrap_or_default()
            .as_secs_f64()
            .max(0.001);
        let per_second = accesses.len() as f64 / span;
        // 20 targets/second is treated as full-speed scanning.
        let scan_velocity = (per_second / 20.0).clamp(0.0, 1.0);

        EnumerationIndicators {
            sequential_probing,
            wildcard_usage,
            scan_velocity,
        }
    }

    fn violation(&self, severity: Severity, reason: String) -> SecurityViolation {
        SecurityViolation::new(ViolationType::Namespace, severity, reason)
    }
}

/// Trailing decimal run of a selector ("app-item-17" -> 17).
fn trailing_number(selector: &str) -> Option<u64> {
    let digits: String = selector
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit())
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    if digits.is_empty() || digits.len() > 12 {
        return None;
    }
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guardian() -> NamespaceGuardian {
        NamespaceGuardian::new(NamespaceConfig::default())
    }

    fn accesses(selectors: &[&str], gap_ms: i64) -> Vec<TargetAccess> {
        let start = Utc::now();
        selectors
            .iter()
            .enumerate()
            .map(|(i, s)| TargetAccess {
                selector: s.to_string(),
                at: start + chrono::Duration::milliseconds(gap_ms * i as i64),
            })
            .collect()
    }

    #[test]
    fn test_valid_selector_passes() {
        assert!(guardian().validate_target("app-data-table").is_ok());
    }

    #[test]
    fn test_wrong_prefix_rejected() {
        let err = guardian().validate_target("widget-table").unwrap_err();
        assert_eq!(err.violation_type, ViolationType::Namespace);
    }

    #[test]
    fn test_wildcard_selector_rejected() {
        for selector in ["app-*", "app-item-?", "app-[a-z]"] {
            let err = guardian().validate_target(selector).unwrap_err();
            assert_eq!(err.severity, Severity::High);
        }
    }

    #[test]
    fn test_sensitive_aliases_rejected() {
        for selector in ["app-security-panel", "app-AUTH-box", "app-token-cache"] {
            assert!(guardian().validate_target(selector).is_err());
        }
    }

    #[test]
    fn test_empty_and_null_rejected() {
        assert!(guardian().validate_target("").is_err());
        assert!(guardian().validate_target("app-\0x").is_err());
    }

    #[test]
    fn test_sequential_probing_scores_high() {
        let g = guardian();
        let seq = accesses(
            &[
                "app-item-1",
                "app-item-2",
                "app-item-3",
                "app-item-4",
                "app-item-5",
                "app-item-6",
            ],
            20,
        );
        let risk = g.enumeration_risk(&seq);
        assert!(risk > 0.5, "sequential fast scan should score high, got {risk}");
    }

    #[test]
    fn test_benign_access_scores_low() {
        let g = guardian();
        let benign = accesses(&["app-table", "app-modal", "app-table"], 5_000);
        let risk = g.enumeration_risk(&benign);
        assert!(risk < 0.2, "slow varied access should score low, got {risk}");
    }

    #[test]
    fn test_wildcard_usage_raises_score() {
        let g = guardian();
        let with_wildcards = accesses(&["app-*", "app-item-*", "app-?"], 2_000);
        let without = accesses(&["app-a", "app-b", "app-c"], 2_000);
        assert!(g.enumeration_risk(&with_wildcards) > g.enumeration_risk(&without));
    }

    #[test]
    fn test_single_access_is_no_signal() {
        let g = guardian();
        let one = accesses(&["app-item-1"], 0);
        assert_eq!(g.enumeration_risk(&one), 0.0);
    }
}
