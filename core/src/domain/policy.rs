// Copyright (c) 2026 Bastion Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Access-control matrix.
//!
//! A pure in-memory decision table over
//! `(source level, target level, operation risk)`. Policy is loaded once at
//! startup and immutable afterwards; changing it means redeploying, not
//! calling an API. Construction enforces strict monotonicity in the source
//! level: raising a caller's level never removes a permission it had.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::component::SecurityLevel;
use crate::domain::operation::OperationRisk;

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("non-monotonic matrix: {lower:?} is allowed {risk:?} against {target:?} but {higher:?} is not")]
    NonMonotonic {
        lower: SecurityLevel,
        higher: SecurityLevel,
        target: SecurityLevel,
        risk: OperationRisk,
    },
}

/// One static policy entry, as it appears in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionEntry {
    pub source: SecurityLevel,
    pub target: SecurityLevel,
    pub risk: OperationRisk,
    pub allowed: bool,
}

/// Immutable 4x4x4 allow/deny table.
#[derive(Debug, Clone)]
pub struct AccessMatrix {
    // [source.rank()][target.rank()][risk.rank()]
    table: [[[bool; 4]; 4]; 4],
}

impl AccessMatrix {
    /// Default rule: the source's privilege rank must cover both the
    /// target's level and the operation's risk tier. A CONFIDENTIAL caller
    /// may run CRITICAL operations against a PUBLIC target; a PUBLIC caller
    /// gets LOW-risk access to PUBLIC targets only.
    pub fn standard() -> Self {
        let mut table = [[[false; 4]; 4]; 4];
        for source in SecurityLevel::ALL {
            for target in SecurityLevel::ALL {
                for risk in OperationRisk::ALL {
                    let required = target.rank().max(risk.rank());
                    table[source.rank() as usize][target.rank() as usize]
                        [risk.rank() as usize] = source.rank() >= required;
                }
            }
        }
        Self { table }
    }

    /// Build from explicit entries layered over the standard rule.
    ///
    /// Entries are applied in order (later entries win), then the whole
    /// table is checked for monotonicity. Rejecting here keeps a bad policy
    /// file from weakening the boundary at runtime.
    pub fn from_entries(entries: &[PermissionEntry]) -> Result<Self, PolicyError> {
        let mut matrix = Self::standard();
        for entry in entries {
            matrix.table[entry.source.rank() as usize][entry.target.rank() as usize]
                [entry.risk.rank() as usize] = entry.allowed;
        }
        matrix.validate_monotonic()?;
        Ok(matrix)
    }

    /// Whether `source` may perform a `risk`-tier operation against `target`.
    pub fn is_allowed(
        &self,
        source: SecurityLevel,
        target: SecurityLevel,
        risk: OperationRisk,
    ) -> bool {
        self.table[source.rank() as usize][target.rank() as usize][risk.rank() as usize]
    }

    fn validate_monotonic(&self) -> Result<(), PolicyError> {
        for target in SecurityLevel::ALL {
            for risk in OperationRisk::ALL {
                for window in SecurityLevel::ALL.windows(2) {
                    let (lower, higher) = (window[0], window[1]);
                    if self.is_allowed(lower, target, risk) && !self.is_allowed(higher, target, risk)
                    {
                        return Err(PolicyError::NonMonotonic {
                            lower,
                            higher,
                            target,
                            risk,
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

impl Default for AccessMatrix {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_matrix_direction_asymmetry() {
        let matrix = AccessMatrix::standard();

        // Confidential caller, critical op, public target: allowed.
        assert!(matrix.is_allowed(
            SecurityLevel::Confidential,
            SecurityLevel::Public,
            OperationRisk::Critical,
        ));

        // The reverse direction is denied.
        assert!(!matrix.is_allowed(
            SecurityLevel::Public,
            SecurityLevel::Confidential,
            OperationRisk::Critical,
        ));
    }

    #[test]
    fn test_standard_matrix_same_level_low_risk() {
        let matrix = AccessMatrix::standard();
        for level in SecurityLevel::ALL {
            assert!(matrix.is_allowed(level, level, OperationRisk::Low));
        }
    }

    #[test]
    fn test_monotonicity_holds_for_standard() {
        let matrix = AccessMatrix::standard();
        for target in SecurityLevel::ALL {
            for risk in OperationRisk::ALL {
                for pair in SecurityLevel::ALL.windows(2) {
                    if matrix.is_allowed(pair[0], target, risk) {
                        assert!(
                            matrix.is_allowed(pair[1], target, risk),
                            "higher level lost a permission: {:?} -> {:?} ({:?}/{:?})",
                            pair[0],
                            pair[1],
                            target,
                            risk,
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn test_from_entries_rejects_non_monotonic() {
        // Grant PUBLIC something RESTRICTED would lack.
        let entries = vec![
            PermissionEntry {
                source: SecurityLevel::Public,
                target: SecurityLevel::Internal,
                risk: OperationRisk::High,
                allowed: true,
            },
            PermissionEntry {
                source: SecurityLevel::Restricted,
                target: SecurityLevel::Internal,
                risk: OperationRisk::High,
                allowed: false,
            },
        ];
        assert!(matches!(
            AccessMatrix::from_entries(&entries),
            Err(PolicyError::NonMonotonic { .. })
        ));
    }

    #[test]
    fn test_from_entries_override_applies() {
        // Tighten: internal callers lose medium-risk access to public targets.
        let entries = vec![
            PermissionEntry {
                source: SecurityLevel::Public,
                target: SecurityLevel::Public,
                risk: OperationRisk::Medium,
                allowed: false,
            },
            PermissionEntry {
                source: SecurityLevel::Internal,
                target: SecurityLevel::Public,
                risk: OperationRisk::Medium,
                allowed: false,
            },
        ];
        let matrix = AccessMatrix::from_entries(&entries).unwrap();
        assert!(!matrix.is_allowed(
            SecurityLevel::Internal,
            SecurityLevel::Public,
            OperationRisk::Medium,
        ));
        assert!(matrix.is_allowed(
            SecurityLevel::Restricted,
            SecurityLevel::Public,
            OperationRisk::Medium,
        ));
    }
}
