// Copyright (c) 2026 Bastion Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Cross-component operation request value objects.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::component::{ComponentId, SecurityLevel};

/// Operation identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperationId(pub Uuid);

impl OperationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for OperationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for OperationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Sensitivity tier of an operation (read vs. mutation vs. administrative).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationRisk {
    Low,
    Medium,
    High,
    Critical,
}

impl OperationRisk {
    pub fn rank(self) -> u8 {
        match self {
            OperationRisk::Low => 0,
            OperationRisk::Medium => 1,
            OperationRisk::High => 2,
            OperationRisk::Critical => 3,
        }
    }

    pub const ALL: [OperationRisk; 4] = [
        OperationRisk::Low,
        OperationRisk::Medium,
        OperationRisk::High,
        OperationRisk::Critical,
    ];
}

/// Which rate-limit tier an operation counts against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateScope {
    /// Per-source-component budget.
    Component,
    /// Shared budget across the whole shell.
    Global,
    /// Per-owner budget for shared-state mutations.
    StateMutation,
}

/// A single cross-component operation to be validated by the boundary
/// enforcer.
///
/// `target` is the selector the caller addressed (an event name or a
/// component selector under the reserved prefix), validated by the namespace
/// guardian before anything stateful runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationRequest {
    pub operation_id: OperationId,
    pub source: ComponentId,
    pub source_level: SecurityLevel,
    pub target: String,
    pub target_level: SecurityLevel,
    /// Free-form operation type key ("read", "dispatch", "state.write", ...),
    /// also used for per-type rate-limit overrides.
    pub operation_type: String,
    pub risk: OperationRisk,
    pub scope: RateScope,
    /// Present when the operation mutates shared state; names the state
    /// owner whose lock must be held.
    pub mutates_state_of: Option<ComponentId>,
}

impl OperationRequest {
    pub fn new(
        source: ComponentId,
        source_level: SecurityLevel,
        target: &str,
        target_level: SecurityLevel,
        operation_type: &str,
        risk: OperationRisk,
    ) -> Self {
        Self {
            operation_id: OperationId::new(),
            source,
            source_level,
            target: target.to_string(),
            target_level,
            operation_type: operation_type.to_string(),
            risk,
            scope: RateScope::Component,
            mutates_state_of: None,
        }
    }

    pub fn with_scope(mut self, scope: RateScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn mutating(mut self, owner: ComponentId) -> Self {
        self.mutates_state_of = Some(owner);
        self.scope = RateScope::StateMutation;
        self
    }
}
