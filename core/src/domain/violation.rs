// Copyright (c) 2026 Bastion Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Security violation value objects and the typed error taxonomy.
//!
//! A [`SecurityViolation`] is the transient decision artifact produced by a
//! boundary check; it is never stored on its own, only wrapped into an audit
//! entry. [`SecurityError`] is what callers actually receive: a synchronous,
//! visible denial. Nothing here is retried automatically.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::domain::component::{ComponentId, ComponentState, SecurityLevel};
use crate::domain::operation::OperationRisk;

/// Category of a boundary denial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationType {
    RateLimit,
    LockContention,
    Namespace,
    AccessControl,
    StateModification,
}

/// Severity of a violation, used for audit risk weighting.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// Action the enforcer recommends to the caller on denial.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendedAction {
    Deny,
    RetryAfter { millis: u64 },
    Escalate,
}

/// Transient decision artifact returned by the boundary enforcer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityViolation {
    pub violation_type: ViolationType,
    pub severity: Severity,
    pub reason: String,
    pub recommended_action: RecommendedAction,
}

impl SecurityViolation {
    pub fn new(
        violation_type: ViolationType,
        severity: Severity,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            violation_type,
            severity,
            reason: reason.into(),
            recommended_action: RecommendedAction::Deny,
        }
    }

    pub fn with_action(mut self, action: RecommendedAction) -> Self {
        self.recommended_action = action;
        self
    }
}

/// Errors raised synchronously to the operation that triggered them.
///
/// Correlation escalations are deliberately absent: they do not fail the
/// triggering call, they suspend the component for subsequent ones.
#[derive(Debug, Error)]
pub enum SecurityError {
    #[error("rate limit exceeded, retry after {retry_after:?}")]
    RateLimitExceeded { retry_after: Duration },

    #[error("state lock for {owner} is held by another operation")]
    LockContention { owner: ComponentId },

    #[error("namespace violation on selector {selector:?}: {reason}")]
    NamespaceViolation { selector: String, reason: String },

    #[error("access denied: {source_level:?} may not perform {risk:?} operations against {target_level:?}")]
    AccessDenied {
        source_level: SecurityLevel,
        target_level: SecurityLevel,
        risk: OperationRisk,
    },

    #[error("protected state write denied for {owner}: {reason}")]
    StateModificationDenied { owner: ComponentId, reason: String },

    #[error("component {component_id} is suspended until {until}")]
    ComponentSuspended {
        component_id: ComponentId,
        until: DateTime<Utc>,
    },

    #[error("unknown component {component_id}")]
    UnknownComponent { component_id: ComponentId },

    #[error("invalid lifecycle transition {from:?} -> {to:?}")]
    InvalidTransition {
        from: ComponentState,
        to: ComponentState,
    },
}
