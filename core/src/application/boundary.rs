// Copyright (c) 2026 Bastion Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Boundary enforcer: the single per-operation decision function.
//!
//! Composes the namespace guardian, access matrix, rate limiter, and state
//! lock manager into one verdict. Check order is deliberate: the cheap,
//! stateless checks (namespace, access control) run first and both always
//! run; a hard denial from either skips the stateful checks (rate, lock) so
//! policy-rejected requests never consume budget or contend on locks. Every
//! violation found is returned, not just the first.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

use crate::domain::operation::{OperationRequest, RateScope};
use crate::domain::policy::AccessMatrix;
use crate::domain::violation::{
    RecommendedAction, SecurityError, SecurityViolation, Severity, ViolationType,
};
use crate::infrastructure::lock_manager::{LockGuard, StateLockManager};
use crate::infrastructure::namespace::NamespaceGuardian;
use crate::infrastructure::rate_limiter::{RateDecision, RateLimiter};

/// Outcome of one boundary evaluation.
///
/// When the operation mutates shared state and was allowed, `lock` carries
/// the held guard; dropping the verdict releases it, so callers keep it
/// alive for exactly the span of the mutation.
pub struct BoundaryVerdict {
    pub allowed: bool,
    pub violations: Vec<SecurityViolation>,
    pub rate: Option<RateDecision>,
    pub lock: Option<LockGuard>,
}

impl BoundaryVerdict {
    fn denied(violations: Vec<SecurityViolation>, rate: Option<RateDecision>) -> Self {
        Self {
            allowed: false,
            violations,
            rate,
            lock: None,
        }
    }

    /// The typed error for this verdict, populated from the operation.
    /// `None` when allowed.
    pub fn to_error(&self, op: &OperationRequest) -> Option<SecurityError> {
        if self.allowed {
            return None;
        }
        // Highest severity wins; ties go to the earliest check, so an
        // equally severe namespace violation outranks an ACL denial.
        let mut worst: Option<&SecurityViolation> = None;
        for violation in &self.violations {
            if worst.is_none_or(|w| violation.severity > w.severity) {
                worst = Some(violation);
            }
        }
        let worst = worst?;
        Some(match worst.violation_type {
            ViolationType::Namespace => SecurityError::NamespaceViolation {
                selector: op.target.clone(),
                reason: worst.reason.clone(),
            },
            ViolationType::AccessControl => SecurityError::AccessDenied {
                source_level: op.source_level,
                target_level: op.target_level,
                risk: op.risk,
            },
            ViolationType::RateLimit => SecurityError::RateLimitExceeded {
                retry_after: match worst.recommended_action {
                    RecommendedAction::RetryAfter { millis } => Duration::from_millis(millis),
                    _ => Duration::ZERO,
                },
            },
            ViolationType::LockContention => SecurityError::LockContention {
                owner: op.mutates_state_of.unwrap_or(op.source),
            },
            ViolationType::StateModification => SecurityError::StateModificationDenied {
                owner: op.mutates_state_of.unwrap_or(op.source),
                reason: worst.reason.clone(),
            },
        })
    }
}

/// Per-operation decision function shared by dispatch and guarded state.
pub struct BoundaryEnforcer {
    guardian: Arc<NamespaceGuardian>,
    matrix: Arc<AccessMatrix>,
    limiter: Arc<RateLimiter>,
    locks: StateLockManager,
}

impl BoundaryEnforcer {
    pub fn new(
        guardian: Arc<NamespaceGuardian>,
        matrix: Arc<AccessMatrix>,
        limiter: Arc<RateLimiter>,
        locks: StateLockManager,
    ) -> Self {
        Self {
            guardian,
            matrix,
            limiter,
            locks,
        }
    }

    /// Evaluate one operation against every boundary rule.
    pub fn validate(&self, op: &OperationRequest) -> BoundaryVerdict {
        self.validate_at(op, Utc::now())
    }

    /// Clock-injected variant of [`BoundaryEnforcer::validate`].
    pub fn validate_at(&self, op: &OperationRequest, now: DateTime<Utc>) -> BoundaryVerdict {
        let mut violations = Vec::new();

        // Stateless checks. Both run so the audit trail carries everything
        // that was wrong with the request, not just the first finding.
        if let Err(violation) = self.guardian.validate_target(&op.target) {
            violations.push(violation);
        }
        if !self
            .matrix
            .is_allowed(op.source_level, op.target_level, op.risk)
        {
            violations.push(
                SecurityViolation::new(
                    ViolationType::AccessControl,
                    Severity::High,
                    format!(
                        "{:?} source may not perform {:?} operations against {:?} target",
                        op.source_level, op.risk, op.target_level
                    ),
                )
                .with_action(RecommendedAction::Deny),
            );
        }
        if !violations.is_empty() {
            self.note_denial(op, &violations);
            return BoundaryVerdict::denied(violations, None);
        }

        // Stateful checks: the operation's own budget, then the shared one.
        let subject = match op.scope {
            RateScope::Component => op.source.to_string(),
            RateScope::Global => "global".to_string(),
            RateScope::StateMutation => op
                .mutates_state_of
                .unwrap_or(op.source)
                .to_string(),
        };
        let rate = self
            .limiter
            .check_at(op.scope, &subject, &op.operation_type, now);
        if !rate.allowed {
            violations.push(rate_violation(&rate));
            self.note_denial(op, &violations);
            return BoundaryVerdict::denied(violations, Some(rate));
        }
        if op.scope != RateScope::Global {
            let global = self
                .limiter
                .check_at(RateScope::Global, "global", &op.operation_type, now);
            if !global.allowed {
                violations.push(rate_violation(&global));
                self.note_denial(op, &violations);
                return BoundaryVerdict::denied(violations, Some(global));
            }
        }

        // Lock check only for mutations, and only after everything else
        // passed, so a doomed request never takes the lock.
        let lock = match op.mutates_state_of {
            Some(owner) => match self.locks.acquire_at(owner, op.operation_id, now) {
                Ok(guard) => Some(guard),
                Err(_) => {
                    violations.push(SecurityViolation::new(
                        ViolationType::LockContention,
                        Severity::Medium,
                        format!("state lock for {owner} is held by another operation"),
                    ));
                    self.note_denial(op, &violations);
                    return BoundaryVerdict::denied(violations, Some(rate));
                }
            },
            None => None,
        };

        tracing::debug!(
            operation = %op.operation_id,
            source = %op.source,
            target = %op.target,
            "operation cleared boundary"
        );
        BoundaryVerdict {
            allowed: true,
            violations,
            rate: Some(rate),
            lock,
        }
    }

    fn note_denial(&self, op: &OperationRequest, violations: &[SecurityViolation]) {
        metrics::counter!("boundary_denials_total").increment(1);
        tracing::warn!(
            operation = %op.operation_id,
            source = %op.source,
            target = %op.target,
            violations = violations.len(),
            first = %violations[0].reason,
            "operation denied at boundary"
        );
    }
}

fn rate_violation(rate: &RateDecision) -> SecurityViolation {
    let millis = rate
        .retry_after
        .unwrap_or(Duration::ZERO)
        .as_millis()
        .min(u128::from(u64::MAX)) as u64;
    SecurityViolation::new(
        ViolationType::RateLimit,
        Severity::Medium,
        format!("rate window exhausted, resets at {}", rate.reset_at),
    )
    .with_action(RecommendedAction::RetryAfter { millis })
}
