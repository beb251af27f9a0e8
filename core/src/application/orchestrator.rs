// Copyright (c) 2026 Bastion Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Security orchestrator: the top-level façade of the core.
//!
//! Owns every process-wide table (registry, rate buckets, locks, audit
//! store, correlation timelines, guarded state) and injects them into the
//! boundary enforcer — nothing here is a module-level singleton, so tests
//! and multi-shell hosts can run independent orchestrators side by side.
//!
//! Every dispatch and guarded-state access is validated by the boundary
//! enforcer, audited on both outcomes, and fed through the correlator in the
//! same turn. Correlation escalations suspend the implicated component for a
//! configurable cooldown; the cooldown lapses lazily on its next touch.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::application::boundary::{BoundaryEnforcer, BoundaryVerdict};
use crate::application::guarded_state::GuardedStateStore;
use crate::domain::audit::{AuditEntry, AuditId, EventCategory};
use crate::domain::component::{
    ComponentId, ComponentRegistration, ComponentState, SecurityLevel,
};
use crate::domain::config::OrchestratorConfig;
use crate::domain::operation::{OperationRequest, OperationRisk};
use crate::domain::violation::SecurityError;
use crate::infrastructure::audit_log::{AuditQuery, AuditReceipt, SecurityAuditor};
use crate::infrastructure::correlator::{CorrelationReport, EscalationNotice, EventCorrelator};
use crate::infrastructure::event_bus::{ComponentEvent, EventBus, EventSubscription};
use crate::infrastructure::lock_manager::StateLockManager;
use crate::infrastructure::namespace::NamespaceGuardian;
use crate::infrastructure::rate_limiter::RateLimiter;

pub struct SecurityOrchestrator {
    config: OrchestratorConfig,
    registry: DashMap<ComponentId, ComponentRegistration>,
    limiter: Arc<RateLimiter>,
    locks: StateLockManager,
    correlator: Arc<EventCorrelator>,
    auditor: Arc<SecurityAuditor>,
    enforcer: BoundaryEnforcer,
    state: GuardedStateStore,
    bus: EventBus,
}

impl SecurityOrchestrator {
    /// Build the whole core from one validated configuration.
    pub fn new(config: OrchestratorConfig) -> anyhow::Result<Self> {
        config.validate()?;
        let matrix = Arc::new(config.build_matrix()?);
        let guardian = Arc::new(NamespaceGuardian::new(config.namespace.clone()));
        let limiter = Arc::new(RateLimiter::new(config.rate_limits.clone()));
        let locks = StateLockManager::new(config.lock_timeout);
        let correlator = Arc::new(EventCorrelator::with_guardian(
            config.correlation.clone(),
            Arc::clone(&guardian),
        ));
        let auditor = Arc::new(SecurityAuditor::new(
            Arc::clone(&correlator),
            config.audit_retention,
        ));
        let enforcer = BoundaryEnforcer::new(
            guardian,
            matrix,
            Arc::clone(&limiter),
            locks.clone(),
        );
        Ok(Self {
            config,
            registry: DashMap::new(),
            limiter,
            locks,
            correlator,
            auditor,
            enforcer,
            state: GuardedStateStore::new(),
            bus: EventBus::with_default_capacity(),
        })
    }

    // ---- registration lifecycle ------------------------------------------

    /// Register a component and activate it for dispatch.
    pub fn register(
        &self,
        component_type: &str,
        security_level: Option<SecurityLevel>,
    ) -> ComponentId {
        self.register_at(component_type, security_level, Utc::now())
    }

    /// Clock-injected variant of [`SecurityOrchestrator::register`].
    pub fn register_at(
        &self,
        component_type: &str,
        security_level: Option<SecurityLevel>,
        now: DateTime<Utc>,
    ) -> ComponentId {
        let level = security_level.unwrap_or_else(|| self.config.level_for_type(component_type));
        let mut registration = ComponentRegistration::new(component_type, level, now);
        registration.state = ComponentState::Active;
        let id = registration.id;
        self.registry.insert(id, registration);

        tracing::info!(component = %id, component_type, ?level, "component registered");
        self.auditor.record_at(
            id,
            EventCategory::Lifecycle,
            "component.registered",
            json!({ "detail": component_type, "security_level": level_name(level) }),
            now,
        );
        id
    }

    /// Tear a component down. Terminal: releases every lock, rate bucket,
    /// correlation timeline, and guarded-state document keyed to it.
    pub fn unregister(&self, component_id: ComponentId) -> Result<(), SecurityError> {
        self.unregister_at(component_id, Utc::now())
    }

    pub fn unregister_at(
        &self,
        component_id: ComponentId,
        now: DateTime<Utc>,
    ) -> Result<(), SecurityError> {
        // Every live state may unregister; a repeat hits UnknownComponent.
        self.registry
            .remove(&component_id)
            .ok_or(SecurityError::UnknownComponent { component_id })?;

        self.limiter.purge_subject(&component_id.to_string());
        self.locks.purge_owner(component_id);
        self.correlator.purge_component(component_id);
        self.state.purge_owner(component_id);

        tracing::info!(component = %component_id, "component unregistered");
        self.auditor.record_at(
            component_id,
            EventCategory::Lifecycle,
            "component.unregistered",
            json!({}),
            now,
        );
        Ok(())
    }

    /// Administrative suspension, same cooldown as a correlator escalation.
    pub fn suspend(&self, component_id: ComponentId) -> Result<(), SecurityError> {
        self.suspend_at(component_id, Utc::now(), "administrative action")
    }

    pub fn suspend_at(
        &self,
        component_id: ComponentId,
        now: DateTime<Utc>,
        reason: &str,
    ) -> Result<(), SecurityError> {
        {
            let mut registration = self
                .registry
                .get_mut(&component_id)
                .ok_or(SecurityError::UnknownComponent { component_id })?;
            if !registration.state.can_transition_to(ComponentState::Suspended) {
                return Err(SecurityError::InvalidTransition {
                    from: registration.state,
                    to: ComponentState::Suspended,
                });
            }
            registration.state = ComponentState::Suspended;
            registration.suspended_until = Some(
                now + chrono::Duration::from_std(self.config.suspension_cooldown)
                    .unwrap_or_else(|_| chrono::Duration::seconds(300)),
            );
        }

        metrics::counter!("component_suspensions_total").increment(1);
        tracing::warn!(component = %component_id, reason, "component suspended");
        self.auditor.record_at(
            component_id,
            EventCategory::Escalation,
            "component.suspended",
            json!({ "detail": reason }),
            now,
        );
        Ok(())
    }

    /// Current lifecycle state, if registered.
    pub fn component_state(&self, component_id: ComponentId) -> Option<ComponentState> {
        self.registry.get(&component_id).map(|r| r.state)
    }

    // ---- dispatch ----------------------------------------------------------

    /// Publish an event from `source` to subscribers, through the boundary.
    ///
    /// `target_level` declares the sensitivity of the audience the event
    /// addresses; `risk` the operation tier. Denials raise the typed error
    /// and are audited whether or not the caller handles it.
    pub fn dispatch(
        &self,
        event_name: &str,
        payload: Value,
        source: ComponentId,
        target_level: SecurityLevel,
        risk: OperationRisk,
    ) -> Result<AuditId, SecurityError> {
        self.dispatch_at(event_name, payload, source, target_level, risk, Utc::now())
    }

    pub fn dispatch_at(
        &self,
        event_name: &str,
        payload: Value,
        source: ComponentId,
        target_level: SecurityLevel,
        risk: OperationRisk,
        now: DateTime<Utc>,
    ) -> Result<AuditId, SecurityError> {
        let registration = self.ensure_dispatchable(source, now)?;
        let op = OperationRequest::new(
            source,
            registration.security_level,
            event_name,
            target_level,
            "dispatch",
            risk,
        );

        let (receipt, _verdict) = self.validate_and_audit(&op, now)?;
        self.bus.publish(ComponentEvent {
            name: event_name.to_string(),
            payload,
            source,
            published_at: now,
        });
        Ok(receipt.audit_id)
    }

    /// Subscribe to events with a given name; unsubscribe by dropping.
    pub fn subscribe(&self, event_name: &str) -> EventSubscription {
        self.bus.subscribe(event_name)
    }

    /// Subscribe to every dispatched event.
    pub fn subscribe_all(&self) -> EventSubscription {
        self.bus.subscribe_all()
    }

    /// Escalation notices as they are raised by the correlator.
    pub fn subscribe_escalations(&self) -> broadcast::Receiver<EscalationNotice> {
        self.correlator.subscribe_escalations()
    }

    // ---- guarded state -----------------------------------------------------

    /// Read from a component's protected state document.
    pub fn state_get(
        &self,
        requester: ComponentId,
        owner: ComponentId,
        path: &str,
    ) -> Result<Option<Value>, SecurityError> {
        self.state_get_at(requester, owner, path, Utc::now())
    }

    pub fn state_get_at(
        &self,
        requester: ComponentId,
        owner: ComponentId,
        path: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Value>, SecurityError> {
        let requester_reg = self.ensure_dispatchable(requester, now)?;
        let owner_reg = self
            .registry
            .get(&owner)
            .ok_or(SecurityError::UnknownComponent { component_id: owner })?
            .clone();

        let op = OperationRequest::new(
            requester,
            requester_reg.security_level,
            &self.state_selector(owner),
            owner_reg.security_level,
            "state.read",
            OperationRisk::Low,
        );
        let _ = self.validate_and_audit(&op, now)?;
        Ok(self.state.read(owner, path))
    }

    /// Write into a component's protected state document. Takes the owner's
    /// state lock for the span of the write.
    pub fn state_set(
        &self,
        requester: ComponentId,
        owner: ComponentId,
        path: &str,
        value: Value,
    ) -> Result<AuditId, SecurityError> {
        self.state_set_at(requester, owner, path, value, Utc::now())
    }

    pub fn state_set_at(
        &self,
        requester: ComponentId,
        owner: ComponentId,
        path: &str,
        value: Value,
        now: DateTime<Utc>,
    ) -> Result<AuditId, SecurityError> {
        let requester_reg = self.ensure_dispatchable(requester, now)?;
        let owner_reg = self
            .registry
            .get(&owner)
            .ok_or(SecurityError::UnknownComponent { component_id: owner })?
            .clone();

        let op = OperationRequest::new(
            requester,
            requester_reg.security_level,
            &self.state_selector(owner),
            owner_reg.security_level,
            "state.write",
            OperationRisk::High,
        )
        .mutating(owner);

        // The verdict holds the owner's lock; keep it alive across the write.
        let (receipt, verdict) = self.validate_and_audit(&op, now)?;
        let result = self.state.write(owner, path, value);
        drop(verdict);

        match result {
            Ok(()) => Ok(receipt.audit_id),
            Err(reason) => {
                self.auditor.record_at(
                    requester,
                    EventCategory::BoundaryViolation,
                    "state.write.rejected",
                    json!({
                        "denied": true,
                        "target": self.state_selector(owner),
                        "detail": reason,
                    }),
                    now,
                );
                Err(SecurityError::StateModificationDenied { owner, reason })
            }
        }
    }

    // ---- audit export ------------------------------------------------------

    /// Read-only audit query for external compliance collaborators.
    pub fn audit_entries(&self, query: &AuditQuery) -> Vec<AuditEntry> {
        self.auditor.query(query)
    }

    /// Verify a single entry's integrity checksum.
    pub fn verify_audit_entry(&self, audit_id: AuditId) -> Option<bool> {
        self.auditor.verify(audit_id)
    }

    /// Matching entries serialized for export.
    pub fn export_audit_json(&self, query: &AuditQuery) -> Value {
        self.auditor.export_json(query)
    }

    /// Reclaim memory held by lapsed windows and abandoned locks.
    pub fn sweep(&self, now: DateTime<Utc>) {
        self.locks.sweep(now);
        self.limiter.purge_idle(now);
    }

    // ---- internals ---------------------------------------------------------

    /// Look the source up and apply the lazy suspension cooldown.
    fn ensure_dispatchable(
        &self,
        component_id: ComponentId,
        now: DateTime<Utc>,
    ) -> Result<ComponentRegistration, SecurityError> {
        let reinstated = {
            let mut registration = self
                .registry
                .get_mut(&component_id)
                .ok_or(SecurityError::UnknownComponent { component_id })?;

            match registration.state {
                ComponentState::Active => return Ok(registration.clone()),
                ComponentState::Suspended => {
                    if !registration.dispatch_eligible(now) {
                        let until = registration.suspended_until.unwrap_or(now);
                        drop(registration);
                        self.auditor.record_at(
                            component_id,
                            EventCategory::BoundaryViolation,
                            "dispatch.suspended",
                            json!({ "denied": true, "detail": "component is suspended" }),
                            now,
                        );
                        return Err(SecurityError::ComponentSuspended { component_id, until });
                    }
                    // Cooldown lapsed: reinstate on this touch.
                    registration.state = ComponentState::Active;
                    registration.suspended_until = None;
                    registration.enhanced_monitoring = false;
                    registration.clone()
                }
                state => {
                    return Err(SecurityError::InvalidTransition {
                        from: state,
                        to: ComponentState::Active,
                    })
                }
            }
        };

        tracing::info!(component = %component_id, "suspension cooldown lapsed, component reinstated");
        self.auditor.record_at(
            component_id,
            EventCategory::Lifecycle,
            "component.reinstated",
            json!({}),
            now,
        );
        Ok(reinstated)
    }

    /// Boundary validation plus the mandatory audit of either outcome, plus
    /// the same-turn correlation response.
    fn validate_and_audit(
        &self,
        op: &OperationRequest,
        now: DateTime<Utc>,
    ) -> Result<(AuditReceipt, BoundaryVerdict), SecurityError> {
        let verdict = self.enforcer.validate_at(op, now);

        let denied = !verdict.allowed;
        let category = if denied {
            EventCategory::BoundaryViolation
        } else if op.mutates_state_of.is_some() {
            EventCategory::StateMutation
        } else {
            EventCategory::AccessAttempt
        };
        let severity = verdict
            .violations
            .iter()
            .map(|v| v.severity)
            .max()
            .map(severity_name);
        let context = json!({
            "denied": denied,
            "target": op.target,
            "target_level": level_name(op.target_level),
            "operation_type": op.operation_type,
            "security_level": level_name(op.source_level),
            "severity": severity,
        });

        let receipt = self.auditor.record_at(
            op.source,
            category,
            &format!("{}:{}", op.operation_type, op.target),
            context,
            now,
        );
        self.apply_correlation_response(op.source, &receipt.correlation, now);

        if denied {
            // to_error is always Some on a denied verdict.
            let error = verdict
                .to_error(op)
                .unwrap_or(SecurityError::AccessDenied {
                    source_level: op.source_level,
                    target_level: op.target_level,
                    risk: op.risk,
                });
            return Err(error);
        }
        Ok((receipt, verdict))
    }

    /// Escalating response: monitoring at 0.5, notice above 0.7, suspension
    /// at 0.9. Never fails the triggering operation.
    fn apply_correlation_response(
        &self,
        component_id: ComponentId,
        report: &CorrelationReport,
        now: DateTime<Utc>,
    ) {
        if report.needs_suspension() {
            let reason = format!("correlated threat level {:.2}", report.threat_level);
            if let Err(e) = self.suspend_at(component_id, now, &reason) {
                tracing::debug!(component = %component_id, error = %e, "suspension skipped");
            }
        } else if report.needs_escalation() {
            self.auditor.record_at(
                component_id,
                EventCategory::Escalation,
                "threat.escalation",
                json!({ "detail": format!("threat level {:.2}", report.threat_level) }),
                now,
            );
        } else if report.needs_enhanced_monitoring() {
            if let Some(mut registration) = self.registry.get_mut(&component_id) {
                if !registration.enhanced_monitoring {
                    registration.enhanced_monitoring = true;
                    tracing::warn!(component = %component_id, "enhanced monitoring enabled");
                }
            }
        }
    }

    fn state_selector(&self, owner: ComponentId) -> String {
        format!("{}state-{}", self.config.namespace.reserved_prefix, owner)
    }
}

fn level_name(level: SecurityLevel) -> &'static str {
    match level {
        SecurityLevel::Public => "PUBLIC",
        SecurityLevel::Internal => "INTERNAL",
        SecurityLevel::Restricted => "RESTRICTED",
        SecurityLevel::Confidential => "CONFIDENTIAL",
    }
}

fn severity_name(severity: crate::domain::violation::Severity) -> &'static str {
    use crate::domain::violation::Severity::*;
    match severity {
        Low => "low",
        Medium => "medium",
        High => "high",
        Critical => "critical",
    }
}
