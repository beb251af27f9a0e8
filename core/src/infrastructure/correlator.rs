// Copyright (c) 2026 Bastion Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Event correlator: multi-step attack detection over the audit stream.
//!
//! Consumes audit entries synchronously (same turn, in-memory) and groups
//! them into rolling timelines keyed by a derived signature: the component
//! plus the event's signature group. Detectors run against the in-window
//! slice of a timeline:
//!
//! - **brute force** — many access attempts, mostly failing
//! - **privilege escalation** — a permission change followed by access to a
//!   restricted target
//! - **enumeration** — sequential target probing (guardian heuristic)
//! - **lateral movement** — one source fanning out across many targets
//!
//! The threat level is the maximum detector confidence, clamped to [0, 1].
//! Above 0.7 an escalation notice is published for the orchestrator; the
//! recommended response scales from enhanced monitoring (0.5) to suspension
//! (0.9). Idle timelines are evicted to bound memory.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::domain::audit::{AuditEntry, AuditId, EventCategory};
use crate::domain::component::ComponentId;
use crate::domain::config::{CorrelationConfig, NamespaceConfig};
use crate::infrastructure::namespace::{NamespaceGuardian, TargetAccess};

/// Detection thresholds. Tuned defaults, not contracts; tests assert the
/// documented boundary behavior, not these exact numbers.
const BRUTE_FORCE_MIN_ATTEMPTS: usize = 10;
const BRUTE_FORCE_MIN_FAILURE_RATE: f64 = 0.7;
const BRUTE_FORCE_CONFIDENCE_CAP: f64 = 0.95;
const ENUMERATION_MIN_RISK: f64 = 0.5;
const LATERAL_MIN_BREADTH: usize = 5;
const ESCALATION_NOTIFY_THRESHOLD: f64 = 0.7;

/// Threat level bands the orchestrator responds to.
pub const ENHANCED_MONITORING_THRESHOLD: f64 = 0.5;
pub const SUSPENSION_THRESHOLD: f64 = 0.9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreatPattern {
    BruteForce,
    PrivilegeEscalation,
    Enumeration,
    LateralMovement,
}

/// One detector hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectedPattern {
    pub pattern: ThreatPattern,
    pub confidence: f64,
    pub description: String,
}

/// Result of analyzing one audit entry.
#[derive(Debug, Clone, Default)]
pub struct CorrelationReport {
    pub correlated_events: Vec<AuditId>,
    pub detected_patterns: Vec<DetectedPattern>,
    pub threat_level: f64,
}

impl CorrelationReport {
    pub fn needs_escalation(&self) -> bool {
        self.threat_level > ESCALATION_NOTIFY_THRESHOLD
    }

    pub fn needs_suspension(&self) -> bool {
        self.threat_level >= SUSPENSION_THRESHOLD
    }

    pub fn needs_enhanced_monitoring(&self) -> bool {
        self.threat_level >= ENHANCED_MONITORING_THRESHOLD
    }
}

/// Asynchronous suspension notice delivered to the orchestrator and any
/// external observers. Not an error: the triggering operation already
/// completed or was denied on its own merits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationNotice {
    pub component_id: ComponentId,
    pub threat_level: f64,
    pub patterns: Vec<DetectedPattern>,
    pub at: DateTime<Utc>,
}

/// Signature groups: categories that correlate with each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum SignatureGroup {
    /// Access attempts and the violations they produce.
    Access,
    Permission,
    Lifecycle,
    Escalation,
}

fn group_of(category: EventCategory) -> SignatureGroup {
    match category {
        EventCategory::AccessAttempt
        | EventCategory::StateMutation
        | EventCategory::BoundaryViolation => SignatureGroup::Access,
        EventCategory::PermissionChange => SignatureGroup::Permission,
        EventCategory::Lifecycle => SignatureGroup::Lifecycle,
        EventCategory::Escalation => SignatureGroup::Escalation,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SignatureKey {
    component_id: ComponentId,
    group: SignatureGroup,
}

#[derive(Debug, Clone)]
struct TimelineEvent {
    audit_id: AuditId,
    at: DateTime<Utc>,
    denied: bool,
    target: Option<String>,
}

/// Rolling accumulation of correlated events for one signature.
#[derive(Debug, Default)]
struct Timeline {
    events: VecDeque<TimelineEvent>,
    current_threat_level: f64,
    last_activity: Option<DateTime<Utc>>,
}

/// In-memory correlation engine. Owned by the orchestrator, shared with the
/// auditor; all state lives in per-signature timelines.
pub struct EventCorrelator {
    config: CorrelationConfig,
    guardian: Arc<NamespaceGuardian>,
    timelines: DashMap<SignatureKey, Timeline>,
    escalations: broadcast::Sender<EscalationNotice>,
}

impl EventCorrelator {
    pub fn new(config: CorrelationConfig) -> Self {
        Self::with_guardian(
            config,
            Arc::new(NamespaceGuardian::new(NamespaceConfig::default())),
        )
    }

    pub fn with_guardian(config: CorrelationConfig, guardian: Arc<NamespaceGuardian>) -> Self {
        let (escalations, _) = broadcast::channel(256);
        Self {
            config,
            guardian,
            timelines: DashMap::new(),
            escalations,
        }
    }

    /// Subscribe to escalation notices (threat level above 0.7).
    pub fn subscribe_escalations(&self) -> broadcast::Receiver<EscalationNotice> {
        self.escalations.subscribe()
    }

    /// Analyze a freshly recorded audit entry.
    pub fn analyze(&self, entry: &AuditEntry) -> CorrelationReport {
        self.analyze_at(entry, Utc::now())
    }

    /// Clock-injected variant of [`EventCorrelator::analyze`].
    pub fn analyze_at(&self, entry: &AuditEntry, now: DateTime<Utc>) -> CorrelationReport {
        self.evict_idle(now);

        let key = SignatureKey {
            component_id: entry.component_id,
            group: group_of(entry.category),
        };
        let window = chrono::Duration::from_std(self.config.window)
            .unwrap_or_else(|_| chrono::Duration::seconds(300));

        // Update the signature timeline, then release its shard before any
        // other timeline is touched (the escalation detector reads the
        // permission timeline of the same component).
        let (correlated_events, mut patterns) = {
            let mut timeline = self.timelines.entry(key.clone()).or_default();
            timeline.events.push_back(timeline_event(entry));
            timeline.last_activity = Some(now);
            let horizon = now - window;
            while timeline.events.front().is_some_and(|e| e.at < horizon) {
                timeline.events.pop_front();
            }

            let mut patterns = Vec::new();
            if key.group == SignatureGroup::Access {
                if let Some(p) = self.detect_brute_force(&timeline.events) {
                    patterns.push(p);
                }
                if let Some(p) = self.detect_enumeration(&timeline.events) {
                    patterns.push(p);
                }
                if let Some(p) = self.detect_lateral_movement(&timeline.events) {
                    patterns.push(p);
                }
            }
            let ids: Vec<AuditId> = timeline.events.iter().map(|e| e.audit_id).collect();
            (ids, patterns)
        };

        if key.group == SignatureGroup::Access {
            if let Some(p) =
                self.detect_privilege_escalation(entry.component_id, entry, now, window)
            {
                patterns.push(p);
            }
        }

        let threat_level = patterns
            .iter()
            .map(|p| p.confidence)
            .fold(0.0_f64, f64::max)
            .clamp(0.0, 1.0);
        // Timelines remember the worst they have seen.
        if let Some(mut timeline) = self.timelines.get_mut(&key) {
            timeline.current_threat_level = timeline.current_threat_level.max(threat_level);
        }

        let report = CorrelationReport {
            correlated_events,
            detected_patterns: patterns,
            threat_level,
        };

        if report.needs_escalation() {
            metrics::counter!("correlation_escalations_total").increment(1);
            tracing::warn!(
                component = %entry.component_id,
                threat_level = report.threat_level,
                patterns = ?report
                    .detected_patterns
                    .iter()
                    .map(|p| p.pattern)
                    .collect::<Vec<_>>(),
                "threat escalation"
            );
            let _ = self.escalations.send(EscalationNotice {
                component_id: entry.component_id,
                threat_level: report.threat_level,
                patterns: report.detected_patterns.clone(),
                at: now,
            });
        }

        report
    }

    /// Drop every timeline keyed to the component (teardown).
    pub fn purge_component(&self, component_id: ComponentId) {
        self.timelines
            .retain(|key, _| key.component_id != component_id);
    }

    /// The highest threat level a component's timelines have reached.
    pub fn threat_level(&self, component_id: ComponentId) -> f64 {
        self.timelines
            .iter()
            .filter(|item| item.key().component_id == component_id)
            .map(|item| item.current_threat_level)
            .fold(0.0_f64, f64::max)
    }

    fn evict_idle(&self, now: DateTime<Utc>) {
        let idle = chrono::Duration::from_std(self.config.idle_eviction)
            .unwrap_or_else(|_| chrono::Duration::seconds(900));
        self.timelines.retain(|_, timeline| {
            timeline
                .last_activity
                .is_some_and(|at| at > now - idle)
        });
    }

    /// ≥10 attempts with ≥70% failure rate; confidence grows with volume
    /// and failure rate, capped at 0.95.
    fn detect_brute_force(&self, events: &VecDeque<TimelineEvent>) -> Option<DetectedPattern> {
        let attempts = events.len();
        if attempts < BRUTE_FORCE_MIN_ATTEMPTS {
            return None;
        }
        let failures = events.iter().filter(|e| e.denied).count();
        let failure_rate = failures as f64 / attempts as f64;
        if failure_rate < BRUTE_FORCE_MIN_FAILURE_RATE {
            return None;
        }
        let volume = attempts as f64 / BRUTE_FORCE_MIN_ATTEMPTS as f64;
        let confidence = (volume * 0.5 + failure_rate * 0.5).min(BRUTE_FORCE_CONFIDENCE_CAP);
        Some(DetectedPattern {
            pattern: ThreatPattern::BruteForce,
            confidence,
            description: format!(
                "{attempts} access attempts with {:.0}% failure rate in window",
                failure_rate * 100.0
            ),
        })
    }

    fn detect_enumeration(&self, events: &VecDeque<TimelineEvent>) -> Option<DetectedPattern> {
        let accesses: Vec<TargetAccess> = events
            .iter()
            .filter_map(|e| {
                e.target.as_ref().map(|t| TargetAccess {
                    selector: t.clone(),
                    at: e.at,
                })
            })
            .collect();
        if accesses.len() < 3 {
            return None;
        }
        let risk = self.guardian.enumeration_risk(&accesses);
        if risk < ENUMERATION_MIN_RISK {
            return None;
        }
        Some(DetectedPattern {
            pattern: ThreatPattern::Enumeration,
            confidence: risk.clamp(0.0, 1.0),
            description: format!(
                "target probing across {} accesses scored {risk:.2}",
                accesses.len()
            ),
        })
    }

    fn detect_lateral_movement(&self, events: &VecDeque<TimelineEvent>) -> Option<DetectedPattern> {
        let mut targets: Vec<&str> = events
            .iter()
            .filter_map(|e| e.target.as_deref())
            .collect();
        targets.sort_unstable();
        targets.dedup();
        let breadth = targets.len();
        if breadth <= LATERAL_MIN_BREADTH {
            return None;
        }
        let confidence = (0.3 + 0.1 * breadth as f64).min(0.9);
        Some(DetectedPattern {
            pattern: ThreatPattern::LateralMovement,
            confidence,
            description: format!("access spread across {breadth} distinct targets in window"),
        })
    }

    /// A permission change immediately followed by restricted-target access.
    fn detect_privilege_escalation(
        &self,
        component_id: ComponentId,
        entry: &AuditEntry,
        now: DateTime<Utc>,
        window: chrono::Duration,
    ) -> Option<DetectedPattern> {
        let target_level = entry.context.get("target_level").and_then(Value::as_str)?;
        if target_level != "RESTRICTED" && target_level != "CONFIDENTIAL" {
            return None;
        }
        let permission_key = SignatureKey {
            component_id,
            group: SignatureGroup::Permission,
        };
        let timeline = self.timelines.get(&permission_key)?;
        let horizon = now - window;
        let recent_change = timeline.events.iter().rev().find(|e| e.at >= horizon)?;
        Some(DetectedPattern {
            pattern: ThreatPattern::PrivilegeEscalation,
            confidence: 0.85,
            description: format!(
                "permission change at {} followed by {target_level} target access",
                recent_change.at
            ),
        })
    }
}

fn timeline_event(entry: &AuditEntry) -> TimelineEvent {
    TimelineEvent {
        audit_id: entry.audit_id,
        at: entry.timestamp,
        denied: entry.category == EventCategory::BoundaryViolation
            || entry
                .context
                .get("denied")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        target: entry
            .context
            .get("target")
            .and_then(Value::as_str)
            .map(str::to_string),
    }
}
