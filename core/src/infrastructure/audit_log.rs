// Copyright (c) 2026 Bastion Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Security auditor: structured, tamper-evident event recording.
//!
//! Every boundary decision, allowed or denied, lands here exactly once. The
//! auditor scores each event with a weighted risk model, seals the entry with
//! its integrity checksum, appends it to the in-memory store, and feeds the
//! event correlator synchronously (same turn, no I/O).
//!
//! Recording must never fail an otherwise-valid operation: malformed context
//! degrades to field omission, and scoring never panics.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use crate::domain::audit::{AuditEntry, AuditId, EventCategory};
use crate::domain::component::ComponentId;
use crate::infrastructure::correlator::{CorrelationReport, EventCorrelator};

/// Fixed factor weights; heuristic defaults, monotonic in failure signals.
/// The five weights sum to 1.0.
pub const RISK_WEIGHTS: RiskWeights = RiskWeights {
    event_type: 0.30,
    component: 0.20,
    context: 0.25,
    historical: 0.15,
    environmental: 0.10,
};

#[derive(Debug, Clone, Copy)]
pub struct RiskWeights {
    pub event_type: f64,
    pub component: f64,
    pub context: f64,
    pub historical: f64,
    pub environmental: f64,
}

/// Context fields the auditor keeps; everything else is omitted.
const ALLOWED_CONTEXT_KEYS: [&str; 8] = [
    "denied",
    "severity",
    "target",
    "target_level",
    "operation_type",
    "security_level",
    "enumeration_risk",
    "detail",
];

/// How many recent entries feed the historical and environmental factors.
const HISTORY_DEPTH: usize = 50;
const ENVIRONMENT_DEPTH: usize = 100;

/// Receipt returned by [`SecurityAuditor::record`].
#[derive(Debug, Clone)]
pub struct AuditReceipt {
    pub audit_id: AuditId,
    pub risk_score: f64,
    pub correlation: CorrelationReport,
}

/// Read-only query filter for the audit export interface.
#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub component_id: Option<ComponentId>,
    pub category: Option<EventCategory>,
}

impl AuditQuery {
    fn matches(&self, entry: &AuditEntry) -> bool {
        self.from.is_none_or(|t| entry.timestamp >= t)
            && self.to.is_none_or(|t| entry.timestamp <= t)
            && self.component_id.is_none_or(|c| entry.component_id == c)
            && self.category.is_none_or(|c| entry.category == c)
    }
}

/// Append-only audit store plus the risk-scoring pipeline.
pub struct SecurityAuditor {
    entries: RwLock<Vec<AuditEntry>>,
    correlator: Arc<EventCorrelator>,
    retention: Duration,
}

impl SecurityAuditor {
    pub fn new(correlator: Arc<EventCorrelator>, retention: Duration) -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            correlator,
            retention,
        }
    }

    /// Record one event and run correlation on it within the same turn.
    pub fn record(
        &self,
        component_id: ComponentId,
        category: EventCategory,
        event: &str,
        context: Value,
    ) -> AuditReceipt {
        self.record_at(component_id, category, event, context, Utc::now())
    }

    /// Clock-injected variant of [`SecurityAuditor::record`].
    pub fn record_at(
        &self,
        component_id: ComponentId,
        category: EventCategory,
        event: &str,
        context: Value,
        now: DateTime<Utc>,
    ) -> AuditReceipt {
        let context = sanitize_context(context);
        let risk_score = self.score(component_id, category, &context);

        let entry = AuditEntry::seal(
            component_id,
            category,
            event,
            risk_score,
            Vec::new(),
            context,
            now,
        );

        {
            let mut entries = self.entries.write();
            entries.push(entry.clone());
            // Retention pruning piggybacks on the append path.
            if let Ok(retention) = chrono::Duration::from_std(self.retention) {
                let horizon = now - retention;
                if entries.first().is_some_and(|e| e.timestamp < horizon) {
                    entries.retain(|e| e.timestamp >= horizon);
                }
            }
        }

        metrics::counter!("audit_entries_total").increment(1);
        tracing::debug!(
            audit_id = %entry.audit_id,
            component = %component_id,
            ?category,
            event,
            risk_score,
            "audit entry recorded"
        );

        let correlation = self.correlator.analyze_at(&entry, now);
        AuditReceipt {
            audit_id: entry.audit_id,
            risk_score,
            correlation,
        }
    }

    /// Query entries for export; filters compose conjunctively.
    pub fn query(&self, query: &AuditQuery) -> Vec<AuditEntry> {
        self.entries
            .read()
            .iter()
            .filter(|e| query.matches(e))
            .cloned()
            .collect()
    }

    /// Verify a single entry's integrity checksum; `None` if unknown id.
    pub fn verify(&self, audit_id: AuditId) -> Option<bool> {
        self.entries
            .read()
            .iter()
            .find(|e| e.audit_id == audit_id)
            .map(AuditEntry::verify_integrity)
    }

    /// Serialize matching entries for external compliance collaborators.
    pub fn export_json(&self, query: &AuditQuery) -> Value {
        json!(self.query(query))
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Weighted risk score over five normalized factors.
    fn score(&self, component_id: ComponentId, category: EventCategory, context: &Value) -> f64 {
        let event_type = event_type_risk(category);
        let component = component_risk(context);
        let ctx = context_risk(context);
        let (historical, environmental) = self.history_risk(component_id);

        let score = event_type * RISK_WEIGHTS.event_type
            + component * RISK_WEIGHTS.component
            + ctx * RISK_WEIGHTS.context
            + historical * RISK_WEIGHTS.historical
            + environmental * RISK_WEIGHTS.environmental;
        score.clamp(0.0, 1.0)
    }

    /// Historical factor: the component's recent denial ratio.
    /// Environmental factor: the whole shell's recent violation ratio.
    fn history_risk(&self, component_id: ComponentId) -> (f64, f64) {
        let entries = self.entries.read();

        let component_recent: Vec<&AuditEntry> = entries
            .iter()
            .rev()
            .filter(|e| e.component_id == component_id)
            .take(HISTORY_DEPTH)
            .collect();
        let historical = ratio(
            component_recent
                .iter()
                .filter(|e| is_denial(e))
                .count(),
            component_recent.len(),
        );

        let global_recent: Vec<&AuditEntry> =
            entries.iter().rev().take(ENVIRONMENT_DEPTH).collect();
        let environmental = ratio(
            global_recent.iter().filter(|e| is_denial(e)).count(),
            global_recent.len(),
        );

        (historical, environmental)
    }
}

fn is_denial(entry: &AuditEntry) -> bool {
    entry.category == EventCategory::BoundaryViolation
        || entry
            .context
            .get("denied")
            .and_then(Value::as_bool)
            .unwrap_or(false)
}

fn ratio(hits: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        hits as f64 / total as f64
    }
}

fn event_type_risk(category: EventCategory) -> f64 {
    match category {
        EventCategory::Lifecycle => 0.2,
        EventCategory::AccessAttempt => 0.3,
        EventCategory::StateMutation => 0.5,
        EventCategory::PermissionChange => 0.7,
        EventCategory::BoundaryViolation => 0.9,
        EventCategory::Escalation => 1.0,
    }
}

/// Component factor: more privileged sources carry more blast radius.
fn component_risk(context: &Value) -> f64 {
    match context.get("security_level").and_then(Value::as_str) {
        Some("PUBLIC") => 0.1,
        Some("INTERNAL") => 0.4,
        Some("RESTRICTED") => 0.7,
        Some("CONFIDENTIAL") => 1.0,
        _ => 0.3,
    }
}

fn context_risk(context: &Value) -> f64 {
    let mut risk: f64 = 0.0;
    if context
        .get("denied")
        .and_then(Value::as_bool)
        .unwrap_or(false)
    {
        risk += 0.6;
    }
    risk += match context.get("severity").and_then(Value::as_str) {
        Some("low") => 0.05,
        Some("medium") => 0.15,
        Some("high") => 0.3,
        Some("critical") => 0.4,
        _ => 0.0,
    };
    if let Some(enum_risk) = context.get("enumeration_risk").and_then(Value::as_f64) {
        risk += enum_risk.clamp(0.0, 1.0) * 0.3;
    }
    risk.clamp(0.0, 1.0)
}

/// Keep only known fields of an object context; anything else becomes `{}`.
/// Recording must never fail because a caller handed us garbage.
fn sanitize_context(context: Value) -> Value {
    match context {
        Value::Object(map) => {
            let kept: serde_json::Map<String, Value> = map
                .into_iter()
                .filter(|(k, v)| {
                    ALLOWED_CONTEXT_KEYS.contains(&k.as_str()) && !v.is_object() && !v.is_array()
                })
                .collect();
            Value::Object(kept)
        }
        _ => json!({}),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::config::CorrelationConfig;

    fn auditor() -> SecurityAuditor {
        let correlator = Arc::new(EventCorrelator::new(CorrelationConfig::default()));
        SecurityAuditor::new(correlator, Duration::from_secs(24 * 60 * 60))
    }

    #[test]
    fn test_record_seals_and_verifies() {
        let auditor = auditor();
        let component = ComponentId::new();
        let receipt = auditor.record(
            component,
            EventCategory::AccessAttempt,
            "app-table.read",
            json!({"target": "app-table", "denied": false}),
        );
        assert_eq!(auditor.verify(receipt.audit_id), Some(true));
    }

    #[test]
    fn test_malformed_context_degrades_gracefully() {
        let auditor = auditor();
        let component = ComponentId::new();

        // A non-object context is dropped, not an error.
        let receipt = auditor.record(
            component,
            EventCategory::AccessAttempt,
            "app-table.read",
            json!("not an object"),
        );
        let entry = &auditor.query(&AuditQuery::default())[0];
        assert_eq!(entry.audit_id, receipt.audit_id);
        assert_eq!(entry.context, json!({}));

        // Unknown and nested fields are omitted, known scalars kept.
        auditor.record(
            component,
            EventCategory::AccessAttempt,
            "app-table.read",
            json!({"denied": true, "exfil": {"nested": 1}, "unknown_field": 3}),
        );
        let entries = auditor.query(&AuditQuery::default());
        assert_eq!(entries[1].context, json!({"denied": true}));
    }

    #[test]
    fn test_denials_score_above_allowed_median() {
        let auditor = auditor();
        let component = ComponentId::new();

        let mut allowed_scores = Vec::new();
        for _ in 0..9 {
            let r = auditor.record(
                component,
                EventCategory::AccessAttempt,
                "app-table.read",
                json!({"denied": false, "security_level": "INTERNAL"}),
            );
            allowed_scores.push(r.risk_score);
        }
        let denied = auditor.record(
            component,
            EventCategory::BoundaryViolation,
            "app-table.read",
            json!({"denied": true, "severity": "high", "security_level": "INTERNAL"}),
        );

        allowed_scores.sort_by(|a, b| a.total_cmp(b));
        let median = allowed_scores[allowed_scores.len() / 2];
        assert!(
            denied.risk_score > median,
            "denial {} must exceed allowed median {}",
            denied.risk_score,
            median
        );
    }

    #[test]
    fn test_more_failures_raise_historical_score() {
        let auditor = auditor();
        let component = ComponentId::new();

        let first = auditor.record(
            component,
            EventCategory::BoundaryViolation,
            "app-x.read",
            json!({"denied": true}),
        );
        for _ in 0..10 {
            auditor.record(
                component,
                EventCategory::BoundaryViolation,
                "app-x.read",
                json!({"denied": true}),
            );
        }
        let later = auditor.record(
            component,
            EventCategory::BoundaryViolation,
            "app-x.read",
            json!({"denied": true}),
        );
        assert!(later.risk_score >= first.risk_score);
    }

    #[test]
    fn test_query_filters_compose() {
        let auditor = auditor();
        let c1 = ComponentId::new();
        let c2 = ComponentId::new();
        auditor.record(c1, EventCategory::AccessAttempt, "app-a.read", json!({}));
        auditor.record(c2, EventCategory::Lifecycle, "registered", json!({}));
        auditor.record(c1, EventCategory::Lifecycle, "registered", json!({}));

        let by_component = auditor.query(&AuditQuery {
            component_id: Some(c1),
            ..Default::default()
        });
        assert_eq!(by_component.len(), 2);

        let by_both = auditor.query(&AuditQuery {
            component_id: Some(c1),
            category: Some(EventCategory::Lifecycle),
            ..Default::default()
        });
        assert_eq!(by_both.len(), 1);
    }

    #[test]
    fn test_retention_prunes_old_entries() {
        let correlator = Arc::new(EventCorrelator::new(CorrelationConfig::default()));
        let auditor = SecurityAuditor::new(correlator, Duration::from_secs(60));
        let component = ComponentId::new();
        let start = Utc::now();

        auditor.record_at(
            component,
            EventCategory::AccessAttempt,
            "app-a.read",
            json!({}),
            start,
        );
        assert_eq!(auditor.len(), 1);

        auditor.record_at(
            component,
            EventCategory::AccessAttempt,
            "app-a.read",
            json!({}),
            start + chrono::Duration::seconds(120),
        );
        // The first entry fell out of retention.
        assert_eq!(auditor.len(), 1);
    }
}
