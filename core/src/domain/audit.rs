// Copyright (c) 2026 Bastion Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Audit entry value objects.
//!
//! Entries are immutable once created. The integrity checksum is a SHA-256
//! digest over the entry's own fields, computed last; it makes after-the-fact
//! tampering detectable, it is not cryptographic non-repudiation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::domain::component::ComponentId;

/// Audit entry identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AuditId(pub Uuid);

impl AuditId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AuditId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AuditId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Coarse classification of audited events; correlation signatures key on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    AccessAttempt,
    StateMutation,
    Lifecycle,
    PermissionChange,
    BoundaryViolation,
    Escalation,
}

/// Immutable, tamper-evident audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub audit_id: AuditId,
    pub timestamp: DateTime<Utc>,
    pub component_id: ComponentId,
    pub category: EventCategory,
    pub event: String,
    /// Normalized 0.0–1.0 risk estimate for this single event.
    pub risk_score: f64,
    pub correlation_ids: Vec<AuditId>,
    /// Sanitized context captured with the event. Unknown or malformed
    /// fields are omitted at record time, never a reason to fail.
    pub context: Value,
    /// SHA-256 over the other fields, hex-encoded. Computed last.
    pub integrity_checksum: String,
}

impl AuditEntry {
    /// Assemble an entry and seal it with its checksum.
    pub fn seal(
        component_id: ComponentId,
        category: EventCategory,
        event: &str,
        risk_score: f64,
        correlation_ids: Vec<AuditId>,
        context: Value,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let mut entry = Self {
            audit_id: AuditId::new(),
            timestamp,
            component_id,
            category,
            event: event.to_string(),
            risk_score: risk_score.clamp(0.0, 1.0),
            correlation_ids,
            context,
            integrity_checksum: String::new(),
        };
        entry.integrity_checksum = entry.compute_checksum();
        entry
    }

    /// Recompute the digest and compare against the stored checksum.
    pub fn verify_integrity(&self) -> bool {
        self.compute_checksum() == self.integrity_checksum
    }

    fn compute_checksum(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.audit_id.0.as_bytes());
        hasher.update(self.timestamp.to_rfc3339().as_bytes());
        hasher.update(self.component_id.0.as_bytes());
        // Category and event as stable strings.
        hasher.update(format!("{:?}", self.category).as_bytes());
        hasher.update(self.event.as_bytes());
        hasher.update(self.risk_score.to_bits().to_be_bytes());
        for id in &self.correlation_ids {
            hasher.update(id.0.as_bytes());
        }
        hasher.update(self.context.to_string().as_bytes());
        hex::encode(hasher.finalize())
    }
}
