// Copyright (c) 2026 Bastion Contributors
// SPDX-License-Identifier: AGPL-3.0

pub mod rate_limiter;
pub mod lock_manager;
pub mod namespace;
pub mod audit_log;
pub mod correlator;
pub mod event_bus;

pub use audit_log::{AuditQuery, AuditReceipt, SecurityAuditor};
pub use correlator::{CorrelationReport, EscalationNotice, EventCorrelator, ThreatPattern};
pub use event_bus::{ComponentEvent, EventBus, EventBusError, EventSubscription};
pub use lock_manager::{LockGuard, StateLockManager};
pub use namespace::{NamespaceGuardian, TargetAccess};
pub use rate_limiter::{RateDecision, RateLimiter};
