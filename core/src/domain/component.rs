// Copyright (c) 2026 Bastion Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Component registration and lifecycle value objects.
//!
//! Every component loaded into the shell is registered with the orchestrator
//! under a [`ComponentId`] and assigned a [`SecurityLevel`]. The per-component
//! lifecycle is a small state machine; transitions outside it are rejected.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Component identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ComponentId(pub Uuid);

impl ComponentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for ComponentId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ComponentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Security classification assigned to a component at registration.
///
/// Levels are totally ordered; a higher level carries strictly more
/// privilege. The ordering is what makes the access matrix monotonic.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SecurityLevel {
    Public,
    Internal,
    Restricted,
    Confidential,
}

impl SecurityLevel {
    /// Numeric privilege rank, 0 (least) to 3 (most).
    pub fn rank(self) -> u8 {
        match self {
            SecurityLevel::Public => 0,
            SecurityLevel::Internal => 1,
            SecurityLevel::Restricted => 2,
            SecurityLevel::Confidential => 3,
        }
    }

    pub const ALL: [SecurityLevel; 4] = [
        SecurityLevel::Public,
        SecurityLevel::Internal,
        SecurityLevel::Restricted,
        SecurityLevel::Confidential,
    ];
}

/// Per-component lifecycle status (enum value object)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentState {
    Registered,
    Active,
    Suspended,
    Unregistered,
}

impl ComponentState {
    /// Whether moving to `next` is a legal lifecycle transition.
    ///
    /// `Unregistered` is terminal. `Suspended` is reachable only from
    /// `Active`; a suspended component returns to `Active` after its
    /// cooldown or is torn down.
    pub fn can_transition_to(self, next: ComponentState) -> bool {
        use ComponentState::*;
        matches!(
            (self, next),
            (Registered, Active)
                | (Active, Suspended)
                | (Suspended, Active)
                | (Registered, Unregistered)
                | (Active, Unregistered)
                | (Suspended, Unregistered)
        )
    }

    pub fn is_terminal(self) -> bool {
        self == ComponentState::Unregistered
    }
}

/// Registration record owned by the orchestrator.
///
/// Created on `register`, destroyed on teardown. The id is never reused
/// while any lock, rate bucket, or correlation timeline still references it
/// (v4 ids make collisions a non-concern; teardown purges keyed state).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentRegistration {
    pub id: ComponentId,
    pub component_type: String,
    pub security_level: SecurityLevel,
    pub state: ComponentState,
    pub created_at: DateTime<Utc>,
    /// Set while the component is suspended; dispatch eligibility returns
    /// lazily once this instant passes.
    pub suspended_until: Option<DateTime<Utc>>,
    /// Raised when correlation puts the component in the enhanced-monitoring
    /// band; cleared on reinstatement.
    #[serde(default)]
    pub enhanced_monitoring: bool,
}

impl ComponentRegistration {
    pub fn new(component_type: &str, security_level: SecurityLevel, now: DateTime<Utc>) -> Self {
        Self {
            id: ComponentId::new(),
            component_type: component_type.to_string(),
            security_level,
            state: ComponentState::Registered,
            created_at: now,
            suspended_until: None,
            enhanced_monitoring: false,
        }
    }

    /// Whether the component may participate in dispatch at `now`.
    ///
    /// A suspended component whose cooldown has elapsed counts as eligible;
    /// the orchestrator flips its state back to `Active` on the next touch.
    pub fn dispatch_eligible(&self, now: DateTime<Utc>) -> bool {
        match self.state {
            ComponentState::Active => true,
            ComponentState::Suspended => {
                self.suspended_until.map(|until| now >= until).unwrap_or(false)
            }
            ComponentState::Registered | ComponentState::Unregistered => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_security_level_ordering() {
        assert!(SecurityLevel::Public < SecurityLevel::Internal);
        assert!(SecurityLevel::Internal < SecurityLevel::Restricted);
        assert!(SecurityLevel::Restricted < SecurityLevel::Confidential);
        assert_eq!(SecurityLevel::Confidential.rank(), 3);
    }

    #[test]
    fn test_lifecycle_transitions() {
        use ComponentState::*;
        assert!(Registered.can_transition_to(Active));
        assert!(Active.can_transition_to(Suspended));
        assert!(Suspended.can_transition_to(Active));
        assert!(Suspended.can_transition_to(Unregistered));

        // Suspension only from Active
        assert!(!Registered.can_transition_to(Suspended));
        // Unregistered is terminal
        assert!(!Unregistered.can_transition_to(Active));
        assert!(!Unregistered.can_transition_to(Registered));
    }

    #[test]
    fn test_suspension_cooldown_eligibility() {
        let now = Utc::now();
        let mut reg = ComponentRegistration::new("data-table", SecurityLevel::Internal, now);
        reg.state = ComponentState::Active;
        assert!(reg.dispatch_eligible(now));

        reg.state = ComponentState::Suspended;
        reg.suspended_until = Some(now + chrono::Duration::seconds(300));
        assert!(!reg.dispatch_eligible(now));
        assert!(reg.dispatch_eligible(now + chrono::Duration::seconds(301)));
    }
}
