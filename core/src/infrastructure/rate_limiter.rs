// Copyright (c) 2026 Bastion Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Sliding-window rate limiter.
//!
//! One true sliding window per `(scope, subject, operation type)` key:
//! a timestamp deque trimmed lazily on each check, so no rolling 60 s span
//! ever admits more than `limit` operations and no background timer is
//! needed. The limiter never blocks or denies on its own authority; it
//! returns a [`RateDecision`] and the boundary enforcer decides.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::VecDeque;
use std::time::Duration;

use crate::domain::config::{RateLimitConfig, RateTier};
use crate::domain::operation::RateScope;

/// Outcome of a single rate check.
#[derive(Debug, Clone, PartialEq)]
pub struct RateDecision {
    pub allowed: bool,
    /// Operations left in the current window after this check.
    pub remaining: u32,
    /// When the oldest in-window operation falls out of the window.
    pub reset_at: DateTime<Utc>,
    /// How long the caller should wait before retrying; `None` when allowed.
    pub retry_after: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct BucketKey {
    scope: RateScope,
    subject: String,
    operation_type: String,
}

/// Process-wide limiter owned by the orchestrator and injected into the
/// boundary enforcer. Buckets are created lazily on first use and trimmed
/// on every check.
pub struct RateLimiter {
    config: RateLimitConfig,
    buckets: DashMap<BucketKey, VecDeque<DateTime<Utc>>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: DashMap::new(),
        }
    }

    /// Check and count one operation against its window.
    pub fn check(&self, scope: RateScope, subject: &str, operation_type: &str) -> RateDecision {
        self.check_at(scope, subject, operation_type, Utc::now())
    }

    /// Clock-injected variant of [`RateLimiter::check`].
    pub fn check_at(
        &self,
        scope: RateScope,
        subject: &str,
        operation_type: &str,
        now: DateTime<Utc>,
    ) -> RateDecision {
        let tier = self.tier_for(scope, operation_type);
        let window = chrono::Duration::from_std(tier.window)
            .unwrap_or_else(|_| chrono::Duration::seconds(60));
        let key = BucketKey {
            scope,
            subject: subject.to_string(),
            operation_type: operation_type.to_string(),
        };

        let mut bucket = self.buckets.entry(key).or_default();
        let horizon = now - window;
        while bucket.front().is_some_and(|t| *t <= horizon) {
            bucket.pop_front();
        }

        if (bucket.len() as u32) < tier.limit {
            bucket.push_back(now);
            let reset_at = bucket
                .front()
                .map(|t| *t + window)
                .unwrap_or(now + window);
            RateDecision {
                allowed: true,
                remaining: tier.limit - bucket.len() as u32,
                reset_at,
                retry_after: None,
            }
        } else {
            // Window full; the denied operation is not counted.
            let oldest = bucket.front().copied().unwrap_or(now);
            let reset_at = oldest + window;
            let retry_after = (reset_at - now).to_std().unwrap_or(Duration::ZERO);
            tracing::debug!(
                ?scope,
                subject,
                operation_type,
                limit = tier.limit,
                "rate window exhausted"
            );
            RateDecision {
                allowed: false,
                remaining: 0,
                reset_at,
                retry_after: Some(retry_after.max(Duration::from_millis(1))),
            }
        }
    }

    /// Drop every bucket keyed to `subject` (component teardown).
    pub fn purge_subject(&self, subject: &str) {
        self.buckets.retain(|key, _| key.subject != subject);
    }

    /// Reclaim memory for buckets whose entire window has lapsed.
    pub fn purge_idle(&self, now: DateTime<Utc>) {
        self.buckets.retain(|key, bucket| {
            let tier = self.tier_for(key.scope, &key.operation_type);
            let window = chrono::Duration::from_std(tier.window)
                .unwrap_or_else(|_| chrono::Duration::seconds(60));
            bucket.back().is_some_and(|t| *t > now - window)
        });
    }

    fn tier_for(&self, scope: RateScope, operation_type: &str) -> RateTier {
        if let Some(tier) = self.config.operation_overrides.get(operation_type) {
            return *tier;
        }
        match scope {
            RateScope::Component => self.config.component,
            RateScope::Global => self.config.global,
            RateScope::StateMutation => self.config.state_mutation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn limiter(limit: u32, window_secs: u64) -> RateLimiter {
        RateLimiter::new(RateLimitConfig {
            component: RateTier::new(limit, Duration::from_secs(window_secs)),
            global: RateTier::new(limit * 5, Duration::from_secs(window_secs)),
            state_mutation: RateTier::new(limit, Duration::from_secs(window_secs)),
            operation_overrides: HashMap::new(),
        })
    }

    #[test]
    fn test_allows_up_to_limit_then_denies() {
        let limiter = limiter(1_000, 60);
        let now = Utc::now();
        for _ in 0..1_000 {
            let d = limiter.check_at(RateScope::Component, "c1", "read", now);
            assert!(d.allowed);
        }
        let denied = limiter.check_at(RateScope::Component, "c1", "read", now);
        assert!(!denied.allowed);
        assert_eq!(denied.remaining, 0);
        assert!(denied.retry_after.unwrap() > Duration::ZERO);
    }

    #[test]
    fn test_rolling_window_boundary_burst() {
        // Half the budget late in one window, half right after: no rolling
        // 60s span may exceed the limit.
        let limiter = limiter(10, 60);
        let start = Utc::now();
        for i in 0..10 {
            let t = start + chrono::Duration::seconds(50 + i / 5);
            assert!(limiter.check_at(RateScope::Component, "c1", "read", t).allowed);
        }
        // 5 seconds later the window still contains all 10.
        let t = start + chrono::Duration::seconds(57);
        assert!(!limiter.check_at(RateScope::Component, "c1", "read", t).allowed);
        // Only once the oldest falls out does capacity return.
        let t = start + chrono::Duration::seconds(111);
        assert!(limiter.check_at(RateScope::Component, "c1", "read", t).allowed);
    }

    #[test]
    fn test_window_resets_lazily() {
        let limiter = limiter(2, 60);
        let now = Utc::now();
        assert!(limiter.check_at(RateScope::Component, "c1", "read", now).allowed);
        assert!(limiter.check_at(RateScope::Component, "c1", "read", now).allowed);
        assert!(!limiter.check_at(RateScope::Component, "c1", "read", now).allowed);

        let later = now + chrono::Duration::seconds(61);
        let d = limiter.check_at(RateScope::Component, "c1", "read", later);
        assert!(d.allowed);
        assert_eq!(d.remaining, 1);
    }

    #[test]
    fn test_keys_are_independent() {
        let limiter = limiter(1, 60);
        let now = Utc::now();
        assert!(limiter.check_at(RateScope::Component, "c1", "read", now).allowed);
        // Different subject and different operation type both get fresh windows.
        assert!(limiter.check_at(RateScope::Component, "c2", "read", now).allowed);
        assert!(limiter.check_at(RateScope::Component, "c1", "write", now).allowed);
        assert!(!limiter.check_at(RateScope::Component, "c1", "read", now).allowed);
    }

    #[test]
    fn test_operation_override_takes_precedence() {
        let mut overrides = HashMap::new();
        overrides.insert("bulk-export".to_string(), RateTier::new(1, Duration::from_secs(60)));
        let limiter = RateLimiter::new(RateLimitConfig {
            operation_overrides: overrides,
            ..RateLimitConfig::default()
        });
        let now = Utc::now();
        assert!(limiter
            .check_at(RateScope::Component, "c1", "bulk-export", now)
            .allowed);
        assert!(!limiter
            .check_at(RateScope::Component, "c1", "bulk-export", now)
            .allowed);
    }

    #[test]
    fn test_denied_attempt_is_not_counted() {
        let limiter = limiter(1, 60);
        let now = Utc::now();
        assert!(limiter.check_at(RateScope::Component, "c1", "read", now).allowed);
        let denied = limiter.check_at(RateScope::Component, "c1", "read", now);
        assert!(!denied.allowed);
        // The single counted op expires after the window; the denied one
        // must not have extended it.
        let later = now + chrono::Duration::seconds(61);
        assert!(limiter.check_at(RateScope::Component, "c1", "read", later).allowed);
    }

    #[test]
    fn test_purge_subject_clears_budget() {
        let limiter = limiter(1, 60);
        let now = Utc::now();
        assert!(limiter.check_at(RateScope::Component, "c1", "read", now).allowed);
        limiter.purge_subject("c1");
        assert!(limiter.check_at(RateScope::Component, "c1", "read", now).allowed);
    }
}
