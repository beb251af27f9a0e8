// Copyright (c) 2026 Bastion Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Timeout-guarded mutual exclusion per mutable-state owner.
//!
//! The shell runs on a cooperative scheduler, so there are no torn writes at
//! the memory level, but interleaved continuations can still produce lost
//! updates. This manager serializes logical mutations: at most one live lock
//! per owner. Expiry is lazy; a lock older than its timeout is reclaimed by
//! the next acquisition attempt, which fails open on deadlock and fails
//! closed for the operation that overheld it.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::domain::component::ComponentId;
use crate::domain::operation::OperationId;
use crate::domain::violation::SecurityError;

#[derive(Debug, Clone, Copy)]
struct StateLock {
    holder: OperationId,
    acquired_at: DateTime<Utc>,
    timeout: Duration,
}

impl StateLock {
    fn expired(&self, now: DateTime<Utc>) -> bool {
        let age = (now - self.acquired_at).to_std().unwrap_or(Duration::ZERO);
        age > self.timeout
    }
}

/// Process-wide lock table, cheap to clone (shared interior).
#[derive(Clone)]
pub struct StateLockManager {
    locks: Arc<DashMap<ComponentId, StateLock>>,
    default_timeout: Duration,
}

impl StateLockManager {
    pub fn new(default_timeout: Duration) -> Self {
        Self {
            locks: Arc::new(DashMap::new()),
            default_timeout,
        }
    }

    /// Attempt to take the owner's lock without waiting.
    pub fn acquire(
        &self,
        owner: ComponentId,
        operation_id: OperationId,
    ) -> Result<LockGuard, SecurityError> {
        self.try_acquire(owner, operation_id, self.default_timeout, Utc::now())
    }

    /// Attempt with a per-acquisition timeout overriding the default.
    pub fn acquire_with_timeout(
        &self,
        owner: ComponentId,
        operation_id: OperationId,
        timeout: Duration,
    ) -> Result<LockGuard, SecurityError> {
        self.try_acquire(owner, operation_id, timeout, Utc::now())
    }

    /// Clock-injected variant of [`StateLockManager::acquire`].
    pub fn acquire_at(
        &self,
        owner: ComponentId,
        operation_id: OperationId,
        now: DateTime<Utc>,
    ) -> Result<LockGuard, SecurityError> {
        self.try_acquire(owner, operation_id, self.default_timeout, now)
    }

    fn try_acquire(
        &self,
        owner: ComponentId,
        operation_id: OperationId,
        timeout: Duration,
        now: DateTime<Utc>,
    ) -> Result<LockGuard, SecurityError> {
        let mut entry = self.locks.entry(owner);
        match entry {
            dashmap::mapref::entry::Entry::Occupied(ref mut occupied) => {
                let existing = *occupied.get();
                if existing.holder != operation_id && !existing.expired(now) {
                    return Err(SecurityError::LockContention { owner });
                }
                if existing.holder != operation_id {
                    tracing::warn!(
                        %owner,
                        stale_holder = %existing.holder,
                        "reclaiming expired state lock"
                    );
                }
                // New acquisition, or a re-entrant touch refreshing the hold.
                occupied.insert(StateLock {
                    holder: operation_id,
                    acquired_at: now,
                    timeout,
                });
                Ok(self.guard(owner, operation_id))
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(StateLock {
                    holder: operation_id,
                    acquired_at: now,
                    timeout,
                });
                Ok(self.guard(owner, operation_id))
            }
        }
    }

    /// Acquire, yielding between attempts, for up to the lock timeout.
    ///
    /// Cooperative waiting only: sleeps between retries rather than
    /// busy-waiting, and gives up with `LockContention` once the deadline
    /// passes.
    pub async fn acquire_wait(
        &self,
        owner: ComponentId,
        operation_id: OperationId,
    ) -> Result<LockGuard, SecurityError> {
        let deadline = tokio::time::Instant::now() + self.default_timeout;
        let mut backoff = Duration::from_millis(5);
        loop {
            match self.acquire(owner, operation_id) {
                Ok(guard) => return Ok(guard),
                Err(_) if tokio::time::Instant::now() < deadline => {
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(Duration::from_millis(100));
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Release the owner's lock if `operation_id` holds it.
    ///
    /// Releasing a lock not held by the caller is a no-op, so double
    /// releases and releases racing a timeout reclaim are harmless.
    pub fn release(&self, owner: ComponentId, operation_id: OperationId) {
        self.locks
            .remove_if(&owner, |_, lock| lock.holder == operation_id);
    }

    /// Whether the owner's lock is currently held (expired locks excluded).
    pub fn is_locked(&self, owner: ComponentId, now: DateTime<Utc>) -> bool {
        self.locks
            .get(&owner)
            .map(|lock| !lock.expired(now))
            .unwrap_or(false)
    }

    /// Drop any lock keyed to the owner (component teardown).
    pub fn purge_owner(&self, owner: ComponentId) {
        self.locks.remove(&owner);
    }

    /// Optional sweep reclaiming memory for abandoned, expired locks.
    pub fn sweep(&self, now: DateTime<Utc>) {
        self.locks.retain(|_, lock| !lock.expired(now));
    }

    fn guard(&self, owner: ComponentId, operation_id: OperationId) -> LockGuard {
        LockGuard {
            manager: self.clone(),
            owner,
            operation_id,
            armed: true,
        }
    }
}

/// RAII handle for a held state lock.
///
/// Dropping the guard releases the lock, so every exit path of a mutation,
/// including `?` returns and panics, gives the lock back.
pub struct LockGuard {
    manager: StateLockManager,
    owner: ComponentId,
    operation_id: OperationId,
    armed: bool,
}

impl LockGuard {
    pub fn owner(&self) -> ComponentId {
        self.owner
    }

    pub fn operation_id(&self) -> OperationId {
        self.operation_id
    }

    /// Explicit early release.
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if self.armed {
            self.armed = false;
            self.manager.release(self.owner, self.operation_id);
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        self.release_inner();
    }
}
