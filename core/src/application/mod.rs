// Copyright (c) 2026 Bastion Contributors
// SPDX-License-Identifier: AGPL-3.0

pub mod boundary;
pub mod guarded_state;
pub mod orchestrator;

pub use boundary::{BoundaryEnforcer, BoundaryVerdict};
pub use guarded_state::GuardedStateStore;
pub use orchestrator::SecurityOrchestrator;
