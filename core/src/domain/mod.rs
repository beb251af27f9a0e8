// Copyright (c) 2026 Bastion Contributors
// SPDX-License-Identifier: AGPL-3.0

pub mod component;
pub mod operation;
pub mod policy;
pub mod violation;
pub mod audit;
pub mod config;

pub use component::{ComponentId, ComponentState, SecurityLevel};
pub use operation::{OperationId, OperationRequest, OperationRisk, RateScope};
pub use violation::{SecurityError, SecurityViolation, Severity, ViolationType};
