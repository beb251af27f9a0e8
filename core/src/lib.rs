// Copyright (c) 2026 Bastion Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Bastion security orchestration core.
//!
//! Mediates every cross-component interaction inside the Bastion shell:
//! rate limiting, state locking, namespace validation, access control,
//! audit, and attack-pattern correlation, composed behind a single
//! orchestrator façade.
//!
//! # Architecture
//!
//! - **domain** — pure value objects and policy rules
//! - **infrastructure** — stateful engines (limiter, locks, audit, correlator)
//! - **application** — the boundary enforcer and orchestrator glue

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::*;
