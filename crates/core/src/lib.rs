// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! tenure-core: lease and leadership primitives
//!
//! This crate provides:
//! - Lease rows, fencing tokens and the lease error taxonomy
//! - The leadership status type and an ordered status bus
//! - A pure state machine for the elector's acquire/renew/step-down cycle
//! - Election and job manager configuration
//! - Clock and holder id abstractions for testable time and identity

pub mod clock;
pub mod config;
pub mod election;
pub mod id;
pub mod lease;
pub mod status;

pub use clock::{Clock, FakeClock, SystemClock, TokioClock};
pub use config::{ConfigError, ElectorConfig, JobManagerConfig};
pub use election::{ElectorEffect, ElectorInput, ElectorMachine, ElectorPhase};
pub use id::{IdGen, SequentialIdGen, UuidIdGen};
pub use lease::{FencingToken, HolderId, Lease, LeaseError};
pub use status::{LeadershipStatus, StatusBus, StatusReceiver};
