// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Tenure daemon (tenured)
//!
//! Runs one elector and one job manager supervising a shell command, so the
//! command runs on exactly one host of the fleet at a time.

pub mod command_job;
pub mod lifecycle;

pub use command_job::CommandJob;
pub use lifecycle::{startup, Config, DaemonState, LifecycleError};
