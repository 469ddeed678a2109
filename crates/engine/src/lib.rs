// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Tenure election and job supervision runtime

mod elector;
mod error;
mod job;
pub mod lease;
mod manager;

pub use elector::Elector;
pub use error::ManagerError;
pub use job::{Job, JobResult, JobScope};
pub use lease::LeaseClient;
pub use manager::{ActiveRun, JobManager, ReportReceiver, RunOutcome, RunReport, StopOutcome};
