// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the job manager

use thiserror::Error;

/// Errors returned by `JobManager` calls
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ManagerError {
    #[error("job {current} is already registered, cannot register {requested}")]
    AlreadyRegistered { current: String, requested: String },
    #[error("job manager has shut down")]
    Closed,
}
