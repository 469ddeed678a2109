// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The unit of work a job manager supervises

use async_trait::async_trait;
use tenure_core::FencingToken;
use tokio_util::sync::CancellationToken;

/// How a job run ended, as reported by the job itself
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JobResult {
    Success,
    Failed(String),
    Cancelled,
}

impl std::fmt::Display for JobResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobResult::Success => write!(f, "success"),
            JobResult::Failed(reason) => write!(f, "failed: {}", reason),
            JobResult::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Context handed to one run of a job
///
/// Cancellation is cooperative: the job is expected to watch
/// [`JobScope::cancelled`] and return promptly once it fires. Side effects
/// sent to external systems should carry [`JobScope::fencing_token`] so
/// those systems can reject work from a deposed leader.
#[derive(Clone, Debug)]
pub struct JobScope {
    job: String,
    token: FencingToken,
    cancel: CancellationToken,
}

impl JobScope {
    pub fn new(job: impl Into<String>, token: FencingToken, cancel: CancellationToken) -> Self {
        Self {
            job: job.into(),
            token,
            cancel,
        }
    }

    pub fn job(&self) -> &str {
        &self.job
    }

    /// Token of the leadership term this run belongs to
    pub fn fencing_token(&self) -> FencingToken {
        self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the manager asks the run to stop
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

/// A long-lived task that must run on at most one process at a time
#[async_trait]
pub trait Job: Send + Sync + 'static {
    /// Logical job name, unique across the fleet
    fn name(&self) -> &str;

    async fn run(&self, scope: JobScope) -> JobResult;
}
