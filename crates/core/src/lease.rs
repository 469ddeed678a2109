// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lease rows and fencing tokens
//!
//! A lease is exclusive, time-bounded ownership of a named resource. The
//! row schema (`resource`, `holder`, `expires_at`, `token`) is shared by
//! every process that talks to the same store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Unique identifier for a lease holder
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HolderId(pub String);

impl HolderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for HolderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonic counter bumped on every successful acquisition
///
/// Work produced under a token lower than the lease's current token was
/// produced by a deposed holder.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct FencingToken(pub u64);

impl FencingToken {
    /// Token of the first acquisition of a resource
    pub const FIRST: FencingToken = FencingToken(1);

    pub fn value(self) -> u64 {
        self.0
    }

    /// The token a takeover of this term receives
    pub fn next(self) -> FencingToken {
        FencingToken(self.0.saturating_add(1))
    }
}

impl std::fmt::Display for FencingToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Exclusive, time-bounded ownership of a named resource
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    pub resource: String,
    pub holder: HolderId,
    pub expires_at: DateTime<Utc>,
    pub token: FencingToken,
}

impl Lease {
    /// An expired lease is logically absent; anyone may claim it
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    pub fn is_held_by(&self, holder: &HolderId) -> bool {
        &self.holder == holder
    }

    /// Time left before expiry, zero once expired
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at - now).to_std().unwrap_or(Duration::ZERO)
    }
}

/// Outcomes of the lease protocol other than success
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum LeaseError {
    /// Another holder's lease is still live; keep retrying acquisition
    #[error("lease is held by {holder}")]
    Contended { holder: HolderId },
    /// The stored row no longer matches our holder and token
    #[error("lease lost: taken over or expired")]
    LeaseLost,
    /// The store could not answer within the call timeout
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
}

impl LeaseError {
    /// Errors worth retrying against the same term
    pub fn is_transient(&self) -> bool {
        matches!(self, LeaseError::StoreUnavailable(_))
    }
}

#[cfg(test)]
#[path = "lease_tests.rs"]
mod tests;
