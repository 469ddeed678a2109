// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Election and job manager configuration
//!
//! Durations are written in humantime form (`"10s"`, `"500ms"`) when loaded
//! from TOML.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Default lease time-to-live
pub const DEFAULT_TTL: Duration = Duration::from_secs(15);

/// Upper bound for a single store round-trip
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(2);

/// Errors from validating timing configuration
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("resource name must not be empty")]
    EmptyResource,
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },
    #[error(
        "renew_interval ({}) must be less than half of ttl ({})",
        humantime::format_duration(*renew),
        humantime::format_duration(*ttl)
    )]
    RenewTooSlow { renew: Duration, ttl: Duration },
    #[error(
        "worst-case step-down after {} is not shorter than ttl ({})",
        humantime::format_duration(*worst),
        humantime::format_duration(*ttl)
    )]
    StepDownTooSlow { worst: Duration, ttl: Duration },
}

/// Timing of the acquire/renew cycle for one contended resource
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ElectorConfig {
    /// Name of the contended resource (usually the job name)
    pub resource: String,
    /// How long an acquired or renewed lease stays valid
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
    /// Delay between acquisition attempts while following
    #[serde(with = "humantime_serde")]
    pub acquire_interval: Duration,
    /// Upper bound of random delay added to each acquisition attempt
    #[serde(with = "humantime_serde")]
    pub acquire_jitter: Duration,
    /// Cap for the acquisition backoff while the store is unavailable
    #[serde(with = "humantime_serde")]
    pub max_backoff: Duration,
    /// Delay between renewals while leading
    #[serde(with = "humantime_serde")]
    pub renew_interval: Duration,
    /// Delay before retrying a renewal the store did not answer
    #[serde(with = "humantime_serde")]
    pub renew_retry_interval: Duration,
    /// Bound on each store round-trip
    #[serde(with = "humantime_serde")]
    pub store_timeout: Duration,
    /// Consecutive unanswered renewals before stepping down
    pub max_renew_misses: u32,
}

impl ElectorConfig {
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            ..Self::default()
        }
    }

    /// Set the ttl and derive every interval from it
    ///
    /// Acquire and renew run every ttl/3, a missed renewal is retried after
    /// ttl/6, and store calls are bounded by ttl/10 (at most 2s).
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self.acquire_interval = ttl / 3;
        self.acquire_jitter = ttl / 10;
        self.max_backoff = ttl * 2;
        self.renew_interval = ttl / 3;
        self.renew_retry_interval = ttl / 6;
        self.store_timeout = DEFAULT_STORE_TIMEOUT.min(ttl / 10);
        self
    }

    pub fn with_acquire_interval(mut self, interval: Duration) -> Self {
        self.acquire_interval = interval;
        self
    }

    pub fn with_acquire_jitter(mut self, jitter: Duration) -> Self {
        self.acquire_jitter = jitter;
        self
    }

    pub fn with_max_backoff(mut self, max_backoff: Duration) -> Self {
        self.max_backoff = max_backoff;
        self
    }

    pub fn with_renew_interval(mut self, interval: Duration) -> Self {
        self.renew_interval = interval;
        self
    }

    pub fn with_renew_retry_interval(mut self, interval: Duration) -> Self {
        self.renew_retry_interval = interval;
        self
    }

    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    pub fn with_max_renew_misses(mut self, misses: u32) -> Self {
        self.max_renew_misses = misses;
        self
    }

    /// Longest a leader can go before stepping down on its own, counted from
    /// the moment its last successful acquire or renew was sent
    ///
    /// The store may stamp the expiry as soon as the request arrives, while
    /// the answer can take up to `store_timeout` to come back, so the first
    /// round-trip is part of the budget.
    pub fn worst_case_step_down(&self) -> Duration {
        let retries = self.max_renew_misses.saturating_sub(1);
        self.store_timeout
            + self.renew_interval
            + self.store_timeout
            + (self.renew_retry_interval + self.store_timeout) * retries
    }

    /// How long after sending a successful acquire or renew the leader may
    /// keep acting on it, whatever the store does afterwards
    pub fn local_term(&self) -> Duration {
        self.ttl.saturating_sub(self.store_timeout)
    }

    /// Reject timings that would let a leader outlive its lease
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.resource.trim().is_empty() {
            return Err(ConfigError::EmptyResource);
        }
        for (field, value) in [
            ("ttl", self.ttl),
            ("acquire_interval", self.acquire_interval),
            ("renew_interval", self.renew_interval),
            ("renew_retry_interval", self.renew_retry_interval),
            ("store_timeout", self.store_timeout),
        ] {
            if value.is_zero() {
                return Err(ConfigError::Zero { field });
            }
        }
        if self.max_renew_misses == 0 {
            return Err(ConfigError::Zero {
                field: "max_renew_misses",
            });
        }
        if self.renew_interval * 2 >= self.ttl {
            return Err(ConfigError::RenewTooSlow {
                renew: self.renew_interval,
                ttl: self.ttl,
            });
        }
        let worst = self.worst_case_step_down();
        if worst >= self.ttl {
            return Err(ConfigError::StepDownTooSlow {
                worst,
                ttl: self.ttl,
            });
        }
        Ok(())
    }
}

impl Default for ElectorConfig {
    fn default() -> Self {
        Self {
            resource: String::new(),
            ttl: DEFAULT_TTL,
            acquire_interval: Duration::ZERO,
            acquire_jitter: Duration::ZERO,
            max_backoff: Duration::ZERO,
            renew_interval: Duration::ZERO,
            renew_retry_interval: Duration::ZERO,
            store_timeout: DEFAULT_STORE_TIMEOUT,
            max_renew_misses: 2,
        }
        .with_ttl(DEFAULT_TTL)
    }
}

/// Job manager settings
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobManagerConfig {
    /// How long a cancelled job may take to wind down
    #[serde(with = "humantime_serde")]
    pub grace_period: Duration,
}

impl JobManagerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }
}

impl Default for JobManagerConfig {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_secs(10),
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
