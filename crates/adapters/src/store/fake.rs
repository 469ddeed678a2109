// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake lease store for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use super::{LeaseStore, LeaseTable, StoreError};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tenure_core::{Clock, FakeClock, FencingToken, HolderId, Lease};

/// Recorded store call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    Upsert {
        resource: String,
        holder: HolderId,
    },
    Renew {
        resource: String,
        holder: HolderId,
        token: FencingToken,
    },
    Expire {
        resource: String,
        holder: HolderId,
        token: FencingToken,
    },
    Get {
        resource: String,
    },
}

#[derive(Default)]
struct FakeState {
    table: LeaseTable,
    calls: Vec<StoreCall>,
    fail_next: usize,
    unavailable: bool,
    latency: Option<Duration>,
}

/// Fake lease store with injectable outages and latency
#[derive(Clone)]
pub struct FakeLeaseStore<C: Clock = FakeClock> {
    state: Arc<Mutex<FakeState>>,
    clock: C,
}

impl FakeLeaseStore<FakeClock> {
    pub fn new() -> Self {
        Self::with_clock(FakeClock::new())
    }
}

impl Default for FakeLeaseStore<FakeClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> FakeLeaseStore<C> {
    pub fn with_clock(clock: C) -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeState::default())),
            clock,
        }
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Fail the next `n` calls with `Unavailable`
    pub fn fail_next(&self, n: usize) {
        self.lock().fail_next = n;
    }

    /// Fail every call with `Unavailable` until cleared
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    /// Delay every call before it reaches the table
    pub fn set_latency(&self, latency: Option<Duration>) {
        self.lock().latency = latency;
    }

    /// Put a row straight into the table
    pub fn seed(&self, lease: Lease) {
        self.lock().table.insert(lease);
    }

    /// Get all recorded calls
    pub fn calls(&self) -> Vec<StoreCall> {
        self.lock().calls.clone()
    }

    /// Current row for a resource, bypassing fault injection
    pub fn row(&self, resource: &str) -> Option<Lease> {
        self.lock().table.get(resource).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record the call, apply latency, then apply fault injection
    async fn enter(&self, call: StoreCall) -> Result<(), StoreError> {
        let latency = {
            let mut state = self.lock();
            state.calls.push(call);
            state.latency
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.lock();
        if state.unavailable {
            return Err(StoreError::Unavailable("injected outage".to_string()));
        }
        if state.fail_next > 0 {
            state.fail_next -= 1;
            return Err(StoreError::Unavailable("injected failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl<C: Clock> LeaseStore for FakeLeaseStore<C> {
    async fn upsert_if_expired(
        &self,
        resource: &str,
        holder: &HolderId,
        ttl: Duration,
    ) -> Result<Lease, StoreError> {
        self.enter(StoreCall::Upsert {
            resource: resource.to_string(),
            holder: holder.clone(),
        })
        .await?;
        let now = self.clock.now();
        self.lock().table.upsert_if_expired(resource, holder, ttl, now)
    }

    async fn compare_and_swap_renew(
        &self,
        resource: &str,
        holder: &HolderId,
        token: FencingToken,
        ttl: Duration,
    ) -> Result<Lease, StoreError> {
        self.enter(StoreCall::Renew {
            resource: resource.to_string(),
            holder: holder.clone(),
            token,
        })
        .await?;
        let now = self.clock.now();
        self.lock()
            .table
            .compare_and_swap_renew(resource, holder, token, ttl, now)
    }

    async fn compare_and_swap_expire(
        &self,
        resource: &str,
        holder: &HolderId,
        token: FencingToken,
    ) -> Result<(), StoreError> {
        self.enter(StoreCall::Expire {
            resource: resource.to_string(),
            holder: holder.clone(),
            token,
        })
        .await?;
        let now = self.clock.now();
        self.lock()
            .table
            .compare_and_swap_expire(resource, holder, token, now)
    }

    async fn get(&self, resource: &str) -> Result<Option<Lease>, StoreError> {
        self.enter(StoreCall::Get {
            resource: resource.to_string(),
        })
        .await?;
        Ok(self.lock().table.get(resource).cloned())
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
