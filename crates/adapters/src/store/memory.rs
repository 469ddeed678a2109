// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process lease store
//!
//! Linearizable within one process. Electors sharing a clone of the same
//! store contend exactly as separate nodes would against a shared table.

use super::{LeaseStore, LeaseTable, StoreError};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tenure_core::{Clock, FencingToken, HolderId, Lease, SystemClock};

/// Lease store backed by a mutex-guarded table
#[derive(Clone)]
pub struct MemoryLeaseStore<C: Clock = SystemClock> {
    table: Arc<Mutex<LeaseTable>>,
    clock: C,
}

impl MemoryLeaseStore<SystemClock> {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl Default for MemoryLeaseStore<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> MemoryLeaseStore<C> {
    pub fn with_clock(clock: C) -> Self {
        Self {
            table: Arc::new(Mutex::new(LeaseTable::new())),
            clock,
        }
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Copy of the current table
    pub fn snapshot(&self) -> LeaseTable {
        self.table.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn with_table<T>(&self, f: impl FnOnce(&mut LeaseTable) -> T) -> T {
        let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut table)
    }
}

#[async_trait]
impl<C: Clock> LeaseStore for MemoryLeaseStore<C> {
    async fn upsert_if_expired(
        &self,
        resource: &str,
        holder: &HolderId,
        ttl: Duration,
    ) -> Result<Lease, StoreError> {
        let now = self.clock.now();
        self.with_table(|t| t.upsert_if_expired(resource, holder, ttl, now))
    }

    async fn compare_and_swap_renew(
        &self,
        resource: &str,
        holder: &HolderId,
        token: FencingToken,
        ttl: Duration,
    ) -> Result<Lease, StoreError> {
        let now = self.clock.now();
        self.with_table(|t| t.compare_and_swap_renew(resource, holder, token, ttl, now))
    }

    async fn compare_and_swap_expire(
        &self,
        resource: &str,
        holder: &HolderId,
        token: FencingToken,
    ) -> Result<(), StoreError> {
        let now = self.clock.now();
        self.with_table(|t| t.compare_and_swap_expire(resource, holder, token, now))
    }

    async fn get(&self, resource: &str) -> Result<Option<Lease>, StoreError> {
        Ok(self.with_table(|t| t.get(resource).cloned()))
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
