// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lease protocol client
//!
//! Wraps a `LeaseStore` with the per-call timeout and maps store errors onto
//! the protocol's error taxonomy. A store that does not answer in time is
//! indistinguishable from one that is down.

use std::future::Future;
use std::time::Duration;
use tenure_adapters::{LeaseStore, StoreError};
use tenure_core::{FencingToken, HolderId, Lease, LeaseError};

/// Acquire, renew and release leases against a store
#[derive(Clone)]
pub struct LeaseClient<S> {
    store: S,
    timeout: Duration,
}

impl<S: LeaseStore> LeaseClient<S> {
    pub fn new(store: S, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Claim the resource if no live lease exists
    pub async fn try_acquire(
        &self,
        resource: &str,
        holder: &HolderId,
        ttl: Duration,
    ) -> Result<Lease, LeaseError> {
        self.bounded(self.store.upsert_if_expired(resource, holder, ttl))
            .await
    }

    /// Extend our lease; fails with `LeaseLost` once the term is over
    pub async fn renew(
        &self,
        resource: &str,
        holder: &HolderId,
        token: FencingToken,
        ttl: Duration,
    ) -> Result<Lease, LeaseError> {
        self.bounded(self.store.compare_and_swap_renew(resource, holder, token, ttl))
            .await
            .map_err(|e| match e {
                // Any live row that is not ours means the term is over
                LeaseError::Contended { .. } => LeaseError::LeaseLost,
                other => other,
            })
    }

    /// Best-effort release; failures are logged and otherwise ignored
    pub async fn release(
        &self,
        resource: &str,
        holder: &HolderId,
        token: FencingToken,
    ) -> Result<(), LeaseError> {
        let result = self
            .bounded(self.store.compare_and_swap_expire(resource, holder, token))
            .await;
        if let Err(e) = &result {
            tracing::warn!(resource, %holder, token = token.value(), error = %e, "lease release failed");
        }
        result
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, LeaseError> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result.map_err(into_lease_error),
            Err(_) => Err(LeaseError::StoreUnavailable(format!(
                "no answer within {}ms",
                self.timeout.as_millis()
            ))),
        }
    }
}

fn into_lease_error(err: StoreError) -> LeaseError {
    match err {
        StoreError::Held { holder, .. } => LeaseError::Contended { holder },
        StoreError::Mismatch => LeaseError::LeaseLost,
        other => LeaseError::StoreUnavailable(other.to_string()),
    }
}

#[cfg(test)]
#[path = "lease_tests.rs"]
mod tests;
