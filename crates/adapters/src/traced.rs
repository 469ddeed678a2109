// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Traced adapter wrappers for consistent observability

use crate::store::{LeaseStore, StoreError};
use async_trait::async_trait;
use std::time::{Duration, Instant};
use tenure_core::{FencingToken, HolderId, Lease};
use tracing::Instrument;

/// Wrapper that adds tracing to any LeaseStore
#[derive(Clone)]
pub struct TracedLeaseStore<S> {
    inner: S,
}

impl<S> TracedLeaseStore<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

#[async_trait]
impl<S: LeaseStore> LeaseStore for TracedLeaseStore<S> {
    async fn upsert_if_expired(
        &self,
        resource: &str,
        holder: &HolderId,
        ttl: Duration,
    ) -> Result<Lease, StoreError> {
        let span = tracing::info_span!("store.upsert", resource, %holder);
        async {
            tracing::debug!(ttl_ms = ttl.as_millis() as u64, "acquiring");
            let start = Instant::now();
            let result = self.inner.upsert_if_expired(resource, holder, ttl).await;

            match &result {
                Ok(lease) => tracing::info!(
                    token = lease.token.value(),
                    expires_at = %lease.expires_at,
                    elapsed_ms = elapsed_ms(start),
                    "lease acquired"
                ),
                // Losing the race is the normal steady state for followers
                Err(StoreError::Held { holder, .. }) => tracing::debug!(
                    current = %holder,
                    elapsed_ms = elapsed_ms(start),
                    "lease held elsewhere"
                ),
                Err(e) => tracing::warn!(
                    error = %e,
                    elapsed_ms = elapsed_ms(start),
                    "upsert failed"
                ),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn compare_and_swap_renew(
        &self,
        resource: &str,
        holder: &HolderId,
        token: FencingToken,
        ttl: Duration,
    ) -> Result<Lease, StoreError> {
        let span = tracing::info_span!("store.renew", resource, %holder, token = token.value());
        async {
            let start = Instant::now();
            let result = self
                .inner
                .compare_and_swap_renew(resource, holder, token, ttl)
                .await;

            match &result {
                Ok(lease) => tracing::debug!(
                    expires_at = %lease.expires_at,
                    elapsed_ms = elapsed_ms(start),
                    "lease renewed"
                ),
                Err(StoreError::Mismatch) => tracing::warn!(
                    elapsed_ms = elapsed_ms(start),
                    "renewal rejected, lease lost"
                ),
                Err(e) => tracing::warn!(
                    error = %e,
                    elapsed_ms = elapsed_ms(start),
                    "renewal failed"
                ),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn compare_and_swap_expire(
        &self,
        resource: &str,
        holder: &HolderId,
        token: FencingToken,
    ) -> Result<(), StoreError> {
        let span = tracing::info_span!("store.expire", resource, %holder, token = token.value());
        async {
            let start = Instant::now();
            let result = self
                .inner
                .compare_and_swap_expire(resource, holder, token)
                .await;

            // Expire failing is often acceptable (lease already taken over)
            match &result {
                Ok(()) => tracing::info!(elapsed_ms = elapsed_ms(start), "lease released"),
                Err(e) => tracing::warn!(
                    error = %e,
                    elapsed_ms = elapsed_ms(start),
                    "release failed (may be expected)"
                ),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn get(&self, resource: &str) -> Result<Option<Lease>, StoreError> {
        let result = self.inner.get(resource).await;
        tracing::trace!(
            resource,
            holder = ?result
                .as_ref()
                .ok()
                .and_then(|row| row.as_ref())
                .map(|l| l.holder.to_string()),
            "read"
        );
        result
    }
}

#[cfg(test)]
#[path = "traced_tests.rs"]
mod tests;
