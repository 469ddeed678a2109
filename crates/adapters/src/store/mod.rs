// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lease store adapters
//!
//! A lease store is a strongly consistent table of lease rows keyed by
//! resource name. Two concurrent `upsert_if_expired` calls on the same
//! resource must never both succeed, and every call must be safe to retry.

mod file;
mod memory;
mod table;

pub use file::FileLeaseStore;
pub use memory::MemoryLeaseStore;
pub use table::LeaseTable;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeLeaseStore, StoreCall};

use async_trait::async_trait;
use std::time::Duration;
use tenure_core::{FencingToken, HolderId, Lease};
use thiserror::Error;

/// Errors from lease store operations
#[derive(Debug, Error)]
pub enum StoreError {
    /// A live lease held by someone else blocks the upsert
    #[error("resource is held by {holder} until {expires_at}")]
    Held {
        holder: HolderId,
        expires_at: chrono::DateTime<chrono::Utc>,
    },
    /// Holder or token no longer match the stored row
    #[error("holder/token mismatch")]
    Mismatch,
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("corrupt lease table: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Adapter for the lease table
#[async_trait]
pub trait LeaseStore: Clone + Send + Sync + 'static {
    /// Insert a row, or take over an expired one, bumping the token
    async fn upsert_if_expired(
        &self,
        resource: &str,
        holder: &HolderId,
        ttl: Duration,
    ) -> Result<Lease, StoreError>;

    /// Extend a live row only if holder and token still match
    async fn compare_and_swap_renew(
        &self,
        resource: &str,
        holder: &HolderId,
        token: FencingToken,
        ttl: Duration,
    ) -> Result<Lease, StoreError>;

    /// Expire a row now only if holder and token still match
    async fn compare_and_swap_expire(
        &self,
        resource: &str,
        holder: &HolderId,
        token: FencingToken,
    ) -> Result<(), StoreError>;

    /// Read the row for a resource, expired or not
    async fn get(&self, resource: &str) -> Result<Option<Lease>, StoreError>;
}
