// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Row-level lease semantics shared by the store implementations
//!
//! The table is plain data; callers provide "now" and the mutual exclusion
//! (a mutex in memory, an advisory file lock on disk).

use super::StoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tenure_core::clock::delta;
use tenure_core::{FencingToken, HolderId, Lease};

/// Lease rows keyed by resource name
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseTable {
    rows: BTreeMap<String, Lease>,
}

fn expiry(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    now.checked_add_signed(delta(ttl))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

impl LeaseTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, resource: &str) -> Option<&Lease> {
        self.rows.get(resource)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Overwrite a row unconditionally
    pub fn insert(&mut self, lease: Lease) {
        self.rows.insert(lease.resource.clone(), lease);
    }

    /// Insert a new row or take over an expired one
    pub fn upsert_if_expired(
        &mut self,
        resource: &str,
        holder: &HolderId,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<Lease, StoreError> {
        let token = match self.rows.get(resource) {
            Some(row) if !row.is_expired_at(now) => {
                return Err(StoreError::Held {
                    holder: row.holder.clone(),
                    expires_at: row.expires_at,
                });
            }
            Some(row) => row.token.next(),
            None => FencingToken::FIRST,
        };

        let lease = Lease {
            resource: resource.to_string(),
            holder: holder.clone(),
            expires_at: expiry(now, ttl),
            token,
        };
        self.rows.insert(resource.to_string(), lease.clone());
        Ok(lease)
    }

    /// Extend a live row whose holder and token match
    pub fn compare_and_swap_renew(
        &mut self,
        resource: &str,
        holder: &HolderId,
        token: FencingToken,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<Lease, StoreError> {
        match self.rows.get_mut(resource) {
            Some(row) if row.is_held_by(holder) && row.token == token && !row.is_expired_at(now) => {
                row.expires_at = expiry(now, ttl);
                Ok(row.clone())
            }
            _ => Err(StoreError::Mismatch),
        }
    }

    /// Expire a row whose holder and token match
    pub fn compare_and_swap_expire(
        &mut self,
        resource: &str,
        holder: &HolderId,
        token: FencingToken,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        match self.rows.get_mut(resource) {
            Some(row) if row.is_held_by(holder) && row.token == token => {
                // Never pushes expiry later, so a retried release stays harmless
                row.expires_at = row.expires_at.min(now);
                Ok(())
            }
            _ => Err(StoreError::Mismatch),
        }
    }
}

#[cfg(test)]
#[path = "table_tests.rs"]
mod tests;
