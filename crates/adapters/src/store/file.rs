// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lease store backed by a JSON file on a shared filesystem
//!
//! Every operation takes an exclusive advisory lock on the file, reads the
//! whole table, applies one row operation and writes the table back before
//! unlocking. Processes on one host (or on a filesystem with working
//! `flock`) see a linearizable table.

use super::{LeaseStore, LeaseTable, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tenure_core::{Clock, FencingToken, HolderId, Lease, SystemClock};

/// Lease store persisted to a single locked file
#[derive(Clone)]
pub struct FileLeaseStore<C: Clock = SystemClock> {
    path: Arc<PathBuf>,
    clock: C,
}

impl FileLeaseStore<SystemClock> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_clock(path, SystemClock)
    }
}

impl<C: Clock> FileLeaseStore<C> {
    pub fn with_clock(path: impl Into<PathBuf>, clock: C) -> Self {
        Self {
            path: Arc::new(path.into()),
            clock,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run one table operation under the file lock on the blocking pool.
    /// The clock is read once the lock is held, so time spent waiting for
    /// another process never makes a row look fresher than it is.
    async fn locked<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut LeaseTable, DateTime<Utc>) -> Result<T, StoreError> + Send + 'static,
    {
        let path = Arc::clone(&self.path);
        let clock = self.clock.clone();
        tokio::task::spawn_blocking(move || with_locked_table(&path, |t| op(t, clock.now())))
            .await
            .map_err(|e| StoreError::Unavailable(format!("store task failed: {e}")))?
    }
}

fn with_locked_table<T>(
    path: &Path,
    op: impl FnOnce(&mut LeaseTable) -> Result<T, StoreError>,
) -> Result<T, StoreError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)?;
    file.lock_exclusive()?;

    let result = read_modify_write(&mut file, op);
    // Closing the file drops the lock as well
    let _ = FileExt::unlock(&file);
    result
}

fn read_modify_write<T>(
    file: &mut File,
    op: impl FnOnce(&mut LeaseTable) -> Result<T, StoreError>,
) -> Result<T, StoreError> {
    let mut raw = String::new();
    file.read_to_string(&mut raw)?;
    let mut table: LeaseTable = if raw.trim().is_empty() {
        LeaseTable::new()
    } else {
        serde_json::from_str(&raw)?
    };

    let before = table.clone();
    let value = op(&mut table)?;

    if table != before {
        let encoded = serde_json::to_vec_pretty(&table)?;
        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        file.write_all(&encoded)?;
        file.sync_all()?;
    }
    Ok(value)
}

#[async_trait]
impl<C: Clock> LeaseStore for FileLeaseStore<C> {
    async fn upsert_if_expired(
        &self,
        resource: &str,
        holder: &HolderId,
        ttl: Duration,
    ) -> Result<Lease, StoreError> {
        let (resource, holder) = (resource.to_string(), holder.clone());
        self.locked(move |t, now| t.upsert_if_expired(&resource, &holder, ttl, now))
            .await
    }

    async fn compare_and_swap_renew(
        &self,
        resource: &str,
        holder: &HolderId,
        token: FencingToken,
        ttl: Duration,
    ) -> Result<Lease, StoreError> {
        let (resource, holder) = (resource.to_string(), holder.clone());
        self.locked(move |t, now| t.compare_and_swap_renew(&resource, &holder, token, ttl, now))
            .await
    }

    async fn compare_and_swap_expire(
        &self,
        resource: &str,
        holder: &HolderId,
        token: FencingToken,
    ) -> Result<(), StoreError> {
        let (resource, holder) = (resource.to_string(), holder.clone());
        self.locked(move |t, now| t.compare_and_swap_expire(&resource, &holder, token, now))
            .await
    }

    async fn get(&self, resource: &str) -> Result<Option<Lease>, StoreError> {
        let resource = resource.to_string();
        self.locked(move |t, _| Ok(t.get(&resource).cloned())).await
    }
}

#[cfg(test)]
#[path = "file_tests.rs"]
mod tests;
