// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for multi-node tests

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tenure_adapters::{LeaseStore, MemoryLeaseStore, StoreError};
use tenure_core::{
    ElectorConfig, FencingToken, HolderId, JobManagerConfig, LeadershipStatus, Lease,
    StatusReceiver, TokioClock,
};
use tenure_engine::{Elector, Job, JobManager, JobResult, JobScope};

/// One node's view of a shared table, which can be cut off from it
#[derive(Clone)]
pub struct PartitionableStore {
    inner: MemoryLeaseStore<TokioClock>,
    cut: Arc<AtomicBool>,
}

impl PartitionableStore {
    pub fn new(shared: &MemoryLeaseStore<TokioClock>) -> Self {
        Self {
            inner: shared.clone(),
            cut: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn partition(&self) {
        self.cut.store(true, Ordering::SeqCst);
    }

    pub fn heal(&self) {
        self.cut.store(false, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.cut.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("partitioned".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl LeaseStore for PartitionableStore {
    async fn upsert_if_expired(
        &self,
        resource: &str,
        holder: &HolderId,
        ttl: Duration,
    ) -> Result<Lease, StoreError> {
        self.check()?;
        self.inner.upsert_if_expired(resource, holder, ttl).await
    }

    async fn compare_and_swap_renew(
        &self,
        resource: &str,
        holder: &HolderId,
        token: FencingToken,
        ttl: Duration,
    ) -> Result<Lease, StoreError> {
        self.check()?;
        self.inner
            .compare_and_swap_renew(resource, holder, token, ttl)
            .await
    }

    async fn compare_and_swap_expire(
        &self,
        resource: &str,
        holder: &HolderId,
        token: FencingToken,
    ) -> Result<(), StoreError> {
        self.check()?;
        self.inner
            .compare_and_swap_expire(resource, holder, token)
            .await
    }

    async fn get(&self, resource: &str) -> Result<Option<Lease>, StoreError> {
        self.check()?;
        self.inner.get(resource).await
    }
}

/// Commits every write immediately but answers late; renewals may never
/// be answered at all
#[derive(Clone)]
pub struct LateAckStore {
    inner: MemoryLeaseStore<TokioClock>,
    ack_delay: Duration,
    renewals_hang: bool,
}

impl LateAckStore {
    pub fn new(shared: &MemoryLeaseStore<TokioClock>, ack_delay: Duration) -> Self {
        Self {
            inner: shared.clone(),
            ack_delay,
            renewals_hang: false,
        }
    }

    pub fn with_hanging_renewals(mut self) -> Self {
        self.renewals_hang = true;
        self
    }
}

#[async_trait]
impl LeaseStore for LateAckStore {
    async fn upsert_if_expired(
        &self,
        resource: &str,
        holder: &HolderId,
        ttl: Duration,
    ) -> Result<Lease, StoreError> {
        let result = self.inner.upsert_if_expired(resource, holder, ttl).await;
        tokio::time::sleep(self.ack_delay).await;
        result
    }

    async fn compare_and_swap_renew(
        &self,
        resource: &str,
        holder: &HolderId,
        token: FencingToken,
        ttl: Duration,
    ) -> Result<Lease, StoreError> {
        if self.renewals_hang {
            std::future::pending::<()>().await;
        }
        let result = self
            .inner
            .compare_and_swap_renew(resource, holder, token, ttl)
            .await;
        tokio::time::sleep(self.ack_delay).await;
        result
    }

    async fn compare_and_swap_expire(
        &self,
        resource: &str,
        holder: &HolderId,
        token: FencingToken,
    ) -> Result<(), StoreError> {
        self.inner
            .compare_and_swap_expire(resource, holder, token)
            .await
    }

    async fn get(&self, resource: &str) -> Result<Option<Lease>, StoreError> {
        self.inner.get(resource).await
    }
}

/// Records which tokens ran and how many runs overlapped, fleet-wide
#[derive(Clone, Default)]
pub struct Ledger {
    active: Arc<AtomicUsize>,
    max_active: Arc<AtomicUsize>,
    runs: Arc<Mutex<Vec<(String, FencingToken)>>>,
}

impl Ledger {
    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn runs(&self) -> Vec<(String, FencingToken)> {
        self.runs.lock().unwrap().clone()
    }
}

/// A job that works until cancelled, reporting into a shared ledger
pub struct LedgerJob {
    node: String,
    ledger: Ledger,
}

impl LedgerJob {
    pub fn new(node: &str, ledger: &Ledger) -> Arc<Self> {
        Arc::new(Self {
            node: node.to_string(),
            ledger: ledger.clone(),
        })
    }
}

#[async_trait]
impl Job for LedgerJob {
    fn name(&self) -> &str {
        "jobX"
    }

    async fn run(&self, scope: JobScope) -> JobResult {
        let now = self.ledger.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.ledger.max_active.fetch_max(now, Ordering::SeqCst);
        self.ledger
            .runs
            .lock()
            .unwrap()
            .push((self.node.clone(), scope.fencing_token()));

        scope.cancelled().await;

        self.ledger.active.fetch_sub(1, Ordering::SeqCst);
        JobResult::Cancelled
    }
}

pub fn config() -> ElectorConfig {
    ElectorConfig::new("jobX").with_ttl(Duration::from_secs(9))
}

/// An elector plus a job manager, wired the way the daemon wires them
pub struct Node {
    pub name: String,
    pub store: PartitionableStore,
    pub elector: Elector<PartitionableStore>,
    pub manager: JobManager,
}

impl Node {
    pub async fn start(name: &str, shared: &MemoryLeaseStore<TokioClock>, ledger: &Ledger) -> Self {
        let store = PartitionableStore::new(shared);
        let elector = Elector::new(config(), HolderId::new(name), store.clone()).unwrap();
        let manager = JobManager::new(
            JobManagerConfig::new().with_grace_period(Duration::from_secs(2)),
            elector.subscribe(),
        );
        manager.start(LedgerJob::new(name, ledger)).await.unwrap();
        elector.start();
        Self {
            name: name.to_string(),
            store,
            elector,
            manager,
        }
    }

    pub async fn stop(self) {
        self.manager.shutdown().await.unwrap();
        self.elector.stop().await;
    }
}

/// Receive until a status matches, failing after a generous virtual timeout
pub async fn wait_for(
    rx: &mut StatusReceiver,
    pred: impl Fn(&LeadershipStatus) -> bool,
) -> LeadershipStatus {
    let found = tokio::time::timeout(Duration::from_secs(300), async {
        while let Some(status) = rx.recv().await {
            if pred(&status) {
                return Some(status);
            }
        }
        None
    })
    .await;
    match found {
        Ok(Some(status)) => status,
        other => panic!("status never arrived: {:?}", other),
    }
}
