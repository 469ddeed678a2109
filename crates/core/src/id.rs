// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Holder identity generation
//!
//! Every elector process needs an identity that is unique across the fleet
//! and across restarts of the same host, otherwise a restarted process could
//! renew the lease its previous incarnation held.

use crate::lease::HolderId;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Generates holder identities
pub trait IdGen: Clone + Send + Sync {
    fn next_holder(&self) -> HolderId;
}

/// `<node>-<uuid>` identities for production use
#[derive(Clone, Debug)]
pub struct UuidIdGen {
    node: String,
}

impl UuidIdGen {
    pub fn new(node: impl Into<String>) -> Self {
        Self { node: node.into() }
    }

    /// Use the `HOSTNAME` environment variable as the node prefix
    pub fn from_env() -> Self {
        let node = std::env::var("HOSTNAME")
            .ok()
            .filter(|h| !h.trim().is_empty())
            .unwrap_or_else(|| "tenure".to_string());
        Self::new(node)
    }
}

impl Default for UuidIdGen {
    fn default() -> Self {
        Self::from_env()
    }
}

impl IdGen for UuidIdGen {
    fn next_holder(&self) -> HolderId {
        HolderId::new(format!("{}-{}", self.node, uuid::Uuid::new_v4()))
    }
}

/// Sequential identities for testing (`node-1`, `node-2`, ...)
#[derive(Clone, Debug)]
pub struct SequentialIdGen {
    prefix: String,
    counter: Arc<AtomicU64>,
}

impl SequentialIdGen {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            counter: Arc::new(AtomicU64::new(1)),
        }
    }
}

impl Default for SequentialIdGen {
    fn default() -> Self {
        Self::new("node")
    }
}

impl IdGen for SequentialIdGen {
    fn next_holder(&self) -> HolderId {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        HolderId::new(format!("{}-{}", self.prefix, n))
    }
}
