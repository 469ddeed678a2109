// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Leadership status and its ordered notification bus
//!
//! The bus has a single writer (the elector). Every subscriber first sees
//! the current status and then each change in the order it was published.
//! Publishing a status equal to the current one is a no-op, so no
//! subscriber ever observes the same status twice in a row.

use crate::lease::FencingToken;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// What this process believes about its leadership
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LeadershipStatus {
    Follower,
    Leader(FencingToken),
    Unknown(String),
}

impl LeadershipStatus {
    pub fn is_leader(&self) -> bool {
        matches!(self, LeadershipStatus::Leader(_))
    }

    /// The fencing token of the current term, if leading
    pub fn token(&self) -> Option<FencingToken> {
        match self {
            LeadershipStatus::Leader(token) => Some(*token),
            _ => None,
        }
    }
}

impl std::fmt::Display for LeadershipStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LeadershipStatus::Follower => write!(f, "follower"),
            LeadershipStatus::Leader(token) => write!(f, "leader({})", token),
            LeadershipStatus::Unknown(reason) => write!(f, "unknown({})", reason),
        }
    }
}

struct BusState {
    current: LeadershipStatus,
    subscribers: Vec<mpsc::UnboundedSender<LeadershipStatus>>,
}

/// Ordered, replay-current status channel with many subscribers
#[derive(Clone)]
pub struct StatusBus {
    state: Arc<Mutex<BusState>>,
}

impl StatusBus {
    pub fn new(initial: LeadershipStatus) -> Self {
        Self {
            state: Arc::new(Mutex::new(BusState {
                current: initial,
                subscribers: Vec::new(),
            })),
        }
    }

    /// Snapshot of the latest published status
    pub fn current(&self) -> LeadershipStatus {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .current
            .clone()
    }

    /// Subscribe; the receiver yields the current status first
    pub fn subscribe(&self) -> StatusReceiver {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        // Sent under the lock so no publish can slip in ahead of the replay
        let _ = tx.send(state.current.clone());
        state.subscribers.push(tx);
        StatusReceiver { rx }
    }

    /// Publish a new status. Returns false if it equals the current one.
    pub fn publish(&self, status: LeadershipStatus) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.current == status {
            return false;
        }

        tracing::debug!(from = %state.current, to = %status, "leadership status changed");
        state.current = status.clone();
        state
            .subscribers
            .retain(|tx| tx.send(status.clone()).is_ok());
        true
    }

    /// Count of live subscribers
    pub fn subscriber_count(&self) -> usize {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.subscribers.retain(|tx| !tx.is_closed());
        state.subscribers.len()
    }
}

impl Default for StatusBus {
    fn default() -> Self {
        Self::new(LeadershipStatus::Unknown("not started".to_string()))
    }
}

/// One subscriber's view of the status sequence
pub struct StatusReceiver {
    rx: mpsc::UnboundedReceiver<LeadershipStatus>,
}

impl StatusReceiver {
    /// Next status change; `None` once the bus is gone
    pub async fn recv(&mut self) -> Option<LeadershipStatus> {
        self.rx.recv().await
    }

    /// Next already-delivered status, without waiting
    pub fn try_recv(&mut self) -> Option<LeadershipStatus> {
        self.rx.try_recv().ok()
    }
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod tests;
