// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Elector: drives the election state machine against a lease store
//!
//! The machine in `tenure_core::election` decides; this loop sleeps, talks
//! to the store, publishes statuses and feeds results back as inputs. It
//! runs on its own task, so nothing a job does can delay a renewal.

use crate::lease::LeaseClient;
use rand::Rng;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tenure_adapters::LeaseStore;
use tenure_core::{
    ConfigError, ElectorConfig, ElectorEffect, ElectorInput, ElectorMachine, ElectorPhase,
    HolderId, LeadershipStatus, StatusBus, StatusReceiver,
};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

struct Running {
    stop: CancellationToken,
    task: JoinHandle<()>,
}

/// Campaigns for one resource and publishes leadership changes
pub struct Elector<S: LeaseStore> {
    config: ElectorConfig,
    holder: HolderId,
    client: LeaseClient<S>,
    bus: StatusBus,
    phase: Arc<Mutex<ElectorPhase>>,
    running: Mutex<Option<Running>>,
}

impl<S: LeaseStore> Elector<S> {
    /// Build an elector; the configuration is validated first
    pub fn new(config: ElectorConfig, holder: HolderId, store: S) -> Result<Self, ConfigError> {
        config.validate()?;
        let client = LeaseClient::new(store, config.store_timeout);
        Ok(Self {
            config,
            holder,
            client,
            bus: StatusBus::default(),
            phase: Arc::new(Mutex::new(ElectorPhase::Idle)),
            running: Mutex::new(None),
        })
    }

    pub fn holder(&self) -> &HolderId {
        &self.holder
    }

    pub fn config(&self) -> &ElectorConfig {
        &self.config
    }

    /// Latest published status
    pub fn status(&self) -> LeadershipStatus {
        self.bus.current()
    }

    /// Ordered status changes, starting with the current status
    pub fn subscribe(&self) -> StatusReceiver {
        self.bus.subscribe()
    }

    pub fn status_bus(&self) -> &StatusBus {
        &self.bus
    }

    /// Current state machine phase, for diagnostics
    pub fn phase(&self) -> ElectorPhase {
        self.phase.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|r| !r.task.is_finished())
    }

    /// Begin campaigning. Calling it while already running does nothing.
    pub fn start(&self) {
        let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        if running.as_ref().is_some_and(|r| !r.task.is_finished()) {
            return;
        }

        let stop = CancellationToken::new();
        let driver = Driver {
            machine: ElectorMachine::new(self.config.clone(), self.bus.current()),
            holder: self.holder.clone(),
            client: self.client.clone(),
            bus: self.bus.clone(),
            phase: Arc::clone(&self.phase),
            stop: stop.clone(),
            term_deadline: None,
        };

        tracing::info!(
            resource = %self.config.resource,
            holder = %self.holder,
            ttl_ms = self.config.ttl.as_millis() as u64,
            "elector starting"
        );
        let task = tokio::spawn(driver.run());
        *running = Some(Running { stop, task });
    }

    /// Step down (releasing a held lease) and wait for the loop to finish
    pub async fn stop(&self) {
        let running = self
            .running
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        let Some(running) = running else {
            return;
        };

        running.stop.cancel();
        if let Err(e) = running.task.await {
            tracing::error!(error = %e, "elector loop ended abnormally");
        }
        tracing::info!(resource = %self.config.resource, "elector stopped");
    }
}

impl<S: LeaseStore> Drop for Elector<S> {
    fn drop(&mut self) {
        if let Some(running) = self
            .running
            .get_mut()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            running.stop.cancel();
        }
    }
}

struct Driver<S> {
    machine: ElectorMachine,
    holder: HolderId,
    client: LeaseClient<S>,
    bus: StatusBus,
    phase: Arc<Mutex<ElectorPhase>>,
    stop: CancellationToken,
    /// When the last confirmed acquire or renew stops vouching for us,
    /// measured from the moment that request was sent
    term_deadline: Option<Instant>,
}

impl<S: LeaseStore> Driver<S> {
    async fn run(mut self) {
        let mut queue = VecDeque::new();
        self.apply(ElectorInput::Start, &mut queue);

        while let Some(effect) = queue.pop_front() {
            if let Some(input) = self.execute(effect).await {
                self.apply(input, &mut queue);
            }
        }
    }

    fn apply(&mut self, input: ElectorInput, queue: &mut VecDeque<ElectorEffect>) {
        let (next, effects) = self.machine.transition(input);
        if next.phase.name() != self.machine.phase.name() {
            tracing::debug!(from = self.machine.phase.name(), to = next.phase.name(), "elector phase");
        }
        self.machine = next;
        *self.phase.lock().unwrap_or_else(|e| e.into_inner()) = self.machine.phase.clone();
        queue.extend(effects);
    }

    async fn execute(&mut self, effect: ElectorEffect) -> Option<ElectorInput> {
        let resource = self.machine.config.resource.clone();
        let resource = resource.as_str();
        let ttl = self.machine.config.ttl;

        match effect {
            ElectorEffect::Publish(status) => {
                match &status {
                    LeadershipStatus::Leader(token) => {
                        tracing::info!(resource, token = token.value(), "became leader")
                    }
                    LeadershipStatus::Follower => tracing::info!(resource, "following"),
                    LeadershipStatus::Unknown(reason) => {
                        tracing::warn!(resource, %reason, "leadership unknown")
                    }
                }
                self.bus.publish(status);
                None
            }

            ElectorEffect::ScheduleAcquire { after, jitter } => {
                let delay = if jitter {
                    after + random_jitter(self.machine.config.acquire_jitter)
                } else {
                    after
                };
                if self.sleep_or_stop(delay).await {
                    return Some(ElectorInput::Stop);
                }

                let sent = Instant::now();
                let result = self.client.try_acquire(resource, &self.holder, ttl).await;
                match result {
                    Ok(lease) if self.stop.is_cancelled() => {
                        // Won after stop was requested; never announce it
                        tracing::info!(resource, token = lease.token.value(), "lease won after stop, releasing");
                        let _ = self
                            .client
                            .release(resource, &self.holder, lease.token)
                            .await;
                        Some(ElectorInput::Stop)
                    }
                    Ok(lease) => {
                        self.confirm(sent);
                        Some(ElectorInput::Acquired(lease))
                    }
                    Err(e) => Some(ElectorInput::AcquireFailed(e)),
                }
            }

            ElectorEffect::ScheduleRenew { after } => {
                tokio::select! {
                    biased;
                    _ = self.stop.cancelled() => Some(ElectorInput::Stop),
                    _ = until(self.term_deadline) => Some(self.term_expired(resource)),
                    _ = tokio::time::sleep(after) => Some(ElectorInput::RenewDue),
                }
            }

            ElectorEffect::Renew(lease) => {
                let sent = Instant::now();
                let result = tokio::select! {
                    biased;
                    _ = until(self.term_deadline) => None,
                    result = self.client.renew(resource, &self.holder, lease.token, ttl) => Some(result),
                };
                match result {
                    None => Some(self.term_expired(resource)),
                    Some(Ok(lease)) => {
                        self.confirm(sent);
                        Some(ElectorInput::Renewed(lease))
                    }
                    Some(Err(e)) => {
                        tracing::warn!(resource, token = lease.token.value(), error = %e, "renewal failed");
                        Some(ElectorInput::RenewFailed(e))
                    }
                }
            }

            ElectorEffect::Release(lease) => {
                // Failure is already logged by the client
                let _ = self
                    .client
                    .release(resource, &self.holder, lease.token)
                    .await;
                Some(ElectorInput::Released)
            }
        }
    }

    /// A round-trip sent at `sent` succeeded; the store stamped the expiry
    /// no earlier than that
    fn confirm(&mut self, sent: Instant) {
        self.term_deadline = Some(sent + self.machine.config.local_term());
    }

    fn term_expired(&mut self, resource: &str) -> ElectorInput {
        tracing::warn!(resource, "local term ran out before a renewal was confirmed");
        self.term_deadline = None;
        ElectorInput::TermExpired
    }

    /// Sleep for `delay`; returns true if stop was requested first
    async fn sleep_or_stop(&self, delay: Duration) -> bool {
        tokio::select! {
            biased;
            _ = self.stop.cancelled() => true,
            _ = tokio::time::sleep(delay) => false,
        }
    }
}

/// Resolves at the deadline; pends forever without one
async fn until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn random_jitter(max: Duration) -> Duration {
    let max_ms = max.as_millis() as u64;
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
}

#[cfg(test)]
#[path = "elector_tests.rs"]
mod tests;
