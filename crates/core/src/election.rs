// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Elector state machine
//!
//! `Idle -> Acquiring -> Leading <-> Renewing -> SteppingDown -> Idle`.
//!
//! The machine is pure: it consumes the outcome of each store round-trip
//! and returns the effects the driver must perform next (publish a status,
//! sleep then acquire, sleep then renew, renew now, release). Losing the
//! lease, or failing to reach the store for `max_renew_misses` renewals in
//! a row, drops straight back to acquiring with `Follower` published;
//! a leader never keeps acting on a lease it cannot prove it still holds.
//! The driver also feeds `TermExpired` once the local term of the last
//! confirmed round-trip runs out, even with a renewal still in flight.

use crate::config::ElectorConfig;
use crate::lease::{Lease, LeaseError};
use crate::status::LeadershipStatus;
use std::time::Duration;

/// Where the elector is in its cycle
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ElectorPhase {
    /// Not running
    Idle,
    /// Trying to obtain the lease
    Acquiring,
    /// Holding the lease, waiting for the next renewal
    Leading { lease: Lease, misses: u32 },
    /// Holding the lease with a renewal in flight
    Renewing { lease: Lease, misses: u32 },
    /// Releasing the lease after an explicit stop
    SteppingDown { lease: Lease },
}

impl ElectorPhase {
    pub fn name(&self) -> &'static str {
        match self {
            ElectorPhase::Idle => "idle",
            ElectorPhase::Acquiring => "acquiring",
            ElectorPhase::Leading { .. } => "leading",
            ElectorPhase::Renewing { .. } => "renewing",
            ElectorPhase::SteppingDown { .. } => "stepping_down",
        }
    }

    /// The lease this phase believes it holds
    pub fn lease(&self) -> Option<&Lease> {
        match self {
            ElectorPhase::Leading { lease, .. }
            | ElectorPhase::Renewing { lease, .. }
            | ElectorPhase::SteppingDown { lease } => Some(lease),
            ElectorPhase::Idle | ElectorPhase::Acquiring => None,
        }
    }
}

/// Inputs that drive the elector
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ElectorInput {
    /// Begin campaigning
    Start,
    /// An acquisition attempt succeeded
    Acquired(Lease),
    /// An acquisition attempt failed
    AcquireFailed(LeaseError),
    /// The renewal timer fired
    RenewDue,
    /// A renewal succeeded
    Renewed(Lease),
    /// A renewal failed
    RenewFailed(LeaseError),
    /// The local term ran out before a renewal was confirmed
    TermExpired,
    /// Explicit stop requested
    Stop,
    /// The best-effort release finished (either way)
    Released,
}

/// Work the driver performs on behalf of the machine
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ElectorEffect {
    /// Publish a status change to subscribers
    Publish(LeadershipStatus),
    /// Sleep, then attempt acquisition; `jitter` adds a random delay
    ScheduleAcquire { after: Duration, jitter: bool },
    /// Sleep, then feed `RenewDue`
    ScheduleRenew { after: Duration },
    /// Renew this lease now
    Renew(Lease),
    /// Release this lease now
    Release(Lease),
}

/// The elector's state: phase, last published status, and backoff
#[derive(Clone, Debug)]
pub struct ElectorMachine {
    pub config: ElectorConfig,
    pub phase: ElectorPhase,
    /// Last status handed to `Publish`, used to suppress repeats
    pub published: LeadershipStatus,
    /// Delay before the next acquisition attempt while the store is down
    pub backoff: Duration,
}

impl ElectorMachine {
    pub fn new(config: ElectorConfig, published: LeadershipStatus) -> Self {
        let backoff = config.acquire_interval;
        Self {
            config,
            phase: ElectorPhase::Idle,
            published,
            backoff,
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.phase, ElectorPhase::Idle)
    }

    /// Pure state transition function
    pub fn transition(&self, input: ElectorInput) -> (ElectorMachine, Vec<ElectorEffect>) {
        let mut next = self.clone();
        let mut effects = Vec::new();

        match (&self.phase, input) {
            (ElectorPhase::Idle, ElectorInput::Start) => {
                next.phase = ElectorPhase::Acquiring;
                next.backoff = self.config.acquire_interval;
                effects.push(ElectorEffect::ScheduleAcquire {
                    after: Duration::ZERO,
                    jitter: false,
                });
            }

            (ElectorPhase::Acquiring, ElectorInput::Acquired(lease)) => {
                let token = lease.token;
                next.phase = ElectorPhase::Leading { lease, misses: 0 };
                next.backoff = self.config.acquire_interval;
                // Leader is announced before the renewal schedule that keeps it
                next.publish(LeadershipStatus::Leader(token), &mut effects);
                effects.push(ElectorEffect::ScheduleRenew {
                    after: self.config.renew_interval,
                });
            }

            (ElectorPhase::Acquiring, ElectorInput::AcquireFailed(err)) => match err {
                LeaseError::StoreUnavailable(reason) => {
                    next.backoff = (self.backoff * 2)
                        .max(self.config.acquire_interval)
                        .min(self.config.max_backoff.max(self.config.acquire_interval));
                    next.publish(LeadershipStatus::Unknown(reason), &mut effects);
                    effects.push(ElectorEffect::ScheduleAcquire {
                        after: self.backoff,
                        jitter: true,
                    });
                }
                LeaseError::Contended { .. } | LeaseError::LeaseLost => {
                    next.backoff = self.config.acquire_interval;
                    next.publish(LeadershipStatus::Follower, &mut effects);
                    effects.push(ElectorEffect::ScheduleAcquire {
                        after: self.config.acquire_interval,
                        jitter: true,
                    });
                }
            },

            (ElectorPhase::Leading { lease, misses }, ElectorInput::RenewDue) => {
                next.phase = ElectorPhase::Renewing {
                    lease: lease.clone(),
                    misses: *misses,
                };
                effects.push(ElectorEffect::Renew(lease.clone()));
            }

            (ElectorPhase::Renewing { lease: held, .. }, ElectorInput::Renewed(lease)) => {
                if lease.token == held.token && lease.holder == held.holder {
                    next.phase = ElectorPhase::Leading { lease, misses: 0 };
                    effects.push(ElectorEffect::ScheduleRenew {
                        after: self.config.renew_interval,
                    });
                } else {
                    // A renewal never changes the term
                    next.step_down(&mut effects);
                }
            }

            (ElectorPhase::Renewing { lease, misses }, ElectorInput::RenewFailed(err)) => {
                let misses = *misses + 1;
                if err.is_transient() && misses < self.config.max_renew_misses {
                    next.phase = ElectorPhase::Leading {
                        lease: lease.clone(),
                        misses,
                    };
                    effects.push(ElectorEffect::ScheduleRenew {
                        after: self.config.renew_retry_interval,
                    });
                } else {
                    next.step_down(&mut effects);
                }
            }

            (
                ElectorPhase::Leading { .. } | ElectorPhase::Renewing { .. },
                ElectorInput::TermExpired,
            ) => {
                next.step_down(&mut effects);
            }

            (
                ElectorPhase::Leading { lease, .. } | ElectorPhase::Renewing { lease, .. },
                ElectorInput::Stop,
            ) => {
                next.phase = ElectorPhase::SteppingDown {
                    lease: lease.clone(),
                };
                // Follower goes out before the release so the job winds down while the lease is still ours
                next.publish(LeadershipStatus::Follower, &mut effects);
                effects.push(ElectorEffect::Release(lease.clone()));
            }

            (ElectorPhase::Acquiring, ElectorInput::Stop) => {
                next.phase = ElectorPhase::Idle;
                next.publish(LeadershipStatus::Follower, &mut effects);
            }

            (ElectorPhase::SteppingDown { .. }, ElectorInput::Released) => {
                next.phase = ElectorPhase::Idle;
                next.publish(LeadershipStatus::Follower, &mut effects);
            }

            _ => {
                // Input does not apply to this phase, no-op
            }
        }

        (next, effects)
    }

    /// Give up the term and resume campaigning
    fn step_down(&mut self, effects: &mut Vec<ElectorEffect>) {
        self.phase = ElectorPhase::Acquiring;
        self.backoff = self.config.acquire_interval;
        self.publish(LeadershipStatus::Follower, effects);
        effects.push(ElectorEffect::ScheduleAcquire {
            after: self.config.acquire_interval,
            jitter: true,
        });
    }

    fn publish(&mut self, status: LeadershipStatus, effects: &mut Vec<ElectorEffect>) {
        if self.published != status {
            self.published = status.clone();
            effects.push(ElectorEffect::Publish(status));
        }
    }
}

#[cfg(test)]
#[path = "election_tests.rs"]
mod tests;
