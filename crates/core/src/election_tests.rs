// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::lease::{FencingToken, HolderId};
use chrono::{TimeZone, Utc};
use proptest::prelude::*;

fn test_config() -> ElectorConfig {
    ElectorConfig::new("jobX").with_ttl(Duration::from_secs(9))
}

fn lease(token: u64) -> Lease {
    Lease {
        resource: "jobX".to_string(),
        holder: HolderId::new("node-a"),
        expires_at: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 10).unwrap(),
        token: FencingToken(token),
    }
}

fn machine() -> ElectorMachine {
    ElectorMachine::new(test_config(), LeadershipStatus::Unknown("not started".into()))
}

/// Feed inputs in order, returning the final machine and all effects
fn run(machine: ElectorMachine, inputs: Vec<ElectorInput>) -> (ElectorMachine, Vec<ElectorEffect>) {
    inputs
        .into_iter()
        .fold((machine, Vec::new()), |(m, mut all), input| {
            let (next, effects) = m.transition(input);
            all.extend(effects);
            (next, all)
        })
}

fn leading(token: u64) -> ElectorMachine {
    run(
        machine(),
        vec![ElectorInput::Start, ElectorInput::Acquired(lease(token))],
    )
    .0
}

#[test]
fn start_attempts_acquisition_immediately() {
    let (m, effects) = machine().transition(ElectorInput::Start);

    assert_eq!(m.phase, ElectorPhase::Acquiring);
    assert_eq!(
        effects,
        vec![ElectorEffect::ScheduleAcquire {
            after: Duration::ZERO,
            jitter: false
        }]
    );
}

#[test]
fn acquisition_publishes_leader_before_scheduling_renewal() {
    let (m, _) = machine().transition(ElectorInput::Start);
    let (m, effects) = m.transition(ElectorInput::Acquired(lease(1)));

    assert_eq!(
        m.phase,
        ElectorPhase::Leading {
            lease: lease(1),
            misses: 0
        }
    );
    assert_eq!(
        effects,
        vec![
            ElectorEffect::Publish(LeadershipStatus::Leader(FencingToken(1))),
            ElectorEffect::ScheduleRenew {
                after: Duration::from_secs(3)
            },
        ]
    );
}

#[test]
fn contended_acquisition_publishes_follower_once() {
    let contended = || {
        ElectorInput::AcquireFailed(LeaseError::Contended {
            holder: HolderId::new("node-b"),
        })
    };
    let (m, effects) = run(
        machine(),
        vec![ElectorInput::Start, contended(), contended()],
    );

    assert_eq!(m.phase, ElectorPhase::Acquiring);
    let publishes: Vec<_> = effects
        .iter()
        .filter(|e| matches!(e, ElectorEffect::Publish(_)))
        .collect();
    assert_eq!(
        publishes,
        vec![&ElectorEffect::Publish(LeadershipStatus::Follower)]
    );
    assert_eq!(
        effects.last(),
        Some(&ElectorEffect::ScheduleAcquire {
            after: Duration::from_secs(3),
            jitter: true
        })
    );
}

#[test]
fn unavailable_store_backs_off_exponentially_up_to_cap() {
    let down = || ElectorInput::AcquireFailed(LeaseError::StoreUnavailable("refused".into()));
    let (mut m, _) = machine().transition(ElectorInput::Start);

    let mut delays = Vec::new();
    for _ in 0..5 {
        let (next, effects) = m.transition(down());
        for effect in effects {
            if let ElectorEffect::ScheduleAcquire { after, .. } = effect {
                delays.push(after.as_secs());
            }
        }
        m = next;
    }

    // acquire_interval 3s, max_backoff 18s
    assert_eq!(delays, vec![3, 6, 12, 18, 18]);
    assert_eq!(m.published, LeadershipStatus::Unknown("refused".into()));

    // a definite answer resets the backoff
    let (m, _) = m.transition(ElectorInput::AcquireFailed(LeaseError::Contended {
        holder: HolderId::new("node-b"),
    }));
    assert_eq!(m.backoff, Duration::from_secs(3));
    assert_eq!(m.published, LeadershipStatus::Follower);
}

#[test]
fn renewal_cycle_keeps_leading_without_republishing() {
    let (m, effects) = run(
        leading(1),
        vec![ElectorInput::RenewDue, ElectorInput::Renewed(lease(1))],
    );

    assert_eq!(
        effects,
        vec![
            ElectorEffect::Renew(lease(1)),
            ElectorEffect::ScheduleRenew {
                after: Duration::from_secs(3)
            },
        ]
    );
    assert!(matches!(m.phase, ElectorPhase::Leading { misses: 0, .. }));
}

#[test]
fn lease_lost_steps_down_immediately() {
    let (m, effects) = run(
        leading(2),
        vec![
            ElectorInput::RenewDue,
            ElectorInput::RenewFailed(LeaseError::LeaseLost),
        ],
    );

    assert_eq!(m.phase, ElectorPhase::Acquiring);
    assert_eq!(m.published, LeadershipStatus::Follower);
    assert_eq!(
        &effects[1..],
        &[
            ElectorEffect::Publish(LeadershipStatus::Follower),
            ElectorEffect::ScheduleAcquire {
                after: Duration::from_secs(3),
                jitter: true
            },
        ]
    );
}

#[test]
fn single_unanswered_renewal_is_retried_sooner() {
    let (m, effects) = run(
        leading(1),
        vec![
            ElectorInput::RenewDue,
            ElectorInput::RenewFailed(LeaseError::StoreUnavailable("timeout".into())),
        ],
    );

    assert!(matches!(m.phase, ElectorPhase::Leading { misses: 1, .. }));
    assert_eq!(m.published, LeadershipStatus::Leader(FencingToken(1)));
    assert_eq!(
        effects.last(),
        Some(&ElectorEffect::ScheduleRenew {
            after: Duration::from_millis(1500)
        })
    );
}

#[test]
fn two_unanswered_renewals_force_follower() {
    let timeout = || ElectorInput::RenewFailed(LeaseError::StoreUnavailable("timeout".into()));
    let (m, effects) = run(
        leading(1),
        vec![
            ElectorInput::RenewDue,
            timeout(),
            ElectorInput::RenewDue,
            timeout(),
        ],
    );

    assert_eq!(m.phase, ElectorPhase::Acquiring);
    assert!(effects.contains(&ElectorEffect::Publish(LeadershipStatus::Follower)));
}

#[test]
fn successful_renewal_resets_miss_count() {
    let timeout = || ElectorInput::RenewFailed(LeaseError::StoreUnavailable("timeout".into()));
    let (m, _) = run(
        leading(1),
        vec![
            ElectorInput::RenewDue,
            timeout(),
            ElectorInput::RenewDue,
            ElectorInput::Renewed(lease(1)),
            ElectorInput::RenewDue,
            timeout(),
        ],
    );

    assert!(matches!(m.phase, ElectorPhase::Leading { misses: 1, .. }));
}

#[test]
fn stop_while_leading_publishes_follower_then_releases() {
    let (m, effects) = leading(3).transition(ElectorInput::Stop);

    assert_eq!(m.phase, ElectorPhase::SteppingDown { lease: lease(3) });
    assert_eq!(
        effects,
        vec![
            ElectorEffect::Publish(LeadershipStatus::Follower),
            ElectorEffect::Release(lease(3)),
        ]
    );

    let (m, effects) = m.transition(ElectorInput::Released);
    assert!(m.is_idle());
    assert!(effects.is_empty());
}

#[test]
fn stop_while_acquiring_goes_idle() {
    let (m, effects) = run(machine(), vec![ElectorInput::Start, ElectorInput::Stop]);

    assert!(m.is_idle());
    assert_eq!(
        effects.last(),
        Some(&ElectorEffect::Publish(LeadershipStatus::Follower))
    );
}

#[test]
fn inputs_for_other_phases_are_ignored() {
    let (m, effects) = machine().transition(ElectorInput::RenewDue);
    assert!(m.is_idle());
    assert!(effects.is_empty());

    let (m, effects) = leading(1).transition(ElectorInput::Acquired(lease(9)));
    assert_eq!(m.phase.lease(), Some(&lease(1)));
    assert!(effects.is_empty());
}

fn arb_input() -> impl Strategy<Value = ElectorInput> {
    prop_oneof![
        Just(ElectorInput::Start),
        (1u64..5).prop_map(|t| ElectorInput::Acquired(lease(t))),
        Just(ElectorInput::AcquireFailed(LeaseError::Contended {
            holder: HolderId::new("node-b")
        })),
        Just(ElectorInput::AcquireFailed(LeaseError::StoreUnavailable(
            "down".into()
        ))),
        Just(ElectorInput::RenewDue),
        (1u64..5).prop_map(|t| ElectorInput::Renewed(lease(t))),
        Just(ElectorInput::RenewFailed(LeaseError::LeaseLost)),
        Just(ElectorInput::RenewFailed(LeaseError::StoreUnavailable(
            "down".into()
        ))),
        Just(ElectorInput::TermExpired),
        Just(ElectorInput::Stop),
        Just(ElectorInput::Released),
    ]
}

proptest! {
    #[test]
    fn published_statuses_never_repeat(inputs in proptest::collection::vec(arb_input(), 0..60)) {
        let start = machine();
        let mut last = start.published.clone();
        let (_, effects) = run(start, inputs);

        for effect in effects {
            if let ElectorEffect::Publish(status) = effect {
                prop_assert_ne!(&status, &last);
                last = status;
            }
        }
    }

    #[test]
    fn leader_is_published_only_with_a_held_lease(inputs in proptest::collection::vec(arb_input(), 0..60)) {
        let mut m = machine();
        for input in inputs {
            let (next, _) = m.transition(input);
            m = next;
            if m.published.is_leader() {
                let held = m.phase.lease().map(|l| l.token);
                prop_assert_eq!(m.published.token(), held);
                prop_assert!(!matches!(m.phase, ElectorPhase::SteppingDown { .. }), "leader must not be in SteppingDown phase");
            }
        }
    }
}

#[test]
fn renewal_reporting_a_different_term_steps_down() {
    let (m, effects) = run(
        leading(1),
        vec![ElectorInput::RenewDue, ElectorInput::Renewed(lease(2))],
    );

    assert_eq!(m.phase, ElectorPhase::Acquiring);
    assert!(effects.contains(&ElectorEffect::Publish(LeadershipStatus::Follower)));
}

#[test]
fn expired_term_steps_down_even_with_a_renewal_in_flight() {
    let (renewing, effects) = leading(4).transition(ElectorInput::RenewDue);
    assert_eq!(effects, vec![ElectorEffect::Renew(lease(4))]);

    let (m, effects) = renewing.transition(ElectorInput::TermExpired);

    assert_eq!(m.phase, ElectorPhase::Acquiring);
    assert_eq!(m.published, LeadershipStatus::Follower);
    assert_eq!(
        effects,
        vec![
            ElectorEffect::Publish(LeadershipStatus::Follower),
            ElectorEffect::ScheduleAcquire {
                after: test_config().acquire_interval,
                jitter: true,
            },
        ]
    );

    // a late answer for the abandoned renewal is ignored
    let (m, effects) = m.transition(ElectorInput::Renewed(lease(4)));
    assert_eq!(m.phase, ElectorPhase::Acquiring);
    assert!(effects.is_empty());
}

#[test]
fn expired_term_is_ignored_when_not_leading() {
    let (m, _) = machine().transition(ElectorInput::Start);
    let (m, effects) = m.transition(ElectorInput::TermExpired);
    assert_eq!(m.phase, ElectorPhase::Acquiring);
    assert!(effects.is_empty());
}
