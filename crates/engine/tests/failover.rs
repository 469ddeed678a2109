// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Multi-node failover: the job moves, and never runs twice at once

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod common;

use common::{wait_for, Ledger, Node};
use std::time::Duration;
use tenure_adapters::{LeaseStore, MemoryLeaseStore};
use tenure_core::{Clock, FencingToken, HolderId, LeadershipStatus, TokioClock};

fn shared_store() -> MemoryLeaseStore<TokioClock> {
    MemoryLeaseStore::with_clock(TokioClock::new())
}

#[tokio::test(start_paused = true)]
async fn job_runs_on_exactly_one_of_three_nodes() {
    let shared = shared_store();
    let ledger = Ledger::default();

    let a = Node::start("node-a", &shared, &ledger).await;
    let mut a_rx = a.elector.subscribe();
    wait_for(&mut a_rx, |s| s.is_leader()).await;

    let b = Node::start("node-b", &shared, &ledger).await;
    let c = Node::start("node-c", &shared, &ledger).await;
    tokio::time::sleep(Duration::from_secs(60)).await;

    assert_eq!(ledger.max_active(), 1);
    assert_eq!(ledger.runs(), vec![("node-a".to_string(), FencingToken(1))]);
    assert_eq!(b.elector.status(), LeadershipStatus::Follower);
    assert_eq!(c.elector.status(), LeadershipStatus::Follower);

    for node in [a, b, c] {
        node.stop().await;
    }
}

#[tokio::test(start_paused = true)]
async fn graceful_stop_hands_the_job_over_promptly() {
    let shared = shared_store();
    let ledger = Ledger::default();

    let a = Node::start("node-a", &shared, &ledger).await;
    let mut a_rx = a.elector.subscribe();
    wait_for(&mut a_rx, |s| s.is_leader()).await;

    let b = Node::start("node-b", &shared, &ledger).await;
    let mut b_rx = b.elector.subscribe();
    wait_for(&mut b_rx, |s| *s == LeadershipStatus::Follower).await;

    let stopped_at = tokio::time::Instant::now();
    a.stop().await;

    assert_eq!(
        wait_for(&mut b_rx, |s| s.is_leader()).await,
        LeadershipStatus::Leader(FencingToken(2))
    );
    // released, so b does not wait out the ttl
    assert!(stopped_at.elapsed() < Duration::from_secs(9));

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(ledger.max_active(), 1);
    assert_eq!(
        ledger.runs(),
        vec![
            ("node-a".to_string(), FencingToken(1)),
            ("node-b".to_string(), FencingToken(2)),
        ]
    );

    b.stop().await;
}

#[tokio::test(start_paused = true)]
async fn partitioned_leader_steps_down_before_takeover() {
    let shared = shared_store();
    let ledger = Ledger::default();

    let a = Node::start("node-a", &shared, &ledger).await;
    let mut a_rx = a.elector.subscribe();
    wait_for(&mut a_rx, |s| s.is_leader()).await;

    let b = Node::start("node-b", &shared, &ledger).await;
    let mut b_rx = b.elector.subscribe();
    wait_for(&mut b_rx, |s| *s == LeadershipStatus::Follower).await;

    a.store.partition();
    wait_for(&mut a_rx, |s| !s.is_leader()).await;

    // a's job is gone before b can possibly win
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(ledger.active(), 0);
    let row = shared.get("jobX").await.unwrap().unwrap();
    assert_eq!(row.holder, HolderId::new("node-a"));
    assert!(!row.is_expired_at(shared.clock().now()));

    assert_eq!(
        wait_for(&mut b_rx, |s| s.is_leader()).await,
        LeadershipStatus::Leader(FencingToken(2))
    );

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(ledger.max_active(), 1);
    assert_eq!(ledger.runs().last(), Some(&("node-b".to_string(), FencingToken(2))));

    // healing the partition does not give the job back to a
    a.store.heal();
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(a.elector.status(), LeadershipStatus::Follower);
    assert_eq!(ledger.max_active(), 1);

    a.stop().await;
    b.stop().await;
}

#[tokio::test(start_paused = true)]
async fn unreachable_store_reports_unknown_not_follower() {
    let shared = shared_store();
    let ledger = Ledger::default();

    let a = Node::start("node-a", &shared, &ledger).await;
    let mut a_rx = a.elector.subscribe();
    wait_for(&mut a_rx, |s| s.is_leader()).await;

    a.store.partition();
    wait_for(&mut a_rx, |s| *s == LeadershipStatus::Follower).await;
    let status = wait_for(&mut a_rx, |s| matches!(s, LeadershipStatus::Unknown(_))).await;
    assert!(matches!(status, LeadershipStatus::Unknown(reason) if reason.contains("partitioned")));

    // once reachable again, a wins back its own expired lease under a new term
    a.store.heal();
    assert_eq!(
        wait_for(&mut a_rx, |s| s.is_leader()).await,
        LeadershipStatus::Leader(FencingToken(2))
    );

    a.stop().await;
}
