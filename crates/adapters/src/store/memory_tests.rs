use super::*;
use tenure_core::FakeClock;

const TTL: Duration = Duration::from_secs(10);

fn store() -> (MemoryLeaseStore<FakeClock>, FakeClock) {
    let clock = FakeClock::new();
    (MemoryLeaseStore::with_clock(clock.clone()), clock)
}

#[tokio::test]
async fn clones_share_the_same_table() {
    let (store, _) = store();
    let other = store.clone();
    let a = HolderId::new("node-a");

    store.upsert_if_expired("jobX", &a, TTL).await.unwrap();
    let err = other
        .upsert_if_expired("jobX", &HolderId::new("node-b"), TTL)
        .await
        .unwrap_err();

    assert!(matches!(err, StoreError::Held { .. }));
    assert_eq!(other.get("jobX").await.unwrap().unwrap().holder, a);
}

#[tokio::test]
async fn expiry_follows_the_clock() {
    let (store, clock) = store();
    store
        .upsert_if_expired("jobX", &HolderId::new("node-a"), TTL)
        .await
        .unwrap();

    clock.advance(Duration::from_secs(10));
    let lease = store
        .upsert_if_expired("jobX", &HolderId::new("node-b"), TTL)
        .await
        .unwrap();

    assert_eq!(lease.token, FencingToken(2));
}

#[tokio::test]
async fn release_then_reacquire() {
    let (store, _) = store();
    let a = HolderId::new("node-a");
    let lease = store.upsert_if_expired("jobX", &a, TTL).await.unwrap();

    store
        .compare_and_swap_expire("jobX", &a, lease.token)
        .await
        .unwrap();
    let again = store.upsert_if_expired("jobX", &a, TTL).await.unwrap();

    assert_eq!(again.token, FencingToken(2));
    assert_eq!(store.snapshot().len(), 1);
}

#[tokio::test]
async fn get_unknown_resource_is_none() {
    let (store, _) = store();
    assert!(store.get("nothing").await.unwrap().is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_upserts_have_exactly_one_winner() {
    let store = MemoryLeaseStore::new();
    let handles: Vec<_> = (0..16)
        .map(|i| {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .upsert_if_expired("jobX", &HolderId::new(format!("node-{i}")), TTL)
                    .await
                    .is_ok()
            })
        })
        .collect();

    let mut winners = 0;
    for handle in handles {
        if handle.await.unwrap() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
}
