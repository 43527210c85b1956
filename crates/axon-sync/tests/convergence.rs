//! Two-node convergence tests over the in-process loopback transport.
//!
//! Each test wires two memory-backed nodes together and drives outbound
//! sessions between them, checking that stores converge, that busy
//! peers are left alone, and that invalid records from a peer never
//! land.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use axon_core::Period;
use axon_store::{MemoryStore, Store};
use axon_sync::transport::loopback::LoopbackTransport;
use axon_sync::{SessionOutcome, SessionReport, SyncGuard, SyncSession, SyncTransport, MAX_BATCH};
use axon_testkit::Identity;

/// A node reduced to what sync needs: a store, one guard shared by
/// inbound and outbound sessions, and the inbound transport face.
struct TestNode {
    store: Arc<MemoryStore>,
    guard: Arc<SyncGuard>,
    serving: LoopbackTransport<MemoryStore>,
}

impl TestNode {
    fn new(max_batch: u64) -> Self {
        let store = Arc::new(MemoryStore::new());
        let guard = Arc::new(SyncGuard::new());
        let serving = LoopbackTransport::with_guard(Arc::clone(&store), Arc::clone(&guard), max_batch);
        Self {
            store,
            guard,
            serving,
        }
    }

    async fn sync_with(&self, peer: &TestNode) -> SessionReport {
        SyncSession::new(self.store.as_ref(), &self.guard, &peer.serving)
            .run("peer")
            .await
            .expect("session must not error")
    }

    async fn full_hash(&self) -> String {
        self.store.database_hashes().await.unwrap().full
    }
}

fn at(s: &str) -> DateTime<Utc> {
    s.parse().unwrap()
}

#[tokio::test]
async fn empty_node_pulls_everything_from_populated_peer() {
    // S1: A has nothing; B has one message. One session converges them.
    let a = TestNode::new(MAX_BATCH);
    let b = TestNode::new(MAX_BATCH);

    let alice = Identity::from_seed(1);
    let bob = Identity::from_seed(2);
    let m1 = alice.message_to(&[&bob], "happy new year", "2025-12-31T13:37:00+02:00");
    b.store.insert_message(&m1).await.unwrap();

    let report = a.sync_with(&b).await;

    assert_eq!(report.outcome, SessionOutcome::Converged);
    assert_eq!(report.messages_received, 1);
    assert_eq!(
        a.store.list_messages(&Period::unbounded()).await.unwrap(),
        vec![m1]
    );
    assert_eq!(a.full_hash().await, b.full_hash().await);
}

#[tokio::test]
async fn shared_plus_unique_messages_merge_both_ways() {
    // S2: A has {shared, a_only}, B has {shared, b_only}, all in the
    // same week. One A-driven session pulls b_only and pushes a_only.
    let a = TestNode::new(MAX_BATCH);
    let b = TestNode::new(MAX_BATCH);

    let alice = Identity::from_seed(1);
    let bob = Identity::from_seed(2);
    let shared = alice.message_to(&[&bob], "shared", "2025-06-10T09:00:00Z");
    let a_only = alice.message_to(&[&bob], "from a", "2025-06-11T09:00:00Z");
    let b_only = bob.message_to(&[&alice], "from b", "2025-06-12T09:00:00Z");

    a.store.insert_message(&shared).await.unwrap();
    a.store.insert_message(&a_only).await.unwrap();
    b.store.insert_message(&shared).await.unwrap();
    b.store.insert_message(&b_only).await.unwrap();

    let report = a.sync_with(&b).await;

    assert_eq!(report.outcome, SessionOutcome::Converged);
    assert_eq!(report.messages_received, 1);
    assert_eq!(report.messages_pushed, 1);

    for node in [&a, &b] {
        let ids: Vec<_> = node
            .store
            .list_messages(&Period::unbounded())
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(ids.len(), 3);
        assert!(ids.contains(&shared.id));
        assert!(ids.contains(&a_only.id));
        assert!(ids.contains(&b_only.id));
    }
    assert_eq!(a.full_hash().await, b.full_hash().await);
}

#[tokio::test]
async fn drill_down_shards_large_ranges() {
    // S3: 250 messages against a budget of 20. The first round returns
    // only refined hashed sub-ranges; repeated rounds converge.
    let a = TestNode::new(20);
    let b = TestNode::new(20);

    let alice = Identity::from_seed(1);
    let bob = Identity::from_seed(2);
    let base = at("2025-06-09T00:00:00Z");
    for n in 0..250 {
        let message =
            alice.message_to_at(&[&bob], &format!("msg {n}"), base + Duration::minutes(n));
        b.store.insert_message(&message).await.unwrap();
    }

    let report = a.sync_with(&b).await;

    assert_eq!(report.outcome, SessionOutcome::Converged);
    assert!(report.rounds > 1, "expected drill-down, got {report:?}");
    assert_eq!(report.messages_received, 250);
    assert_eq!(
        a.store.count_messages(&Period::unbounded()).await.unwrap(),
        250
    );
    assert_eq!(a.full_hash().await, b.full_hash().await);
}

#[tokio::test]
async fn bulletin_threads_merge_under_shared_root() {
    // S4: both sides hold the same root and two private replies each.
    let a = TestNode::new(MAX_BATCH);
    let b = TestNode::new(MAX_BATCH);

    let alice = Identity::from_seed(1);
    let bob = Identity::from_seed(2);
    let root = alice.bulletin("general", "thread root", None, "2025-06-09T08:00:00Z");
    let ra1 = alice.bulletin("", "reply a1", Some(&root), "2025-06-09T09:00:00Z");
    let ra2 = alice.bulletin("", "reply a2", Some(&root), "2025-06-09T10:00:00Z");
    let rb1 = bob.bulletin("", "reply b1", Some(&root), "2025-06-09T11:00:00Z");
    let rb2 = bob.bulletin("", "reply b2", Some(&root), "2025-06-09T12:00:00Z");

    for bulletin in [&root, &ra1, &ra2] {
        a.store.insert_bulletin(bulletin).await.unwrap();
    }
    for bulletin in [&root, &rb1, &rb2] {
        b.store.insert_bulletin(bulletin).await.unwrap();
    }

    let report = a.sync_with(&b).await;
    assert_eq!(report.outcome, SessionOutcome::Converged);
    assert_eq!(report.bulletins_received, 2);
    assert_eq!(report.bulletins_pushed, 2);

    for node in [&a, &b] {
        let bulletins = node.store.list_bulletins(&Period::unbounded()).await.unwrap();
        assert_eq!(bulletins.len(), 5);
        for bulletin in bulletins.iter().filter(|x| x.id != root.id) {
            assert_eq!(bulletin.parent_id.as_ref(), Some(&root.id));
            assert_eq!(bulletin.topic, root.topic);
        }
    }
    assert_eq!(a.full_hash().await, b.full_hash().await);
}

#[tokio::test]
async fn small_user_ranges_transfer_in_one_round() {
    // S5: the responder ships whole user records alongside the hashed
    // range when the range is small, so one round suffices.
    let a = TestNode::new(MAX_BATCH);
    let b = TestNode::new(MAX_BATCH);

    let carol = Identity::from_seed(3);
    let dave = Identity::from_seed(4);
    b.store
        .insert_user(&carol.user("2025-06-01T00:00:00Z"))
        .await
        .unwrap();
    b.store
        .insert_user(&dave.user("2025-06-02T00:00:00Z"))
        .await
        .unwrap();

    let report = a.sync_with(&b).await;

    assert_eq!(report.outcome, SessionOutcome::Converged);
    assert_eq!(report.rounds, 1);
    assert_eq!(report.users_received, 2);
    assert!(a
        .store
        .get_user(&carol.fingerprint())
        .await
        .unwrap()
        .is_some());
    assert!(a
        .store
        .get_user(&dave.fingerprint())
        .await
        .unwrap()
        .is_some());
    assert_eq!(a.full_hash().await, b.full_hash().await);
}

#[tokio::test]
async fn local_users_are_pushed_to_peer_lacking_them() {
    let a = TestNode::new(MAX_BATCH);
    let b = TestNode::new(MAX_BATCH);

    let carol = Identity::from_seed(3);
    a.store
        .insert_user(&carol.user("2025-06-01T00:00:00Z"))
        .await
        .unwrap();

    let report = a.sync_with(&b).await;

    assert_eq!(report.outcome, SessionOutcome::Converged);
    assert_eq!(report.users_pushed, 1);
    assert!(b
        .store
        .get_user(&carol.fingerprint())
        .await
        .unwrap()
        .is_some());
    assert_eq!(a.full_hash().await, b.full_hash().await);
}

#[tokio::test]
async fn busy_peer_aborts_session_without_side_effects() {
    // S6, outbound view: the peer reports busy mid-session and nothing
    // is transferred.
    let a = TestNode::new(MAX_BATCH);
    let b = TestNode::new(MAX_BATCH);

    let alice = Identity::from_seed(1);
    let bob = Identity::from_seed(2);
    b.store
        .insert_message(&alice.message_to(&[&bob], "hi", "2025-06-10T09:00:00Z"))
        .await
        .unwrap();

    assert!(b.guard.try_begin());
    let report = a.sync_with(&b).await;
    b.guard.end();

    assert_eq!(report.outcome, SessionOutcome::PeerBusy);
    assert_eq!(report.messages_received, 0);
    assert_eq!(
        a.store.count_messages(&Period::unbounded()).await.unwrap(),
        0
    );
}

#[tokio::test]
async fn inbound_round_while_busy_returns_busy_response() {
    // S6, inbound view: a request arriving mid-session gets the busy
    // response and causes no writes.
    let node = TestNode::new(MAX_BATCH);
    assert!(node.guard.try_begin());

    let response = node
        .serving
        .sync("peer", &axon_sync::SyncRequest::default())
        .await
        .unwrap();
    node.guard.end();

    assert!(response.is_busy);
    assert!(response.messages.is_empty());
    assert!(response.users.is_empty());
}

#[tokio::test]
async fn own_session_in_flight_refuses_outbound() {
    let a = TestNode::new(MAX_BATCH);
    let b = TestNode::new(MAX_BATCH);

    let alice = Identity::from_seed(1);
    let bob = Identity::from_seed(2);
    b.store
        .insert_message(&alice.message_to(&[&bob], "hi", "2025-06-10T09:00:00Z"))
        .await
        .unwrap();

    assert!(a.guard.try_begin());
    let report = a.sync_with(&b).await;
    a.guard.end();

    assert_eq!(report.outcome, SessionOutcome::LocalBusy);
    assert_eq!(report.rounds, 0);
}

#[tokio::test]
async fn equal_hashes_short_circuit_with_zero_rounds() {
    // Quiescence: equal full hashes terminate before any drill-down.
    let a = TestNode::new(MAX_BATCH);
    let b = TestNode::new(MAX_BATCH);

    let alice = Identity::from_seed(1);
    let bob = Identity::from_seed(2);
    let shared = alice.message_to(&[&bob], "same", "2025-06-10T09:00:00Z");
    a.store.insert_message(&shared).await.unwrap();
    b.store.insert_message(&shared).await.unwrap();

    let report = a.sync_with(&b).await;
    assert_eq!(report.outcome, SessionOutcome::AlreadyInSync);
    assert_eq!(report.rounds, 0);
    assert_eq!(report.messages_received + report.messages_pushed, 0);
}

#[tokio::test]
async fn convergence_is_stable_across_repeat_sessions() {
    let a = TestNode::new(MAX_BATCH);
    let b = TestNode::new(MAX_BATCH);

    let alice = Identity::from_seed(1);
    let bob = Identity::from_seed(2);
    a.store
        .insert_message(&alice.message_to(&[&bob], "one", "2025-06-10T09:00:00Z"))
        .await
        .unwrap();
    b.store
        .insert_message(&bob.message_to(&[&alice], "two", "2025-06-11T09:00:00Z"))
        .await
        .unwrap();
    b.store
        .insert_user(&bob.user("2025-06-01T00:00:00Z"))
        .await
        .unwrap();

    let first = a.sync_with(&b).await;
    assert_eq!(first.outcome, SessionOutcome::Converged);
    assert_eq!(a.full_hash().await, b.full_hash().await);

    let second = a.sync_with(&b).await;
    assert_eq!(second.outcome, SessionOutcome::AlreadyInSync);

    let third = b.sync_with(&a).await;
    assert_eq!(third.outcome, SessionOutcome::AlreadyInSync);
}

#[tokio::test]
async fn tampered_push_is_rejected_and_nothing_lands() {
    // A forged sender on an otherwise valid envelope must fail the
    // receive path and leave the store untouched.
    let node = TestNode::new(MAX_BATCH);

    let alice = Identity::from_seed(1);
    let bob = Identity::from_seed(2);
    let mallory = Identity::from_seed(5);
    let mut message = alice.message_to(&[&bob], "hi", "2025-06-10T09:00:00Z");
    message.sender = mallory.fingerprint();

    let result = node.serving.push_messages("peer", &[message]).await;
    assert!(result.is_err());
    assert_eq!(
        node.store.count_messages(&Period::unbounded()).await.unwrap(),
        0
    );
}
