//! End-to-end session behaviour: baseline, live fan-out, post creation

use chorus_core::{
    ActionKind, ClientConfig, ConnectionState, FeedError, PostDraft, RemoteError,
    ViewerEngagement,
};
use chorus_feed::{ChannelEvent, FeedSession};
use chorus_testkit::{
    entry, entry_with, ids, init_test_tracing, InMemoryRelay, MockOutcome, MockRemote,
    RelayTransport,
};
use std::sync::Arc;
use std::time::Duration;

type Session = FeedSession<MockRemote, RelayTransport>;

fn config() -> ClientConfig {
    let mut config = ClientConfig::default();
    config.reconnect.base_delay_ms = 50;
    config.reconnect.max_delay_ms = 500;
    config.publish_ack_timeout_ms = 2_000;
    config
}

fn session(user: &str, remote: &Arc<MockRemote>, relay: &InMemoryRelay) -> Session {
    FeedSession::new(user, config(), Arc::clone(remote), Arc::new(relay.transport(user))).unwrap()
}

async fn connected(session: &Session) {
    let mut states = session.channel().watch_state();
    tokio::time::timeout(
        Duration::from_secs(30),
        states.wait_for(|s| *s == ConnectionState::Connected),
    )
    .await
    .unwrap()
    .unwrap();
}

async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}

#[tokio::test(start_paused = true)]
async fn init_loads_baseline_and_seeds_engagements() {
    init_test_tracing();
    let liked = ViewerEngagement {
        is_liked: true,
        ..ViewerEngagement::default()
    };
    let remote =
        Arc::new(MockRemote::new("alice").with_feed(vec![entry_with("2", liked), entry("1")]));
    let relay = InMemoryRelay::new();
    let alice = session("alice", &remote, &relay);

    alice.init().await.unwrap();
    assert_eq!(ids(&alice.snapshot()), ["2", "1"]);
    assert!(alice.engagement("2", ActionKind::Like).applied);
    assert!(!alice.engagement("1", ActionKind::Like).applied);

    connected(&alice).await;
    alice.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn init_twice_is_invalid_and_failed_init_can_retry() {
    let remote = Arc::new(MockRemote::new("alice"));
    remote.push_fetch(MockOutcome::Fail(RemoteError::Transport("offline".into())));
    let relay = InMemoryRelay::new();
    let alice = session("alice", &remote, &relay);

    assert!(matches!(alice.init().await, Err(FeedError::NetworkFailure { .. })));
    alice.init().await.unwrap();
    assert!(matches!(alice.init().await, Err(FeedError::Invalid { .. })));
    alice.shutdown().await;
}

#[tokio::test]
async fn blank_user_is_rejected() {
    let remote = Arc::new(MockRemote::default());
    let relay = InMemoryRelay::new();
    let result = FeedSession::new(" ", config(), remote, Arc::new(relay.transport("x")));
    assert!(matches!(result, Err(FeedError::Invalid { .. })));
}

#[tokio::test(start_paused = true)]
async fn http_post_is_committed_locally_and_fanned_out_to_peers() {
    let relay = InMemoryRelay::new();
    let alice_remote = Arc::new(MockRemote::new("alice").with_feed(vec![entry("1")]));
    let bob_remote = Arc::new(MockRemote::new("bob").with_feed(vec![entry("1")]));
    let alice = session("alice", &alice_remote, &relay);
    let bob = session("bob", &bob_remote, &relay);
    alice.init().await.unwrap();
    bob.init().await.unwrap();
    connected(&alice).await;
    connected(&bob).await;

    alice.composer().set_content("hello bob");
    let post = alice.composer().submit().await.unwrap();
    assert_eq!(alice.composer().draft(), PostDraft::default());
    assert_eq!(ids(&alice.snapshot()), [post.id.to_string(), "1".to_string()]);

    eventually(|| bob.snapshot().first() == Some(&post)).await;
    assert_eq!(bob.snapshot().len(), 2);

    alice.shutdown().await;
    bob.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn channel_publish_commits_exactly_once() {
    let relay = InMemoryRelay::new();
    let remote = Arc::new(MockRemote::new("alice"));
    let alice = session("alice", &remote, &relay);
    alice.init().await.unwrap();
    connected(&alice).await;

    alice.composer().set_content("over the wire");
    let post = alice.composer().submit_over_channel().await.unwrap();
    assert_eq!(remote.create_count(), 0);

    // The session pump sees the same Created event; it must not duplicate.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(alice.snapshot(), vec![post]);
    alice.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn disconnected_channel_falls_back_to_http() {
    let relay = InMemoryRelay::new();
    relay.set_available(false);
    let remote = Arc::new(MockRemote::new("alice"));
    let alice = session("alice", &remote, &relay);
    alice.init().await.unwrap();

    alice.composer().set_content("fallback");
    let post = alice.composer().submit_over_channel().await.unwrap();
    assert_eq!(remote.create_count(), 1);
    assert_eq!(alice.snapshot(), vec![post]);
    alice.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn refused_publish_keeps_the_draft() {
    let relay = InMemoryRelay::new();
    let remote = Arc::new(MockRemote::new("alice"));
    let alice = session("alice", &remote, &relay);
    alice.init().await.unwrap();
    connected(&alice).await;

    relay.reject_next("rate limited");
    alice.composer().set_content("try again later");
    let err = alice.composer().submit_over_channel().await.unwrap_err();
    assert_eq!(err, FeedError::rejected("rate limited"));
    assert_eq!(alice.composer().draft(), PostDraft::text("try again later"));
    assert!(alice.snapshot().is_empty());
    alice.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn unanswered_publish_times_out_and_keeps_the_draft() {
    let relay = InMemoryRelay::new();
    let remote = Arc::new(MockRemote::new("alice"));
    let alice = session("alice", &remote, &relay);
    alice.init().await.unwrap();
    connected(&alice).await;

    relay.hold_acks(true);
    alice.composer().set_content("into the void");
    let err = alice.composer().submit_over_channel().await.unwrap_err();
    assert!(matches!(err, FeedError::NetworkFailure { .. }));
    assert_eq!(alice.composer().draft(), PostDraft::text("into the void"));
    assert!(!alice.channel().awaiting_ack());

    // The abandoned publish is not failed a second time when the link drops.
    let mut events = alice.channel().subscribe();
    relay.drop_all();
    eventually(|| relay.connect_count() == 2).await;
    while let Ok(event) = events.try_recv() {
        assert!(
            !matches!(event, ChannelEvent::CreationFailed(_)),
            "unexpected {event:?}"
        );
    }
    assert!(alice.snapshot().is_empty());
    alice.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn overlapping_channel_submissions_each_get_their_own_outcome() {
    let relay = InMemoryRelay::new();
    let remote = Arc::new(MockRemote::new("alice"));
    let alice = session("alice", &remote, &relay);
    alice.init().await.unwrap();
    connected(&alice).await;

    let composer = alice.composer();
    composer.set_content("first");
    let first = composer.submit_over_channel();
    tokio::pin!(first);
    assert!(futures::poll!(first.as_mut()).is_pending());

    composer.set_content("second");
    let err = composer.submit_over_channel().await.unwrap_err();
    assert!(matches!(err, FeedError::Busy { .. }));
    assert_eq!(composer.draft(), PostDraft::text("second"));

    let post = first.await.unwrap();
    assert_eq!(post.content, "first");
    assert_eq!(relay.received().len(), 1);
    assert_eq!(remote.create_count(), 0);
    eventually(|| alice.snapshot() == vec![post.clone()]).await;

    let second = composer.submit_over_channel().await.unwrap();
    assert_eq!(second.content, "second");
    eventually(|| alice.snapshot().len() == 2).await;
    alice.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn hung_http_create_times_out_and_keeps_the_draft() {
    let relay = InMemoryRelay::new();
    relay.set_available(false);
    let remote = Arc::new(MockRemote::new("alice"));
    remote.push_create(MockOutcome::Hang);
    let alice = session("alice", &remote, &relay);
    alice.init().await.unwrap();

    alice.composer().set_content("stuck");
    let err = alice.composer().submit().await.unwrap_err();
    assert_eq!(
        err,
        FeedError::from(RemoteError::Timeout {
            timeout_ms: config().request_timeout_ms
        })
    );
    assert!(matches!(err, FeedError::NetworkFailure { .. }));
    assert_eq!(alice.composer().draft(), PostDraft::text("stuck"));
    assert!(alice.snapshot().is_empty());
    assert_eq!(remote.create_count(), 1);
    alice.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn refresh_reseeds_but_keeps_pending_keys() {
    let remote = Arc::new(MockRemote::new("alice").with_feed(vec![entry("1")]));
    let relay = InMemoryRelay::new();
    let alice = session("alice", &remote, &relay);
    alice.init().await.unwrap();

    let in_flight = alice.begin_toggle("1", ActionKind::Save).unwrap();
    remote.set_feed(vec![entry("2"), entry("1")]);
    assert_eq!(alice.refresh().await.unwrap(), 2);
    assert_eq!(ids(&alice.snapshot()), ["2", "1"]);

    let saved = alice.engagement("1", ActionKind::Save);
    assert!(saved.applied && saved.pending);
    assert!(in_flight.resolve().await.unwrap());
    alice.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn session_toggles_use_the_signed_in_user() {
    let remote = Arc::new(MockRemote::new("alice").with_feed(vec![entry("1")]));
    let relay = InMemoryRelay::new();
    let alice = session("alice", &remote, &relay);
    alice.init().await.unwrap();

    remote.fail_next_engagement();
    assert!(alice.toggle("1", ActionKind::Like).await.is_err());
    assert!(!alice.engagement("1", ActionKind::Like).applied);
    assert!(alice.toggle("1", ActionKind::Like).await.unwrap());
    alice.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn shutdown_is_idempotent_and_disconnects() {
    let remote = Arc::new(MockRemote::new("alice"));
    let relay = InMemoryRelay::new();
    let alice = session("alice", &remote, &relay);
    alice.init().await.unwrap();
    connected(&alice).await;

    alice.shutdown().await;
    alice.shutdown().await;
    assert_eq!(alice.connection_state(), ConnectionState::Disconnected);
    assert!(matches!(alice.refresh().await, Err(FeedError::Invalid { .. })));
    eventually(|| relay.link_count() == 0).await;
}
