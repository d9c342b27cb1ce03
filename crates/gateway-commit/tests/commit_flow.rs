//! End-to-end commit confirmation flows over scripted peer streams.

use gateway_commit::testing::{peer, ScriptedConnector, StaticNetworkView};
use gateway_commit::{
    ChannelState, CommitError, CommitHandler, CommitOptions, ConfigError, EventSourceSelector,
    NetworkView, NotificationChannelFactory, QuorumStrategy, RoundRobinSelector, SelectorError,
    ValidationCode,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

struct Fixture {
    connector: Arc<ScriptedConnector>,
    factory: NotificationChannelFactory,
    view: StaticNetworkView,
}

/// Three event-capable peers: a and b in Org1, c in Org2.
fn three_peer_fixture() -> Fixture {
    let connector = ScriptedConnector::new();
    let factory = NotificationChannelFactory::new(connector.clone());
    let view = StaticNetworkView::new()
        .with_org("Org1", &["a", "b"])
        .with_org("Org2", &["c"]);
    Fixture {
        connector,
        factory,
        view,
    }
}

fn tx_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

async fn wait(handler: &CommitHandler) -> Result<(), CommitError> {
    timeout(Duration::from_secs(5), handler.wait_for_completion())
        .await
        .expect("commit wait did not resolve")
}

#[tokio::test]
async fn all_peers_valid_resolves_success_under_every_strategy() {
    type Builder = fn(
        &dyn NetworkView,
        &NotificationChannelFactory,
    ) -> Result<QuorumStrategy, ConfigError>;
    let builders: [Builder; 4] = [
        QuorumStrategy::all_for_network,
        QuorumStrategy::any_for_network,
        QuorumStrategy::all_per_org,
        QuorumStrategy::any_per_org,
    ];

    for build in builders {
        let f = three_peer_fixture();
        let tx = tx_id();
        let strategy = build(&f.view, &f.factory).unwrap();
        let handler = CommitHandler::new(tx.as_str(), strategy, CommitOptions::default());
        handler.start_listening().unwrap();

        for name in ["a", "b", "c"] {
            f.connector.handle_for(name).deliver(&tx, ValidationCode::Valid);
        }
        assert_eq!(wait(&handler).await, Ok(()));
    }
}

#[tokio::test]
async fn peer_rejection_short_circuits_under_every_strategy() {
    type Builder = fn(
        &dyn NetworkView,
        &NotificationChannelFactory,
    ) -> Result<QuorumStrategy, ConfigError>;
    let builders: [Builder; 4] = [
        QuorumStrategy::all_for_network,
        QuorumStrategy::any_for_network,
        QuorumStrategy::all_per_org,
        QuorumStrategy::any_per_org,
    ];

    for build in builders {
        let f = three_peer_fixture();
        let tx = tx_id();
        let strategy = build(&f.view, &f.factory).unwrap();
        let handler = CommitHandler::new(tx.as_str(), strategy, CommitOptions::default());
        handler.start_listening().unwrap();

        // Only b reports, and it reports a deterministic rejection.
        f.connector
            .handle_for("b")
            .deliver(&tx, ValidationCode::MvccReadConflict);

        assert_eq!(
            wait(&handler).await,
            Err(CommitError::PeerRejected {
                peer: "b".to_owned(),
                code: ValidationCode::MvccReadConflict,
            })
        );

        // Late reports from a and c must not change the outcome or panic.
        f.connector.handle_for("a").deliver(&tx, ValidationCode::Valid);
        f.connector.handle_for("c").deliver(&tx, ValidationCode::Valid);
        tokio::task::yield_now().await;
        assert!(matches!(
            wait(&handler).await,
            Err(CommitError::PeerRejected { .. })
        ));
    }
}

#[tokio::test]
async fn any_network_first_valid_wins_and_outcome_is_sticky() {
    let f = three_peer_fixture();
    let tx = tx_id();
    let strategy = QuorumStrategy::any_for_network(&f.view, &f.factory).unwrap();
    let handler = CommitHandler::new(tx.as_str(), strategy, CommitOptions::default());
    handler.start_listening().unwrap();

    f.connector.handle_for("b").deliver(&tx, ValidationCode::Valid);
    assert_eq!(wait(&handler).await, Ok(()));

    // Subsequent error and rejection reports must not disturb the result.
    f.connector.handle_for("a").drop_connection();
    f.connector
        .handle_for("c")
        .deliver(&tx, ValidationCode::EndorsementPolicyFailure);
    tokio::task::yield_now().await;
    assert_eq!(wait(&handler).await, Ok(()));
}

#[tokio::test]
async fn all_network_fails_when_denominator_is_exhausted() {
    let connector = ScriptedConnector::new();
    let factory = NotificationChannelFactory::new(connector.clone());
    let view = StaticNetworkView::new().with_org("Org1", &["a", "b"]);
    let tx = tx_id();

    let strategy = QuorumStrategy::all_for_network(&view, &factory).unwrap();
    let handler = CommitHandler::new(tx.as_str(), strategy, CommitOptions::default());
    handler.start_listening().unwrap();

    connector.handle_for("a").drop_connection();
    connector.handle_for("b").deliver(&tx, ValidationCode::Valid);

    assert_eq!(
        wait(&handler).await,
        Err(CommitError::AllSourcesErrored {
            peers: vec!["a".to_owned()],
        })
    );
}

#[tokio::test]
async fn any_network_fails_once_every_source_errored() {
    let f = three_peer_fixture();
    let tx = tx_id();
    let strategy = QuorumStrategy::any_for_network(&f.view, &f.factory).unwrap();
    let handler = CommitHandler::new(tx.as_str(), strategy, CommitOptions::default());
    handler.start_listening().unwrap();

    for name in ["a", "b", "c"] {
        f.connector.handle_for(name).drop_connection();
    }

    assert_eq!(
        wait(&handler).await,
        Err(CommitError::AllSourcesErrored {
            peers: vec!["a".to_owned(), "b".to_owned(), "c".to_owned()],
        })
    );
}

#[tokio::test(start_paused = true)]
async fn timeout_resolves_and_unregisters_everywhere() {
    let f = three_peer_fixture();
    let tx = tx_id();
    let strategy = QuorumStrategy::all_for_network(&f.view, &f.factory).unwrap();
    let handler = CommitHandler::new(
        tx.as_str(),
        strategy,
        CommitOptions {
            commit_timeout_secs: 1,
        },
    );
    handler.start_listening().unwrap();

    // No peer ever reports; paused time auto-advances past the timer.
    assert_eq!(
        handler.wait_for_completion().await,
        Err(CommitError::Timeout { after_secs: 1 })
    );

    let channels = f.factory.channels_for(&f.view.all_event_peers());
    for channel in channels {
        assert_eq!(channel.registration_count(), 0);
    }
}

#[tokio::test]
async fn cancel_resolves_cancelled_and_is_then_a_noop() {
    let f = three_peer_fixture();
    let tx = tx_id();
    let strategy = QuorumStrategy::all_for_network(&f.view, &f.factory).unwrap();
    let handler = CommitHandler::new(tx.as_str(), strategy, CommitOptions::default());
    handler.start_listening().unwrap();

    handler.cancel_listening();
    assert_eq!(wait(&handler).await, Err(CommitError::Cancelled));

    handler.cancel_listening();
    assert_eq!(wait(&handler).await, Err(CommitError::Cancelled));

    let channels = f.factory.channels_for(&f.view.all_event_peers());
    for channel in channels {
        assert_eq!(channel.registration_count(), 0);
    }
}

#[tokio::test]
async fn completion_is_broadcast_to_every_waiter() {
    let f = three_peer_fixture();
    let tx = tx_id();
    let strategy = QuorumStrategy::any_for_network(&f.view, &f.factory).unwrap();
    let handler = Arc::new(CommitHandler::new(
        tx.as_str(),
        strategy,
        CommitOptions::default(),
    ));
    handler.start_listening().unwrap();

    let waiters: Vec<_> = (0..3)
        .map(|_| {
            let handler = Arc::clone(&handler);
            tokio::spawn(async move { handler.wait_for_completion().await })
        })
        .collect();

    f.connector.handle_for("c").deliver(&tx, ValidationCode::Valid);

    for waiter in waiters {
        assert_eq!(waiter.await.unwrap(), Ok(()));
    }
}

#[tokio::test]
async fn channels_are_shared_across_concurrent_transactions() {
    let f = three_peer_fixture();
    let tx1 = tx_id();
    let tx2 = tx_id();

    let handler1 = CommitHandler::new(
        tx1.as_str(),
        QuorumStrategy::any_for_network(&f.view, &f.factory).unwrap(),
        CommitOptions::default(),
    );
    let handler2 = CommitHandler::new(
        tx2.as_str(),
        QuorumStrategy::any_for_network(&f.view, &f.factory).unwrap(),
        CommitOptions::default(),
    );
    handler1.start_listening().unwrap();
    handler2.start_listening().unwrap();

    // One shared channel set serves both transactions.
    assert_eq!(f.factory.cached_count(), 3);

    let handle = f.connector.handle_for("a");
    handle.deliver(&tx1, ValidationCode::Valid);
    handle.deliver(&tx2, ValidationCode::DuplicateTxid);

    assert_eq!(wait(&handler1).await, Ok(()));
    assert_eq!(
        wait(&handler2).await,
        Err(CommitError::PeerRejected {
            peer: "a".to_owned(),
            code: ValidationCode::DuplicateTxid,
        })
    );
}

#[tokio::test]
async fn dead_channel_at_registration_counts_as_source_error() {
    let connector = ScriptedConnector::new();
    let factory = NotificationChannelFactory::new(connector.clone());
    let view = StaticNetworkView::new().with_org("Org1", &["a", "b"]);
    connector.fail_connect("a");

    let tx = tx_id();
    let strategy = QuorumStrategy::any_for_network(&view, &factory).unwrap();

    // Let the background connect of "a" fail before listening starts.
    let channels = factory.channels_for(&view.all_event_peers());
    for _ in 0..20 {
        if channels[0].state() == ChannelState::Failed {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(channels[0].state(), ChannelState::Failed);

    let handler = CommitHandler::new(tx.as_str(), strategy, CommitOptions::default());
    handler.start_listening().unwrap();

    // ANY still succeeds through the surviving peer.
    connector.handle_for("b").deliver(&tx, ValidationCode::Valid);
    assert_eq!(wait(&handler).await, Ok(()));
}

#[tokio::test]
async fn factory_caches_and_disposes_its_channels() {
    let f = three_peer_fixture();
    let peers = f.view.all_event_peers();

    let first = f.factory.channels_for(&peers);
    let second = f.factory.channels_for(&peers);
    for (a, b) in first.iter().zip(second.iter()) {
        assert!(Arc::ptr_eq(a, b));
    }

    f.factory.dispose().await;
    for channel in first {
        assert_eq!(channel.state(), ChannelState::Closed);
    }
    assert_eq!(f.factory.cached_count(), 0);
}

#[tokio::test]
async fn round_robin_selector_failover() {
    let peers = vec![peer("p1", "Org1"), peer("p2", "Org1"), peer("p3", "Org1")];
    let selector = RoundRobinSelector::new(peers.clone());

    selector.update_availability(&peers[0], false);
    for _ in 0..6 {
        assert_ne!(selector.next_peer().unwrap().name(), "p1");
    }

    selector.update_availability(&peers[1], false);
    selector.update_availability(&peers[2], false);
    assert_eq!(selector.next_peer(), Err(SelectorError::NoAvailablePeers));
}
