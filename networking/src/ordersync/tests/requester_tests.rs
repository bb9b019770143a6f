use std::sync::Arc;

use containers::OrderEventEndState;
use libp2p_identity::PeerId;
use order_filter::OrderFilter;
use pretty_assertions::assert_eq;
use rstest::rstest;

use super::common::{
    CHAIN_ID, EndlessTransport, FlakyTransport, LocalTransport, MAKER_AMOUNT_IS_ONE, config,
    empty_store, orders, provider_for, store_with,
};
use crate::ordersync::{
    MemoryOrderStore, OrderValidator, OrdersyncError, OrdersyncRequester, OrdersyncSession,
    PeerTransport, SessionState, SubprotocolVersion, TransportError,
};

fn requester(
    transport: Arc<dyn PeerTransport>,
    store: Arc<MemoryOrderStore>,
    versions: &[SubprotocolVersion],
    page_size: usize,
) -> OrdersyncRequester {
    let filter = store.filter().clone();
    OrdersyncRequester::new(
        Arc::new(config(page_size).with_supported_versions(versions.to_vec())),
        transport,
        store,
        filter,
    )
}

#[rstest]
#[case(SubprotocolVersion::V0)]
#[case(SubprotocolVersion::V1)]
#[tokio::test]
async fn test_full_sync_adds_every_order(#[case] version: SubprotocolVersion) {
    let provider_peer = PeerId::random();
    let transport = Arc::new(LocalTransport::new().with_provider(
        provider_peer,
        provider_for(store_with(31).await, &SubprotocolVersion::ALL),
    ));
    let local = empty_store(OrderFilter::accept_all());
    let mut events = local.events().subscribe();

    let outcome = requester(transport.clone(), local.clone(), &[version], 10)
        .sync(provider_peer)
        .await
        .unwrap();

    assert_eq!(outcome.version, version);
    assert_eq!(outcome.pages_fetched, 4);
    assert_eq!(outcome.orders_received, 31);
    assert_eq!(outcome.orders_accepted, 31);
    assert_eq!(outcome.orders_filtered, 0);
    assert_eq!(transport.page_requests(), 4);

    let added = events
        .drain()
        .into_iter()
        .filter(|event| event.end_state == OrderEventEndState::Added)
        .count();
    assert_eq!(added, 31);
    assert_eq!(local.len(), 31);
}

#[tokio::test]
async fn test_requester_filters_pages_before_validation() {
    let provider_peer = PeerId::random();
    let transport = Arc::new(LocalTransport::new().with_provider(
        provider_peer,
        provider_for(store_with(31).await, &SubprotocolVersion::ALL),
    ));
    let local = empty_store(OrderFilter::compile(MAKER_AMOUNT_IS_ONE).unwrap());
    let mut events = local.events().subscribe();

    let outcome = requester(transport, local.clone(), &SubprotocolVersion::ALL, 10)
        .sync(provider_peer)
        .await
        .unwrap();

    assert_eq!(outcome.orders_received, 31);
    assert_eq!(outcome.orders_filtered, 30);
    assert_eq!(outcome.orders_accepted, 1);
    assert_eq!(outcome.orders_rejected, 0);

    let batch = events.drain();
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].end_state, OrderEventEndState::Added);
    assert_eq!(local.len(), 1);
}

#[tokio::test]
async fn test_matching_fingerprints_skip_requester_filtering() {
    let filter = OrderFilter::compile(MAKER_AMOUNT_IS_ONE).unwrap();
    let provider_store = empty_store(filter.clone());
    provider_store
        .validate_and_store_valid_orders(orders(31), false, CHAIN_ID)
        .await
        .unwrap();
    let provider_peer = PeerId::random();
    let transport = Arc::new(LocalTransport::new().with_provider(
        provider_peer,
        provider_for(provider_store, &SubprotocolVersion::ALL),
    ));
    let local = empty_store(filter);

    let outcome = requester(transport, local.clone(), &SubprotocolVersion::ALL, 10)
        .sync(provider_peer)
        .await
        .unwrap();

    assert_eq!(outcome.orders_received, 1);
    assert_eq!(outcome.orders_filtered, 0);
    assert_eq!(local.len(), 1);
}

#[rstest]
#[case(&[SubprotocolVersion::V1], &[SubprotocolVersion::V0, SubprotocolVersion::V1], SubprotocolVersion::V1)]
#[case(&[SubprotocolVersion::V0], &[SubprotocolVersion::V0, SubprotocolVersion::V1], SubprotocolVersion::V0)]
#[case(&[SubprotocolVersion::V0, SubprotocolVersion::V1], &[SubprotocolVersion::V0], SubprotocolVersion::V0)]
#[tokio::test]
async fn test_mixed_version_peers_agree_on_a_version(
    #[case] requester_versions: &[SubprotocolVersion],
    #[case] provider_versions: &[SubprotocolVersion],
    #[case] expected: SubprotocolVersion,
) {
    let provider_peer = PeerId::random();
    let transport = Arc::new(LocalTransport::new().with_provider(
        provider_peer,
        provider_for(store_with(12).await, provider_versions),
    ));
    let local = empty_store(OrderFilter::accept_all());

    let outcome = requester(transport, local.clone(), requester_versions, 5)
        .sync(provider_peer)
        .await
        .unwrap();

    assert_eq!(outcome.version, expected);
    assert_eq!(local.len(), 12);
}

#[tokio::test]
async fn test_no_common_version_fails_the_session() {
    let provider_peer = PeerId::random();
    let transport = Arc::new(LocalTransport::new().with_provider(
        provider_peer,
        provider_for(store_with(3).await, &[SubprotocolVersion::V0]),
    ));
    let local = empty_store(OrderFilter::accept_all());
    let requester = requester(transport, local.clone(), &[SubprotocolVersion::V1], 10);
    let session = OrdersyncSession::shared(provider_peer);

    let result = requester.run(&session).await;

    assert!(matches!(result, Err(OrdersyncError::NoCompatibleVersion { .. })));
    assert_eq!(session.lock().state, SessionState::Failed);
    assert!(local.is_empty());
}

#[tokio::test]
async fn test_endless_provider_hits_the_page_budget() {
    let local = empty_store(OrderFilter::accept_all());
    let filter = local.filter().clone();
    let requester = OrdersyncRequester::new(
        Arc::new(config(1).with_max_pages_per_session(5)),
        Arc::new(EndlessTransport::default()),
        local.clone(),
        filter,
    );

    let result = requester.sync(PeerId::random()).await;

    assert!(matches!(result, Err(OrdersyncError::BudgetExceeded { max_pages: 5 })));
    // Pages received before the budget ran out are still applied.
    assert_eq!(local.len(), 5);
}

#[tokio::test]
async fn test_transport_failure_keeps_accepted_orders() {
    let provider_peer = PeerId::random();
    let inner = LocalTransport::new().with_provider(
        provider_peer,
        provider_for(store_with(31).await, &SubprotocolVersion::ALL),
    );
    let transport = Arc::new(FlakyTransport::new(inner, 2));
    let local = empty_store(OrderFilter::accept_all());
    let requester = requester(transport, local.clone(), &SubprotocolVersion::ALL, 10);
    let session = OrdersyncSession::shared(provider_peer);

    let result = requester.run(&session).await;

    assert!(matches!(
        result,
        Err(OrdersyncError::Transport(TransportError::Failed(_)))
    ));
    assert_eq!(session.lock().state, SessionState::Failed);
    assert_eq!(session.lock().pages_fetched, 2);
    // Both pages received before the failure were applied.
    assert_eq!(local.len(), 20);
}

#[tokio::test]
async fn test_unknown_peer_is_a_transport_error() {
    let local = empty_store(OrderFilter::accept_all());
    let requester = requester(
        Arc::new(LocalTransport::new()),
        local,
        &SubprotocolVersion::ALL,
        10,
    );

    let result = requester.sync(PeerId::random()).await;

    assert!(matches!(
        result,
        Err(OrdersyncError::Transport(TransportError::NotConnected))
    ));
}

#[tokio::test]
async fn test_finished_session_reaches_done() {
    let provider_peer = PeerId::random();
    let transport = Arc::new(LocalTransport::new().with_provider(
        provider_peer,
        provider_for(store_with(0).await, &SubprotocolVersion::ALL),
    ));
    let local = empty_store(OrderFilter::accept_all());
    let requester = requester(transport, local, &SubprotocolVersion::ALL, 10);
    let session = OrdersyncSession::shared(provider_peer);

    let outcome = requester.run(&session).await.unwrap();

    assert_eq!(outcome.pages_fetched, 1);
    assert_eq!(outcome.orders_received, 0);
    let session = session.lock();
    assert_eq!(session.state, SessionState::Done);
    assert_eq!(session.version, Some(SubprotocolVersion::V1));
}
