use containers::SignedOrder;
use libp2p_identity::PeerId;
use order_filter::OrderFilter;
use pretty_assertions::assert_eq;
use rstest::rstest;

use super::common::{MAKER_AMOUNT_IS_ONE, provider_for, store_with};
use crate::ordersync::{
    NegotiateRequest, OrdersyncProvider, OrdersyncRequest, OrdersyncResponse, PageCursor,
    PageRequest, SubprotocolVersion,
};

fn page_request(cursor: PageCursor, page_size: u32) -> PageRequest {
    PageRequest {
        cursor,
        page_size,
        filter_fingerprint: None,
    }
}

#[rstest]
#[case(vec![SubprotocolVersion::V0, SubprotocolVersion::V1], Some(SubprotocolVersion::V1))]
#[case(vec![SubprotocolVersion::V0], Some(SubprotocolVersion::V0))]
#[case(vec![], None)]
#[tokio::test]
async fn test_negotiation_picks_highest_common_version(
    #[case] offered: Vec<SubprotocolVersion>,
    #[case] expected: Option<SubprotocolVersion>,
) {
    let provider = provider_for(store_with(0).await, &SubprotocolVersion::ALL);

    let response = provider.negotiate(
        PeerId::random(),
        &NegotiateRequest {
            supported_versions: offered,
            filter_fingerprint: None,
        },
    );

    assert_eq!(response.version, expected);
    assert_eq!(response.supported_versions, SubprotocolVersion::ALL.to_vec());
    assert_eq!(&response.filter_fingerprint, OrderFilter::accept_all().fingerprint());
}

#[rstest]
#[case(0, 1)]
#[case(10, 10)]
#[case(10_000, 500)]
#[tokio::test]
async fn test_page_size_is_clamped(#[case] requested: u32, #[case] served: usize) {
    let provider = provider_for(store_with(0).await, &SubprotocolVersion::ALL);
    assert_eq!(provider.effective_page_size(requested), served);
}

#[tokio::test]
async fn test_oversized_request_is_capped_by_the_provider() {
    let store = store_with(12).await;
    let filter = store.filter().clone();
    let provider = OrdersyncProvider::new(store, filter, SubprotocolVersion::ALL.to_vec(), 5);

    let page = provider
        .handle_page(
            PeerId::random(),
            &page_request(PageCursor::Keyset { min_order_hash: None }, 100),
        )
        .await
        .unwrap();

    assert_eq!(page.orders.len(), 5);
    assert!(!page.complete);
}

#[tokio::test]
async fn test_pages_are_never_filtered_by_the_provider() {
    let store = store_with(31).await;
    let provider = OrdersyncProvider::new(
        store,
        OrderFilter::compile(MAKER_AMOUNT_IS_ONE).unwrap(),
        SubprotocolVersion::ALL.to_vec(),
        500,
    );

    let page = provider
        .handle_page(
            PeerId::random(),
            &page_request(PageCursor::Keyset { min_order_hash: None }, 100),
        )
        .await
        .unwrap();

    assert_eq!(page.orders.len(), 31);
    assert!(page.complete);
    assert_eq!(
        &page.filter_fingerprint,
        OrderFilter::compile(MAKER_AMOUNT_IS_ONE).unwrap().fingerprint()
    );
}

#[tokio::test]
async fn test_unsupported_version_is_answered_with_an_error() {
    let provider = provider_for(store_with(3).await, &[SubprotocolVersion::V1]);

    let response = provider
        .handle_request(
            PeerId::random(),
            OrdersyncRequest::Page(page_request(
                PageCursor::Offset {
                    page: 0,
                    snapshot_id: None,
                },
                10,
            )),
        )
        .await;

    assert!(matches!(response, OrdersyncResponse::Error(_)));
}

#[tokio::test]
async fn test_keyset_pages_follow_hash_order() {
    let store = store_with(7).await;
    let provider = provider_for(store.clone(), &SubprotocolVersion::ALL);

    let mut cursor = PageCursor::Keyset { min_order_hash: None };
    let mut received: Vec<SignedOrder> = Vec::new();
    loop {
        let page = provider
            .handle_page(PeerId::random(), &page_request(cursor, 3))
            .await
            .unwrap();
        received.extend(page.orders);
        match page.next_cursor {
            Some(next) => cursor = next,
            None => break,
        }
    }

    let expected: Vec<SignedOrder> = store
        .all_orders()
        .into_iter()
        .map(|info| info.signed_order)
        .collect();
    assert_eq!(received, expected);
}
