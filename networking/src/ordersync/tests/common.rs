use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chain::ChainId;
use containers::{Bytes, Order, SignedOrder, U256};
use libp2p_identity::PeerId;
use order_filter::OrderFilter;

use crate::ordersync::protocol::protocol_ids;
use crate::ordersync::{
    MemoryOrderStore, NegotiateResponse, OrderValidator, OrdersyncConfig, OrdersyncProvider,
    OrdersyncRequest, OrdersyncResponse, PageCursor, PageResponse, PeerTransport,
    SubprotocolVersion, TransportError,
};

pub const CHAIN_ID: ChainId = ChainId::GANACHE;

pub const MAKER_AMOUNT_IS_ONE: &str =
    r#"{"properties":{"makerAssetAmount":{"pattern":"^1$","type":"string"}}}"#;

pub fn signed_order(maker_asset_amount: u64) -> SignedOrder {
    SignedOrder::new(
        Order {
            chain_id: CHAIN_ID.get(),
            maker_asset_amount: U256::from(maker_asset_amount),
            taker_asset_amount: U256::from(1_000u64),
            expiration_time_seconds: U256::from(4_000_000_000u64),
            salt: U256::from(maker_asset_amount),
            maker_asset_data: Bytes::from(vec![0xf4, 0x72, 0x61, 0xb0]),
            taker_asset_data: Bytes::from(vec![0x02, 0x57, 0x17, 0x92]),
            ..Order::default()
        },
        Bytes::from(vec![0x1b; 66]),
    )
}

/// Orders with maker amounts `1..=count`.
pub fn orders(count: u64) -> Vec<SignedOrder> {
    (1..=count).map(signed_order).collect()
}

pub fn empty_store(filter: OrderFilter) -> Arc<MemoryOrderStore> {
    Arc::new(MemoryOrderStore::new(CHAIN_ID, 10_000, filter))
}

pub async fn store_with(count: u64) -> Arc<MemoryOrderStore> {
    let store = empty_store(OrderFilter::accept_all());
    store
        .validate_and_store_valid_orders(orders(count), false, CHAIN_ID)
        .await
        .unwrap();
    store
}

pub fn provider_for(
    store: Arc<MemoryOrderStore>,
    versions: &[SubprotocolVersion],
) -> OrdersyncProvider {
    let filter = store.filter().clone();
    OrdersyncProvider::new(store, filter, versions.to_vec(), 500)
}

pub fn config(page_size: usize) -> OrdersyncConfig {
    OrdersyncConfig::new(CHAIN_ID).with_page_size(page_size)
}

/// Routes requests straight into the provider registered for each peer.
///
/// Requests on a protocol the provider does not serve fail the way an
/// unsupported libp2p protocol would.
pub struct LocalTransport {
    providers: HashMap<PeerId, OrdersyncProvider>,
    local_peer: PeerId,
    page_requests: AtomicUsize,
}

impl LocalTransport {
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
            local_peer: PeerId::random(),
            page_requests: AtomicUsize::new(0),
        }
    }

    pub fn with_provider(mut self, peer: PeerId, provider: OrdersyncProvider) -> Self {
        self.providers.insert(peer, provider);
        self
    }

    pub fn page_requests(&self) -> usize {
        self.page_requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PeerTransport for LocalTransport {
    async fn request(
        &self,
        peer: PeerId,
        request: OrdersyncRequest,
    ) -> Result<OrdersyncResponse, TransportError> {
        let provider = self.providers.get(&peer).ok_or(TransportError::NotConnected)?;

        let protocol = request.protocol_id();
        if !protocol_ids(provider.supported_versions()).iter().any(|id| id == protocol) {
            return Err(TransportError::UnsupportedProtocol {
                protocol: protocol.to_string(),
            });
        }
        if matches!(request, OrdersyncRequest::Page(_)) {
            self.page_requests.fetch_add(1, Ordering::SeqCst);
        }

        Ok(provider.handle_request(self.local_peer, request).await)
    }
}

/// Serves the wrapped transport's first `pages` page requests, then fails.
pub struct FlakyTransport {
    inner: LocalTransport,
    pages: usize,
}

impl FlakyTransport {
    pub fn new(inner: LocalTransport, pages: usize) -> Self {
        Self { inner, pages }
    }
}

#[async_trait]
impl PeerTransport for FlakyTransport {
    async fn request(
        &self,
        peer: PeerId,
        request: OrdersyncRequest,
    ) -> Result<OrdersyncResponse, TransportError> {
        if matches!(request, OrdersyncRequest::Page(_)) && self.inner.page_requests() >= self.pages {
            return Err(TransportError::Failed("connection reset by peer".to_string()));
        }
        self.inner.request(peer, request).await
    }
}

/// Never answers.
pub struct HangingTransport;

#[async_trait]
impl PeerTransport for HangingTransport {
    async fn request(
        &self,
        _peer: PeerId,
        _request: OrdersyncRequest,
    ) -> Result<OrdersyncResponse, TransportError> {
        futures::future::pending().await
    }
}

/// A V1 peer that always has one more order and never marks a page complete.
#[derive(Default)]
pub struct EndlessTransport {
    served: AtomicUsize,
}

#[async_trait]
impl PeerTransport for EndlessTransport {
    async fn request(
        &self,
        _peer: PeerId,
        request: OrdersyncRequest,
    ) -> Result<OrdersyncResponse, TransportError> {
        let fingerprint = OrderFilter::accept_all().fingerprint().clone();
        match request {
            OrdersyncRequest::Negotiate(_) => Ok(OrdersyncResponse::Negotiate(NegotiateResponse {
                version: Some(SubprotocolVersion::V1),
                supported_versions: vec![SubprotocolVersion::V1],
                filter_fingerprint: fingerprint,
            })),
            OrdersyncRequest::Page(_) => {
                let n = self.served.fetch_add(1, Ordering::SeqCst) as u64 + 1;
                let order = signed_order(n);
                let next_cursor = PageCursor::Keyset {
                    min_order_hash: Some(order.compute_order_hash()),
                };
                Ok(OrdersyncResponse::Page(PageResponse {
                    orders: vec![order],
                    next_cursor: Some(next_cursor),
                    complete: false,
                    filter_fingerprint: fingerprint,
                }))
            }
        }
    }
}
