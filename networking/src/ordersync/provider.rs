use std::sync::Arc;

use libp2p_identity::PeerId;
use order_filter::OrderFilter;
use tracing::{debug, info, warn};

use super::error::OrdersyncError;
use super::pagination::contract_for;
use super::protocol::{
    NegotiateRequest, NegotiateResponse, OrdersyncRequest, OrdersyncResponse, PageRequest,
    PageResponse, SubprotocolVersion,
};
use super::store::OrderQuery;

/// Server side of ordersync.
///
/// Pages are never filtered here. The consumer of a page is the only one
/// that can judge its own interest, so the provider paginates its whole
/// order set and advertises its filter fingerprint alongside.
#[derive(Clone)]
pub struct OrdersyncProvider {
    store: Arc<dyn OrderQuery>,
    filter: OrderFilter,
    supported_versions: Vec<SubprotocolVersion>,
    max_page_size: usize,
}

impl OrdersyncProvider {
    pub fn new(
        store: Arc<dyn OrderQuery>,
        filter: OrderFilter,
        supported_versions: Vec<SubprotocolVersion>,
        max_page_size: usize,
    ) -> Self {
        Self {
            store,
            filter,
            supported_versions,
            max_page_size: max_page_size.max(1),
        }
    }

    pub fn supported_versions(&self) -> &[SubprotocolVersion] {
        &self.supported_versions
    }

    pub fn negotiate(&self, peer: PeerId, request: &NegotiateRequest) -> NegotiateResponse {
        let version =
            SubprotocolVersion::highest_common(&self.supported_versions, &request.supported_versions);

        match version {
            Some(version) => debug!(peer = %peer, %version, "Negotiated ordersync version"),
            None => info!(
                peer = %peer,
                offered = ?request.supported_versions,
                "No compatible ordersync version"
            ),
        }

        NegotiateResponse {
            version,
            supported_versions: self.supported_versions.clone(),
            filter_fingerprint: self.filter.fingerprint().clone(),
        }
    }

    /// Page size that will actually be served for a requested size.
    pub fn effective_page_size(&self, requested: u32) -> usize {
        (requested as usize).clamp(1, self.max_page_size)
    }

    pub async fn handle_page(
        &self,
        peer: PeerId,
        request: &PageRequest,
    ) -> Result<PageResponse, OrdersyncError> {
        let version = request.cursor.version();
        if !self.supported_versions.contains(&version) {
            return Err(OrdersyncError::NoCompatibleVersion {
                offered: vec![version],
                supported: self.supported_versions.clone(),
            });
        }

        let own_fingerprint = self.filter.fingerprint();
        if request.filter_fingerprint.as_ref() == Some(own_fingerprint) {
            debug!(peer = %peer, "Requester shares our filter, serving unfiltered pages");
        }

        let limit = self.effective_page_size(request.page_size);
        let page = contract_for(version)
            .serve(self.store.as_ref(), &request.cursor, limit)
            .await?;

        debug!(
            peer = %peer,
            %version,
            cursor = %request.cursor,
            num_orders = page.orders.len(),
            complete = page.complete,
            "Serving ordersync page"
        );

        Ok(PageResponse {
            orders: page.orders,
            next_cursor: page.next_cursor,
            complete: page.complete,
            filter_fingerprint: own_fingerprint.clone(),
        })
    }

    /// Answers any inbound ordersync request. Failures become an error
    /// response rather than a dropped stream.
    pub async fn handle_request(&self, peer: PeerId, request: OrdersyncRequest) -> OrdersyncResponse {
        match request {
            OrdersyncRequest::Negotiate(request) => {
                OrdersyncResponse::Negotiate(self.negotiate(peer, &request))
            }
            OrdersyncRequest::Page(request) => match self.handle_page(peer, &request).await {
                Ok(response) => OrdersyncResponse::Page(response),
                Err(err) => {
                    warn!(peer = %peer, %err, "Failed to serve ordersync page");
                    OrdersyncResponse::Error(err.to_string())
                }
            },
        }
    }
}
