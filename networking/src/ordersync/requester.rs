use std::sync::Arc;
use std::time::Duration;

use containers::SignedOrder;
use libp2p_identity::PeerId;
use order_filter::OrderFilter;
use tokio::time::{Instant, timeout};
use tracing::{debug, info, warn};

use super::config::OrdersyncConfig;
use super::error::OrdersyncError;
use super::pagination::contract_for;
use super::protocol::{
    NegotiateRequest, OrdersyncRequest, OrdersyncResponse, PageCursor, PageRequest, PageResponse,
    SubprotocolVersion,
};
use super::states::{OrdersyncSession, SessionState, SharedSession};
use super::store::OrderValidator;
use super::transport::{PeerTransport, TransportError};

/// What one finished session achieved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOutcome {
    pub peer: PeerId,
    pub version: SubprotocolVersion,
    pub pages_fetched: usize,
    pub orders_received: usize,
    pub orders_accepted: usize,
    pub orders_rejected: usize,
    /// Dropped by our own filter before validation.
    pub orders_filtered: usize,
    pub duration: Duration,
}

impl SyncOutcome {
    fn new(peer: PeerId, version: SubprotocolVersion) -> Self {
        Self {
            peer,
            version,
            pages_fetched: 0,
            orders_received: 0,
            orders_accepted: 0,
            orders_rejected: 0,
            orders_filtered: 0,
            duration: Duration::ZERO,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Applied {
    accepted: usize,
    rejected: usize,
}

/// Client side of ordersync: drives one session against one peer.
pub struct OrdersyncRequester {
    config: Arc<OrdersyncConfig>,
    transport: Arc<dyn PeerTransport>,
    validator: Arc<dyn OrderValidator>,
    filter: OrderFilter,
}

impl OrdersyncRequester {
    pub fn new(
        config: Arc<OrdersyncConfig>,
        transport: Arc<dyn PeerTransport>,
        validator: Arc<dyn OrderValidator>,
        filter: OrderFilter,
    ) -> Self {
        Self {
            config,
            transport,
            validator,
            filter,
        }
    }

    pub fn config(&self) -> &OrdersyncConfig {
        &self.config
    }

    /// Runs a standalone session against `peer`.
    pub async fn sync(&self, peer: PeerId) -> Result<SyncOutcome, OrdersyncError> {
        let session = OrdersyncSession::shared(peer);
        self.run(&session).await
    }

    /// Runs the session to `Done`, or leaves it `Failed` on error.
    pub async fn run(&self, session: &SharedSession) -> Result<SyncOutcome, OrdersyncError> {
        let result = self.drive(session).await;
        if let Err(err) = &result {
            let mut session = session.lock();
            warn!(peer = %session.peer_id, %err, "Ordersync session failed");
            session.fail();
        }
        result
    }

    async fn drive(&self, session: &SharedSession) -> Result<SyncOutcome, OrdersyncError> {
        let peer = session.lock().peer_id;
        let started = Instant::now();

        let version = self.negotiate(peer).await?;
        {
            let mut session = session.lock();
            session.version = Some(version);
            session.transition(SessionState::Paging);
        }

        let mut outcome = SyncOutcome::new(peer, version);
        let mut cursor = Some(contract_for(version).first_cursor());
        let mut pending: Option<Vec<SignedOrder>> = None;

        while let Some(current) = cursor.take() {
            if outcome.pages_fetched >= self.config.max_pages_per_session {
                let applied = self.apply(peer, pending.take()).await?;
                absorb(&mut outcome, applied);
                return Err(OrdersyncError::BudgetExceeded {
                    max_pages: self.config.max_pages_per_session,
                });
            }
            session.lock().cursor = Some(current.clone());

            // The previous page is validated while the next one is in flight.
            let (page, applied) =
                tokio::join!(self.fetch_page(peer, current), self.apply(peer, pending.take()));
            absorb(&mut outcome, applied?);
            let page = page?;

            outcome.pages_fetched += 1;
            outcome.orders_received += page.orders.len();
            session.lock().pages_fetched = outcome.pages_fetched;

            if page.orders.is_empty() {
                break;
            }

            let skip_filter =
                self.filter.is_accept_all() || &page.filter_fingerprint == self.filter.fingerprint();
            let (kept, filtered) = self.filter_page(page.orders, skip_filter);
            outcome.orders_filtered += filtered;
            pending = Some(kept);

            if page.complete {
                break;
            }
            cursor = page.next_cursor;
            if cursor.is_none() {
                warn!(peer = %peer, "Provider sent a non-terminal page without a cursor");
            }
        }

        session.lock().transition(SessionState::Draining);
        let applied = self.apply(peer, pending.take()).await?;
        absorb(&mut outcome, applied);
        session.lock().transition(SessionState::Done);

        outcome.duration = started.elapsed();
        info!(
            peer = %peer,
            %version,
            pages = outcome.pages_fetched,
            received = outcome.orders_received,
            accepted = outcome.orders_accepted,
            rejected = outcome.orders_rejected,
            filtered = outcome.orders_filtered,
            duration_ms = outcome.duration.as_millis() as u64,
            "Ordersync session complete"
        );
        Ok(outcome)
    }

    async fn send(
        &self,
        peer: PeerId,
        request: OrdersyncRequest,
    ) -> Result<OrdersyncResponse, TransportError> {
        match timeout(self.config.request_timeout, self.transport.request(peer, request)).await {
            Ok(response) => response,
            Err(_) => Err(TransportError::Timeout),
        }
    }

    async fn negotiate(&self, peer: PeerId) -> Result<SubprotocolVersion, OrdersyncError> {
        let offered = self.config.supported_versions.clone();
        let request = OrdersyncRequest::Negotiate(NegotiateRequest {
            supported_versions: offered.clone(),
            filter_fingerprint: Some(self.filter.fingerprint().clone()),
        });

        let response = match self.send(peer, request).await? {
            OrdersyncResponse::Negotiate(response) => response,
            OrdersyncResponse::Error(message) => {
                return Err(TransportError::Remote(message).into());
            }
            other => {
                return Err(TransportError::UnexpectedResponse(format!("{other:?}")).into());
            }
        };

        match response.version {
            Some(version) if offered.contains(&version) => {
                debug!(
                    peer = %peer,
                    %version,
                    provider_filter = %response.filter_fingerprint,
                    "Negotiated ordersync version"
                );
                Ok(version)
            }
            _ => Err(OrdersyncError::NoCompatibleVersion {
                offered,
                supported: response.supported_versions,
            }),
        }
    }

    async fn fetch_page(
        &self,
        peer: PeerId,
        cursor: PageCursor,
    ) -> Result<PageResponse, OrdersyncError> {
        let version = cursor.version();
        let request = OrdersyncRequest::Page(PageRequest {
            cursor,
            page_size: u32::try_from(self.config.effective_page_size()).unwrap_or(u32::MAX),
            filter_fingerprint: Some(self.filter.fingerprint().clone()),
        });

        let page = match self.send(peer, request).await? {
            OrdersyncResponse::Page(page) => page,
            OrdersyncResponse::Error(message) => {
                return Err(TransportError::Remote(message).into());
            }
            other => {
                return Err(TransportError::UnexpectedResponse(format!("{other:?}")).into());
            }
        };

        if let Some(next) = &page.next_cursor
            && next.version() != version
        {
            return Err(OrdersyncError::Protocol(format!(
                "{version} session received a {} cursor",
                next.version()
            )));
        }

        debug!(peer = %peer, num_orders = page.orders.len(), complete = page.complete, "Received ordersync page");
        Ok(page)
    }

    fn filter_page(&self, orders: Vec<SignedOrder>, skip: bool) -> (Vec<SignedOrder>, usize) {
        if skip {
            return (orders, 0);
        }

        let total = orders.len();
        let kept: Vec<SignedOrder> = orders
            .into_iter()
            .filter(|order| match self.filter.match_order(order) {
                Ok(matches) => matches,
                Err(err) => {
                    warn!(%err, "Order filter evaluation failed, dropping order");
                    false
                }
            })
            .collect();
        let filtered = total - kept.len();
        (kept, filtered)
    }

    async fn apply(
        &self,
        peer: PeerId,
        orders: Option<Vec<SignedOrder>>,
    ) -> Result<Applied, OrdersyncError> {
        let Some(orders) = orders.filter(|orders| !orders.is_empty()) else {
            return Ok(Applied::default());
        };

        let results = self
            .validator
            .validate_and_store_valid_orders(orders, false, self.config.chain_id)
            .await?;

        for rejected in &results.rejected {
            debug!(
                peer = %peer,
                order_hash = %rejected.order_hash,
                code = %rejected.status.code,
                "Order from peer rejected"
            );
        }

        Ok(Applied {
            accepted: results.accepted.len(),
            rejected: results.rejected.len(),
        })
    }
}

fn absorb(outcome: &mut SyncOutcome, applied: Applied) {
    outcome.orders_accepted += applied.accepted;
    outcome.orders_rejected += applied.rejected;
}
