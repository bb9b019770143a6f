/// Ordersync: pull-based backfill of a node's order set from its peers.
///
/// - **Provider**: answers negotiation and page requests from the local store
/// - **Requester**: drives one session against one peer and hands every page
///   to the order validator
/// - **Coordinator**: one session per peer, session timeouts, backoff and
///   cancellation
/// - **Pagination**: one page contract per subprotocol version
/// - **Events**: fan-out of order state transitions to subscribers
///
/// ## Session lifecycle
///
/// NEGOTIATING -> PAGING -> DRAINING -> DONE, with FAILED reachable from any
/// non-terminal state.
pub mod config;
pub mod error;
pub mod events;
pub mod pagination;
pub mod peer_manager;
pub mod protocol;
pub mod provider;
pub mod requester;
pub mod service;
pub mod states;
pub mod store;
pub mod transport;

pub use config::*;
pub use error::OrdersyncError;
pub use events::{OrderEventFeed, OrderEventSubscription};
pub use pagination::{KeysetPagination, OffsetPagination, PageContract, contract_for};
pub use peer_manager::{Backoff, PeerManager, SyncPeer};
pub use protocol::{
    NegotiateRequest, NegotiateResponse, OrdersyncRequest, OrdersyncResponse, PageCursor,
    PageRequest, PageResponse, SubprotocolVersion,
};
pub use provider::OrdersyncProvider;
pub use requester::{OrdersyncRequester, SyncOutcome};
pub use service::{OrdersyncCoordinator, SyncStats};
pub use states::{OrdersyncSession, SessionState, SharedSession};
pub use store::{MemoryOrderStore, OrderQuery, OrderValidator, StoreError};
pub use transport::{PeerTransport, TransportError};

#[cfg(test)]
mod tests;
