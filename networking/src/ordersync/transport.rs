use async_trait::async_trait;
use libp2p_identity::PeerId;
use thiserror::Error;

use super::protocol::{OrdersyncRequest, OrdersyncResponse};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    #[error("peer is not connected")]
    NotConnected,

    #[error("peer does not support {protocol}")]
    UnsupportedProtocol { protocol: String },

    #[error("request failed: {0}")]
    Failed(String),

    #[error("peer answered with an error: {0}")]
    Remote(String),

    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("network service has shut down")]
    Closed,
}

/// Outbound side of the ordersync wire.
///
/// The protocol id is derived from the request, so a page request is
/// routed to the handler for its cursor's version.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    async fn request(
        &self,
        peer: PeerId,
        request: OrdersyncRequest,
    ) -> Result<OrdersyncResponse, TransportError>;
}
