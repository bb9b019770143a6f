use async_trait::async_trait;
use libp2p_identity::PeerId;
use tokio::sync::{mpsc, oneshot};

use crate::ordersync::{OrdersyncRequest, OrdersyncResponse, PeerTransport, TransportError};

pub type ResponseSender = oneshot::Sender<Result<OrdersyncResponse, TransportError>>;

/// A request handed to the swarm task, answered through `reply`.
#[derive(Debug)]
pub struct OutboundRequest {
    pub peer: PeerId,
    pub request: OrdersyncRequest,
    pub reply: ResponseSender,
}

/// [`PeerTransport`] backed by the swarm task's command channel.
#[derive(Debug, Clone)]
pub struct SwarmTransport {
    commands: mpsc::UnboundedSender<OutboundRequest>,
}

impl SwarmTransport {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<OutboundRequest>) {
        let (commands, receiver) = mpsc::unbounded_channel();
        (Self { commands }, receiver)
    }
}

#[async_trait]
impl PeerTransport for SwarmTransport {
    async fn request(
        &self,
        peer: PeerId,
        request: OrdersyncRequest,
    ) -> Result<OrdersyncResponse, TransportError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(OutboundRequest {
                peer,
                request,
                reply,
            })
            .map_err(|_| TransportError::Closed)?;

        response.await.map_err(|_| TransportError::Closed)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ordersync::{NegotiateRequest, SubprotocolVersion};
    use pretty_assertions::assert_eq;

    fn negotiate() -> OrdersyncRequest {
        OrdersyncRequest::Negotiate(NegotiateRequest {
            supported_versions: vec![SubprotocolVersion::V1],
            filter_fingerprint: None,
        })
    }

    #[tokio::test]
    async fn test_request_is_answered_through_the_swarm_task() {
        let (transport, mut commands) = SwarmTransport::channel();
        let peer = PeerId::random();

        tokio::spawn(async move {
            let command = commands.recv().await.unwrap();
            assert_eq!(command.peer, peer);
            let _ = command
                .reply
                .send(Ok(OrdersyncResponse::Error("busy".to_string())));
        });

        assert_eq!(
            transport.request(peer, negotiate()).await,
            Ok(OrdersyncResponse::Error("busy".to_string()))
        );
    }

    #[tokio::test]
    async fn test_stopped_swarm_task_closes_the_transport() {
        let (transport, commands) = SwarmTransport::channel();
        drop(commands);

        assert_eq!(
            transport.request(PeerId::random(), negotiate()).await,
            Err(TransportError::Closed)
        );
    }

    #[tokio::test]
    async fn test_dropped_reply_closes_the_request() {
        let (transport, mut commands) = SwarmTransport::channel();

        tokio::spawn(async move {
            drop(commands.recv().await);
        });

        assert_eq!(
            transport.request(PeerId::random(), negotiate()).await,
            Err(TransportError::Closed)
        );
    }
}
