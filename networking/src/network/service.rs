use std::{
    collections::HashMap,
    net::IpAddr,
    num::{NonZeroU8, NonZeroUsize},
    sync::Arc,
    sync::atomic::{AtomicU64, Ordering},
};

use anyhow::{Result, anyhow};
use futures::StreamExt;
use libp2p::{
    Multiaddr, SwarmBuilder,
    connection_limits::{self, ConnectionLimits},
    identify,
    multiaddr::Protocol,
    request_response::{
        Event as ReqRespEvent, Message, OutboundFailure, OutboundRequestId, ResponseChannel,
    },
    swarm::{Config, Swarm, SwarmEvent},
};
use libp2p_identity::{Keypair, PeerId};
use metrics::Metrics;
use parking_lot::Mutex;
use tokio::select;
use tokio::sync::mpsc;
use tokio::time::{Duration, MissedTickBehavior, interval};
use tracing::{debug, info, trace, warn};

use crate::{
    bootnodes::{BootnodeSource, StaticBootnodes},
    network::behaviour::{MeshNetworkBehaviour, MeshNetworkBehaviourEvent},
    network::transport::{OutboundRequest, ResponseSender},
    ordersync::{
        OrdersyncCoordinator, OrdersyncProvider, OrdersyncRequest, OrdersyncResponse,
        REQUEST_TIMEOUT_SECS, SubprotocolVersion, TransportError, protocol::protocol_ids,
    },
    req_resp::{self, OrdersyncProtocol, ReqRespMessage},
    types::{ConnectionState, Direction, PeerCount},
};

const RECONNECT_INTERVAL_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct NetworkServiceConfig {
    pub socket_address: IpAddr,
    pub socket_port: u16,
    pub supported_versions: Vec<SubprotocolVersion>,
    pub request_timeout: Duration,
    bootnodes: StaticBootnodes,
}

impl NetworkServiceConfig {
    pub fn new(socket_address: IpAddr, socket_port: u16, bootnodes: Vec<String>) -> Self {
        NetworkServiceConfig {
            socket_address,
            socket_port,
            supported_versions: SubprotocolVersion::ALL.to_vec(),
            request_timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
            bootnodes: StaticBootnodes::from_arguments(&bootnodes),
        }
    }

    pub fn with_supported_versions(mut self, versions: Vec<SubprotocolVersion>) -> Self {
        self.supported_versions = versions;
        self
    }

    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    pub fn bootnodes(&self) -> &StaticBootnodes {
        &self.bootnodes
    }

    pub fn listen_multiaddr(&self) -> Multiaddr {
        let mut addr: Multiaddr = self.socket_address.into();
        addr.push(Protocol::Udp(self.socket_port));
        addr.push(Protocol::QuicV1);
        addr
    }
}

type InboundResponse = (PeerId, ResponseChannel<OrdersyncResponse>, OrdersyncResponse);

/// Drives the libp2p swarm.
///
/// Connection events feed the ordersync coordinator, inbound requests are
/// answered by the provider on spawned tasks, and outbound requests arrive
/// from [`SwarmTransport`](super::SwarmTransport) and are matched to their
/// responses by request id.
pub struct NetworkService {
    network_config: Arc<NetworkServiceConfig>,
    swarm: Swarm<MeshNetworkBehaviour>,
    peer_table: Arc<Mutex<HashMap<PeerId, ConnectionState>>>,
    peer_count: Arc<AtomicU64>,
    provider: OrdersyncProvider,
    coordinator: OrdersyncCoordinator,
    outbound_requests: mpsc::UnboundedReceiver<OutboundRequest>,
    pending_requests: HashMap<OutboundRequestId, (ResponseSender, &'static str)>,
    inbound_responses_tx: mpsc::UnboundedSender<InboundResponse>,
    inbound_responses: mpsc::UnboundedReceiver<InboundResponse>,
    metrics: Option<Arc<Metrics>>,
}

impl NetworkService {
    pub async fn new(
        network_config: Arc<NetworkServiceConfig>,
        provider: OrdersyncProvider,
        coordinator: OrdersyncCoordinator,
        outbound_requests: mpsc::UnboundedReceiver<OutboundRequest>,
        metrics: Option<Arc<Metrics>>,
    ) -> Result<Self> {
        let local_key = Keypair::generate_secp256k1();
        Self::new_with_keypair(
            network_config,
            provider,
            coordinator,
            outbound_requests,
            metrics,
            local_key,
        )
        .await
    }

    pub async fn new_with_keypair(
        network_config: Arc<NetworkServiceConfig>,
        provider: OrdersyncProvider,
        coordinator: OrdersyncCoordinator,
        outbound_requests: mpsc::UnboundedReceiver<OutboundRequest>,
        metrics: Option<Arc<Metrics>>,
        local_key: Keypair,
    ) -> Result<Self> {
        let behaviour = Self::build_behaviour(&local_key, &network_config);

        let config = Config::with_tokio_executor()
            .with_notify_handler_buffer_size(
                NonZeroUsize::new(7).ok_or_else(|| anyhow!("invalid handler buffer size"))?,
            )
            .with_per_connection_event_buffer_size(4)
            .with_dial_concurrency_factor(
                NonZeroU8::new(1).ok_or_else(|| anyhow!("invalid dial concurrency factor"))?,
            );

        let multiaddr = network_config.listen_multiaddr();
        let swarm = SwarmBuilder::with_existing_identity(local_key)
            .with_tokio()
            .with_quic()
            .with_behaviour(|_| behaviour)?
            .with_swarm_config(|_| config)
            .build();

        let (inbound_responses_tx, inbound_responses) = mpsc::unbounded_channel();
        let mut service = Self {
            network_config,
            swarm,
            peer_table: Arc::new(Mutex::new(HashMap::new())),
            peer_count: Arc::new(AtomicU64::new(0)),
            provider,
            coordinator,
            outbound_requests,
            pending_requests: HashMap::new(),
            inbound_responses_tx,
            inbound_responses,
            metrics,
        };

        service.listen(&multiaddr)?;

        Ok(service)
    }

    pub async fn start(&mut self) -> Result<()> {
        // Periodic reconnect attempts to bootnodes
        let mut reconnect_interval = interval(Duration::from_secs(RECONNECT_INTERVAL_SECS));
        reconnect_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            select! {
                _ = reconnect_interval.tick() => {
                    self.connect_to_peers(self.network_config.bootnodes.to_multiaddrs());
                }
                request = self.outbound_requests.recv() => {
                    match request {
                        Some(request) => self.dispatch_outbound_request(request),
                        None => return Err(anyhow!("ordersync transport channel closed")),
                    }
                }
                Some((peer, channel, response)) = self.inbound_responses.recv() => {
                    if self
                        .swarm
                        .behaviour_mut()
                        .req_resp
                        .send_response(channel, response)
                        .is_err()
                    {
                        warn!(peer = %peer, "Failed to send ordersync response, stream closed");
                    }
                }
                event = self.swarm.select_next_some() => {
                    self.handle_swarm_event(event);
                }
            }
        }
    }

    fn handle_swarm_event(&mut self, event: SwarmEvent<MeshNetworkBehaviourEvent>) {
        match event {
            SwarmEvent::Behaviour(MeshNetworkBehaviourEvent::ReqResp(event)) => {
                self.handle_request_response_event(event)
            }
            SwarmEvent::Behaviour(MeshNetworkBehaviourEvent::Identify(event)) => {
                self.handle_identify_event(event)
            }
            SwarmEvent::Behaviour(_) => {
                // ConnectionLimits behaviour has no events
            }
            SwarmEvent::ConnectionEstablished {
                peer_id,
                endpoint,
                num_established,
                ..
            } => {
                let connected = self.set_peer_state(peer_id, ConnectionState::Connected);
                let direction = if endpoint.is_dialer() {
                    Direction::Outbound
                } else {
                    Direction::Inbound
                };
                if let Some(metrics) = &self.metrics {
                    metrics.inc_peer_connection(direction.as_str(), "success");
                }

                info!(peer = %peer_id, direction = direction.as_str(), "Connected to peer (total: {})", connected);

                if num_established.get() == 1 {
                    drop(self.coordinator.on_peer_connected(peer_id));
                }
            }
            SwarmEvent::ConnectionClosed {
                peer_id,
                endpoint,
                num_established,
                cause,
                ..
            } => {
                if num_established > 0 {
                    return;
                }
                let connected = self.set_peer_state(peer_id, ConnectionState::Disconnected);
                if let Some(metrics) = &self.metrics {
                    let direction = if endpoint.is_dialer() {
                        Direction::Outbound
                    } else {
                        Direction::Inbound
                    };
                    let reason = if cause.is_some() { "error" } else { "closed" };
                    metrics.inc_peer_disconnection(direction.as_str(), reason);
                }

                info!(peer = %peer_id, "Disconnected from peer (total: {})", connected);
                self.coordinator.on_peer_disconnected(&peer_id);
            }
            SwarmEvent::IncomingConnection { local_addr, .. } => {
                debug!(?local_addr, "Incoming connection");
            }
            SwarmEvent::Dialing { peer_id, .. } => {
                debug!(?peer_id, "Dialing peer");
            }
            SwarmEvent::OutgoingConnectionError { peer_id, error, .. } => {
                warn!(?peer_id, ?error, "Failed to connect to peer");
                if let Some(peer_id) = peer_id {
                    self.set_peer_state(peer_id, ConnectionState::Disconnected);
                }
                if let Some(metrics) = &self.metrics {
                    metrics.inc_peer_connection(Direction::Outbound.as_str(), "error");
                }
            }
            SwarmEvent::NewListenAddr {
                listener_id,
                address,
            } => {
                info!(?listener_id, ?address, "New listen address");
            }
            SwarmEvent::NewExternalAddrCandidate { address } => {
                debug!(?address, "New external address candidate");
                self.swarm.add_external_address(address);
            }
            _ => {
                trace!(?event, "Unhandled swarm event");
            }
        }
    }

    fn handle_request_response_event(&mut self, event: ReqRespMessage) {
        match event {
            ReqRespEvent::Message { peer, message, .. } => match message {
                Message::Request {
                    request, channel, ..
                } => self.serve_request(peer, request, channel),
                Message::Response {
                    request_id,
                    response,
                } => match self.pending_requests.remove(&request_id) {
                    Some((reply, _)) => {
                        let _ = reply.send(Ok(response));
                    }
                    None => {
                        debug!(peer = %peer, ?request_id, "Response for an abandoned request");
                    }
                },
            },
            ReqRespEvent::OutboundFailure {
                peer,
                request_id,
                error,
                ..
            } => {
                debug!(peer = %peer, ?error, "Ordersync request failed");
                if let Some((reply, protocol)) = self.pending_requests.remove(&request_id) {
                    let _ = reply.send(Err(map_outbound_failure(&error, protocol)));
                }
            }
            ReqRespEvent::InboundFailure { peer, error, .. } => {
                warn!(peer = %peer, ?error, "Inbound ordersync request failed");
            }
            ReqRespEvent::ResponseSent { peer, .. } => {
                trace!(peer = %peer, "Response sent");
            }
        }
    }

    fn serve_request(
        &self,
        peer: PeerId,
        request: OrdersyncRequest,
        channel: ResponseChannel<OrdersyncResponse>,
    ) {
        let kind = match request {
            OrdersyncRequest::Negotiate(_) => "negotiate",
            OrdersyncRequest::Page(_) => "page",
        };
        trace!(peer = %peer, kind, "Received ordersync request");

        let provider = self.provider.clone();
        let responses = self.inbound_responses_tx.clone();
        let metrics = self.metrics.clone();
        tokio::spawn(async move {
            let response = provider.handle_request(peer, request).await;
            if let Some(metrics) = metrics {
                let result = match response {
                    OrdersyncResponse::Error(_) => "error",
                    _ => "ok",
                };
                metrics.inc_requests_served(kind, result);
            }
            let _ = responses.send((peer, channel, response));
        });
    }

    fn dispatch_outbound_request(&mut self, request: OutboundRequest) {
        let OutboundRequest {
            peer,
            request,
            reply,
        } = request;

        let connected = self.peer_table.lock().get(&peer).copied() == Some(ConnectionState::Connected);
        if !connected {
            let _ = reply.send(Err(TransportError::NotConnected));
            return;
        }

        // Each request opens a stream on its own protocol, so page requests
        // reach the handler for their cursor's version.
        let protocol = request.protocol_id();
        trace!(peer = %peer, protocol, "Sending ordersync request");
        let request_id = self.swarm.behaviour_mut().req_resp.send_request_with_protocols(
            &peer,
            request,
            [OrdersyncProtocol(protocol.to_string())],
        );
        self.pending_requests.insert(request_id, (reply, protocol));
    }

    fn handle_identify_event(&mut self, event: identify::Event) {
        match event {
            identify::Event::Received { peer_id, info, .. } => {
                let ordersync_protocols = info
                    .protocols
                    .iter()
                    .filter(|protocol| protocol.as_ref().starts_with("/mesh/ordersync/"))
                    .count();
                info!(
                    peer = %peer_id,
                    agent_version = %info.agent_version,
                    protocol_version = %info.protocol_version,
                    listen_addrs = info.listen_addrs.len(),
                    ordersync_protocols,
                    "Received peer info"
                );
            }
            identify::Event::Sent { peer_id, .. } => {
                trace!(peer = %peer_id, "Sent identify info");
            }
            identify::Event::Pushed { peer_id, .. } => {
                trace!(peer = %peer_id, "Pushed identify update");
            }
            identify::Event::Error { peer_id, error, .. } => {
                warn!(peer = %peer_id, ?error, "Identify error");
            }
        }
    }

    fn connect_to_peers(&mut self, peers: Vec<Multiaddr>) {
        debug!(?peers, "Connecting to bootnodes");
        for peer in peers {
            if let Some(Protocol::P2p(peer_id)) = peer
                .iter()
                .find(|protocol| matches!(protocol, Protocol::P2p(_)))
                && peer_id != self.local_peer_id()
            {
                let current_state = self.peer_table.lock().get(&peer_id).cloned();
                if !matches!(current_state, Some(ConnectionState::Disconnected) | None) {
                    trace!(?peer_id, "Already connected");
                    continue;
                }

                if let Err(err) = self.swarm.dial(peer.clone()) {
                    warn!(?err, "Failed to dial peer");
                    continue;
                }

                info!(peer = %peer_id, "Dialing peer");
                self.peer_table
                    .lock()
                    .insert(peer_id, ConnectionState::Connecting);
            }
        }
    }

    /// Records the new state and returns how many peers are connected.
    fn set_peer_state(&self, peer_id: PeerId, state: ConnectionState) -> u64 {
        let count = {
            let mut table = self.peer_table.lock();
            table.insert(peer_id, state);
            PeerCount::new(&table)
        };
        self.peer_count.store(count.connected, Ordering::Relaxed);
        if let Some(metrics) = &self.metrics {
            metrics.set_peers(count.connected as i64);
        }
        count.connected
    }

    pub fn peer_table(&self) -> Arc<Mutex<HashMap<PeerId, ConnectionState>>> {
        self.peer_table.clone()
    }

    pub fn peer_count(&self) -> Arc<AtomicU64> {
        self.peer_count.clone()
    }

    pub fn local_peer_id(&self) -> PeerId {
        *self.swarm.local_peer_id()
    }

    fn build_behaviour(local_key: &Keypair, cfg: &NetworkServiceConfig) -> MeshNetworkBehaviour {
        let identify = Self::build_identify(local_key);

        let req_resp = req_resp::build(
            protocol_ids(&cfg.supported_versions),
            cfg.request_timeout,
        );

        let connection_limits = connection_limits::Behaviour::new(
            ConnectionLimits::default()
                .with_max_pending_incoming(Some(5))
                .with_max_pending_outgoing(Some(16))
                .with_max_established_per_peer(Some(2)),
        );

        MeshNetworkBehaviour {
            identify,
            req_resp,
            connection_limits,
        }
    }

    fn build_identify(local_key: &Keypair) -> identify::Behaviour {
        let local_public_key = local_key.public();
        let identify_config = identify::Config::new("/mesh/1.0.0".into(), local_public_key)
            .with_agent_version(format!("mesh_node/{}", env!("CARGO_PKG_VERSION")))
            .with_cache_size(0);

        identify::Behaviour::new(identify_config)
    }

    fn listen(&mut self, addr: &Multiaddr) -> Result<()> {
        self.swarm
            .listen_on(addr.clone())
            .map_err(|e| anyhow!("Failed to listen on {addr:?}: {e:?}"))?;
        info!(?addr, "Listening on");
        Ok(())
    }
}

fn map_outbound_failure(error: &OutboundFailure, protocol: &str) -> TransportError {
    match error {
        OutboundFailure::Timeout => TransportError::Timeout,
        OutboundFailure::DialFailure | OutboundFailure::ConnectionClosed => {
            TransportError::NotConnected
        }
        OutboundFailure::UnsupportedProtocols => TransportError::UnsupportedProtocol {
            protocol: protocol.to_string(),
        },
        OutboundFailure::Io(err) => TransportError::Failed(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ordersync::protocol::PAGINATION_PROTOCOL_V1;
    use pretty_assertions::assert_eq;
    use std::io;

    #[test]
    fn test_listen_multiaddr_is_quic() {
        let config = NetworkServiceConfig::new("127.0.0.1".parse().unwrap(), 9000, Vec::new());

        assert_eq!(
            config.listen_multiaddr(),
            "/ip4/127.0.0.1/udp/9000/quic-v1".parse::<Multiaddr>().unwrap()
        );
    }

    #[test]
    fn test_bootnode_arguments_are_parsed() {
        let config = NetworkServiceConfig::new(
            "0.0.0.0".parse().unwrap(),
            9000,
            vec![
                "/ip4/10.0.0.1/udp/9000/quic-v1".to_string(),
                "garbage".to_string(),
            ],
        );

        assert_eq!(config.bootnodes().to_multiaddrs().len(), 1);
        assert_eq!(config.supported_versions, SubprotocolVersion::ALL.to_vec());
    }

    #[test]
    fn test_outbound_failures_map_to_transport_errors() {
        assert_eq!(
            map_outbound_failure(&OutboundFailure::Timeout, PAGINATION_PROTOCOL_V1),
            TransportError::Timeout
        );
        assert_eq!(
            map_outbound_failure(&OutboundFailure::ConnectionClosed, PAGINATION_PROTOCOL_V1),
            TransportError::NotConnected
        );
        assert_eq!(
            map_outbound_failure(&OutboundFailure::UnsupportedProtocols, PAGINATION_PROTOCOL_V1),
            TransportError::UnsupportedProtocol {
                protocol: PAGINATION_PROTOCOL_V1.to_string()
            }
        );
        assert!(matches!(
            map_outbound_failure(&OutboundFailure::Io(io::Error::other("reset")), PAGINATION_PROTOCOL_V1),
            TransportError::Failed(_)
        ));
    }
}
