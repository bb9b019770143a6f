use std::sync::Arc;
use std::time::Duration;

use libp2p_identity::PeerId;
use metrics::Metrics;
use order_filter::OrderFilter;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout};
use tracing::{debug, info};

use super::config::OrdersyncConfig;
use super::error::OrdersyncError;
use super::peer_manager::{Backoff, PeerManager, SessionTicket};
use super::requester::{OrdersyncRequester, SyncOutcome};
use super::states::SessionState;
use super::store::OrderValidator;
use super::transport::PeerTransport;
use crate::types::ConnectionState;

/// Counters reported by [`OrdersyncCoordinator::stats`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncStats {
    pub connected_peers: usize,
    pub active_sessions: usize,
    pub sessions_completed: u64,
    pub sessions_failed: u64,
    pub sessions_skipped: u64,
    pub orders_accepted: u64,
    pub orders_rejected: u64,
    pub orders_filtered: u64,
}

struct Inner {
    requester: OrdersyncRequester,
    peers: Mutex<PeerManager>,
    stats: Mutex<SyncStats>,
    shutdown: watch::Sender<bool>,
    session_timeout: Duration,
    metrics: Option<Arc<Metrics>>,
}

/// Owns the session registry and launches one requester run per peer.
///
/// Cloning is cheap; all clones share the same registry.
#[derive(Clone)]
pub struct OrdersyncCoordinator {
    inner: Arc<Inner>,
}

impl OrdersyncCoordinator {
    pub fn new(
        config: OrdersyncConfig,
        transport: Arc<dyn PeerTransport>,
        validator: Arc<dyn OrderValidator>,
        filter: OrderFilter,
        metrics: Option<Arc<Metrics>>,
    ) -> Self {
        let backoff = Backoff::new(config.backoff_base, config.backoff_max);
        let session_timeout = config.session_timeout;
        let (shutdown, _) = watch::channel(false);

        Self {
            inner: Arc::new(Inner {
                requester: OrdersyncRequester::new(Arc::new(config), transport, validator, filter),
                peers: Mutex::new(PeerManager::new(backoff)),
                stats: Mutex::new(SyncStats::default()),
                shutdown,
                session_timeout,
                metrics,
            }),
        }
    }

    pub fn config(&self) -> &OrdersyncConfig {
        self.inner.requester.config()
    }

    /// Registers the peer and starts syncing from it in the background.
    ///
    /// If the session fails, the task moves on to another connected peer
    /// that has not been synced yet.
    pub fn on_peer_connected(&self, peer: PeerId) -> JoinHandle<()> {
        {
            let mut peers = self.inner.peers.lock();
            peers.add_peer(peer, ConnectionState::Connected);
            self.record_registry(&peers);
        }
        info!(peer = %peer, "Peer added to ordersync");

        let coordinator = self.clone();
        tokio::spawn(async move { coordinator.sync_with_fallback(peer).await })
    }

    /// Cancels a running session against the peer.
    ///
    /// The peer's backoff outlives the connection, so a peer that failed and
    /// redials is not synced again before its backoff expires.
    pub fn on_peer_disconnected(&self, peer: &PeerId) {
        let mut peers = self.inner.peers.lock();
        if let Some(had_session) = peers.disconnect_peer(peer, Instant::now()) {
            info!(peer = %peer, had_session, "Peer disconnected from ordersync");
        }
        self.record_registry(&peers);
    }

    /// Runs one session against `peer` unless it already has one or is
    /// backing off, in which case the trigger is skipped.
    pub async fn sync_peer(&self, peer: PeerId) -> Result<SyncOutcome, OrdersyncError> {
        if self.is_shutting_down() {
            return Err(OrdersyncError::Cancelled);
        }

        let ticket = {
            let mut peers = self.inner.peers.lock();
            let ticket = peers.begin_session(peer, Instant::now());
            self.record_registry(&peers);
            ticket
        };
        let ticket = match ticket {
            Ok(ticket) => ticket,
            Err(err) => {
                debug!(peer = %peer, %err, "Skipping ordersync trigger");
                self.inner.stats.lock().sessions_skipped += 1;
                if let Some(metrics) = &self.inner.metrics {
                    metrics.inc_sessions(err.label());
                }
                return Err(err);
            }
        };

        debug!(peer = %peer, session = ticket.id, "Starting ordersync session");
        let id = ticket.id;
        let session = ticket.session.clone();
        let result = self.run_session(ticket).await;

        if result.is_err() {
            session.lock().fail();
        }

        {
            let mut peers = self.inner.peers.lock();
            let (success, penalize) = match &result {
                Ok(_) => (true, false),
                Err(err) => (false, err.penalizes_peer()),
            };
            peers.end_session(&peer, id, success, penalize, Instant::now());
            self.record_registry(&peers);
        }
        self.record_result(&peer, &result);

        result
    }

    /// Cancels every running session and refuses new ones.
    pub fn shutdown(&self) {
        info!("Shutting down ordersync");
        self.inner.shutdown.send_replace(true);
        self.inner.peers.lock().cancel_all();
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.inner.shutdown.borrow()
    }

    pub fn active_sessions(&self) -> Vec<(PeerId, SessionState)> {
        self.inner.peers.lock().active_sessions()
    }

    pub fn stats(&self) -> SyncStats {
        let (connected_peers, active_sessions) = {
            let peers = self.inner.peers.lock();
            (peers.connected_peers(), peers.active_sessions().len())
        };
        SyncStats {
            connected_peers,
            active_sessions,
            ..self.inner.stats.lock().clone()
        }
    }

    /// Remaining backoff for `peer`, if it is currently backing off.
    pub fn backoff_remaining(&self, peer: &PeerId) -> Option<Duration> {
        self.inner
            .peers
            .lock()
            .get_peer(peer)
            .and_then(|sync_peer| sync_peer.backoff_remaining(Instant::now()))
    }

    async fn run_session(&self, ticket: SessionTicket) -> Result<SyncOutcome, OrdersyncError> {
        let SessionTicket {
            session,
            mut cancelled,
            ..
        } = ticket;
        let mut shutdown = self.inner.shutdown.subscribe();
        let session_timeout = self.inner.session_timeout;

        tokio::select! {
            result = timeout(session_timeout, self.inner.requester.run(&session)) => {
                result.unwrap_or(Err(OrdersyncError::SessionTimeout(session_timeout)))
            }
            _ = wait_for_cancel(&mut cancelled) => Err(OrdersyncError::Cancelled),
            _ = wait_for_cancel(&mut shutdown) => Err(OrdersyncError::Cancelled),
        }
    }

    async fn sync_with_fallback(&self, first: PeerId) {
        let mut peer = first;
        loop {
            let err = match self.sync_peer(peer).await {
                Ok(_) => return,
                Err(err) if !err.penalizes_peer() => return,
                Err(err) => err,
            };

            let next = self
                .inner
                .peers
                .lock()
                .select_peer_for_retry(Instant::now(), &peer);
            match next {
                Some(next) => {
                    info!(failed = %peer, next = %next, %err, "Retrying ordersync with another peer");
                    peer = next;
                }
                None => {
                    debug!(peer = %peer, "No other peer available for ordersync retry");
                    return;
                }
            }
        }
    }

    fn record_registry(&self, peers: &PeerManager) {
        if let Some(metrics) = &self.inner.metrics {
            metrics.set_active_sessions(peers.active_sessions().len() as i64);
        }
    }

    fn record_result(&self, peer: &PeerId, result: &Result<SyncOutcome, OrdersyncError>) {
        {
            let mut stats = self.inner.stats.lock();
            match result {
                Ok(outcome) => {
                    stats.sessions_completed += 1;
                    stats.orders_accepted += outcome.orders_accepted as u64;
                    stats.orders_rejected += outcome.orders_rejected as u64;
                    stats.orders_filtered += outcome.orders_filtered as u64;
                }
                Err(_) => stats.sessions_failed += 1,
            }
        }

        if let Err(err @ (OrdersyncError::Cancelled | OrdersyncError::SessionTimeout(_))) = result {
            info!(peer = %peer, %err, "Ordersync session aborted");
        }

        let Some(metrics) = &self.inner.metrics else {
            return;
        };
        match result {
            Ok(outcome) => {
                metrics.inc_sessions("done");
                metrics.inc_pages_fetched(&outcome.version.to_string(), outcome.pages_fetched as u64);
                metrics.inc_orders("received", outcome.orders_received as u64);
                metrics.inc_orders("accepted", outcome.orders_accepted as u64);
                metrics.inc_orders("rejected", outcome.orders_rejected as u64);
                metrics.inc_orders("filtered", outcome.orders_filtered as u64);
                metrics.observe_session_duration(outcome.duration.as_secs_f64());
            }
            Err(err) => metrics.inc_sessions(err.label()),
        }
    }
}

/// Resolves once the flag is raised or its sender is gone.
async fn wait_for_cancel(signal: &mut watch::Receiver<bool>) {
    let _ = signal.wait_for(|cancelled| *cancelled).await;
}
