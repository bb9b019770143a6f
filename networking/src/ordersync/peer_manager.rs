/// Peer registry for ordersync.
///
/// Tracks connected peers, the one session each may have running, and the
/// backoff a peer is serving after a failed session.
use std::collections::HashMap;
use std::time::Duration;

use libp2p_identity::PeerId;
use tokio::sync::watch;
use tokio::time::Instant;

use super::error::OrdersyncError;
use super::states::{OrdersyncSession, SessionState, SharedSession};
use crate::types::ConnectionState;

/// Exponential retry delay: `base` after the first failure, doubling up to `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub base: Duration,
    pub max: Duration,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    pub fn delay(&self, consecutive_failures: u32) -> Duration {
        if consecutive_failures == 0 {
            return Duration::ZERO;
        }
        let factor = 1u32.checked_shl(consecutive_failures - 1).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.max)
    }
}

#[derive(Debug)]
pub struct ActiveSession {
    pub id: u64,
    pub session: SharedSession,
    cancel: watch::Sender<bool>,
}

impl ActiveSession {
    pub fn cancel(&self) {
        let _ = self.cancel.send(true);
    }
}

/// Ordersync view of one peer.
#[derive(Debug)]
pub struct SyncPeer {
    pub peer_id: PeerId,
    pub connection_state: ConnectionState,
    pub session: Option<ActiveSession>,
    pub consecutive_failures: u32,
    pub backoff_until: Option<Instant>,
    /// A session against this peer has completed at least once.
    pub synced: bool,
}

impl SyncPeer {
    pub fn new(peer_id: PeerId, connection_state: ConnectionState) -> Self {
        Self {
            peer_id,
            connection_state,
            session: None,
            consecutive_failures: 0,
            backoff_until: None,
            synced: false,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection_state == ConnectionState::Connected
    }

    pub fn has_active_session(&self) -> bool {
        self.session.is_some()
    }

    pub fn backoff_remaining(&self, now: Instant) -> Option<Duration> {
        self.backoff_until
            .filter(|until| *until > now)
            .map(|until| until - now)
    }

    /// Connected, idle and not backing off.
    pub fn is_available(&self, now: Instant) -> bool {
        self.is_connected() && !self.has_active_session() && self.backoff_remaining(now).is_none()
    }
}

/// Handle given to the task that runs a newly started session.
#[derive(Debug)]
pub struct SessionTicket {
    pub id: u64,
    pub session: SharedSession,
    pub cancelled: watch::Receiver<bool>,
}

#[derive(Debug)]
pub struct PeerManager {
    peers: HashMap<PeerId, SyncPeer>,
    backoff: Backoff,
    next_session_id: u64,
}

impl PeerManager {
    pub fn new(backoff: Backoff) -> Self {
        Self {
            peers: HashMap::new(),
            backoff,
            next_session_id: 0,
        }
    }

    pub fn add_peer(&mut self, peer_id: PeerId, connection_state: ConnectionState) -> &mut SyncPeer {
        let peer = self
            .peers
            .entry(peer_id)
            .or_insert_with(|| SyncPeer::new(peer_id, connection_state));
        peer.connection_state = connection_state;
        peer
    }

    /// Marks the peer disconnected and cancels its session, if any.
    ///
    /// A cancelled session keeps its slot until [`Self::end_session`]
    /// releases it, and a peer keeps its failure count while it is backing
    /// off. Otherwise the peer is forgotten. Returns whether a session was
    /// running, or `None` for an unknown peer.
    pub fn disconnect_peer(&mut self, peer_id: &PeerId, now: Instant) -> Option<bool> {
        let peer = self.peers.get_mut(peer_id)?;
        peer.connection_state = ConnectionState::Disconnected;
        let had_session = match &peer.session {
            Some(active) => {
                active.cancel();
                true
            }
            None => false,
        };
        self.prune(now);
        Some(had_session)
    }

    pub fn get_peer(&self, peer_id: &PeerId) -> Option<&SyncPeer> {
        self.peers.get(peer_id)
    }

    /// Claims the per-peer session slot.
    ///
    /// Fails without side effects if the peer already has a session or is
    /// still backing off.
    pub fn begin_session(&mut self, peer_id: PeerId, now: Instant) -> Result<SessionTicket, OrdersyncError> {
        let id = self.next_session_id;
        let peer = self.add_peer_if_missing(peer_id);

        if peer.has_active_session() {
            return Err(OrdersyncError::AlreadySyncing(peer_id));
        }
        if let Some(retry_in) = peer.backoff_remaining(now) {
            return Err(OrdersyncError::BackingOff {
                peer: peer_id,
                retry_in,
            });
        }

        let session = OrdersyncSession::shared(peer_id);
        let (cancel, cancelled) = watch::channel(false);
        peer.session = Some(ActiveSession {
            id,
            session: session.clone(),
            cancel,
        });
        self.next_session_id += 1;

        Ok(SessionTicket {
            id,
            session,
            cancelled,
        })
    }

    /// Releases the slot held by session `id` and updates backoff.
    ///
    /// `penalize` puts the peer into backoff; a success clears it.
    pub fn end_session(&mut self, peer_id: &PeerId, id: u64, success: bool, penalize: bool, now: Instant) {
        let backoff = self.backoff;
        let Some(peer) = self.peers.get_mut(peer_id) else {
            return;
        };
        if peer.session.as_ref().map(|active| active.id) != Some(id) {
            return;
        }
        peer.session = None;

        if success {
            peer.synced = true;
            peer.consecutive_failures = 0;
            peer.backoff_until = None;
        } else if penalize {
            peer.consecutive_failures = peer.consecutive_failures.saturating_add(1);
            peer.backoff_until = Some(now + backoff.delay(peer.consecutive_failures));
        }
        self.prune(now);
    }

    /// Drops disconnected peers that hold neither a session nor a backoff.
    fn prune(&mut self, now: Instant) {
        self.peers.retain(|_, peer| {
            peer.is_connected() || peer.has_active_session() || peer.backoff_remaining(now).is_some()
        });
    }

    /// Another peer worth trying after a failure: available and never synced.
    pub fn select_peer_for_retry(&self, now: Instant, exclude: &PeerId) -> Option<PeerId> {
        self.peers
            .values()
            .filter(|peer| peer.peer_id != *exclude && !peer.synced && peer.is_available(now))
            .map(|peer| peer.peer_id)
            .min()
    }

    pub fn cancel_all(&self) {
        for peer in self.peers.values() {
            if let Some(active) = &peer.session {
                active.cancel();
            }
        }
    }

    pub fn active_sessions(&self) -> Vec<(PeerId, SessionState)> {
        let mut sessions: Vec<_> = self
            .peers
            .values()
            .filter_map(|peer| {
                let active = peer.session.as_ref()?;
                Some((peer.peer_id, active.session.lock().state))
            })
            .collect();
        sessions.sort_by_key(|(peer_id, _)| *peer_id);
        sessions
    }

    pub fn connected_peers(&self) -> usize {
        self.peers.values().filter(|peer| peer.is_connected()).count()
    }

    pub fn get_all_peers(&self) -> impl Iterator<Item = &SyncPeer> {
        self.peers.values()
    }

    fn add_peer_if_missing(&mut self, peer_id: PeerId) -> &mut SyncPeer {
        self.peers
            .entry(peer_id)
            .or_insert_with(|| SyncPeer::new(peer_id, ConnectionState::Connected))
    }
}
