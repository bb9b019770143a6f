/// Ordersync session state machine.
use std::sync::Arc;

use libp2p_identity::PeerId;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::warn;

use super::protocol::{PageCursor, SubprotocolVersion};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Agreeing on a subprotocol version with the peer.
    ///
    /// Initial state of every session.
    Negotiating,

    /// Requesting pages in cursor order and handing them to the validator.
    Paging,

    /// No more pages will be requested; validation of the last page is
    /// allowed to finish.
    Draining,

    /// All pages were applied.
    Done,

    /// Negotiation was rejected, the transport failed, or a budget ran out.
    /// Orders accepted before the failure are kept.
    Failed,
}

impl SessionState {
    pub fn can_transition_to(&self, target: SessionState) -> bool {
        match self {
            SessionState::Negotiating => {
                matches!(target, SessionState::Paging | SessionState::Failed)
            }
            SessionState::Paging => {
                matches!(target, SessionState::Draining | SessionState::Failed)
            }
            SessionState::Draining => matches!(target, SessionState::Done | SessionState::Failed),
            SessionState::Done | SessionState::Failed => false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Done | SessionState::Failed)
    }
}

impl Default for SessionState {
    fn default() -> Self {
        SessionState::Negotiating
    }
}

/// Ephemeral per-peer sync state. Never persisted.
#[derive(Debug, Clone)]
pub struct OrdersyncSession {
    pub peer_id: PeerId,
    pub state: SessionState,
    pub version: Option<SubprotocolVersion>,
    pub cursor: Option<PageCursor>,
    pub pages_fetched: usize,
    pub started_at: Instant,
}

pub type SharedSession = Arc<Mutex<OrdersyncSession>>;

impl OrdersyncSession {
    pub fn new(peer_id: PeerId) -> Self {
        Self {
            peer_id,
            state: SessionState::default(),
            version: None,
            cursor: None,
            pages_fetched: 0,
            started_at: Instant::now(),
        }
    }

    pub fn shared(peer_id: PeerId) -> SharedSession {
        Arc::new(Mutex::new(Self::new(peer_id)))
    }

    /// Moves to `target` if the transition is legal.
    pub fn transition(&mut self, target: SessionState) -> bool {
        if self.state == target {
            return true;
        }
        if !self.state.can_transition_to(target) {
            warn!(
                peer = %self.peer_id,
                from = ?self.state,
                to = ?target,
                "Invalid session state transition attempted"
            );
            return false;
        }
        self.state = target;
        true
    }

    /// Forces a non-terminal session into `Failed`.
    pub fn fail(&mut self) {
        if !self.state.is_terminal() {
            self.state = SessionState::Failed;
        }
    }
}
