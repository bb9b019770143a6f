use std::time::Duration;

use libp2p_identity::PeerId;
use thiserror::Error;

use super::protocol::SubprotocolVersion;
use super::store::StoreError;
use super::transport::TransportError;

#[derive(Debug, Error)]
pub enum OrdersyncError {
    #[error("no compatible ordersync version (offered {offered:?}, peer supports {supported:?})")]
    NoCompatibleVersion {
        offered: Vec<SubprotocolVersion>,
        supported: Vec<SubprotocolVersion>,
    },

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("session exceeded {0:?}")]
    SessionTimeout(Duration),

    #[error("session exceeded {max_pages} pages")]
    BudgetExceeded { max_pages: usize },

    #[error("session cancelled")]
    Cancelled,

    #[error("order store error: {0}")]
    Store(#[from] StoreError),

    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("peer {0} already has an active session")]
    AlreadySyncing(PeerId),

    #[error("peer {peer} is backing off for another {retry_in:?}")]
    BackingOff { peer: PeerId, retry_in: Duration },
}

impl OrdersyncError {
    /// The trigger was ignored and no session ran.
    pub fn is_skip(&self) -> bool {
        matches!(self, Self::AlreadySyncing(_) | Self::BackingOff { .. })
    }

    /// The peer should not be retried until its backoff expires.
    pub fn penalizes_peer(&self) -> bool {
        !self.is_skip() && !matches!(self, Self::Cancelled)
    }

    /// Short label used for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Self::NoCompatibleVersion { .. } => "no_compatible_version",
            Self::Transport(_) => "transport",
            Self::SessionTimeout(_) => "session_timeout",
            Self::BudgetExceeded { .. } => "budget_exceeded",
            Self::Cancelled => "cancelled",
            Self::Store(_) => "store",
            Self::Protocol(_) => "protocol",
            Self::AlreadySyncing(_) => "already_syncing",
            Self::BackingOff { .. } => "backing_off",
        }
    }
}
