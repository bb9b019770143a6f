use std::collections::HashMap;

use libp2p_identity::PeerId;
use serde::Serialize;

/// Peer connection state machine.
///
/// Tracks the lifecycle of a connection to a peer:
/// DISCONNECTED -> CONNECTING -> CONNECTED -> DISCONNECTING -> DISCONNECTED
///
/// These states map directly to libp2p connection events.
#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No active connection to this peer.
    Disconnected,
    /// QUIC connection in progress.
    Connecting,
    /// Transport established, can exchange ordersync messages.
    Connected,
    /// Connection is being torn down.
    Disconnecting,
}

#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Inbound,
    Outbound,
    Unknown,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
            Direction::Unknown => "unknown",
        }
    }
}

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeerCount {
    pub disconnected: u64,
    pub connecting: u64,
    pub connected: u64,
    pub disconnecting: u64,
}

impl PeerCount {
    pub fn new(states: &HashMap<PeerId, ConnectionState>) -> Self {
        let mut count = PeerCount::default();
        for state in states.values() {
            match state {
                ConnectionState::Connected => count.connected += 1,
                ConnectionState::Connecting => count.connecting += 1,
                ConnectionState::Disconnected => count.disconnected += 1,
                ConnectionState::Disconnecting => count.disconnecting += 1,
            }
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_peer_count_groups_states() {
        let states = HashMap::from([
            (PeerId::random(), ConnectionState::Connected),
            (PeerId::random(), ConnectionState::Connected),
            (PeerId::random(), ConnectionState::Connecting),
            (PeerId::random(), ConnectionState::Disconnected),
        ]);

        assert_eq!(
            PeerCount::new(&states),
            PeerCount {
                disconnected: 1,
                connecting: 1,
                connected: 2,
                disconnecting: 0,
            }
        );
    }

    #[test]
    fn test_connection_state_wire_form() {
        assert_eq!(
            serde_json::to_string(&ConnectionState::Connected).unwrap(),
            "\"connected\""
        );
    }
}
