use serde::{Deserialize, Serialize};
use std::fmt;

use crate::order::SignedOrder;
use crate::types::OrderHash;

/// The state an order moved into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderEventEndState {
    /// Order was accepted and is now stored and watched.
    Added,
    /// Order was offered to the node but failed validation.
    Rejected,
    /// A previously valid order became unfillable for a reason not covered below.
    Invalidated,
    /// Order was partially filled.
    Filled,
    /// Order was filled completely.
    FullyFilled,
    /// Order reached its expiration time.
    Expired,
    /// An expired order became valid again after a block re-org.
    Unexpired,
    /// Order was cancelled on chain by its maker.
    Cancelled,
    /// Node evicted the order from storage.
    StoppedWatching,
}

impl OrderEventEndState {
    /// Whether this transition removes the order from the fillable set.
    pub fn is_removal(&self) -> bool {
        matches!(
            self,
            Self::Invalidated
                | Self::FullyFilled
                | Self::Expired
                | Self::Cancelled
                | Self::StoppedWatching
        )
    }
}

impl fmt::Display for OrderEventEndState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Added => "ADDED",
            Self::Rejected => "REJECTED",
            Self::Invalidated => "INVALIDATED",
            Self::Filled => "FILLED",
            Self::FullyFilled => "FULLY_FILLED",
            Self::Expired => "EXPIRED",
            Self::Unexpired => "UNEXPIRED",
            Self::Cancelled => "CANCELLED",
            Self::StoppedWatching => "STOPPED_WATCHING",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderEvent {
    pub order_hash: OrderHash,
    pub signed_order: SignedOrder,
    pub end_state: OrderEventEndState,
    pub timestamp_ms: u64,
}

impl OrderEvent {
    pub fn new(
        order_hash: OrderHash,
        signed_order: SignedOrder,
        end_state: OrderEventEndState,
        timestamp_ms: u64,
    ) -> Self {
        Self {
            order_hash,
            signed_order,
            end_state,
            timestamp_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(OrderEventEndState::Added, "\"ADDED\"")]
    #[case(OrderEventEndState::FullyFilled, "\"FULLY_FILLED\"")]
    #[case(OrderEventEndState::StoppedWatching, "\"STOPPED_WATCHING\"")]
    fn test_end_state_wire_name(#[case] state: OrderEventEndState, #[case] expected: &str) {
        assert_eq!(serde_json::to_string(&state).unwrap(), expected);
        assert_eq!(format!("\"{state}\""), expected);
    }

    #[test]
    fn test_removal_states() {
        assert!(!OrderEventEndState::Added.is_removal());
        assert!(!OrderEventEndState::Filled.is_removal());
        assert!(OrderEventEndState::Expired.is_removal());
        assert!(OrderEventEndState::Cancelled.is_removal());
    }
}
