use alloy_primitives::U256;
use serde::{Deserialize, Serialize};

use crate::order::SignedOrder;
use crate::serde_helpers::u256_decimal;
use crate::types::OrderHash;

/// Outcome of offering a batch of orders to the validator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResults {
    pub accepted: Vec<AcceptedOrderInfo>,
    pub rejected: Vec<RejectedOrderInfo>,
}

impl ValidationResults {
    pub fn is_empty(&self) -> bool {
        self.accepted.is_empty() && self.rejected.is_empty()
    }

    /// Accepted entries that were not already stored.
    pub fn newly_added(&self) -> impl Iterator<Item = &AcceptedOrderInfo> {
        self.accepted.iter().filter(|info| info.is_new)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptedOrderInfo {
    pub order_hash: OrderHash,
    pub signed_order: SignedOrder,
    #[serde(with = "u256_decimal")]
    pub fillable_taker_asset_amount: U256,
    /// False when the order was already stored; re-acceptance is a no-op.
    pub is_new: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectedOrderInfo {
    pub order_hash: OrderHash,
    pub signed_order: SignedOrder,
    pub kind: RejectedOrderKind,
    pub status: RejectedOrderStatus,
}

/// Which layer rejected the order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectedOrderKind {
    /// On-chain state made the order unfillable.
    ZeroexValidation,
    /// The node failed while processing the order.
    MeshError,
    /// The order broke a node-level rule.
    MeshValidation,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RejectedOrderStatus {
    pub code: String,
    pub message: String,
}

impl RejectedOrderStatus {
    fn new(code: &str, message: &str) -> Self {
        Self {
            code: code.to_string(),
            message: message.to_string(),
        }
    }

    pub fn already_stored_and_unfillable() -> Self {
        Self::new(
            "ORDER_ALREADY_STORED_AND_UNFILLABLE",
            "order is already stored and is unfillable",
        )
    }

    pub fn incorrect_chain_id() -> Self {
        Self::new(
            "INCORRECT_CHAIN_ID",
            "order was created for a different chain than the one this node is configured for",
        )
    }

    pub fn expired() -> Self {
        Self::new("ORDER_EXPIRED", "order expired according to latest block timestamp")
    }

    pub fn invalid_amounts() -> Self {
        Self::new(
            "ORDER_HAS_INVALID_AMOUNTS",
            "makerAssetAmount and takerAssetAmount must be greater than 0",
        )
    }

    pub fn invalid_signature() -> Self {
        Self::new("ORDER_HAS_INVALID_SIGNATURE", "order signature must be valid")
    }

    pub fn database_full() -> Self {
        Self::new(
            "DATABASE_FULL_OF_ORDERS",
            "database is full of pinned orders and no orders can be deleted to make space",
        )
    }

    pub fn does_not_match_filter() -> Self {
        Self::new(
            "ORDER_DOES_NOT_MATCH_FILTER",
            "order does not match this node's order filter",
        )
    }

    pub fn internal_error() -> Self {
        Self::new(
            "INTERNAL_ERROR",
            "an unexpected internal error has occurred",
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_newly_added_skips_duplicates() {
        let order = SignedOrder::default();
        let hash = order.compute_order_hash();
        let results = ValidationResults {
            accepted: vec![
                AcceptedOrderInfo {
                    order_hash: hash,
                    signed_order: order.clone(),
                    fillable_taker_asset_amount: U256::ZERO,
                    is_new: true,
                },
                AcceptedOrderInfo {
                    order_hash: hash,
                    signed_order: order,
                    fillable_taker_asset_amount: U256::ZERO,
                    is_new: false,
                },
            ],
            rejected: vec![],
        };
        assert_eq!(results.newly_added().count(), 1);
        assert!(!results.is_empty());
    }

    #[test]
    fn test_status_codes_are_distinct() {
        let codes = [
            RejectedOrderStatus::already_stored_and_unfillable().code,
            RejectedOrderStatus::incorrect_chain_id().code,
            RejectedOrderStatus::expired().code,
            RejectedOrderStatus::invalid_amounts().code,
            RejectedOrderStatus::invalid_signature().code,
            RejectedOrderStatus::database_full().code,
            RejectedOrderStatus::does_not_match_filter().code,
            RejectedOrderStatus::internal_error().code,
        ];
        let unique: std::collections::HashSet<_> = codes.iter().collect();
        assert_eq!(unique.len(), codes.len());
    }
}
