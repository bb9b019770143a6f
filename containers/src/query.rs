use alloy_primitives::U256;
use serde::{Deserialize, Serialize};

use crate::order::SignedOrder;
use crate::serde_helpers::u256_decimal;
use crate::types::OrderHash;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderInfo {
    pub order_hash: OrderHash,
    pub signed_order: SignedOrder,
    #[serde(with = "u256_decimal")]
    pub fillable_taker_asset_amount: U256,
}

/// One page of the stored order set, taken from a named snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetOrdersResponse {
    pub snapshot_id: String,
    pub snapshot_timestamp_ms: u64,
    pub orders_infos: Vec<OrderInfo>,
}
