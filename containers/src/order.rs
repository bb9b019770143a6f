use alloy_primitives::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::serde_helpers::u256_decimal;
use crate::types::OrderHash;

const ORDER_HASH_DOMAIN: &[u8] = b"mesh:order:v3:";

/// Off-chain trade intent, field-for-field the 0x v3 order.
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub chain_id: u64,
    pub exchange_address: Address,
    pub maker_address: Address,
    pub taker_address: Address,
    pub sender_address: Address,
    pub fee_recipient_address: Address,
    pub maker_asset_data: Bytes,
    pub taker_asset_data: Bytes,
    pub maker_fee_asset_data: Bytes,
    pub taker_fee_asset_data: Bytes,
    #[serde(with = "u256_decimal")]
    pub maker_asset_amount: U256,
    #[serde(with = "u256_decimal")]
    pub taker_asset_amount: U256,
    #[serde(with = "u256_decimal")]
    pub maker_fee: U256,
    #[serde(with = "u256_decimal")]
    pub taker_fee: U256,
    #[serde(with = "u256_decimal")]
    pub expiration_time_seconds: U256,
    #[serde(with = "u256_decimal")]
    pub salt: U256,
}

impl Order {
    /// Deterministic content hash. Variable-length fields are length
    /// prefixed so distinct orders never share a preimage.
    pub fn compute_order_hash(&self) -> OrderHash {
        let mut hasher = Sha256::new();
        hasher.update(ORDER_HASH_DOMAIN);
        hasher.update(self.chain_id.to_be_bytes());
        for address in [
            &self.exchange_address,
            &self.maker_address,
            &self.taker_address,
            &self.sender_address,
            &self.fee_recipient_address,
        ] {
            hasher.update(address.as_slice());
        }
        for data in [
            &self.maker_asset_data,
            &self.taker_asset_data,
            &self.maker_fee_asset_data,
            &self.taker_fee_asset_data,
        ] {
            hasher.update((data.len() as u64).to_be_bytes());
            hasher.update(data.as_ref());
        }
        for amount in [
            &self.maker_asset_amount,
            &self.taker_asset_amount,
            &self.maker_fee,
            &self.taker_fee,
            &self.expiration_time_seconds,
            &self.salt,
        ] {
            hasher.update(amount.to_be_bytes::<32>());
        }
        OrderHash::from(<[u8; 32]>::from(hasher.finalize()))
    }

    pub fn is_expired_at(&self, unix_secs: u64) -> bool {
        self.expiration_time_seconds <= U256::from(unix_secs)
    }

    pub fn has_zero_amount(&self) -> bool {
        self.maker_asset_amount.is_zero() || self.taker_asset_amount.is_zero()
    }
}

/// An order together with the maker's signature. Serializes flat, the
/// way peers and filters see it.
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SignedOrder {
    #[serde(flatten)]
    pub order: Order,
    pub signature: Bytes,
}

impl SignedOrder {
    pub fn new(order: Order, signature: Bytes) -> Self {
        Self { order, signature }
    }

    /// The signature is not part of the hash.
    pub fn compute_order_hash(&self) -> OrderHash {
        self.order.compute_order_hash()
    }

    /// JSON object form evaluated by interest filters.
    pub fn to_json_value(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }
}
