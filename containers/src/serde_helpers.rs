// Serde helpers for the order wire format.
// Unsigned 256-bit integers travel as decimal strings so that interest
// filters can pattern-match them.

use serde::{Deserialize, Deserializer, Serializer};

pub mod u256_decimal {
    use super::*;
    use alloy_primitives::U256;
    use std::str::FromStr;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum U256Repr {
        Text(String),
        Number(u64),
    }

    pub fn serialize<S>(value: &U256, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_string())
    }

    /// Accepts a decimal string, a `0x` hex string, or a plain JSON number.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<U256, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::Error;

        match U256Repr::deserialize(deserializer)? {
            U256Repr::Text(text) => U256::from_str(text.trim())
                .map_err(|e| D::Error::custom(format!("invalid uint256 {text:?}: {e}"))),
            U256Repr::Number(number) => Ok(U256::from(number)),
        }
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::U256;
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize, Debug, PartialEq)]
    struct Amount {
        #[serde(with = "super::u256_decimal")]
        value: U256,
    }

    #[test]
    fn test_u256_serializes_as_decimal_string() {
        let amount = Amount { value: U256::from(1_000_000u64) };
        let json = serde_json::to_string(&amount).unwrap();
        assert_eq!(json, r#"{"value":"1000000"}"#);
    }

    #[test]
    fn test_u256_accepts_number_hex_and_decimal() {
        let from_number: Amount = serde_json::from_str(r#"{"value":42}"#).unwrap();
        let from_hex: Amount = serde_json::from_str(r#"{"value":"0x2a"}"#).unwrap();
        let from_decimal: Amount = serde_json::from_str(r#"{"value":"42"}"#).unwrap();
        assert_eq!(from_number.value, U256::from(42u64));
        assert_eq!(from_hex, from_number);
        assert_eq!(from_decimal, from_number);
    }

    #[test]
    fn test_u256_rejects_garbage() {
        assert!(serde_json::from_str::<Amount>(r#"{"value":"twelve"}"#).is_err());
    }
}
