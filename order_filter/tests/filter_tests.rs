use containers::{Bytes, Order, SignedOrder, U256};
use order_filter::{FilterError, OrderFilter};
use pretty_assertions::{assert_eq, assert_ne};
use rstest::rstest;

fn order_with_amount(maker_asset_amount: u64) -> SignedOrder {
    SignedOrder::new(
        Order {
            chain_id: 1337,
            maker_asset_amount: U256::from(maker_asset_amount),
            taker_asset_amount: U256::from(1_000u64),
            maker_fee: U256::from(5u64),
            expiration_time_seconds: U256::from(4_000_000_000u64),
            salt: U256::from(maker_asset_amount),
            maker_asset_data: Bytes::from(vec![0xf4, 0x72, 0x61, 0xb0]),
            taker_asset_data: Bytes::from(vec![0x02, 0x57, 0x17, 0x92]),
            ..Order::default()
        },
        Bytes::from(vec![0x1b; 66]),
    )
}

const MAKER_AMOUNT_IS_ONE: &str =
    r#"{"properties":{"makerAssetAmount":{"pattern":"^1$","type":"string"}}}"#;

#[test]
fn test_accept_all_matches_every_order() {
    let filter = OrderFilter::compile("{}").unwrap();
    for amount in [1, 2, 31, u64::MAX] {
        assert!(filter.match_order(&order_with_amount(amount)).unwrap());
    }
}

#[test]
fn test_maker_amount_filter_matches_exactly_one_of_many() {
    let filter = OrderFilter::compile(MAKER_AMOUNT_IS_ONE).unwrap();
    let matching: Vec<u64> = (1..=31)
        .filter(|amount| filter.match_order(&order_with_amount(*amount)).unwrap())
        .collect();
    assert_eq!(matching, vec![1]);
}

#[rstest]
#[case(
    r#"{"properties":{"makerAssetAmount":{"pattern":"^1$","type":"string"}}}"#,
    r#"{ "properties" : { "makerAssetAmount" : { "type" : "string", "pattern" : "^1$" } } }"#
)]
#[case(
    r#"{"allOf":[{"required":["makerFee"]},{"properties":{"makerFee":{"maximum":10}}}]}"#,
    r#"{"properties":{"makerFee":{"maximum":"10"}},"required":["makerFee","makerFee"]}"#
)]
#[case(
    r#"{"anyOf":[{"properties":{"makerFee":{"const":"5"}}},{"required":["salt"]}]}"#,
    r#"{"anyOf":[{"required":["salt"]},{"properties":{"makerFee":{"const":"5"}}}],"title":"fees"}"#
)]
#[case(r#"{"type":["object","null"]}"#, r#"{"type":["null","object","null"]}"#)]
fn test_equivalent_configurations_share_a_fingerprint(#[case] a: &str, #[case] b: &str) {
    let a = OrderFilter::compile(a).unwrap();
    let b = OrderFilter::compile(b).unwrap();
    assert_eq!(a.fingerprint(), b.fingerprint());
    assert_eq!(a.encoded(), b.encoded());
}

#[rstest]
#[case(r#"{"properties":{"makerAssetAmount":{"pattern":"^2$"}}}"#)]
#[case(r#"{"properties":{"makerAssetAmount":{"pattern":"^1$","type":"number"}}}"#)]
#[case(r#"{"required":["makerFee"]}"#)]
#[case("{}")]
fn test_different_configurations_have_different_fingerprints(#[case] other: &str) {
    let base = OrderFilter::compile(MAKER_AMOUNT_IS_ONE).unwrap();
    let other = OrderFilter::compile(other).unwrap();
    assert_ne!(base.fingerprint(), other.fingerprint());
}

#[rstest]
#[case(r#"{"properties":{"makerFee":{"minimum":5}}}"#, true)]
#[case(r#"{"properties":{"makerFee":{"exclusiveMinimum":5}}}"#, false)]
#[case(r#"{"properties":{"takerFee":{"maximum":0}}}"#, true)]
#[case(r#"{"properties":{"chainId":{"const":1337}}}"#, true)]
#[case(r#"{"properties":{"chainId":{"enum":[1,3,42]}}}"#, false)]
#[case(r#"{"properties":{"makerAssetData":{"pattern":"^0xf47261b0"}}}"#, true)]
#[case(r#"{"properties":{"makerAssetData":{"minLength":100}}}"#, false)]
#[case(r#"{"required":["signature","salt"]}"#, true)]
#[case(r#"{"required":["unknownField"]}"#, false)]
#[case(r#"{"not":{"properties":{"makerFee":{"const":"5"}}}}"#, false)]
#[case(r#"{"anyOf":[{"properties":{"makerFee":{"const":"4"}}},{"properties":{"makerFee":{"const":"5"}}}]}"#, true)]
fn test_every_constraint_must_hold(#[case] config: &str, #[case] expected: bool) {
    let filter = OrderFilter::compile(config).unwrap();
    assert_eq!(filter.match_order(&order_with_amount(7)).unwrap(), expected);
}

#[test]
fn test_conjunction_fails_when_any_member_fails() {
    let filter = OrderFilter::compile(
        r#"{"properties":{"makerFee":{"minimum":5},"makerAssetAmount":{"pattern":"^1$"}}}"#,
    )
    .unwrap();
    assert!(filter.match_order(&order_with_amount(1)).unwrap());
    assert!(!filter.match_order(&order_with_amount(2)).unwrap());
}

#[rstest]
#[case("")]
#[case("[]")]
#[case("true")]
#[case("false")]
#[case(r#"{"properties":{"makerAssetAmount":{"pattern":"("}}}"#)]
#[case(r#"{"properties":{"makerAssetAmount":{"format":"uint256"}}}"#)]
#[case(r#"{"properties":{"makerFee":{"minimum":-1}}}"#)]
fn test_malformed_configuration_is_rejected(#[case] config: &str) {
    let err = OrderFilter::compile(config).unwrap_err();
    assert!(matches!(err, FilterError::InvalidFilterSpec { .. }));
}
