use proptest::prelude::*;
use sdon::Value;

/// arbitrary finite double for use with proptest
///
/// NaN is excluded: the value model compares doubles within machine
/// epsilon, which no NaN can satisfy.
pub fn arb_double() -> impl Strategy<Value = f64> {
    use proptest::num::f64;
    f64::POSITIVE | f64::NEGATIVE | f64::NORMAL | f64::SUBNORMAL | f64::ZERO
}

/// arbitrary byte buffer for use with proptest
pub fn arb_bytes() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..64)
}

/// arbitrary string for use with proptest
///
/// Strings carrying the reserved `BASE64:` prefix are excluded; they
/// intentionally round-trip through JSON as byte-strings.
pub fn arb_string() -> impl Strategy<Value = String> {
    any::<String>().prop_filter("reserved byte-string prefix", |s| !s.starts_with("BASE64:"))
}

/// arbitrary dictionary key
pub fn arb_key() -> impl Strategy<Value = String> {
    any::<String>().prop_filter("keys must be non-empty", |s| !s.is_empty())
}

/// arbitrary sdon value for use with proptest
pub fn arb_value() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        any::<i64>().prop_map(Value::from),
        arb_double().prop_map(Value::from),
        arb_string().prop_map(Value::from),
        arb_bytes().prop_map(Value::from),
    ];
    leaf.prop_recursive(
        6,  // max depth
        48, // max nodes
        8,  // max items per collection
        |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..8).prop_map(Value::from),
                prop::collection::btree_map(arb_key(), inner, 0..8)
                    .prop_map(Value::Dictionary),
            ]
        },
    )
}
