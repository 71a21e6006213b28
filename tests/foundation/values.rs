//! Integration tests for Value types
//!
//! Tests construction, test semantics, stable hashing, ordering and display.

use std::collections::HashSet;

use proptest::prelude::*;
use trellis_foundation::{LtVec, Type, Value};

// =============================================================================
// Construction
// =============================================================================

#[test]
fn conversions_pick_variants() {
    assert_eq!(Value::from(true), Value::Bool(true));
    assert_eq!(Value::from(7), Value::Int(7));
    assert_eq!(Value::from(7_i64), Value::Int(7));
    assert_eq!(Value::from(1.5), Value::Float(1.5));
    assert_eq!(Value::from("hi").as_str(), Some("hi"));
    assert_eq!(Value::symbol("red").as_symbol(), Some("red"));
    assert!(Value::Nil.is_nil());
}

#[test]
fn strings_and_symbols_differ() {
    assert_ne!(Value::from("red"), Value::symbol("red"));
    assert_eq!(Value::from("red").value_type(), Type::String);
    assert_eq!(Value::symbol("red").value_type(), Type::Symbol);
}

#[test]
fn seq_collects_items() {
    let v = Value::seq([1, 2, 3]);
    let items = v.as_seq().unwrap();
    assert_eq!(items.len(), 3);
    assert_eq!(items.get(1), Some(&Value::Int(2)));
    assert_eq!(v.value_type(), Type::Seq);
}

// =============================================================================
// Test Semantics
// =============================================================================

#[test]
fn only_true_and_nonzero_ints_pass() {
    assert!(Value::Bool(true).passes_test());
    assert!(Value::Int(-3).passes_test());

    assert!(!Value::Bool(false).passes_test());
    assert!(!Value::Int(0).passes_test());
    assert!(!Value::Nil.passes_test());
    assert!(!Value::Float(1.0).passes_test());
    assert!(!Value::from("yes").passes_test());
    assert!(!Value::seq([1]).passes_test());
}

// =============================================================================
// Hashing and Ordering
// =============================================================================

#[test]
fn stable_hash_separates_types() {
    let hashes: HashSet<u64> = [
        Value::Nil,
        Value::Bool(false),
        Value::Int(0),
        Value::Float(0.0),
        Value::from(""),
        Value::symbol(""),
        Value::Seq(LtVec::new()),
    ]
    .iter()
    .map(Value::stable_hash)
    .collect();
    assert_eq!(hashes.len(), 7);
}

#[test]
fn numbers_compare_across_types() {
    assert!(Value::Int(1) < Value::Float(1.5));
    assert!(Value::Float(2.5) > Value::Int(2));
    assert_eq!(Value::from("a").partial_cmp(&Value::Int(1)), None);
}

#[test]
fn display_is_readable() {
    assert_eq!(Value::seq([Value::Int(1), Value::symbol("x")]).to_string(), "(1 x)");
    assert_eq!(Value::Nil.to_string(), "nil");
    assert_eq!(format!("{:?}", Value::from("s")), "\"s\"");
}

proptest! {
    #[test]
    fn equal_values_hash_equally(n in any::<i64>(), s in "[a-z]{0,8}") {
        prop_assert_eq!(Value::Int(n).stable_hash(), Value::Int(n).stable_hash());
        prop_assert_eq!(Value::from(s.as_str()).stable_hash(), Value::from(s.clone()).stable_hash());
    }

    #[test]
    fn int_and_float_payloads_do_not_collide(n in any::<i64>()) {
        #[allow(clippy::cast_precision_loss)]
        let float = Value::Float(n as f64);
        prop_assert_ne!(Value::Int(n), float.clone());
        prop_assert_ne!(Value::Int(n).stable_hash(), float.stable_hash());
    }
}
