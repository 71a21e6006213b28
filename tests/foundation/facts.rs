//! Integration tests for facts and fact identifiers

use trellis_foundation::{Fact, FactId, Value};

#[test]
fn fact_id_display_and_order() {
    assert_eq!(FactId(12).to_string(), "f-12");
    assert_eq!(format!("{:?}", FactId(3)), "f-3");
    assert!(FactId(2) < FactId(10));
    assert_eq!(FactId::from(5).get(), 5);
}

#[test]
fn builder_sets_slots() {
    let fact = Fact::new(1, "person")
        .with_slot("name", "ann")
        .with_slot("age", 41);

    assert_eq!(fact.id, FactId(1));
    assert_eq!(&*fact.template, "person");
    assert_eq!(fact.slot("age"), Some(&Value::Int(41)));
    assert_eq!(fact.slot("missing"), None);
    assert_eq!(fact.slot_or_nil("missing"), Value::Nil);
}

#[test]
fn with_id_keeps_contents() {
    let original = Fact::new(1, "person").with_slot("name", "bo");
    let moved = original.clone().with_id(9);

    assert_eq!(moved.id, FactId(9));
    assert_eq!(moved.slots, original.slots);
    assert_ne!(moved, original);
}

#[test]
fn clone_is_independent() {
    let base = Fact::new(1, "counter").with_slot("n", 1);
    let bumped = base.clone().with_slot("n", 2);

    assert_eq!(base.slot("n"), Some(&Value::Int(1)));
    assert_eq!(bumped.slot("n"), Some(&Value::Int(2)));
}
