//! Integration tests for negated and existence conditions
//!
//! Blockers and witnesses come and go in every order; activations must
//! follow.

use trellis_engine::{ActivationKey, ActivationList, AgendaEvent, Condition, ReteNetwork, Rule};
use trellis_foundation::{Fact, FactId, Value};
use trellis_storage::WorkingMemory;

fn tagged(id: u64, template: &str, tag: &str) -> Fact {
    Fact::new(id, template).with_slot("tag", Value::symbol(tag))
}

fn withdraw(rule: &str, facts: &[u64]) -> AgendaEvent {
    AgendaEvent::Withdraw(ActivationKey::new(
        rule.into(),
        facts.iter().copied().map(FactId).collect(),
    ))
}

fn published(event: &AgendaEvent) -> Option<(&str, Vec<FactId>)> {
    match event {
        AgendaEvent::Publish(a) => Some((&*a.rule, a.facts.clone())),
        AgendaEvent::Withdraw(_) => None,
    }
}

// =============================================================================
// NOT
// =============================================================================

#[test]
fn lone_negation_toggles() {
    let mut net = ReteNetwork::new();
    let mut events = Vec::new();
    net.build_network(
        Rule::new("idle").with_condition(Condition::new("blocker").negate()),
        &mut events,
    )
    .unwrap();
    assert_eq!(published(&events[0]), Some(("idle", Vec::new())));

    net.assert_fact(Fact::new(1, "blocker"), &mut events).unwrap();
    assert_eq!(events[1], withdraw("idle", &[]));

    net.assert_fact(Fact::new(2, "blocker"), &mut events).unwrap();
    net.retract_fact(FactId(1), "blocker", &mut events).unwrap();
    assert_eq!(events.len(), 2);

    net.retract_fact(FactId(2), "blocker", &mut events).unwrap();
    assert_eq!(published(&events[2]), Some(("idle", Vec::new())));
    assert_eq!(events.len(), 3);
    net.verify_structure().unwrap();
}

#[test]
fn negation_is_keyed_by_shared_variables() {
    let mut net = ReteNetwork::new();
    let mut agenda = ActivationList::new();
    net.build_network(
        Rule::new("free")
            .with_condition(Condition::new("task").bind("tag", "t"))
            .with_condition(Condition::new("lock").bind("tag", "t").negate()),
        &mut agenda,
    )
    .unwrap();

    net.assert_fact(tagged(1, "task", "red"), &mut agenda).unwrap();
    net.assert_fact(tagged(2, "task", "blue"), &mut agenda).unwrap();
    net.assert_fact(tagged(3, "lock", "red"), &mut agenda).unwrap();

    assert_eq!(agenda.len(), 1);
    assert!(agenda.contains("free", &[FactId(2)]));

    net.retract_fact(FactId(3), "lock", &mut agenda).unwrap();
    assert_eq!(agenda.len(), 2);
    net.verify_structure().unwrap();
}

#[test]
fn negation_mid_chain_rederives_downstream() {
    let mut net = ReteNetwork::new();
    let mut store = WorkingMemory::new();
    let mut agenda = ActivationList::new();
    net.build_network(
        Rule::new("ship")
            .with_condition(Condition::new("order").bind("tag", "t"))
            .with_condition(Condition::new("hold").bind("tag", "t").negate())
            .with_condition(Condition::new("truck").bind("tag", "t")),
        &mut agenda,
    )
    .unwrap();

    for fact in [
        tagged(1, "order", "x"),
        tagged(2, "truck", "x"),
        tagged(3, "truck", "x"),
        tagged(4, "hold", "x"),
    ] {
        store.insert(fact.clone()).unwrap();
        net.assert_fact(fact, &mut agenda).unwrap();
    }
    assert!(agenda.is_empty());
    assert!(net.check_stability("ship", &store).unwrap());

    store.remove(FactId(4)).unwrap();
    net.retract_fact(FactId(4), "hold", &mut agenda).unwrap();
    assert!(agenda.contains("ship", &[FactId(1), FactId(2)]));
    assert!(agenda.contains("ship", &[FactId(1), FactId(3)]));
    assert!(net.check_stability("ship", &store).unwrap());
}

#[test]
fn blocked_token_retracted_before_its_blocker() {
    let mut net = ReteNetwork::new();
    let mut agenda = ActivationList::new();
    net.build_network(
        Rule::new("free")
            .with_condition(Condition::new("task").bind("tag", "t"))
            .with_condition(Condition::new("lock").bind("tag", "t").negate()),
        &mut agenda,
    )
    .unwrap();
    net.assert_fact(tagged(1, "task", "red"), &mut agenda).unwrap();
    net.assert_fact(tagged(2, "lock", "red"), &mut agenda).unwrap();

    net.retract_fact(FactId(1), "task", &mut agenda).unwrap();
    net.verify_structure().unwrap();
    net.retract_fact(FactId(2), "lock", &mut agenda).unwrap();

    assert!(agenda.is_empty());
    assert_eq!(net.stats().tokens, 1);
    net.verify_structure().unwrap();
}

#[test]
fn negated_fact_cannot_block_itself() {
    let mut net = ReteNetwork::new();
    net.build_network(
        Rule::new("only")
            .with_condition(Condition::new("task").bind("tag", "t"))
            .with_condition(Condition::new("task").bind("tag", "t").negate()),
        &mut (),
    )
    .unwrap();

    // The only task is not "another" task.
    net.assert_fact(tagged(1, "task", "red"), &mut ()).unwrap();
    assert_eq!(net.activations_for("only").len(), 1);

    net.assert_fact(tagged(2, "task", "red"), &mut ()).unwrap();
    assert!(net.activations_for("only").is_empty());
    net.verify_structure().unwrap();
}

// =============================================================================
// EXISTS
// =============================================================================

#[test]
fn lone_exists_toggles() {
    let mut net = ReteNetwork::new();
    let mut events = Vec::new();
    net.build_network(
        Rule::new("alarm").with_condition(Condition::new("signal").exists()),
        &mut events,
    )
    .unwrap();
    assert!(events.is_empty());

    net.assert_fact(Fact::new(1, "signal"), &mut events).unwrap();
    assert_eq!(published(&events[0]), Some(("alarm", Vec::new())));

    net.assert_fact(Fact::new(2, "signal"), &mut events).unwrap();
    net.retract_fact(FactId(1), "signal", &mut events).unwrap();
    assert_eq!(events.len(), 1);

    net.retract_fact(FactId(2), "signal", &mut events).unwrap();
    assert_eq!(events[1], withdraw("alarm", &[]));

    net.assert_fact(Fact::new(3, "signal"), &mut events).unwrap();
    assert_eq!(published(&events[2]), Some(("alarm", Vec::new())));
    net.verify_structure().unwrap();
}

#[test]
fn exists_feeds_later_joins_once() {
    let mut net = ReteNetwork::new();
    let mut agenda = ActivationList::new();
    net.build_network(
        Rule::new("staffed")
            .with_condition(Condition::new("shift").bind("tag", "t"))
            .with_condition(Condition::new("worker").bind("tag", "t").exists())
            .with_condition(Condition::new("site").bind("tag", "t")),
        &mut agenda,
    )
    .unwrap();

    net.assert_fact(tagged(1, "shift", "am"), &mut agenda).unwrap();
    net.assert_fact(tagged(2, "site", "am"), &mut agenda).unwrap();
    for id in 10..13 {
        net.assert_fact(tagged(id, "worker", "am"), &mut agenda).unwrap();
    }

    // Witnesses never appear in the match.
    assert_eq!(agenda.len(), 1);
    assert!(agenda.contains("staffed", &[FactId(1), FactId(2)]));

    for id in 10..13 {
        net.retract_fact(FactId(id), "worker", &mut agenda).unwrap();
    }
    assert!(agenda.is_empty());
    net.verify_structure().unwrap();
}
