//! Integration tests for alpha node sharing
//!
//! Identical conditions share one alpha node, yet the rules built on them
//! activate and withdraw independently.

use trellis_engine::{ActivationList, Condition, ReteNetwork, Rule};
use trellis_foundation::{Fact, FactId, Value};

fn adult() -> Condition {
    Condition::new("person")
        .constant("kind", Value::symbol("adult"))
        .bind("name", "n")
}

fn person(id: u64, kind: &str, name: &str) -> Fact {
    Fact::new(id, "person")
        .with_slot("kind", Value::symbol(kind))
        .with_slot("name", name)
}

#[test]
fn identical_first_conditions_share_a_node() {
    let mut net = ReteNetwork::new();
    let mut agenda = ActivationList::new();
    let greet = net
        .build_network(Rule::new("greet").with_condition(adult()), &mut agenda)
        .unwrap();
    let vote = net
        .build_network(
            Rule::new("vote")
                .with_condition(adult())
                .with_condition(Condition::new("election")),
            &mut agenda,
        )
        .unwrap();

    assert_eq!(net.alpha().len(), 2);
    assert_eq!(net.alpha_of(greet.joins[0]), net.alpha_of(vote.joins[0]));
    let shared = net.alpha().lookup(&adult()).unwrap();
    assert_eq!(shared.listeners().len(), 2);

    net.assert_fact(person(1, "adult", "ann"), &mut agenda).unwrap();
    assert!(agenda.contains("greet", &[FactId(1)]));
    assert_eq!(agenda.for_rule("vote").count(), 0);

    net.assert_fact(Fact::new(2, "election"), &mut agenda).unwrap();
    assert!(agenda.contains("vote", &[FactId(1), FactId(2)]));
    assert_eq!(agenda.len(), 2);
    net.verify_structure().unwrap();
}

#[test]
fn shared_node_memory_is_filtered_once() {
    let mut net = ReteNetwork::new();
    for name in ["a", "b", "c"] {
        net.build_network(Rule::new(name).with_condition(adult()), &mut ())
            .unwrap();
    }
    net.assert_fact(person(1, "adult", "ann"), &mut ()).unwrap();
    net.assert_fact(person(2, "child", "kit"), &mut ()).unwrap();

    assert_eq!(net.alpha().len(), 1);
    let node = net.alpha().lookup(&adult()).unwrap();
    assert_eq!(node.memory().keys().copied().collect::<Vec<_>>(), vec![FactId(1)]);
    assert_eq!(net.activations().count(), 3);
}

#[test]
fn removing_one_rule_keeps_the_other() {
    let mut net = ReteNetwork::new();
    let mut agenda = ActivationList::new();
    net.build_network(Rule::new("greet").with_condition(adult()), &mut agenda)
        .unwrap();
    net.build_network(Rule::new("welcome").with_condition(adult()), &mut agenda)
        .unwrap();
    net.assert_fact(person(1, "adult", "ann"), &mut agenda).unwrap();

    net.remove_rule("greet", &mut agenda).unwrap();

    assert_eq!(agenda.len(), 1);
    assert!(agenda.contains("welcome", &[FactId(1)]));
    let node = net.alpha().lookup(&adult()).unwrap();
    assert_eq!(node.listeners().len(), 1);

    // Later facts still reach the surviving rule.
    net.assert_fact(person(2, "adult", "bo"), &mut agenda).unwrap();
    assert!(agenda.contains("welcome", &[FactId(2)]));
    net.verify_structure().unwrap();
}

#[test]
fn variable_names_keep_nodes_apart() {
    let mut net = ReteNetwork::new();
    net.build_network(Rule::new("n").with_condition(adult()), &mut ())
        .unwrap();
    net.build_network(
        Rule::new("m").with_condition(
            Condition::new("person")
                .constant("kind", Value::symbol("adult"))
                .bind("name", "m"),
        ),
        &mut (),
    )
    .unwrap();

    assert_eq!(net.alpha().len(), 2);
}

#[test]
fn removing_the_last_user_frees_the_node() {
    let mut net = ReteNetwork::new();
    let mut agenda = ActivationList::new();
    for name in ["greet", "welcome"] {
        net.build_network(Rule::new(name).with_condition(adult()), &mut agenda)
            .unwrap();
    }
    net.assert_fact(person(1, "adult", "ann"), &mut agenda).unwrap();

    net.remove_rule("greet", &mut agenda).unwrap();
    assert_eq!(net.stats().alpha_nodes, 1);
    net.remove_rule("welcome", &mut agenda).unwrap();
    assert_eq!(net.stats().alpha_nodes, 0);
    assert!(net.alpha().lookup(&adult()).is_none());

    // A later rule starts from a fresh node primed with the current facts.
    net.build_network(Rule::new("greet").with_condition(adult()), &mut agenda)
        .unwrap();
    assert!(agenda.contains("greet", &[FactId(1)]));
    assert_eq!(net.alpha().lookup(&adult()).unwrap().memory().len(), 1);
    net.verify_structure().unwrap();
}
