//! Integration tests for beta memories and the token graph
//!
//! Tests table growth under load, structural verification and the kill
//! switch.

use trellis_engine::{Condition, EngineConfig, ReteNetwork, Rule, Side};
use trellis_foundation::{ErrorKind, Fact, FactId, SemanticLimit};
use trellis_storage::WorkingMemory;

fn keyed_rule() -> Rule {
    Rule::new("keyed")
        .with_condition(Condition::new("left").bind("k", "k"))
        .with_condition(Condition::new("right").bind("k", "k"))
}

#[test]
fn growth_preserves_tokens() {
    let mut net = ReteNetwork::new();
    let mut store = WorkingMemory::new();
    let handle = net.build_network(keyed_rule(), &mut ()).unwrap();

    for n in 0..400_u64 {
        let fact = Fact::new(n + 1, "left").with_slot("k", i64::try_from(n % 50).unwrap());
        store.insert(fact.clone()).unwrap();
        net.assert_fact(fact, &mut ()).unwrap();
    }
    for n in 0..50_u64 {
        let fact = Fact::new(1000 + n, "right").with_slot("k", i64::try_from(n).unwrap());
        store.insert(fact.clone()).unwrap();
        net.assert_fact(fact, &mut ()).unwrap();
    }

    let second = net.join(handle.joins[1]).unwrap();
    assert_eq!(second.left_memory.len(), 400);
    assert!(second.left_memory.table_size() > 13);
    assert_eq!(net.activations_for("keyed").len(), 400);
    assert!(net.check_stability("keyed", &store).unwrap());
    net.verify_structure().unwrap();
}

#[test]
fn initial_prime_sets_table_size() {
    let mut net = ReteNetwork::with_config(EngineConfig::default().with_initial_memory_prime(4));
    let handle = net.build_network(keyed_rule(), &mut ()).unwrap();
    let root = net.join(handle.joins[0]).unwrap();
    assert_eq!(root.right_memory.table_size(), 257);
}

#[test]
fn tokens_know_their_memory() {
    let mut net = ReteNetwork::new();
    let handle = net.build_network(keyed_rule(), &mut ()).unwrap();
    net.assert_fact(Fact::new(1, "left").with_slot("k", 1), &mut ()).unwrap();
    net.assert_fact(Fact::new(2, "right").with_slot("k", 1), &mut ()).unwrap();

    let mut sides = Vec::new();
    for (id, token) in net.tokens().iter() {
        let join = net.join(token.owner).unwrap();
        assert!(join.memory(token.side).unwrap().contains(id, token.hash));
        sides.push((token.side, token.facts.clone()));
    }
    assert!(sides.contains(&(Side::Terminal, vec![FactId(1), FactId(2)])));
    assert!(sides.contains(&(Side::Left, Vec::new())));
    assert_eq!(net.join(handle.terminal).unwrap().terminal.as_ref().unwrap().memory.len(), 1);
}

fn fan_out_rule() -> Rule {
    Rule::new("fan")
        .with_condition(Condition::new("c"))
        .with_condition(Condition::new("a"))
        .with_condition(Condition::new("b"))
}

fn load_fan_out(net: &mut ReteNetwork) {
    net.build_network(fan_out_rule(), &mut ()).unwrap();
    for id in 1..=10 {
        net.assert_fact(Fact::new(id, "a"), &mut ()).unwrap();
        net.assert_fact(Fact::new(id + 100, "b"), &mut ()).unwrap();
    }
}

#[test]
fn kill_switch_bounds_fan_out() {
    let mut net = ReteNetwork::with_config(EngineConfig::default().with_max_drive_steps(10));
    load_fan_out(&mut net);
    let before = net.stats();

    // One `c` fact makes a left arrival for every `a` fact.
    let err = net.assert_fact(Fact::new(500, "c"), &mut ()).unwrap_err();

    assert!(matches!(
        err.kind,
        ErrorKind::LimitExceeded(SemanticLimit::MaxDriveSteps { limit: 10, .. })
    ));
    assert_eq!(net.stats().tokens, before.tokens);
    assert_eq!(net.stats().activations, 0);
    assert!(!net.contains_fact(FactId(500)));
    net.verify_structure().unwrap();

    let mut open = ReteNetwork::with_config(EngineConfig::unbounded());
    load_fan_out(&mut open);
    open.assert_fact(Fact::new(500, "c"), &mut ()).unwrap();
    assert_eq!(open.activations().count(), 100);
    assert_eq!(open.stats().last_drive_steps, 12);
}
