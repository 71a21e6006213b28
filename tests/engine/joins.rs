//! Integration tests for positive joins
//!
//! Tests variable joins, predicate tests, sequence patterns, activation
//! identity and retract completeness.

use trellis_engine::{
    ActivationList, AgendaEvent, Condition, ElementTest, Expr, Op, ReteNetwork, Rule,
};
use trellis_foundation::{ErrorKind, Fact, FactId, Value};

fn edge(id: u64, from: &str, to: &str) -> Fact {
    Fact::new(id, "edge").with_slot("from", from).with_slot("to", to)
}

fn path_rule() -> Rule {
    Rule::new("path2")
        .with_condition(Condition::new("edge").bind("from", "a").bind("to", "b"))
        .with_condition(Condition::new("edge").bind("from", "b").bind("to", "c"))
}

// =============================================================================
// Joins
// =============================================================================

#[test]
fn chains_join_on_shared_variable() {
    let mut net = ReteNetwork::new();
    let mut agenda = ActivationList::new();
    net.build_network(path_rule(), &mut agenda).unwrap();

    net.assert_fact(edge(1, "x", "y"), &mut agenda).unwrap();
    net.assert_fact(edge(2, "y", "z"), &mut agenda).unwrap();
    net.assert_fact(edge(3, "q", "r"), &mut agenda).unwrap();

    assert_eq!(agenda.len(), 1);
    let activation = agenda.peek().unwrap();
    assert_eq!(activation.facts, vec![FactId(1), FactId(2)]);
    assert_eq!(activation.bindings.get("a"), Some(&Value::from("x")));
    assert_eq!(activation.bindings.get("c"), Some(&Value::from("z")));
    assert_eq!(activation.specificity, 2);
    net.verify_structure().unwrap();
}

#[test]
fn cross_condition_predicate() {
    let mut net = ReteNetwork::new();
    let mut agenda = ActivationList::new();
    net.build_network(
        Rule::new("raise")
            .with_condition(Condition::new("old").bind("pay", "p"))
            .with_condition(
                Condition::new("new")
                    .bind("pay", "q")
                    .test("pay", Expr::gt(Expr::var("q"), Expr::var("p"))),
            ),
        &mut agenda,
    )
    .unwrap();

    net.assert_fact(Fact::new(1, "old").with_slot("pay", 100), &mut agenda).unwrap();
    net.assert_fact(Fact::new(2, "new").with_slot("pay", 90), &mut agenda).unwrap();
    net.assert_fact(Fact::new(3, "new").with_slot("pay", 120), &mut agenda).unwrap();

    assert_eq!(agenda.len(), 1);
    assert!(agenda.contains("raise", &[FactId(1), FactId(3)]));
}

#[test]
fn sequence_patterns_capture_runs() {
    let mut net = ReteNetwork::new();
    net.build_network(
        Rule::new("split").with_condition(Condition::new("list").sequence(
            "items",
            [
                ElementTest::Multi("before".into()),
                ElementTest::Constant(Value::symbol("sep")),
                ElementTest::Multi("after".into()),
            ],
        )),
        &mut (),
    )
    .unwrap();

    let items = Value::seq([Value::symbol("a"), Value::symbol("sep"), Value::symbol("b")]);
    net.assert_fact(Fact::new(1, "list").with_slot("items", items), &mut ())
        .unwrap();
    net.assert_fact(
        Fact::new(2, "list").with_slot("items", Value::seq([Value::symbol("a")])),
        &mut (),
    )
    .unwrap();

    let found = net.activations_for("split");
    assert_eq!(found.len(), 1);
    assert_eq!(
        found[0].bindings.get("before"),
        Some(&Value::seq([Value::symbol("a")]))
    );
    assert_eq!(
        found[0].bindings.get("after"),
        Some(&Value::seq([Value::symbol("b")]))
    );
}

#[test]
fn terminal_test_sees_all_bindings() {
    let mut net = ReteNetwork::new();
    net.build_network(
        Rule::new("sum")
            .with_condition(Condition::new("n").bind("v", "x"))
            .with_condition(Condition::new("m").bind("v", "y"))
            .with_test(Expr::call(
                Op::Eq,
                [
                    Expr::call(Op::Add, [Expr::var("x"), Expr::var("y")]),
                    Expr::value(10),
                ],
            )),
        &mut (),
    )
    .unwrap();

    for (id, v) in [(1, 3), (2, 4), (3, 5)] {
        net.assert_fact(Fact::new(id, "n").with_slot("v", v), &mut ()).unwrap();
        net.assert_fact(Fact::new(id + 10, "m").with_slot("v", 10 - v), &mut ())
            .unwrap();
    }
    assert_eq!(net.activations_for("sum").len(), 3);
}

// =============================================================================
// Activation Identity
// =============================================================================

#[test]
fn fact_sets_identify_activations() {
    let mut net = ReteNetwork::new();
    let mut events = Vec::new();
    net.build_network(
        Rule::new("pair")
            .with_condition(Condition::new("p"))
            .with_condition(Condition::new("p")),
        &mut events,
    )
    .unwrap();

    for id in 1..=3 {
        net.assert_fact(Fact::new(id, "p"), &mut events).unwrap();
    }

    // Three unordered pairs, each published exactly once.
    let published: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            AgendaEvent::Publish(a) => Some(a.facts.clone()),
            AgendaEvent::Withdraw(_) => None,
        })
        .collect();
    assert_eq!(
        published,
        vec![
            vec![FactId(1), FactId(2)],
            vec![FactId(1), FactId(3)],
            vec![FactId(2), FactId(3)],
        ]
    );

    // Both orderings must go before the pair is withdrawn.
    events.clear();
    net.retract_fact(FactId(2), "p", &mut events).unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(net.activations_for("pair").len(), 1);
    net.verify_structure().unwrap();
}

#[test]
fn different_rules_same_facts_are_distinct() {
    let mut net = ReteNetwork::new();
    let mut agenda = ActivationList::new();
    net.build_network(Rule::new("one").with_condition(Condition::new("p")), &mut agenda)
        .unwrap();
    net.build_network(Rule::new("two").with_condition(Condition::new("p")), &mut agenda)
        .unwrap();
    net.assert_fact(Fact::new(1, "p"), &mut agenda).unwrap();

    assert_eq!(agenda.len(), 2);
}

// =============================================================================
// Retract Completeness
// =============================================================================

#[test]
fn retracted_facts_leave_no_trace() {
    let mut net = ReteNetwork::new();
    net.build_network(path_rule(), &mut ()).unwrap();
    net.build_network(
        Rule::new("loop")
            .with_condition(Condition::new("edge").bind("from", "a").bind("to", "b"))
            .with_condition(Condition::new("edge").bind("from", "b").bind("to", "a")),
        &mut (),
    )
    .unwrap();

    let names = ["a", "b", "c", "d"];
    let mut id = 0;
    for from in names {
        for to in names {
            id += 1;
            net.assert_fact(edge(id, from, to), &mut ()).unwrap();
        }
    }
    assert!(net.stats().activations > 0);

    for gone in (1..=id).step_by(3) {
        net.retract_fact(FactId(gone), "edge", &mut ()).unwrap();
        assert_eq!(net.tokens_with_fact(FactId(gone)), 0);
        assert!(net.activations().all(|a| !a.facts.contains(&FactId(gone))));
    }
    for (_, token) in net.tokens().iter() {
        assert!(token.has_distinct_facts());
    }
    net.verify_structure().unwrap();
}

#[test]
fn template_must_match_on_retract() {
    let mut net = ReteNetwork::new();
    net.assert_fact(edge(1, "a", "b"), &mut ()).unwrap();

    let err = net.retract_fact(FactId(1), "node", &mut ()).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::TemplateMismatch { .. }));

    // Unknown ids are ignored.
    net.retract_fact(FactId(99), "edge", &mut ()).unwrap();
}
