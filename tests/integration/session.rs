//! Sessions driven the way a rule interpreter drives them.

use trellis_engine::{Condition, EngineConfig, Expr, Rule, Session};
use trellis_foundation::{ErrorKind, Fact, FactId, SemanticLimit, Value};

fn countdown() -> Rule {
    Rule::new("tick")
        .with_condition(
            Condition::new("counter")
                .bind("n", "n")
                .test("n", Expr::gt(Expr::var("n"), Expr::value(0))),
        )
        .with_action("decrement")
}

#[test]
fn firing_loop_runs_to_quiescence() {
    let mut session = Session::with_config(EngineConfig::verifying());
    session.add_rule(countdown()).unwrap();
    session.insert(Fact::new(0, "counter").with_slot("n", 5)).unwrap();

    let mut fired = 0;
    while let Some(activation) = session.next_activation() {
        assert_eq!(activation.action.as_deref(), Some("decrement"));
        let Some(Value::Int(n)) = activation.bindings.get("n").cloned() else {
            panic!("counter without a count");
        };
        session.retract(activation.facts[0]).unwrap();
        session
            .insert(Fact::new(0, "counter").with_slot("n", n - 1))
            .unwrap();
        fired += 1;
    }

    assert_eq!(fired, 5);
    assert_eq!(session.memory().len(), 1);
    assert!(session.agenda().is_empty());
}

#[test]
fn replacing_a_rule_rematches_existing_facts() {
    let mut session = Session::with_config(EngineConfig::verifying());
    for n in 0..4 {
        session.insert(Fact::new(0, "counter").with_slot("n", n)).unwrap();
    }
    session.add_rule(countdown()).unwrap();
    assert_eq!(session.agenda().len(), 3);

    session
        .add_rule(
            Rule::new("tick").with_condition(
                Condition::new("counter")
                    .bind("n", "n")
                    .test("n", Expr::gt(Expr::var("n"), Expr::value(2))),
            ),
        )
        .unwrap();

    assert_eq!(session.agenda().len(), 1);
    assert_eq!(session.network().stats().rules, 1);
    assert!(session.agenda().peek().unwrap().action.is_none());
}

#[test]
fn duplicate_ids_are_rejected() {
    let mut session = Session::new();
    session.add_rule(countdown()).unwrap();
    session
        .assert_fact(Fact::new(7, "counter").with_slot("n", 1))
        .unwrap();

    let err = session
        .assert_fact(Fact::new(7, "counter").with_slot("n", 9))
        .unwrap_err();

    assert!(matches!(err.kind, ErrorKind::DuplicateFact(FactId(7))));
    assert_eq!(session.memory().len(), 1);
    assert_eq!(session.agenda().len(), 1);
    session.verify().unwrap();
}

#[test]
fn kill_switch_leaves_session_untouched() {
    let mut session = Session::with_config(EngineConfig::default().with_max_drive_steps(4));
    session
        .add_rule(
            Rule::new("cross")
                .with_condition(Condition::new("row"))
                .with_condition(Condition::new("col"))
                .with_condition(Condition::new("cell")),
        )
        .unwrap();
    for _ in 0..6 {
        session.insert(Fact::new(0, "col")).unwrap();
        session.insert(Fact::new(0, "cell")).unwrap();
    }

    let err = session.insert(Fact::new(0, "row")).unwrap_err();

    assert!(matches!(
        err.kind,
        ErrorKind::LimitExceeded(SemanticLimit::MaxDriveSteps { limit: 4, .. })
    ));
    assert_eq!(session.memory().len(), 12);
    assert!(session.agenda().is_empty());
    session.verify().unwrap();
}

#[test]
fn evaluation_errors_carry_context() {
    let mut session = Session::with_config(EngineConfig::verifying());
    session.add_rule(countdown()).unwrap();

    let err = session
        .insert(Fact::new(0, "counter").with_slot("n", "five"))
        .unwrap_err();

    assert!(matches!(err.kind, ErrorKind::TypeMismatch { .. }));
    let context = err.context.unwrap();
    assert_eq!(context.rule.as_deref(), Some("tick"));
    assert!(context.fact.is_some());
    assert!(session.memory().is_empty());
    session.verify().unwrap();
}
