//! Integration tests for WorkingMemory
//!
//! Tests id allocation, the template index and snapshot semantics under a
//! seeded random workload.

use std::collections::BTreeMap;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use trellis_foundation::{ErrorKind, Fact, FactId};
use trellis_storage::{FactStore, WorkingMemory};

const TEMPLATES: [&str; 3] = ["order", "customer", "hold"];

#[test]
fn allocated_ids_are_fresh() {
    let mut wm = WorkingMemory::new();
    let a = wm.allocate_id();
    wm.insert(Fact::new(a, "order")).unwrap();
    wm.insert(Fact::new(10, "order")).unwrap();

    let b = wm.allocate_id();
    assert_eq!(a, FactId(1));
    assert_eq!(b, FactId(11));
}

#[test]
fn errors_carry_the_id() {
    let mut wm = WorkingMemory::new();
    wm.insert(Fact::new(5, "order")).unwrap();

    let dup = wm.insert(Fact::new(5, "hold")).unwrap_err();
    assert!(matches!(dup.kind, ErrorKind::DuplicateFact(FactId(5))));

    let missing = wm.remove(FactId(6)).unwrap_err();
    assert!(matches!(missing.kind, ErrorKind::FactNotFound(FactId(6))));
}

#[test]
fn random_workload_matches_model() {
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    let mut wm = WorkingMemory::new();
    let mut model: BTreeMap<FactId, &str> = BTreeMap::new();

    for _ in 0..2000 {
        if model.is_empty() || rng.gen_bool(0.6) {
            let template = TEMPLATES[rng.gen_range(0..TEMPLATES.len())];
            let id = wm.allocate_id();
            wm.insert(Fact::new(id, template)).unwrap();
            model.insert(id, template);
        } else {
            let index = rng.gen_range(0..model.len());
            let id = *model.keys().nth(index).unwrap();
            let removed = wm.remove(id).unwrap();
            assert_eq!(&*removed.template, model.remove(&id).unwrap());
        }
    }

    assert_eq!(wm.len(), model.len());
    for template in TEMPLATES {
        let stored: Vec<FactId> = wm.facts_with_template(template).map(|f| f.id).collect();
        let expected: Vec<FactId> = model
            .iter()
            .filter(|(_, t)| **t == template)
            .map(|(id, _)| *id)
            .collect();
        assert_eq!(stored, expected, "template {template}");
    }
    let all: Vec<FactId> = wm.all_facts().map(|f| f.id).collect();
    assert_eq!(all, model.keys().copied().collect::<Vec<_>>());
}

#[test]
fn snapshots_survive_mutation() {
    let mut wm = WorkingMemory::new();
    for id in 1..=100_u64 {
        wm.insert(Fact::new(id, "order")).unwrap();
    }
    let snapshot = wm.clone();
    for id in 1..=50_u64 {
        wm.remove(FactId(id)).unwrap();
    }

    assert_eq!(snapshot.len(), 100);
    assert_eq!(wm.len(), 50);
    assert_eq!(snapshot.facts_with_template("order").count(), 100);
}
