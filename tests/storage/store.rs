//! Integration tests for the FactStore trait
//!
//! A minimal store relying on the provided template filter.

use trellis_foundation::{Fact, FactId};
use trellis_storage::FactStore;

struct VecStore(Vec<Fact>);

impl FactStore for VecStore {
    fn lookup(&self, id: FactId) -> Option<&Fact> {
        self.0.iter().find(|f| f.id == id)
    }

    fn all_facts(&self) -> impl Iterator<Item = &Fact> {
        self.0.iter()
    }
}

#[test]
fn default_template_filter() {
    let store = VecStore(vec![
        Fact::new(1, "order"),
        Fact::new(2, "customer"),
        Fact::new(3, "order"),
    ]);

    let orders: Vec<_> = store.facts_with_template("order").map(|f| f.id).collect();
    assert_eq!(orders, vec![FactId(1), FactId(3)]);
    assert_eq!(store.facts_with_template("shipment").count(), 0);
    assert_eq!(store.lookup(FactId(2)).map(|f| &*f.template), Some("customer"));
}
