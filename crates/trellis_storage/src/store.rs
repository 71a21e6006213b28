//! Read-only fact store interface.

use trellis_foundation::{Fact, FactId};

/// Read access to the facts currently in working memory.
///
/// The matching network never mutates facts; it only looks them up. The
/// full scans are used by the naive consistency checker, never on the
/// propagation hot path.
pub trait FactStore {
    /// Looks up a fact by id.
    fn lookup(&self, id: FactId) -> Option<&Fact>;

    /// Iterates every fact in the store, in id order.
    fn all_facts(&self) -> impl Iterator<Item = &Fact>;

    /// Iterates the facts of one template, in id order.
    fn facts_with_template<'a>(&'a self, template: &'a str) -> impl Iterator<Item = &'a Fact> {
        self.all_facts().filter(move |f| &*f.template == template)
    }
}
