//! Persistent in-memory working memory.
//!
//! `WorkingMemory` uses persistent maps, so cloning it is O(1) and a clone
//! is an independent snapshot of the fact set.

use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use trellis_foundation::{Error, Fact, FactId, Result};

use crate::store::FactStore;

/// In-memory fact store with a per-template index.
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct WorkingMemory {
    /// All live facts by id.
    facts: im::OrdMap<FactId, Fact>,
    /// Fact ids grouped by template name.
    by_template: im::HashMap<Arc<str>, im::OrdSet<FactId>>,
    /// Next id handed out by [`WorkingMemory::allocate_id`].
    next_id: u64,
}

impl WorkingMemory {
    /// Creates an empty working memory. Allocated ids start at 1.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: 1,
            ..Self::default()
        }
    }

    /// Returns the number of facts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.facts.len()
    }

    /// Returns true if there are no facts.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    /// Returns true if a fact with this id is present.
    #[must_use]
    pub fn contains(&self, id: FactId) -> bool {
        self.facts.contains_key(&id)
    }

    /// Reserves a fresh fact id, skipping any id already in use.
    pub fn allocate_id(&mut self) -> FactId {
        let mut id = FactId(self.next_id.max(1));
        while self.facts.contains_key(&id) {
            id = FactId(id.0 + 1);
        }
        self.next_id = id.0 + 1;
        id
    }

    /// Inserts a fact under its own id.
    ///
    /// # Errors
    /// Returns an error if a fact with the same id is already present.
    pub fn insert(&mut self, fact: Fact) -> Result<FactId> {
        let id = fact.id;
        if self.facts.contains_key(&id) {
            return Err(Error::duplicate_fact(id));
        }
        self.by_template
            .entry(fact.template.clone())
            .or_default()
            .insert(id);
        self.facts.insert(id, fact);
        self.next_id = self.next_id.max(id.0 + 1);
        Ok(id)
    }

    /// Removes a fact by id, returning it.
    ///
    /// # Errors
    /// Returns an error if no fact with this id is present.
    pub fn remove(&mut self, id: FactId) -> Result<Fact> {
        let fact = self.facts.remove(&id).ok_or_else(|| Error::fact_not_found(id))?;
        if let Some(ids) = self.by_template.get_mut(&fact.template) {
            ids.remove(&id);
            if ids.is_empty() {
                self.by_template.remove(&fact.template);
            }
        }
        Ok(fact)
    }

    /// Returns the template names that currently have facts.
    pub fn templates(&self) -> impl Iterator<Item = &str> {
        self.by_template.keys().map(|t| &**t)
    }
}

impl FactStore for WorkingMemory {
    fn lookup(&self, id: FactId) -> Option<&Fact> {
        self.facts.get(&id)
    }

    fn all_facts(&self) -> impl Iterator<Item = &Fact> {
        self.facts.values()
    }

    fn facts_with_template<'a>(&'a self, template: &'a str) -> impl Iterator<Item = &'a Fact> {
        self.by_template
            .get(template)
            .into_iter()
            .flat_map(|ids| ids.iter())
            .filter_map(|id| self.facts.get(id))
    }
}
