//! Brute-force cross-check of the network against a fact store.
//!
//! The checker recomputes every memory of a rule from scratch by
//! depth-first backtracking over the store and compares the result with
//! what the network holds. Both sides are reduced to multisets of canonical
//! keys, a hash of the sorted binding pairs and the sorted fact ids, so two
//! tokens with the same facts in a different order count as the same match.
//!
//! This is quadratic or worse in the number of facts. It exists for tests
//! and for [`EngineConfig::verify`](crate::EngineConfig::verify).

use std::collections::HashMap;
use std::fmt;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;

use tracing::debug;
use trellis_foundation::{Error, FactId, Result};
use trellis_storage::FactStore;

use crate::beta::BetaMemory;
use crate::join::JoinId;
use crate::network::ReteNetwork;
use crate::pattern::{Bindings, Condition};
use crate::rule::Rule;

type Multiset = HashMap<u64, usize>;

/// Canonical identity of a match.
#[must_use]
pub fn canonical_key(facts: &[FactId], bindings: &Bindings) -> u64 {
    let mut sorted = facts.to_vec();
    sorted.sort_unstable();
    let mut hasher = DefaultHasher::new();
    bindings.hash(&mut hasher);
    sorted.hash(&mut hasher);
    hasher.finish()
}

/// Which memory of a rule diverged.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MemoryLocation {
    /// Left memory of the join at `depth`.
    Left {
        /// The join.
        join: JoinId,
        /// Condition index.
        depth: usize,
    },
    /// Right memory of the join at `depth`.
    Right {
        /// The join.
        join: JoinId,
        /// Condition index.
        depth: usize,
    },
    /// Terminal memory of the rule.
    Terminal {
        /// The last join.
        join: JoinId,
    },
}

impl fmt::Display for MemoryLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Left { join, depth } => write!(f, "left memory of {join} (depth {depth})"),
            Self::Right { join, depth } => write!(f, "right memory of {join} (depth {depth})"),
            Self::Terminal { join } => write!(f, "terminal memory of {join}"),
        }
    }
}

/// A memory whose contents differ from the recomputed matches.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Divergence {
    /// Where.
    pub location: MemoryLocation,
    /// Recomputed matches the network lacks (counting multiplicity).
    pub missing: usize,
    /// Network tokens with no recomputed counterpart.
    pub extra: usize,
}

/// Outcome of checking one rule.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StabilityReport {
    /// Rule checked.
    pub rule: Arc<str>,
    /// Memories that differ. Empty when the network is consistent.
    pub divergences: Vec<Divergence>,
}

impl StabilityReport {
    /// Returns true if every memory matched.
    #[must_use]
    pub fn is_stable(&self) -> bool {
        self.divergences.is_empty()
    }
}

impl fmt::Display for StabilityReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_stable() {
            return write!(f, "rule {} is stable", self.rule);
        }
        write!(f, "rule {} diverges:", self.rule)?;
        for d in &self.divergences {
            write!(f, "\n  {}: {} missing, {} extra", d.location, d.missing, d.extra)?;
        }
        Ok(())
    }
}

fn compare(location: MemoryLocation, expected: &Multiset, actual: &Multiset) -> Option<Divergence> {
    let mut missing = 0;
    let mut extra = 0;
    for (key, &want) in expected {
        let have = actual.get(key).copied().unwrap_or(0);
        missing += want.saturating_sub(have);
    }
    for (key, &have) in actual {
        let want = expected.get(key).copied().unwrap_or(0);
        extra += have.saturating_sub(want);
    }
    (missing > 0 || extra > 0).then_some(Divergence {
        location,
        missing,
        extra,
    })
}

/// Every fact in the store that passes a condition's slot tests, keyed as
/// a one-fact match.
fn expected_right(condition: &Condition, store: &impl FactStore) -> Multiset {
    let mut set = Multiset::new();
    for fact in store.facts_with_template(&condition.template) {
        if let Some(captured) = condition.capture(fact) {
            *set.entry(canonical_key(&[fact.id], &captured)).or_default() += 1;
        }
    }
    set
}

impl ReteNetwork {
    /// Returns true if every memory of the rule equals a brute-force
    /// recomputation over `store`.
    ///
    /// # Errors
    /// Returns an error if the rule is unknown, a test fails to evaluate,
    /// or a memory holds a dead token.
    pub fn check_stability(&self, rule: &str, store: &impl FactStore) -> Result<bool> {
        Ok(self.stability_report(rule, store)?.is_stable())
    }

    /// Like [`ReteNetwork::check_stability`], reporting which memories
    /// diverged.
    ///
    /// # Errors
    /// See [`ReteNetwork::check_stability`].
    pub fn stability_report(&self, rule: &str, store: &impl FactStore) -> Result<StabilityReport> {
        let entry = self.rules.get(rule).ok_or_else(|| Error::unknown_rule(rule))?;
        let expected = self.expected_levels(&entry.rule, store)?;

        let mut divergences = Vec::new();
        for (depth, &id) in entry.joins.iter().enumerate() {
            let join = self.join_ref(id)?;

            let left = self.memory_multiset(&join.left_memory)?;
            divergences.extend(compare(MemoryLocation::Left { join: id, depth }, &expected[depth], &left));

            let admitted = expected_right(&entry.rule.conditions[depth], store);
            let right = self.memory_multiset(&join.right_memory)?;
            divergences.extend(compare(MemoryLocation::Right { join: id, depth }, &admitted, &right));

            if let Some(terminal) = &join.terminal {
                let complete = self.memory_multiset(&terminal.memory)?;
                divergences.extend(compare(
                    MemoryLocation::Terminal { join: id },
                    &expected[entry.joins.len()],
                    &complete,
                ));
            }
        }

        let report = StabilityReport {
            rule: entry.rule.name.clone(),
            divergences,
        };
        if !report.is_stable() {
            debug!(%report, "stability check failed");
        }
        Ok(report)
    }

    fn memory_multiset(&self, memory: &BetaMemory) -> Result<Multiset> {
        let mut set = Multiset::new();
        for id in memory.iter() {
            let token = self
                .tokens
                .get(id)
                .ok_or_else(|| Error::structural(format!("memory holds dead token {id:?}")))?;
            *set.entry(canonical_key(&token.facts, &token.bindings)).or_default() += 1;
        }
        Ok(set)
    }

    /// Recomputes the matches at every depth of a rule.
    ///
    /// Entry `d` holds the partial matches entering condition `d`; the last
    /// entry holds complete matches that pass the rule's tests.
    fn expected_levels(&self, rule: &Rule, store: &impl FactStore) -> Result<Vec<Multiset>> {
        let depth_count = rule.conditions.len();
        let mut levels = vec![Multiset::new(); depth_count + 1];
        let mut stack = vec![(0, Vec::<FactId>::new(), Bindings::new())];

        while let Some((depth, facts, bindings)) = stack.pop() {
            if depth == depth_count {
                let mut passes = true;
                for test in &rule.tests {
                    if !self.evaluate_test(&rule.name, test, &bindings)? {
                        passes = false;
                        break;
                    }
                }
                if passes {
                    *levels[depth].entry(canonical_key(&facts, &bindings)).or_default() += 1;
                }
                continue;
            }

            *levels[depth].entry(canonical_key(&facts, &bindings)).or_default() += 1;
            let condition = &rule.conditions[depth];
            let matches = self.naive_matches(rule, condition, &facts, &bindings, store)?;
            if condition.negated {
                if matches.is_empty() {
                    stack.push((depth + 1, facts, bindings));
                }
            } else if condition.exists {
                if !matches.is_empty() {
                    stack.push((depth + 1, facts, bindings));
                }
            } else {
                for (fact, merged) in matches {
                    let mut extended = facts.clone();
                    extended.push(fact);
                    stack.push((depth + 1, extended, merged));
                }
            }
        }
        Ok(levels)
    }

    /// Facts not already in `facts` that satisfy `condition` given
    /// `bindings`, with the merged bindings of each.
    fn naive_matches(
        &self,
        rule: &Rule,
        condition: &Condition,
        facts: &[FactId],
        bindings: &Bindings,
        store: &impl FactStore,
    ) -> Result<Vec<(FactId, Bindings)>> {
        let mut found = Vec::new();
        'facts: for fact in store.facts_with_template(&condition.template) {
            if facts.contains(&fact.id) {
                continue;
            }
            let Some(captured) = condition.capture(fact) else {
                continue;
            };
            let Some(merged) = bindings.merge(&captured) else {
                continue;
            };
            for test in condition.predicates() {
                if !self.evaluate_test(&rule.name, test, &merged)? {
                    continue 'facts;
                }
            }
            found.push((fact.id, merged));
        }
        Ok(found)
    }
}
