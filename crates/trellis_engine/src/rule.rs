//! Compiled rules.
//!
//! A rule is an ordered, non-empty list of [`Condition`]s plus terminal
//! tests evaluated on complete matches. Rules are validated when they are
//! built into the network.

use std::collections::BTreeSet;
use std::sync::Arc;

use trellis_foundation::{Error, Result};

use crate::expr::Expr;
use crate::pattern::Condition;

/// A compiled rule ready to be built into the network.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rule {
    /// Rule name; building a rule with an existing name replaces it.
    pub name: Arc<str>,
    /// Ordered left-hand-side conditions.
    pub conditions: Vec<Condition>,
    /// Tests evaluated on complete matches.
    pub tests: Vec<Expr>,
    /// Priority (higher fires first).
    pub salience: i32,
    /// Opaque reference to the right-hand side, passed through to the agenda.
    pub action: Option<Arc<str>>,
}

impl Rule {
    /// Creates a rule with no conditions.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.into(),
            conditions: Vec::new(),
            tests: Vec::new(),
            salience: 0,
            action: None,
        }
    }

    /// Appends a condition.
    #[must_use]
    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Appends a terminal test.
    #[must_use]
    pub fn with_test(mut self, test: Expr) -> Self {
        self.tests.push(test);
        self
    }

    /// Sets the salience (priority).
    #[must_use]
    pub fn with_salience(mut self, salience: i32) -> Self {
        self.salience = salience;
        self
    }

    /// Sets the action reference.
    #[must_use]
    pub fn with_action(mut self, action: &str) -> Self {
        self.action = Some(action.into());
        self
    }

    /// Number of conditions that contribute a fact to each match.
    #[must_use]
    pub fn positive_conditions(&self) -> usize {
        self.conditions.iter().filter(|c| c.is_positive()).count()
    }

    /// Checks that the rule can be built.
    ///
    /// # Errors
    /// Returns [`ErrorKind::InvalidRule`](trellis_foundation::ErrorKind::InvalidRule)
    /// if the rule has no conditions, a condition is both negated and an
    /// existence test, or a test references a variable that no earlier
    /// positive condition (or the condition itself) binds.
    pub fn validate(&self) -> Result<()> {
        if self.conditions.is_empty() {
            return Err(Error::invalid_rule(&self.name, "rule has no conditions"));
        }

        let mut bound: BTreeSet<Arc<str>> = BTreeSet::new();
        for (index, condition) in self.conditions.iter().enumerate() {
            if condition.negated && condition.exists {
                return Err(Error::invalid_rule(
                    &self.name,
                    format!("condition {index} is both negated and exists"),
                ));
            }

            let mut visible = bound.clone();
            visible.extend(condition.captured_variables());
            for predicate in condition.predicates() {
                if let Some(var) = predicate.variables().difference(&visible).next() {
                    return Err(Error::invalid_rule(
                        &self.name,
                        format!("condition {index} tests unbound variable ?{var}"),
                    ));
                }
            }

            if condition.is_positive() {
                bound = visible;
            }
        }

        for test in &self.tests {
            if let Some(var) = test.variables().difference(&bound).next() {
                return Err(Error::invalid_rule(
                    &self.name,
                    format!("terminal test uses unbound variable ?{var}"),
                ));
            }
        }

        Ok(())
    }
}
