//! Conditions, slot tests, and variable capture.
//!
//! A [`Condition`] is one pattern of a rule's left-hand side. Matching a
//! single fact against a condition ("capture") checks the template and every
//! non-predicate slot test and yields the variable [`Bindings`] the fact
//! contributes. Predicate tests need bindings from other facts, so they are
//! evaluated later by the join that owns the condition.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use trellis_foundation::{Fact, LtMap, Value};

use crate::expr::Expr;

// =============================================================================
// Bindings
// =============================================================================

/// Variable bindings from a (partial) match.
///
/// Backed by a persistent ordered map, so cloning is O(1) and iteration is
/// always in variable-name order.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct Bindings {
    values: LtMap<Arc<str>, Value>,
}

impl Bindings {
    /// Creates empty bindings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a variable, replacing any previous value.
    pub fn set(&mut self, var: impl Into<Arc<str>>, value: Value) {
        self.values = self.values.insert(var.into(), value);
    }

    /// Returns a copy with one more binding.
    #[must_use]
    pub fn with(mut self, var: impl Into<Arc<str>>, value: impl Into<Value>) -> Self {
        self.set(var, value.into());
        self
    }

    /// Gets a variable's value.
    #[must_use]
    pub fn get(&self, var: &str) -> Option<&Value> {
        self.values.get(var)
    }

    /// Returns true if the variable is bound.
    #[must_use]
    pub fn contains(&self, var: &str) -> bool {
        self.values.contains_key(var)
    }

    /// Returns the number of bound variables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if nothing is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterates bindings in variable-name order.
    pub fn iter(&self) -> impl Iterator<Item = (&Arc<str>, &Value)> {
        self.values.iter()
    }

    /// Returns the bound variable names, sorted.
    pub fn variables(&self) -> impl Iterator<Item = &Arc<str>> {
        self.values.keys()
    }

    /// Combines two binding sets.
    ///
    /// Returns `None` if a variable bound on both sides has different
    /// values.
    #[must_use]
    pub fn merge(&self, other: &Bindings) -> Option<Bindings> {
        let (small, large) = if self.len() <= other.len() {
            (self, other)
        } else {
            (other, self)
        };
        for (var, value) in small.iter() {
            if large.get(var).is_some_and(|existing| existing != value) {
                return None;
            }
        }
        Some(Bindings {
            values: large.values.union(&small.values),
        })
    }
}

impl fmt::Debug for Bindings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.iter().map(|(k, v)| (format!("?{k}"), v)))
            .finish()
    }
}

impl<K: Into<Arc<str>>> FromIterator<(K, Value)> for Bindings {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        let mut bindings = Bindings::new();
        for (k, v) in iter {
            bindings.set(k, v);
        }
        bindings
    }
}

// =============================================================================
// Slot Tests
// =============================================================================

/// Test applied to one element of a sequence-valued slot.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ElementTest {
    /// The element equals this value.
    Constant(Value),
    /// Capture exactly one element into a variable.
    Variable(Arc<str>),
    /// Capture zero or more consecutive elements as a sequence.
    Multi(Arc<str>),
    /// Any single element.
    Any,
    /// Any run of zero or more elements.
    AnyMulti,
}

impl ElementTest {
    /// Returns true if this test consumes exactly one element.
    #[must_use]
    pub const fn is_single(&self) -> bool {
        matches!(self, Self::Constant(_) | Self::Variable(_) | Self::Any)
    }
}

/// Test applied to one slot of a fact.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SlotTest {
    /// The slot equals this value.
    Constant(Value),
    /// Capture the slot value (nil when absent).
    Variable(Arc<str>),
    /// The slot holds a sequence matching these element tests.
    Sequence(Vec<ElementTest>),
    /// Anything, including an absent slot.
    Wildcard,
    /// A predicate over the match bindings, evaluated at the join.
    Predicate(Expr),
}

impl SlotTest {
    /// Returns true for predicate tests, which the alpha layer ignores.
    #[must_use]
    pub const fn is_predicate(&self) -> bool {
        matches!(self, Self::Predicate(_))
    }
}

// =============================================================================
// Condition
// =============================================================================

/// One pattern of a rule's left-hand side.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Condition {
    /// Template the fact must have.
    pub template: Arc<str>,
    /// Ordered slot tests.
    pub slots: Vec<(Arc<str>, SlotTest)>,
    /// Satisfied only when no fact matches.
    pub negated: bool,
    /// Satisfied once when at least one fact matches. Never also `negated`.
    pub exists: bool,
}

impl Condition {
    /// Creates a condition on a template with no slot tests.
    #[must_use]
    pub fn new(template: &str) -> Self {
        Self {
            template: template.into(),
            slots: Vec::new(),
            negated: false,
            exists: false,
        }
    }

    /// Adds a slot test.
    #[must_use]
    pub fn slot(mut self, slot: &str, test: SlotTest) -> Self {
        self.slots.push((slot.into(), test));
        self
    }

    /// Requires a slot to equal a constant.
    #[must_use]
    pub fn constant(self, slot: &str, value: impl Into<Value>) -> Self {
        self.slot(slot, SlotTest::Constant(value.into()))
    }

    /// Captures a slot into a variable.
    #[must_use]
    pub fn bind(self, slot: &str, var: &str) -> Self {
        self.slot(slot, SlotTest::Variable(var.into()))
    }

    /// Matches a sequence-valued slot element by element.
    #[must_use]
    pub fn sequence(self, slot: &str, elements: impl IntoIterator<Item = ElementTest>) -> Self {
        self.slot(slot, SlotTest::Sequence(elements.into_iter().collect()))
    }

    /// Adds a predicate test.
    #[must_use]
    pub fn test(self, slot: &str, expr: Expr) -> Self {
        self.slot(slot, SlotTest::Predicate(expr))
    }

    /// Marks the condition as negated.
    #[must_use]
    pub fn negate(mut self) -> Self {
        self.negated = true;
        self
    }

    /// Marks the condition as an existence test.
    #[must_use]
    pub fn exists(mut self) -> Self {
        self.exists = true;
        self
    }

    /// Returns true for plain conditions that contribute a fact to matches.
    #[must_use]
    pub const fn is_positive(&self) -> bool {
        !self.negated && !self.exists
    }

    /// Returns the predicate expressions of this condition.
    pub fn predicates(&self) -> impl Iterator<Item = &Expr> {
        self.slots.iter().filter_map(|(_, test)| match test {
            SlotTest::Predicate(expr) => Some(expr),
            _ => None,
        })
    }

    /// Returns the variables captured by this condition's slot tests.
    #[must_use]
    pub fn captured_variables(&self) -> BTreeSet<Arc<str>> {
        let mut vars = BTreeSet::new();
        for (_, test) in &self.slots {
            match test {
                SlotTest::Variable(var) => {
                    vars.insert(var.clone());
                }
                SlotTest::Sequence(elements) => {
                    for element in elements {
                        if let ElementTest::Variable(var) | ElementTest::Multi(var) = element {
                            vars.insert(var.clone());
                        }
                    }
                }
                _ => {}
            }
        }
        vars
    }

    /// Matches a single fact against this condition.
    ///
    /// Checks the template and every non-predicate slot test. Returns the
    /// first successful capture, trying longer multi-valued captures first.
    #[must_use]
    pub fn capture(&self, fact: &Fact) -> Option<Bindings> {
        if fact.template != self.template {
            return None;
        }
        let tests: Vec<_> = self
            .slots
            .iter()
            .filter(|(_, test)| !test.is_predicate())
            .collect();
        capture_slots(&tests, fact, Bindings::new())
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negated {
            write!(f, "(not ")?;
        } else if self.exists {
            write!(f, "(exists ")?;
        }
        write!(f, "({}", self.template)?;
        for (slot, test) in &self.slots {
            match test {
                SlotTest::Constant(v) => write!(f, " ({slot} {v})")?,
                SlotTest::Variable(var) => write!(f, " ({slot} ?{var})")?,
                SlotTest::Wildcard => write!(f, " ({slot} ?)")?,
                SlotTest::Predicate(expr) => write!(f, " ({slot} :{expr})")?,
                SlotTest::Sequence(elements) => {
                    write!(f, " ({slot}")?;
                    for element in elements {
                        match element {
                            ElementTest::Constant(v) => write!(f, " {v}")?,
                            ElementTest::Variable(var) => write!(f, " ?{var}")?,
                            ElementTest::Multi(var) => write!(f, " $?{var}")?,
                            ElementTest::Any => write!(f, " ?")?,
                            ElementTest::AnyMulti => write!(f, " $?")?,
                        }
                    }
                    write!(f, ")")?;
                }
            }
        }
        write!(f, ")")?;
        if self.negated || self.exists {
            write!(f, ")")?;
        }
        Ok(())
    }
}

// =============================================================================
// Capture
// =============================================================================

/// Binds `var` to `value`, or checks consistency if it is already bound.
fn unify(bindings: &Bindings, var: &Arc<str>, value: Value) -> Option<Bindings> {
    match bindings.get(var) {
        Some(existing) if *existing == value => Some(bindings.clone()),
        Some(_) => None,
        None => Some(bindings.clone().with(var.clone(), value)),
    }
}

fn capture_slots(tests: &[&(Arc<str>, SlotTest)], fact: &Fact, bindings: Bindings) -> Option<Bindings> {
    let Some(((slot, test), rest)) = tests.split_first().map(|(first, rest)| (*first, rest)) else {
        return Some(bindings);
    };
    match test {
        SlotTest::Constant(expected) => {
            if fact.slot_or_nil(slot) == *expected {
                capture_slots(rest, fact, bindings)
            } else {
                None
            }
        }
        SlotTest::Variable(var) => {
            let bindings = unify(&bindings, var, fact.slot_or_nil(slot))?;
            capture_slots(rest, fact, bindings)
        }
        SlotTest::Wildcard | SlotTest::Predicate(_) => capture_slots(rest, fact, bindings),
        SlotTest::Sequence(elements) => {
            let items: Vec<Value> = fact.slot(slot)?.as_seq()?.iter().cloned().collect();
            match_elements(elements, &items, &bindings, &mut |b: &Bindings| {
                capture_slots(rest, fact, b.clone())
            })
        }
    }
}

/// Matches element tests against sequence items by backtracking.
///
/// `then` receives each complete element match and continues with the
/// remaining slot tests; the first `Some` it returns wins.
fn match_elements(
    tests: &[ElementTest],
    items: &[Value],
    bindings: &Bindings,
    then: &mut dyn FnMut(&Bindings) -> Option<Bindings>,
) -> Option<Bindings> {
    let Some((test, rest)) = tests.split_first() else {
        return if items.is_empty() { then(bindings) } else { None };
    };

    if test.is_single() {
        let (item, remaining) = items.split_first()?;
        let next = match test {
            ElementTest::Constant(expected) if expected == item => bindings.clone(),
            ElementTest::Variable(var) => unify(bindings, var, item.clone())?,
            ElementTest::Any => bindings.clone(),
            _ => return None,
        };
        return match_elements(rest, remaining, &next, then);
    }

    let required = rest.iter().filter(|t| t.is_single()).count();
    let longest = items.len().checked_sub(required)?;
    for len in (0..=longest).rev() {
        let next = match test {
            ElementTest::Multi(var) => {
                let captured = Value::Seq(items[..len].iter().cloned().collect());
                match unify(bindings, var, captured) {
                    Some(next) => next,
                    None => continue,
                }
            }
            _ => bindings.clone(),
        };
        if let Some(result) = match_elements(rest, &items[len..], &next, then) {
            return Some(result);
        }
    }
    None
}
