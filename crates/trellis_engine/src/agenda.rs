//! Activations and the agenda interface.
//!
//! The network tells an [`Agenda`] when a rule becomes satisfied by a set of
//! facts ([`Agenda::publish`]) and when it stops being satisfied
//! ([`Agenda::withdraw`]). Conflict resolution and firing are the agenda's
//! business; [`ActivationList`] is a simple salience-ordered agenda.

use std::sync::Arc;

use trellis_foundation::FactId;

use crate::pattern::Bindings;

// =============================================================================
// Activation
// =============================================================================

/// Identity of an activation: the rule and the sorted set of facts.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ActivationKey {
    /// Rule name.
    pub rule: Arc<str>,
    /// Facts of the match, ascending.
    pub facts: Vec<FactId>,
}

impl ActivationKey {
    /// Creates a key, sorting the fact ids.
    #[must_use]
    pub fn new(rule: Arc<str>, mut facts: Vec<FactId>) -> Self {
        facts.sort_unstable();
        Self { rule, facts }
    }
}

/// A satisfied rule instance.
#[derive(Clone, Debug, PartialEq)]
pub struct Activation {
    /// Which rule.
    pub rule: Arc<str>,
    /// Rule salience.
    pub salience: i32,
    /// Facts of the match, ascending.
    pub facts: Vec<FactId>,
    /// Variable bindings of the match.
    pub bindings: Bindings,
    /// Action reference of the rule.
    pub action: Option<Arc<str>>,
    /// Number of positive conditions of the rule.
    pub specificity: usize,
}

impl Activation {
    /// Returns this activation's identity.
    #[must_use]
    pub fn key(&self) -> ActivationKey {
        ActivationKey {
            rule: self.rule.clone(),
            facts: self.facts.clone(),
        }
    }
}

// =============================================================================
// Agenda
// =============================================================================

/// Receiver of activation changes.
pub trait Agenda {
    /// A new activation became satisfied.
    fn publish(&mut self, activation: Activation);

    /// The activation with this identity is no longer satisfied.
    fn withdraw(&mut self, rule: &str, facts: &[FactId]);
}

/// A recorded agenda change.
#[derive(Clone, Debug, PartialEq)]
pub enum AgendaEvent {
    /// An activation was published.
    Publish(Activation),
    /// An activation was withdrawn.
    Withdraw(ActivationKey),
}

impl AgendaEvent {
    /// Returns the identity the event refers to.
    #[must_use]
    pub fn key(&self) -> ActivationKey {
        match self {
            Self::Publish(activation) => activation.key(),
            Self::Withdraw(key) => key.clone(),
        }
    }

    /// Delivers this event to an agenda.
    pub fn deliver(self, agenda: &mut impl Agenda) {
        match self {
            Self::Publish(activation) => agenda.publish(activation),
            Self::Withdraw(key) => agenda.withdraw(&key.rule, &key.facts),
        }
    }
}

/// Records every event in order.
impl Agenda for Vec<AgendaEvent> {
    fn publish(&mut self, activation: Activation) {
        self.push(AgendaEvent::Publish(activation));
    }

    fn withdraw(&mut self, rule: &str, facts: &[FactId]) {
        self.push(AgendaEvent::Withdraw(ActivationKey {
            rule: rule.into(),
            facts: facts.to_vec(),
        }));
    }
}

/// Discards every event.
impl Agenda for () {
    fn publish(&mut self, _activation: Activation) {}

    fn withdraw(&mut self, _rule: &str, _facts: &[FactId]) {}
}

// =============================================================================
// Activation List
// =============================================================================

/// Agenda holding the current activations, highest priority first.
///
/// Ordering is by salience (descending), then specificity (descending),
/// then publication order.
#[derive(Clone, Debug, Default)]
pub struct ActivationList {
    activations: Vec<Activation>,
}

impl ActivationList {
    /// Creates an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of activations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.activations.len()
    }

    /// Returns true if there are no activations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.activations.is_empty()
    }

    /// Iterates activations in priority order.
    pub fn iter(&self) -> impl Iterator<Item = &Activation> {
        self.activations.iter()
    }

    /// Returns the highest-priority activation.
    #[must_use]
    pub fn peek(&self) -> Option<&Activation> {
        self.activations.first()
    }

    /// Removes and returns the highest-priority activation.
    pub fn pop(&mut self) -> Option<Activation> {
        if self.activations.is_empty() {
            None
        } else {
            Some(self.activations.remove(0))
        }
    }

    /// Returns the activations of one rule.
    pub fn for_rule<'a>(&'a self, rule: &'a str) -> impl Iterator<Item = &'a Activation> {
        self.activations.iter().filter(move |a| &*a.rule == rule)
    }

    /// Returns true if an activation with this identity is present.
    #[must_use]
    pub fn contains(&self, rule: &str, facts: &[FactId]) -> bool {
        self.position(rule, facts).is_some()
    }

    fn position(&self, rule: &str, facts: &[FactId]) -> Option<usize> {
        self.activations
            .iter()
            .position(|a| &*a.rule == rule && a.facts == facts)
    }
}

impl Agenda for ActivationList {
    fn publish(&mut self, activation: Activation) {
        if let Some(pos) = self.position(&activation.rule, &activation.facts) {
            self.activations.remove(pos);
        }
        // Insert after every activation of equal or higher priority.
        let pos = self.activations.partition_point(|a| {
            (a.salience, a.specificity) >= (activation.salience, activation.specificity)
        });
        self.activations.insert(pos, activation);
    }

    fn withdraw(&mut self, rule: &str, facts: &[FactId]) {
        if let Some(pos) = self.position(rule, facts) {
            self.activations.remove(pos);
        }
    }
}
