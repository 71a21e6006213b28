//! A working memory, a network and an agenda kept in step.

use tracing::{debug, warn};
use trellis_foundation::{Error, Fact, FactId, Result};
use trellis_storage::{FactStore, WorkingMemory};

use crate::agenda::{Activation, ActivationList};
use crate::config::EngineConfig;
use crate::expr::Evaluator;
use crate::network::{ReteNetwork, RuleHandle};
use crate::rule::Rule;

/// Owns the fact store, the matching network and the activation list.
///
/// Every mutation goes through the store and the network together, so the
/// network always reflects exactly the facts in [`Session::memory`]. With
/// [`EngineConfig::verify`] set, every rule is checked against the store
/// after each successful mutation.
#[derive(Debug)]
pub struct Session {
    memory: WorkingMemory,
    network: ReteNetwork,
    agenda: ActivationList,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    /// Creates an empty session with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    /// Creates an empty session with the given configuration.
    #[must_use]
    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            memory: WorkingMemory::new(),
            network: ReteNetwork::with_config(config),
            agenda: ActivationList::new(),
        }
    }

    /// Replaces the expression evaluator.
    #[must_use]
    pub fn with_evaluator(mut self, evaluator: impl Evaluator + 'static) -> Self {
        self.network = self.network.with_evaluator(evaluator);
        self
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        self.network.config()
    }

    /// Returns the fact store.
    #[must_use]
    pub fn memory(&self) -> &WorkingMemory {
        &self.memory
    }

    /// Returns the network.
    #[must_use]
    pub fn network(&self) -> &ReteNetwork {
        &self.network
    }

    /// Returns the current activations.
    #[must_use]
    pub fn agenda(&self) -> &ActivationList {
        &self.agenda
    }

    /// Removes and returns the highest-priority activation.
    pub fn next_activation(&mut self) -> Option<Activation> {
        self.agenda.pop()
    }

    // -------------------------------------------------------------------------
    // Rules
    // -------------------------------------------------------------------------

    /// Builds a rule against the current facts.
    ///
    /// # Errors
    /// Returns an error if the rule is invalid or its initial matches
    /// cannot be computed, or if verification fails.
    pub fn add_rule(&mut self, rule: Rule) -> Result<RuleHandle> {
        let handle = self.network.build_network(rule, &mut self.agenda)?;
        self.verify_if_enabled()?;
        Ok(handle)
    }

    /// Removes a rule and its activations.
    ///
    /// # Errors
    /// Returns an error if no rule has this name, or if verification fails.
    pub fn remove_rule(&mut self, name: &str) -> Result<()> {
        self.network.remove_rule(name, &mut self.agenda)?;
        self.verify_if_enabled()
    }

    // -------------------------------------------------------------------------
    // Facts
    // -------------------------------------------------------------------------

    /// Asserts a fact under a freshly allocated id, ignoring `fact.id`.
    ///
    /// # Errors
    /// See [`Session::assert_fact`].
    pub fn insert(&mut self, fact: Fact) -> Result<FactId> {
        let id = self.memory.allocate_id();
        self.assert_fact(fact.with_id(id))?;
        Ok(id)
    }

    /// Asserts a fact under its own id.
    ///
    /// # Errors
    /// Returns an error if the id is already in use or propagation fails;
    /// in both cases neither the store nor the network changes.
    pub fn assert_fact(&mut self, fact: Fact) -> Result<()> {
        let id = self.memory.insert(fact.clone())?;
        if let Err(err) = self.network.assert_fact(fact, &mut self.agenda) {
            // The store copy is ours; only a corrupted network keeps it.
            if !err.is_fatal() {
                self.memory.remove(id)?;
            }
            return Err(err);
        }
        self.verify_if_enabled()
    }

    /// Retracts a fact and returns it.
    ///
    /// # Errors
    /// Returns [`FactNotFound`](trellis_foundation::ErrorKind::FactNotFound)
    /// if the id is unknown, or the propagation error if the retraction was
    /// rolled back.
    pub fn retract(&mut self, id: FactId) -> Result<Fact> {
        let template = self
            .memory
            .lookup(id)
            .map(|fact| fact.template.clone())
            .ok_or_else(|| Error::fact_not_found(id))?;
        self.network.retract_fact(id, &template, &mut self.agenda)?;
        let fact = self.memory.remove(id)?;
        self.verify_if_enabled()?;
        Ok(fact)
    }

    // -------------------------------------------------------------------------
    // Verification
    // -------------------------------------------------------------------------

    /// Checks the token graph and every rule against the store.
    ///
    /// # Errors
    /// Returns [`Unstable`](trellis_foundation::ErrorKind::Unstable) naming
    /// the first divergent rule, or a structural error.
    pub fn verify(&self) -> Result<()> {
        self.network.verify_structure()?;
        for rule in self.network.rules() {
            let report = self.network.stability_report(&rule.name, &self.memory)?;
            if !report.is_stable() {
                warn!(%report, "network diverged from working memory");
                return Err(Error::unstable(&rule.name));
            }
        }
        debug!(
            rules = self.network.stats().rules,
            facts = self.memory.len(),
            "verified"
        );
        Ok(())
    }

    fn verify_if_enabled(&self) -> Result<()> {
        if self.network.config().verify {
            self.verify()
        } else {
            Ok(())
        }
    }
}
