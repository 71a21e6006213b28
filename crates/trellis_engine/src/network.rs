//! The RETE network: construction, removal and inspection.
//!
//! [`ReteNetwork`] owns every node, memory and token. Rules are compiled
//! into a chain of [`JoinNode`]s, one per condition, fed by shared alpha
//! nodes. Propagation of fact changes lives in [`crate::drive`]; the naive
//! cross-check lives in [`crate::checker`].

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use tracing::debug;
use trellis_foundation::{Error, Fact, FactId, Result};

use crate::agenda::{Activation, ActivationKey, Agenda, AgendaEvent};
use crate::alpha::{AlphaIndex, AlphaId};
use crate::beta::BetaMemory;
use crate::config::EngineConfig;
use crate::drive::Work;
use crate::expr::{BuiltinEvaluator, Evaluator};
use crate::join::{JoinId, JoinMode, JoinNode, Terminal};
use crate::pattern::Bindings;
use crate::rule::Rule;
use crate::token::{Side, Token, TokenArena, TokenId};

// =============================================================================
// Handles and Statistics
// =============================================================================

/// Returned by [`ReteNetwork::build_network`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuleHandle {
    /// Rule name.
    pub rule: Arc<str>,
    /// Joins of the rule, in condition order.
    pub joins: Vec<JoinId>,
    /// The join carrying the rule's terminal.
    pub terminal: JoinId,
}

/// A snapshot of network size counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NetworkStats {
    /// Rules currently built.
    pub rules: usize,
    /// Alpha nodes (shared across rules).
    pub alpha_nodes: usize,
    /// Live join nodes.
    pub joins: usize,
    /// Live tokens in all memories.
    pub tokens: usize,
    /// Current activations.
    pub activations: usize,
    /// Facts admitted to the network.
    pub facts: usize,
    /// Drive steps taken by the most recent operation.
    pub last_drive_steps: usize,
}

impl fmt::Display for NetworkStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} rules, {} alpha nodes, {} joins, {} tokens, {} activations, {} facts",
            self.rules, self.alpha_nodes, self.joins, self.tokens, self.activations, self.facts
        )
    }
}

#[derive(Clone, Debug)]
pub(crate) struct RuleEntry {
    pub(crate) rule: Rule,
    pub(crate) joins: Vec<JoinId>,
}

/// A published activation and the number of terminal tokens backing it.
#[derive(Clone, Debug)]
pub(crate) struct ActivationEntry {
    pub(crate) activation: Activation,
    pub(crate) refs: usize,
}

// =============================================================================
// Network
// =============================================================================

/// Incrementally maintained match state for a set of rules.
pub struct ReteNetwork {
    pub(crate) config: EngineConfig,
    pub(crate) evaluator: Box<dyn Evaluator>,
    pub(crate) alpha: AlphaIndex,
    /// Removed joins leave `None` until a later rule reuses the slot.
    pub(crate) joins: Vec<Option<JoinNode>>,
    pub(crate) free_joins: Vec<JoinId>,
    pub(crate) tokens: TokenArena,
    pub(crate) rules: BTreeMap<Arc<str>, RuleEntry>,
    /// Facts admitted to the network, used to prime new alpha nodes.
    pub(crate) facts: BTreeMap<FactId, Fact>,
    /// Right tokens of each fact. Every token containing a fact descends
    /// from one of these.
    pub(crate) fact_tokens: HashMap<FactId, Vec<TokenId>>,
    pub(crate) activations: HashMap<ActivationKey, ActivationEntry>,
    /// Agenda events of the operation in progress.
    pub(crate) pending: Vec<AgendaEvent>,
    pub(crate) steps: usize,
    pub(crate) step_limit: usize,
    pub(crate) current_fact: Option<FactId>,
}

impl Default for ReteNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ReteNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReteNetwork")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl ReteNetwork {
    /// Creates an empty network with the default configuration and the
    /// builtin evaluator.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    /// Creates an empty network with the given configuration.
    #[must_use]
    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            step_limit: config.max_drive_steps,
            config,
            evaluator: Box::new(BuiltinEvaluator),
            alpha: AlphaIndex::new(),
            joins: Vec::new(),
            free_joins: Vec::new(),
            tokens: TokenArena::new(),
            rules: BTreeMap::new(),
            facts: BTreeMap::new(),
            fact_tokens: HashMap::new(),
            activations: HashMap::new(),
            pending: Vec::new(),
            steps: 0,
            current_fact: None,
        }
    }

    /// Replaces the expression evaluator.
    #[must_use]
    pub fn with_evaluator(mut self, evaluator: impl Evaluator + 'static) -> Self {
        self.evaluator = Box::new(evaluator);
        self
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Returns the expression evaluator.
    #[must_use]
    pub fn evaluator(&self) -> &dyn Evaluator {
        self.evaluator.as_ref()
    }

    // -------------------------------------------------------------------------
    // Construction
    // -------------------------------------------------------------------------

    /// Compiles a rule into the network and computes its current matches.
    ///
    /// Building a rule whose name is already present replaces the old rule;
    /// withdrawals of its activations reach the agenda.
    ///
    /// # Errors
    /// Returns an error if the rule is invalid, or if computing its initial
    /// matches fails. A failed build leaves the rule absent.
    pub fn build_network(&mut self, rule: Rule, agenda: &mut impl Agenda) -> Result<RuleHandle> {
        rule.validate()?;
        let name = rule.name.clone();

        if self.rules.contains_key(&name) {
            debug!(rule = %name, "replacing rule");
            if let Err(err) = self.detach_rule(&name) {
                self.pending.clear();
                return Err(err);
            }
        }

        self.begin_operation(self.config.max_drive_steps, None);
        let result = self.attach_rule(rule).and_then(|(handle, sentinel)| {
            let root = handle.joins[0];
            self.drive(vec![Work::Left(root, sentinel)])?;
            Ok(handle)
        });

        match result {
            Ok(handle) => {
                debug!(
                    rule = %name,
                    joins = handle.joins.len(),
                    alpha_nodes = self.alpha.len(),
                    steps = self.steps,
                    "built rule"
                );
                self.flush(agenda);
                Ok(handle)
            }
            Err(err) if err.is_fatal() => {
                self.pending.clear();
                Err(err)
            }
            Err(err) => {
                tracing::warn!(rule = %name, error = %err, "rule build failed");
                if self.rules.contains_key(&name) {
                    if let Err(cleanup) = self.detach_rule(&name) {
                        self.pending.clear();
                        return Err(Error::structural(format!(
                            "removing half-built rule {name} failed: {cleanup}"
                        )));
                    }
                }
                // Publications of the failed build cancel against their
                // withdrawals; withdrawals of a replaced rule still apply.
                self.flush(agenda);
                Err(err)
            }
        }
    }

    /// Removes a rule and withdraws its activations.
    ///
    /// # Errors
    /// Returns an error if no rule has this name.
    pub fn remove_rule(&mut self, name: &str, agenda: &mut impl Agenda) -> Result<()> {
        match self.detach_rule(name) {
            Ok(()) => {
                self.flush(agenda);
                Ok(())
            }
            Err(err) => {
                self.pending.clear();
                Err(err)
            }
        }
    }

    pub(crate) fn new_memory(&self) -> BetaMemory {
        BetaMemory::with_prime_index(self.config.initial_memory_prime)
    }

    /// Creates the join chain of a rule, primes its right memories and
    /// inserts the sentinel. Returns the handle and the sentinel token.
    fn attach_rule(&mut self, rule: Rule) -> Result<(RuleHandle, TokenId)> {
        let mut bound: BTreeSet<Arc<str>> = BTreeSet::new();
        let mut chain: Vec<JoinId> = Vec::with_capacity(rule.conditions.len());

        for (depth, condition) in rule.conditions.iter().enumerate() {
            let alpha = self.alpha.intern(condition, self.facts.values())?;
            let captured = condition.captured_variables();
            let mode = if condition.negated {
                JoinMode::Negated
            } else if condition.exists {
                JoinMode::Exists
            } else {
                JoinMode::Positive
            };
            let id = match self.free_joins.pop() {
                Some(id) => id,
                None => JoinId(
                    u32::try_from(self.joins.len())
                        .map_err(|_| Error::structural("join table exhausted"))?,
                ),
            };
            let node = JoinNode {
                id,
                rule: rule.name.clone(),
                depth,
                parent: chain.last().copied(),
                alpha,
                join_keys: captured.intersection(&bound).cloned().collect(),
                tests: condition.predicates().cloned().collect(),
                mode,
                left_memory: self.new_memory(),
                right_memory: self.new_memory(),
                successor: None,
                terminal: None,
                sentinel: None,
            };
            if let Some(&previous) = chain.last() {
                self.join_mut(previous)?.successor = Some(id);
            }
            match self.joins.get_mut(id.0 as usize) {
                Some(slot) => *slot = Some(node),
                None => self.joins.push(Some(node)),
            }
            if condition.is_positive() {
                bound.extend(captured);
            }
            chain.push(id);
        }

        let (&root, &last) = chain
            .first()
            .zip(chain.last())
            .ok_or_else(|| Error::invalid_rule(&rule.name, "rule has no conditions"))?;
        let memory = self.new_memory();
        self.join_mut(last)?.terminal = Some(Terminal::new(&rule, memory));

        let handle = RuleHandle {
            rule: rule.name.clone(),
            joins: chain.clone(),
            terminal: last,
        };
        self.rules.insert(
            rule.name.clone(),
            RuleEntry {
                rule,
                joins: chain.clone(),
            },
        );

        for &id in &chain {
            let alpha = self.join_ref(id)?.alpha;
            self.alpha.add_listener(alpha, id);
            let admitted: Vec<(FactId, Bindings)> = self
                .alpha
                .get(alpha)
                .map(|node| node.memory().iter().map(|(f, b)| (*f, b.clone())).collect())
                .unwrap_or_default();
            for (fact, bindings) in admitted {
                self.add_right_token(id, fact, bindings)?;
            }
        }

        let hash = self.join_ref(root)?.hash_for(&Bindings::new());
        let sentinel = self
            .store_token(Token::new(Vec::new(), Bindings::new(), root, Side::Left, hash))?
            .ok_or_else(|| Error::structural(format!("root {root} already has a sentinel")))?;
        self.join_mut(root)?.sentinel = Some(sentinel);

        Ok((handle, sentinel))
    }

    /// Deletes every token of a rule and removes its joins.
    pub(crate) fn detach_rule(&mut self, name: &str) -> Result<()> {
        let entry = self
            .rules
            .remove(name)
            .ok_or_else(|| Error::unknown_rule(name))?;

        let mut roots = Vec::new();
        for &id in &entry.joins {
            let join = self.join_ref(id)?;
            roots.extend(join.sentinel);
            roots.extend(join.right_memory.iter());
        }
        // Unblocked tokens all belong to this rule and are deleted too.
        let _unblocked = self.delete_tokens(roots)?;

        for &id in &entry.joins {
            let join = self
                .joins
                .get_mut(id.0 as usize)
                .and_then(Option::take)
                .ok_or_else(|| Error::structural(format!("rule {name} lost join {id}")))?;
            let leftover = join.left_memory.len()
                + join.right_memory.len()
                + join.terminal.as_ref().map_or(0, |t| t.memory.len());
            if leftover > 0 {
                return Err(Error::structural(format!(
                    "removing rule {name} left {leftover} tokens in {id}"
                )));
            }
            self.alpha.remove_listener(join.alpha, id);
            self.free_joins.push(id);
        }

        debug!(rule = %name, "removed rule");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Token Storage
    // -------------------------------------------------------------------------

    pub(crate) fn join_ref(&self, id: JoinId) -> Result<&JoinNode> {
        self.joins
            .get(id.0 as usize)
            .and_then(Option::as_ref)
            .ok_or_else(|| Error::structural(format!("missing join {id}")))
    }

    pub(crate) fn join_mut(&mut self, id: JoinId) -> Result<&mut JoinNode> {
        self.joins
            .get_mut(id.0 as usize)
            .and_then(Option::as_mut)
            .ok_or_else(|| Error::structural(format!("missing join {id}")))
    }

    /// Stores a token in the arena and its owner's memory.
    ///
    /// Returns `None` if the memory already holds an equal token.
    pub(crate) fn store_token(&mut self, token: Token) -> Result<Option<TokenId>> {
        if !token.has_distinct_facts() {
            return Err(Error::structural(format!(
                "token for {} repeats a fact: {:?}",
                token.owner, token.facts
            )));
        }
        let (owner, side) = (token.owner, token.side);
        let id = self.tokens.insert(token)?;
        let memory = self
            .joins
            .get_mut(owner.0 as usize)
            .and_then(Option::as_mut)
            .and_then(|join| join.memory_mut(side))
            .ok_or_else(|| Error::structural(format!("no {side:?} memory on {owner}")))?;
        if memory.insert(&self.tokens, id)? {
            Ok(Some(id))
        } else {
            self.tokens.remove(id);
            Ok(None)
        }
    }

    /// Creates a one-fact right token for a join.
    pub(crate) fn add_right_token(
        &mut self,
        join: JoinId,
        fact: FactId,
        bindings: Bindings,
    ) -> Result<Option<TokenId>> {
        let hash = self.join_ref(join)?.hash_for(&bindings);
        let stored = self.store_token(Token::new(vec![fact], bindings, join, Side::Right, hash))?;
        if let Some(id) = stored {
            self.fact_tokens.entry(fact).or_default().push(id);
        }
        Ok(stored)
    }

    /// Removes a token from its memory, its parents' child lists, the fact
    /// index and the arena.
    pub(crate) fn unlink(&mut self, id: TokenId) -> Result<Token> {
        let token = self
            .tokens
            .remove(id)
            .ok_or_else(|| Error::structural(format!("unlinking dead token {id:?}")))?;

        let removed = self
            .joins
            .get_mut(token.owner.0 as usize)
            .and_then(Option::as_mut)
            .and_then(|join| join.memory_mut(token.side))
            .is_some_and(|memory| memory.remove(id, token.hash));
        if !removed {
            return Err(Error::structural(format!(
                "token {id:?} missing from {:?} memory of {}",
                token.side, token.owner
            )));
        }

        for parent in token.parents() {
            if let Some(parent) = self.tokens.get_mut(parent) {
                parent.children.retain(|&child| child != id);
            }
        }

        if token.side == Side::Right {
            for fact in &token.facts {
                if let Some(list) = self.fact_tokens.get_mut(fact) {
                    list.retain(|&t| t != id);
                    if list.is_empty() {
                        self.fact_tokens.remove(fact);
                    }
                }
            }
        }

        Ok(token)
    }

    // -------------------------------------------------------------------------
    // Inspection
    // -------------------------------------------------------------------------

    /// Returns a built rule.
    #[must_use]
    pub fn rule(&self, name: &str) -> Option<&Rule> {
        self.rules.get(name).map(|entry| &entry.rule)
    }

    /// Iterates built rules by name.
    pub fn rules(&self) -> impl Iterator<Item = &Rule> {
        self.rules.values().map(|entry| &entry.rule)
    }

    /// Returns the joins of a rule, in condition order.
    #[must_use]
    pub fn rule_joins(&self, name: &str) -> Option<&[JoinId]> {
        self.rules.get(name).map(|entry| entry.joins.as_slice())
    }

    /// Looks up a live join.
    #[must_use]
    pub fn join(&self, id: JoinId) -> Option<&JoinNode> {
        self.joins.get(id.0 as usize).and_then(Option::as_ref)
    }

    /// Returns the alpha layer.
    #[must_use]
    pub fn alpha(&self) -> &AlphaIndex {
        &self.alpha
    }

    /// Returns the alpha node feeding a join.
    #[must_use]
    pub fn alpha_of(&self, join: JoinId) -> Option<AlphaId> {
        self.join(join).map(|j| j.alpha)
    }

    /// Returns the token arena.
    #[must_use]
    pub fn tokens(&self) -> &TokenArena {
        &self.tokens
    }

    /// Returns true if the fact has been asserted and not retracted.
    #[must_use]
    pub fn contains_fact(&self, id: FactId) -> bool {
        self.facts.contains_key(&id)
    }

    /// Counts live tokens that contain the fact.
    #[must_use]
    pub fn tokens_with_fact(&self, id: FactId) -> usize {
        self.tokens.iter().filter(|(_, t)| t.has_fact(id)).count()
    }

    /// Iterates current activations (in no particular order).
    pub fn activations(&self) -> impl Iterator<Item = &Activation> {
        self.activations.values().map(|entry| &entry.activation)
    }

    /// Returns the current activations of one rule, sorted by fact set.
    #[must_use]
    pub fn activations_for(&self, rule: &str) -> Vec<&Activation> {
        let mut found: Vec<_> = self
            .activations()
            .filter(|a| &*a.rule == rule)
            .collect();
        found.sort_by(|a, b| a.facts.cmp(&b.facts));
        found
    }

    /// Returns size counters.
    #[must_use]
    pub fn stats(&self) -> NetworkStats {
        NetworkStats {
            rules: self.rules.len(),
            alpha_nodes: self.alpha.len(),
            joins: self.joins.iter().flatten().count(),
            tokens: self.tokens.len(),
            activations: self.activations.len(),
            facts: self.facts.len(),
            last_drive_steps: self.steps,
        }
    }

    /// Checks the token graph for structural consistency.
    ///
    /// Every live token must sit in its owner's memory, hold distinct facts,
    /// and be linked symmetrically with its parents, children and blockers.
    /// Every alpha node must feed at least one live join that reads it.
    /// Every rule must end in a terminal, and every activation must be
    /// backed by as many terminal tokens as its reference count.
    ///
    /// # Errors
    /// Returns a structural error describing the first violation found.
    pub fn verify_structure(&self) -> Result<()> {
        let mut stored = 0;
        for join in self.joins.iter().flatten() {
            stored += join.left_memory.len() + join.right_memory.len();
            if let Some(terminal) = &join.terminal {
                stored += terminal.memory.len();
            }
        }
        if stored != self.tokens.len() {
            return Err(Error::structural(format!(
                "{} live tokens but {stored} stored in memories",
                self.tokens.len()
            )));
        }

        let mut backing: HashMap<ActivationKey, usize> = HashMap::new();
        for (id, token) in self.tokens.iter() {
            if token.deleting {
                return Err(Error::structural(format!("token {id:?} left marked deleting")));
            }
            if !token.has_distinct_facts() {
                return Err(Error::structural(format!(
                    "token {id:?} repeats a fact: {:?}",
                    token.facts
                )));
            }
            let join = self.join_ref(token.owner)?;
            let in_memory = join
                .memory(token.side)
                .is_some_and(|memory| memory.contains(id, token.hash));
            if !in_memory {
                return Err(Error::structural(format!(
                    "token {id:?} not in {:?} memory of {}",
                    token.side, token.owner
                )));
            }
            for parent in token.parents() {
                let linked = self
                    .tokens
                    .get(parent)
                    .is_some_and(|p| p.children.contains(&id));
                if !linked {
                    return Err(Error::structural(format!(
                        "token {id:?} has unlinked parent {parent:?}"
                    )));
                }
            }
            for &child in &token.children {
                let linked = self
                    .tokens
                    .get(child)
                    .is_some_and(|c| c.parents().any(|p| p == id));
                if !linked {
                    return Err(Error::structural(format!(
                        "token {id:?} has unlinked child {child:?}"
                    )));
                }
            }
            for &blocker in &token.blockers {
                let linked = self
                    .tokens
                    .get(blocker)
                    .is_some_and(|b| b.blocking.contains(&id));
                if !linked {
                    return Err(Error::structural(format!(
                        "token {id:?} has unlinked blocker {blocker:?}"
                    )));
                }
            }
            if token.side == Side::Terminal {
                *backing
                    .entry(ActivationKey::new(join.rule.clone(), token.facts.clone()))
                    .or_default() += 1;
            }
        }

        for node in self.alpha.iter() {
            if node.listeners().is_empty() {
                return Err(Error::structural(format!(
                    "alpha node {:?} has no listeners",
                    node.id()
                )));
            }
            for &listener in node.listeners() {
                if self.join_ref(listener)?.alpha != node.id() {
                    return Err(Error::structural(format!(
                        "alpha node {:?} feeds {listener}, which reads another node",
                        node.id()
                    )));
                }
            }
        }

        for entry in self.rules.values() {
            let last = entry
                .joins
                .last()
                .ok_or_else(|| Error::structural(format!("rule {} has no joins", entry.rule.name)))?;
            if self.join_ref(*last)?.terminal.is_none() {
                return Err(Error::structural(format!(
                    "rule {} has no terminal",
                    entry.rule.name
                )));
            }
        }

        if backing.len() != self.activations.len() {
            return Err(Error::structural(format!(
                "{} activations but {} distinct terminal matches",
                self.activations.len(),
                backing.len()
            )));
        }
        for (key, entry) in &self.activations {
            if backing.get(key) != Some(&entry.refs) {
                return Err(Error::structural(format!(
                    "activation of {} on {:?} has {} references",
                    key.rule, key.facts, entry.refs
                )));
            }
        }

        Ok(())
    }
}
