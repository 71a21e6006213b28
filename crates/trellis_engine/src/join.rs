//! Join nodes.
//!
//! Each condition of a rule becomes one [`JoinNode`]. A join combines the
//! partial matches in its left memory with the one-fact matches in its
//! right memory. The first join of a rule is a root join whose left memory
//! holds a single sentinel token; the last join carries the rule's
//! [`Terminal`].

use std::fmt;
use std::sync::Arc;

use crate::alpha::AlphaId;
use crate::beta::{BetaMemory, bindings_hash, join_key_hash};
use crate::expr::Expr;
use crate::pattern::Bindings;
use crate::rule::Rule;
use crate::token::{Side, TokenId};

/// Index of a join node.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JoinId(pub u32);

impl fmt::Display for JoinId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "j{}", self.0)
    }
}

/// How a join combines its inputs.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum JoinMode {
    /// Emit one merged token per compatible left/right pair.
    Positive,
    /// Pass a left token through while no right token is compatible.
    Negated,
    /// Pass a left token through once while some right token is compatible.
    Exists,
}

/// The end of a rule's join chain.
#[derive(Clone, Debug)]
pub struct Terminal {
    /// Rule name.
    pub rule: Arc<str>,
    /// Rule salience.
    pub salience: i32,
    /// Tests evaluated on complete matches.
    pub tests: Vec<Expr>,
    /// Action reference forwarded with activations.
    pub action: Option<Arc<str>>,
    /// Positive conditions of the rule.
    pub specificity: usize,
    /// Complete matches that passed the terminal tests.
    pub memory: BetaMemory,
}

impl Terminal {
    /// Creates the terminal for a rule.
    #[must_use]
    pub fn new(rule: &Rule, memory: BetaMemory) -> Self {
        Self {
            rule: rule.name.clone(),
            salience: rule.salience,
            tests: rule.tests.clone(),
            action: rule.action.clone(),
            specificity: rule.positive_conditions(),
            memory,
        }
    }
}

/// One condition's join.
#[derive(Clone, Debug)]
pub struct JoinNode {
    /// This join's id.
    pub id: JoinId,
    /// Rule owning the chain.
    pub rule: Arc<str>,
    /// Position of the condition in the rule.
    pub depth: usize,
    /// Previous join, or `None` for the root.
    pub parent: Option<JoinId>,
    /// Alpha node feeding the right memory.
    pub alpha: AlphaId,
    /// Variables bound both by earlier conditions and by this one, sorted.
    pub join_keys: Vec<Arc<str>>,
    /// Predicate tests of the condition, evaluated on merged bindings.
    pub tests: Vec<Expr>,
    /// Positive, negated or exists.
    pub mode: JoinMode,
    /// Partial matches arriving from the parent (or the sentinel).
    pub left_memory: BetaMemory,
    /// One-fact matches of this condition.
    pub right_memory: BetaMemory,
    /// Next join in the chain.
    pub successor: Option<JoinId>,
    /// Present on the last join of the chain.
    pub terminal: Option<Terminal>,
    /// Root joins only: the sentinel left token.
    pub sentinel: Option<TokenId>,
}

impl JoinNode {
    /// Returns true for the first join of a chain.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Returns true if partner lookups can use a single bucket.
    #[must_use]
    pub fn has_join_keys(&self) -> bool {
        !self.join_keys.is_empty()
    }

    /// Computes the bucket hash of a token stored in this join's left or
    /// right memory.
    #[must_use]
    pub fn hash_for(&self, bindings: &Bindings) -> u64 {
        if self.has_join_keys() {
            join_key_hash(bindings, &self.join_keys)
        } else {
            bindings_hash(bindings)
        }
    }

    /// Returns the memory a token of the given side lives in.
    #[must_use]
    pub fn memory(&self, side: Side) -> Option<&BetaMemory> {
        match side {
            Side::Left => Some(&self.left_memory),
            Side::Right => Some(&self.right_memory),
            Side::Terminal => self.terminal.as_ref().map(|t| &t.memory),
        }
    }

    /// Mutable variant of [`JoinNode::memory`].
    pub fn memory_mut(&mut self, side: Side) -> Option<&mut BetaMemory> {
        match side {
            Side::Left => Some(&mut self.left_memory),
            Side::Right => Some(&mut self.right_memory),
            Side::Terminal => self.terminal.as_mut().map(|t| &mut t.memory),
        }
    }
}
