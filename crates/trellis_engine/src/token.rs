//! Partial matches (tokens) and the arena that owns them.
//!
//! Tokens form a graph: each token links to the tokens it was derived from
//! (`left_parent`, `right_parent`) and to the tokens derived from it
//! (`children`). Negated and existence joins add a second relation between
//! left tokens and the right tokens that currently falsify them
//! (`blockers` / `blocking`). All links are [`TokenId`] handles into a
//! [`TokenArena`]; a freed slot bumps its generation so stale handles never
//! resolve to a reused token.

use std::fmt;

use trellis_foundation::{Error, FactId, Result};

use crate::join::JoinId;
use crate::pattern::Bindings;

// =============================================================================
// Token Handles
// =============================================================================

/// Generational handle to a token in a [`TokenArena`].
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TokenId {
    index: u32,
    generation: u32,
}

impl TokenId {
    /// Returns the arena slot index.
    #[must_use]
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Returns the slot generation this handle was issued for.
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}v{}", self.index, self.generation)
    }
}

/// Which memory of its owner join a token lives in.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Side {
    /// Left (beta) memory: a partial match waiting for its next condition.
    Left,
    /// Right memory: a one-fact match of the join's condition.
    Right,
    /// Terminal memory: a complete match of the rule.
    Terminal,
}

// =============================================================================
// Token
// =============================================================================

/// A partial match.
///
/// `facts`, `bindings`, `owner`, `side`, `hash` and the parent links are
/// fixed at creation. The link lists change as the graph evolves.
#[derive(Clone, Debug)]
pub struct Token {
    /// Facts that produced this match, one per satisfied positive condition.
    pub facts: Vec<FactId>,
    /// Variable bindings of the match.
    pub bindings: Bindings,
    /// Join whose memory holds this token.
    pub owner: JoinId,
    /// Which memory of the owner.
    pub side: Side,
    /// Bucket hash under the owner memory's hashing.
    pub hash: u64,
    /// Left input this token was derived from.
    pub left_parent: Option<TokenId>,
    /// Right input this token was derived from.
    pub right_parent: Option<TokenId>,
    /// Tokens derived from this one.
    pub children: Vec<TokenId>,
    /// Right tokens currently falsifying this left token (negated/exists joins).
    pub blockers: Vec<TokenId>,
    /// Left tokens this right token currently falsifies.
    pub blocking: Vec<TokenId>,
    /// Set while a retraction cascade is removing this token.
    pub deleting: bool,
}

impl Token {
    /// Creates an unlinked token.
    #[must_use]
    pub fn new(facts: Vec<FactId>, bindings: Bindings, owner: JoinId, side: Side, hash: u64) -> Self {
        Self {
            facts,
            bindings,
            owner,
            side,
            hash,
            left_parent: None,
            right_parent: None,
            children: Vec::new(),
            blockers: Vec::new(),
            blocking: Vec::new(),
            deleting: false,
        }
    }

    /// Sets the parent links.
    #[must_use]
    pub fn with_parents(mut self, left: Option<TokenId>, right: Option<TokenId>) -> Self {
        self.left_parent = left;
        self.right_parent = right;
        self
    }

    /// Returns true if this token was produced by the given fact.
    #[must_use]
    pub fn has_fact(&self, id: FactId) -> bool {
        self.facts.contains(&id)
    }

    /// Returns true if the two tokens have a fact in common.
    #[must_use]
    pub fn shares_fact_with(&self, other: &Token) -> bool {
        self.facts.iter().any(|f| other.facts.contains(f))
    }

    /// Returns the fact ids in ascending order.
    #[must_use]
    pub fn sorted_facts(&self) -> Vec<FactId> {
        let mut facts = self.facts.clone();
        facts.sort_unstable();
        facts
    }

    /// Returns true if no fact id appears twice.
    #[must_use]
    pub fn has_distinct_facts(&self) -> bool {
        let sorted = self.sorted_facts();
        sorted.windows(2).all(|w| w[0] != w[1])
    }

    /// Returns true if this token has the same identity as `other`: same
    /// ordered fact list and equal bindings.
    #[must_use]
    pub fn same_match(&self, other: &Token) -> bool {
        self.hash == other.hash && self.facts == other.facts && self.bindings == other.bindings
    }

    /// Returns the parent handles that are present.
    pub fn parents(&self) -> impl Iterator<Item = TokenId> {
        self.left_parent.into_iter().chain(self.right_parent)
    }
}

// =============================================================================
// Token Arena
// =============================================================================

fn slot_index(len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| Error::structural("token arena exhausted"))
}

#[derive(Clone, Debug)]
struct Slot {
    generation: u32,
    token: Option<Token>,
}

/// Owner of every live token.
#[derive(Clone, Debug, Default)]
pub struct TokenArena {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
}

impl TokenArena {
    /// Creates an empty arena.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of live tokens.
    #[must_use]
    pub fn len(&self) -> usize {
        self.live
    }

    /// Returns true if there are no live tokens.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Stores a token, reusing a freed slot when one is available.
    ///
    /// # Errors
    /// Returns a structural error if every slot index is in use.
    pub fn insert(&mut self, token: Token) -> Result<TokenId> {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.token = Some(token);
            self.live += 1;
            return Ok(TokenId {
                index,
                generation: slot.generation,
            });
        }
        let index = slot_index(self.slots.len())?;
        self.slots.push(Slot {
            generation: 0,
            token: Some(token),
        });
        self.live += 1;
        Ok(TokenId {
            index,
            generation: 0,
        })
    }

    fn slot(&self, id: TokenId) -> Option<&Slot> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
    }

    /// Looks up a live token.
    #[must_use]
    pub fn get(&self, id: TokenId) -> Option<&Token> {
        self.slot(id).and_then(|slot| slot.token.as_ref())
    }

    /// Looks up a live token mutably.
    pub fn get_mut(&mut self, id: TokenId) -> Option<&mut Token> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.token.as_mut())
    }

    /// Returns true if the handle refers to a live token.
    #[must_use]
    pub fn contains(&self, id: TokenId) -> bool {
        self.get(id).is_some()
    }

    /// Frees a token. Its handle, and every copy of it, stops resolving.
    pub fn remove(&mut self, id: TokenId) -> Option<Token> {
        let slot = self
            .slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)?;
        let token = slot.token.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.live -= 1;
        Some(token)
    }

    /// Iterates live tokens with their handles.
    pub fn iter(&self) -> impl Iterator<Item = (TokenId, &Token)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            let token = slot.token.as_ref()?;
            let index = u32::try_from(index).ok()?;
            Some((
                TokenId {
                    index,
                    generation: slot.generation,
                },
                token,
            ))
        })
    }
}
