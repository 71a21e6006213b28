//! Incremental propagation of fact changes.
//!
//! Asserting a fact creates one right token per listening join and drives
//! them through the network with an explicit work stack; retracting a fact
//! deletes every token descending from its right tokens. Negated and exists
//! joins keep their left tokens linked to the right tokens that currently
//! falsify (or witness) them, so a change on either side only touches the
//! affected tokens.
//!
//! Every operation either completes or is rolled back: a failed assert is
//! undone by retracting the fact, a failed retract by re-asserting it.
//! Agenda changes are buffered and only delivered once the operation
//! succeeds.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use tracing::{debug, error, trace, warn};
use trellis_foundation::{Error, Fact, FactId, Result, SemanticLimit};

use crate::agenda::{Activation, ActivationKey, Agenda, AgendaEvent};
use crate::beta::{BetaMemory, bindings_hash};
use crate::expr::Expr;
use crate::join::{JoinId, JoinMode, JoinNode};
use crate::network::{ActivationEntry, ReteNetwork};
use crate::pattern::Bindings;
use crate::token::{Side, Token, TokenId};

/// An arrival waiting to be processed.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Work {
    /// A token entered the left memory of a join.
    Left(JoinId, TokenId),
    /// A token entered the right memory of a join.
    Right(JoinId, TokenId),
}

/// Facts and bindings of a compatible pair.
type Joined = (Vec<FactId>, Bindings);

/// Tokens of `memory` that may be compatible with a token hashed to `hash`.
fn partners(join: &JoinNode, memory: &BetaMemory, hash: u64) -> Vec<TokenId> {
    if join.has_join_keys() {
        memory.bucket(hash).collect()
    } else {
        memory.iter().collect()
    }
}

fn add_fact_context(mut err: Error, fact: FactId) -> Error {
    let context = err.context.take().unwrap_or_default().with_fact(fact);
    err.with_context(context)
}

impl ReteNetwork {
    // =========================================================================
    // Operations
    // =========================================================================

    /// Asserts a fact and propagates it.
    ///
    /// # Errors
    /// Returns [`DuplicateFact`](trellis_foundation::ErrorKind::DuplicateFact)
    /// if a fact with this id is already asserted. Evaluation errors and the
    /// drive step limit roll the assertion back; structural errors are
    /// returned without rollback.
    pub fn assert_fact(&mut self, fact: Fact, agenda: &mut impl Agenda) -> Result<()> {
        let id = fact.id;
        if self.facts.contains_key(&id) {
            return Err(Error::duplicate_fact(id));
        }
        debug!(fact = %id, template = %fact.template, "assert");

        self.begin_operation(self.config.max_drive_steps, Some(id));
        match self.propagate_assert(fact) {
            Ok(()) => {
                trace!(fact = %id, steps = self.steps, "assert complete");
                self.flush(agenda);
                Ok(())
            }
            Err(err) => self.abort(add_fact_context(err, id), |net| net.propagate_retract(id)),
        }
    }

    /// Retracts a fact and deletes every token containing it.
    ///
    /// Retracting a fact that was never asserted is a no-op.
    ///
    /// # Errors
    /// Returns [`TemplateMismatch`](trellis_foundation::ErrorKind::TemplateMismatch)
    /// if the fact was asserted under a different template. Evaluation
    /// errors and the drive step limit roll the retraction back.
    pub fn retract_fact(&mut self, id: FactId, template: &str, agenda: &mut impl Agenda) -> Result<()> {
        let Some(fact) = self.facts.get(&id) else {
            trace!(fact = %id, "retract of absent fact ignored");
            return Ok(());
        };
        if &*fact.template != template {
            return Err(Error::template_mismatch(id, template, &fact.template));
        }
        let fact = fact.clone();
        debug!(fact = %id, template, "retract");

        self.begin_operation(self.config.max_drive_steps, Some(id));
        match self.propagate_retract(id) {
            Ok(()) => {
                trace!(fact = %id, steps = self.steps, "retract complete");
                self.flush(agenda);
                Ok(())
            }
            Err(err) => self.abort(add_fact_context(err, id), move |net| net.propagate_assert(fact)),
        }
    }

    pub(crate) fn begin_operation(&mut self, limit: usize, fact: Option<FactId>) {
        self.steps = 0;
        self.step_limit = limit;
        self.current_fact = fact;
    }

    /// Undoes a failed operation. Buffered agenda events are discarded, so
    /// the agenda never sees the failed operation.
    fn abort(&mut self, err: Error, undo: impl FnOnce(&mut Self) -> Result<()>) -> Result<()> {
        if err.is_fatal() {
            error!(error = %err, "network corrupted");
            self.pending.clear();
            return Err(err);
        }
        warn!(error = %err, "rolling back");

        self.begin_operation(usize::MAX, self.current_fact);
        let undone = undo(self);
        self.pending.clear();
        match undone {
            Ok(()) => Err(err),
            Err(undo_err) => {
                error!(error = %undo_err, "rollback failed");
                Err(Error::structural(format!(
                    "rollback failed: {undo_err} (after: {err})"
                )))
            }
        }
    }

    fn propagate_assert(&mut self, fact: Fact) -> Result<()> {
        let id = fact.id;
        let admitted = self.alpha.admit(&fact);
        self.facts.insert(id, fact);

        let mut work = Vec::new();
        for alpha in admitted {
            let Some(node) = self.alpha.get(alpha) else {
                continue;
            };
            let Some(bindings) = node.memory().get(&id).cloned() else {
                continue;
            };
            let listeners = node.listeners().to_vec();
            for join in listeners {
                if self.join(join).is_none() {
                    continue;
                }
                if let Some(token) = self.add_right_token(join, id, bindings.clone())? {
                    work.push(Work::Right(join, token));
                }
            }
        }
        trace!(fact = %id, arrivals = work.len(), "admitted");
        self.drive(work)
    }

    fn propagate_retract(&mut self, id: FactId) -> Result<()> {
        let Some(fact) = self.facts.remove(&id) else {
            return Ok(());
        };
        self.alpha.dismiss(id, &fact.template);

        let roots = self.fact_tokens.remove(&id).unwrap_or_default();
        trace!(fact = %id, roots = roots.len(), "dismissed");
        let unblocked = self.delete_tokens(roots)?;

        let mut work = Vec::new();
        self.reemit(unblocked, &mut work)?;
        self.drive(work)
    }

    // =========================================================================
    // Drive Loop
    // =========================================================================

    /// Processes arrivals until none remain, depth first in arrival order.
    pub(crate) fn drive(&mut self, mut work: Vec<Work>) -> Result<()> {
        work.reverse();
        let mut next = Vec::new();
        while let Some(item) = work.pop() {
            self.steps += 1;
            if self.steps > self.step_limit {
                return Err(Error::limit_exceeded(SemanticLimit::MaxDriveSteps {
                    limit: self.step_limit,
                    fact: self.current_fact,
                }));
            }
            match item {
                Work::Left(join, token) => self.left_activate(join, token, &mut next)?,
                Work::Right(join, token) => self.right_activate(join, token, &mut next)?,
            }
            work.extend(next.drain(..).rev());
        }
        Ok(())
    }

    /// Checks a left/right pair against a join.
    fn try_join(&self, join: &JoinNode, left: &Token, right: &Token) -> Result<Option<Joined>> {
        if left.shares_fact_with(right) {
            return Ok(None);
        }
        let Some(merged) = left.bindings.merge(&right.bindings) else {
            return Ok(None);
        };
        for test in &join.tests {
            if !self.evaluate_test(&join.rule, test, &merged)? {
                return Ok(None);
            }
        }
        let mut facts = left.facts.clone();
        facts.extend_from_slice(&right.facts);
        Ok(Some((facts, merged)))
    }

    pub(crate) fn evaluate_test(&self, rule: &Arc<str>, test: &Expr, bindings: &Bindings) -> Result<bool> {
        self.evaluator.test(test, bindings).map_err(|mut err| {
            let context = err
                .context
                .take()
                .unwrap_or_default()
                .with_rule(&**rule)
                .with_frame(test.to_string());
            err.with_context(context)
        })
    }

    fn left_activate(&mut self, join_id: JoinId, left_id: TokenId, out: &mut Vec<Work>) -> Result<()> {
        let join = self.join_ref(join_id)?;
        let mode = join.mode;
        let Some(left) = self.tokens.get(left_id) else {
            return Ok(());
        };
        if left.deleting {
            return Ok(());
        }

        let mut matches = Vec::new();
        for right_id in partners(join, &join.right_memory, left.hash) {
            let Some(right) = self.tokens.get(right_id) else {
                continue;
            };
            if right.deleting {
                continue;
            }
            if let Some(joined) = self.try_join(join, left, right)? {
                matches.push((right_id, joined));
            }
        }

        match mode {
            JoinMode::Positive => {
                for (right_id, (facts, bindings)) in matches {
                    self.emit(join_id, facts, bindings, Some(left_id), Some(right_id), out)?;
                }
            }
            JoinMode::Negated => {
                if matches.is_empty() {
                    self.emit_copy(join_id, left_id, out)?;
                } else {
                    for (right_id, _) in matches {
                        self.link_blocker(left_id, right_id)?;
                    }
                }
            }
            JoinMode::Exists => {
                if !matches.is_empty() {
                    for (right_id, _) in matches {
                        self.link_blocker(left_id, right_id)?;
                    }
                    self.emit_copy(join_id, left_id, out)?;
                }
            }
        }
        Ok(())
    }

    fn right_activate(&mut self, join_id: JoinId, right_id: TokenId, out: &mut Vec<Work>) -> Result<()> {
        let join = self.join_ref(join_id)?;
        let mode = join.mode;
        let Some(right) = self.tokens.get(right_id) else {
            return Ok(());
        };
        if right.deleting {
            return Ok(());
        }

        let mut matches = Vec::new();
        for left_id in partners(join, &join.left_memory, right.hash) {
            let Some(left) = self.tokens.get(left_id) else {
                continue;
            };
            if left.deleting || left.blockers.contains(&right_id) {
                continue;
            }
            if let Some(joined) = self.try_join(join, left, right)? {
                matches.push((left_id, joined));
            }
        }

        for (left_id, (facts, bindings)) in matches {
            match mode {
                JoinMode::Positive => {
                    self.emit(join_id, facts, bindings, Some(left_id), Some(right_id), out)?;
                }
                JoinMode::Negated => {
                    if self.link_blocker(left_id, right_id)? {
                        let outputs = self
                            .tokens
                            .get(left_id)
                            .map(|l| l.children.clone())
                            .unwrap_or_default();
                        let unblocked = self.delete_tokens(outputs)?;
                        self.reemit(unblocked, out)?;
                    }
                }
                JoinMode::Exists => {
                    if self.link_blocker(left_id, right_id)? {
                        self.emit_copy(join_id, left_id, out)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Records that `right` falsifies (negated) or witnesses (exists) `left`.
    ///
    /// Returns true if `left` had no blockers before.
    fn link_blocker(&mut self, left: TokenId, right: TokenId) -> Result<bool> {
        let token = self
            .tokens
            .get_mut(left)
            .ok_or_else(|| Error::structural(format!("blocking dead token {left:?}")))?;
        let was_unblocked = token.blockers.is_empty();
        token.blockers.push(right);
        self.tokens
            .get_mut(right)
            .ok_or_else(|| Error::structural(format!("dead blocker {right:?}")))?
            .blocking
            .push(left);
        Ok(was_unblocked)
    }

    // =========================================================================
    // Emission
    // =========================================================================

    /// Passes a match to the next join, or to the terminal if this is the
    /// last join of the chain.
    fn emit(
        &mut self,
        join_id: JoinId,
        facts: Vec<FactId>,
        bindings: Bindings,
        left_parent: Option<TokenId>,
        right_parent: Option<TokenId>,
        out: &mut Vec<Work>,
    ) -> Result<()> {
        let join = self.join_ref(join_id)?;

        if let Some(next) = join.successor {
            let hash = self.join_ref(next)?.hash_for(&bindings);
            let token = Token::new(facts, bindings, next, Side::Left, hash)
                .with_parents(left_parent, right_parent);
            if let Some(id) = self.store_token(token)? {
                self.link_children(id)?;
                out.push(Work::Left(next, id));
            }
            return Ok(());
        }

        let terminal = join.terminal.as_ref().ok_or_else(|| {
            Error::structural(format!("{join_id} ends rule {} without a terminal", join.rule))
        })?;
        for test in &terminal.tests {
            if !self.evaluate_test(&terminal.rule, test, &bindings)? {
                return Ok(());
            }
        }
        let hash = bindings_hash(&bindings);
        let token = Token::new(facts, bindings, join_id, Side::Terminal, hash)
            .with_parents(left_parent, right_parent);
        if let Some(id) = self.store_token(token)? {
            self.link_children(id)?;
            self.retain_activation(id)?;
        }
        Ok(())
    }

    /// Passes a left token through a negated or exists join unchanged.
    fn emit_copy(&mut self, join_id: JoinId, left_id: TokenId, out: &mut Vec<Work>) -> Result<()> {
        let left = self
            .tokens
            .get(left_id)
            .ok_or_else(|| Error::structural(format!("copying dead token {left_id:?}")))?;
        let (facts, bindings) = (left.facts.clone(), left.bindings.clone());
        self.emit(join_id, facts, bindings, Some(left_id), None, out)
    }

    /// Re-emits negated left tokens whose last blocker went away.
    fn reemit(&mut self, unblocked: Vec<TokenId>, out: &mut Vec<Work>) -> Result<()> {
        for left_id in unblocked {
            let Some(left) = self.tokens.get(left_id) else {
                continue;
            };
            if left.deleting || !left.blockers.is_empty() || !left.children.is_empty() {
                continue;
            }
            let owner = left.owner;
            self.emit_copy(owner, left_id, out)?;
        }
        Ok(())
    }

    fn link_children(&mut self, id: TokenId) -> Result<()> {
        let parents: Vec<TokenId> = self
            .tokens
            .get(id)
            .map(|t| t.parents().collect())
            .unwrap_or_default();
        for parent in parents {
            self.tokens
                .get_mut(parent)
                .ok_or_else(|| Error::structural(format!("token {id:?} has dead parent {parent:?}")))?
                .children
                .push(id);
        }
        Ok(())
    }

    // =========================================================================
    // Activations
    // =========================================================================

    fn retain_activation(&mut self, id: TokenId) -> Result<()> {
        let token = self
            .tokens
            .get(id)
            .ok_or_else(|| Error::structural(format!("activation for dead token {id:?}")))?;
        let join = self.join_ref(token.owner)?;
        let terminal = join
            .terminal
            .as_ref()
            .ok_or_else(|| Error::structural(format!("{} has no terminal", token.owner)))?;
        let key = ActivationKey::new(terminal.rule.clone(), token.facts.clone());
        let activation = Activation {
            rule: terminal.rule.clone(),
            salience: terminal.salience,
            facts: key.facts.clone(),
            bindings: token.bindings.clone(),
            action: terminal.action.clone(),
            specificity: terminal.specificity,
        };

        match self.activations.entry(key) {
            Entry::Occupied(mut entry) => entry.get_mut().refs += 1,
            Entry::Vacant(entry) => {
                trace!(rule = %activation.rule, facts = ?activation.facts, "activation");
                self.pending.push(AgendaEvent::Publish(activation.clone()));
                entry.insert(ActivationEntry { activation, refs: 1 });
            }
        }
        Ok(())
    }

    fn release_activation(&mut self, id: TokenId) -> Result<()> {
        let token = self
            .tokens
            .get(id)
            .ok_or_else(|| Error::structural(format!("releasing dead token {id:?}")))?;
        let rule = self.join_ref(token.owner)?.rule.clone();
        let key = ActivationKey::new(rule, token.facts.clone());

        let entry = self.activations.get_mut(&key).ok_or_else(|| {
            Error::structural(format!("terminal token {id:?} has no activation"))
        })?;
        entry.refs -= 1;
        if entry.refs == 0 {
            self.activations.remove(&key);
            trace!(rule = %key.rule, facts = ?key.facts, "withdrawal");
            self.pending.push(AgendaEvent::Withdraw(key));
        }
        Ok(())
    }

    /// Delivers the events of a completed operation.
    ///
    /// A publication withdrawn later in the same operation is dropped
    /// together with its withdrawal.
    pub(crate) fn flush(&mut self, agenda: &mut impl Agenda) {
        let events = std::mem::take(&mut self.pending);
        let mut keep = vec![true; events.len()];
        let mut open: HashMap<ActivationKey, usize> = HashMap::new();
        for (index, event) in events.iter().enumerate() {
            match event {
                AgendaEvent::Publish(activation) => {
                    open.insert(activation.key(), index);
                }
                AgendaEvent::Withdraw(key) => {
                    if let Some(published) = open.remove(key) {
                        keep[published] = false;
                        keep[index] = false;
                    }
                }
            }
        }
        for (event, keep) in events.into_iter().zip(keep) {
            if keep {
                event.deliver(agenda);
            }
        }
    }

    // =========================================================================
    // Deletion
    // =========================================================================

    /// Deletes tokens and everything derived from them.
    ///
    /// Children are unlinked before their parents. Left tokens of negated
    /// joins that lose their last blocker are returned for re-emission;
    /// outputs of exists joins that lose their last witness are deleted.
    pub(crate) fn delete_tokens(&mut self, roots: Vec<TokenId>) -> Result<Vec<TokenId>> {
        let mut unblocked = Vec::new();
        let mut stack: Vec<(TokenId, bool)> = roots.into_iter().rev().map(|id| (id, false)).collect();

        while let Some((id, expanded)) = stack.pop() {
            if expanded {
                self.unlink(id)?;
                continue;
            }
            let Some(token) = self.tokens.get_mut(id) else {
                continue;
            };
            if token.deleting {
                continue;
            }
            token.deleting = true;
            let children = token.children.clone();
            let blockers = std::mem::take(&mut token.blockers);
            let blocking = std::mem::take(&mut token.blocking);
            let (owner, side) = (token.owner, token.side);

            if side == Side::Terminal {
                self.release_activation(id)?;
            }

            for blocker in blockers {
                if let Some(right) = self.tokens.get_mut(blocker) {
                    right.blocking.retain(|&l| l != id);
                }
            }

            if !blocking.is_empty() {
                let mode = self.join_ref(owner)?.mode;
                for left_id in blocking {
                    let Some(left) = self.tokens.get_mut(left_id) else {
                        continue;
                    };
                    left.blockers.retain(|&r| r != id);
                    if left.deleting || !left.blockers.is_empty() {
                        continue;
                    }
                    match mode {
                        JoinMode::Exists => {
                            stack.extend(left.children.iter().rev().map(|&c| (c, false)));
                        }
                        JoinMode::Negated => unblocked.push(left_id),
                        JoinMode::Positive => {
                            return Err(Error::structural(format!(
                                "positive join {owner} has blocked tokens"
                            )));
                        }
                    }
                }
            }

            stack.push((id, true));
            stack.extend(children.into_iter().rev().map(|c| (c, false)));
        }
        Ok(unblocked)
    }
}
