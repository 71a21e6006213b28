//! The alpha layer: single-fact condition memories shared across rules.
//!
//! Conditions with the same signature (template, non-predicate slot tests
//! including variable names, negated and exists flags) share one
//! [`AlphaNode`]. Each node remembers the facts that pass its tests, with
//! the bindings they capture, and the joins listening for changes. A node
//! lives exactly as long as some join listens to it.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use trellis_foundation::{Error, Fact, FactId, Result};

use crate::join::JoinId;
use crate::pattern::{Bindings, Condition, SlotTest};

/// Index of an alpha node.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AlphaId(pub u32);

/// The sharing key of an alpha node.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct AlphaSignature {
    /// Template name.
    pub template: Arc<str>,
    /// Slot tests other than predicates, in condition order.
    pub tests: Vec<(Arc<str>, SlotTest)>,
    /// Negated flag.
    pub negated: bool,
    /// Exists flag.
    pub exists: bool,
}

impl AlphaSignature {
    /// Computes the signature of a condition.
    #[must_use]
    pub fn of(condition: &Condition) -> Self {
        Self {
            template: condition.template.clone(),
            tests: condition
                .slots
                .iter()
                .filter(|(_, test)| !test.is_predicate())
                .cloned()
                .collect(),
            negated: condition.negated,
            exists: condition.exists,
        }
    }

    /// Builds the condition this signature tests (without predicates).
    #[must_use]
    pub fn to_condition(&self) -> Condition {
        Condition {
            template: self.template.clone(),
            slots: self.tests.clone(),
            negated: self.negated,
            exists: self.exists,
        }
    }
}

/// A shared single-fact condition memory.
#[derive(Clone, Debug)]
pub struct AlphaNode {
    id: AlphaId,
    signature: AlphaSignature,
    condition: Condition,
    memory: BTreeMap<FactId, Bindings>,
    listeners: Vec<JoinId>,
}

impl AlphaNode {
    /// Returns this node's id.
    #[must_use]
    pub fn id(&self) -> AlphaId {
        self.id
    }

    /// Returns the sharing key.
    #[must_use]
    pub fn signature(&self) -> &AlphaSignature {
        &self.signature
    }

    /// Returns the captured bindings of every admitted fact.
    #[must_use]
    pub fn memory(&self) -> &BTreeMap<FactId, Bindings> {
        &self.memory
    }

    /// Returns the joins fed by this node.
    #[must_use]
    pub fn listeners(&self) -> &[JoinId] {
        &self.listeners
    }

    fn admit(&mut self, fact: &Fact) -> bool {
        match self.condition.capture(fact) {
            Some(bindings) => {
                self.memory.insert(fact.id, bindings);
                true
            }
            None => false,
        }
    }
}

/// All alpha nodes, indexed by signature and by template.
#[derive(Clone, Debug, Default)]
pub struct AlphaIndex {
    /// Released slots are `None` until a new node reuses them.
    nodes: Vec<Option<AlphaNode>>,
    free: Vec<AlphaId>,
    by_signature: HashMap<AlphaSignature, AlphaId>,
    by_template: HashMap<Arc<str>, Vec<AlphaId>>,
}

impl AlphaIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of alpha nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len() - self.free.len()
    }

    /// Returns true if there are no alpha nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Looks up a node by id.
    #[must_use]
    pub fn get(&self, id: AlphaId) -> Option<&AlphaNode> {
        self.nodes.get(id.0 as usize).and_then(Option::as_ref)
    }

    /// Finds the node a condition would share.
    #[must_use]
    pub fn lookup(&self, condition: &Condition) -> Option<&AlphaNode> {
        let id = self.by_signature.get(&AlphaSignature::of(condition))?;
        self.get(*id)
    }

    /// Iterates all nodes.
    pub fn iter(&self) -> impl Iterator<Item = &AlphaNode> {
        self.nodes.iter().flatten()
    }

    /// Returns the node for a condition, creating it if needed.
    ///
    /// A new node is primed with every fact in `facts` that passes its tests.
    /// It has no listeners until [`AlphaIndex::add_listener`] is called.
    ///
    /// # Errors
    /// Returns a structural error if every alpha id is in use.
    pub fn intern<'a>(
        &mut self,
        condition: &Condition,
        facts: impl IntoIterator<Item = &'a Fact>,
    ) -> Result<AlphaId> {
        let signature = AlphaSignature::of(condition);
        if let Some(&id) = self.by_signature.get(&signature) {
            return Ok(id);
        }

        let id = match self.free.pop() {
            Some(id) => id,
            None => AlphaId(
                u32::try_from(self.nodes.len())
                    .map_err(|_| Error::structural("alpha table exhausted"))?,
            ),
        };
        let mut node = AlphaNode {
            id,
            condition: signature.to_condition(),
            signature: signature.clone(),
            memory: BTreeMap::new(),
            listeners: Vec::new(),
        };
        for fact in facts {
            node.admit(fact);
        }
        self.by_template
            .entry(signature.template.clone())
            .or_default()
            .push(id);
        self.by_signature.insert(signature, id);
        match self.nodes.get_mut(id.0 as usize) {
            Some(slot) => *slot = Some(node),
            None => self.nodes.push(Some(node)),
        }
        Ok(id)
    }

    /// Records a fact in every node of its template whose tests it passes.
    ///
    /// Returns the ids of the admitting nodes.
    pub fn admit(&mut self, fact: &Fact) -> Vec<AlphaId> {
        let Some(ids) = self.by_template.get(&fact.template) else {
            return Vec::new();
        };
        let mut admitted = Vec::new();
        for &id in ids {
            if let Some(node) = self.nodes.get_mut(id.0 as usize).and_then(Option::as_mut) {
                if node.admit(fact) {
                    admitted.push(id);
                }
            }
        }
        admitted
    }

    /// Removes a fact from every node of its template.
    ///
    /// Returns the ids of the nodes that held it.
    pub fn dismiss(&mut self, id: FactId, template: &str) -> Vec<AlphaId> {
        let Some(ids) = self.by_template.get(template) else {
            return Vec::new();
        };
        let mut dismissed = Vec::new();
        for &alpha in ids {
            if let Some(node) = self.nodes.get_mut(alpha.0 as usize).and_then(Option::as_mut) {
                if node.memory.remove(&id).is_some() {
                    dismissed.push(alpha);
                }
            }
        }
        dismissed
    }

    /// Registers a join as a listener of a node.
    pub fn add_listener(&mut self, alpha: AlphaId, join: JoinId) {
        if let Some(node) = self.nodes.get_mut(alpha.0 as usize).and_then(Option::as_mut) {
            node.listeners.push(join);
        }
    }

    /// Unregisters a join from a node, releasing the node once nothing
    /// listens to it. Returns true if the node was released.
    pub fn remove_listener(&mut self, alpha: AlphaId, join: JoinId) -> bool {
        let Some(node) = self.nodes.get_mut(alpha.0 as usize).and_then(Option::as_mut) else {
            return false;
        };
        node.listeners.retain(|&j| j != join);
        if !node.listeners.is_empty() {
            return false;
        }
        self.release(alpha);
        true
    }

    fn release(&mut self, id: AlphaId) {
        let Some(node) = self.nodes.get_mut(id.0 as usize).and_then(Option::take) else {
            return;
        };
        let AlphaSignature { template, .. } = &node.signature;
        if let Some(ids) = self.by_template.get_mut(template) {
            ids.retain(|&a| a != id);
            if ids.is_empty() {
                self.by_template.remove(template);
            }
        }
        self.by_signature.remove(&node.signature);
        self.free.push(id);
    }
}
