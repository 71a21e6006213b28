//! Fact identifiers and fact records.

use std::fmt;
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::collections::LtMap;
use crate::value::Value;

/// Unique identifier of a fact in working memory.
///
/// Ids are allocated by the fact store and never reused while the fact is
/// live; the matching network keys its reverse indices on them.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FactId(pub u64);

impl FactId {
    /// Returns the raw integer id.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for FactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "f-{}", self.0)
    }
}

impl fmt::Display for FactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "f-{}", self.0)
    }
}

impl From<u64> for FactId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// A typed record in working memory.
///
/// Facts are immutable once asserted. Cloning is cheap: the template name is
/// shared and the slot map is persistent.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Fact {
    /// Identifier assigned by the fact store.
    pub id: FactId,
    /// Template (record type) name.
    pub template: Arc<str>,
    /// Slot values by attribute name.
    pub slots: LtMap<Arc<str>, Value>,
}

impl Fact {
    /// Creates a fact with no slots.
    #[must_use]
    pub fn new(id: impl Into<FactId>, template: &str) -> Self {
        Self {
            id: id.into(),
            template: template.into(),
            slots: LtMap::new(),
        }
    }

    /// Builder method to set a slot value.
    #[must_use]
    pub fn with_slot(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.slots = self.slots.insert(name.into(), value.into());
        self
    }

    /// Returns a copy of this fact carrying a different id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<FactId>) -> Self {
        self.id = id.into();
        self
    }

    /// Gets a slot value, if present.
    #[must_use]
    pub fn slot(&self, name: &str) -> Option<&Value> {
        self.slots.get(name)
    }

    /// Gets a slot value, treating an absent slot as nil.
    #[must_use]
    pub fn slot_or_nil(&self, name: &str) -> Value {
        self.slot(name).cloned().unwrap_or(Value::Nil)
    }
}

impl fmt::Display for Fact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}", self.id, self.template)?;
        for (name, value) in self.slots.iter() {
            write!(f, " ({name} {value})")?;
        }
        write!(f, ")")
    }
}
