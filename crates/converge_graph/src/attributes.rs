//! Attribute maps and the diffs between them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Attribute name to value mapping.
///
/// A `BTreeMap` keeps iteration order and equality independent of insertion
/// order, so plans and state files are reproducible.
pub type Attributes = BTreeMap<String, Value>;

/// One changed attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeChange {
    /// Attribute name.
    pub name: String,
    /// Recorded value, `None` if the attribute was never set.
    pub before: Option<Value>,
    /// New value. When `computed` is set this still holds unresolved
    /// `${...}` references that are only known at apply time.
    pub after: Value,
    /// Whether `after` depends on a value not yet known at plan time.
    pub computed: bool,
}

/// Ordered set of attribute changes for one resource.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttributeDiff {
    changes: Vec<AttributeChange>,
}

impl AttributeDiff {
    /// Creates an empty diff.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Diffs `desired` against `recorded`, considering only desired keys.
    ///
    /// Attributes present only in `recorded` are provider outputs and are
    /// not reported as removals.
    #[must_use]
    pub fn between(recorded: &Attributes, desired: &Attributes) -> Self {
        let changes = desired
            .iter()
            .filter(|(name, value)| recorded.get(*name) != Some(*value))
            .map(|(name, value)| AttributeChange {
                name: name.clone(),
                before: recorded.get(name).cloned(),
                after: value.clone(),
                computed: false,
            })
            .collect();
        Self { changes }
    }

    /// Adds a change, replacing any earlier change for the same attribute.
    pub fn push(&mut self, change: AttributeChange) {
        self.changes.retain(|existing| existing.name != change.name);
        self.changes.push(change);
        self.changes.sort_by(|a, b| a.name.cmp(&b.name));
    }

    /// Returns true if nothing changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Returns the number of changed attributes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Iterates over the changes in attribute-name order.
    pub fn iter(&self) -> impl Iterator<Item = &AttributeChange> {
        self.changes.iter()
    }

    /// Iterates over the changed attribute names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.changes.iter().map(|change| change.name.as_str())
    }

    /// Looks up the change for one attribute.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&AttributeChange> {
        self.changes.iter().find(|change| change.name == name)
    }

    /// Returns true if any new value is only known at apply time.
    #[must_use]
    pub fn has_computed(&self) -> bool {
        self.changes.iter().any(|change| change.computed)
    }

    /// Returns the new values as an attribute map.
    #[must_use]
    pub fn to_attributes(&self) -> Attributes {
        self.changes
            .iter()
            .map(|change| (change.name.clone(), change.after.clone()))
            .collect()
    }
}

impl<'a> IntoIterator for &'a AttributeDiff {
    type Item = &'a AttributeChange;
    type IntoIter = core::slice::Iter<'a, AttributeChange>;

    fn into_iter(self) -> Self::IntoIter {
        self.changes.iter()
    }
}
