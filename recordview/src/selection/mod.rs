use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Identity of a record: the display form of its identity field.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn new(id: impl Into<String>) -> Self {
        RecordId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&Value> for RecordId {
    fn from(value: &Value) -> Self {
        RecordId(value.to_string())
    }
}

impl From<Value> for RecordId {
    fn from(value: Value) -> Self {
        RecordId::from(&value)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        RecordId(s.to_string())
    }
}

impl From<String> for RecordId {
    fn from(s: String) -> Self {
        RecordId(s)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The set of selected record ids.
///
/// The tracker knows nothing about records; the view decides which ids are
/// still visible and prunes through `retain`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionTracker {
    selected: BTreeSet<RecordId>,
}

impl SelectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flip membership of one id. Returns whether it is selected afterwards.
    pub fn toggle(&mut self, id: RecordId) -> bool {
        if self.selected.remove(&id) {
            false
        } else {
            self.selected.insert(id);
            true
        }
    }

    pub fn select(&mut self, id: RecordId) -> bool {
        self.selected.insert(id)
    }

    pub fn deselect(&mut self, id: &RecordId) -> bool {
        self.selected.remove(id)
    }

    /// Add every given id to the selection
    pub fn select_all<I: IntoIterator<Item = RecordId>>(&mut self, ids: I) {
        self.selected.extend(ids);
    }

    pub fn clear(&mut self) {
        self.selected.clear();
    }

    pub fn is_selected(&self, id: &RecordId) -> bool {
        self.selected.contains(id)
    }

    pub fn selected_ids(&self) -> &BTreeSet<RecordId> {
        &self.selected
    }

    /// Drop ids for which `keep` returns false. Returns how many were dropped.
    pub fn retain<F: FnMut(&RecordId) -> bool>(&mut self, keep: F) -> usize {
        let before = self.selected.len();
        self.selected.retain(keep);
        before - self.selected.len()
    }

    pub fn len(&self) -> usize {
        self.selected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }
}
