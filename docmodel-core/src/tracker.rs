//! Field-level modification tracking.
//!
//! A [`ModificationTracker`] remembers which storage names were written through the
//! data proxy since the last clear. Composite values (lists, dicts, embedded
//! documents) track their own dirtiness through the [`Tracked`] trait, so a value
//! mutated in place still reports as modified even though its slot was never
//! reassigned.

use std::collections::BTreeSet;

use crate::value::FieldValue;

/// A value that knows whether it changed since its last clear.
pub trait Tracked {
    /// Returns `true` if this value, or any value it contains, changed since the last clear.
    fn is_modified(&self) -> bool;

    /// Forgets every recorded change, recursively.
    fn clear_modified(&mut self);
}

/// The set of storage names marked dirty on one data proxy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModificationTracker {
    dirty: BTreeSet<String>,
}

impl ModificationTracker {
    /// Creates an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a storage name as modified. Marking twice has no further effect.
    pub fn mark(&mut self, name: impl Into<String>) {
        self.dirty.insert(name.into());
    }

    /// Returns `true` if `name` was marked since the last clear.
    pub fn is_marked(&self, name: &str) -> bool {
        self.dirty.contains(name)
    }

    /// Iterates over the marked storage names in sorted order.
    pub fn marked(&self) -> impl Iterator<Item = &str> {
        self.dirty.iter().map(String::as_str)
    }

    /// Returns `true` if any name is marked or any held value reports itself modified.
    pub fn is_modified<'a>(&self, values: impl IntoIterator<Item = &'a FieldValue>) -> bool {
        !self.dirty.is_empty() || values.into_iter().any(Tracked::is_modified)
    }

    /// Empties the dirty set and clears every held value.
    pub fn clear<'a>(&mut self, values: impl IntoIterator<Item = &'a mut FieldValue>) {
        self.dirty.clear();
        values.into_iter().for_each(Tracked::clear_modified);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::Bson;

    #[test]
    fn marks_are_deduplicated() {
        let mut tracker = ModificationTracker::new();
        tracker.mark("nick");
        tracker.mark("nick");

        assert_eq!(tracker.marked().collect::<Vec<_>>(), ["nick"]);
    }

    #[test]
    fn clear_is_idempotent() {
        let mut tracker = ModificationTracker::new();
        let mut values = vec![FieldValue::Scalar(Bson::Int32(1))];
        tracker.mark("a");

        tracker.clear(values.iter_mut());
        assert!(!tracker.is_modified(values.iter()));
        tracker.clear(values.iter_mut());
        assert!(!tracker.is_modified(values.iter()));
    }
}
