//! Hash tables with an optional metatable.

use rustc_hash::FxHashMap;

use super::value::Key;
use super::{TableRef, Value};

#[derive(Default)]
pub(crate) struct Table {
    entries: FxHashMap<Key, Value>,
    pub(crate) metatable: Option<TableRef>,
}

impl Table {
    pub(crate) fn get(&self, key: &Key) -> Value {
        self.entries.get(key).cloned().unwrap_or_default()
    }

    /// Assigning `nil` removes the entry.
    pub(crate) fn set(&mut self, key: Key, value: Value) {
        if value.is_nil() {
            self.entries.remove(&key);
        } else {
            self.entries.insert(key, value);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn entries(&self) -> impl Iterator<Item = (&Key, &Value)> {
        self.entries.iter()
    }
}
