use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use indexmap::IndexMap;

/// A layer's string metadata table.
///
/// The table has shared interior: cloning a `Metadata` yields another handle
/// to the same entries, so the engine, the adapter, and script-side commands
/// all observe one table. Keys keep their insertion order.
#[derive(Debug, Clone, Default)]
pub struct Metadata {
    entries: Arc<Mutex<IndexMap<String, String>>>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, IndexMap<String, String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, name: &str) -> Option<String> {
        self.entries().get(name).cloned()
    }

    /// Insert or overwrite; an overwritten key keeps its position.
    pub fn set(&self, name: impl Into<String>, value: impl Into<String>) {
        self.entries().insert(name.into(), value.into());
    }

    pub fn exists(&self, name: &str) -> bool {
        self.entries().contains_key(name)
    }

    /// Remove an entry; a no-op when the key is absent.
    pub fn unset(&self, name: &str) -> bool {
        self.entries().shift_remove(name).is_some()
    }

    /// All keys in table order.
    pub fn names(&self) -> Vec<String> {
        self.entries().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}
