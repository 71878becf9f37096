//! Cross-run node state: state-machine positions, knowledge-base documents
//! and key/value memory, each keyed by node id.
//!
//! A `NodeStores` lives as long as the session that owns it; values written
//! by one run are visible to the next until cleared.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde_json::{Map, Value};

#[derive(Debug, Default)]
struct Inner {
    states: HashMap<String, String>,
    documents: HashMap<String, Vec<String>>,
    memory: HashMap<String, Map<String, Value>>,
}

#[derive(Debug, Default)]
pub struct NodeStores {
    inner: Mutex<Inner>,
}

impl NodeStores {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── State machine ───────────────────────────────────────────

    pub fn state(&self, node_id: &str) -> Option<String> {
        self.lock().states.get(node_id).cloned()
    }

    pub fn set_state(&self, node_id: &str, state: impl Into<String>) {
        self.lock().states.insert(node_id.to_string(), state.into());
    }

    // ── Documents ───────────────────────────────────────────────

    pub fn documents(&self, node_id: &str) -> Vec<String> {
        self.lock().documents.get(node_id).cloned().unwrap_or_default()
    }

    /// Append documents, returning the new total.
    pub fn add_documents(&self, node_id: &str, docs: impl IntoIterator<Item = String>) -> usize {
        let mut inner = self.lock();
        let entry = inner.documents.entry(node_id.to_string()).or_default();
        entry.extend(docs);
        entry.len()
    }

    // ── Memory ──────────────────────────────────────────────────

    pub fn memory_get(&self, node_id: &str, key: &str) -> Option<Value> {
        self.lock().memory.get(node_id).and_then(|m| m.get(key).cloned())
    }

    pub fn memory_all(&self, node_id: &str) -> Map<String, Value> {
        self.lock().memory.get(node_id).cloned().unwrap_or_default()
    }

    pub fn memory_set(&self, node_id: &str, key: &str, value: Value) {
        self.lock()
            .memory
            .entry(node_id.to_string())
            .or_default()
            .insert(key.to_string(), value);
    }

    /// Append to the array under `key`; a scalar already there becomes the
    /// first element. Returns the new length.
    pub fn memory_append(&self, node_id: &str, key: &str, value: Value) -> usize {
        let mut inner = self.lock();
        let slot = inner
            .memory
            .entry(node_id.to_string())
            .or_default()
            .entry(key.to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        if !slot.is_array() {
            let previous = slot.take();
            *slot = Value::Array(vec![previous]);
        }
        match slot {
            Value::Array(items) => {
                items.push(value);
                items.len()
            }
            _ => 0,
        }
    }

    /// Remove one key, or the node's whole memory when `key` is `None`.
    pub fn memory_clear(&self, node_id: &str, key: Option<&str>) -> usize {
        let mut inner = self.lock();
        match key {
            Some(k) => inner
                .memory
                .get_mut(node_id)
                .and_then(|m| m.remove(k))
                .map_or(0, |_| 1),
            None => inner.memory.remove(node_id).map_or(0, |m| m.len()),
        }
    }

    /// Drop everything stored for one node, or for all nodes.
    pub fn clear(&self, node_id: Option<&str>) {
        let mut inner = self.lock();
        match node_id {
            Some(id) => {
                inner.states.remove(id);
                inner.documents.remove(id);
                inner.memory.remove(id);
            }
            None => *inner = Inner::default(),
        }
    }
}
