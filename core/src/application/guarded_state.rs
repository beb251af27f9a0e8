// Copyright (c) 2026 Bastion Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Protected shared-state documents behind an explicit accessor.
//!
//! There is no transparent interception of property access: a component's
//! protected state is reachable only through `get(path)` / `set(path, value)`
//! on the orchestrator, which revalidates every read and write against the
//! owning component's boundary before this store is touched. This module is
//! the storage half: one JSON document per owner, addressed by dotted paths.

use dashmap::DashMap;
use serde_json::{Map, Value};

use crate::domain::component::ComponentId;

/// One JSON document per owning component.
pub struct GuardedStateStore {
    documents: DashMap<ComponentId, Value>,
}

impl GuardedStateStore {
    pub fn new() -> Self {
        Self {
            documents: DashMap::new(),
        }
    }

    /// Read a value at `path` from the owner's document.
    pub fn read(&self, owner: ComponentId, path: &str) -> Option<Value> {
        let doc = self.documents.get(&owner)?;
        lookup(&doc, path).cloned()
    }

    /// Write `value` at `path`, creating intermediate objects as needed.
    ///
    /// Fails when the path traverses an existing non-object value; the
    /// caller surfaces that as a denied state modification.
    pub fn write(&self, owner: ComponentId, path: &str, value: Value) -> Result<(), String> {
        let mut doc = self
            .documents
            .entry(owner)
            .or_insert_with(|| Value::Object(Map::new()));
        insert(&mut doc, path, value)
    }

    /// Drop the owner's entire document (component teardown).
    pub fn purge_owner(&self, owner: ComponentId) {
        self.documents.remove(&owner);
    }
}

impl Default for GuardedStateStore {
    fn default() -> Self {
        Self::new()
    }
}

fn lookup<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = doc;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

fn insert(doc: &mut Value, path: &str, value: Value) -> Result<(), String> {
    let mut current = doc;
    let segments: Vec<&str> = path.split('.').collect();
    let (last, parents) = segments
        .split_last()
        .ok_or_else(|| "empty state path".to_string())?;

    for segment in parents {
        if segment.is_empty() {
            return Err(format!("state path {path:?} has an empty segment"));
        }
        let map = current
            .as_object_mut()
            .ok_or_else(|| format!("state path {path:?} traverses a non-object value"))?;
        current = map
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    if last.is_empty() {
        return Err(format!("state path {path:?} has an empty segment"));
    }
    let map = current
        .as_object_mut()
        .ok_or_else(|| format!("state path {path:?} traverses a non-object value"))?;
    map.insert(last.to_string(), value);
    Ok(())
}
