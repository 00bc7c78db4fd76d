// Fleet Admin - Path Store
// Copyright 2026 Joseph Stone - All Rights Reserved
//
// In-memory document tree addressed by "/"-delimited paths.
// Mutations are applied under the tree lock, then persisted through
// the backend. Persistence is serialized by the writer slot: a write
// requested while another is in flight waits its turn and then
// persists a snapshot taken after it got the slot. Nothing is dropped.
//
// Lock order: writer slot, then tree. Never the reverse.

use crate::backend::{default_tree, Backend};
use crate::error::{AdminError, Result};
use crate::path;
use serde_json::{Map, Value};
use std::sync::{Arc, Mutex, MutexGuard};

/// Path-addressed document store
pub struct PathStore {
    backend: Arc<dyn Backend>,
    defaults: Map<String, Value>,
    tree: Mutex<Value>,
    writer: Mutex<()>,
}

impl PathStore {
    /// Build an unloaded store. Call [`PathStore::load`] before use.
    pub fn new(backend: Arc<dyn Backend>, defaults: Map<String, Value>) -> Self {
        Self {
            backend,
            defaults,
            tree: Mutex::new(Value::Object(Map::new())),
            writer: Mutex::new(()),
        }
    }

    /// Build and load in one step.
    pub fn open(backend: Arc<dyn Backend>, defaults: Map<String, Value>) -> Result<Self> {
        let store = Self::new(backend, defaults);
        store.load()?;
        Ok(store)
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    fn lock_tree(&self) -> MutexGuard<'_, Value> {
        self.tree.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ========================================================================
    // LOAD / WRITE
    // ========================================================================

    /// Load from the backend, backfill missing top-level defaults, persist.
    /// Existing top-level keys are never overwritten.
    pub fn load(&self) -> Result<()> {
        let mut loaded = self.backend.load(&self.defaults)?;

        if !loaded.is_object() {
            log::warn!("Stored document root is not a mapping, replacing with defaults");
            loaded = default_tree(&self.defaults);
        }

        if let Value::Object(map) = &mut loaded {
            for (key, default) in &self.defaults {
                if !map.contains_key(key) {
                    log::info!("Backfilling missing top-level key {:?}", key);
                    map.insert(key.clone(), default.clone());
                }
            }
        }

        *self.lock_tree() = loaded;
        self.write()
    }

    /// Persist the whole tree. Blocks while another write is in flight.
    pub fn write(&self) -> Result<()> {
        let _slot = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        let snapshot = self.snapshot();
        self.backend.write(&snapshot).map_err(|e| {
            log::error!("Database write failed: {}", e);
            e
        })
    }

    /// Owned copy of the whole tree.
    pub fn snapshot(&self) -> Value {
        self.lock_tree().clone()
    }

    // ========================================================================
    // PATH OPERATIONS
    // ========================================================================

    /// Owned copy of the value at `path`.
    pub fn get(&self, path: &str) -> Result<Value> {
        let tree = self.lock_tree();
        follow(&tree, path).cloned()
    }

    pub fn contains(&self, path: &str) -> bool {
        follow(&self.lock_tree(), path).is_ok()
    }

    /// Set the final segment of `path` to `value` and persist.
    ///
    /// Every segment must pass the identifier grammar. The parent chain
    /// must already exist; intermediate mappings are not created.
    pub fn put(&self, path: &str, value: Value) -> Result<()> {
        let segments = path::parse(path)?;
        let (last, parents) = split_last(&segments, path)?;
        {
            let mut tree = self.lock_tree();
            let parent = descend_mut(&mut tree, parents, path)?;
            as_mapping(parent, path)?.insert(last.to_string(), value);
        }
        self.write()
    }

    /// Mutate the value at `path` in place and persist.
    ///
    /// `f` runs under the tree lock, so read-modify-write sequences such as
    /// counter increments cannot interleave. If `f` fails nothing is
    /// persisted; `f` should validate before it mutates. `f` must not call
    /// back into the store.
    pub fn update<T, F>(&self, path: &str, f: F) -> Result<T>
    where
        F: FnOnce(&mut Value) -> Result<T>,
    {
        let segments = path::parse(path)?;
        let out = {
            let mut tree = self.lock_tree();
            let target = descend_mut(&mut tree, &segments, path)?;
            f(target)?
        };
        self.write()?;
        Ok(out)
    }

    /// Remove the value at `path` from its parent and persist.
    pub fn delete(&self, path: &str) -> Result<Value> {
        let segments = path::parse(path)?;
        let (last, parents) = split_last(&segments, path)?;
        let removed = {
            let mut tree = self.lock_tree();
            let parent = descend_mut(&mut tree, parents, path)?;
            as_mapping(parent, path)?
                .remove(*last)
                .ok_or_else(|| AdminError::not_found(format!("Path {} not found", path)))?
        };
        self.write()?;
        Ok(removed)
    }
}

// ============================================================================
// TREE WALKING
// ============================================================================

fn follow<'a>(tree: &'a Value, path: &str) -> Result<&'a Value> {
    let mut current = tree;
    for name in path::split(path) {
        current = current
            .get(name)
            .ok_or_else(|| AdminError::not_found(format!("Path {} not found at {:?}", path, name)))?;
    }
    Ok(current)
}

fn descend_mut<'a>(tree: &'a mut Value, segments: &[&str], path: &str) -> Result<&'a mut Value> {
    let mut current = tree;
    for name in segments {
        current = current
            .get_mut(*name)
            .ok_or_else(|| AdminError::not_found(format!("Path {} not found at {:?}", path, name)))?;
    }
    Ok(current)
}

fn as_mapping<'a>(value: &'a mut Value, path: &str) -> Result<&'a mut Map<String, Value>> {
    value
        .as_object_mut()
        .ok_or_else(|| AdminError::not_found(format!("Parent of {} is not a mapping", path)))
}

fn split_last<'s, 'a>(segments: &'s [&'a str], path: &str) -> Result<(&'s &'a str, &'s [&'a str])> {
    segments
        .split_last()
        .ok_or_else(|| AdminError::arg(format!("Empty path {:?}", path)))
}

// ============================================================================
// TESTS
// ============================================================================
