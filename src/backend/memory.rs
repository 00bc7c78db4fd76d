// Fleet Admin - Memory Backend
// Copyright 2026 Joseph Stone - All Rights Reserved
//
// Volatile backend for tests and dry runs. Counts writes and can be
// told to fail them so write-error propagation is testable.

use super::{default_tree, Backend};
use crate::error::{AdminError, Result};
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

#[derive(Default)]
pub struct MemoryBackend {
    persisted: Mutex<Option<Value>>,
    writes: AtomicUsize,
    fail_writes: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an already persisted document.
    pub fn with_document(tree: Value) -> Self {
        Self {
            persisted: Mutex::new(Some(tree)),
            ..Self::default()
        }
    }

    /// Last successfully written document.
    pub fn persisted(&self) -> Option<Value> {
        self.persisted
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

impl Backend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn load(&self, defaults: &Map<String, Value>) -> Result<Value> {
        if let Some(tree) = self.persisted() {
            return Ok(tree);
        }
        let tree = default_tree(defaults);
        self.write(&tree)?;
        Ok(tree)
    }

    fn write(&self, tree: &Value) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(AdminError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "memory backend write failure",
            )));
        }
        *self.persisted.lock().unwrap_or_else(|e| e.into_inner()) = Some(tree.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
