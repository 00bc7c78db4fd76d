// Fleet Admin - Backend Interface
// Copyright 2026 Joseph Stone - All Rights Reserved
//
// A backend persists and loads the whole document tree. Nothing more.
// The store never sees files or LMDB handles, only load() and write().
//
// Backends: "json" (db.json on disk), "lmdb" (heed), "memory" (volatile).

use crate::error::{AdminError, Result};
use chrono::Utc;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

pub mod json_file;
pub mod lmdb;
pub mod memory;

pub use json_file::JsonFileBackend;
pub use lmdb::LmdbBackend;
pub use memory::MemoryBackend;

/// Load/write capability over a single JSON document.
///
/// `load` must never fail because the stored document is missing or
/// corrupt: it rebuilds the tree from `defaults` and persists it.
/// `write` must report every failure to its caller.
pub trait Backend: Send + Sync {
    fn name(&self) -> &'static str;

    fn load(&self, defaults: &Map<String, Value>) -> Result<Value>;

    fn write(&self, tree: &Value) -> Result<()>;

    /// Snapshot the persisted document into the backup directory.
    fn backup(&self) -> Result<BackupInfo> {
        Err(AdminError::InvalidInterface(format!(
            "{} (backups unsupported)",
            self.name()
        )))
    }
}

/// Where a backup landed and what it contained.
#[derive(Debug, Clone, serde::Serialize)]
pub struct BackupInfo {
    pub path: PathBuf,
    pub size: u64,
    pub checksum: String,
}

/// Registered backend names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Json,
    Lmdb,
    Memory,
}

impl FromStr for BackendKind {
    type Err = AdminError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "json" => Ok(BackendKind::Json),
            "lmdb" => Ok(BackendKind::Lmdb),
            "memory" => Ok(BackendKind::Memory),
            other => Err(AdminError::InvalidInterface(other.to_string())),
        }
    }
}

/// Build the backend named in configuration, rooted at `dir`.
pub fn open_backend(name: &str, dir: &Path) -> Result<Arc<dyn Backend>> {
    let backend: Arc<dyn Backend> = match name.parse::<BackendKind>()? {
        BackendKind::Json => Arc::new(JsonFileBackend::new(dir)),
        BackendKind::Lmdb => Arc::new(LmdbBackend::open(dir)?),
        BackendKind::Memory => Arc::new(MemoryBackend::new()),
    };
    log::info!("Storage interface {:?} at {:?}", backend.name(), dir);
    Ok(backend)
}

/// Fresh tree built from the default schema.
pub(crate) fn default_tree(defaults: &Map<String, Value>) -> Value {
    Value::Object(defaults.clone())
}

/// Write `data` into `backup_dir` as db-<utc stamp>-<hash prefix>.json.
pub(crate) fn write_backup(backup_dir: &Path, label: &str, data: &[u8]) -> Result<BackupInfo> {
    std::fs::create_dir_all(backup_dir)?;
    let checksum = sha256_hex(data);
    let stamp = Utc::now().format("%Y%m%dT%H%M%SZ");
    let path = backup_dir.join(format!("{}-{}-{}.json", label, stamp, &checksum[..8]));
    std::fs::write(&path, data)?;
    log::info!("Backup written to {:?} ({} bytes)", path, data.len());
    Ok(BackupInfo {
        path,
        size: data.len() as u64,
        checksum,
    })
}

/// SHA256 hash as hex string
fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}
