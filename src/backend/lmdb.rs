// Fleet Admin - LMDB Backend
// Copyright 2026 Joseph Stone - All Rights Reserved
//
// Stores the serialized document under a single key in LMDB.
// Storage: <dir>/DOCUMENT.DB/, backups in <dir>/backups/.

use super::{default_tree, write_backup, Backend, BackupInfo};
use crate::error::Result;
use heed::types::*;
use heed::{Database, Env, EnvOpenOptions};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

const DOCUMENT_KEY: &str = "document";
const MAX_DB_SIZE: usize = 64 * 1024 * 1024; // 64MB

/// LMDB-backed document store
pub struct LmdbBackend {
    env: Env,
    db: Database<Str, Str>,
    backup_dir: PathBuf,
}

impl LmdbBackend {
    /// Open or create LMDB under the given directory
    pub fn open(dir: &Path) -> Result<Self> {
        let db_path = dir.join("DOCUMENT.DB");
        std::fs::create_dir_all(&db_path)?;

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(MAX_DB_SIZE)
                .max_dbs(2)
                .open(&db_path)?
        };

        let mut wtxn = env.write_txn()?;
        let db = env.create_database(&mut wtxn, Some("fleet_admin"))?;
        wtxn.commit()?;

        log::info!("Document LMDB opened at {:?}", db_path);
        Ok(Self {
            env,
            db,
            backup_dir: dir.join("backups"),
        })
    }

    fn read_raw(&self) -> Result<Option<String>> {
        let rtxn = self.env.read_txn()?;
        Ok(self.db.get(&rtxn, DOCUMENT_KEY)?.map(|s| s.to_string()))
    }
}

impl Backend for LmdbBackend {
    fn name(&self) -> &'static str {
        "lmdb"
    }

    fn load(&self, defaults: &Map<String, Value>) -> Result<Value> {
        std::fs::create_dir_all(&self.backup_dir)?;

        match self.read_raw() {
            Ok(Some(json)) => match serde_json::from_str::<Value>(&json) {
                Ok(tree) => return Ok(tree),
                Err(e) => {
                    log::warn!("Stored document is unreadable ({}), regenerating", e);
                    if let Err(e) = write_backup(&self.backup_dir, "corrupt", json.as_bytes()) {
                        log::warn!("Could not quarantine unreadable document: {}", e);
                    }
                }
            },
            Ok(None) => log::info!("No stored document, creating from defaults"),
            Err(e) => log::warn!("Document read failed ({}), regenerating", e),
        }

        let tree = default_tree(defaults);
        self.write(&tree)?;
        Ok(tree)
    }

    fn write(&self, tree: &Value) -> Result<()> {
        let json = serde_json::to_string(tree)?;
        let mut wtxn = self.env.write_txn()?;
        self.db.put(&mut wtxn, DOCUMENT_KEY, &json)?;
        wtxn.commit()?;
        log::debug!("Document written to LMDB ({} bytes)", json.len());
        Ok(())
    }

    fn backup(&self) -> Result<BackupInfo> {
        let json = self
            .read_raw()?
            .ok_or_else(|| crate::error::AdminError::not_found("No stored document to back up"))?;
        write_backup(&self.backup_dir, "db", json.as_bytes())
    }
}
