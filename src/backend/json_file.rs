// Fleet Admin - JSON File Backend
// Copyright 2026 Joseph Stone - All Rights Reserved
//
// Layout under the storage directory:
//   db.json     whole document, pretty printed (4-space indent)
//   backups/    snapshots and quarantined corrupt files
//
// Writes go to db.json.tmp first and are renamed into place.

use super::{default_tree, write_backup, Backend, BackupInfo};
use crate::error::Result;
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

const DB_FILE: &str = "db.json";
const TMP_FILE: &str = "db.json.tmp";
const BACKUP_DIR: &str = "backups";

/// File-based document backend
pub struct JsonFileBackend {
    dir: PathBuf,
}

impl JsonFileBackend {
    pub fn new(dir: &Path) -> Self {
        Self { dir: dir.to_path_buf() }
    }

    pub fn db_file(&self) -> PathBuf {
        self.dir.join(DB_FILE)
    }

    pub fn backup_dir(&self) -> PathBuf {
        self.dir.join(BACKUP_DIR)
    }

    fn ensure_layout(&self) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        std::fs::create_dir_all(self.backup_dir())?;
        Ok(())
    }

    /// Keep a copy of an unreadable db.json before it gets regenerated.
    /// Best effort: a failed quarantine never blocks the load.
    fn quarantine(&self, raw: Option<&[u8]>) {
        let data = match raw {
            Some(bytes) => bytes.to_vec(),
            None => match std::fs::read(self.db_file()) {
                Ok(bytes) => bytes,
                Err(e) => {
                    log::warn!("Could not copy unreadable {:?} aside: {}", self.db_file(), e);
                    return;
                }
            },
        };
        if let Err(e) = write_backup(&self.backup_dir(), "corrupt", &data) {
            log::warn!("Could not quarantine unreadable database: {}", e);
        }
    }
}

impl Backend for JsonFileBackend {
    fn name(&self) -> &'static str {
        "json"
    }

    fn load(&self, defaults: &Map<String, Value>) -> Result<Value> {
        self.ensure_layout()?;
        let file = self.db_file();

        match std::fs::read(&file) {
            Ok(bytes) => match serde_json::from_slice::<Value>(&bytes) {
                Ok(tree) => {
                    log::info!("Database loaded from {:?}", file);
                    return Ok(tree);
                }
                Err(e) => {
                    log::warn!("Database {:?} is unreadable ({}), regenerating", file, e);
                    self.quarantine(Some(&bytes));
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("No database at {:?}, creating from defaults", file);
            }
            Err(e) => {
                log::warn!("Database {:?} could not be read ({}), regenerating", file, e);
                self.quarantine(None);
            }
        }

        let tree = default_tree(defaults);
        self.write(&tree)?;
        Ok(tree)
    }

    fn write(&self, tree: &Value) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;

        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        tree.serialize(&mut ser)?;

        let tmp = self.dir.join(TMP_FILE);
        std::fs::write(&tmp, &buf)?;
        std::fs::rename(&tmp, self.db_file())?;
        log::debug!("Database written ({} bytes)", buf.len());
        Ok(())
    }

    fn backup(&self) -> Result<BackupInfo> {
        let data = std::fs::read(self.db_file())?;
        write_backup(&self.backup_dir(), "db", &data)
    }
}
