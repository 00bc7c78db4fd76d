// Fleet Admin - Configuration
// Copyright 2026 Joseph Stone - All Rights Reserved
//
// Storage interface selection, default document schema, device type
// schema and editable settings. Loaded from a JSON file; every field
// falls back to the defaults below when absent.

use crate::error::{AdminError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Top-level categories every document must carry.
pub const CATEGORIES: [&str; 5] = ["keys", "nodes", "devices", "phones", "settings"];

/// Master configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    pub version: String,
    /// Storage interface name: "json", "lmdb" or "memory"
    pub storage: String,
    /// Storage directory. Defaults to <root>/db
    pub db_path: Option<PathBuf>,
    /// Default document schema, backfilled on load
    pub db: Map<String, Value>,
    /// Device type schema
    pub devices: BTreeMap<String, DeviceTypeSpec>,
    /// Settings keys that may be read and edited through the settings layer
    pub settings_keys: Vec<String>,
}

/// Rules for one device type.
///
/// `config` maps each required config key to an example value; supplied
/// values must have the same JSON type. `data` maps each reportable data
/// key to the example values whose JSON types are accepted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceTypeSpec {
    pub config: Map<String, Value>,
    pub data: BTreeMap<String, Vec<Value>>,
}

const SETTINGS_KEYS: [&str; 10] = [
    "twilio_sid",
    "twilio_token",
    "twilio_from",
    "fault_format",
    "exception_format",
    "start_format",
    "stop_format",
    "error_format",
    "pause_format",
    "unpause_format",
];

fn default_schema() -> Map<String, Value> {
    let mut map = Map::new();
    map.insert("keys".into(), json!({}));
    map.insert("nodes".into(), json!({}));
    map.insert("devices".into(), json!({}));
    map.insert("phones".into(), json!({}));
    map.insert(
        "settings".into(),
        json!({
            "twilio_sid": "",
            "twilio_token": "",
            "twilio_from": "",
            "fault_format": "Fault on {device}: {value} {comparison} {threshold}",
            "exception_format": "Exception on {node}: {message}",
            "start_format": "{node} started",
            "stop_format": "{node} stopped",
            "error_format": "Error on {node}: {message}",
            "pause_format": "{device} paused",
            "unpause_format": "{device} resumed"
        }),
    );
    map
}

fn default_device_types() -> BTreeMap<String, DeviceTypeSpec> {
    let mut types = BTreeMap::new();
    types.insert(
        "thermometer".to_string(),
        DeviceTypeSpec {
            config: match json!({"pin": 4, "unit": "C"}) {
                Value::Object(m) => m,
                _ => Map::new(),
            },
            data: BTreeMap::from([
                ("temperature".to_string(), vec![json!(0.0), json!(0)]),
                ("humidity".to_string(), vec![json!(0.0)]),
            ]),
        },
    );
    types.insert(
        "relay".to_string(),
        DeviceTypeSpec {
            config: match json!({"pin": 17, "inverted": false}) {
                Value::Object(m) => m,
                _ => Map::new(),
            },
            data: BTreeMap::from([("state".to_string(), vec![json!(false)])]),
        },
    );
    types
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            version: "1.0.0".to_string(),
            storage: "json".to_string(),
            db_path: None,
            db: default_schema(),
            devices: default_device_types(),
            settings_keys: SETTINGS_KEYS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl AdminConfig {
    /// Load config from JSON file, falling back to defaults
    pub fn load(path: &Path) -> Result<Self> {
        let config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            serde_json::from_str::<Self>(&content)
                .map_err(|e| AdminError::Config(format!("{:?}: {}", path, e)))?
        } else {
            log::warn!("Config not found at {:?}, using defaults", path);
            Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Save config to JSON file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Every category must exist in the default schema as a mapping.
    pub fn validate(&self) -> Result<()> {
        for category in CATEGORIES {
            match self.db.get(category) {
                Some(Value::Object(_)) => {}
                Some(_) => {
                    return Err(AdminError::Config(format!(
                        "default schema entry {:?} must be a mapping",
                        category
                    )))
                }
                None => {
                    return Err(AdminError::Config(format!(
                        "default schema is missing {:?}",
                        category
                    )))
                }
            }
        }
        Ok(())
    }

    /// Resolved storage directory
    pub fn db_dir(&self) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| crate::paths::admin_root().join("db"))
    }

    pub fn device_type(&self, name: &str) -> Option<&DeviceTypeSpec> {
        self.devices.get(name)
    }

    pub fn is_settings_key(&self, key: &str) -> bool {
        self.settings_keys.iter().any(|k| k == key)
    }
}

// ============================================================================
// TESTS
// ============================================================================
