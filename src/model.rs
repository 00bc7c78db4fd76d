// Fleet Admin - Data Model
// Copyright 2026 Joseph Stone - All Rights Reserved
//
// Typed views of the records stored under each category, plus the
// validation helpers every edit path shares:
//   apply_changes     allow-listed, existing, same-JSON-type field edits
//   validate_config   device config against its type schema
//   validate_data     reported device data against its type schema
//   validate_events   fault / trigger event specs

use crate::config::DeviceTypeSpec;
use crate::error::{AdminError, Result};
use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Map, Value};

/// Permission that bypasses node/device ownership checks
pub const OVERRIDE: &str = "override";

const SECRET_CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyz1234567890ABCDEFGHIJKLMNOPQRSTUVWXYZ.";
pub const SECRET_LEN: usize = 32;

// ============================================================================
// RECORDS
// ============================================================================

/// Authentication key. The secret is stored under the JSON field "key".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyRecord {
    pub uuid: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "key")]
    pub secret: String,
    #[serde(default)]
    pub allow_any: bool,
    #[serde(default)]
    pub allowed_ips: Vec<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
    /// Unix seconds. Older documents store -1 for "never"
    #[serde(default, deserialize_with = "unset_timestamp")]
    pub last_used: Option<i64>,
    #[serde(default)]
    pub last_ip: Option<String>,
    #[serde(default)]
    pub counter: u64,
}

impl KeyRecord {
    pub fn new(name: &str, permissions: Vec<String>, allow_any: bool, allowed_ips: Vec<String>) -> Self {
        let uuid = new_uuid();
        Self {
            id: short_id(&uuid),
            uuid,
            name: name.to_string(),
            secret: generate_secret(SECRET_LEN),
            allow_any,
            allowed_ips,
            permissions,
            last_used: None,
            last_ip: None,
            counter: 0,
        }
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p == permission)
    }

    pub fn is_override(&self) -> bool {
        self.has_permission(OVERRIDE)
    }

    /// Origin check. Open keys accept anything, including an unknown origin.
    pub fn allows_origin(&self, origin: Option<&str>) -> bool {
        self.allow_any || origin.map_or(false, |ip| self.allowed_ips.iter().any(|a| a == ip))
    }

    /// Record without the secret.
    pub fn public_view(&self) -> Value {
        json!({
            "uuid": self.uuid,
            "id": self.id,
            "name": self.name,
            "allow_any": self.allow_any,
            "allowed_ips": self.allowed_ips,
            "permissions": self.permissions,
            "last_used": self.last_used,
            "last_ip": self.last_ip,
            "counter": self.counter,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub uuid: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub devices: Vec<String>,
    #[serde(default)]
    pub keys: Vec<String>,
    #[serde(default = "empty_mapping")]
    pub data: Value,
    #[serde(default, deserialize_with = "unset_timestamp")]
    pub last_updated: Option<i64>,
    #[serde(default)]
    pub last_updated_by: Option<String>,
}

impl NodeRecord {
    pub fn new(name: &str, creator_key: &str) -> Self {
        let uuid = new_uuid();
        Self {
            id: short_id(&uuid),
            uuid,
            name: name.to_string(),
            devices: Vec::new(),
            keys: vec![creator_key.to_string()],
            data: empty_mapping(),
            last_updated: None,
            last_updated_by: None,
        }
    }

    pub fn grants(&self, key_uuid: &str) -> bool {
        self.keys.iter().any(|k| k == key_uuid)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub uuid: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub device_type: String,
    pub node: String,
    #[serde(default)]
    pub config: Map<String, Value>,
    #[serde(default = "default_polling_rate")]
    pub polling_rate: u64,
    #[serde(default)]
    pub keys: Vec<String>,
    #[serde(default = "empty_mapping")]
    pub data: Value,
    #[serde(default)]
    pub events: Map<String, Value>,
}

impl DeviceRecord {
    pub fn new(name: &str, node: &str, device_type: &str, config: Map<String, Value>, creator_key: &str) -> Self {
        let uuid = new_uuid();
        Self {
            id: short_id(&uuid),
            uuid,
            name: name.to_string(),
            device_type: device_type.to_string(),
            node: node.to_string(),
            config,
            polling_rate: default_polling_rate(),
            keys: vec![creator_key.to_string()],
            data: empty_mapping(),
            events: Map::new(),
        }
    }

    pub fn grants(&self, key_uuid: &str) -> bool {
        self.keys.iter().any(|k| k == key_uuid)
    }

    /// Record without reported data.
    pub fn public_view(&self) -> Value {
        json!({
            "uuid": self.uuid,
            "id": self.id,
            "name": self.name,
            "type": self.device_type,
            "node": self.node,
            "config": self.config,
            "polling_rate": self.polling_rate,
            "keys": self.keys,
            "events": self.events,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhoneRecord {
    pub uuid: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub number: String,
    #[serde(default)]
    pub toggles: Map<String, Value>,
    #[serde(default = "default_checkin_interval")]
    pub checkin_interval: u64,
    #[serde(default)]
    pub enrolled_devices: Vec<String>,
    #[serde(default)]
    pub enrolled_nodes: Vec<String>,
}

impl PhoneRecord {
    pub fn new(name: &str, number: &str) -> Self {
        let uuid = new_uuid();
        let toggles = match json!({
            "fault": true,
            "exception": false,
            "update": false,
            "start": false,
            "stop": false
        }) {
            Value::Object(m) => m,
            _ => Map::new(),
        };
        Self {
            id: short_id(&uuid),
            uuid,
            name: name.to_string(),
            number: number.to_string(),
            toggles,
            checkin_interval: default_checkin_interval(),
            enrolled_devices: Vec::new(),
            enrolled_nodes: Vec::new(),
        }
    }
}

fn default_polling_rate() -> u64 {
    60
}

fn default_checkin_interval() -> u64 {
    86400
}

fn empty_mapping() -> Value {
    Value::Object(Map::new())
}

fn unset_timestamp<'de, D>(deserializer: D) -> std::result::Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<i64>::deserialize(deserializer)?;
    Ok(raw.filter(|ts| *ts >= 0))
}

// ============================================================================
// IDENTIFIERS
// ============================================================================

pub fn new_uuid() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// First group of a UUID, used as a short display id.
pub fn short_id(uuid: &str) -> String {
    uuid.split('-').next().unwrap_or(uuid).to_string()
}

/// Random secret drawn from [a-zA-Z0-9.]
pub fn generate_secret(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| SECRET_CHARS[rng.gen_range(0..SECRET_CHARS.len())] as char)
        .collect()
}

// ============================================================================
// VALUE HELPERS
// ============================================================================

/// JSON type name. Integers and floats are distinct types.
pub fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "mapping",
    }
}

pub fn same_type(a: &Value, b: &Value) -> bool {
    json_type(a) == json_type(b)
}

/// Convert a typed record into its stored form.
pub fn to_record<T: Serialize>(record: &T) -> Result<Value> {
    Ok(serde_json::to_value(record)?)
}

/// Read a typed record out of its stored form.
pub fn from_record<T: for<'de> Deserialize<'de>>(value: Value) -> Result<T> {
    Ok(serde_json::from_value(value)?)
}

/// Reject an edited record that no longer reads back as `T`.
pub fn check_record<T: for<'de> Deserialize<'de>>(record: &Map<String, Value>, what: &str) -> Result<()> {
    serde_json::from_value::<T>(Value::Object(record.clone()))
        .map(|_| ())
        .map_err(|e| AdminError::arg(format!("Invalid {} record: {}", what, e)))
}

/// Stored value as a mapping, or an error naming what it should have been.
pub fn as_mapping<'a>(value: &'a Value, what: &str) -> Result<&'a Map<String, Value>> {
    value
        .as_object()
        .ok_or_else(|| AdminError::arg(format!("{} must be a mapping", what)))
}

// ============================================================================
// VALIDATION
// ============================================================================

/// Apply `changes` to `record`.
///
/// Each changed key must be in `editable`, already present in `record`,
/// and carry the same JSON type as the current value. All changes are
/// checked before any is applied.
pub fn apply_changes(record: &mut Map<String, Value>, changes: &Map<String, Value>, editable: &[&str]) -> Result<()> {
    for (key, new_value) in changes {
        if !editable.contains(&key.as_str()) {
            return Err(AdminError::arg(format!("Key {} cannot be edited", key)));
        }
        let current = record
            .get(key)
            .ok_or_else(|| AdminError::arg(format!("Key {} does not exist", key)))?;
        if !same_type(current, new_value) {
            return Err(AdminError::arg(format!("Key {} is of wrong type", key)));
        }
    }
    for (key, new_value) in changes {
        record.insert(key.clone(), new_value.clone());
    }
    Ok(())
}

/// Check a device config against its type. Returns the accepted config.
pub fn validate_config(device_type: &str, spec: Option<&DeviceTypeSpec>, config: &Map<String, Value>) -> Result<Map<String, Value>> {
    let spec = spec.ok_or_else(|| AdminError::arg(format!("Device of type {} is not supported", device_type)))?;

    let mut accepted = Map::new();
    for (key, value) in config {
        let example = spec.config.get(key).ok_or_else(|| {
            AdminError::arg(format!("Device of type {} does not accept config key {}", device_type, key))
        })?;
        if !same_type(example, value) {
            return Err(AdminError::arg(format!("Config key {} is of wrong type", key)));
        }
        accepted.insert(key.clone(), value.clone());
    }

    if let Some(missing) = spec.config.keys().find(|k| !accepted.contains_key(*k)) {
        return Err(AdminError::arg(format!("Config key {} is required", missing)));
    }
    Ok(accepted)
}

/// Check reported data against the type's data rules. Null is always allowed.
pub fn validate_data(device_type: &str, spec: Option<&DeviceTypeSpec>, data: &Map<String, Value>) -> Result<Map<String, Value>> {
    let spec = spec.ok_or_else(|| AdminError::arg(format!("Device type {} has no set data rules", device_type)))?;

    let mut accepted = Map::new();
    for (key, value) in data {
        let examples = spec.data.get(key).ok_or_else(|| {
            AdminError::arg(format!("Data key {} is not supported by device {}", key, device_type))
        })?;
        if !value.is_null() && !examples.iter().any(|e| same_type(e, value)) {
            let allowed: Vec<&str> = examples.iter().map(json_type).collect();
            return Err(AdminError::arg(format!(
                "Data key {} must be of type {} or null",
                key,
                allowed.join("/")
            )));
        }
        accepted.insert(key.clone(), value.clone());
    }
    Ok(accepted)
}

/// Normalize event specs. Known types:
///   fault:   value (string), comparison (string), threshold (any)
///   trigger: value (string), threshold (any), on_trigger (string)
/// Unknown fields are dropped.
pub fn validate_events(events: &Map<String, Value>) -> Result<Map<String, Value>> {
    let mut accepted = Map::new();

    for (name, details) in events {
        let details = as_mapping(details, &format!("Event {}", name))?;
        let event_type = details
            .get("type")
            .ok_or_else(|| AdminError::arg(format!("Event {} is missing key 'type'", name)))?;

        let required: &[(&str, Option<&str>)] = match event_type.as_str() {
            Some("fault") => &[("value", Some("string")), ("comparison", Some("string")), ("threshold", None)],
            Some("trigger") => &[("value", Some("string")), ("threshold", None), ("on_trigger", Some("string"))],
            _ => return Err(AdminError::arg(format!("Event {} is of invalid type", name))),
        };

        let mut event = Map::new();
        event.insert("type".into(), event_type.clone());
        for (key, expected) in required {
            let value = details
                .get(*key)
                .ok_or_else(|| AdminError::arg(format!("Event {} is missing key {}", name, key)))?;
            if let Some(expected) = expected {
                if json_type(value) != *expected {
                    return Err(AdminError::arg(format!("Key {} is of wrong type (req: {})", key, expected)));
                }
            }
            event.insert(key.to_string(), value.clone());
        }
        accepted.insert(name.clone(), Value::Object(event));
    }
    Ok(accepted)
}
