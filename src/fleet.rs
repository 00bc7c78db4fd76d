// Fleet Admin - Nodes, Devices and Device Data
// Copyright 2026 Joseph Stone - All Rights Reserved
//
// Node and device lifecycle on top of the path store.
// A node owns a list of device uuids; each device points back at its
// node. Create / delete keep both sides in step.

use crate::auth::AuthGrant;
use crate::config::AdminConfig;
use crate::error::{AdminError, Result};
use crate::model::{self, DeviceRecord, NodeRecord};
use crate::path;
use crate::store::PathStore;
use chrono::Utc;
use serde_json::{json, Map, Value};

const NODES: &str = "nodes";
const DEVICES: &str = "devices";

const NODE_EDITABLE: [&str; 2] = ["name", "keys"];
const DEVICE_EDITABLE: [&str; 4] = ["config", "polling_rate", "keys", "events"];

/// Fields returned by listings. Device data is only served by `get_data`.
const NODE_FIELDS: [&str; 8] = ["name", "uuid", "id", "devices", "last_updated", "last_updated_by", "data", "keys"];
const DEVICE_FIELDS: [&str; 9] = ["node", "type", "config", "polling_rate", "keys", "events", "uuid", "id", "name"];

fn node_path(uuid: &str) -> Result<String> {
    path::record(NODES, uuid)
}

fn device_path(uuid: &str) -> Result<String> {
    path::record(DEVICES, uuid)
}

/// Typed read of one record, NotFound with `label` when absent.
fn read<T: for<'de> serde::Deserialize<'de>>(store: &PathStore, record_path: &str, label: &str, uuid: &str) -> Result<T> {
    let value = store
        .get(record_path)
        .map_err(|_| AdminError::not_found(format!("{} {} does not exist", label, uuid)))?;
    model::from_record(value)
}

/// Swap a NotFound for a caller-facing message; anything else passes through.
fn missing(e: AdminError, message: String) -> AdminError {
    match e {
        AdminError::NotFound(_) => AdminError::not_found(message),
        other => other,
    }
}

/// Records of `category` visible to `grant`, keyed by uuid and limited to `fields`.
fn visible(store: &PathStore, category: &str, grant: &AuthGrant, fields: &[&str]) -> Result<Map<String, Value>> {
    let all = store.get(category)?;
    let mut out = Map::new();
    for (uuid, record) in model::as_mapping(&all, category)? {
        let keys: Vec<String> = record
            .get("keys")
            .cloned()
            .map(serde_json::from_value)
            .transpose()?
            .unwrap_or_default();
        if grant.can_access(&keys) {
            let view: Map<String, Value> = model::as_mapping(record, category)?
                .iter()
                .filter(|(k, _)| fields.contains(&k.as_str()))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            out.insert(uuid.clone(), Value::Object(view));
        }
    }
    Ok(out)
}

// ============================================================================
// NODES
// ============================================================================

/// New node owned by the calling key.
pub fn create_node(store: &PathStore, grant: &AuthGrant, name: &str) -> Result<NodeRecord> {
    let node = NodeRecord::new(name, &grant.key_uuid);
    store.put(&node_path(&node.uuid)?, model::to_record(&node)?)?;
    log::info!("Created node {} ({})", node.id, node.name);
    Ok(node)
}

pub fn list_nodes(store: &PathStore, grant: &AuthGrant) -> Result<Map<String, Value>> {
    visible(store, NODES, grant, &NODE_FIELDS)
}

pub fn get_node(store: &PathStore, uuid: &str) -> Result<NodeRecord> {
    read(store, &node_path(uuid)?, "Node", uuid)
}

/// Change `name` and / or `keys`.
pub fn edit_node(store: &PathStore, uuid: &str, changes: &Map<String, Value>) -> Result<()> {
    let record_path = node_path(uuid)?;
    if !store.contains(&record_path) {
        return Err(AdminError::not_found(format!("Node {} doesn't exist", uuid)));
    }
    store.update(&record_path, |record| {
        let map = record
            .as_object_mut()
            .ok_or_else(|| AdminError::arg("node record must be a mapping"))?;
        let mut edited = map.clone();
        model::apply_changes(&mut edited, changes, &NODE_EDITABLE)?;
        model::check_record::<NodeRecord>(&edited, "node")?;
        *map = edited;
        Ok(())
    })
}

/// Delete a node and every device it lists.
pub fn delete_node(store: &PathStore, uuid: &str) -> Result<()> {
    let node = get_node(store, uuid).map_err(|e| missing(e, format!("Node {} doesn't exist", uuid)))?;

    for device in &node.devices {
        let record_path = device_path(device)?;
        if store.contains(&record_path) {
            store.delete(&record_path)?;
        }
    }
    store.delete(&node_path(uuid)?)?;
    log::info!("Deleted node {} and {} device(s)", uuid, node.devices.len());
    Ok(())
}

// ============================================================================
// DEVICES
// ============================================================================

/// Register a device on `node`. Type and config are checked against the
/// configured device types.
pub fn create_device(
    store: &PathStore,
    config: &AdminConfig,
    grant: &AuthGrant,
    name: &str,
    node: &str,
    device_type: &str,
    device_config: &Map<String, Value>,
) -> Result<DeviceRecord> {
    let parent = node_path(node)?;
    if !store.contains(&parent) {
        return Err(AdminError::not_found(format!("Node {} does not exist", node)));
    }
    let accepted = model::validate_config(device_type, config.device_type(device_type), device_config)?;

    let device = DeviceRecord::new(name, node, device_type, accepted, &grant.key_uuid);
    store.put(&device_path(&device.uuid)?, model::to_record(&device)?)?;

    store.update(&format!("{}/devices", parent), |devices| {
        let list = devices
            .as_array_mut()
            .ok_or_else(|| AdminError::arg("node devices must be a list"))?;
        list.push(json!(device.uuid));
        Ok(())
    })?;

    log::info!("Created {} device {} on node {}", device.device_type, device.id, node);
    Ok(device)
}

pub fn list_devices(store: &PathStore, grant: &AuthGrant) -> Result<Map<String, Value>> {
    visible(store, DEVICES, grant, &DEVICE_FIELDS)
}

pub fn get_device(store: &PathStore, uuid: &str) -> Result<DeviceRecord> {
    read(store, &device_path(uuid)?, "Device", uuid)
}

/// Device record without its reported data.
pub fn device_view(store: &PathStore, uuid: &str) -> Result<Value> {
    Ok(get_device(store, uuid)?.public_view())
}

/// Edit `config`, `polling_rate`, `keys` or `events`.
///
/// The caller's key must be listed on the device unless it holds
/// override. Events are normalized and the resulting config is checked
/// against the device type before anything is stored.
pub fn edit_device(
    store: &PathStore,
    config: &AdminConfig,
    grant: &AuthGrant,
    uuid: &str,
    changes: &Map<String, Value>,
) -> Result<()> {
    let record_path = device_path(uuid)?;
    let device: DeviceRecord = read(store, &record_path, "Device", uuid)
        .map_err(|e| missing(e, format!("Device {} doesn't exist", uuid)))?;

    if !grant.can_access(&device.keys) {
        return Err(AdminError::Perm(format!("You don't have access to device {}", uuid)));
    }

    store.update(&record_path, |record| {
        let mut edited = model::as_mapping(record, "device record")?.clone();
        model::apply_changes(&mut edited, changes, &DEVICE_EDITABLE)?;

        if let Some(events) = changes.get("events") {
            let events = model::validate_events(model::as_mapping(events, "events")?)?;
            edited.insert("events".into(), Value::Object(events));
        }

        let device_type = edited
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let device_config = model::as_mapping(edited.get("config").unwrap_or(&Value::Null), "config")?;
        let accepted = model::validate_config(&device_type, config.device_type(&device_type), device_config)?;
        edited.insert("config".into(), Value::Object(accepted));
        model::check_record::<DeviceRecord>(&edited, "device")?;

        *record = Value::Object(edited);
        Ok(())
    })
}

/// Delete a device and splice it out of its node's device list.
pub fn delete_device(store: &PathStore, uuid: &str) -> Result<()> {
    let device = get_device(store, uuid).map_err(|e| missing(e, format!("Device {} doesn't exist", uuid)))?;

    let parent = node_path(&device.node)?;
    if store.contains(&parent) {
        store.update(&format!("{}/devices", parent), |devices| {
            if let Some(list) = devices.as_array_mut() {
                list.retain(|d| d.as_str() != Some(uuid));
            }
            Ok(())
        })?;
    } else {
        log::warn!("Device {} points at missing node {}", uuid, device.node);
    }

    store.delete(&device_path(uuid)?)?;
    log::info!("Deleted device {}", uuid);
    Ok(())
}

// ============================================================================
// DEVICE DATA
// ============================================================================

/// Replace a device's reported data.
///
/// Keys must appear in the type's data rules; values must match one of
/// the example types or be null. The stored data carries an `info` entry
/// with the update time and reporting origin.
pub fn put_device_data(
    store: &PathStore,
    config: &AdminConfig,
    uuid: &str,
    data: &Map<String, Value>,
    origin: Option<&str>,
) -> Result<()> {
    let record_path = device_path(uuid)?;
    let device: DeviceRecord = read(store, &record_path, "Device", uuid)?;

    let mut accepted = model::validate_data(&device.device_type, config.device_type(&device.device_type), data)?;
    accepted.insert(
        "info".into(),
        json!({
            "last_updated": Utc::now().timestamp(),
            "updated_by": origin.unwrap_or("unknown"),
        }),
    );

    store.update(&record_path, |record| {
        let map = record
            .as_object_mut()
            .ok_or_else(|| AdminError::arg("device record must be a mapping"))?;
        map.insert("data".into(), Value::Object(accepted));
        Ok(())
    })?;
    log::debug!("Data stored for device {}", uuid);
    Ok(())
}

/// Device uuid -> data, for one device or every device on a node.
/// `node` wins when both are given.
pub fn get_data(store: &PathStore, node: Option<&str>, device: Option<&str>) -> Result<Map<String, Value>> {
    let devices = match (node, device) {
        (Some(node), _) => {
            let node = get_node(store, node)?;
            node.devices
                .iter()
                .map(|d| {
                    get_device(store, d).map_err(|_| {
                        AdminError::not_found(format!("Device {} does not exist - node out of sync?", d))
                    })
                })
                .collect::<Result<Vec<_>>>()?
        }
        (None, Some(device)) => vec![get_device(store, device)?],
        (None, None) => return Err(AdminError::arg("Either 'node' or 'device' must be specified")),
    };

    Ok(devices.into_iter().map(|d| (d.uuid, d.data)).collect())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use std::sync::Arc;

    fn setup() -> (PathStore, AdminConfig) {
        let config = AdminConfig::default();
        let store = PathStore::open(Arc::new(MemoryBackend::new()), config.db.clone()).unwrap();
        (store, config)
    }

    fn grant(key: &str, permissions: &[&str]) -> AuthGrant {
        AuthGrant {
            key_uuid: key.to_string(),
            permissions: permissions.iter().map(|p| p.to_string()).collect(),
        }
    }

    fn map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(m) => m,
            _ => unreachable!(),
        }
    }

    fn probe(store: &PathStore, config: &AdminConfig, owner: &AuthGrant, node: &str) -> DeviceRecord {
        create_device(store, config, owner, "probe", node, "thermometer", &map(json!({"pin": 4, "unit": "C"}))).unwrap()
    }

    #[test]
    fn node_lifecycle() {
        let (store, _) = setup();
        let owner = grant("k1", &["settings"]);
        let node = create_node(&store, &owner, "barn").unwrap();
        assert_eq!(node.keys, vec!["k1"]);
        assert_eq!(get_node(&store, &node.uuid).unwrap(), node);

        edit_node(&store, &node.uuid, &map(json!({"name": "north barn"}))).unwrap();
        assert_eq!(get_node(&store, &node.uuid).unwrap().name, "north barn");

        let err = edit_node(&store, &node.uuid, &map(json!({"devices": []}))).unwrap_err();
        assert_eq!(err.to_string(), "Key devices cannot be edited");

        let err = edit_node(&store, "ghost", &map(json!({"name": "x"}))).unwrap_err();
        assert_eq!(err.kind(), "NotFound");
    }

    #[test]
    fn listings_filter_by_ownership() {
        let (store, _) = setup();
        let alice = grant("k1", &["settings"]);
        let bob = grant("k2", &["settings"]);
        let root = grant("k3", &["settings", "override"]);

        let a = create_node(&store, &alice, "a").unwrap();
        create_node(&store, &bob, "b").unwrap();

        let listed = list_nodes(&store, &alice).unwrap();
        assert_eq!(listed.len(), 1);
        assert!(listed.contains_key(&a.uuid));
        assert_eq!(list_nodes(&store, &root).unwrap().len(), 2);
    }

    #[test]
    fn device_creation_links_node() {
        let (store, config) = setup();
        let owner = grant("k1", &["settings"]);
        let node = create_node(&store, &owner, "barn").unwrap();
        let device = probe(&store, &config, &owner, &node.uuid);

        assert_eq!(get_node(&store, &node.uuid).unwrap().devices, vec![device.uuid.clone()]);
        assert_eq!(get_device(&store, &device.uuid).unwrap().node, node.uuid);
        assert_eq!(list_devices(&store, &owner).unwrap().len(), 1);
    }

    #[test]
    fn device_creation_rejects_bad_input() {
        let (store, config) = setup();
        let owner = grant("k1", &["settings"]);

        let err = create_device(&store, &config, &owner, "p", "ghost", "thermometer", &Map::new()).unwrap_err();
        assert_eq!(err.kind(), "NotFound");

        let node = create_node(&store, &owner, "barn").unwrap();
        let err = create_device(&store, &config, &owner, "p", &node.uuid, "toaster", &Map::new()).unwrap_err();
        assert_eq!(err.to_string(), "Device of type toaster is not supported");

        let err = create_device(&store, &config, &owner, "p", &node.uuid, "relay", &map(json!({"pin": 17}))).unwrap_err();
        assert_eq!(err.to_string(), "Config key inverted is required");
        assert!(get_node(&store, &node.uuid).unwrap().devices.is_empty());
    }

    #[test]
    fn device_edit_checks_owner_and_schema() {
        let (store, config) = setup();
        let owner = grant("k1", &["settings"]);
        let node = create_node(&store, &owner, "barn").unwrap();
        let device = probe(&store, &config, &owner, &node.uuid);

        edit_device(&store, &config, &owner, &device.uuid, &map(json!({"polling_rate": 30}))).unwrap();
        assert_eq!(get_device(&store, &device.uuid).unwrap().polling_rate, 30);

        let stranger = grant("k9", &["settings"]);
        let err = edit_device(&store, &config, &stranger, &device.uuid, &map(json!({"polling_rate": 5}))).unwrap_err();
        assert_eq!(err.kind(), "PermError");

        let root = grant("k0", &["override"]);
        edit_device(&store, &config, &root, &device.uuid, &map(json!({"polling_rate": 10}))).unwrap();

        let err = edit_device(&store, &config, &owner, &device.uuid, &map(json!({"config": {"pin": 4}}))).unwrap_err();
        assert_eq!(err.to_string(), "Config key unit is required");
        assert_eq!(get_device(&store, &device.uuid).unwrap().config["unit"], "C");

        let err = edit_device(&store, &config, &owner, &device.uuid, &map(json!({"node": "x"}))).unwrap_err();
        assert_eq!(err.kind(), "ArgError");
    }

    #[test]
    fn edits_that_break_the_record_shape_are_rejected() {
        let (store, config) = setup();
        let owner = grant("k1", &["settings"]);
        let node = create_node(&store, &owner, "barn").unwrap();
        let device = probe(&store, &config, &owner, &node.uuid);

        for changes in [json!({"polling_rate": -5}), json!({"keys": [1]})] {
            let err = edit_device(&store, &config, &owner, &device.uuid, &map(changes)).unwrap_err();
            assert_eq!(err.kind(), "ArgError");
            assert!(err.to_string().starts_with("Invalid device record"));
        }
        assert_eq!(get_device(&store, &device.uuid).unwrap(), device);

        let err = edit_node(&store, &node.uuid, &map(json!({"keys": [1]}))).unwrap_err();
        assert_eq!(err.kind(), "ArgError");
        assert_eq!(get_node(&store, &node.uuid).unwrap().keys, vec!["k1"]);
    }

    #[test]
    fn unreadable_device_is_a_storage_error() {
        let (store, config) = setup();
        let owner = grant("k1", &["settings"]);
        let node = create_node(&store, &owner, "barn").unwrap();
        store
            .put(
                "devices/broken",
                json!({"uuid": "broken", "type": "relay", "node": node.uuid, "polling_rate": -5, "keys": ["k1"]}),
            )
            .unwrap();

        assert_eq!(delete_device(&store, "broken").unwrap_err().kind(), "StorageError");
        let err = edit_device(&store, &config, &owner, "broken", &map(json!({"polling_rate": 5}))).unwrap_err();
        assert_eq!(err.kind(), "StorageError");
        assert!(store.contains("devices/broken"));

        store.put(&format!("nodes/{}/keys", node.uuid), json!("k1")).unwrap();
        assert_eq!(delete_node(&store, &node.uuid).unwrap_err().kind(), "StorageError");
        assert!(store.contains(&format!("nodes/{}", node.uuid)));
    }

    #[test]
    fn device_views_leave_out_data() {
        let (store, config) = setup();
        let owner = grant("k1", &["settings"]);
        let node = create_node(&store, &owner, "barn").unwrap();
        let device = probe(&store, &config, &owner, &node.uuid);
        put_device_data(&store, &config, &device.uuid, &map(json!({"temperature": 20})), None).unwrap();

        let listed = list_devices(&store, &owner).unwrap();
        assert!(listed[&device.uuid].get("data").is_none());
        assert_eq!(listed[&device.uuid]["type"], "thermometer");

        let view = device_view(&store, &device.uuid).unwrap();
        assert!(view.get("data").is_none());
        assert_eq!(view["node"], node.uuid);
    }

    #[test]
    fn device_edit_normalizes_events() {
        let (store, config) = setup();
        let owner = grant("k1", &["settings"]);
        let node = create_node(&store, &owner, "barn").unwrap();
        let device = probe(&store, &config, &owner, &node.uuid);

        let changes = map(json!({"events": {
            "hot": {"type": "fault", "value": "temperature", "comparison": ">", "threshold": 30, "note": "x"}
        }}));
        edit_device(&store, &config, &owner, &device.uuid, &changes).unwrap();

        let stored = get_device(&store, &device.uuid).unwrap();
        assert_eq!(stored.events["hot"]["comparison"], ">");
        assert!(stored.events["hot"].get("note").is_none());
    }

    #[test]
    fn delete_device_splices_node() {
        let (store, config) = setup();
        let owner = grant("k1", &["settings"]);
        let node = create_node(&store, &owner, "barn").unwrap();
        let first = probe(&store, &config, &owner, &node.uuid);
        let second = probe(&store, &config, &owner, &node.uuid);

        delete_device(&store, &first.uuid).unwrap();
        assert_eq!(get_node(&store, &node.uuid).unwrap().devices, vec![second.uuid]);
        assert_eq!(get_device(&store, &first.uuid).unwrap_err().kind(), "NotFound");
        assert_eq!(delete_device(&store, &first.uuid).unwrap_err().kind(), "NotFound");
    }

    #[test]
    fn delete_node_cascades() {
        let (store, config) = setup();
        let owner = grant("k1", &["settings"]);
        let node = create_node(&store, &owner, "barn").unwrap();
        let device = probe(&store, &config, &owner, &node.uuid);

        delete_node(&store, &node.uuid).unwrap();
        assert!(!store.contains(&format!("devices/{}", device.uuid)));
        assert!(!store.contains(&format!("nodes/{}", node.uuid)));
    }

    #[test]
    fn data_put_and_get() {
        let (store, config) = setup();
        let owner = grant("k1", &["settings"]);
        let node = create_node(&store, &owner, "barn").unwrap();
        let device = probe(&store, &config, &owner, &node.uuid);

        put_device_data(&store, &config, &device.uuid, &map(json!({"temperature": 21.5, "humidity": null})), Some("10.0.0.1")).unwrap();

        let by_node = get_data(&store, Some(&node.uuid), None).unwrap();
        let data = &by_node[&device.uuid];
        assert_eq!(data["temperature"], 21.5);
        assert!(data["humidity"].is_null());
        assert_eq!(data["info"]["updated_by"], "10.0.0.1");
        assert!(data["info"]["last_updated"].as_i64().unwrap() > 0);

        let by_device = get_data(&store, None, Some(&device.uuid)).unwrap();
        assert_eq!(by_device, by_node);

        let err = put_device_data(&store, &config, &device.uuid, &map(json!({"temperature": "hot"})), None).unwrap_err();
        assert_eq!(err.kind(), "ArgError");

        let err = get_data(&store, None, None).unwrap_err();
        assert_eq!(err.kind(), "ArgError");
    }

    #[test]
    fn out_of_sync_node_reported() {
        let (store, config) = setup();
        let owner = grant("k1", &["settings"]);
        let node = create_node(&store, &owner, "barn").unwrap();
        let device = probe(&store, &config, &owner, &node.uuid);
        store.delete(&format!("devices/{}", device.uuid)).unwrap();

        let err = get_data(&store, Some(&node.uuid), None).unwrap_err();
        assert_eq!(err.kind(), "NotFound");
        assert!(err.to_string().ends_with("node out of sync?"));
    }
}
