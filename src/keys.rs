// Fleet Admin - Key Registry
// Copyright 2026 Joseph Stone - All Rights Reserved
//
// The "keys" category: creation, lookup by secret, admin and
// self-service edits, deletion. Secrets are only returned by create.

use crate::error::{AdminError, Result};
use crate::model::{self, KeyRecord};
use crate::path;
use crate::store::PathStore;
use serde_json::{Map, Value};

const CATEGORY: &str = "keys";

/// Fields a key holder may change on their own key.
const SELF_EDITABLE: [&str; 2] = ["allowed_ips", "allow_any"];

/// Fields an admin edit may never touch.
const IMMUTABLE: [&str; 2] = ["uuid", "id"];

/// Linear scan for the record whose secret matches.
pub fn find_by_secret(store: &PathStore, secret: &str) -> Result<Option<(String, KeyRecord)>> {
    let keys = store.get(CATEGORY)?;
    let keys = model::as_mapping(&keys, CATEGORY)?;

    for (uuid, record) in keys {
        if record.get("key").and_then(Value::as_str) == Some(secret) {
            return Ok(Some((uuid.clone(), model::from_record(record.clone())?)));
        }
    }
    Ok(None)
}

/// Create a key. The returned record is the only place the secret is shown.
pub fn create_key(
    store: &PathStore,
    name: &str,
    permissions: Vec<String>,
    allow_any: bool,
    allowed_ips: Vec<String>,
) -> Result<KeyRecord> {
    let key = KeyRecord::new(name, permissions, allow_any, allowed_ips);
    store.put(&path::record(CATEGORY, &key.uuid)?, model::to_record(&key)?)?;
    log::info!("Created key {} ({}) with permissions {:?}", key.id, key.name, key.permissions);
    Ok(key)
}

pub fn get_key(store: &PathStore, uuid: &str) -> Result<KeyRecord> {
    let record = store
        .get(&path::record(CATEGORY, uuid)?)
        .map_err(|_| AdminError::not_found(format!("Key {} does not exist", uuid)))?;
    model::from_record(record)
}

/// Public views of every key, keyed by uuid.
pub fn list_keys(store: &PathStore) -> Result<Map<String, Value>> {
    let keys = store.get(CATEGORY)?;
    let mut out = Map::new();
    for (uuid, record) in model::as_mapping(&keys, CATEGORY)? {
        let key: KeyRecord = model::from_record(record.clone())?;
        out.insert(uuid.clone(), key.public_view());
    }
    Ok(out)
}

/// Admin edit: merge `changes` over the stored record.
pub fn edit_key(store: &PathStore, uuid: &str, changes: &Map<String, Value>) -> Result<()> {
    if let Some(field) = changes.keys().find(|k| IMMUTABLE.contains(&k.as_str())) {
        return Err(AdminError::arg(format!("Key {} cannot be edited", field)));
    }
    let record_path = path::record(CATEGORY, uuid)?;
    if !store.contains(&record_path) {
        return Err(AdminError::not_found(format!("Key {} doesn't exist", uuid)));
    }

    store.update(&record_path, |record| {
        let mut merged = model::as_mapping(record, "key record")?.clone();
        for (field, value) in changes {
            merged.insert(field.clone(), value.clone());
        }
        model::check_record::<KeyRecord>(&merged, "key")?;
        *record = Value::Object(merged);
        Ok(())
    })
}

/// Self-service edit, addressed by the caller's own secret.
pub fn edit_own_key(store: &PathStore, secret: &str, changes: &Map<String, Value>) -> Result<()> {
    let (uuid, _) = find_by_secret(store, secret)?
        .ok_or_else(|| AdminError::not_found("Your key was not found in the database"))?;

    store.update(&path::record(CATEGORY, &uuid)?, |record| {
        let map = record
            .as_object_mut()
            .ok_or_else(|| AdminError::arg("key record must be a mapping"))?;
        model::apply_changes(map, changes, &SELF_EDITABLE)
    })
}

pub fn delete_key(store: &PathStore, uuid: &str) -> Result<()> {
    store
        .delete(&path::record(CATEGORY, uuid)?)
        .map_err(|e| match e {
            AdminError::NotFound(_) => AdminError::not_found(format!("Key {} doesn't exist", uuid)),
            other => other,
        })?;
    log::info!("Deleted key {}", uuid);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::config::AdminConfig;
    use serde_json::json;
    use std::sync::Arc;

    fn store() -> PathStore {
        PathStore::open(Arc::new(MemoryBackend::new()), AdminConfig::default().db).unwrap()
    }

    fn changes(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(m) => m,
            _ => unreachable!(),
        }
    }

    #[test]
    fn create_then_find_by_secret() {
        let store = store();
        let key = create_key(&store, "ops", vec!["data".into()], false, vec!["10.0.0.1".into()]).unwrap();

        let (uuid, found) = find_by_secret(&store, &key.secret).unwrap().unwrap();
        assert_eq!(uuid, key.uuid);
        assert_eq!(found, key);
        assert!(find_by_secret(&store, "nope").unwrap().is_none());
    }

    #[test]
    fn listing_hides_secrets() {
        let store = store();
        let key = create_key(&store, "ops", vec![], true, vec![]).unwrap();
        let listed = list_keys(&store).unwrap();
        assert_eq!(listed[&key.uuid]["name"], "ops");
        assert!(listed[&key.uuid].get("key").is_none());
    }

    #[test]
    fn admin_edit_merges_and_guards_identity() {
        let store = store();
        let key = create_key(&store, "ops", vec!["data".into()], false, vec![]).unwrap();

        edit_key(&store, &key.uuid, &changes(json!({"permissions": ["data", "settings"]}))).unwrap();
        assert_eq!(get_key(&store, &key.uuid).unwrap().permissions, vec!["data", "settings"]);

        let err = edit_key(&store, &key.uuid, &changes(json!({"uuid": "other"}))).unwrap_err();
        assert_eq!(err.kind(), "ArgError");

        let err = edit_key(&store, &key.uuid, &changes(json!({"counter": "lots"}))).unwrap_err();
        assert_eq!(err.kind(), "ArgError");
        assert_eq!(get_key(&store, &key.uuid).unwrap().counter, 0);

        let err = edit_key(&store, "missing", &changes(json!({"name": "x"}))).unwrap_err();
        assert_eq!(err.kind(), "NotFound");
    }

    #[test]
    fn self_edit_limited_to_origin_fields() {
        let store = store();
        let key = create_key(&store, "ops", vec!["auth".into()], false, vec![]).unwrap();

        edit_own_key(&store, &key.secret, &changes(json!({"allowed_ips": ["192.168.1.9"]}))).unwrap();
        assert_eq!(get_key(&store, &key.uuid).unwrap().allowed_ips, vec!["192.168.1.9"]);

        let err = edit_own_key(&store, &key.secret, &changes(json!({"permissions": ["admin"]}))).unwrap_err();
        assert_eq!(err.to_string(), "Key permissions cannot be edited");

        let err = edit_own_key(&store, &key.secret, &changes(json!({"allow_any": "yes"}))).unwrap_err();
        assert_eq!(err.to_string(), "Key allow_any is of wrong type");
    }

    #[test]
    fn delete_removes_key() {
        let store = store();
        let key = create_key(&store, "ops", vec![], true, vec![]).unwrap();
        delete_key(&store, &key.uuid).unwrap();
        assert_eq!(get_key(&store, &key.uuid).unwrap_err().kind(), "NotFound");
        assert_eq!(delete_key(&store, &key.uuid).unwrap_err().kind(), "NotFound");
    }
}
