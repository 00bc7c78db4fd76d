// Fleet Admin - Settings and Notification Phones
// Copyright 2026 Joseph Stone - All Rights Reserved

use crate::config::AdminConfig;
use crate::error::{AdminError, Result};
use crate::model::{self, PhoneRecord};
use crate::path;
use crate::store::PathStore;
use serde_json::{Map, Value};

const SETTINGS: &str = "settings";
const PHONES: &str = "phones";

const PHONE_EDITABLE: [&str; 6] = [
    "number",
    "toggles",
    "checkin_interval",
    "enrolled_devices",
    "enrolled_nodes",
    "name",
];

// ============================================================================
// SETTINGS
// ============================================================================

/// Stored settings, limited to the configured editable keys.
pub fn get_settings(store: &PathStore, config: &AdminConfig) -> Result<Map<String, Value>> {
    let settings = store.get(SETTINGS)?;
    Ok(model::as_mapping(&settings, SETTINGS)?
        .iter()
        .filter(|(k, _)| config.is_settings_key(k))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect())
}

pub fn edit_settings(store: &PathStore, config: &AdminConfig, changes: &Map<String, Value>) -> Result<()> {
    let editable: Vec<&str> = config.settings_keys.iter().map(String::as_str).collect();
    store.update(SETTINGS, |settings| {
        let map = settings
            .as_object_mut()
            .ok_or_else(|| AdminError::arg("settings must be a mapping"))?;
        model::apply_changes(map, changes, &editable)
    })?;
    log::info!("Settings changed: {:?}", changes.keys().collect::<Vec<_>>());
    Ok(())
}

// ============================================================================
// PHONES
// ============================================================================

pub fn create_phone(store: &PathStore, name: &str, number: &str) -> Result<PhoneRecord> {
    let phone = PhoneRecord::new(name, number);
    store.put(&path::record(PHONES, &phone.uuid)?, model::to_record(&phone)?)?;
    log::info!("Registered phone {} ({})", phone.id, phone.name);
    Ok(phone)
}

pub fn list_phones(store: &PathStore) -> Result<Map<String, Value>> {
    let phones = store.get(PHONES)?;
    Ok(model::as_mapping(&phones, PHONES)?.clone())
}

pub fn edit_phone(store: &PathStore, uuid: &str, changes: &Map<String, Value>) -> Result<()> {
    let record_path = path::record(PHONES, uuid)?;
    if !store.contains(&record_path) {
        return Err(AdminError::not_found(format!("Phone {} doesn't exist", uuid)));
    }
    store.update(&record_path, |record| {
        let map = record
            .as_object_mut()
            .ok_or_else(|| AdminError::arg("phone record must be a mapping"))?;
        let mut edited = map.clone();
        model::apply_changes(&mut edited, changes, &PHONE_EDITABLE)?;
        model::check_record::<PhoneRecord>(&edited, "phone")?;
        *map = edited;
        Ok(())
    })
}

pub fn delete_phone(store: &PathStore, uuid: &str) -> Result<()> {
    store
        .delete(&path::record(PHONES, uuid)?)
        .map_err(|e| match e {
            AdminError::NotFound(_) => AdminError::not_found(format!("Phone {} doesn't exist", uuid)),
            other => other,
        })?;
    log::info!("Deleted phone {}", uuid);
    Ok(())
}

/// Phones to notify for `toggle`.
///
/// A phone matches when its toggle is on and it is enrolled to `node`
/// (checked first) or `device`. With neither given every phone with the
/// toggle on matches. A phone without the toggle at all is an error.
pub fn matching_phones(
    store: &PathStore,
    toggle: &str,
    node: Option<&str>,
    device: Option<&str>,
) -> Result<Map<String, Value>> {
    let phones = store.get(PHONES)?;
    let mut out = Map::new();

    for (uuid, record) in model::as_mapping(&phones, PHONES)? {
        let phone: PhoneRecord = model::from_record(record.clone())?;
        let enabled = phone
            .toggles
            .get(toggle)
            .ok_or_else(|| AdminError::arg(format!("Toggle {} not found in phone {}", toggle, uuid)))?;
        if !enabled.as_bool().unwrap_or(false) {
            continue;
        }

        let enrolled = match (node, device) {
            (Some(node), _) => phone.enrolled_nodes.iter().any(|n| n == node),
            (None, Some(device)) => phone.enrolled_devices.iter().any(|d| d == device),
            (None, None) => true,
        };
        if enrolled {
            out.insert(uuid.clone(), record.clone());
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use serde_json::json;
    use std::sync::Arc;

    fn setup() -> (PathStore, AdminConfig) {
        let config = AdminConfig::default();
        let store = PathStore::open(Arc::new(MemoryBackend::new()), config.db.clone()).unwrap();
        (store, config)
    }

    fn map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(m) => m,
            _ => unreachable!(),
        }
    }

    #[test]
    fn settings_read_is_filtered() {
        let (store, config) = setup();
        store.put("settings/internal_secret", json!("hidden")).unwrap();

        let settings = get_settings(&store, &config).unwrap();
        assert!(settings.contains_key("twilio_sid"));
        assert!(!settings.contains_key("internal_secret"));
    }

    #[test]
    fn settings_edit_rules() {
        let (store, config) = setup();
        edit_settings(&store, &config, &map(json!({"twilio_sid": "AC123"}))).unwrap();
        assert_eq!(get_settings(&store, &config).unwrap()["twilio_sid"], "AC123");

        let err = edit_settings(&store, &config, &map(json!({"twilio_sid": 5}))).unwrap_err();
        assert_eq!(err.to_string(), "Key twilio_sid is of wrong type");

        let err = edit_settings(&store, &config, &map(json!({"admin": "x"}))).unwrap_err();
        assert_eq!(err.to_string(), "Key admin cannot be edited");
    }

    #[test]
    fn phone_lifecycle() {
        let (store, _) = setup();
        let phone = create_phone(&store, "on-call", "+15550100").unwrap();
        assert!(list_phones(&store).unwrap().contains_key(&phone.uuid));

        edit_phone(&store, &phone.uuid, &map(json!({"checkin_interval": 3600}))).unwrap();
        let stored = &list_phones(&store).unwrap()[&phone.uuid];
        assert_eq!(stored["checkin_interval"], 3600);

        let err = edit_phone(&store, &phone.uuid, &map(json!({"uuid": "x"}))).unwrap_err();
        assert_eq!(err.kind(), "ArgError");
        assert_eq!(edit_phone(&store, "ghost", &Map::new()).unwrap_err().kind(), "NotFound");

        delete_phone(&store, &phone.uuid).unwrap();
        assert_eq!(delete_phone(&store, &phone.uuid).unwrap_err().kind(), "NotFound");
    }

    #[test]
    fn phone_edit_keeps_record_readable() {
        let (store, _) = setup();
        let phone = create_phone(&store, "on-call", "+15550100").unwrap();
        let other = create_phone(&store, "backup", "+15550101").unwrap();

        for changes in [json!({"checkin_interval": -1}), json!({"enrolled_nodes": [7]})] {
            let err = edit_phone(&store, &phone.uuid, &map(changes)).unwrap_err();
            assert_eq!(err.kind(), "ArgError");
        }
        assert_eq!(list_phones(&store).unwrap()[&phone.uuid]["checkin_interval"], 86400);

        let matching = matching_phones(&store, "fault", None, None).unwrap();
        assert!(matching.contains_key(&phone.uuid));
        assert!(matching.contains_key(&other.uuid));
    }

    #[test]
    fn matching_respects_toggle_and_enrollment() {
        let (store, _) = setup();
        let enrolled = create_phone(&store, "a", "+1").unwrap();
        let other = create_phone(&store, "b", "+2").unwrap();
        let quiet = create_phone(&store, "c", "+3").unwrap();

        edit_phone(&store, &enrolled.uuid, &map(json!({"enrolled_nodes": ["n1"], "enrolled_devices": ["d1"]}))).unwrap();
        edit_phone(
            &store,
            &quiet.uuid,
            &map(json!({"toggles": {"fault": false, "exception": false, "update": false, "start": false, "stop": false}})),
        )
        .unwrap();

        let by_node = matching_phones(&store, "fault", Some("n1"), None).unwrap();
        assert_eq!(by_node.len(), 1);
        assert!(by_node.contains_key(&enrolled.uuid));

        let by_device = matching_phones(&store, "fault", None, Some("d1")).unwrap();
        assert!(by_device.contains_key(&enrolled.uuid));

        let any = matching_phones(&store, "fault", None, None).unwrap();
        assert!(any.contains_key(&other.uuid));
        assert!(!any.contains_key(&quiet.uuid));

        assert!(matching_phones(&store, "start", None, None).unwrap().is_empty());

        let err = matching_phones(&store, "reboot", None, None).unwrap_err();
        assert_eq!(err.kind(), "ArgError");
    }
}
