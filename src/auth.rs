// Fleet Admin - Auth Resolver (Primary Enforcement Point)
// Copyright 2026 Joseph Stone - All Rights Reserved
//
// Every administrative call passes through here before touching data.
// Key -> Origin -> Permission -> Ownership -> Usage stats.
// First failing step decides the error. The "override" permission
// skips the ownership step entirely.

use crate::error::{AdminError, Result};
use crate::keys;
use crate::model::{self, DeviceRecord, NodeRecord, OVERRIDE};
use crate::path;
use crate::store::PathStore;
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Map, Value};

/// Which ownership proof a call requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthPolicy {
    /// Key, origin and permission only
    Open,
    /// `node` argument required; key must be listed on the node
    Node,
    /// `device` argument required; key must be listed on the device
    Device,
    /// Exactly one of `node` / `device`
    Either,
    /// Both `node` and `device` required and checked
    Both,
    /// Whichever of `node` / `device` is supplied gets checked; none required
    Optional,
    /// No ownership proof satisfies it; only override keys pass
    OverrideOnly,
}

impl AuthPolicy {
    /// Map the four legacy flags onto a policy.
    ///
    /// Combinations no ownership proof can satisfy map to `OverrideOnly`:
    /// `(false, false, true, false)` demands a node or device it never
    /// checks, `(true, true, false, false)` requires both yet rejects the
    /// second.
    pub fn from_flags(node_authenticate: bool, device_authenticate: bool, either_auth: bool, device_optional: bool) -> Self {
        match (node_authenticate, device_authenticate, either_auth, device_optional) {
            (false, false, true, false) => AuthPolicy::OverrideOnly,
            (false, false, _, _) => AuthPolicy::Open,
            (true, false, true, true) | (false, true, true, true) => AuthPolicy::Optional,
            (true, false, _, _) => AuthPolicy::Node,
            (false, true, _, _) => AuthPolicy::Device,
            (true, true, true, true) => AuthPolicy::Optional,
            (true, true, true, false) => AuthPolicy::Either,
            (true, true, false, true) => AuthPolicy::Both,
            (true, true, false, false) => AuthPolicy::OverrideOnly,
        }
    }

    fn checks_node(self) -> bool {
        matches!(self, AuthPolicy::Node | AuthPolicy::Either | AuthPolicy::Both | AuthPolicy::Optional)
    }

    fn checks_device(self) -> bool {
        matches!(self, AuthPolicy::Device | AuthPolicy::Either | AuthPolicy::Both | AuthPolicy::Optional)
    }

    fn requires_node(self) -> bool {
        matches!(self, AuthPolicy::Node | AuthPolicy::Both)
    }

    fn requires_device(self) -> bool {
        matches!(self, AuthPolicy::Device | AuthPolicy::Both)
    }
}

/// Request arguments plus the caller's network origin.
#[derive(Debug, Clone, Copy)]
pub struct AuthRequest<'a> {
    pub args: &'a Map<String, Value>,
    pub origin: Option<&'a str>,
}

impl<'a> AuthRequest<'a> {
    pub fn new(args: &'a Map<String, Value>, origin: Option<&'a str>) -> Self {
        Self { args, origin }
    }

    /// String argument. Null counts as absent; any other type is an error.
    fn arg(&self, name: &str) -> Result<Option<&'a str>> {
        match self.args.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.as_str())),
            Some(_) => Err(AdminError::arg(format!("Argument {} must be a string", name))),
        }
    }
}

/// Authenticated caller identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthGrant {
    pub key_uuid: String,
    pub permissions: Vec<String>,
}

impl AuthGrant {
    pub fn is_override(&self) -> bool {
        self.permissions.iter().any(|p| p == OVERRIDE)
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p == permission)
    }

    /// Whether a record listing `keys` is visible to this caller.
    pub fn can_access(&self, keys: &[String]) -> bool {
        self.is_override() || keys.iter().any(|k| *k == self.key_uuid)
    }
}

// ========================================================================
// AUTHENTICATE - primary enforcement
// ========================================================================

/// Resolve the caller's key and permission set.
///
/// Pipeline:
/// 1. `key` argument present
/// 2. Secret matches a stored key
/// 3. Origin whitelisted unless the key allows any origin
/// 4. Key holds `permission`
/// 5. Ownership of the named node / device, per `policy` (skipped for override)
/// 6. Usage stats recorded: last_used, counter, last_ip
pub fn authenticate(store: &PathStore, request: &AuthRequest<'_>, permission: &str, policy: AuthPolicy) -> Result<AuthGrant> {
    let result = resolve(store, request, permission, policy);
    if let Err(ref e) = result {
        log::warn!(
            "DENIED | {} | {} | origin {}",
            permission,
            e,
            request.origin.unwrap_or("unknown")
        );
    }
    result
}

/// Flag-based entry point kept for callers still passing four booleans.
pub fn authenticate_flags(
    store: &PathStore,
    request: &AuthRequest<'_>,
    permission: &str,
    node_authenticate: bool,
    device_authenticate: bool,
    either_auth: bool,
    device_optional: bool,
) -> Result<AuthGrant> {
    let policy = AuthPolicy::from_flags(node_authenticate, device_authenticate, either_auth, device_optional);
    authenticate(store, request, permission, policy)
}

fn resolve(store: &PathStore, request: &AuthRequest<'_>, permission: &str, policy: AuthPolicy) -> Result<AuthGrant> {
    // Step 1: credential present
    let secret = request
        .arg("key")?
        .ok_or_else(|| AdminError::auth("Missing authentication key"))?;

    // Step 2: credential known
    let (key_uuid, key) =
        keys::find_by_secret(store, secret)?.ok_or_else(|| AdminError::auth("Invalid key"))?;

    // Step 3: origin
    if !key.allows_origin(request.origin) {
        return Err(AdminError::auth("Request not sent from whitelisted IP"));
    }

    // Step 4: permission
    if !key.has_permission(permission) {
        return Err(AdminError::auth(format!("You need permission {} to access this", permission)));
    }

    // Step 5: ownership
    if !key.is_override() {
        check_ownership(store, request, &key_uuid, policy)?;
    }

    // Step 6: usage stats
    record_use(store, &key_uuid, request.origin)?;

    log::debug!("ALLOWED | {} | key {} | {:?}", permission, key.id, policy);
    Ok(AuthGrant {
        key_uuid,
        permissions: key.permissions,
    })
}

fn check_ownership(store: &PathStore, request: &AuthRequest<'_>, key_uuid: &str, policy: AuthPolicy) -> Result<()> {
    if policy == AuthPolicy::OverrideOnly {
        return Err(AdminError::arg("Specify either 'node' or 'device'"));
    }
    let mut authed_one = false;

    if policy.checks_node() {
        match request.arg("node")? {
            None if policy.requires_node() => {
                return Err(AdminError::arg("A node must be specified for this endpoint"));
            }
            None => {}
            Some(node_uuid) => {
                let node: NodeRecord = load_owned(store, "nodes", node_uuid, "Node")?;
                if !node.grants(key_uuid) {
                    return Err(AdminError::auth(format!("Key {} cannot access node {}", key_uuid, node.uuid)));
                }
                authed_one = true;
            }
        }
    }

    if policy.checks_device() {
        match request.arg("device")? {
            None if policy.requires_device() => {
                return Err(AdminError::arg("A device must be specified for this endpoint"));
            }
            None => {}
            Some(device_uuid) => {
                if authed_one && policy == AuthPolicy::Either {
                    return Err(AdminError::arg("Specify either 'node' or 'device'"));
                }
                let device: DeviceRecord = load_owned(store, "devices", device_uuid, "Device")?;
                if !device.grants(key_uuid) {
                    return Err(AdminError::auth(format!(
                        "Key {} cannot access device {}",
                        key_uuid, device.uuid
                    )));
                }
                authed_one = true;
            }
        }
    }

    if !authed_one && policy == AuthPolicy::Either {
        return Err(AdminError::arg("Specify either 'node' or 'device'"));
    }
    Ok(())
}

/// Read a node or device named by a request argument.
fn load_owned<T: for<'de> serde::Deserialize<'de>>(store: &PathStore, category: &str, uuid: &str, label: &str) -> Result<T> {
    let record = store
        .get(&path::record(category, uuid)?)
        .map_err(|_| AdminError::arg(format!("{} {} does not exist", label, uuid)))?;
    model::from_record(record)
}

fn record_use(store: &PathStore, key_uuid: &str, origin: Option<&str>) -> Result<()> {
    let now = Utc::now().timestamp();
    store.update(&path::record("keys", key_uuid)?, |record| {
        let map = record
            .as_object_mut()
            .ok_or_else(|| AdminError::arg("key record must be a mapping"))?;
        let counter = map.get("counter").and_then(Value::as_u64).unwrap_or(0);
        map.insert("last_used".into(), json!(now));
        map.insert("counter".into(), json!(counter + 1));
        map.insert("last_ip".into(), json!(origin));
        Ok(())
    })
}

// ============================================================================
// TESTS
// ============================================================================
