// Fleet Admin - Path Resolution
// Copyright 2026 Joseph Stone - All Rights Reserved
//
// Single source of truth for the admin root directory (config.json, db/).
// Cached via OnceLock for zero-overhead repeated access.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

static ADMIN_ROOT_CACHE: OnceLock<PathBuf> = OnceLock::new();

/// Environment variable that pins the admin root.
pub const ROOT_ENV: &str = "FLEET_ADMIN_ROOT";

/// Admin root directory.
///
/// Resolution order:
///   1. FLEET_ADMIN_ROOT environment variable
///   2. Current working directory
///   3. "." (working directory unreadable)
pub fn admin_root() -> &'static Path {
    ADMIN_ROOT_CACHE.get_or_init(|| resolve_root(std::env::var_os(ROOT_ENV).map(PathBuf::from)))
}

fn resolve_root(from_env: Option<PathBuf>) -> PathBuf {
    if let Some(root) = from_env.filter(|p| !p.as_os_str().is_empty()) {
        return root;
    }
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

/// Default config file location
pub fn default_config_path() -> PathBuf {
    admin_root().join("config.json")
}
