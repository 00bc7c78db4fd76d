// Fleet Admin - Library Root
// Copyright 2026 Joseph Stone - All Rights Reserved
//
// All modules exported here for use by the binary and tests.

pub mod paths;
pub mod config;
pub mod error;
pub mod path;
pub mod model;

// ============================================================================
// STORAGE - Path Store over pluggable backends
// ============================================================================

/// Backend trait plus json / lmdb / memory implementations
pub mod backend;

/// Path-addressed document store
pub mod store;

// ============================================================================
// ADMINISTRATION
// ============================================================================

/// Capability-based request authentication
pub mod auth;

/// Authentication keys
pub mod keys;

/// Nodes, devices and device data
pub mod fleet;

/// Settings and notification phones
pub mod settings;

pub use error::{AdminError, Result};
