// Fleet Admin - Error Types
// Copyright 2026 Joseph Stone - All Rights Reserved
//
// One error enum for the store, the backends and the auth resolver.
// Every variant maps to a stable kind tag so the response layer can
// render {"error": kind, "reason": message} without matching on types.

use serde_json::{json, Value};

/// Fleet Admin error types covering store, backend and authorization faults.
#[derive(Debug, thiserror::Error)]
pub enum AdminError {
    #[error("{0}")]
    NotFound(String),

    /// Path segment failed the identifier grammar. Treated as a security fault.
    #[error("Blocked path segment {segment:?}: {reason}")]
    InvalidPathSegment { segment: String, reason: String },

    #[error("{0}")]
    Auth(String),

    #[error("{0}")]
    Arg(String),

    #[error("{0}")]
    Perm(String),

    #[error("No storage interface named {0:?}")]
    InvalidInterface(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("LMDB error: {0}")]
    Lmdb(#[from] heed::Error),
}

impl AdminError {
    /// Stable tag for the error category.
    pub fn kind(&self) -> &'static str {
        match self {
            AdminError::NotFound(_) => "NotFound",
            AdminError::InvalidPathSegment { .. } => "SecurityError",
            AdminError::Auth(_) => "AuthError",
            AdminError::Arg(_) => "ArgError",
            AdminError::Perm(_) => "PermError",
            AdminError::InvalidInterface(_) => "InvalidInterface",
            AdminError::Config(_) => "ConfigError",
            AdminError::Io(_) | AdminError::Json(_) | AdminError::Lmdb(_) => "StorageError",
        }
    }

    /// Response body for the excluded HTTP layer.
    pub fn to_json(&self) -> Value {
        json!({
            "error": self.kind(),
            "reason": self.to_string(),
        })
    }

    pub(crate) fn not_found(msg: impl Into<String>) -> Self {
        AdminError::NotFound(msg.into())
    }

    pub(crate) fn auth(msg: impl Into<String>) -> Self {
        AdminError::Auth(msg.into())
    }

    pub(crate) fn arg(msg: impl Into<String>) -> Self {
        AdminError::Arg(msg.into())
    }
}

/// Convenience Result alias.
pub type Result<T> = std::result::Result<T, AdminError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_stable() {
        assert_eq!(AdminError::auth("x").kind(), "AuthError");
        assert_eq!(AdminError::arg("x").kind(), "ArgError");
        assert_eq!(AdminError::not_found("x").kind(), "NotFound");
        assert_eq!(AdminError::InvalidInterface("s3".into()).kind(), "InvalidInterface");
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        assert_eq!(AdminError::from(io).kind(), "StorageError");
    }

    #[test]
    fn json_body_carries_kind_and_reason() {
        let body = AdminError::auth("Invalid key").to_json();
        assert_eq!(body["error"], "AuthError");
        assert_eq!(body["reason"], "Invalid key");
    }
}
