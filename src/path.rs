// Fleet Admin - Path Syntax
// Copyright 2026 Joseph Stone - All Rights Reserved
//
// Paths are "/"-delimited identifiers: "keys/<uuid>", "settings".
// Segments written through the store must match [A-Za-z0-9_.-]+.
// Quoting characters get their own rejection reason so injection
// attempts show up clearly in logs.

use crate::error::{AdminError, Result};

pub const DELIMITER: char = '/';

const QUOTES: [char; 3] = ['\'', '"', '`'];

/// Split a path without validation. Used by reads, which cannot mutate.
pub fn split(path: &str) -> impl Iterator<Item = &str> {
    path.split(DELIMITER)
}

/// Check one segment against the identifier grammar.
pub fn validate_segment(segment: &str) -> Result<()> {
    let reject = |reason: &str| AdminError::InvalidPathSegment {
        segment: segment.to_string(),
        reason: reason.to_string(),
    };

    if segment.is_empty() {
        return Err(reject("empty segment"));
    }
    if segment.contains(&QUOTES[..]) {
        return Err(reject("quoting character"));
    }
    if let Some(c) = segment
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')))
    {
        return Err(reject(&format!("character {:?} not allowed", c)));
    }
    Ok(())
}

/// Split and validate every segment. Nothing is returned unless all pass.
pub fn parse(path: &str) -> Result<Vec<&str>> {
    let segments: Vec<&str> = split(path).collect();
    for segment in &segments {
        validate_segment(segment)?;
    }
    Ok(segments)
}

/// Build "<category>/<id>" from caller-supplied input, validating the id.
pub fn record(category: &str, id: &str) -> Result<String> {
    validate_segment(id)?;
    Ok(format!("{}{}{}", category, DELIMITER, id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_paths_parse() {
        assert_eq!(parse("settings").unwrap(), vec!["settings"]);
        assert_eq!(
            parse("keys/0b8c1f9e-2d7a-4c55-9a10-3e5f6a7b8c9d").unwrap(),
            vec!["keys", "0b8c1f9e-2d7a-4c55-9a10-3e5f6a7b8c9d"]
        );
        assert_eq!(parse("settings/twilio_sid").unwrap().len(), 2);
    }

    #[test]
    fn quotes_are_rejected() {
        for bad in ["keys/a'b", "keys/\"]", "nodes/`x`"] {
            match parse(bad) {
                Err(AdminError::InvalidPathSegment { reason, .. }) => {
                    assert_eq!(reason, "quoting character")
                }
                other => panic!("{} should be blocked, got {:?}", bad, other),
            }
        }
    }

    #[test]
    fn metacharacters_and_empty_segments_rejected() {
        assert!(parse("keys//x").is_err());
        assert!(parse("keys/x]").is_err());
        assert!(parse("keys/x y").is_err());
        assert!(parse("").is_err());
    }

    #[test]
    fn record_rejects_nested_ids() {
        assert_eq!(record("nodes", "abc").unwrap(), "nodes/abc");
        assert!(record("nodes", "abc/keys").is_err());
    }
}
