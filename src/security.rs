//! Shared security checks for any incoming ID-bearing field. Used by
//! the resolver, the kind-inference engine, and the validation pipeline
//! so that nothing ever reaches the filesystem without first being
//! screened.

use crate::error::{ErrorCode, TrellisError};

const MAX_ID_LEN: usize = 256;

/// Reject anything that smells like path traversal, a control character,
/// a `null`/`none`/`undefined` literal, excessive length, or a
/// whitespace-only value. Never echoes the raw offending value back in
/// the error — only a generic description.
pub fn check_id_security(raw: &str) -> Result<(), TrellisError> {
    if raw.trim().is_empty() {
        return Err(TrellisError::single(
            ErrorCode::SecurityViolation,
            "identifier must not be empty or whitespace-only",
        ));
    }
    if raw.len() > MAX_ID_LEN {
        return Err(TrellisError::single(
            ErrorCode::SecurityViolation,
            "identifier exceeds maximum allowed length",
        ));
    }
    if raw.chars().any(|c| c.is_control()) {
        return Err(TrellisError::single(
            ErrorCode::SecurityViolation,
            "identifier contains control characters",
        ));
    }
    let lowered = raw.to_ascii_lowercase();
    for literal in ["null", "none", "undefined", "nil"] {
        if lowered == literal {
            return Err(TrellisError::single(
                ErrorCode::SecurityViolation,
                "identifier must not be a null-like literal",
            ));
        }
    }
    if raw.contains("..")
        || raw.contains('~')
        || raw.starts_with('/')
        || raw.contains('\\')
        || lowered.contains("%2e%2e")
        || lowered.contains("%2f")
        || lowered.contains("%5c")
    {
        return Err(TrellisError::single(
            ErrorCode::SecurityViolation,
            "identifier contains a path-traversal token",
        ));
    }
    Ok(())
}

/// Field names that suggest a privilege-escalation attempt if they show
/// up where an ordinary object field is expected.
const FORBIDDEN_FIELD_NAMES: &[&str] = &[
    "__proto__",
    "constructor",
    "prototype",
    "admin",
    "root",
    "sudo",
    "superuser",
];

pub fn check_field_name(name: &str) -> Result<(), TrellisError> {
    let lowered = name.to_ascii_lowercase();
    if FORBIDDEN_FIELD_NAMES.contains(&lowered.as_str()) {
        return Err(TrellisError::single(
            ErrorCode::SecurityViolation,
            "field name is not permitted",
        ));
    }
    Ok(())
}

/// Verify that `candidate` resolves to a path strictly within `root` —
/// a filesystem-boundary check independent of the lexical ID checks
/// above.
pub fn ensure_within_root(
    candidate: &std::path::Path,
    root: &std::path::Path,
) -> Result<(), TrellisError> {
    let normalize = |p: &std::path::Path| -> std::path::PathBuf {
        let mut out = std::path::PathBuf::new();
        for component in p.components() {
            match component {
                std::path::Component::ParentDir => {
                    out.pop();
                }
                std::path::Component::CurDir => {}
                other => out.push(other.as_os_str()),
            }
        }
        out
    };
    let norm_candidate = normalize(candidate);
    let norm_root = normalize(root);
    if !norm_candidate.starts_with(&norm_root) {
        return Err(TrellisError::single(
            ErrorCode::SecurityViolation,
            "resolved path escapes the project root",
        ));
    }
    Ok(())
}
