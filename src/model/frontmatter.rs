//! YAML front-matter schema and the `---`-delimited file format.
//!
//! Field order on write is canonical:
//! `kind, id, parent, status, title, priority, worktree, created, updated,
//! schema_version, prerequisites`. `serde_yaml` serializes struct fields
//! in declaration order, so the struct below doubles as the wire format.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use super::{Kind, Priority, Status};
use crate::error::{ErrorCode, TrellisError};

pub const CURRENT_SCHEMA_VERSION: &str = "1.1";
const RECOGNIZED_SCHEMA_VERSIONS: &[&str] = &["1.0", "1.1"];

pub fn is_recognized_schema_version(v: &str) -> bool {
    RECOGNIZED_SCHEMA_VERSIONS.contains(&v)
}

fn deserialize_priority<'de, D>(deserializer: D) -> Result<Priority, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    Priority::parse_with_alias(&raw).ok_or_else(|| {
        serde::de::Error::custom(format!(
            "invalid priority value (expected high, normal, low, or medium): {raw}"
        ))
    })
}

fn default_priority() -> Priority {
    Priority::Normal
}

/// The parsed, validated YAML front-matter of an object file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FrontMatter {
    pub kind: Kind,
    pub id: String,
    #[serde(default)]
    pub parent: Option<String>,
    pub status: Status,
    pub title: String,
    #[serde(default = "default_priority", deserialize_with = "deserialize_priority")]
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worktree: Option<String>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub schema_version: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub prerequisites: Vec<String>,
}

/// A parsed object file: front-matter plus the byte-preserved Markdown
/// body, and the path it was loaded from (or will be written to).
#[derive(Debug, Clone)]
pub struct ObjectFile {
    pub front_matter: FrontMatter,
    pub body: String,
    pub path: PathBuf,
}

const DELIM: &str = "---";

impl ObjectFile {
    /// Parse `---\n<yaml>\n---\n<body>` into an [`ObjectFile`].
    pub fn parse(raw: &str, path: PathBuf) -> Result<Self, TrellisError> {
        let rest = raw.strip_prefix("---\n").ok_or_else(|| {
            TrellisError::single(
                ErrorCode::InvalidField,
                "object file missing YAML front-matter delimiter",
            )
        })?;

        let end = rest.find("\n---\n").or_else(|| {
            // Tolerate a file with no trailing body (front-matter only).
            rest.strip_suffix("\n---\n").map(|_| rest.len())
        });

        let (yaml_str, body) = match end {
            Some(idx) if rest[idx..].starts_with("\n---\n") => {
                (&rest[..idx + 1], &rest[idx + 5..])
            }
            _ => {
                return Err(TrellisError::single(
                    ErrorCode::InvalidField,
                    "object file missing closing front-matter delimiter",
                ))
            }
        };

        let front_matter: FrontMatter = serde_yaml::from_str(yaml_str).map_err(|e| {
            TrellisError::single(ErrorCode::InvalidField, format!("invalid front-matter: {e}"))
        })?;

        Ok(ObjectFile {
            front_matter,
            body: body.to_string(),
            path,
        })
    }

    /// Load and parse a file from disk.
    pub fn load(path: &Path) -> Result<Self, TrellisError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                TrellisError::single(ErrorCode::ObjectNotFound, "object file not found")
            } else {
                TrellisError::from(e)
            }
        })?;
        Self::parse(&raw, path.to_path_buf())
    }

    /// Render back into the canonical `---\n<yaml>---\n<body>` form.
    pub fn render(&self) -> Result<String, TrellisError> {
        let yaml = serde_yaml::to_string(&self.front_matter).map_err(|e| {
            TrellisError::single(
                ErrorCode::InvalidField,
                format!("failed to serialize front-matter: {e}"),
            )
        })?;
        Ok(format!("{DELIM}\n{yaml}{DELIM}\n{}", self.body))
    }

    /// Write atomically: render to a sibling temp file, then rename over
    /// the destination.
    pub fn write_atomic(&self) -> Result<(), TrellisError> {
        let rendered = self.render()?;
        let parent = self.path.parent().ok_or_else(|| {
            TrellisError::single(ErrorCode::InvalidField, "object path has no parent directory")
        })?;
        std::fs::create_dir_all(parent)?;
        let tmp_path = parent.join(format!(
            ".{}.tmp-{}",
            self.path
                .file_name()
                .map(|f| f.to_string_lossy().to_string())
                .unwrap_or_default(),
            std::process::id()
        ));
        std::fs::write(&tmp_path, rendered.as_bytes())?;
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

/// A single entry in the `### Log` section of an object's body.
#[derive(Debug, Clone, PartialEq)]
pub enum LogEntry {
    Prose(String),
    Structured {
        timestamp: DateTime<Utc>,
        files_changed: Vec<String>,
    },
}

impl LogEntry {
    fn render_line(&self) -> String {
        match self {
            LogEntry::Prose(text) => format!("- {text}"),
            LogEntry::Structured {
                timestamp,
                files_changed,
            } => {
                if files_changed.is_empty() {
                    format!("- {}", timestamp.to_rfc3339())
                } else {
                    format!(
                        "- {} — filesChanged: {}",
                        timestamp.to_rfc3339(),
                        files_changed.join(", ")
                    )
                }
            }
        }
    }
}

const LOG_HEADING: &str = "### Log";

/// Append `entry` to the body's `### Log` section, creating the section
/// if it doesn't exist yet.
pub fn append_log_entry(body: &str, entry: &LogEntry) -> String {
    let line = entry.render_line();

    let Some(heading_idx) = body.find(LOG_HEADING) else {
        let mut out = body.to_string();
        if !out.is_empty() && !out.ends_with('\n') {
            out.push('\n');
        }
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(LOG_HEADING);
        out.push('\n');
        out.push_str(&line);
        out.push('\n');
        return out;
    };

    let after_heading = heading_idx + LOG_HEADING.len();
    // Find the next heading line (starts with '#') after this one, which
    // marks the end of the Log section; default to end-of-body.
    let section_end = body[after_heading..]
        .match_indices('\n')
        .find_map(|(offset, _)| {
            let line_start = after_heading + offset + 1;
            let line_rest = &body[line_start..];
            if line_rest.trim_start_matches(' ').starts_with('#') {
                Some(line_start)
            } else {
                None
            }
        })
        .unwrap_or(body.len());

    let mut out = String::with_capacity(body.len() + line.len() + 1);
    out.push_str(&body[..section_end]);
    if !out.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(&line);
    out.push('\n');
    out.push_str(&body[section_end..]);
    out
}
