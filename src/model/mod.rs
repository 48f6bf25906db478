//! Object model: kinds, statuses, priorities, and the front-matter schema
//! shared by all four object kinds.

mod frontmatter;

pub use frontmatter::{
    append_log_entry, is_recognized_schema_version, FrontMatter, LogEntry, ObjectFile,
    CURRENT_SCHEMA_VERSION,
};

use serde::{Deserialize, Serialize};
use std::fmt;

/// The four object kinds in the containment tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    Project,
    Epic,
    Feature,
    Task,
}

impl Kind {
    /// The filename/id prefix for this kind (`P-`, `E-`, `F-`, `T-`).
    pub fn prefix(self) -> &'static str {
        match self {
            Kind::Project => "P-",
            Kind::Epic => "E-",
            Kind::Feature => "F-",
            Kind::Task => "T-",
        }
    }

    /// Infer a kind from the leading prefix of an opaque id. Accepts the
    /// bare `task-` alias in addition to `T-`.
    pub fn from_id_prefix(id: &str) -> Option<Kind> {
        if id.starts_with("P-") {
            Some(Kind::Project)
        } else if id.starts_with("E-") {
            Some(Kind::Epic)
        } else if id.starts_with("F-") {
            Some(Kind::Feature)
        } else if id.starts_with("T-") || id.starts_with("task-") {
            Some(Kind::Task)
        } else {
            None
        }
    }

    /// Statuses this kind's lifecycle allows.
    pub fn allowed_statuses(self) -> &'static [Status] {
        match self {
            Kind::Task => &[
                Status::Open,
                Status::InProgress,
                Status::Review,
                Status::Done,
            ],
            Kind::Project | Kind::Epic | Kind::Feature => {
                &[Status::Draft, Status::InProgress, Status::Done]
            }
        }
    }

    /// The directory this kind lives under relative to its parent
    /// (`epics/`, `features/`), or `None` for tasks, which are filed
    /// under `tasks-open/`/`tasks-done/` instead (see [`crate::resolver`]).
    pub fn child_dir_name(self) -> Option<&'static str> {
        match self {
            Kind::Project => Some("epics"),
            Kind::Epic => Some("features"),
            Kind::Feature | Kind::Task => None,
        }
    }

    /// The fixed filename for non-task objects (`project.md`, etc).
    pub fn object_filename(self) -> Option<&'static str> {
        match self {
            Kind::Project => Some("project.md"),
            Kind::Epic => Some("epic.md"),
            Kind::Feature => Some("feature.md"),
            Kind::Task => None,
        }
    }
}

/// Canonicalize a task reference so the bare `task-` alias and the
/// `T-` form compare equal, including self-references within a task's
/// own `prerequisites` list.
pub fn canonical_task_id(id: &str) -> String {
    match id.strip_prefix("task-") {
        Some(rest) => format!("T-{rest}"),
        None => id.to_string(),
    }
}

impl Default for Kind {
    /// `CreateObjectRequest` needs a default variant to derive `Default`;
    /// callers always set `kind` explicitly in practice.
    fn default() -> Self {
        Kind::Task
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Kind::Project => "project",
            Kind::Epic => "epic",
            Kind::Feature => "feature",
            Kind::Task => "task",
        };
        write!(f, "{s}")
    }
}

/// Lifecycle status, shared across kinds. Which variants are valid for a
/// given kind is governed by [`Kind::allowed_statuses`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Status {
    Draft,
    Open,
    InProgress,
    Review,
    Done,
}

impl Status {
    pub fn is_done(self) -> bool {
        matches!(self, Status::Done)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Draft => "draft",
            Status::Open => "open",
            Status::InProgress => "in-progress",
            Status::Review => "review",
            Status::Done => "done",
        };
        write!(f, "{s}")
    }
}

/// Task/object priority. `"medium"` is accepted as an input alias for
/// [`Priority::Normal`] but is never produced on output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Normal,
    Low,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

impl Priority {
    /// Lower rank wins when sorting claim candidates.
    pub fn rank(self) -> u8 {
        match self {
            Priority::High => 1,
            Priority::Normal => 2,
            Priority::Low => 3,
        }
    }

    /// Parse a priority, coercing the `"medium"` alias to `Normal` and
    /// rejecting anything else unrecognized.
    pub fn parse_with_alias(raw: &str) -> Option<Priority> {
        match raw.to_ascii_lowercase().as_str() {
            "high" => Some(Priority::High),
            "normal" => Some(Priority::Normal),
            "low" => Some(Priority::Low),
            "medium" => Some(Priority::Normal),
            _ => None,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Priority::High => "high",
            Priority::Normal => "normal",
            Priority::Low => "low",
        };
        write!(f, "{s}")
    }
}

/// Summary of an immediate child, returned by `getObject`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChildSummary {
    pub id: String,
    pub title: String,
    pub status: Status,
    pub kind: Kind,
    pub created: chrono::DateTime<chrono::Utc>,
    pub file_path: std::path::PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_from_id_prefix_recognizes_all_four() {
        assert_eq!(Kind::from_id_prefix("P-foo"), Some(Kind::Project));
        assert_eq!(Kind::from_id_prefix("E-foo"), Some(Kind::Epic));
        assert_eq!(Kind::from_id_prefix("F-foo"), Some(Kind::Feature));
        assert_eq!(Kind::from_id_prefix("T-foo"), Some(Kind::Task));
    }

    #[test]
    fn kind_from_id_prefix_accepts_standalone_task_alias() {
        assert_eq!(Kind::from_id_prefix("task-foo"), Some(Kind::Task));
    }

    #[test]
    fn kind_from_id_prefix_rejects_unknown() {
        assert_eq!(Kind::from_id_prefix("X-foo"), None);
        assert_eq!(Kind::from_id_prefix(""), None);
    }

    #[test]
    fn priority_rank_orders_high_lowest() {
        assert!(Priority::High.rank() < Priority::Normal.rank());
        assert!(Priority::Normal.rank() < Priority::Low.rank());
    }

    #[test]
    fn priority_parses_medium_alias_as_normal() {
        assert_eq!(Priority::parse_with_alias("medium"), Some(Priority::Normal));
        assert_eq!(Priority::parse_with_alias("Medium"), Some(Priority::Normal));
    }

    #[test]
    fn priority_rejects_unknown_values() {
        assert_eq!(Priority::parse_with_alias("urgent"), None);
    }

    #[test]
    fn task_allows_full_lifecycle_statuses() {
        let statuses = Kind::Task.allowed_statuses();
        assert!(statuses.contains(&Status::Open));
        assert!(statuses.contains(&Status::Review));
        assert!(!statuses.contains(&Status::Draft));
    }

    #[test]
    fn project_lifecycle_has_no_review_state() {
        let statuses = Kind::Project.allowed_statuses();
        assert!(statuses.contains(&Status::Draft));
        assert!(!statuses.contains(&Status::Review));
        assert!(!statuses.contains(&Status::Open));
    }
}
