//! Deterministic two-way mapping between an opaque ID and its file
//! path, covering both standalone and hierarchical tasks.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;

use crate::error::{ErrorCode, TrellisError};
use crate::model::{Kind, Status};
use crate::security;

static SLUG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[a-z0-9][a-z0-9-]*$").unwrap());

static DONE_TASK_FILENAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{8})_(\d{6})-T-([a-z0-9][a-z0-9-]*)\.md$").unwrap()
});

static OPEN_TASK_FILENAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^T-([a-z0-9][a-z0-9-]*)\.md$").unwrap());

/// Extract and validate the slug portion of an id for the given kind,
/// accepting the bare `task-` alias only for [`Kind::Task`].
pub fn validate_id_format(kind: Kind, id: &str) -> Result<String, TrellisError> {
    security::check_id_security(id)?;

    let slug = if kind == Kind::Task && id.starts_with("task-") {
        &id["task-".len()..]
    } else if let Some(rest) = id.strip_prefix(kind.prefix()) {
        rest
    } else {
        return Err(TrellisError::single(
            ErrorCode::InvalidIDFormat,
            format!("id does not carry the expected {} prefix", kind.prefix()),
        ));
    };

    if !SLUG_RE.is_match(slug) {
        return Err(TrellisError::single(
            ErrorCode::InvalidIDFormat,
            "id slug must match ^[a-z0-9][a-z0-9-]*$",
        ));
    }
    Ok(slug.to_string())
}

/// Resolve the planning directory for `root`: if `root` already
/// contains a `projects/` child, `root` itself is the planning directory
/// (CLI behavior); otherwise `root/planning` is used. `force_subdir`
/// (MCP-side calls) always selects `root/planning` and creates it on
/// demand.
pub fn planning_dir(root: &Path, force_subdir: bool) -> PathBuf {
    if force_subdir {
        root.join("planning")
    } else if root.join("projects").is_dir() {
        root.to_path_buf()
    } else {
        root.join("planning")
    }
}

fn find_unique<F>(search_root: &Path, matches: F) -> Result<Option<PathBuf>, TrellisError>
where
    F: Fn(&Path) -> bool,
{
    if !search_root.is_dir() {
        return Ok(None);
    }
    let mut found = Vec::new();
    for entry in walkdir::WalkDir::new(search_root)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if entry.file_type().is_file() && matches(entry.path()) {
            found.push(entry.path().to_path_buf());
        }
    }
    match found.len() {
        0 => Ok(None),
        1 => Ok(Some(found.remove(0))),
        _ => Err(TrellisError::single(
            ErrorCode::SecurityViolation,
            "ambiguous object: more than one file matched the same id",
        )),
    }
}

/// Locate an existing object's file by kind + id. Tasks are searched
/// both under the project hierarchy and under the standalone
/// directories; a hit in both is an `AmbiguousObject` condition,
/// surfaced here as a security violation since it indicates a corrupted
/// or tampered tree.
pub fn id_to_path(
    kind: Kind,
    id: &str,
    root: &Path,
    force_subdir: bool,
) -> Result<PathBuf, TrellisError> {
    let slug = validate_id_format(kind, id)?;
    let planning = planning_dir(root, force_subdir);

    let path = match kind {
        Kind::Project => {
            let candidate = planning.join("projects").join(format!("P-{slug}")).join("project.md");
            if candidate.is_file() {
                Some(candidate)
            } else {
                None
            }
        }
        Kind::Epic => {
            let dir_name = format!("E-{slug}");
            find_unique(&planning.join("projects"), |p| {
                p.file_name().map(|f| f == "epic.md").unwrap_or(false)
                    && p.parent()
                        .and_then(|d| d.file_name())
                        .map(|d| d == dir_name.as_str())
                        .unwrap_or(false)
            })?
        }
        Kind::Feature => {
            let dir_name = format!("F-{slug}");
            find_unique(&planning.join("projects"), |p| {
                p.file_name().map(|f| f == "feature.md").unwrap_or(false)
                    && p.parent()
                        .and_then(|d| d.file_name())
                        .map(|d| d == dir_name.as_str())
                        .unwrap_or(false)
            })?
        }
        Kind::Task => {
            let hierarchical = find_unique(&planning.join("projects"), |p| task_file_matches(p, &slug))?;
            let standalone_open = find_unique(&planning.join("tasks-open"), |p| task_file_matches(p, &slug))?;
            let standalone_done = find_unique(&planning.join("tasks-done"), |p| task_file_matches(p, &slug))?;
            let hits: Vec<PathBuf> = [hierarchical, standalone_open, standalone_done]
                .into_iter()
                .flatten()
                .collect();
            match hits.len() {
                0 => None,
                1 => Some(hits.into_iter().next().unwrap()),
                _ => {
                    return Err(TrellisError::single(
                        ErrorCode::SecurityViolation,
                        "ambiguous task: id exists in more than one subtree",
                    ))
                }
            }
        }
    };

    path.ok_or_else(|| {
        TrellisError::single(ErrorCode::ObjectNotFound, format!("no {kind} object matches the given id"))
            .with_context("kind", kind.to_string())
    })
}

/// Whether `name` is the filename shape of an open task file (`T-<slug>.md`).
pub fn is_open_task_filename(name: &str) -> bool {
    OPEN_TASK_FILENAME_RE.is_match(name)
}

/// Whether `name` is the filename shape of a done task file
/// (`YYYYMMDD_HHMMSS-T-<slug>.md`).
pub fn is_done_task_filename(name: &str) -> bool {
    DONE_TASK_FILENAME_RE.is_match(name)
}

fn task_file_matches(path: &Path, slug: &str) -> bool {
    let Some(name) = path.file_name().and_then(|f| f.to_str()) else {
        return false;
    };
    if let Some(caps) = OPEN_TASK_FILENAME_RE.captures(name) {
        return &caps[1] == slug;
    }
    if let Some(caps) = DONE_TASK_FILENAME_RE.captures(name) {
        return &caps[3] == slug;
    }
    false
}

/// Construct the destination path for a new object. Parent directories
/// are created on demand. `parent_dir` is the
/// resolved directory of the object's parent (epic/feature) for
/// non-project kinds with a hierarchical parent; pass `None` for a
/// project, or a standalone task.
pub fn resolve_path_for_new(
    kind: Kind,
    id: &str,
    parent_dir: Option<&Path>,
    status: Status,
    root: &Path,
    force_subdir: bool,
    now: DateTime<Utc>,
) -> Result<PathBuf, TrellisError> {
    let slug = validate_id_format(kind, id)?;
    let planning = planning_dir(root, force_subdir);

    let path = match kind {
        Kind::Project => planning.join("projects").join(format!("P-{slug}")).join("project.md"),
        Kind::Epic => {
            let parent_dir = parent_dir.ok_or_else(|| {
                TrellisError::single(ErrorCode::ParentNotFound, "epic requires a parent project directory")
            })?;
            parent_dir.join("epics").join(format!("E-{slug}")).join("epic.md")
        }
        Kind::Feature => {
            let parent_dir = parent_dir.ok_or_else(|| {
                TrellisError::single(ErrorCode::ParentNotFound, "feature requires a parent epic directory")
            })?;
            parent_dir
                .join("features")
                .join(format!("F-{slug}"))
                .join("feature.md")
        }
        Kind::Task => {
            let base = parent_dir.map(|d| d.to_path_buf()).unwrap_or(planning.clone());
            let filename = task_filename(&slug, status, now);
            let subdir = if status.is_done() { "tasks-done" } else { "tasks-open" };
            base.join(subdir).join(filename)
        }
    };

    security::ensure_within_root(&path, &planning)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(path)
}

/// Filename for a task object: `T-<slug>.md` when open, or the
/// completion-timestamped `YYYYMMDD_HHMMSS-T-<slug>.md` when done.
pub fn task_filename(slug: &str, status: Status, now: DateTime<Utc>) -> String {
    if status.is_done() {
        format!("{}-T-{slug}.md", now.format("%Y%m%d_%H%M%S"))
    } else {
        format!("T-{slug}.md")
    }
}

/// Inverse of the path construction above: recover `(kind, id)` from a
/// file path.
pub fn path_to_id(path: &Path) -> Result<(Kind, String), TrellisError> {
    let name = path
        .file_name()
        .and_then(|f| f.to_str())
        .ok_or_else(|| TrellisError::single(ErrorCode::InvalidIDFormat, "path has no filename"))?;

    match name {
        "project.md" => {
            let dir = dir_slug(path, "P-")?;
            Ok((Kind::Project, format!("P-{dir}")))
        }
        "epic.md" => {
            let dir = dir_slug(path, "E-")?;
            Ok((Kind::Epic, format!("E-{dir}")))
        }
        "feature.md" => {
            let dir = dir_slug(path, "F-")?;
            Ok((Kind::Feature, format!("F-{dir}")))
        }
        _ => {
            if let Some(caps) = OPEN_TASK_FILENAME_RE.captures(name) {
                return Ok((Kind::Task, format!("T-{}", &caps[1])));
            }
            if let Some(caps) = DONE_TASK_FILENAME_RE.captures(name) {
                return Ok((Kind::Task, format!("T-{}", &caps[3])));
            }
            Err(TrellisError::single(
                ErrorCode::InvalidIDFormat,
                "path does not match a recognized object filename shape",
            ))
        }
    }
}

fn dir_slug(path: &Path, prefix: &str) -> Result<String, TrellisError> {
    let dir_name = path
        .parent()
        .and_then(|d| d.file_name())
        .and_then(|f| f.to_str())
        .ok_or_else(|| TrellisError::single(ErrorCode::InvalidIDFormat, "path has no parent directory"))?;
    dir_name
        .strip_prefix(prefix)
        .map(|s| s.to_string())
        .ok_or_else(|| {
            TrellisError::single(
                ErrorCode::InvalidIDFormat,
                "containing directory does not carry the expected kind prefix",
            )
        })
}
